//! Execution phase enums for each frame kind
//!
//! Each frame kind has its own phase enum tracking which execution step it is at. A frame's
//! handler advances the phase before it pushes a child frame, so when the child is popped the
//! parent resumes exactly where it left off.

/// Statements that evaluate one expression and then act on the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePhase {
    /// Push the expression
    Eval,
    /// The expression's value is in the VM slot
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfPhase {
    /// Evaluate the test of branch `n`
    Test(usize),
    /// Test of branch `n` has been evaluated
    Check(usize),
    /// A branch body (or the else body) ran
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPhase {
    Start,
    /// Lower bound is in the slot
    Lower,
    /// Upper bound is in the slot
    Upper { lower: i64 },
    Iterate { next: i64, upper: i64 },
    /// The counter cannot advance past `i64::MAX`
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhilePhase {
    Test,
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPhase {
    Start,
    /// Executing the protected body
    Body,
    /// Executing a handler (an error was caught)
    Handler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusivePhase {
    Acquire,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Resolve the callee and check the argument count
    Bind,
    /// Evaluate the default of parameter `next` in the caller's scope
    Default { next: usize, pending: bool },
    /// Create the invocation scope and push the body
    Enter,
    /// The body is running
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructPhase {
    Start,
    /// The parent instance is being constructed
    Parent,
    /// Run the class's own constructor
    Own,
    /// The constructor returned
    Finish,
}
