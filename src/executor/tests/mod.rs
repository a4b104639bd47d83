//! Tests for the executor
//!
//! Organized by feature area

mod class_tests;
mod expression_tests;
mod helpers;
mod statement_tests;
