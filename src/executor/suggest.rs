//! "Did you mean" suggestions for unresolved names

use strsim::levenshtein;

/// Words of the expression language, suggested when no visible name is close
pub const KEYWORDS: &[&str] = &[
    "true",
    "false",
    "empty",
    "not",
    "and",
    "or",
    "wait",
    "in",
    "background",
    "this",
];

const MAX_SUGGESTIONS: usize = 3;

/// Up to three candidates closest to `input`
pub fn closest(input: &str, candidates: &[String]) -> Vec<String> {
    let limit = (input.chars().count() / 2).max(2);
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .filter(|candidate| candidate.as_str() != input)
        .map(|candidate| (levenshtein(input, candidate), candidate))
        .filter(|(distance, candidate)| {
            *distance <= limit || candidate.starts_with(input) || input.starts_with(candidate.as_str())
        })
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

/// Suggestions among visible names, falling back to keywords
pub fn suggest(input: &str, visible: &[String]) -> Vec<String> {
    let found = closest(input, visible);
    if !found.is_empty() {
        return found;
    }
    let keywords: Vec<String> = KEYWORDS.iter().map(|k| k.to_string()).collect();
    closest(input, &keywords)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_best_three_in_distance_order() {
        let visible = names(&["total", "totals", "tota", "count", "totl", "zzz"]);
        let found = closest("totak", &visible);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0], "tota");
        assert!(!found.contains(&"zzz".to_string()));
    }

    #[test]
    fn test_distance_counts_characters() {
        let visible = names(&["straße", "strafe"]);
        // Both are two edits away; ties are ordered by name
        assert_eq!(closest("strasse", &visible), names(&["strafe", "straße"]));
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(suggest("ture", &names(&["fine", "amount"])), ["true"]);
        assert!(suggest("qqqqqqqq", &names(&["fine"])).is_empty());
    }
}
