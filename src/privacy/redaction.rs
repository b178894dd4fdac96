// src/privacy/redaction.rs
//! Pattern-based redaction (spec §4.11). Patterns are compiled once at
//! construction, matching the teacher's compiled-pattern-cache precedent
//! elsewhere in the codebase.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionAction {
    Remove,
    Generalize,
    Hash,
}

#[derive(Debug, Clone)]
pub struct RedactionRule {
    pub name: &'static str,
    pub pattern: &'static Lazy<Regex>,
    pub action: RedactionAction,
    pub generalized_as: Option<&'static str>,
}

static SSN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static LARGE_MONEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s?([1-9][0-9]{0,2}(,[0-9]{3}){2,}|[1-9][0-9]{6,})(\.[0-9]+)?").unwrap());
static MEDICAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(diagnos(is|ed)|prescri(bed|ption)|hiv|cancer|medication)\b").unwrap()
});
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").unwrap());

/// Always-applied regardless of tier (spec §4.11: "`pii` and `medical` are
/// always removed regardless of tier").
pub fn always_on_rules() -> Vec<RedactionRule> {
    vec![
        RedactionRule {
            name: "ssn",
            pattern: &SSN_PATTERN,
            action: RedactionAction::Remove,
            generalized_as: None,
        },
        RedactionRule {
            name: "medical",
            pattern: &MEDICAL_PATTERN,
            action: RedactionAction::Remove,
            generalized_as: None,
        },
        RedactionRule {
            name: "email",
            pattern: &EMAIL_PATTERN,
            action: RedactionAction::Hash,
            generalized_as: None,
        },
    ]
}

/// Per-tier default generalization of financial magnitudes (spec §4.11
/// example: "`$>1M` -> `[substantial financial goals]`").
pub fn tier_default_rules() -> Vec<RedactionRule> {
    vec![RedactionRule {
        name: "large_money",
        pattern: &LARGE_MONEY_PATTERN,
        action: RedactionAction::Generalize,
        generalized_as: Some("[substantial financial goals]"),
    }]
}

/// Applies every rule in order, then runs the post-pass cleanup (spec
/// §4.11: empty brackets removed, whitespace runs collapsed, whitespace
/// before punctuation removed). Returns the redacted text plus the names of
/// rules that actually matched something.
pub fn redact(text: &str, rules: &[RedactionRule]) -> (String, Vec<String>) {
    let mut out = text.to_string();
    let mut applied = Vec::new();

    for rule in rules {
        if !rule.pattern.is_match(&out) {
            continue;
        }
        applied.push(rule.name.to_string());
        out = match rule.action {
            RedactionAction::Remove => rule.pattern.replace_all(&out, "").into_owned(),
            RedactionAction::Generalize => {
                let replacement = rule.generalized_as.unwrap_or("[redacted]");
                rule.pattern.replace_all(&out, replacement).into_owned()
            }
            RedactionAction::Hash => rule
                .pattern
                .replace_all(&out, |caps: &regex::Captures| hash_token(&caps[0]))
                .into_owned(),
        };
    }

    (cleanup(&out), applied)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    format!("[REDACTED:{}]", hex::encode(&digest[..4]))
}

static EMPTY_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]|\{\s*\}").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());

fn cleanup(text: &str) -> String {
    let text = EMPTY_BRACKETS.replace_all(text, "");
    let text = WHITESPACE_RUNS.replace_all(&text, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssn_is_removed() {
        let rules = always_on_rules();
        let (text, applied) = redact("SSN 123-45-6789 on file", &rules);
        assert!(!text.contains("123-45-6789"));
        assert!(applied.contains(&"ssn".to_string()));
    }

    #[test]
    fn large_money_is_generalized() {
        let rules = tier_default_rules();
        let (text, applied) = redact("Revenue $10,000,000 this year", &rules);
        assert!(text.contains("[substantial financial goals]"));
        assert!(applied.contains(&"large_money".to_string()));
    }

    #[test]
    fn email_is_hashed_not_removed() {
        let rules = always_on_rules();
        let (text, _) = redact("contact me at a@b.com", &rules);
        assert!(!text.contains("a@b.com"));
        assert!(text.contains("[REDACTED:"));
    }

    #[test]
    fn cleanup_collapses_whitespace_and_empty_brackets() {
        let (text, _) = redact("value: () too   many   spaces , ok", &[]);
        assert_eq!(text, "value: too many spaces, ok");
    }
}
