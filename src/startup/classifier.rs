use super::types::{ClassifiedEntry, Decision, Policy, PolicyRule, StartupEntry};

pub const UNCOVERED_REASON: &str = "not covered by policy";

/// Lowercased `name command location`, the text rules are matched against
pub fn haystack(entry: &StartupEntry) -> String {
    let parts = [
        entry.name.as_str(),
        entry.command.as_deref().unwrap_or(""),
        entry.location.as_str(),
    ];
    parts.join(" ").to_lowercase()
}

fn first_match<'a>(rules: &'a [PolicyRule], haystack: &str) -> Option<&'a PolicyRule> {
    rules.iter().find(|r| r.is_match(haystack))
}

/// Decide one entry. Critical rules win over auto-disable rules, which win
/// over hints; an entry no rule covers is only flagged.
pub fn classify_entry(entry: StartupEntry, policy: &Policy) -> ClassifiedEntry {
    let text = haystack(&entry);

    let (decision, reason) = if let Some(rule) = first_match(&policy.critical, &text) {
        (Decision::Keep, rule.reason.as_str())
    } else if let Some(rule) = first_match(&policy.auto_disable, &text) {
        (Decision::Disable, rule.reason.as_str())
    } else if let Some(rule) = first_match(&policy.optional_hints, &text) {
        (Decision::FlagOptional, rule.reason.as_str())
    } else {
        (Decision::FlagOptional, UNCOVERED_REASON)
    };

    ClassifiedEntry::new(entry, decision, reason)
}

/// Classify every entry against the policy
pub fn classify(entries: Vec<StartupEntry>, policy: &Policy) -> Vec<ClassifiedEntry> {
    entries
        .into_iter()
        .map(|e| classify_entry(e, policy))
        .collect()
}
