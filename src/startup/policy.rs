use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::builtin::default_policy;
use super::types::{Policy, PolicyRule};

pub const POLICY_FILE: &str = "startup_rules.safe.json";
const MISSING_REASON: &str = "rule without reason";

/// Get the path to the policy file under `base_path`
pub fn policy_path(base_path: &Path) -> PathBuf {
    base_path.join(POLICY_FILE)
}

/// Load the safety policy, falling back to the built-in one when the file
/// is missing or unreadable
pub fn load_policy(base_path: &Path) -> Policy {
    let path = policy_path(base_path);
    if !path.exists() {
        log::debug!("No policy file at {}, using built-in rules", path.display());
        return default_policy();
    }

    match read_policy_file(&path) {
        Ok(policy) => {
            log::info!(
                "Loaded policy from {} ({} critical, {} auto-disable, {} hints)",
                path.display(),
                policy.critical.len(),
                policy.auto_disable.len(),
                policy.optional_hints.len()
            );
            policy
        }
        Err(e) => {
            log::warn!("Ignoring policy file {}: {:#}", path.display(), e);
            default_policy()
        }
    }
}

fn read_policy_file(path: &Path) -> Result<Policy> {
    let content = fs::read_to_string(path).context("failed to read policy file")?;
    parse_policy(&content)
}

/// Parse policy JSON. Keys are camelCase; PascalCase is accepted too.
pub fn parse_policy(content: &str) -> Result<Policy> {
    let dto: PolicyFile = serde_json::from_str(content).context("failed to parse policy file")?;
    Ok(dto.into_policy())
}

#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PolicyFile {
    #[serde(alias = "AllowApply")]
    allow_apply: bool,
    #[serde(alias = "Critical")]
    critical: Vec<RuleFile>,
    #[serde(alias = "AutoDisable")]
    auto_disable: Vec<RuleFile>,
    #[serde(alias = "OptionalHints")]
    optional_hints: Vec<RuleFile>,
}

impl Default for PolicyFile {
    fn default() -> Self {
        Self {
            allow_apply: true,
            critical: Vec::new(),
            auto_disable: Vec::new(),
            optional_hints: Vec::new(),
        }
    }
}

impl PolicyFile {
    fn into_policy(self) -> Policy {
        Policy {
            allow_apply: self.allow_apply,
            critical: convert_rules(self.critical),
            auto_disable: convert_rules(self.auto_disable),
            optional_hints: convert_rules(self.optional_hints),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RuleFile {
    #[serde(alias = "Keyword")]
    keyword: String,
    #[serde(alias = "Reason")]
    reason: String,
}

fn convert_rules(rules: Vec<RuleFile>) -> Vec<PolicyRule> {
    rules
        .into_iter()
        // an empty keyword would match every entry
        .filter(|r| !r.keyword.trim().is_empty())
        .map(|r| {
            let reason = if r.reason.trim().is_empty() {
                MISSING_REASON
            } else {
                r.reason.as_str()
            };
            PolicyRule::new(r.keyword.trim(), reason)
        })
        .collect()
}
