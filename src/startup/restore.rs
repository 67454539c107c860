//! Undo earlier remediation by moving backups back under their original names.
//!
//! A backup that can't be moved back is reported in its [`RestoreOutcome`]
//! and the remaining backups are still tried.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::registry::ConfigStore;
use super::remediator::{FILE_MARKER, VALUE_MARKER};
use super::types::{RunNamespace, Scope};

#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub struct RestoreOutcome {
    /// Backup file path or value name that was examined
    pub target: String,
    pub restored: bool,
    pub note: String,
}

impl RestoreOutcome {
    fn restored(target: String, note: impl Into<String>) -> Self {
        Self {
            target,
            restored: true,
            note: note.into(),
        }
    }

    fn skipped(target: String, note: impl Into<String>) -> Self {
        Self {
            target,
            restored: false,
            note: note.into(),
        }
    }

    /// A target that could not be restored because of `err`
    pub fn failed(target: String, err: &anyhow::Error) -> Self {
        log::warn!("Failed to restore {}: {:#}", target, err);
        Self::skipped(target, format!("failed: {:#}", err))
    }
}

/// Strip the marker and an optional `_N` counter from `name`. The marker is
/// matched ignoring ASCII case, as file and value names are on Windows.
pub(crate) fn original_name<'a>(name: &'a str, marker: &str) -> Option<&'a str> {
    // ASCII lowercasing keeps byte offsets, so `idx` is valid in `name`
    let idx = name
        .to_ascii_lowercase()
        .rfind(&marker.to_ascii_lowercase())?;
    let rest = &name[idx + marker.len()..];
    let counter_ok = match rest.strip_prefix('_') {
        Some(digits) => !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()),
        None => rest.is_empty(),
    };
    if idx == 0 || !counter_ok {
        return None;
    }
    Some(&name[..idx])
}

/// Rename every disabled file in `dir` back, unless its original name is
/// taken. Fails only when `dir` itself can't be listed.
pub fn restore_folder(dir: &Path) -> Result<Vec<RestoreOutcome>> {
    let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
    for item in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = match item {
            Ok(item) => item.path(),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if let Some(orig) = original_name(&name, FILE_MARKER) {
            let original = dir.join(orig);
            backups.push((path, original));
        }
    }
    backups.sort();

    let outcomes = backups
        .into_iter()
        .map(|(backup, original)| {
            let target = backup.display().to_string();
            restore_file(&backup, &original)
                .unwrap_or_else(|e| RestoreOutcome::failed(target, &e))
        })
        .collect();
    Ok(outcomes)
}

fn restore_file(backup: &Path, original: &Path) -> Result<RestoreOutcome> {
    let target = backup.display().to_string();
    if original.exists() {
        let note = format!("{} already exists", original.display());
        return Ok(RestoreOutcome::skipped(target, note));
    }
    fs::rename(backup, original)
        .with_context(|| format!("failed to rename {}", backup.display()))?;
    log::info!("Restored {} -> {}", backup.display(), original.display());
    Ok(RestoreOutcome::restored(target, "file restored"))
}

/// Move every backup value under the namespace back to its original name.
/// Fails only when the namespace can't be listed.
pub fn restore_config_store<S: ConfigStore>(
    store: &S,
    scope: Scope,
    namespace: RunNamespace,
) -> Result<Vec<RestoreOutcome>> {
    let names = store.list_values(scope, namespace).with_context(|| {
        format!("failed to list {}\\{}", scope.hive_label(), namespace.subkey())
    })?;

    let mut outcomes = Vec::new();
    for (backup, _) in names {
        let Some(original) = original_name(&backup, VALUE_MARKER) else {
            continue;
        };
        let outcome = restore_value(store, scope, namespace, &backup, original)
            .unwrap_or_else(|e| RestoreOutcome::failed(backup.clone(), &e));
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn restore_value<S: ConfigStore>(
    store: &S,
    scope: Scope,
    namespace: RunNamespace,
    backup: &str,
    original: &str,
) -> Result<RestoreOutcome> {
    if store.contains(scope, namespace, original)? {
        let note = format!("{} already exists", original);
        return Ok(RestoreOutcome::skipped(backup.to_string(), note));
    }
    let Some(value) = store.read_value(scope, namespace, backup)? else {
        return Ok(RestoreOutcome::skipped(backup.to_string(), "backup vanished"));
    };
    store
        .write_value(scope, namespace, original, &value)
        .with_context(|| format!("failed to write value {}", original))?;
    store
        .delete_value(scope, namespace, backup)
        .with_context(|| format!("failed to delete backup {}", backup))?;
    log::info!("Restored value {} -> {}", backup, original);
    Ok(RestoreOutcome::restored(backup.to_string(), "registry value restored"))
}
