//! Reversible disabling of entries classified as [`Decision::Disable`].
//!
//! Nothing is ever deleted outright: startup folder files are renamed with
//! [`FILE_MARKER`], and Run/RunOnce values are copied to a sibling named
//! with [`VALUE_MARKER`] before the original is removed.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::host::{CancelToken, HostContext};
use super::registry::ConfigStore;
use super::restore::original_name;
use super::types::{
    ClassifiedEntry, Decision, Policy, RemediationHandle, StartupEntry, StartupSource,
};

/// Suffix appended to a disabled startup folder file
pub const FILE_MARKER: &str = ".disabled_by_virgil";
/// Suffix of the backup value left next to a disabled Run/RunOnce value
pub const VALUE_MARKER: &str = "_DisabledByVirgil";

pub const NOTE_ANALYSIS_ONLY: &str = "analysis only (automatic apply disabled)";
pub const NOTE_ADMIN_REQUIRED: &str = "admin rights required";
pub const NOTE_CANCELLED: &str = "cancelled before remediation";
pub const NOTE_NOT_IMPLEMENTED: &str = "disabling not implemented for this source";
pub const NOTE_FILE_RENAMED: &str = "file renamed (reversible)";
pub const NOTE_VALUE_RENAMED: &str = "registry value renamed (reversible)";

/// What a strategy did with one entry
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisableOutcome {
    pub applied: bool,
    pub note: String,
}

impl DisableOutcome {
    pub fn applied(note: impl Into<String>) -> Self {
        Self {
            applied: true,
            note: note.into(),
        }
    }

    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            applied: false,
            note: note.into(),
        }
    }
}

/// One way of disabling entries of a given source
pub trait DisableStrategy {
    fn try_disable(&self, entry: &StartupEntry) -> Result<DisableOutcome>;
}

/// Renames startup folder files out of the way
#[derive(Clone, Copy, Debug, Default)]
pub struct FolderRename;

/// First `<path>.disabled_by_virgil[_N]` that doesn't exist yet
pub fn free_backup_path(path: &Path) -> PathBuf {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };

    let mut target = with_suffix(FILE_MARKER);
    let mut n = 1;
    while target.exists() {
        target = with_suffix(&format!("{}_{}", FILE_MARKER, n));
        n += 1;
    }
    target
}

impl DisableStrategy for FolderRename {
    fn try_disable(&self, entry: &StartupEntry) -> Result<DisableOutcome> {
        let Some(RemediationHandle::File { path }) = &entry.remediation_handle else {
            return Ok(DisableOutcome::skipped("file data incomplete"));
        };
        if !path.is_file() {
            return Ok(DisableOutcome::skipped("file not found"));
        }

        let target = free_backup_path(path);
        fs::rename(path, &target)
            .with_context(|| format!("failed to rename {}", path.display()))?;
        log::info!("Disabled {} -> {}", path.display(), target.display());
        Ok(DisableOutcome::applied(NOTE_FILE_RENAMED))
    }
}

/// Moves Run/RunOnce values to a backup-named sibling
pub struct ConfigStoreBackup<S> {
    store: Arc<S>,
}

impl<S: ConfigStore> ConfigStoreBackup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: ConfigStore> DisableStrategy for ConfigStoreBackup<S> {
    fn try_disable(&self, entry: &StartupEntry) -> Result<DisableOutcome> {
        let Some(RemediationHandle::ConfigValue {
            scope,
            namespace,
            value_name,
        }) = &entry.remediation_handle
        else {
            return Ok(DisableOutcome::skipped("registry data incomplete"));
        };
        let (scope, namespace) = (*scope, *namespace);
        if value_name.trim().is_empty() {
            return Ok(DisableOutcome::skipped("registry data incomplete"));
        }
        if original_name(value_name, VALUE_MARKER).is_some() {
            return Ok(DisableOutcome::skipped("value is a backup from a previous run"));
        }

        let value = match self.store.read_value(scope, namespace, value_name) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(DisableOutcome::skipped("value already absent")),
            Err(e) => {
                return Ok(DisableOutcome::skipped(format!(
                    "registry key inaccessible: {}",
                    e
                )));
            }
        };

        let mut backup = format!("{}{}", value_name, VALUE_MARKER);
        let mut n = 1;
        while self.store.contains(scope, namespace, &backup)? {
            backup = format!("{}{}_{}", value_name, VALUE_MARKER, n);
            n += 1;
        }

        self.store
            .write_value(scope, namespace, &backup, &value)
            .with_context(|| format!("failed to write backup value {}", backup))?;
        self.store
            .delete_value(scope, namespace, value_name)
            .with_context(|| format!("failed to delete value {}", value_name))?;
        log::info!("Disabled {} ({}) -> {}", value_name, entry.location, backup);
        Ok(DisableOutcome::applied(NOTE_VALUE_RENAMED))
    }
}

/// Sources with no disabling support
#[derive(Clone, Copy, Debug, Default)]
pub struct NotImplemented;

impl DisableStrategy for NotImplemented {
    fn try_disable(&self, _entry: &StartupEntry) -> Result<DisableOutcome> {
        Ok(DisableOutcome::skipped(NOTE_NOT_IMPLEMENTED))
    }
}

/// Applies the disable decisions of a classification
pub struct Remediator<S> {
    host: HostContext,
    cancel: CancelToken,
    folder: FolderRename,
    config: ConfigStoreBackup<S>,
    unsupported: NotImplemented,
}

impl<S: ConfigStore> Remediator<S> {
    pub fn new(host: HostContext, store: Arc<S>, cancel: CancelToken) -> Self {
        Self {
            host,
            cancel,
            folder: FolderRename,
            config: ConfigStoreBackup::new(store),
            unsupported: NotImplemented,
        }
    }

    fn strategy_for(&self, source: StartupSource) -> &dyn DisableStrategy {
        match source {
            StartupSource::AutorunFolder { .. } => &self.folder,
            StartupSource::ConfigStore { .. } => &self.config,
            StartupSource::ScheduledJob | StartupSource::BackgroundService => &self.unsupported,
        }
    }

    /// Why nothing may be applied on this run, if anything prevents it
    fn gate(&self, policy: &Policy) -> Option<&'static str> {
        if !policy.allow_apply || !self.host.platform_supported {
            Some(NOTE_ANALYSIS_ONLY)
        } else if !self.host.elevated {
            Some(NOTE_ADMIN_REQUIRED)
        } else {
            None
        }
    }

    /// Disable every entry marked Disable, one at a time. Other entries pass
    /// through unchanged; failures are recorded on the entry.
    pub fn apply(&self, entries: Vec<ClassifiedEntry>, policy: &Policy) -> Vec<ClassifiedEntry> {
        let gate = self.gate(policy);
        if let Some(reason) = gate {
            log::info!("Remediation skipped: {}", reason);
        }

        entries
            .into_iter()
            .map(|item| {
                if item.decision != Decision::Disable {
                    return item;
                }
                if let Some(reason) = gate {
                    return item.with_apply_result(false, reason);
                }
                if self.cancel.is_cancelled() {
                    return item.with_apply_result(false, NOTE_CANCELLED);
                }

                match self.strategy_for(item.entry.source).try_disable(&item.entry) {
                    Ok(outcome) => {
                        log::debug!("{}: {}", item.entry.name, outcome.note);
                        item.with_apply_result(outcome.applied, outcome.note)
                    }
                    Err(e) => {
                        log::warn!("Failed to disable {}: {:#}", item.entry.name, e);
                        let note = format!("failed: {:#}", e);
                        item.with_apply_result(false, note)
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::builtin::default_policy;
    use crate::startup::registry::MemoryStore;
    use crate::startup::types::{RunNamespace, Scope};

    const ELEVATED: HostContext = HostContext {
        platform_supported: true,
        elevated: true,
    };

    fn disable(entry: StartupEntry) -> ClassifiedEntry {
        ClassifiedEntry::new(entry, Decision::Disable, "helper")
    }

    fn remediator(host: HostContext, store: &Arc<MemoryStore>) -> Remediator<MemoryStore> {
        Remediator::new(host, Arc::clone(store), CancelToken::new())
    }

    #[test]
    fn test_folder_rename_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Updater.lnk");
        fs::write(&path, "first").unwrap();
        let entry = StartupEntry::folder_file(Scope::User, path.clone());

        let outcome = FolderRename.try_disable(&entry).unwrap();
        assert_eq!(outcome, DisableOutcome::applied(NOTE_FILE_RENAMED));
        assert!(!path.exists());

        fs::write(&path, "second").unwrap();
        FolderRename.try_disable(&entry).unwrap();

        let first = dir.path().join("Updater.lnk.disabled_by_virgil");
        let second = dir.path().join("Updater.lnk.disabled_by_virgil_1");
        assert_eq!(fs::read_to_string(first).unwrap(), "first");
        assert_eq!(fs::read_to_string(second).unwrap(), "second");
    }

    #[test]
    fn test_folder_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = StartupEntry::folder_file(Scope::User, dir.path().join("gone.lnk"));
        let outcome = FolderRename.try_disable(&entry).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, "file not found");
    }

    #[test]
    fn test_config_value_backup() {
        let store = Arc::new(MemoryStore::new());
        store.insert(Scope::User, RunNamespace::Run, "VendorHelper", r"C:\v\helper.exe");
        store.insert(Scope::User, RunNamespace::Run, "VendorHelper_DisabledByVirgil", "older");
        let entry =
            StartupEntry::config_value(Scope::User, RunNamespace::Run, "VendorHelper", None);

        let outcome = ConfigStoreBackup::new(Arc::clone(&store)).try_disable(&entry).unwrap();
        assert_eq!(outcome, DisableOutcome::applied(NOTE_VALUE_RENAMED));
        assert_eq!(store.read_value(Scope::User, RunNamespace::Run, "VendorHelper").unwrap(), None);
        assert_eq!(
            store
                .read_value(Scope::User, RunNamespace::Run, "VendorHelper_DisabledByVirgil_1")
                .unwrap()
                .as_deref(),
            Some(r"C:\v\helper.exe")
        );
        assert_eq!(
            store
                .read_value(Scope::User, RunNamespace::Run, "VendorHelper_DisabledByVirgil")
                .unwrap()
                .as_deref(),
            Some("older")
        );
    }

    #[test]
    fn test_config_value_absent_or_incomplete() {
        let store = Arc::new(MemoryStore::new());
        let strategy = ConfigStoreBackup::new(Arc::clone(&store));

        let absent = StartupEntry::config_value(Scope::User, RunNamespace::Run, "Gone", None);
        assert_eq!(strategy.try_disable(&absent).unwrap().note, "value already absent");

        let mut incomplete = absent.clone();
        incomplete.remediation_handle = None;
        let outcome = strategy.try_disable(&incomplete).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, "registry data incomplete");
    }

    #[test]
    fn test_backup_values_are_left_alone_in_any_case() {
        let store = Arc::new(MemoryStore::new());
        store.insert(Scope::User, RunNamespace::Run, "tool_disabledbyvirgil", "t.exe");
        store.insert(Scope::User, RunNamespace::Run, "Tool_DISABLEDBYVIRGIL_2", "t.exe");
        let strategy = ConfigStoreBackup::new(Arc::clone(&store));

        for name in ["tool_disabledbyvirgil", "Tool_DISABLEDBYVIRGIL_2"] {
            let entry = StartupEntry::config_value(Scope::User, RunNamespace::Run, name, None);
            let outcome = strategy.try_disable(&entry).unwrap();
            assert!(!outcome.applied);
            assert_eq!(outcome.note, "value is a backup from a previous run");
        }
        assert_eq!(store.names(Scope::User, RunNamespace::Run).len(), 2);
    }

    #[test]
    fn test_denied_store_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.deny(Scope::Machine, RunNamespace::Run);
        let entry = StartupEntry::config_value(Scope::Machine, RunNamespace::Run, "Tool", None);
        let out = remediator(ELEVATED, &store).apply(vec![disable(entry)], &default_policy());
        assert!(!out[0].applied);
        assert!(out[0].apply_note.as_deref().unwrap().starts_with("registry key inaccessible"));
    }

    #[test]
    fn test_gating() {
        let store = Arc::new(MemoryStore::new());
        store.insert(Scope::User, RunNamespace::Run, "Helper", "h.exe");
        let entries = || {
            vec![
                disable(StartupEntry::config_value(Scope::User, RunNamespace::Run, "Helper", None)),
                ClassifiedEntry::new(
                    StartupEntry::scheduled_job("Keep", None),
                    Decision::Keep,
                    "critical",
                ),
            ]
        };

        let mut analysis = default_policy();
        analysis.allow_apply = false;
        let out = remediator(ELEVATED, &store).apply(entries(), &analysis);
        assert!(out.iter().all(|e| !e.applied));
        assert_eq!(out[0].apply_note.as_deref(), Some(NOTE_ANALYSIS_ONLY));
        assert!(out[1].apply_note.is_none());

        let unelevated = HostContext {
            platform_supported: true,
            elevated: false,
        };
        let out = remediator(unelevated, &store).apply(entries(), &default_policy());
        assert_eq!(out[0].apply_note.as_deref(), Some(NOTE_ADMIN_REQUIRED));

        let foreign = HostContext {
            platform_supported: false,
            elevated: true,
        };
        let out = remediator(foreign, &store).apply(entries(), &default_policy());
        assert_eq!(out[0].apply_note.as_deref(), Some(NOTE_ANALYSIS_ONLY));
        assert!(store.contains(Scope::User, RunNamespace::Run, "Helper").unwrap());
    }

    #[test]
    fn test_unsupported_sources_are_explicit() {
        let store = Arc::new(MemoryStore::new());
        let out = remediator(ELEVATED, &store).apply(
            vec![
                disable(StartupEntry::scheduled_job(r"\Vendor\Updater", None)),
                disable(StartupEntry::service("Vendor Update", "vupd", true)),
            ],
            &default_policy(),
        );
        for item in out {
            assert!(!item.applied);
            assert_eq!(item.apply_note.as_deref(), Some(NOTE_NOT_IMPLEMENTED));
        }
    }

    #[test]
    fn test_failure_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("helper.lnk");
        fs::write(&good, "x").unwrap();
        let store = Arc::new(MemoryStore::new());

        let out = remediator(ELEVATED, &store).apply(
            vec![
                disable(StartupEntry::folder_file(Scope::User, dir.path().join("missing.lnk"))),
                disable(StartupEntry::folder_file(Scope::User, good.clone())),
            ],
            &default_policy(),
        );
        assert!(!out[0].applied);
        assert!(out[1].applied);
        assert!(!good.exists());
    }

    #[test]
    fn test_cancelled_remediation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.lnk");
        fs::write(&path, "x").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let remediator = Remediator::new(ELEVATED, Arc::new(MemoryStore::new()), cancel);
        let out = remediator.apply(
            vec![disable(StartupEntry::folder_file(Scope::User, path.clone()))],
            &default_policy(),
        );
        assert_eq!(out[0].apply_note.as_deref(), Some(NOTE_CANCELLED));
        assert!(path.exists());
    }

    /// Readable store that rejects every write
    #[derive(Default)]
    struct ReadOnlyStore(MemoryStore);

    impl ConfigStore for ReadOnlyStore {
        type Value = String;

        fn list_values(
            &self,
            scope: Scope,
            namespace: RunNamespace,
        ) -> std::io::Result<Vec<(String, Option<String>)>> {
            self.0.list_values(scope, namespace)
        }

        fn read_value(
            &self,
            scope: Scope,
            namespace: RunNamespace,
            name: &str,
        ) -> std::io::Result<Option<String>> {
            self.0.read_value(scope, namespace, name)
        }

        fn write_value(
            &self,
            _scope: Scope,
            _namespace: RunNamespace,
            _name: &str,
            _value: &String,
        ) -> std::io::Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        }

        fn delete_value(
            &self,
            _scope: Scope,
            _namespace: RunNamespace,
            _name: &str,
        ) -> std::io::Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        }
    }

    #[test]
    fn test_strategy_error_becomes_note() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("helper.lnk");
        fs::write(&good, "x").unwrap();
        let store = Arc::new(ReadOnlyStore::default());
        store.0.insert(Scope::Machine, RunNamespace::Run, "Tool", "t.exe");

        let denied = StartupEntry::config_value(Scope::Machine, RunNamespace::Run, "Tool", None);
        let out = Remediator::new(ELEVATED, Arc::clone(&store), CancelToken::new()).apply(
            vec![
                disable(denied),
                disable(StartupEntry::folder_file(Scope::User, good.clone())),
            ],
            &default_policy(),
        );

        assert!(!out[0].applied);
        let note = out[0].apply_note.as_deref().unwrap();
        assert!(note.starts_with("failed: failed to write backup value Tool_DisabledByVirgil"));
        assert!(store.0.contains(Scope::Machine, RunNamespace::Run, "Tool").unwrap());

        assert!(out[1].applied);
        assert_eq!(out[1].apply_note.as_deref(), Some(NOTE_FILE_RENAMED));
        assert!(!good.exists());
    }
}
