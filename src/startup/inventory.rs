//! Startup entry inventory.
//!
//! Each autorun surface is read by its own [`Collector`]. A collector that
//! fails contributes nothing and its reason is kept in the report; the
//! other collectors still run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::error::SourceUnavailable;
use super::host::CancelToken;
use super::process::run_with_timeout;
use super::registry::ConfigStore;
use super::remediator::FILE_MARKER;
use super::restore::original_name;
use super::services::{POWERSHELL, SERVICE_QUERY_ARGS, parse_service_listing};
use super::tasks::{SCHTASKS_ARGS, parse_task_listing};
use super::types::{RunNamespace, Scope, StartupEntry, StartupSource};

/// One autorun surface
pub trait Collector {
    fn source(&self) -> StartupSource;
    fn collect(&self) -> Result<Vec<StartupEntry>, SourceUnavailable>;
}

/// Result of one collector
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceOutcome {
    pub source: StartupSource,
    /// Number of entries found, or why the source was skipped
    pub result: Result<usize, SourceUnavailable>,
}

/// Everything one inventory pass found
#[derive(Clone, Debug, Default)]
pub struct InventoryReport {
    pub entries: Vec<StartupEntry>,
    pub outcomes: Vec<SourceOutcome>,
}

impl InventoryReport {
    /// Sources that contributed nothing because they could not be read
    pub fn unavailable(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Aggregates entries from a set of collectors, in order, without deduplication
pub struct Inventory {
    collectors: Vec<Box<dyn Collector>>,
    cancel: CancelToken,
}

impl Inventory {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            collectors: Vec::new(),
            cancel,
        }
    }

    pub fn with_collector(mut self, collector: impl Collector + 'static) -> Self {
        self.collectors.push(Box::new(collector));
        self
    }

    /// All surfaces of the running system: both startup folders, the four
    /// Run/RunOnce namespaces, scheduled tasks and automatic services
    pub fn system<S>(store: Arc<S>, timeout: Duration, cancel: CancelToken) -> Self
    where
        S: ConfigStore + 'static,
    {
        let mut inventory = Self::new(cancel.clone())
            .with_collector(FolderCollector::system(Scope::User))
            .with_collector(FolderCollector::system(Scope::Machine));
        for (scope, namespace) in [
            (Scope::User, RunNamespace::Run),
            (Scope::Machine, RunNamespace::Run),
            (Scope::User, RunNamespace::RunOnce),
            (Scope::Machine, RunNamespace::RunOnce),
        ] {
            inventory = inventory.with_collector(ConfigStoreCollector::new(
                Arc::clone(&store),
                scope,
                namespace,
            ));
        }
        inventory
            .with_collector(ScheduledTaskCollector::new(timeout, cancel.clone()))
            .with_collector(ServiceCollector::new(timeout, cancel))
    }

    pub fn collect(&self) -> Vec<StartupEntry> {
        self.collect_report().entries
    }

    pub fn collect_report(&self) -> InventoryReport {
        let mut report = InventoryReport::default();

        for collector in &self.collectors {
            let source = collector.source();
            let result = if self.cancel.is_cancelled() {
                Err(SourceUnavailable::Cancelled)
            } else {
                collector.collect()
            };

            let result = match result {
                Ok(mut entries) => {
                    log::debug!("{}: {} entries", source, entries.len());
                    let count = entries.len();
                    report.entries.append(&mut entries);
                    Ok(count)
                }
                Err(reason) => {
                    log::warn!("{} skipped: {}", source, reason);
                    Err(reason)
                }
            };
            report.outcomes.push(SourceOutcome { source, result });
        }

        log::info!(
            "Inventory found {} startup entries ({} sources unavailable)",
            report.entries.len(),
            report.unavailable().count()
        );
        report
    }
}

/// Files in a startup folder
pub struct FolderCollector {
    scope: Scope,
    dir: Result<PathBuf, SourceUnavailable>,
}

impl FolderCollector {
    pub fn new(scope: Scope, dir: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            dir: Ok(dir.into()),
        }
    }

    pub fn system(scope: Scope) -> Self {
        Self {
            scope,
            dir: startup_folder(scope),
        }
    }
}

/// Resolve the startup folder of `scope` from the environment
pub fn startup_folder(scope: Scope) -> Result<PathBuf, SourceUnavailable> {
    if !cfg!(windows) {
        return Err(SourceUnavailable::UnsupportedPlatform);
    }
    let (var, tail) = match scope {
        Scope::User => ("APPDATA", r"Microsoft\Windows\Start Menu\Programs\Startup"),
        Scope::Machine => ("PROGRAMDATA", r"Microsoft\Windows\Start Menu\Programs\StartUp"),
    };
    let base = std::env::var(var).map_err(|_| SourceUnavailable::Io(format!("{} not set", var)))?;
    Ok(PathBuf::from(base).join(tail))
}

impl Collector for FolderCollector {
    fn source(&self) -> StartupSource {
        StartupSource::AutorunFolder { scope: self.scope }
    }

    fn collect(&self) -> Result<Vec<StartupEntry>, SourceUnavailable> {
        let dir = self.dir.as_ref().map_err(|e| e.clone())?;
        collect_folder(self.scope, dir)
    }
}

fn collect_folder(scope: Scope, dir: &Path) -> Result<Vec<StartupEntry>, SourceUnavailable> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let what = dir.display().to_string();
    let mut paths = Vec::new();
    for item in fs::read_dir(dir).map_err(|e| SourceUnavailable::from_io(&what, &e))? {
        let item = item.map_err(|e| SourceUnavailable::from_io(&what, &e))?;
        let path = item.path();
        if !path.is_file() {
            continue;
        }
        // files disabled by an earlier run no longer launch
        let is_backup = path
            .file_name()
            .is_some_and(|n| original_name(&n.to_string_lossy(), FILE_MARKER).is_some());
        if is_backup {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|p| StartupEntry::folder_file(scope, p))
        .collect())
}

/// Named values under one Run/RunOnce namespace
pub struct ConfigStoreCollector<S> {
    store: Arc<S>,
    scope: Scope,
    namespace: RunNamespace,
}

impl<S: ConfigStore> ConfigStoreCollector<S> {
    pub fn new(store: Arc<S>, scope: Scope, namespace: RunNamespace) -> Self {
        Self {
            store,
            scope,
            namespace,
        }
    }
}

impl<S: ConfigStore> Collector for ConfigStoreCollector<S> {
    fn source(&self) -> StartupSource {
        StartupSource::ConfigStore {
            scope: self.scope,
            namespace: self.namespace,
        }
    }

    fn collect(&self) -> Result<Vec<StartupEntry>, SourceUnavailable> {
        let values = self
            .store
            .list_values(self.scope, self.namespace)
            .map_err(|e| {
                let what = format!("{}\\{}", self.scope.hive_label(), self.namespace.subkey());
                SourceUnavailable::from_io(&what, &e)
            })?;

        Ok(values
            .into_iter()
            .map(|(name, command)| {
                StartupEntry::config_value(self.scope, self.namespace, &name, command)
            })
            .collect())
    }
}

/// Scheduled tasks triggered at logon or boot
pub struct ScheduledTaskCollector {
    timeout: Duration,
    cancel: CancelToken,
}

impl ScheduledTaskCollector {
    pub fn new(timeout: Duration, cancel: CancelToken) -> Self {
        Self { timeout, cancel }
    }
}

impl Collector for ScheduledTaskCollector {
    fn source(&self) -> StartupSource {
        StartupSource::ScheduledJob
    }

    fn collect(&self) -> Result<Vec<StartupEntry>, SourceUnavailable> {
        if !cfg!(windows) {
            return Err(SourceUnavailable::UnsupportedPlatform);
        }
        let output = run_with_timeout("schtasks", &SCHTASKS_ARGS, self.timeout, &self.cancel)?;
        Ok(parse_task_listing(&output))
    }
}

/// Services configured to start automatically
pub struct ServiceCollector {
    timeout: Duration,
    cancel: CancelToken,
}

impl ServiceCollector {
    pub fn new(timeout: Duration, cancel: CancelToken) -> Self {
        Self { timeout, cancel }
    }
}

impl Collector for ServiceCollector {
    fn source(&self) -> StartupSource {
        StartupSource::BackgroundService
    }

    fn collect(&self) -> Result<Vec<StartupEntry>, SourceUnavailable> {
        if !cfg!(windows) {
            return Err(SourceUnavailable::UnsupportedPlatform);
        }
        let output =
            run_with_timeout(POWERSHELL, &SERVICE_QUERY_ARGS, self.timeout, &self.cancel)?;
        parse_service_listing(&output)
    }
}
