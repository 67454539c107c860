use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::classifier::classify;
use super::host::{CancelToken, HostContext};
use super::inventory::{Inventory, SourceOutcome, startup_folder};
use super::policy::load_policy;
use super::registry::ConfigStore;
use super::remediator::Remediator;
use super::restore::{RestoreOutcome, restore_config_store, restore_folder};
use super::types::{OptimizationPlan, Policy, RunNamespace, Scope};

/// Config store of the running platform
#[cfg(windows)]
pub type SystemStore = super::registry::WindowsRegistry;
#[cfg(not(windows))]
pub type SystemStore = super::registry::MemoryStore;

/// Optimizer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Directory holding the policy file
    pub base_path: PathBuf,
    /// Deadline for external listing tools
    pub external_timeout_secs: u64,
    /// When false the run is analysis-only whatever the policy says
    pub apply: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            external_timeout_secs: 30,
            apply: true,
        }
    }
}

impl OptimizerConfig {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }
}

/// Directory of the running executable, or the working directory
fn default_base_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// One optimizer run with per-source diagnostics
#[derive(Clone, Debug)]
pub struct RunReport {
    pub plan: OptimizationPlan,
    pub sources: Vec<SourceOutcome>,
}

/// Load policy, collect, classify, remediate. Every call is an independent
/// pass over live system state.
pub struct Optimizer<S> {
    config: OptimizerConfig,
    store: Arc<S>,
    host: HostContext,
    cancel: CancelToken,
}

impl Optimizer<SystemStore> {
    /// Optimizer for the running system
    pub fn system(config: OptimizerConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemStore::default()),
            HostContext::detect(),
            CancelToken::new(),
        )
    }
}

impl<S: ConfigStore + 'static> Optimizer<S> {
    pub fn new(
        config: OptimizerConfig,
        store: Arc<S>,
        host: HostContext,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            store,
            host,
            cancel,
        }
    }

    /// Token that stops the run between sources and between entries
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn policy(&self) -> Policy {
        let mut policy = load_policy(&self.config.base_path);
        if !self.config.apply {
            policy.allow_apply = false;
        }
        policy
    }

    fn system_inventory(&self) -> Inventory {
        Inventory::system(
            Arc::clone(&self.store),
            self.config.external_timeout(),
            self.cancel.clone(),
        )
    }

    /// Classify without touching anything
    pub fn scan(&self) -> OptimizationPlan {
        let policy = self.policy();
        let entries = self.system_inventory().collect();
        OptimizationPlan::new(classify(entries, &policy))
    }

    pub fn run(&self) -> OptimizationPlan {
        self.run_detailed().plan
    }

    pub fn run_detailed(&self) -> RunReport {
        self.run_with(&self.system_inventory())
    }

    /// Full pass using the given inventory
    pub fn run_with(&self, inventory: &Inventory) -> RunReport {
        let policy = self.policy();
        let report = inventory.collect_report();
        let classified = classify(report.entries, &policy);

        let remediator = Remediator::new(self.host, Arc::clone(&self.store), self.cancel.clone());
        let plan = OptimizationPlan::new(remediator.apply(classified, &policy));

        let s = plan.summary();
        log::info!(
            "Startup optimization: {} entries, {}/{} disabled, {} optional, {} critical",
            s.total,
            s.disabled,
            s.disable_planned,
            s.optional,
            s.critical
        );
        RunReport {
            plan,
            sources: report.outcomes,
        }
    }

    /// Undo earlier runs on both startup folders and all four namespaces
    pub fn restore(&self) -> Result<Vec<RestoreOutcome>> {
        if !self.host.platform_supported {
            bail!("restore is only supported on Windows");
        }
        if !self.host.elevated {
            bail!("admin rights required");
        }

        let mut outcomes = Vec::new();
        for scope in [Scope::User, Scope::Machine] {
            match startup_folder(scope) {
                Ok(dir) if dir.is_dir() => match restore_folder(&dir) {
                    Ok(found) => outcomes.extend(found),
                    Err(e) => {
                        outcomes.push(RestoreOutcome::failed(dir.display().to_string(), &e))
                    }
                },
                Ok(_) => {}
                Err(e) => log::warn!("Skipping {:?} startup folder: {}", scope, e),
            }
            for namespace in [RunNamespace::Run, RunNamespace::RunOnce] {
                match restore_config_store(self.store.as_ref(), scope, namespace) {
                    Ok(found) => outcomes.extend(found),
                    Err(e) => {
                        let target = format!("{}\\{}", scope.hive_label(), namespace.subkey());
                        outcomes.push(RestoreOutcome::failed(target, &e));
                    }
                }
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::inventory::{ConfigStoreCollector, FolderCollector};
    use crate::startup::registry::MemoryStore;
    use crate::startup::types::Decision;

    fn config(base: &std::path::Path) -> OptimizerConfig {
        OptimizerConfig {
            base_path: base.to_path_buf(),
            external_timeout_secs: 1,
            apply: true,
        }
    }

    #[test]
    fn test_config_defaults() {
        let c: OptimizerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c.external_timeout_secs, 30);
        assert!(c.apply);
    }

    #[test]
    fn test_apply_flag_forces_analysis_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path());
        c.apply = false;
        let optimizer = Optimizer::new(
            c,
            Arc::new(MemoryStore::new()),
            HostContext::detect(),
            CancelToken::new(),
        );
        assert!(!optimizer.policy().allow_apply);
    }

    #[test]
    fn test_run_with_injected_inventory() {
        let base = tempfile::tempdir().unwrap();
        // explicit rules: random temp dir names must not hit built-in keywords
        std::fs::write(
            base.path().join(crate::startup::POLICY_FILE),
            r#"{ "critical": [{ "keyword": "realtek", "reason": "Audio driver" }],
                 "autoDisable": [{ "keyword": "vendor helper", "reason": "Optional helper" }] }"#,
        )
        .unwrap();
        let folder = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("Vendor Helper.lnk"), "x").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.insert(Scope::User, RunNamespace::Run, "Realtek Audio", "rtk.exe");
        let host = HostContext {
            platform_supported: true,
            elevated: true,
        };
        let optimizer =
            Optimizer::new(config(base.path()), Arc::clone(&store), host, CancelToken::new());
        let inventory = Inventory::new(optimizer.cancel_token())
            .with_collector(FolderCollector::new(Scope::User, folder.path()))
            .with_collector(ConfigStoreCollector::new(
                Arc::clone(&store),
                Scope::User,
                RunNamespace::Run,
            ));

        let report = optimizer.run_with(&inventory);
        let s = report.plan.summary();
        assert_eq!(s.total, 2);
        assert_eq!(s.disabled, 1);
        assert_eq!(s.critical, 1);
        assert_eq!(report.sources.len(), 2);

        let helper = &report.plan.entries()[0];
        assert_eq!(helper.decision, Decision::Disable);
        assert!(folder.path().join("Vendor Helper.lnk.disabled_by_virgil").exists());
    }

    #[test]
    fn test_restore_requires_privilege() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostContext {
            platform_supported: true,
            elevated: false,
        };
        let store = Arc::new(MemoryStore::new());
        let optimizer = Optimizer::new(config(dir.path()), store, host, CancelToken::new());
        assert!(optimizer.restore().is_err());
    }

    // startup folders resolve to nothing off Windows, so only the store is touched
    #[cfg(not(windows))]
    #[test]
    fn test_restore_continues_past_unreadable_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.deny(Scope::Machine, RunNamespace::Run);
        store.insert(Scope::Machine, RunNamespace::RunOnce, "Tool_DisabledByVirgil", "t.exe");
        let host = HostContext {
            platform_supported: true,
            elevated: true,
        };
        let optimizer =
            Optimizer::new(config(dir.path()), Arc::clone(&store), host, CancelToken::new());

        let outcomes = optimizer.restore().unwrap();
        let run_key = format!("HKLM\\{}", RunNamespace::Run.subkey());
        let denied = outcomes.iter().find(|o| o.target == run_key).unwrap();
        assert!(!denied.restored);
        assert!(denied.note.starts_with("failed:"), "{}", denied.note);

        let tool = outcomes.iter().find(|o| o.target == "Tool_DisabledByVirgil").unwrap();
        assert!(tool.restored);
        assert!(store.contains(Scope::Machine, RunNamespace::RunOnce, "Tool").unwrap());
        let names = store.names(Scope::Machine, RunNamespace::RunOnce);
        assert_eq!(names, vec!["Tool"]);
    }
}
