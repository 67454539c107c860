pub mod types;
pub mod error;
pub mod builtin;
pub mod policy;
pub mod csv;
pub mod tasks;
pub mod services;
pub mod process;
pub mod registry;
pub mod host;
pub mod inventory;
pub mod classifier;
pub mod remediator;
pub mod restore;
pub mod optimizer;

// Re-export commonly used items
pub use types::{
    ClassifiedEntry, Decision, OptimizationPlan, PlanSummary, Policy, PolicyRule,
    RemediationHandle, RunNamespace, Scope, StartupEntry, StartupSource, dedupe_entries,
};
pub use error::SourceUnavailable;
pub use builtin::default_policy;
pub use policy::{POLICY_FILE, load_policy};
pub use classifier::{classify, classify_entry};
pub use host::{CancelToken, HostContext};
pub use inventory::{Collector, Inventory, InventoryReport, SourceOutcome};
pub use registry::{ConfigStore, MemoryStore};
pub use remediator::{DisableOutcome, DisableStrategy, Remediator};
pub use restore::{RestoreOutcome, restore_config_store, restore_folder};
pub use optimizer::{Optimizer, OptimizerConfig, RunReport, SystemStore};
