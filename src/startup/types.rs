use std::fmt;
use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Registry sub key holding per-logon launch commands
pub const RUN_SUBKEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
/// Registry sub key holding launch-once commands
pub const RUN_ONCE_SUBKEY: &str = r"Software\Microsoft\Windows\CurrentVersion\RunOnce";

/// Whether an autorun surface belongs to the current user or the whole machine
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Machine,
}

impl Scope {
    /// Short registry hive label (e.g. "HKCU")
    pub fn hive_label(self) -> &'static str {
        match self {
            Scope::User => "HKCU",
            Scope::Machine => "HKLM",
        }
    }
}

/// The two launch namespaces of the config store
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RunNamespace {
    Run,
    RunOnce,
}

impl RunNamespace {
    pub fn subkey(self) -> &'static str {
        match self {
            RunNamespace::Run => RUN_SUBKEY,
            RunNamespace::RunOnce => RUN_ONCE_SUBKEY,
        }
    }
}

/// Where a startup entry was discovered
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StartupSource {
    AutorunFolder { scope: Scope },
    ConfigStore { scope: Scope, namespace: RunNamespace },
    ScheduledJob,
    BackgroundService,
}

impl StartupSource {
    /// All eight concrete sources, in collection order
    pub fn all() -> [StartupSource; 8] {
        [
            StartupSource::AutorunFolder { scope: Scope::User },
            StartupSource::AutorunFolder { scope: Scope::Machine },
            StartupSource::ConfigStore { scope: Scope::User, namespace: RunNamespace::Run },
            StartupSource::ConfigStore { scope: Scope::Machine, namespace: RunNamespace::Run },
            StartupSource::ConfigStore { scope: Scope::User, namespace: RunNamespace::RunOnce },
            StartupSource::ConfigStore { scope: Scope::Machine, namespace: RunNamespace::RunOnce },
            StartupSource::ScheduledJob,
            StartupSource::BackgroundService,
        ]
    }
}

impl fmt::Display for StartupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupSource::AutorunFolder { scope: Scope::User } => {
                write!(f, "Startup folder (user)")
            }
            StartupSource::AutorunFolder { scope: Scope::Machine } => {
                write!(f, "Startup folder (machine)")
            }
            StartupSource::ConfigStore { scope, namespace } => {
                let ns = match namespace {
                    RunNamespace::Run => "Run",
                    RunNamespace::RunOnce => "RunOnce",
                };
                write!(f, "Registry {} {}", scope.hive_label(), ns)
            }
            StartupSource::ScheduledJob => write!(f, "Scheduled task"),
            StartupSource::BackgroundService => write!(f, "Service"),
        }
    }
}

/// Addressing data needed to disable an entry later
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemediationHandle {
    /// A file inside a startup folder
    File { path: PathBuf },
    /// A named value under a Run/RunOnce key
    ConfigValue {
        scope: Scope,
        namespace: RunNamespace,
        value_name: String,
    },
}

/// One discovered autorun mechanism
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartupEntry {
    /// Program, task or service name shown to the user
    pub name: String,
    pub source: StartupSource,
    /// File path or registry path the entry was read from
    pub location: String,
    /// Launch command, when one could be resolved
    pub command: Option<String>,
    pub enabled: bool,
    /// Only present for folder and Run/RunOnce entries
    #[serde(skip)]
    pub remediation_handle: Option<RemediationHandle>,
}

impl StartupEntry {
    pub fn folder_file(scope: Scope, path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let display = path.to_string_lossy().into_owned();
        Self {
            name,
            source: StartupSource::AutorunFolder { scope },
            location: display.clone(),
            command: Some(display),
            enabled: true,
            remediation_handle: Some(RemediationHandle::File { path }),
        }
    }

    pub fn config_value(
        scope: Scope,
        namespace: RunNamespace,
        value_name: &str,
        command: Option<String>,
    ) -> Self {
        Self {
            name: value_name.to_string(),
            source: StartupSource::ConfigStore { scope, namespace },
            location: format!("{}\\{}", scope.hive_label(), namespace.subkey()),
            command,
            enabled: true,
            remediation_handle: Some(RemediationHandle::ConfigValue {
                scope,
                namespace,
                value_name: value_name.to_string(),
            }),
        }
    }

    pub fn scheduled_job(task_name: &str, command: Option<String>) -> Self {
        Self {
            name: task_name.to_string(),
            source: StartupSource::ScheduledJob,
            location: task_name.to_string(),
            command,
            enabled: true,
            remediation_handle: None,
        }
    }

    pub fn service(display_name: &str, service_name: &str, running: bool) -> Self {
        Self {
            name: display_name.to_string(),
            source: StartupSource::BackgroundService,
            location: service_name.to_string(),
            command: Some(service_name.to_string()),
            enabled: running,
            remediation_handle: None,
        }
    }
}

/// Keeps the first of each group of entries sharing name, location and state
pub fn dedupe_entries(entries: Vec<StartupEntry>) -> Vec<StartupEntry> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert((e.name.clone(), e.location.clone(), e.enabled)))
        .collect()
}

/// A keyword rule from the safety policy
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PolicyRule {
    pub keyword: String,
    pub reason: String,
}

impl PolicyRule {
    pub fn new(keyword: &str, reason: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Case-insensitive substring match against an already lowercased haystack
    pub fn is_match(&self, haystack: &str) -> bool {
        haystack.contains(&self.keyword.to_lowercase())
    }
}

/// The safety policy driving classification and remediation
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub allow_apply: bool,
    pub critical: Vec<PolicyRule>,
    pub auto_disable: Vec<PolicyRule>,
    pub optional_hints: Vec<PolicyRule>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    /// Critical entry, never touched
    Keep,
    /// Worth a look, left alone
    FlagOptional,
    /// Eligible for automatic disabling
    Disable,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Keep => write!(f, "keep"),
            Decision::FlagOptional => write!(f, "optional"),
            Decision::Disable => write!(f, "disable"),
        }
    }
}

/// An entry together with its decision and, once remediated, the outcome
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedEntry {
    #[serde(flatten)]
    pub entry: StartupEntry,
    pub decision: Decision,
    pub reason: String,
    pub applied: bool,
    pub apply_note: Option<String>,
}

impl ClassifiedEntry {
    pub fn new(entry: StartupEntry, decision: Decision, reason: &str) -> Self {
        Self {
            entry,
            decision,
            reason: reason.to_string(),
            applied: false,
            apply_note: None,
        }
    }

    /// Record a remediation outcome. Entries not marked Disable are returned untouched.
    pub fn with_apply_result(mut self, applied: bool, note: impl Into<String>) -> Self {
        if self.decision == Decision::Disable {
            self.applied = applied;
            self.apply_note = Some(note.into());
        }
        self
    }
}

/// Five counters derived from a plan
#[derive(Clone, Copy, Debug, Default, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total: usize,
    pub disable_planned: usize,
    pub disabled: usize,
    pub optional: usize,
    pub critical: usize,
}

/// Read-only result of one optimizer run
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptimizationPlan {
    entries: Vec<ClassifiedEntry>,
}

impl OptimizationPlan {
    pub fn new(entries: Vec<ClassifiedEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ClassifiedEntry] {
        &self.entries
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn disable_planned(&self) -> usize {
        self.count(|e| e.decision == Decision::Disable)
    }

    pub fn disabled(&self) -> usize {
        self.count(|e| e.decision == Decision::Disable && e.applied)
    }

    pub fn optional(&self) -> usize {
        self.count(|e| e.decision == Decision::FlagOptional)
    }

    pub fn critical(&self) -> usize {
        self.count(|e| e.decision == Decision::Keep)
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            total: self.total(),
            disable_planned: self.disable_planned(),
            disabled: self.disabled(),
            optional: self.optional(),
            critical: self.critical(),
        }
    }

    fn count(&self, pred: impl Fn(&ClassifiedEntry) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(e)).count()
    }
}

impl Serialize for OptimizationPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OptimizationPlan", 2)?;
        state.serialize_field("summary", &self.summary())?;
        state.serialize_field("entries", &self.entries)?;
        state.end()
    }
}

impl fmt::Display for OptimizationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.entries {
            let status = match item.decision {
                Decision::Disable if item.applied => "disabled",
                Decision::Disable => "planned",
                Decision::Keep => "keep",
                Decision::FlagOptional => "optional",
            };
            write!(
                f,
                "[{:<8}] {:<40} {:<26} {}",
                status,
                item.entry.name,
                item.entry.source.to_string(),
                item.reason
            )?;
            if let Some(ref note) = item.apply_note {
                write!(f, " ({})", note)?;
            }
            writeln!(f)?;
        }
        let s = self.summary();
        writeln!(
            f,
            "{} entries: {} disabled of {} planned, {} optional, {} critical",
            s.total, s.disabled, s.disable_planned, s.optional, s.critical
        )
    }
}
