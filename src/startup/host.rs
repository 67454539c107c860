use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Platform and privilege facts the remediator gates on
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostContext {
    /// Remediation is only implemented for Windows autorun surfaces
    pub platform_supported: bool,
    pub elevated: bool,
}

impl HostContext {
    /// Probe the running process
    pub fn detect() -> Self {
        Self {
            platform_supported: cfg!(windows),
            elevated: is_elevated(),
        }
    }
}

#[cfg(windows)]
fn is_elevated() -> bool {
    ::is_elevated::is_elevated()
}

#[cfg(not(windows))]
fn is_elevated() -> bool {
    false
}

/// Cooperative cancellation flag shared between a caller and a run
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
