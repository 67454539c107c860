//! Access to the Run/RunOnce config-store namespaces.
//!
//! The remediator and inventory only see the [`ConfigStore`] trait. On
//! Windows it is backed by the registry; [`MemoryStore`] backs it everywhere
//! else and in tests.

use std::collections::HashSet;
use std::io;
use std::sync::Mutex;

use super::types::{RunNamespace, Scope};

/// A hierarchical key-value store holding launch commands
pub trait ConfigStore {
    /// Stored value, copied verbatim when backing up
    type Value;

    /// Every named value under the namespace with its command, if readable.
    /// A namespace that doesn't exist yields no values.
    fn list_values(
        &self,
        scope: Scope,
        namespace: RunNamespace,
    ) -> io::Result<Vec<(String, Option<String>)>>;

    /// `Ok(None)` when the value is absent
    fn read_value(
        &self,
        scope: Scope,
        namespace: RunNamespace,
        name: &str,
    ) -> io::Result<Option<Self::Value>>;

    fn write_value(
        &self,
        scope: Scope,
        namespace: RunNamespace,
        name: &str,
        value: &Self::Value,
    ) -> io::Result<()>;

    /// Deleting an absent value is not an error
    fn delete_value(&self, scope: Scope, namespace: RunNamespace, name: &str) -> io::Result<()>;

    fn contains(&self, scope: Scope, namespace: RunNamespace, name: &str) -> io::Result<bool> {
        Ok(self.read_value(scope, namespace, name)?.is_some())
    }
}

#[cfg(windows)]
pub use self::windows::WindowsRegistry;

#[cfg(windows)]
mod windows {
    use std::io;

    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_SET_VALUE};
    use winreg::types::FromRegValue;
    use winreg::{RegKey, RegValue};

    use super::ConfigStore;
    use crate::startup::types::{RunNamespace, Scope};

    /// The live Windows registry (default 64/32-bit view of the process)
    #[derive(Clone, Copy, Debug, Default)]
    pub struct WindowsRegistry;

    fn root(scope: Scope) -> RegKey {
        match scope {
            Scope::User => RegKey::predef(HKEY_CURRENT_USER),
            Scope::Machine => RegKey::predef(HKEY_LOCAL_MACHINE),
        }
    }

    impl ConfigStore for WindowsRegistry {
        type Value = RegValue;

        fn list_values(
            &self,
            scope: Scope,
            namespace: RunNamespace,
        ) -> io::Result<Vec<(String, Option<String>)>> {
            let key = match root(scope).open_subkey(namespace.subkey()) {
                Ok(key) => key,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };

            let mut values = Vec::new();
            for item in key.enum_values() {
                let (name, value) = item?;
                // the unnamed default value isn't a launch entry
                if name.is_empty() {
                    continue;
                }
                let command = String::from_reg_value(&value)
                    .ok()
                    .map(|s| s.trim_end_matches('\0').to_string());
                values.push((name, command));
            }
            Ok(values)
        }

        fn read_value(
            &self,
            scope: Scope,
            namespace: RunNamespace,
            name: &str,
        ) -> io::Result<Option<RegValue>> {
            let key = root(scope).open_subkey(namespace.subkey())?;
            match key.get_raw_value(name) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        }

        fn write_value(
            &self,
            scope: Scope,
            namespace: RunNamespace,
            name: &str,
            value: &RegValue,
        ) -> io::Result<()> {
            let key = root(scope)
                .open_subkey_with_flags(namespace.subkey(), KEY_READ | KEY_SET_VALUE)?;
            key.set_raw_value(name, value)
        }

        fn delete_value(
            &self,
            scope: Scope,
            namespace: RunNamespace,
            name: &str,
        ) -> io::Result<()> {
            let key = root(scope)
                .open_subkey_with_flags(namespace.subkey(), KEY_READ | KEY_SET_VALUE)?;
            match key.delete_value(name) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
    }
}

/// In-process store with the same semantics as the registry
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: Vec<(Scope, RunNamespace, String, String)>,
    denied: HashSet<(Scope, RunNamespace)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any existing one with the same name
    pub fn insert(&self, scope: Scope, namespace: RunNamespace, name: &str, command: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.put(scope, namespace, name, command.to_string());
        }
    }

    /// Make every access to the namespace fail with permission denied
    pub fn deny(&self, scope: Scope, namespace: RunNamespace) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.denied.insert((scope, namespace));
        }
    }

    /// Value names in insertion order
    pub fn names(&self, scope: Scope, namespace: RunNamespace) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .values
                    .iter()
                    .filter(|(s, n, _, _)| *s == scope && *n == namespace)
                    .map(|(_, _, name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn with<T>(
        &self,
        scope: Scope,
        namespace: RunNamespace,
        f: impl FnOnce(&mut MemoryInner) -> T,
    ) -> io::Result<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("memory store poisoned"))?;
        if inner.denied.contains(&(scope, namespace)) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(f(&mut inner))
    }
}

impl MemoryInner {
    fn position(&self, scope: Scope, namespace: RunNamespace, name: &str) -> Option<usize> {
        self.values
            .iter()
            .position(|(s, n, v, _)| *s == scope && *n == namespace && v.eq_ignore_ascii_case(name))
    }

    fn put(&mut self, scope: Scope, namespace: RunNamespace, name: &str, value: String) {
        match self.position(scope, namespace, name) {
            Some(i) => self.values[i].3 = value,
            None => self.values.push((scope, namespace, name.to_string(), value)),
        }
    }
}

impl ConfigStore for MemoryStore {
    type Value = String;

    fn list_values(
        &self,
        scope: Scope,
        namespace: RunNamespace,
    ) -> io::Result<Vec<(String, Option<String>)>> {
        self.with(scope, namespace, |inner| {
            inner
                .values
                .iter()
                .filter(|(s, n, _, _)| *s == scope && *n == namespace)
                .map(|(_, _, name, value)| (name.clone(), Some(value.clone())))
                .collect()
        })
    }

    fn read_value(
        &self,
        scope: Scope,
        namespace: RunNamespace,
        name: &str,
    ) -> io::Result<Option<String>> {
        self.with(scope, namespace, |inner| {
            inner
                .position(scope, namespace, name)
                .map(|i| inner.values[i].3.clone())
        })
    }

    fn write_value(
        &self,
        scope: Scope,
        namespace: RunNamespace,
        name: &str,
        value: &String,
    ) -> io::Result<()> {
        self.with(scope, namespace, |inner| {
            inner.put(scope, namespace, name, value.clone())
        })
    }

    fn delete_value(&self, scope: Scope, namespace: RunNamespace, name: &str) -> io::Result<()> {
        self.with(scope, namespace, |inner| {
            if let Some(i) = inner.position(scope, namespace, name) {
                inner.values.remove(i);
            }
        })
    }
}
