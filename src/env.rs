use crate::context::ExecutionContext;
use crate::list::{ListError, OrderedList};
use std::env as stdenv;

/// Environment registry of a session.
///
/// Variables live in the context's environment list as `NAME=value` entries, in
/// insertion order. Every change marks the flat snapshot handed to child processes
/// stale; [`environ`](ExecutionContext::environ) rebuilds it on demand.
impl ExecutionContext {
    /// Copy the variables of the current process into the environment registry.
    pub fn import_process_env(&mut self) -> Result<(), ListError> {
        for (key, value) in stdenv::vars() {
            self.setenv(&key, &value)?;
        }
        Ok(())
    }

    pub fn environment(&self) -> &OrderedList {
        &self.environment
    }

    /// Value of the variable `name`, if set.
    pub fn getenv(&self, name: &str) -> Option<&str> {
        let node = self.environment.find_prefixed(name, Some('='))?;
        node.text()?.get(name.len() + 1..)
    }

    /// Set `name` to `value`, replacing an existing entry in place.
    pub fn setenv(&mut self, name: &str, value: &str) -> Result<(), ListError> {
        let entry = format!("{name}={value}");
        match self.environment.find_prefixed_mut(name, Some('=')) {
            Some(node) => node.set_text(Some(&entry))?,
            None => {
                self.environment.insert_end(Some(&entry), 0)?;
            }
        }
        self.env_changed = true;
        Ok(())
    }

    /// Remove every entry for `name`. Returns whether anything was removed.
    pub fn unsetenv(&mut self, name: &str) -> bool {
        let mut removed = false;
        while let Some(index) = self.environment.position(|node| names(node.text(), name)) {
            removed |= self.environment.delete_at(index);
        }
        self.env_changed |= removed;
        removed
    }

    /// Flat `NAME=value` snapshot of the environment, rebuilt after any change.
    pub fn environ(&mut self) -> &[String] {
        if self.env_changed || self.environ.is_none() {
            self.environ = Some(self.environment.to_strings());
            self.env_changed = false;
        }
        self.environ.as_deref().unwrap_or_default()
    }
}

fn names(entry: Option<&str>, name: &str) -> bool {
    entry
        .and_then(|text| text.strip_prefix(name))
        .is_some_and(|rest| rest.starts_with('='))
}
