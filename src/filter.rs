//! Include/exclude policy evaluation per mark name.

use crate::config::{FilterMode, ProfilerSettings};

/// Explicit value suppressing a mark entirely.
pub const IGNORE_MARK: &str = "ignoremark";

/// Explicit value dropping only the instance key.
pub const IGNORE_INVOCATION: &str = "ignoreinvocation";

/// Outcome of evaluating a mark against the loaded settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPolicy {
    /// Produce no node. The enclosing node's exclusive clock is paused for
    /// the duration, so the suppressed time is excluded from its self time.
    IgnoreMark,
    /// Track the mark, but only as its generalized (key-less) form.
    IgnoreInstance,
    /// Track the mark as given.
    Passthrough,
}

/// Resolves a [`MarkPolicy`] for each mark name.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    settings: ProfilerSettings,
}

impl ExcludeFilter {
    pub fn new(settings: ProfilerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProfilerSettings {
        &self.settings
    }

    /// Evaluate the policy for `element`.
    pub fn resolve(&self, element: &str) -> MarkPolicy {
        match self.settings.mark_value(element) {
            Some(IGNORE_MARK) => MarkPolicy::IgnoreMark,
            Some(IGNORE_INVOCATION) => MarkPolicy::IgnoreInstance,
            Some(value) if !value.is_empty() => match self.settings.mode {
                FilterMode::Exclude => MarkPolicy::IgnoreMark,
                FilterMode::Include => MarkPolicy::Passthrough,
            },
            _ => match self.settings.mode {
                FilterMode::Exclude => MarkPolicy::Passthrough,
                FilterMode::Include => MarkPolicy::IgnoreMark,
            },
        }
    }
}
