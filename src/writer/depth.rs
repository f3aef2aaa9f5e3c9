//! Queue depth hysteresis for writer backlog warnings.

/// Depth above which the backlog warning fires.
pub const WARN_DEPTH: usize = 10_000;

/// Depth below which a warned backlog counts as recovered.
pub const RECOVER_DEPTH: usize = 9_000;

/// A change in backlog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthTransition {
    Warned { depth: usize },
    Recovered { depth: usize },
}

/// Tracks whether the backlog warning is active.
///
/// Fires once when depth rises above the warn threshold and once when it
/// falls back below the lower recover threshold, so depths oscillating
/// between the two never repeat either message.
#[derive(Debug, Clone)]
pub struct DepthMonitor {
    warn_above: usize,
    recover_below: usize,
    warned: bool,
}

impl Default for DepthMonitor {
    fn default() -> Self {
        Self::new(WARN_DEPTH, RECOVER_DEPTH)
    }
}

impl DepthMonitor {
    pub fn new(warn_above: usize, recover_below: usize) -> Self {
        Self {
            warn_above,
            recover_below: recover_below.min(warn_above),
            warned: false,
        }
    }

    pub fn is_warned(&self) -> bool {
        self.warned
    }

    /// Feed the current depth, returning a transition if one occurred.
    pub fn observe(&mut self, depth: usize) -> Option<DepthTransition> {
        if !self.warned && depth > self.warn_above {
            self.warned = true;
            Some(DepthTransition::Warned { depth })
        } else if self.warned && depth < self.recover_below {
            self.warned = false;
            Some(DepthTransition::Recovered { depth })
        } else {
            None
        }
    }
}
