//! Tunables for repository handles and execution engines.

use std::time::Duration;

/// Configuration shared by [`crate::Repository`] and
/// [`crate::ExecutionEngine`]. The defaults suit interactive agents; batch
/// orchestration typically raises `lock_timeout` and enables auto-GC.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budget for advisory-lock waits (GC, swarm commits).
    pub lock_timeout: Duration,
    /// Cap on the serialized size of one state blob.
    pub max_state_bytes: usize,
    /// Cap on `memory.cumulative_cost` accepted by the engine's builtin
    /// pre-check, in USD.
    pub max_cumulative_cost: f64,
    /// Run GC after every N successful engine commits; 0 disables.
    pub auto_gc_interval: u64,
    /// Mask sensitive strings before committing engine state.
    pub mask_pii: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(30),
            max_state_bytes: 16 * 1024 * 1024,
            max_cumulative_cost: 100.0,
            auto_gc_interval: 0,
            mask_pii: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.auto_gc_interval, 0);
        assert!(!cfg.mask_pii);
        assert!(cfg.max_state_bytes >= 1024 * 1024);
        assert!(cfg.max_cumulative_cost > 0.0);
    }
}
