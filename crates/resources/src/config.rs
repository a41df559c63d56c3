/// Environment variable read by [`ResourceManagerConfig::from_env`].
pub const PARALLEL_ENV: &str = "GENA_PARALLEL";

/// Settings of a `ResourceManager`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceManagerConfig {
    /// Maximum number of load routines in flight at once.
    pub parallel: usize,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self { parallel: 4 }
    }
}

impl ResourceManagerConfig {
    pub fn with_parallel(parallel: usize) -> Self {
        Self { parallel }
    }

    /// Default settings, overridden by `GENA_PARALLEL` when it holds a positive integer.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(PARALLEL_ENV) {
            config.apply_parallel_override(&raw);
        }
        config
    }

    fn apply_parallel_override(&mut self, raw: &str) {
        match raw.trim().parse::<usize>() {
            Ok(parallel) if parallel > 0 => self.parallel = parallel,
            _ => log::warn!(
                "ignoring {}={:?}, keeping parallel = {}",
                PARALLEL_ENV,
                raw,
                self.parallel
            ),
        }
    }

    /// `parallel`, clamped to at least one slot.
    pub(crate) fn effective_parallel(&self) -> usize {
        if self.parallel == 0 {
            log::warn!("parallel = 0 would never load anything, using 1");
            1
        } else {
            self.parallel
        }
    }
}
