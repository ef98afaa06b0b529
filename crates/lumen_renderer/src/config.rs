//! Render configuration.

/// Maximum shapes per BVH leaf unless configured otherwise.
pub const DEFAULT_LEAF_SIZE: usize = 4;

/// Settings that shape how a render is executed, independent of the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Worker threads; 0 uses the available parallelism
    pub threads: usize,
    /// Maximum shapes per BVH leaf
    pub bvh_leaf_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            bvh_leaf_size: DEFAULT_LEAF_SIZE,
        }
    }
}

impl RenderConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the BVH leaf size. Values below one are raised to one.
    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.bvh_leaf_size = leaf_size.max(1);
        self
    }

    /// Number of worker threads to spawn.
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = RenderConfig::default();
        assert_eq!(config.bvh_leaf_size, 4);
        assert!(config.worker_count() >= 1);

        let config = config.with_threads(3).with_leaf_size(0);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.bvh_leaf_size, 1);
    }
}
