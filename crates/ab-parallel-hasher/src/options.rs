//! Configuration for [`crate::ParallelHasher`].

use crate::error::HasherError;

const CHUNK_LEN: u64 = 1024;

/// Tunable parameters for a [`crate::ParallelHasher`].
///
/// A plain, validated struct rather than a config-file/env-var layer: this crate is a library
/// meant to be embedded, not a standalone service, so the caller is expected to construct one of
/// these directly (or accept the defaults) and pass it to [`crate::ParallelHasher::new`].
#[derive(Debug, Clone, Copy)]
pub struct HasherOptions {
    /// Number of dedicated worker threads. Default 6.
    pub worker_count: usize,
    /// Largest leaf a single worker is asked to hash, in bytes. Must be a positive multiple of
    /// 1024. Default 1 MiB.
    pub max_leaf_size: u64,
    /// Maximum number of tasks allowed in flight at a single worker at once. Default 2.
    pub max_inflight_per_worker: usize,
}

impl Default for HasherOptions {
    fn default() -> Self {
        Self {
            worker_count: 6,
            max_leaf_size: 1 << 20,
            max_inflight_per_worker: 2,
        }
    }
}

impl HasherOptions {
    /// Checks that these options are internally consistent, returning
    /// [`HasherError::InvalidOptions`] if not.
    pub(crate) fn validate(&self) -> Result<(), HasherError> {
        if self.worker_count == 0 {
            return Err(HasherError::InvalidOptions {
                reason: "worker_count must be at least 1".to_owned(),
            });
        }
        if self.max_inflight_per_worker == 0 {
            return Err(HasherError::InvalidOptions {
                reason: "max_inflight_per_worker must be at least 1".to_owned(),
            });
        }
        if self.max_leaf_size == 0 || !self.max_leaf_size.is_multiple_of(CHUNK_LEN) {
            return Err(HasherError::InvalidOptions {
                reason: format!("max_leaf_size must be a positive multiple of {CHUNK_LEN}"),
            });
        }
        Ok(())
    }

    /// How many buffers the shared pool owns in total.
    pub(crate) fn num_slots(&self) -> usize {
        self.worker_count * self.max_inflight_per_worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        HasherOptions::default().validate().unwrap();
    }

    #[test]
    fn zero_workers_is_invalid() {
        let options = HasherOptions {
            worker_count: 0,
            ..HasherOptions::default()
        };
        assert!(matches!(options.validate(), Err(HasherError::InvalidOptions { .. })));
    }

    #[test]
    fn unaligned_leaf_size_is_invalid() {
        let options = HasherOptions {
            max_leaf_size: 1000,
            ..HasherOptions::default()
        };
        assert!(matches!(options.validate(), Err(HasherError::InvalidOptions { .. })));
    }

    #[test]
    fn num_slots_multiplies_workers_by_inflight() {
        let options = HasherOptions {
            worker_count: 4,
            max_inflight_per_worker: 3,
            ..HasherOptions::default()
        };
        assert_eq!(options.num_slots(), 12);
    }
}
