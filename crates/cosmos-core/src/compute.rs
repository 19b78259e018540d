//! Worker pool sizing

/// Accelerator memory reserved for one page worker (detection model plus activations)
pub const DEFAULT_MEMORY_PER_WORKER: u64 = 4_000_000_000;

/// Compute available to the page worker pool
///
/// Detection and recognition are the scarce shared resource, so the number of
/// concurrently processed pages follows accelerator memory when it is known
/// and falls back to the CPU count otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeBudget {
    /// Total accelerator memory in bytes, if an accelerator is present
    pub accelerator_memory: Option<u64>,
    pub memory_per_worker: u64,
    pub cpu_count: usize,
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self::cpu_only()
    }
}

impl ComputeBudget {
    #[must_use]
    pub fn cpu_only() -> Self {
        Self {
            accelerator_memory: None,
            memory_per_worker: DEFAULT_MEMORY_PER_WORKER,
            cpu_count: num_cpus::get(),
        }
    }

    #[must_use]
    pub fn with_accelerator(memory_bytes: u64) -> Self {
        Self {
            accelerator_memory: Some(memory_bytes),
            ..Self::cpu_only()
        }
    }

    /// Number of pages that may be processed at once (always at least 1)
    #[must_use]
    pub fn workers(&self) -> usize {
        let workers = match self.accelerator_memory {
            Some(total) if self.memory_per_worker > 0 => {
                usize::try_from(total / self.memory_per_worker).unwrap_or(usize::MAX)
            }
            _ => self.cpu_count,
        };
        workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerator_memory_sets_workers() {
        let budget = ComputeBudget::with_accelerator(16_000_000_000);
        assert_eq!(budget.workers(), 4);
    }

    #[test]
    fn test_small_accelerator_still_gets_one_worker() {
        let budget = ComputeBudget::with_accelerator(2_000_000_000);
        assert_eq!(budget.workers(), 1);
    }

    #[test]
    fn test_cpu_fallback() {
        let budget = ComputeBudget {
            accelerator_memory: None,
            memory_per_worker: DEFAULT_MEMORY_PER_WORKER,
            cpu_count: 6,
        };
        assert_eq!(budget.workers(), 6);
        assert!(ComputeBudget::cpu_only().workers() >= 1);
    }
}
