//! Common utilities used across the crate.
//!
//! Parallelism configuration, a stable index sort and the bounded worker
//! pool used by training.

use rayon::prelude::*;

pub mod pool;
pub mod sort;

pub use pool::WorkerPool;
pub use sort::{sort_indices, sort_indices_range};

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether serving-time batch helpers may fan out over rayon's global pool.
///
/// Training never uses this; its loops run on the sized [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Sequential,
    Parallel,
}

impl Parallelism {
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over a slice, preserving order.
    pub fn maybe_par_map<T, B, F>(self, items: &[T], f: F) -> Vec<B>
    where
        T: Sync,
        B: Send,
        F: Fn(&T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            items.par_iter().map(f).collect()
        } else {
            items.iter().map(f).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallelism_flag() {
        assert!(Parallelism::Parallel.is_parallel());
        assert!(!Parallelism::default().is_parallel());
    }

    #[test]
    fn maybe_par_map_keeps_order() {
        let items: Vec<usize> = (0..64).collect();
        let seq = Parallelism::Sequential.maybe_par_map(&items, |i| i * 2);
        let par = Parallelism::Parallel.maybe_par_map(&items, |i| i * 2);
        assert_eq!(seq, par);
        assert_eq!(seq[10], 20);
    }
}
