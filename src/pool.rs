use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::MigrationError;

/// Worker pool that caps the number of items being processed at once.
///
/// Results come back in input order regardless of completion order.
pub struct BoundedPool {
    pool: ThreadPool,
    max_in_flight: usize,
}

impl BoundedPool {
    pub fn new(max_in_flight: usize) -> Result<Self, MigrationError> {
        if max_in_flight == 0 {
            return Err(MigrationError::InvalidConfig(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_in_flight)
            .thread_name(|index| format!("cellset-migrate-{index}"))
            .build()
            .map_err(|err| MigrationError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            pool,
            max_in_flight,
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }

    /// Runs two independent batches side by side on the same workers.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.join(a, b)
    }
}
