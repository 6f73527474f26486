//! CPU client and batch-axis parallelism

use super::device::CpuDevice;
use super::runtime::CpuRuntime;
use crate::error::Result;
use crate::runtime::RuntimeClient;
#[cfg(feature = "rayon")]
use std::sync::Arc;

/// Threading knobs for batched CPU calls
///
/// Batch elements are independent, so a batched call is split across
/// workers along the batch axis. Each element is still computed by the
/// same sequential kernel as the single-matrix call, which keeps batch
/// results bit-for-bit equal to per-slice results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelismConfig {
    /// Worker count; `None` uses rayon's global pool
    pub num_threads: Option<usize>,
    /// Minimum batch elements handed to one worker
    pub min_batch_len: usize,
}

impl Default for ParallelismConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_batch_len: 1,
        }
    }
}

/// CPU client for operation dispatch
///
/// On the CPU the client is the "stream": there is no queue, and every
/// call runs to completion before returning.
#[derive(Clone, Debug)]
pub struct CpuClient {
    pub(crate) device: CpuDevice,
    parallelism: ParallelismConfig,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CpuClient {
    /// Create a new CPU client
    pub fn new(device: CpuDevice) -> Self {
        Self {
            device,
            parallelism: ParallelismConfig::default(),
            #[cfg(feature = "rayon")]
            pool: None,
        }
    }

    /// Return a client that runs batches with the given threading settings
    ///
    /// Builds a dedicated thread pool when `num_threads` is set. Without the
    /// `rayon` feature the settings are recorded and batches run serially.
    pub fn with_parallelism(self, config: ParallelismConfig) -> Result<Self> {
        #[cfg(feature = "rayon")]
        let pool = match config.num_threads {
            Some(n) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| crate::error::Error::Backend(format!("rayon pool: {e}")))?,
            )),
            None => None,
        };

        Ok(Self {
            device: self.device,
            parallelism: config,
            #[cfg(feature = "rayon")]
            pool,
        })
    }

    /// Current threading settings
    pub fn parallelism(&self) -> ParallelismConfig {
        self.parallelism
    }

    #[cfg(feature = "rayon")]
    #[inline]
    pub(crate) fn rayon_min_len(&self) -> usize {
        self.parallelism.min_batch_len.max(1)
    }

    /// Run `f` inside the client's pool, or the global pool if none
    #[cfg(feature = "rayon")]
    pub(crate) fn install_parallelism<F, O>(&self, f: F) -> O
    where
        F: FnOnce() -> O + Send,
        O: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Evaluate `f` for every batch index, results in batch order
    pub(crate) fn batch_map<O, F>(&self, batch: usize, f: F) -> Vec<O>
    where
        O: Send,
        F: Fn(usize) -> O + Send + Sync,
    {
        #[cfg(feature = "rayon")]
        if batch > 1 {
            use rayon::prelude::*;
            let min_len = self.rayon_min_len();
            return self.install_parallelism(|| {
                (0..batch)
                    .into_par_iter()
                    .with_min_len(min_len)
                    .map(&f)
                    .collect()
            });
        }

        (0..batch).map(f).collect()
    }
}

impl RuntimeClient<CpuRuntime> for CpuClient {
    fn device(&self) -> &CpuDevice {
        &self.device
    }

    fn synchronize(&self) -> Result<()> {
        // CPU operations are synchronous, nothing to do
        Ok(())
    }
}
