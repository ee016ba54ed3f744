use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread;

use tracing::{debug, error, warn};

use super::partition::{PartitionPlan, max_safe_ghost_width, plan_partitions, wrap_index};
use super::worker::{WorkerHalt, WorkerRing};
use crate::error::{Result, StencilError};

const THREADS_ENV: &str = "TORUS_STENCIL_THREADS";

static HARDWARE_THREADS: OnceLock<usize> = OnceLock::new();

#[inline]
fn hardware_thread_count() -> usize {
    *HARDWARE_THREADS.get_or_init(|| num_cpus::get().max(1))
}

fn env_thread_count() -> Option<usize> {
    let raw = std::env::var(THREADS_ENV).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(value = raw, "ignoring invalid {THREADS_ENV}");
            None
        }
    }
}

/// Configuration for a single [`ToroidalField`] run.
///
/// `RunConfig::default()` uses every hardware thread and the widest ghost
/// margin the partitioning allows.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    /// Number of worker threads.
    /// `None` means `TORUS_STENCIL_THREADS` if set, else hardware concurrency.
    pub thread_count: Option<usize>,
    /// Hard upper bound on threads regardless of detection.
    pub max_threads: Option<usize>,
    /// Requested ghost width, i.e. generations between halo exchanges.
    /// `None` means the largest safe width.
    pub ghost_width: Option<usize>,
    /// Reject a requested ghost width above the safe maximum instead of
    /// clamping it.
    pub strict_ghost_width: bool,
}

impl RunConfig {
    /// Set an explicit worker thread count.
    pub fn thread_count(mut self, n: usize) -> Self {
        self.thread_count = Some(n);
        self
    }

    /// Set a hard upper bound on threads.
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n);
        self
    }

    /// Request a ghost width.
    pub fn ghost_width(mut self, g: usize) -> Self {
        self.ghost_width = Some(g);
        self
    }

    pub fn strict_ghost_width(mut self, strict: bool) -> Self {
        self.strict_ghost_width = strict;
        self
    }
}

/// Resolve the worker count for a field of `len` cells, clamped to `[1, len]`.
fn resolve_thread_count(config: &RunConfig, len: usize) -> Result<usize> {
    let mut threads = match config.thread_count {
        Some(n) => n,
        None => env_thread_count().unwrap_or_else(hardware_thread_count),
    };
    if let Some(cap) = config.max_threads {
        threads = threads.min(cap);
    }
    if threads == 0 {
        return Err(StencilError::ZeroThreads);
    }
    if threads > len {
        debug!(requested = threads, len, "clamping thread count to field size");
    }
    Ok(threads.min(len))
}

fn resolve_ghost_width(config: &RunConfig, min_width: usize) -> Result<usize> {
    let safe = max_safe_ghost_width(min_width);
    match config.ghost_width {
        None => Ok(safe),
        Some(0) => Err(StencilError::ZeroGhostWidth),
        Some(requested) if requested > safe && config.strict_ghost_width => {
            Err(StencilError::GhostWidthUnsafe {
                requested,
                safe,
                min_width,
            })
        }
        Some(requested) => {
            if requested > safe {
                debug!(requested, safe, min_width, "clamping ghost width");
            }
            Ok(requested.min(safe))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Fixed-size 1-D array with wraparound indexing, advanced in parallel by
/// partition workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToroidalField<T> {
    cells: Vec<T>,
}

impl<T: Copy + Default> ToroidalField<T> {
    /// A field of `len` default cells.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(StencilError::EmptyField);
        }
        Ok(Self {
            cells: vec![T::default(); len],
        })
    }

    pub fn from_cells(cells: Vec<T>) -> Result<Self> {
        if cells.is_empty() {
            return Err(StencilError::EmptyField);
        }
        Ok(Self { cells })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false: fields hold at least one cell.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, index: i64) -> T {
        self.cells[wrap_index(index, self.cells.len())]
    }

    #[inline]
    pub fn set(&mut self, index: i64, value: T) {
        let i = wrap_index(index, self.cells.len());
        self.cells[i] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.cells.clone()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }

    /// Partition layout and ghost width a run with `config` would use.
    pub fn plan(&self, config: &RunConfig) -> Result<PartitionPlan> {
        let len = self.cells.len();
        let workers = resolve_thread_count(config, len)?;
        let partitions = plan_partitions(len, workers);
        let min_width = partitions.iter().map(|p| p.width).min().unwrap_or(len);
        let ghost_width = resolve_ghost_width(config, min_width)?;
        Ok(PartitionPlan {
            partitions,
            ghost_width,
        })
    }
}

impl<T: Copy + Default + Send + Sync> ToroidalField<T> {
    /// Advance the field by `generations` using `threads` workers.
    pub fn run<F>(&mut self, transition: F, generations: u64, threads: usize) -> Result<()>
    where
        F: Fn(T, T, T) -> T + Sync,
    {
        self.run_with(transition, generations, &RunConfig::default().thread_count(threads))
    }

    pub fn run_with<F>(&mut self, transition: F, generations: u64, config: &RunConfig) -> Result<()>
    where
        F: Fn(T, T, T) -> T + Sync,
    {
        self.try_run_with(
            move |l, c, r| Ok::<T, Infallible>(transition(l, c, r)),
            generations,
            config,
        )
    }

    /// Advance the field with a fallible transition.
    ///
    /// On error the field contents are unspecified; restore from a known
    /// state before running again.
    pub fn try_run_with<F, E>(
        &mut self,
        transition: F,
        generations: u64,
        config: &RunConfig,
    ) -> Result<()>
    where
        F: Fn(T, T, T) -> std::result::Result<T, E> + Sync,
        E: std::error::Error + Send + Sync + 'static,
    {
        let plan = self.plan(config)?;
        if generations == 0 {
            return Ok(());
        }
        debug!(
            len = self.cells.len(),
            workers = plan.worker_count(),
            ghost_width = plan.ghost_width,
            generations,
            "starting run"
        );

        let ring = WorkerRing::new(&self.cells, &plan);
        let failure: OnceLock<StencilError> = OnceLock::new();
        let report = |err: StencilError| {
            ring.barrier().abandon();
            let _ = failure.set(err);
        };

        thread::scope(|s| {
            for index in 0..ring.len() {
                let ring = &ring;
                let transition = &transition;
                let report = &report;
                let spawned = thread::Builder::new()
                    .name(format!("torus-worker-{index}"))
                    .spawn_scoped(s, move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            ring.run_worker(index, transition, generations)
                        }));
                        match outcome {
                            Ok(Ok(())) | Ok(Err(WorkerHalt::Abandoned)) => {}
                            Ok(Err(WorkerHalt::Transition { generation, error })) => {
                                error!(partition = index, generation, %error, "transition failed");
                                report(StencilError::Transition {
                                    partition: index,
                                    generation,
                                    source: Box::new(error),
                                });
                            }
                            Err(payload) => {
                                let message = panic_message(payload.as_ref());
                                error!(partition = index, %message, "worker panicked");
                                report(StencilError::WorkerPanicked {
                                    partition: index,
                                    message,
                                });
                            }
                        }
                    });
                if let Err(err) = spawned {
                    error!(partition = index, %err, "failed to spawn worker");
                    report(StencilError::Spawn(err));
                    break;
                }
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        ring.copy_back(&mut self.cells);
        Ok(())
    }
}
