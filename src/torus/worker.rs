//! Partition workers and the ring they form for one run.
//!
//! Each worker owns a double-buffered window `[margin | core | margin]`.
//! Between two barrier rounds a worker only touches its own buffers; inside a
//! barrier pair it writes its own ghost margins and reads its neighbors' core
//! edges. The two phases never overlap, which is what makes the shared access
//! below sound without per-cell locking.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::barrier::{Barrier, BarrierAbandoned};
use super::partition::{Partition, PartitionPlan, wrap_index};

/// Why a worker stopped before finishing its generations.
#[derive(Debug)]
pub enum WorkerHalt<E> {
    /// A peer failed and broke the barrier.
    Abandoned,
    Transition { generation: u64, error: E },
}

impl<E> From<BarrierAbandoned> for WorkerHalt<E> {
    fn from(_: BarrierAbandoned) -> Self {
        WorkerHalt::Abandoned
    }
}

pub struct PartitionWorker<T> {
    partition: Partition,
    margin: usize,
    left: usize,
    right: usize,
    phase: AtomicUsize,
    buffers: [Box<[UnsafeCell<T>]>; 2],
}

// SAFETY: buffers are only mutated by the owning worker thread; neighbor
// reads happen strictly between the two barrier waits of an exchange, while
// the owner writes only its ghost margins (disjoint from the core cells that
// neighbors read). The barrier mutex orders every phase transition.
unsafe impl<T: Send + Sync> Sync for PartitionWorker<T> {}

impl<T: Copy + Default> PartitionWorker<T> {
    fn new(partition: Partition, margin: usize, workers: usize, field: &[T]) -> Self {
        let window = partition.width + 2 * margin;
        let origin = partition.start as i64 - margin as i64;
        let seeded: Box<[UnsafeCell<T>]> = (0..window as i64)
            .map(|offset| UnsafeCell::new(field[wrap_index(origin + offset, field.len())]))
            .collect();
        let scratch: Box<[UnsafeCell<T>]> =
            (0..window).map(|_| UnsafeCell::new(T::default())).collect();

        let index = partition.index;
        Self {
            partition,
            margin,
            left: (index + workers - 1) % workers,
            right: (index + 1) % workers,
            phase: AtomicUsize::new(0),
            buffers: [seeded, scratch],
        }
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        self.partition
    }

    #[inline]
    pub fn neighbors(&self) -> (usize, usize) {
        (self.left, self.right)
    }

    #[inline]
    fn window_len(&self) -> usize {
        self.partition.width + 2 * self.margin
    }

    #[inline]
    fn active_phase(&self) -> usize {
        self.phase.load(Ordering::Relaxed)
    }

    #[inline]
    fn cell_ptr(&self, phase: usize, pos: usize) -> *mut T {
        debug_assert!(pos < self.window_len());
        self.buffers[phase][pos].get()
    }

    /// # Safety
    /// No other thread may write the buffer at `phase` while the slice lives.
    #[inline]
    unsafe fn buffer(&self, phase: usize) -> &[T] {
        let cells = &self.buffers[phase];
        // UnsafeCell<T> has the same in-memory representation as T.
        unsafe { std::slice::from_raw_parts(cells.as_ptr() as *const T, cells.len()) }
    }

    /// # Safety
    /// Caller must be the owning worker, outside any exchange window.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn buffer_mut(&self, phase: usize) -> &mut [T] {
        let cells = &self.buffers[phase];
        unsafe { std::slice::from_raw_parts_mut(cells.as_ptr() as *mut T, cells.len()) }
    }

    /// One generation over the whole window, then swap buffers.
    ///
    /// # Safety
    /// Only the owning worker may call this, outside any exchange window.
    unsafe fn advance<F, E>(&self, transition: &F) -> Result<(), E>
    where
        F: Fn(T, T, T) -> Result<T, E>,
    {
        let phase = self.active_phase();
        let (current, next) = unsafe { (self.buffer(phase), self.buffer_mut(phase ^ 1)) };
        let len = current.len();
        for (out, cells) in next[1..len - 1].iter_mut().zip(current.windows(3)) {
            *out = transition(cells[0], cells[1], cells[2])?;
        }
        self.phase.store(phase ^ 1, Ordering::Relaxed);
        Ok(())
    }

    /// Refresh both ghost margins from the ring neighbors' core edges.
    ///
    /// # Safety
    /// Must run between the two barrier waits of an exchange.
    unsafe fn exchange(&self, left: &Self, right: &Self) {
        let m = self.margin;
        let w = self.partition.width;
        let own = self.active_phase();
        let left_phase = left.active_phase();
        let right_phase = right.active_phase();
        let left_width = left.partition.width;

        for i in 0..m {
            unsafe {
                *self.cell_ptr(own, i) = *left.cell_ptr(left_phase, left_width + i);
                *self.cell_ptr(own, m + w + i) = *right.cell_ptr(right_phase, m + i);
            }
        }
    }

    /// Core cells of the active buffer. Only valid once every thread is joined.
    pub fn core(&mut self) -> &[T] {
        let phase = *self.phase.get_mut();
        let start = self.margin;
        let end = start + self.partition.width;
        // SAFETY: `&mut self` rules out concurrent access.
        unsafe { &self.buffer(phase)[start..end] }
    }
}

/// Arena of workers for a single run plus the barrier they share.
pub struct WorkerRing<T> {
    workers: Vec<PartitionWorker<T>>,
    barrier: Barrier,
    block_len: u64,
}

impl<T: Copy + Default + Send + Sync> WorkerRing<T> {
    pub fn new(field: &[T], plan: &PartitionPlan) -> Self {
        let count = plan.worker_count();
        let margin = plan.margin();
        let workers = plan
            .partitions
            .iter()
            .map(|&partition| PartitionWorker::new(partition, margin, count, field))
            .collect();
        Self {
            workers,
            barrier: Barrier::new(count),
            block_len: plan.block_len(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn barrier(&self) -> &Barrier {
        &self.barrier
    }

    /// Drive worker `index` through `generations`, exchanging halos after
    /// every block of `block_len` generations.
    ///
    /// Every worker of the ring must be driven concurrently on its own thread.
    pub fn run_worker<F, E>(
        &self,
        index: usize,
        transition: &F,
        generations: u64,
    ) -> Result<(), WorkerHalt<E>>
    where
        F: Fn(T, T, T) -> Result<T, E>,
    {
        let worker = &self.workers[index];
        let (left, right) = worker.neighbors();
        let (left, right) = (&self.workers[left], &self.workers[right]);

        let full_blocks = generations / self.block_len;
        let remainder = generations % self.block_len;
        let blocks = std::iter::repeat_n(self.block_len, full_blocks as usize)
            .chain((remainder > 0).then_some(remainder));

        let mut completed = 0u64;
        for (block, steps) in blocks.enumerate() {
            for _ in 0..steps {
                // SAFETY: between the second wait of the previous exchange and the
                // first wait of the next one, nobody else touches these buffers.
                unsafe { worker.advance(transition) }.map_err(|error| WorkerHalt::Transition {
                    generation: completed + 1,
                    error,
                })?;
                completed += 1;
            }

            self.barrier.wait()?;
            // SAFETY: every worker has finished computing this block and none
            // may start the next one until the second wait below.
            unsafe { worker.exchange(left, right) };
            self.barrier.wait()?;
            trace!(partition = index, block, completed, "halo exchange complete");
        }
        Ok(())
    }

    /// Copy every worker's core back into `field`.
    pub fn copy_back(mut self, field: &mut [T]) {
        for worker in &mut self.workers {
            let partition = worker.partition();
            field[partition.start..partition.end()].copy_from_slice(worker.core());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::thread;

    use super::WorkerRing;
    use crate::torus::partition::{PartitionPlan, plan_partitions};

    fn ring_plan(len: usize, workers: usize, ghost_width: usize) -> PartitionPlan {
        PartitionPlan {
            partitions: plan_partitions(len, workers),
            ghost_width,
        }
    }

    fn drive<F>(ring: &WorkerRing<u32>, transition: F, generations: u64)
    where
        F: Fn(u32, u32, u32) -> Result<u32, Infallible> + Sync,
    {
        thread::scope(|s| {
            for index in 0..ring.len() {
                let transition = &transition;
                s.spawn(move || ring.run_worker(index, transition, generations).expect("run"));
            }
        });
    }

    #[test]
    fn workers_are_linked_as_a_ring() {
        let field: Vec<u32> = (0..12).collect();
        let ring = WorkerRing::new(&field, &ring_plan(12, 4, 1));
        let links: Vec<_> = ring.workers.iter().map(|w| w.neighbors()).collect();
        assert_eq!(links, vec![(3, 1), (0, 2), (1, 3), (2, 0)]);
    }

    #[test]
    fn seeded_window_wraps_around_the_field() {
        let field: Vec<u32> = (0..10).collect();
        let ring = WorkerRing::new(&field, &ring_plan(10, 2, 2));
        let first = unsafe { ring.workers[0].buffer(0) };
        assert_eq!(first, &[8, 9, 0, 1, 2, 3, 4, 5, 6]);
        let second = unsafe { ring.workers[1].buffer(0) };
        assert_eq!(second, &[3, 4, 5, 6, 7, 8, 9, 0, 1]);
    }

    #[test]
    fn identity_transition_leaves_field_untouched() {
        let field: Vec<u32> = (0..23).map(|i| i * 7 % 5).collect();
        let ring = WorkerRing::new(&field, &ring_plan(23, 3, 3));
        drive(&ring, |_, c, _| Ok(c), 10);

        let mut out = vec![0; field.len()];
        ring.copy_back(&mut out);
        assert_eq!(out, field);
    }

    #[test]
    fn shift_right_moves_every_cell_across_partitions() {
        let field: Vec<u32> = (0..16).collect();
        let generations = 5u64;
        let ring = WorkerRing::new(&field, &ring_plan(16, 4, 1));
        drive(&ring, |l, _, _| Ok(l), generations);

        let mut out = vec![0; field.len()];
        ring.copy_back(&mut out);
        let expected: Vec<u32> = (0..16)
            .map(|i| field[(i + 16 - generations as usize) % 16])
            .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn transition_error_reports_the_failing_generation() {
        let field = vec![0u32; 8];
        let ring = WorkerRing::new(&field, &ring_plan(8, 1, 3));
        let halt = ring
            .run_worker(0, &|_, c, _| if c >= 4 { Err("overflow") } else { Ok(c + 1) }, 10)
            .expect_err("must fail");
        match halt {
            super::WorkerHalt::Transition { generation, error } => {
                assert_eq!(generation, 5);
                assert_eq!(error, "overflow");
            }
            other => panic!("unexpected halt: {other:?}"),
        }
    }
}
