//! Partition sizing and wraparound index helpers.

/// Contiguous core range `[start, start + width)` owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub start: usize,
    pub width: usize,
}

impl Partition {
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.width
    }
}

/// Layout of a single run: how the field is tiled and how wide the halos are.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partitions: Vec<Partition>,
    /// Generations a worker may advance between exchanges. Zero means the
    /// partitions are too narrow to batch and every generation is exchanged.
    pub ghost_width: usize,
}

impl PartitionPlan {
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.partitions.len()
    }

    /// Halo cells allocated on each side of every worker's core.
    #[inline]
    pub fn margin(&self) -> usize {
        self.ghost_width.max(1)
    }

    /// Generations computed locally between two exchanges.
    #[inline]
    pub fn block_len(&self) -> u64 {
        self.margin() as u64
    }

    #[inline]
    pub fn min_width(&self) -> usize {
        self.partitions.iter().map(|p| p.width).min().unwrap_or(0)
    }
}

/// Normalize any signed index into `[0, len)`.
#[inline]
pub fn wrap_index(index: i64, len: usize) -> usize {
    debug_assert!(len > 0);
    index.rem_euclid(len as i64) as usize
}

/// Split `len` cells into `workers` contiguous partitions.
///
/// Widths differ by at most one; the first `len % workers` partitions take
/// the extra cell. `workers` must already be clamped to `[1, len]`.
pub fn plan_partitions(len: usize, workers: usize) -> Vec<Partition> {
    debug_assert!(workers >= 1 && workers <= len);
    let base = len / workers;
    let extra = len % workers;
    let mut start = 0;
    (0..workers)
        .map(|index| {
            let width = base + usize::from(index < extra);
            let partition = Partition {
                index,
                start,
                width,
            };
            start += width;
            partition
        })
        .collect()
}

/// Largest ghost width that keeps every core cell exact between exchanges.
#[inline]
pub fn max_safe_ghost_width(min_width: usize) -> usize {
    min_width.saturating_sub(1) / 2
}

/// `min(floor((min_width - 1) / 2), requested)`.
#[inline]
pub fn safe_ghost_width(min_width: usize, requested: usize) -> usize {
    max_safe_ghost_width(min_width).min(requested)
}
