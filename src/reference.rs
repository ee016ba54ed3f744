//! Sequential evaluator used as the correctness oracle for the parallel engine.

/// Plain double-buffered ring evaluated on the calling thread, with no
/// partitioning and no ghost cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequentialRing<T> {
    current: Vec<T>,
    next: Vec<T>,
    generation: u64,
}

impl<T: Copy + Default> SequentialRing<T> {
    pub fn new(cells: Vec<T>) -> Self {
        let next = vec![T::default(); cells.len()];
        Self {
            current: cells,
            next,
            generation: 0,
        }
    }

    pub fn step<F: Fn(T, T, T) -> T>(&mut self, transition: &F) {
        let n = self.current.len();
        if n == 0 {
            return;
        }
        for i in 0..n {
            let left = self.current[(i + n - 1) % n];
            let right = self.current[(i + 1) % n];
            self.next[i] = transition(left, self.current[i], right);
        }
        std::mem::swap(&mut self.current, &mut self.next);
        self.generation += 1;
    }

    pub fn step_n<F: Fn(T, T, T) -> T>(&mut self, transition: &F, n: u64) {
        for _ in 0..n {
            self.step(transition);
        }
    }

    pub fn cells(&self) -> &[T] {
        &self.current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::SequentialRing;

    #[test]
    fn shift_wraps_around() {
        let mut ring = SequentialRing::new(vec![1, 2, 3, 4]);
        ring.step_n(&|l, _, _| l, 3);
        assert_eq!(ring.cells(), &[2, 3, 4, 1]);
        assert_eq!(ring.generation(), 3);
    }

    #[test]
    fn single_cell_sees_itself_on_both_sides() {
        let mut ring = SequentialRing::new(vec![5u32]);
        ring.step(&|l, c, r| l + c + r);
        assert_eq!(ring.cells(), &[15]);
    }
}
