//! Binary transition rules for the demo drivers and tests.

/// Wolfram-numbered elementary automaton, stored as an 8-entry lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementaryRule {
    table: [bool; 8],
}

impl ElementaryRule {
    pub fn new(number: u8) -> Self {
        let mut table = [false; 8];
        for (pattern, out) in table.iter_mut().enumerate() {
            *out = (number >> pattern) & 1 == 1;
        }
        Self { table }
    }

    pub fn number(&self) -> u8 {
        self.table
            .iter()
            .enumerate()
            .fold(0u8, |acc, (pattern, &out)| acc | (u8::from(out) << pattern))
    }

    #[inline(always)]
    pub fn apply(&self, left: bool, center: bool, right: bool) -> bool {
        let pattern = (usize::from(left) << 2) | (usize::from(center) << 1) | usize::from(right);
        self.table[pattern]
    }
}

/// Next state is whatever at least two of the three cells agree on.
#[inline(always)]
pub fn majority(left: bool, center: bool, right: bool) -> bool {
    (left && center) || (center && right) || (left && right)
}
