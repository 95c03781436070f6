//! The fountain sink: accumulates combinations and runs Gauss-Jordan
//! elimination over GF(2⁸) as each new one arrives, decoding blocks
//! as their rows reduce to a single unit component
//! (`spec.md` §4.6 "Fountain sink").

use crate::combination::Combination;

/// Accumulates combinations for one target's `[first, last]` block
/// range and decodes blocks as elimination makes them available.
///
/// Invariant (checked informally by the elimination loop, not
/// enforced by the type): after each [`Sink::solve`], the retained
/// combinations are in row-echelon form with no zero rows, ordered by
/// increasing leading component.
pub struct Sink {
    combinations: Vec<Combination>,
    /// One past the highest block index any retained combination's
    /// leading component has reached.
    next_seen: u64,
    /// One past the highest block index fully decoded so far. Only
    /// ever increases (`spec.md` §5 "Ordering guarantees").
    next_decoded: u64,
}

impl Sink {
    /// Creates a sink starting at block index 0.
    pub fn new() -> Self {
        Sink {
            combinations: Vec::new(),
            next_seen: 0,
            next_decoded: 0,
        }
    }

    /// The next block index not yet decoded.
    pub fn next_decoded(&self) -> u64 {
        self.next_decoded
    }

    /// Feeds one incoming combination to the sink, running
    /// elimination and returning every block newly decoded by this
    /// call, in increasing index order.
    pub fn solve(&mut self, incoming: Combination) -> Vec<(u64, Vec<u8>)> {
        self.combinations.push(incoming);

        // Suppress components already fully decoded by earlier calls:
        // this keeps the system from re-deriving the same pivot and
        // matches the elimination loop's "use known combinations to
        // reduce incoming vectors before pivoting".
        if let (Some(&first), Some(&last)) = (
            self.combinations.iter().map(Combination::first_component).min().as_ref(),
            self.combinations.iter().map(Combination::last_component).max().as_ref(),
        ) {
            for i in first..=last {
                if i >= self.next_decoded {
                    continue;
                }
                let Some(known) = self.decoded_row(i) else { continue };
                for row in &mut self.combinations {
                    let c = row.coeff(i);
                    if c != 0 {
                        row.add_scaled(&known, c);
                    }
                }
            }
        }

        self.eliminate();
        self.extract_decoded()
    }

    fn decoded_row(&self, index: u64) -> Option<Combination> {
        self.combinations
            .iter()
            .find(|row| row.is_decoded() && row.first_component() == index)
            .cloned()
    }

    fn eliminate(&mut self) {
        let mut pivot_row = 0usize;
        // Candidate pivot columns: every component index that appears
        // anywhere, visited in increasing order.
        let mut columns: Vec<u64> = self
            .combinations
            .iter()
            .flat_map(|c| {
                let first = c.first_component();
                let count = c.components_count();
                (first..first + count).collect::<Vec<_>>()
            })
            .collect();
        columns.sort_unstable();
        columns.dedup();

        for column in columns {
            if pivot_row >= self.combinations.len() {
                break;
            }
            let Some(found) = (pivot_row..self.combinations.len())
                .find(|&r| self.combinations[r].coeff(column) != 0)
            else {
                continue;
            };
            self.combinations.swap(pivot_row, found);

            let pivot_coeff = self.combinations[pivot_row].coeff(column);
            if pivot_coeff != 1 {
                self.combinations[pivot_row].div_assign(pivot_coeff);
            }

            let pivot = self.combinations[pivot_row].clone();
            for (r, row) in self.combinations.iter_mut().enumerate() {
                if r == pivot_row {
                    continue;
                }
                let c = row.coeff(column);
                if c != 0 {
                    row.add_scaled(&pivot, c);
                }
            }
            pivot_row += 1;
        }

        self.combinations.retain(|c| c.components_count() > 0);
    }

    fn extract_decoded(&mut self) -> Vec<(u64, Vec<u8>)> {
        let mut decoded = Vec::new();
        loop {
            let mut progressed = false;
            let mut i = 0;
            while i < self.combinations.len() {
                let first = self.combinations[i].first_component();
                if first >= self.next_seen {
                    self.next_seen = first + 1;
                }
                if first == self.next_decoded && self.combinations[i].components_count() == 1 {
                    let row = self.combinations.remove(i);
                    decoded.push((first, row.decoded_data().to_vec()));
                    self.next_decoded = first + 1;
                    progressed = true;
                    continue;
                }
                i += 1;
            }
            if !progressed {
                break;
            }
        }
        decoded
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_single_uncoded_block_decodes_immediately() {
        let mut sink = Sink::new();
        let decoded = sink.solve(Combination::from_block(0, b"hello"));
        assert_eq!(decoded, vec![(0, b"hello".to_vec())]);
        assert_eq!(sink.next_decoded(), 1);
    }

    #[test]
    fn two_coded_combinations_of_two_blocks_decode_both() {
        let a = Combination::from_block(0, b"aaaa");
        let b = Combination::from_block(1, b"bbbb");

        // c1 = a + b, c2 = a + 2*b (coeff chosen nonzero != 1)
        let mut c1 = a.clone();
        c1.add_assign(&b);
        let mut scaled_b = b.clone();
        scaled_b.scale_assign(2);
        let mut c2 = a.clone();
        c2.add_assign(&scaled_b);

        let mut sink = Sink::new();
        let first = sink.solve(c1);
        assert!(first.is_empty(), "a single coded equation must not decode anything yet");
        let second = sink.solve(c2);

        let mut got: Vec<u64> = second.iter().map(|(i, _)| *i).collect();
        got.sort();
        assert_eq!(got, vec![0, 1]);
        assert_eq!(sink.next_decoded(), 2);
    }

    #[test]
    fn redundant_combination_after_full_decode_is_a_no_op() {
        let mut sink = Sink::new();
        sink.solve(Combination::from_block(0, b"x"));
        let decoded = sink.solve(Combination::from_block(0, b"x"));
        assert!(decoded.is_empty());
        assert_eq!(sink.next_decoded(), 1);
    }
}
