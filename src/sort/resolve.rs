//! Cross-block resolve.
//!
//! Turns per-block totals into the offset of each block within its digit's
//! output range, and each digit's range start. The block count is small
//! compared to the element count, so this runs as a single sequential scan.

use super::{add_counter, Lanes, RADIX};

/// Exclusive scan of `block_totals` per lane into `block_offsets`.
///
/// Returns the digit bases: `base[d]` is the number of elements (padding
/// included) with a digit smaller than `d`.
pub fn resolve_offsets(block_totals: &[Lanes], block_offsets: &mut [Lanes]) -> Lanes {
    debug_assert_eq!(block_totals.len(), block_offsets.len());

    let mut running: Lanes = [0; RADIX];
    for (total, offset) in block_totals.iter().zip(block_offsets.iter_mut()) {
        *offset = running;
        for (sum, &t) in running.iter_mut().zip(total) {
            *sum = add_counter(*sum, t);
        }
    }

    let mut base: Lanes = [0; RADIX];
    let mut acc = 0;
    for (b, count) in base.iter_mut().zip(running) {
        *b = acc;
        acc = add_counter(acc, count);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_bases() {
        let totals = vec![[1, 1, 1, 1], [1, 1, 2, 0], [0, 2, 0, 2]];
        let mut offsets = vec![[0; RADIX]; 3];
        let base = resolve_offsets(&totals, &mut offsets);

        assert_eq!(offsets, vec![[0, 0, 0, 0], [1, 1, 1, 1], [2, 2, 3, 1]]);
        // digit counts are 2, 4, 3, 3
        assert_eq!(base, [0, 2, 6, 9]);
    }
}
