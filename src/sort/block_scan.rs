//! Block-local scan.
//!
//! Every block is scanned independently, lane by lane: `local[i]` receives
//! the count of each digit among the elements of its block before `i`, and
//! the block's total count lands in `block_totals`.

use rayon::prelude::*;

use super::{add_counter, Lanes};

/// Exclusive per-lane prefix sums of `flags` within blocks of `block_size`.
///
/// `flags` and `local` hold a whole number of blocks; `block_totals` has one
/// entry per block.
pub fn scan_blocks(flags: &[Lanes], block_size: usize, local: &mut [Lanes], block_totals: &mut [Lanes]) {
    debug_assert_eq!(flags.len(), local.len());
    debug_assert_eq!(flags.len(), block_totals.len() * block_size);

    local
        .par_chunks_mut(block_size)
        .zip(flags.par_chunks(block_size))
        .zip(block_totals.par_iter_mut())
        .for_each(|((local, flags), total)| {
            let mut running: Lanes = [0; super::RADIX];
            for (out, flag) in local.iter_mut().zip(flags) {
                *out = running;
                for (sum, &f) in running.iter_mut().zip(flag) {
                    *sum = add_counter(*sum, f);
                }
            }
            *total = running;
        });
}
