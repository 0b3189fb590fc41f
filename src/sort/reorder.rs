//! Reorder phase: scatter pairs to their resolved positions.
//!
//! The output range of digit `d` is laid out block by block, so the region an
//! element can land in is fixed by `(d, block)`. The output buffers are cut
//! into those regions up front, which gives every block exclusive `&mut`
//! access to the four regions it writes and lets the blocks run in parallel
//! without any shared writes.

use rayon::prelude::*;

use super::{digit, Lanes, RADIX};

/// Read side of a pass.
pub struct Source<'a> {
    /// Keys entering the pass (real elements only).
    pub keys: &'a [u32],
    /// Satellite indices, aligned with `keys`.
    pub values: &'a [u32],
    /// Block-local exclusive scans from the block-scan phase.
    pub local: &'a [Lanes],
}

/// Resolved scan state of a pass.
pub struct Placement<'a> {
    /// Elements per block.
    pub block_size: usize,
    /// Start of each digit's output range.
    pub base: Lanes,
    /// Per-block digit counts, padding included.
    pub block_totals: &'a [Lanes],
    /// Per-block offsets within each digit range.
    pub block_offsets: &'a [Lanes],
}

/// Cut `out` into one region per `(block, digit)`.
///
/// Regions are taken in output order (digit-major). Padding only ever sits at
/// the very end of the last block's digit-3 region, so that region is
/// trimmed to what is left of `out`.
fn regions<'a>(out: &'a mut [u32], placement: &Placement<'_>) -> Vec<[&'a mut [u32]; RADIX]> {
    let mut regions: Vec<[&mut [u32]; RADIX]> = (0..placement.block_totals.len())
        .map(|_| Default::default())
        .collect();

    let total = out.len();
    let mut rest = out;
    for d in 0..RADIX {
        for (block, totals) in placement.block_totals.iter().enumerate() {
            debug_assert_eq!(
                total - rest.len(),
                (placement.base[d] + placement.block_offsets[block][d]) as usize
            );
            let size = (totals[d] as usize).min(rest.len());
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(size);
            regions[block][d] = head;
            rest = tail;
        }
    }
    debug_assert!(rest.is_empty());
    regions
}

/// Write every `(key, value)` pair of `source` to
/// `base[d] + block_offset[block][d] + local[i][d]` in `keys_out`/`values_out`.
pub fn scatter(
    source: Source<'_>,
    placement: Placement<'_>,
    shift: u32,
    keys_out: &mut [u32],
    values_out: &mut [u32],
) {
    debug_assert_eq!(source.keys.len(), keys_out.len());
    debug_assert_eq!(source.values.len(), values_out.len());

    let key_regions = regions(keys_out, &placement);
    let value_regions = regions(values_out, &placement);
    let block_size = placement.block_size;

    key_regions
        .into_par_iter()
        .zip(value_regions)
        .zip(source.keys.par_chunks(block_size))
        .zip(source.values.par_chunks(block_size))
        .zip(source.local.par_chunks(block_size))
        .for_each(|((((mut key_dst, mut value_dst), keys), values), local)| {
            for ((&key, &value), lanes) in keys.iter().zip(values).zip(local) {
                let d = digit(key, shift);
                let slot = lanes[d] as usize;
                key_dst[d][slot] = key;
                value_dst[d][slot] = value;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::block_scan::scan_blocks;
    use crate::sort::flags::flag_digits;
    use crate::sort::resolve::resolve_offsets;

    fn one_pass(keys: &[u32], block_size: usize) -> (Vec<u32>, Vec<u32>) {
        let padded = keys.len().div_ceil(block_size) * block_size;
        let blocks = padded / block_size;
        let mut flags = vec![[0; RADIX]; padded];
        let mut local = vec![[0; RADIX]; padded];
        let mut totals = vec![[0; RADIX]; blocks];
        let mut offsets = vec![[0; RADIX]; blocks];

        flag_digits(keys, 0, &mut flags);
        scan_blocks(&flags, block_size, &mut local, &mut totals);
        let base = resolve_offsets(&totals, &mut offsets);

        let values: Vec<u32> = (0..keys.len() as u32).collect();
        let mut keys_out = vec![u32::MAX; keys.len()];
        let mut values_out = vec![u32::MAX; keys.len()];
        scatter(
            Source { keys, values: &values, local: &local },
            Placement { block_size, base, block_totals: &totals, block_offsets: &offsets },
            0,
            &mut keys_out,
            &mut values_out,
        );
        (keys_out, values_out)
    }

    #[test]
    fn test_scatter_one_digit() {
        let (keys, values) = one_pass(&[1, 3, 2, 0, 1, 0, 2, 2], 4);
        assert_eq!(keys, vec![0, 0, 1, 1, 2, 2, 2, 3]);
        assert_eq!(values, vec![3, 5, 0, 4, 2, 6, 7, 1]);
    }

    #[test]
    fn test_scatter_skips_padding() {
        // 3 real elements in a block of 8: five sentinel slots never written
        let (keys, values) = one_pass(&[3, 0, 3], 8);
        assert_eq!(keys, vec![0, 3, 3]);
        assert_eq!(values, vec![1, 0, 2]);
    }
}
