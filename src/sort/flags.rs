//! Flag phase: one-hot digit indicators.

use rayon::prelude::*;

use super::{digit, Lanes, RADIX, SENTINEL_DIGIT};

/// One-hot lane record for digit `d`.
#[inline]
pub fn one_hot(d: usize) -> Lanes {
    let mut lanes = [0; RADIX];
    lanes[d] = 1;
    lanes
}

/// Write the digit indicator of every element of `keys` at `shift`.
///
/// `flags` may be longer than `keys`; the extra slots are padding and are
/// flagged with [`SENTINEL_DIGIT`].
pub fn flag_digits(keys: &[u32], shift: u32, flags: &mut [Lanes]) {
    debug_assert!(flags.len() >= keys.len());
    flags.par_iter_mut().enumerate().for_each(|(i, flag)| {
        let d = match keys.get(i) {
            Some(&key) => digit(key, shift),
            None => SENTINEL_DIGIT,
        };
        *flag = one_hot(d);
    });
}
