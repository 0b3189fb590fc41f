//! Stable parallel LSD radix sort over 2-bit digits.
//!
//! Each pass orders the `(key, index)` pairs by one 2-bit digit, least
//! significant first. A pass is four phases, each a parallel-for whose join is
//! the barrier before the next:
//!
//! 1. **flags** ([`flags`]): one-hot `[u32; 4]` lane indicator of each
//!    element's digit.
//! 2. **block scan** ([`block_scan`]): exclusive prefix sum of each lane within
//!    each fixed-size block, plus each block's inclusive totals.
//! 3. **resolve** ([`resolve`]): exclusive scan of the block totals across
//!    blocks, and the global base of each digit.
//! 4. **reorder** ([`reorder`]): scatter every pair to
//!    `base[d] + block_offset[block][d] + local[i][d]`.
//!
//! Because the destination of an element only depends on the elements before
//! it, equal digits keep their order and the sort is stable. Keys and indices
//! live in [`PingPong`] buffers so a pass never writes what it reads.
//!
//! The element count does not have to be a multiple of the block size. The
//! tail block is padded virtually: positions past the end are flagged with
//! digit 3, so they land after every real element and are never written out.
//!
//! # Example
//!
//! ```ignore
//! let mut sorter = RadixSorter::new(keys.len(), 256, 1024)?;
//! let order = sorter.sort(&keys);
//! for &i in order {
//!     draw(particles[i as usize]);
//! }
//! ```

pub mod block_scan;
pub mod flags;
pub mod reorder;
pub mod resolve;

use rayon::prelude::*;

use crate::error::ConfigError;

/// Bits consumed per pass.
pub const DIGIT_BITS: u32 = 2;
/// Distinct digit values, and lanes per flag record.
pub const RADIX: usize = 1 << DIGIT_BITS;
/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: u32 = 256;
/// Largest block size; one block maps to one GPU workgroup.
pub const MAX_BLOCK_SIZE: u32 = 256;
/// Digit assigned to the virtual padding past the last element.
pub const SENTINEL_DIGIT: usize = RADIX - 1;

/// One counter per digit value.
pub type Lanes = [u32; RADIX];

/// Number of 2-bit passes needed for keys in `0..key_range`.
pub fn pass_count(key_range: u32) -> u32 {
    let bits = u32::BITS - key_range.saturating_sub(1).leading_zeros();
    bits.div_ceil(DIGIT_BITS).max(1)
}

/// The 2-bit digit of `key` starting at bit `shift`.
#[inline]
pub fn digit(key: u32, shift: u32) -> usize {
    ((key >> shift) & (RADIX as u32 - 1)) as usize
}

/// Add two scan counters. Overflow is a bug in the setup checks, so it is
/// only caught in debug builds.
#[inline]
pub(crate) fn add_counter(a: u32, b: u32) -> u32 {
    debug_assert!(a.checked_add(b).is_some(), "sort counter overflow: {} + {}", a, b);
    a.wrapping_add(b)
}

/// Two buffers of the same shape; one is read while the other is written.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    buffers: [T; 2],
    front: usize,
}

impl<T> PingPong<T> {
    /// Wrap two buffers; `a` starts as the front.
    pub fn new(a: T, b: T) -> Self {
        Self { buffers: [a, b], front: 0 }
    }

    /// The buffer holding the latest result.
    pub fn front(&self) -> &T {
        &self.buffers[self.front]
    }

    /// Mutable access to the front, for seeding a run.
    pub fn front_mut(&mut self) -> &mut T {
        &mut self.buffers[self.front]
    }

    /// Front for reading and back for writing, borrowed together.
    pub fn split(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.buffers;
        if self.front == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Make the back buffer the new front.
    pub fn swap(&mut self) {
        self.front ^= 1;
    }
}

/// CPU radix sorter with buffers sized for a fixed element count.
///
/// All scratch space is allocated once in [`RadixSorter::new`]; sorting does
/// not allocate.
#[derive(Clone, Debug)]
pub struct RadixSorter {
    len: usize,
    block_size: usize,
    key_range: u32,
    passes: u32,
    keys: PingPong<Vec<u32>>,
    values: PingPong<Vec<u32>>,
    flags: Vec<Lanes>,
    local: Vec<Lanes>,
    block_totals: Vec<Lanes>,
    block_offsets: Vec<Lanes>,
}

impl RadixSorter {
    /// Set up a sorter for exactly `len` keys in `0..key_range`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroParticles`] if `len` is zero
    /// - [`ConfigError::BlockSize`] unless `block_size` is a power of two no
    ///   larger than [`MAX_BLOCK_SIZE`]
    /// - [`ConfigError::TooManyElements`] if `len` padded to whole blocks
    ///   does not fit in a `u32`
    /// - [`ConfigError::ZeroKeyRange`] if `key_range` is zero
    pub fn new(len: usize, block_size: u32, key_range: u32) -> Result<Self, ConfigError> {
        let layout = BlockLayout::new(len, block_size)?;
        if key_range == 0 {
            return Err(ConfigError::ZeroKeyRange);
        }

        let passes = pass_count(key_range);
        log::debug!(
            "RadixSorter: {} keys, {} blocks of {}, {} passes",
            len,
            layout.num_blocks,
            block_size,
            passes
        );

        Ok(Self {
            len,
            block_size: block_size as usize,
            key_range,
            passes,
            keys: PingPong::new(vec![0; len], vec![0; len]),
            values: PingPong::new(vec![0; len], vec![0; len]),
            flags: vec![[0; RADIX]; layout.padded_len],
            local: vec![[0; RADIX]; layout.padded_len],
            block_totals: vec![[0; RADIX]; layout.num_blocks],
            block_offsets: vec![[0; RADIX]; layout.num_blocks],
        })
    }

    /// Number of keys each call must supply.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a sorter holds at least one element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements per block.
    pub fn block_size(&self) -> u32 {
        self.block_size as u32
    }

    /// Exclusive upper bound on accepted keys.
    pub fn key_range(&self) -> u32 {
        self.key_range
    }

    /// Radix passes per sort.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Sort and return the permutation: `keys[perm[0]] <= keys[perm[1]] <= ...`.
    ///
    /// # Panics
    ///
    /// Panics if `keys.len()` differs from [`RadixSorter::len`].
    pub fn sort(&mut self, keys: &[u32]) -> &[u32] {
        self.run(keys);
        self.values.front()
    }

    /// Sort and return `(sorted keys, permutation)`.
    ///
    /// # Panics
    ///
    /// Panics if `keys.len()` differs from [`RadixSorter::len`].
    pub fn sort_pairs(&mut self, keys: &[u32]) -> (&[u32], &[u32]) {
        self.run(keys);
        (self.keys.front(), self.values.front())
    }

    /// Permutation from the most recent sort.
    pub fn permutation(&self) -> &[u32] {
        self.values.front()
    }

    /// Global destination rows of one pass, for inspection.
    ///
    /// Row `d` holds, for every element `i`, the position an element with
    /// digit `d` at index `i` would be written to:
    /// `base[d] + block_offset[block(i)][d] + local[i][d]`. Rows are computed
    /// for digit `pass` of `keys` as given; the sorter's buffers are left
    /// holding that pass's scan state.
    ///
    /// # Panics
    ///
    /// Panics if `keys.len()` differs from [`RadixSorter::len`].
    pub fn lane_positions(&mut self, keys: &[u32], pass: u32) -> [Vec<u32>; RADIX] {
        self.check_len(keys);
        let shift = pass * DIGIT_BITS;
        flags::flag_digits(keys, shift, &mut self.flags);
        block_scan::scan_blocks(&self.flags, self.block_size, &mut self.local, &mut self.block_totals);
        let base = resolve::resolve_offsets(&self.block_totals, &mut self.block_offsets);

        let local = &self.local;
        let offsets = &self.block_offsets;
        let block_size = self.block_size;
        std::array::from_fn(|d| {
            (0..self.len)
                .into_par_iter()
                .map(|i| base[d] + offsets[i / block_size][d] + local[i][d])
                .collect()
        })
    }

    fn check_len(&self, keys: &[u32]) {
        assert_eq!(
            keys.len(),
            self.len,
            "RadixSorter was built for {} keys",
            self.len
        );
    }

    fn run(&mut self, keys: &[u32]) {
        self.check_len(keys);
        debug_assert!(
            keys.iter().all(|&k| k < self.key_range),
            "key outside 0..{}",
            self.key_range
        );

        self.keys.front_mut().copy_from_slice(keys);
        self.values
            .front_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, v)| *v = i as u32);

        for pass in 0..self.passes {
            let shift = pass * DIGIT_BITS;
            let (keys_in, keys_out) = self.keys.split();
            let (values_in, values_out) = self.values.split();

            flags::flag_digits(keys_in, shift, &mut self.flags);
            block_scan::scan_blocks(&self.flags, self.block_size, &mut self.local, &mut self.block_totals);
            let base = resolve::resolve_offsets(&self.block_totals, &mut self.block_offsets);
            reorder::scatter(
                reorder::Source { keys: keys_in, values: values_in, local: &self.local },
                reorder::Placement {
                    block_size: self.block_size,
                    base,
                    block_totals: &self.block_totals,
                    block_offsets: &self.block_offsets,
                },
                shift,
                keys_out,
                values_out,
            );

            self.keys.swap();
            self.values.swap();
        }
    }
}

/// Block partition of a padded element range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    /// Real elements.
    pub len: usize,
    /// Elements per block.
    pub block_size: usize,
    /// Blocks covering `len`.
    pub num_blocks: usize,
    /// `num_blocks * block_size`.
    pub padded_len: usize,
}

impl BlockLayout {
    /// Validate `len` and `block_size` and compute the padded layout.
    pub fn new(len: usize, block_size: u32) -> Result<Self, ConfigError> {
        if len == 0 {
            return Err(ConfigError::ZeroParticles);
        }
        if block_size == 0 || !block_size.is_power_of_two() || block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSize(block_size));
        }
        let block = block_size as usize;
        let num_blocks = len.div_ceil(block);
        let padded_len = num_blocks
            .checked_mul(block)
            .filter(|&p| p <= u32::MAX as usize)
            .ok_or(ConfigError::TooManyElements { len, block_size })?;
        Ok(Self {
            len,
            block_size: block,
            num_blocks,
            padded_len,
        })
    }
}

/// Sort `keys` in `0..key_range` with the default block size and return the
/// permutation. Empty input gives an empty permutation.
pub fn radix_sort(keys: &[u32], key_range: u32) -> Result<Vec<u32>, ConfigError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let mut sorter = RadixSorter::new(keys.len(), DEFAULT_BLOCK_SIZE, key_range)?;
    Ok(sorter.sort(keys).to_vec())
}
