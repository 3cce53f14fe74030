//! Bit twiddling used by the cell-code calculator and the BVH build: a
//! 32-bit leading-zero count and the Morton (Z-order) bit interleave.

/// Number of zero bits above the most significant 1-bit. 32 if `x == 0`, 0 if
/// the high bit is set.
///
/// `u32::leading_zeros` is the single-call standard-library equivalent; this
/// binary-search-over-halves ladder is kept because it's the form the
/// original implementation specifies bit-for-bit and because the same
/// halving idiom underlies `spread10`/`spread16` below.
#[inline]
pub fn count_leading_zeros32(x: u32) -> u32 {
    if x == 0 {
        return 32;
    }
    let mut x = x;
    let mut n = 0;
    if x <= 0x0000_ffff { n += 16; x <<= 16; }
    if x <= 0x00ff_ffff { n += 8; x <<= 8; }
    if x <= 0x0fff_ffff { n += 4; x <<= 4; }
    if x <= 0x3fff_ffff { n += 2; x <<= 2; }
    if x <= 0x7fff_ffff { n += 1; }
    n
}

/// Spreads the low 10 bits of `x` out so that each bit is separated by two
/// zero bits, e.g. `----------------------abcdefghij` becomes
/// `--a--b--c--d--e--f--g--h--i--j-`. Used to build 3-way (30-bit) Morton
/// codes.
#[inline]
fn spread10(x: u32) -> u32 {
    let mut x = x & 0x3ff;
    x = (x | (x << 16)) & 0x0300_00ff;
    x = (x | (x << 8)) & 0x0300_f00f;
    x = (x | (x << 4)) & 0x030c_30c3;
    x = (x | (x << 2)) & 0x0924_9249;
    x
}

/// Spreads the low 16 bits of `x` out so that each bit is separated by one
/// zero bit. Used to build 2-way (32-bit) Morton codes.
#[inline]
fn spread16(x: u32) -> u32 {
    let mut x = x & 0xffff;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Interleaves the low 10 bits of `x`, `y`, `z` into a 30-bit Morton code,
/// with a **non-standard axis order**: `y` occupies the lowest bit of each
/// triplet, `x` the middle, `z` the highest.
///
/// Gravity-aligned scenes tend to cluster along the y-axis; placing y in the
/// low bits maximizes code divergence across objects that share a y value,
/// which improves the quality of the Morton sort the BVH build relies on.
/// This axis order must be preserved bit-for-bit — it participates directly
/// in the leading-zero-divergence BVH split.
#[inline]
pub fn calc_morton_code32(x: u32, y: u32, z: u32) -> u32 {
    spread10(y) | (spread10(x) << 1) | (spread10(z) << 2)
}

/// Interleaves the low 16 bits of `x`, `y` into a 32-bit Morton code, with
/// `y` in the low bit of each pair.
#[inline]
pub fn calc_morton_code32_2d(x: u32, y: u32) -> u32 {
    spread16(y) | (spread16(x) << 1)
}
