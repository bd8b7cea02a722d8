//! 4-lane `f32` vector abstraction for the correntropy kernel.
//!
//! Two interchangeable backends: SSE intrinsics (x86-64 with SSSE3, needed
//! for the lane-extract shuffle) and a scalar fallback.  Lanes are written
//! LSE-first: `lshift_extract([a b c d], [e f g h], 1) == [b c d e]`.

#[cfg(all(target_arch = "x86_64", target_feature = "ssse3"))]
pub use sse::*;

#[cfg(not(all(target_arch = "x86_64", target_feature = "ssse3")))]
pub use scalar::*;

#[cfg(not(all(target_arch = "x86_64", target_feature = "ssse3")))]
mod scalar {
    pub fn backend_name() -> &'static str {
        "scalar"
    }

    #[derive(Debug, Clone, Copy)]
    #[repr(C, align(16))]
    pub struct F32x4(pub(crate) [f32; 4]);

    #[inline]
    pub fn load(p: &[f32]) -> F32x4 {
        F32x4([p[0], p[1], p[2], p[3]])
    }

    #[inline]
    pub fn broadcast(scalar: f32) -> F32x4 {
        F32x4([scalar; 4])
    }

    #[inline]
    pub fn from_array(arr: [f32; 4]) -> F32x4 {
        F32x4(arr)
    }

    #[inline]
    pub fn to_array(a: F32x4) -> [f32; 4] {
        a.0
    }

    #[inline]
    pub fn add(a: F32x4, b: F32x4) -> F32x4 {
        F32x4([
            a.0[0] + b.0[0],
            a.0[1] + b.0[1],
            a.0[2] + b.0[2],
            a.0[3] + b.0[3],
        ])
    }

    #[inline]
    pub fn sub(a: F32x4, b: F32x4) -> F32x4 {
        F32x4([
            a.0[0] - b.0[0],
            a.0[1] - b.0[1],
            a.0[2] - b.0[2],
            a.0[3] - b.0[3],
        ])
    }

    #[inline]
    pub fn mul(a: F32x4, b: F32x4) -> F32x4 {
        F32x4([
            a.0[0] * b.0[0],
            a.0[1] * b.0[1],
            a.0[2] * b.0[2],
            a.0[3] * b.0[3],
        ])
    }

    /// Concatenates `[left, right]` and extracts 4 lanes starting `nlanes`
    /// in from the left.
    #[inline]
    pub fn lshift_extract(left: F32x4, right: F32x4, nlanes: usize) -> F32x4 {
        match nlanes {
            0 => left,
            1 => F32x4([left.0[1], left.0[2], left.0[3], right.0[0]]),
            2 => F32x4([left.0[2], left.0[3], right.0[0], right.0[1]]),
            3 => F32x4([left.0[3], right.0[0], right.0[1], right.0[2]]),
            _ => unreachable!("nlanes must be < 4"),
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "ssse3"))]
mod sse {
    use core::arch::x86_64::*;

    pub fn backend_name() -> &'static str {
        "sse"
    }

    #[derive(Clone, Copy)]
    pub struct F32x4(pub(crate) __m128);

    /// Loads 4 lanes from a 16-byte-aligned position.
    #[inline]
    pub fn load(p: &[f32]) -> F32x4 {
        debug_assert!(p.len() >= 4);
        debug_assert_eq!(p.as_ptr() as usize % 16, 0);
        unsafe { F32x4(_mm_load_ps(p.as_ptr())) }
    }

    #[inline]
    pub fn broadcast(scalar: f32) -> F32x4 {
        unsafe { F32x4(_mm_set1_ps(scalar)) }
    }

    #[inline]
    pub fn from_array(arr: [f32; 4]) -> F32x4 {
        unsafe { F32x4(_mm_loadu_ps(arr.as_ptr())) }
    }

    #[inline]
    pub fn to_array(a: F32x4) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        unsafe { _mm_storeu_ps(out.as_mut_ptr(), a.0) };
        out
    }

    #[inline]
    pub fn add(a: F32x4, b: F32x4) -> F32x4 {
        unsafe { F32x4(_mm_add_ps(a.0, b.0)) }
    }

    #[inline]
    pub fn sub(a: F32x4, b: F32x4) -> F32x4 {
        unsafe { F32x4(_mm_sub_ps(a.0, b.0)) }
    }

    #[inline]
    pub fn mul(a: F32x4, b: F32x4) -> F32x4 {
        unsafe { F32x4(_mm_mul_ps(a.0, b.0)) }
    }

    /// Concatenates `[left, right]` and extracts 4 lanes starting `nlanes`
    /// in from the left.
    #[inline]
    pub fn lshift_extract(left: F32x4, right: F32x4, nlanes: usize) -> F32x4 {
        unsafe {
            let int_l = _mm_castps_si128(left.0);
            let int_r = _mm_castps_si128(right.0);
            match nlanes {
                0 => left,
                1 => F32x4(_mm_castsi128_ps(_mm_alignr_epi8(int_r, int_l, 4))),
                2 => F32x4(_mm_castsi128_ps(_mm_alignr_epi8(int_r, int_l, 8))),
                3 => F32x4(_mm_castsi128_ps(_mm_alignr_epi8(int_r, int_l, 12))),
                _ => unreachable!("nlanes must be < 4"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_arithmetic() {
        let a = from_array([1.0, 2.0, 3.0, 4.0]);
        let b = from_array([4.0, 3.0, 2.0, 1.0]);
        assert_eq!(to_array(add(a, b)), [5.0; 4]);
        assert_eq!(to_array(sub(a, b)), [-3.0, -1.0, 1.0, 3.0]);
        assert_eq!(to_array(mul(a, b)), [4.0, 6.0, 6.0, 4.0]);
        assert_eq!(to_array(broadcast(7.0)), [7.0; 4]);
    }

    #[test]
    fn test_lshift_extract_lanes() {
        let left = from_array([1.0, 2.0, 3.0, 4.0]);
        let right = from_array([5.0, 6.0, 7.0, 8.0]);
        assert_eq!(to_array(lshift_extract(left, right, 0)), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(to_array(lshift_extract(left, right, 1)), [2.0, 3.0, 4.0, 5.0]);
        assert_eq!(to_array(lshift_extract(left, right, 2)), [3.0, 4.0, 5.0, 6.0]);
        assert_eq!(to_array(lshift_extract(left, right, 3)), [4.0, 5.0, 6.0, 7.0]);
    }
}
