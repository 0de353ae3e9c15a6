pub const ZSTD_MAX_COMPRESSION_LVL: u32 = 22;
pub const ZSTD_DEFAULT_COMPRESSION_LVL: u32 = 3;
pub const ZSTD_DEFAULT_WORKERS: u32 = 3;

#[inline]
pub(crate) fn clamp_u8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

#[inline]
pub(crate) fn quantize_sh(x: f32, bucket_size: i32) -> u8 {
    let q = (x * 128.0).round() as i32 + 128;
    let q = ((q + bucket_size / 2) / bucket_size) * bucket_size;
    q.clamp(0, 255) as u8
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Number of SH coefficients per colour channel for a degree.
#[inline]
pub fn dim_for_degree(deg: u8) -> usize {
    match deg {
        0 => 0,
        1 => 3,
        2 => 8,
        3 => 15,
        _ => 0,
    }
}

#[inline]
pub(crate) const fn degree_for_dim(dim: usize) -> u8 {
    if dim < 3 {
        0
    } else if dim < 8 {
        1
    } else if dim < 15 {
        2
    } else {
        3
    }
}

#[inline]
pub(crate) fn normalize_quat(q: (f32, f32, f32, f32)) -> (f32, f32, f32, f32) {
    let norm = (q.0 * q.0 + q.1 * q.1 + q.2 * q.2 + q.3 * q.3).sqrt();
    (q.0 / norm, q.1 / norm, q.2 / norm, q.3 / norm)
}

#[inline]
pub(crate) const fn times_quat(a: (f32, f32, f32, f32), s: f32) -> (f32, f32, f32, f32) {
    ((a.0 * s), (a.1 * s), (a.2 * s), (a.3 * s))
}

#[inline]
pub(crate) const fn plus_quat(
    a: (f32, f32, f32, f32),
    b: (f32, f32, f32, f32),
) -> (f32, f32, f32, f32) {
    ((a.0 + b.0), (a.1 + b.1), (a.2 + b.2), (a.3 + b.3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_and_degree_agree() {
        for deg in 0..=3u8 {
            assert_eq!(degree_for_dim(dim_for_degree(deg)), deg);
        }
        assert_eq!(dim_for_degree(4), 0);
    }

    #[test]
    fn test_quantize_sh_buckets() {
        assert_eq!(quantize_sh(0.0, 8), 128);
        assert_eq!(quantize_sh(10.0, 8), 255);
        assert_eq!(quantize_sh(-10.0, 16), 0);
        assert_eq!(quantize_sh(0.1, 16) % 16, 0);
    }

    #[test]
    fn test_clamp_u8_saturates() {
        assert_eq!(clamp_u8(-3.0), 0);
        assert_eq!(clamp_u8(127.5), 128);
        assert_eq!(clamp_u8(1000.0), 255);
    }
}
