use crate::common::dim_for_degree;
use crate::error::SpzGltfError;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const MAGIC: u32 = 0x5053474E; // 'NGSP'
pub const VERSION: u32 = 2;
pub const FLAG_ANTIALIASED: u8 = 0x1;
pub const MAX_SH_DEGREE: u8 = 3;

/// Gaussian splats as plain float arrays, one stride per point.
///
/// `rotations` are stored as (x, y, z, w). `sh` is coefficient-major with the
/// RGB channel innermost: `sh[(i * dim + j) * 3 + channel]`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GaussianCloud {
    pub num_points: usize,
    pub sh_degree: u8,
    pub antialiased: bool,
    pub positions: Vec<f32>,
    pub scales: Vec<f32>,
    pub rotations: Vec<f32>,
    pub alphas: Vec<f32>,
    pub colors: Vec<f32>,
    pub sh: Vec<f32>,
}

impl GaussianCloud {
    /// Number of SH floats stored for each point.
    pub fn sh_floats_per_point(&self) -> usize {
        dim_for_degree(self.sh_degree) * 3
    }

    /// Checks that every per-point array matches `num_points` and the SH degree.
    pub fn validate(&self) -> Result<(), SpzGltfError> {
        if self.sh_degree > MAX_SH_DEGREE {
            return Err(SpzGltfError::InvalidCloud(format!(
                "Unsupported spherical harmonics degree {}",
                self.sh_degree
            )));
        }

        let np = self.num_points;
        let expected = [
            ("positions", self.positions.len(), 3),
            ("scales", self.scales.len(), 3),
            ("rotations", self.rotations.len(), 4),
            ("alphas", self.alphas.len(), 1),
            ("colors", self.colors.len(), 3),
            ("sh", self.sh.len(), self.sh_floats_per_point()),
        ];
        for (name, len, stride) in expected {
            if len != np * stride {
                return Err(SpzGltfError::InvalidCloud(format!(
                    "Array '{}' has {} values, expected {} ({} points x {})",
                    name,
                    len,
                    np * stride,
                    np,
                    stride
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PackedGaussians {
    pub num_points: usize,
    pub sh_degree: u8,
    pub fractional_bits: u8,
    pub antialiased: bool,
    pub positions: Vec<u8>,
    pub scales: Vec<u8>,
    pub rotations: Vec<u8>,
    pub alphas: Vec<u8>,
    pub colors: Vec<u8>,
    pub sh: Vec<u8>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PackedGaussiansHeader {
    pub magic: U32,
    pub version: U32,
    pub num_points: U32,
    pub sh_degree: u8,
    pub fractional_bits: u8,
    pub flags: u8,
    pub reserved: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_point(sh_degree: u8) -> GaussianCloud {
        let dim = dim_for_degree(sh_degree);
        GaussianCloud {
            num_points: 1,
            sh_degree,
            antialiased: false,
            positions: vec![1.0, 2.0, 3.0],
            scales: vec![0.1; 3],
            rotations: vec![0.0, 0.0, 0.0, 1.0],
            alphas: vec![0.5],
            colors: vec![10.0, 20.0, 30.0],
            sh: vec![0.0; dim * 3],
        }
    }

    #[test]
    fn test_validate_accepts_consistent_clouds() {
        for degree in 0..=MAX_SH_DEGREE {
            assert!(one_point(degree).validate().is_ok(), "degree {}", degree);
        }
        assert!(GaussianCloud::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_arity() {
        let mut cloud = one_point(0);
        cloud.rotations.pop();
        let err = cloud.validate().unwrap_err();
        assert!(matches!(err, SpzGltfError::InvalidCloud(_)));
        assert!(err.to_string().contains("rotations"));
    }

    #[test]
    fn test_validate_rejects_sh_mismatch() {
        let mut cloud = one_point(1);
        cloud.sh_degree = 2;
        assert!(matches!(
            cloud.validate(),
            Err(SpzGltfError::InvalidCloud(_))
        ));

        let mut cloud = one_point(0);
        cloud.sh_degree = 4;
        assert!(cloud.validate().is_err());
    }

    #[test]
    fn test_packed_header_is_sixteen_bytes() {
        assert_eq!(size_of::<PackedGaussiansHeader>(), 16);
    }
}
