use crate::common::clamp_u8;
use crate::common::dim_for_degree;
use crate::common::normalize_quat;
use crate::common::plus_quat;
use crate::common::quantize_sh;
use crate::common::sigmoid;
use crate::common::times_quat;
use crate::common::{ZSTD_DEFAULT_COMPRESSION_LVL, ZSTD_DEFAULT_WORKERS, ZSTD_MAX_COMPRESSION_LVL};
use crate::error::SpzGltfError;
use crate::structures::GaussianCloud;
use crate::structures::PackedGaussians;
use crate::structures::PackedGaussiansHeader;
use crate::structures::FLAG_ANTIALIASED;
use crate::structures::MAGIC;
use crate::structures::VERSION;
use std::io::Write;
use zerocopy::IntoBytes;
use zstd::stream::Encoder;

/// Settings for the zstd stage of the SPZ payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    /// zstd level, clamped to [`ZSTD_MAX_COMPRESSION_LVL`].
    pub level: u32,
    /// zstd worker threads; 0 compresses on the calling thread.
    pub workers: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: ZSTD_DEFAULT_COMPRESSION_LVL,
            workers: ZSTD_DEFAULT_WORKERS,
        }
    }
}

impl CompressOptions {
    pub fn clamped_level(&self) -> i32 {
        self.level.min(ZSTD_MAX_COMPRESSION_LVL) as i32
    }
}

pub(crate) fn pack_gaussians(gc: &GaussianCloud) -> PackedGaussians {
    let fractional_bits = 12;
    let color_scale = 0.15_f32;
    let sh_dim = dim_for_degree(gc.sh_degree);
    let sf = (1 << fractional_bits) as f32;
    let color_factor = color_scale * 255.0;
    let color_offset = 127.5; // 0.5 * 255.0

    let positions: Vec<u8> = gc
        .positions
        .iter()
        .flat_map(|&val| {
            let fixed = (val * sf).round() as i32;
            [
                (fixed & 0xFF) as u8,
                ((fixed >> 8) & 0xFF) as u8,
                ((fixed >> 16) & 0xFF) as u8,
            ]
        })
        .collect();

    let scales: Vec<u8> = gc
        .scales
        .iter()
        .map(|&s| clamp_u8((s + 10.0) * 16.0))
        .collect();

    let rotations: Vec<u8> = gc
        .rotations
        .chunks_exact(4)
        .flat_map(|quat| {
            let mut q = normalize_quat((quat[0], quat[1], quat[2], quat[3]));
            let scale = if q.3 < 0.0 { -127.5 } else { 127.5 };
            q = times_quat(q, scale);
            q = plus_quat(q, (127.5, 127.5, 127.5, 127.5));
            [clamp_u8(q.0), clamp_u8(q.1), clamp_u8(q.2)]
        })
        .collect();

    let alphas: Vec<u8> = gc
        .alphas
        .iter()
        .map(|&a| clamp_u8(sigmoid(a) * 255.0))
        .collect();

    let colors: Vec<u8> = gc
        .colors
        .iter()
        .map(|&c| clamp_u8(c * color_factor + color_offset))
        .collect();

    let sh = if gc.sh_degree > 0 {
        gc.sh
            .chunks_exact(sh_dim * 3)
            .flat_map(|chunk| {
                chunk.iter().enumerate().map(|(j, &x)| {
                    let bucket = if j < 9 { 8 } else { 16 };
                    quantize_sh(x, bucket)
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    PackedGaussians {
        num_points: gc.num_points,
        sh_degree: gc.sh_degree,
        fractional_bits,
        antialiased: gc.antialiased,
        positions,
        scales,
        rotations,
        alphas,
        colors,
        sh,
    }
}

pub(crate) fn serialize_packed_gaussians(pg: &PackedGaussians) -> Result<Vec<u8>, SpzGltfError> {
    let num_points = u32::try_from(pg.num_points).map_err(|_| {
        SpzGltfError::SerializePackedGaussians(format!(
            "{} points do not fit the header",
            pg.num_points
        ))
    })?;
    let header_size = size_of::<PackedGaussiansHeader>();
    let data_size = pg.positions.len()
        + pg.alphas.len()
        + pg.colors.len()
        + pg.scales.len()
        + pg.rotations.len()
        + pg.sh.len();

    let hdr = PackedGaussiansHeader {
        magic: MAGIC.into(),
        version: VERSION.into(),
        num_points: num_points.into(),
        sh_degree: pg.sh_degree,
        fractional_bits: pg.fractional_bits,
        flags: if pg.antialiased { FLAG_ANTIALIASED } else { 0 },
        reserved: 0,
    };

    let mut out = Vec::with_capacity(header_size + data_size);
    out.extend_from_slice(hdr.as_bytes());
    out.extend_from_slice(&pg.positions);
    out.extend_from_slice(&pg.alphas);
    out.extend_from_slice(&pg.colors);
    out.extend_from_slice(&pg.scales);
    out.extend_from_slice(&pg.rotations);
    out.extend_from_slice(&pg.sh);
    Ok(out)
}

/// Validates, quantizes and lays out the cloud before the zstd stage.
pub fn prepare_uncompressed(cloud: &GaussianCloud) -> Result<Vec<u8>, SpzGltfError> {
    cloud.validate()?;
    let packed = pack_gaussians(cloud);
    serialize_packed_gaussians(&packed)
}

#[inline(never)]
fn compress_zstd(data: &[u8], options: &CompressOptions) -> Result<Vec<u8>, SpzGltfError> {
    let mut encoder = Encoder::new(Vec::new(), options.clamped_level())
        .map_err(|e| SpzGltfError::ZstdCompress(format!("Encoder creation failed: {}", e)))?;
    encoder
        .multithread(options.workers)
        .map_err(|e| SpzGltfError::ZstdCompress(format!("Setting multithread failed: {}", e)))?;
    encoder
        .write_all(data)
        .map_err(|e| SpzGltfError::ZstdCompress(format!("Writing data failed: {}", e)))?;

    encoder
        .finish()
        .map_err(|e| SpzGltfError::ZstdCompress(format!("Finalizing compression failed: {}", e)))
}

/// Serializes the cloud into an SPZ payload.
pub fn compress_cloud(
    cloud: &GaussianCloud,
    options: &CompressOptions,
) -> Result<Vec<u8>, SpzGltfError> {
    let uncompressed = prepare_uncompressed(cloud)?;
    let compressed = compress_zstd(&uncompressed, options)?;
    log::debug!(
        "Compressed {} points: {} -> {} bytes",
        cloud.num_points,
        uncompressed.len(),
        compressed.len()
    );
    Ok(compressed)
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    use async_compression::zstd::CParameter;
    use async_compression::Level;
    use tokio::io::AsyncWriteExt;
    use async_compression::tokio::write::ZstdEncoder;

    #[inline(never)]
    async fn compress_zstd_async(
        data: &[u8],
        options: &CompressOptions,
    ) -> Result<Vec<u8>, SpzGltfError> {
        let mut compressed = Vec::new();
        let params = &[CParameter::nb_workers(options.workers)];
        let mut encoder = ZstdEncoder::with_quality_and_params(
            &mut compressed,
            Level::Precise(options.clamped_level()),
            params,
        );

        encoder.write_all(data)
            .await
            .map_err(|e| SpzGltfError::ZstdCompress(e.to_string()))?;

        encoder.shutdown()
            .await
            .map_err(|e| SpzGltfError::ZstdCompress(e.to_string()))?;

        Ok(compressed)
    }

    /// Async flavour of [`compress_cloud`].
    pub async fn compress_cloud_async(
        cloud: &GaussianCloud,
        options: &CompressOptions,
    ) -> Result<Vec<u8>, SpzGltfError> {
        let uncompressed = prepare_uncompressed(cloud)?;
        compress_zstd_async(&uncompressed, options).await
    }
}
}
