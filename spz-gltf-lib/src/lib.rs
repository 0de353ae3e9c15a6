pub mod common;
pub mod error;
pub mod glb;
pub mod json;
pub mod ply;
pub mod scene;
pub mod spz;
pub mod structures;

use error::SpzGltfError;
use glb::{container_len, write_glb};
use scene::build_scene;

pub use json::load_json;
pub use ply::load_ply;
pub use spz::{compress_cloud, CompressOptions};
pub use structures::GaussianCloud;

/// Wraps an already compressed SPZ payload and its cloud into a glTF-Binary
/// container.
pub fn glb_from_payload(cloud: &GaussianCloud, payload: &[u8]) -> Result<Vec<u8>, SpzGltfError> {
    let description = build_scene(cloud, payload.len());
    let json = description.document.to_json_bytes()?;

    let total = container_len(json.len(), payload.len())?;

    log::info!(
        "Packing {} points: {} accessors, JSON {} bytes, SPZ {} bytes, GLB {} bytes",
        cloud.num_points,
        description.bindings.len(),
        json.len(),
        payload.len(),
        total
    );
    Ok(write_glb(&json, Some(payload)))
}

pub fn cloud_to_glb(
    cloud: &GaussianCloud,
    options: &CompressOptions,
) -> Result<Vec<u8>, SpzGltfError> {
    let payload = compress_cloud(cloud, options)?;
    glb_from_payload(cloud, &payload)
}

pub fn convert_ply(raw_data: &[u8], options: &CompressOptions) -> Result<Vec<u8>, SpzGltfError> {
    let cloud = load_ply(raw_data)?;
    cloud_to_glb(&cloud, options)
}

pub fn convert_json(raw_data: &[u8], options: &CompressOptions) -> Result<Vec<u8>, SpzGltfError> {
    let cloud = load_json(raw_data)?;
    cloud_to_glb(&cloud, options)
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    pub use spz::compress_cloud_async;

    #[inline(never)]
    pub async fn cloud_to_glb_async(
        cloud: &GaussianCloud,
        options: &CompressOptions,
    ) -> Result<Vec<u8>, SpzGltfError> {
        let payload = compress_cloud_async(cloud, options).await?;
        glb_from_payload(cloud, &payload)
    }

    pub async fn convert_ply_async(
        raw_data: &[u8],
        options: &CompressOptions,
    ) -> Result<Vec<u8>, SpzGltfError> {
        let cloud = load_ply(raw_data)?;
        cloud_to_glb_async(&cloud, options).await
    }

    pub async fn convert_json_async(
        raw_data: &[u8],
        options: &CompressOptions,
    ) -> Result<Vec<u8>, SpzGltfError> {
        let cloud = load_json(raw_data)?;
        cloud_to_glb_async(&cloud, options).await
    }
}
}

#[cfg(test)]
mod tests {
    use super::*;
    use glb::{GlbChunkHeader, GlbHeader, GLB_CHUNK_BIN, GLB_CHUNK_JSON, GLB_MAGIC, GLB_VERSION};
    use serde_json::Value;
    use zerocopy::FromBytes;

    /// Splits a container into (header, json, bin) as written by `write_glb`.
    fn split_glb(glb: &[u8]) -> (GlbHeader, Value, Option<Vec<u8>>) {
        let (header, rest) = GlbHeader::read_from_prefix(glb).unwrap();
        let (json_chunk, rest) = GlbChunkHeader::read_from_prefix(rest).unwrap();
        assert_eq!(json_chunk.chunk_type.get(), GLB_CHUNK_JSON);
        let (json, rest) = rest.split_at(json_chunk.length.get() as usize);
        let json: Value = serde_json::from_slice(json).unwrap();

        if rest.is_empty() {
            return (header, json, None);
        }
        let (bin_chunk, rest) = GlbChunkHeader::read_from_prefix(rest).unwrap();
        assert_eq!(bin_chunk.chunk_type.get(), GLB_CHUNK_BIN);
        assert_eq!(rest.len(), bin_chunk.length.get() as usize);
        (header, json, Some(rest.to_vec()))
    }

    fn single_splat() -> GaussianCloud {
        GaussianCloud {
            num_points: 1,
            sh_degree: 0,
            antialiased: false,
            positions: vec![1.0, 2.0, 3.0],
            scales: vec![0.1, 0.1, 0.1],
            rotations: vec![0.0, 0.0, 0.0, 1.0],
            alphas: vec![0.5],
            colors: vec![10.0, 20.0, 30.0],
            sh: Vec::new(),
        }
    }

    fn options() -> CompressOptions {
        CompressOptions {
            level: 3,
            workers: 0,
        }
    }

    #[test]
    fn test_single_splat_end_to_end() {
        let glb = cloud_to_glb(&single_splat(), &options()).expect("cloud_to_glb failed");
        assert_eq!(&glb[0..4], &[0x67, 0x6C, 0x54, 0x46]);

        let (header, json, bin) = split_glb(&glb);
        assert_eq!(header.magic.get(), GLB_MAGIC);
        assert_eq!(header.version.get(), GLB_VERSION);
        assert_eq!(header.length.get() as usize, glb.len());

        let accessors = json["accessors"].as_array().unwrap();
        assert_eq!(accessors.len(), 4);
        assert_eq!(accessors[0]["min"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(accessors[0]["max"], serde_json::json!([1.0, 2.0, 3.0]));

        let payload = compress_cloud(&single_splat(), &options()).unwrap();
        let bin = bin.expect("BIN chunk missing");
        assert_eq!(json["buffers"][0]["byteLength"], serde_json::json!(payload.len()));
        assert_eq!(&bin[..payload.len()], payload.as_slice());
        assert_eq!(bin.len() % 4, 0);
    }

    #[test]
    fn test_total_length_formula() {
        let cloud = spz::tests::sample_cloud(10, 3);
        let payload = compress_cloud(&cloud, &options()).unwrap();
        let glb = glb_from_payload(&cloud, &payload).unwrap();
        let json = build_scene(&cloud, payload.len()).document.to_json_bytes().unwrap();

        let pad = |n: usize| n.div_ceil(4) * 4;
        assert_eq!(glb.len(), 12 + 8 + pad(json.len()) + 8 + pad(payload.len()));
    }

    #[test]
    fn test_degree_two_has_twelve_accessors() {
        let glb = cloud_to_glb(&spz::tests::sample_cloud(3, 2), &options()).unwrap();
        let (_, json, _) = split_glb(&glb);
        assert_eq!(json["accessors"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn test_idempotent_for_same_payload() {
        let cloud = spz::tests::sample_cloud(32, 1);
        let payload = compress_cloud(&cloud, &options()).unwrap();
        let a = glb_from_payload(&cloud, &payload).unwrap();
        let b = glb_from_payload(&cloud, &payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_cloud_still_produces_container() {
        let cloud = GaussianCloud::default();
        let payload = compress_cloud(&cloud, &options()).unwrap();
        let glb = cloud_to_glb(&cloud, &options()).unwrap();

        let (header, json, bin) = split_glb(&glb);
        assert_eq!(header.length.get() as usize, glb.len());
        assert_eq!(json["buffers"][0]["byteLength"], serde_json::json!(payload.len()));
        assert_eq!(json["accessors"][0]["count"], serde_json::json!(0));

        let (json_chunk, _) = GlbChunkHeader::read_from_prefix(&glb[12..]).unwrap();
        assert!(json_chunk.length.get() > 0);
        let bin = bin.expect("BIN chunk missing");
        assert_eq!(&bin[..payload.len()], payload.as_slice());
        assert!(bin[payload.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_convert_ply() {
        let raw = ply::tests::build_ply(&[ply::tests::POINT, ply::tests::POINT], 24);
        let glb = convert_ply(&raw, &options()).unwrap();
        let (_, json, _) = split_glb(&glb);
        assert_eq!(json["accessors"].as_array().unwrap().len(), 12);
        assert_eq!(json["accessors"][0]["count"], serde_json::json!(2));
    }

    #[test]
    fn test_convert_json_matches_cloud_path() {
        let doc = br#"{ "vertices": [{
            "position": [1, 2, 3], "scale": [0.1, 0.1, 0.1],
            "rotation": [0, 0, 0, 1], "color": [10, 20, 30, 0.5]
        }] }"#;
        let from_json = convert_json(doc, &options()).unwrap();
        let from_cloud = cloud_to_glb(&single_splat(), &options()).unwrap();
        assert_eq!(from_json, from_cloud);
    }

    #[test]
    fn test_malformed_inputs_propagate() {
        assert!(matches!(
            convert_json(br#"{ "vertices": [{ "position": [1] }] }"#, &options()),
            Err(SpzGltfError::MalformedVertex { index: 0, .. })
        ));
        assert!(matches!(
            convert_ply(b"not a ply", &options()),
            Err(SpzGltfError::ParseSplat(_))
        ));

        let mut cloud = single_splat();
        cloud.colors.push(1.0);
        assert!(matches!(
            cloud_to_glb(&cloud, &options()),
            Err(SpzGltfError::InvalidCloud(_))
        ));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_pipeline_matches_sync_layout() {
        let cloud = spz::tests::sample_cloud(4, 1);
        let glb = cloud_to_glb_async(&cloud, &options())
            .await
            .expect("cloud_to_glb_async failed");
        let (header, json, _) = split_glb(&glb);
        assert_eq!(header.length.get() as usize, glb.len());
        assert_eq!(json["accessors"].as_array().unwrap().len(), 7);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_convert_json_async() {
        let glb = convert_json_async(br#"{"vertices": []}"#, &options())
            .await
            .unwrap();
        assert_eq!(&glb[0..4], b"glTF");
    }
}
