use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SpzGltfError {
    #[error("Failed to parse splats from the buffer: {0}")]
    ParseSplat(String),

    #[error("Failed to parse JSON splats: {0}")]
    ParseJson(#[source] serde_json::Error),

    #[error("Malformed vertex {index}: {field} {reason}")]
    MalformedVertex {
        index: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid Gaussian cloud: {0}")]
    InvalidCloud(String),

    #[error("Failed to serialize packed gaussians: {0}")]
    SerializePackedGaussians(String),

    #[error("Zstandard compression failed: {0}")]
    ZstdCompress(String),

    #[error("Failed to serialize the glTF scene description: {0}")]
    SerializeScene(#[source] serde_json::Error),

    #[error("The glTF-Binary container would be {0} bytes, more than a u32 length allows.")]
    ContainerTooLarge(usize),

    #[error("An I/O error occurred: {0}")]
    IoError(#[from] io::Error),
}
