use crate::error::SpzGltfError;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const GLB_MAGIC: u32 = 0x46546C67; // 'glTF'
pub const GLB_VERSION: u32 = 2;
pub const GLB_CHUNK_JSON: u32 = 0x4E4F534A; // 'JSON'
pub const GLB_CHUNK_BIN: u32 = 0x004E4942; // 'BIN\0'

pub const GLB_HEADER_LEN: usize = size_of::<GlbHeader>();
pub const GLB_CHUNK_HEADER_LEN: usize = size_of::<GlbChunkHeader>();

const JSON_PADDING: u8 = b' ';
const BIN_PADDING: u8 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct GlbHeader {
    pub magic: U32,
    pub version: U32,
    pub length: U32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct GlbChunkHeader {
    pub length: U32,
    pub chunk_type: U32,
}

#[inline]
pub(crate) const fn padded_len(len: usize) -> usize {
    len.next_multiple_of(4)
}

/// Total container size for a JSON document and optional payload of the
/// given unpadded lengths.
pub fn glb_len(json_len: usize, payload_len: Option<usize>) -> usize {
    let mut total = GLB_HEADER_LEN + GLB_CHUNK_HEADER_LEN + padded_len(json_len);
    if let Some(len) = payload_len {
        total += GLB_CHUNK_HEADER_LEN + padded_len(len);
    }
    total
}

/// Length of a container holding both chunks, checked against the 32-bit
/// length field of the header.
pub fn container_len(json_len: usize, payload_len: usize) -> Result<u32, SpzGltfError> {
    let total = glb_len(json_len, Some(payload_len));
    u32::try_from(total).map_err(|_| SpzGltfError::ContainerTooLarge(total))
}

fn push_chunk(out: &mut Vec<u8>, chunk_type: u32, data: &[u8], fill: u8) {
    let len = padded_len(data.len());
    let header = GlbChunkHeader {
        length: (len as u32).into(),
        chunk_type: chunk_type.into(),
    };
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    out.resize(out.len() + (len - data.len()), fill);
}

/// Packs a JSON chunk and an optional BIN chunk into a glTF-Binary container.
///
/// The JSON chunk is padded with spaces and the BIN chunk with zeros, both to
/// a 4-byte boundary. Callers must keep [`glb_len`] within `u32::MAX`.
pub fn write_glb(json: &[u8], payload: Option<&[u8]>) -> Vec<u8> {
    let total = glb_len(json.len(), payload.map(<[u8]>::len));
    debug_assert!(total <= u32::MAX as usize);

    let header = GlbHeader {
        magic: GLB_MAGIC.into(),
        version: GLB_VERSION.into(),
        length: (total as u32).into(),
    };

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(header.as_bytes());
    push_chunk(&mut out, GLB_CHUNK_JSON, json, JSON_PADDING);
    if let Some(payload) = payload {
        push_chunk(&mut out, GLB_CHUNK_BIN, payload, BIN_PADDING);
    }
    debug_assert_eq!(out.len(), total);
    out
}
