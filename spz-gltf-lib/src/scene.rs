//! glTF scene description for an SPZ-compressed splat cloud.
//!
//! The document carries a single buffer view over the SPZ payload. Accessors
//! only describe the shape of each splat attribute and never point at buffer
//! data; readers decode everything from the `KHR_gaussian_splatting`
//! primitive extension.

use crate::error::SpzGltfError;
use crate::structures::GaussianCloud;
use indexmap::IndexMap;
use serde::Serialize;

pub const EXT_MATERIALS_UNLIT: &str = "KHR_materials_unlit";
pub const EXT_GAUSSIAN_SPLATTING: &str = "KHR_gaussian_splatting";
pub const EXT_SPZ_COMPRESSION: &str = "KHR_gaussian_splatting_compression_spz_2";
pub const EXTENSIONS: [&str; 3] = [EXT_MATERIALS_UNLIT, EXT_GAUSSIAN_SPLATTING, EXT_SPZ_COMPRESSION];

pub const COMPONENT_TYPE_UNSIGNED_BYTE: u32 = 5121;
pub const COMPONENT_TYPE_FLOAT: u32 = 5126;
pub const PRIMITIVE_MODE_POINTS: u32 = 0;

pub const ATTR_POSITION: &str = "POSITION";
pub const ATTR_COLOR: &str = "COLOR_0";
pub const ATTR_ROTATION: &str = "KHR_gaussian_splatting:ROTATION";
pub const ATTR_SCALE: &str = "KHR_gaussian_splatting:SCALE";

/// -90 degrees about X: splats are Z-up, glTF is Y-up.
#[rustfmt::skip]
pub const COORDINATE_FLIP: [f32; 16] = [
    1.0, 0.0,  0.0, 0.0,
    0.0, 0.0, -1.0, 0.0,
    0.0, 1.0,  0.0, 0.0,
    0.0, 0.0,  0.0, 1.0,
];

/// (degree, coefficients added by that degree)
const SH_BANDS: [(u8, usize); 3] = [(1, 3), (2, 5), (3, 7)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessorType {
    #[serde(rename = "VEC3")]
    Vec3,
    #[serde(rename = "VEC4")]
    Vec4,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub component_type: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub normalized: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<[f32; 3]>,
    #[serde(rename = "type")]
    pub accessor_type: AccessorType,
}

impl Accessor {
    fn new(component_type: u32, count: usize, accessor_type: AccessorType) -> Self {
        Self {
            component_type,
            normalized: false,
            count,
            max: None,
            min: None,
            accessor_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub version: &'static str,
    pub generator: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    pub byte_length: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    pub byte_length: usize,
    pub byte_offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Unlit {}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialExtensions {
    #[serde(rename = "KHR_materials_unlit")]
    pub unlit: Unlit,
}

#[derive(Debug, Clone, Serialize)]
pub struct Material {
    pub extensions: MaterialExtensions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpzCompression {
    pub buffer_view: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaussianSplattingExtensions {
    #[serde(rename = "KHR_gaussian_splatting_compression_spz_2")]
    pub spz: SpzCompression,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaussianSplatting {
    pub extensions: GaussianSplattingExtensions,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrimitiveExtensions {
    #[serde(rename = "KHR_gaussian_splatting")]
    pub gaussian_splatting: GaussianSplatting,
}

#[derive(Debug, Clone, Serialize)]
pub struct Primitive {
    pub attributes: IndexMap<String, usize>,
    pub extensions: PrimitiveExtensions,
    pub material: usize,
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub matrix: [f32; 16],
    pub mesh: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scene {
    pub nodes: Vec<usize>,
}

/// Root of the glTF JSON chunk. Field order is the serialized key order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    pub extensions_used: Vec<&'static str>,
    pub extensions_required: Vec<&'static str>,
    pub asset: Asset,
    pub accessors: Vec<Accessor>,
    pub buffers: Vec<Buffer>,
    pub buffer_views: Vec<BufferView>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub nodes: Vec<Node>,
    pub scene: usize,
    pub scenes: Vec<Scene>,
}

impl SceneDocument {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, SpzGltfError> {
        serde_json::to_vec(self).map_err(SpzGltfError::SerializeScene)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: String,
    pub accessor: usize,
}

#[derive(Debug, Clone)]
pub struct SceneDescription {
    pub document: SceneDocument,
    /// Attribute bindings in accessor order.
    pub bindings: Vec<AttributeBinding>,
}

/// Accessors plus the attribute name bound to each, in insertion order.
#[derive(Debug, Default)]
struct AccessorList {
    accessors: Vec<Accessor>,
    bindings: Vec<AttributeBinding>,
}

impl AccessorList {
    fn push(&mut self, name: impl Into<String>, accessor: Accessor) -> usize {
        let index = self.accessors.len();
        self.accessors.push(accessor);
        self.bindings.push(AttributeBinding {
            name: name.into(),
            accessor: index,
        });
        index
    }
}

/// Component-wise `(min, max)` of packed xyz positions. Points with a NaN or
/// infinite coordinate are skipped; `None` when no finite point remains.
pub fn bounding_box(positions: &[f32]) -> Option<([f32; 3], [f32; 3])> {
    let mut points = positions
        .chunks_exact(3)
        .filter(|p| p.iter().all(|v| v.is_finite()));
    let first = points.next()?;
    let mut min = [first[0], first[1], first[2]];
    let mut max = min;
    for p in points {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    Some((min, max))
}

/// Names of the SH coefficient attributes carried at `degree`.
pub fn sh_attribute_names(degree: u8) -> Vec<String> {
    SH_BANDS
        .iter()
        .filter(|&&(band, _)| band <= degree)
        .flat_map(|&(band, coeffs)| {
            (0..coeffs)
                .map(move |i| format!("{}:SH_DEGREE_{}_COEF_{}", EXT_GAUSSIAN_SPLATTING, band, i))
        })
        .collect()
}

/// Builds the scene description for `cloud`, whose SPZ payload is
/// `payload_len` bytes long.
pub fn build_scene(cloud: &GaussianCloud, payload_len: usize) -> SceneDescription {
    let count = cloud.num_points;
    let bbox = bounding_box(&cloud.positions[..(count * 3).min(cloud.positions.len())]);

    let mut list = AccessorList::default();
    list.push(
        ATTR_POSITION,
        Accessor {
            max: bbox.map(|(_, max)| max),
            min: bbox.map(|(min, _)| min),
            ..Accessor::new(COMPONENT_TYPE_FLOAT, count, AccessorType::Vec3)
        },
    );
    list.push(
        ATTR_COLOR,
        Accessor {
            normalized: true,
            ..Accessor::new(COMPONENT_TYPE_UNSIGNED_BYTE, count, AccessorType::Vec4)
        },
    );
    list.push(
        ATTR_ROTATION,
        Accessor::new(COMPONENT_TYPE_FLOAT, count, AccessorType::Vec4),
    );
    list.push(
        ATTR_SCALE,
        Accessor::new(COMPONENT_TYPE_FLOAT, count, AccessorType::Vec3),
    );
    for name in sh_attribute_names(cloud.sh_degree) {
        list.push(name, Accessor::new(COMPONENT_TYPE_FLOAT, count, AccessorType::Vec3));
    }

    let attributes: IndexMap<String, usize> = list
        .bindings
        .iter()
        .map(|b| (b.name.clone(), b.accessor))
        .collect();

    let document = SceneDocument {
        extensions_used: EXTENSIONS.to_vec(),
        extensions_required: EXTENSIONS.to_vec(),
        asset: Asset {
            version: "2.0",
            generator: concat!("spz-gltf ", env!("CARGO_PKG_VERSION")),
        },
        accessors: list.accessors,
        buffers: vec![Buffer {
            byte_length: payload_len,
        }],
        buffer_views: vec![BufferView {
            buffer: 0,
            byte_length: payload_len,
            byte_offset: 0,
        }],
        materials: vec![Material {
            extensions: MaterialExtensions { unlit: Unlit {} },
        }],
        meshes: vec![Mesh {
            primitives: vec![Primitive {
                attributes,
                extensions: PrimitiveExtensions {
                    gaussian_splatting: GaussianSplatting {
                        extensions: GaussianSplattingExtensions {
                            spz: SpzCompression { buffer_view: 0 },
                        },
                    },
                },
                material: 0,
                mode: PRIMITIVE_MODE_POINTS,
            }],
        }],
        nodes: vec![Node {
            matrix: COORDINATE_FLIP,
            mesh: 0,
        }],
        scene: 0,
        scenes: vec![Scene { nodes: vec![0] }],
    };

    log::debug!(
        "Built scene description with {} accessors for {} points",
        document.accessors.len(),
        count
    );

    SceneDescription {
        document,
        bindings: list.bindings,
    }
}
