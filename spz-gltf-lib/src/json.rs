use crate::common::dim_for_degree;
use crate::error::SpzGltfError;
use crate::structures::GaussianCloud;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct JsonSplats {
    #[serde(default)]
    vertices: Option<Vec<JsonVertex>>,
}

#[derive(Debug, Deserialize)]
struct JsonVertex {
    position: Option<Vec<f32>>,
    scale: Option<Vec<f32>>,
    rotation: Option<Vec<f32>>,
    /// RGB followed by alpha.
    color: Option<Vec<f32>>,
    sh1: Option<Vec<Vec<f32>>>,
    sh2: Option<Vec<Vec<f32>>>,
    sh3: Option<Vec<Vec<f32>>>,
}

impl JsonVertex {
    fn sh_degree(&self) -> u8 {
        if self.sh3.is_some() {
            3
        } else if self.sh2.is_some() {
            2
        } else if self.sh1.is_some() {
            1
        } else {
            0
        }
    }
}

/// SH bands present for each degree: (field name, coefficients).
const SH_BANDS: [(&str, usize); 3] = [("sh1", 3), ("sh2", 5), ("sh3", 7)];

fn fixed<'a>(
    index: usize,
    field: &'static str,
    value: &'a Option<Vec<f32>>,
    len: usize,
) -> Result<&'a [f32], SpzGltfError> {
    match value {
        None => Err(SpzGltfError::MalformedVertex {
            index,
            field,
            reason: "is missing".to_string(),
        }),
        Some(v) if v.len() != len => Err(SpzGltfError::MalformedVertex {
            index,
            field,
            reason: format!("has {} values, expected {}", v.len(), len),
        }),
        Some(v) => Ok(v.as_slice()),
    }
}

fn band<'a>(
    index: usize,
    field: &'static str,
    value: &'a Option<Vec<Vec<f32>>>,
    coeffs: usize,
) -> Result<&'a [Vec<f32>], SpzGltfError> {
    let rows = match value {
        None => {
            return Err(SpzGltfError::MalformedVertex {
                index,
                field,
                reason: "is missing".to_string(),
            })
        }
        Some(rows) => rows,
    };
    if rows.len() != coeffs {
        return Err(SpzGltfError::MalformedVertex {
            index,
            field,
            reason: format!("has {} coefficients, expected {}", rows.len(), coeffs),
        });
    }
    if let Some((j, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != 3) {
        return Err(SpzGltfError::MalformedVertex {
            index,
            field,
            reason: format!("coefficient {} has {} channels, expected 3", j, row.len()),
        });
    }
    Ok(rows.as_slice())
}

/// Builds a cloud from a `{ "vertices": [...] }` document.
///
/// The SH degree is taken from the first vertex and every vertex must then
/// carry all bands up to it. Any missing field or wrong arity fails the whole
/// document with [`SpzGltfError::MalformedVertex`].
pub fn load_json(raw_data: &[u8]) -> Result<GaussianCloud, SpzGltfError> {
    let doc: Option<JsonSplats> =
        serde_json::from_slice(raw_data).map_err(SpzGltfError::ParseJson)?;
    let vertices = doc.and_then(|d| d.vertices).unwrap_or_default();

    let Some(first) = vertices.first() else {
        return Ok(GaussianCloud::default());
    };

    let np = vertices.len();
    let sh_degree = first.sh_degree();
    let sh_dim = dim_for_degree(sh_degree);

    let mut cloud = GaussianCloud {
        num_points: np,
        sh_degree,
        antialiased: false,
        positions: Vec::with_capacity(np * 3),
        scales: Vec::with_capacity(np * 3),
        rotations: Vec::with_capacity(np * 4),
        alphas: Vec::with_capacity(np),
        colors: Vec::with_capacity(np * 3),
        sh: Vec::with_capacity(np * sh_dim * 3),
    };

    for (i, vertex) in vertices.iter().enumerate() {
        cloud
            .positions
            .extend_from_slice(fixed(i, "position", &vertex.position, 3)?);
        cloud
            .scales
            .extend_from_slice(fixed(i, "scale", &vertex.scale, 3)?);
        cloud
            .rotations
            .extend_from_slice(fixed(i, "rotation", &vertex.rotation, 4)?);

        let color = fixed(i, "color", &vertex.color, 4)?;
        cloud.colors.extend_from_slice(&color[..3]);
        cloud.alphas.push(color[3]);

        let bands = [&vertex.sh1, &vertex.sh2, &vertex.sh3];
        for (&(field, coeffs), value) in SH_BANDS
            .iter()
            .zip(bands)
            .take(sh_degree as usize)
        {
            for row in band(i, field, value, coeffs)? {
                cloud.sh.extend_from_slice(row);
            }
        }
    }

    log::debug!(
        "Parsed JSON splats with {} points, SH degree {}",
        cloud.num_points,
        cloud.sh_degree
    );
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"{
        "position": [1, 2, 3],
        "scale": [0.1, 0.1, 0.1],
        "rotation": [0, 0, 0, 1],
        "color": [10, 20, 30, 0.5]
    }"#;

    #[test]
    fn test_single_vertex() {
        let doc = format!(r#"{{ "vertices": [{}] }}"#, VERTEX);
        let cloud = load_json(doc.as_bytes()).unwrap();
        assert_eq!(cloud.num_points, 1);
        assert_eq!(cloud.sh_degree, 0);
        assert_eq!(cloud.positions, vec![1.0, 2.0, 3.0]);
        assert_eq!(cloud.scales, vec![0.1, 0.1, 0.1]);
        assert_eq!(cloud.rotations, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cloud.colors, vec![10.0, 20.0, 30.0]);
        assert_eq!(cloud.alphas, vec![0.5]);
        assert!(cloud.sh.is_empty());
        assert!(cloud.validate().is_ok());
    }

    #[test]
    fn test_empty_documents() {
        for doc in ["null", "{}", r#"{"vertices": null}"#, r#"{"vertices": []}"#] {
            let cloud = load_json(doc.as_bytes()).unwrap();
            assert_eq!(cloud.num_points, 0, "document {}", doc);
        }
    }

    #[test]
    fn test_sh_bands_are_flattened_in_order() {
        let doc = r#"{ "vertices": [{
            "position": [0, 0, 0], "scale": [0, 0, 0], "rotation": [0, 0, 0, 1],
            "color": [0, 0, 0, 1],
            "sh1": [[1, 1, 1], [2, 2, 2], [3, 3, 3]],
            "sh2": [[4, 4, 4], [5, 5, 5], [6, 6, 6], [7, 7, 7], [8, 8, 8]]
        }] }"#;
        let cloud = load_json(doc.as_bytes()).unwrap();
        assert_eq!(cloud.sh_degree, 2);
        assert_eq!(cloud.sh.len(), 24);
        assert_eq!(&cloud.sh[..3], &[1.0, 1.0, 1.0]);
        assert_eq!(&cloud.sh[9..12], &[4.0, 4.0, 4.0]);
        assert_eq!(&cloud.sh[21..], &[8.0, 8.0, 8.0]);
        assert!(cloud.validate().is_ok());
    }

    #[test]
    fn test_missing_field_fails_fast() {
        let doc = format!(
            r#"{{ "vertices": [{}, {{ "position": [1, 2, 3] }}] }}"#,
            VERTEX
        );
        match load_json(doc.as_bytes()) {
            Err(SpzGltfError::MalformedVertex { index, field, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(field, "scale");
            }
            other => panic!("expected MalformedVertex, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_arity() {
        let doc = r#"{ "vertices": [{
            "position": [1, 2], "scale": [0, 0, 0], "rotation": [0, 0, 0, 1],
            "color": [0, 0, 0, 1]
        }] }"#;
        let err = load_json(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("position has 2 values, expected 3"));
    }

    #[test]
    fn test_later_vertex_missing_band() {
        let doc = r#"{ "vertices": [
            { "position": [0, 0, 0], "scale": [0, 0, 0], "rotation": [0, 0, 0, 1],
              "color": [0, 0, 0, 1], "sh1": [[0, 0, 0], [0, 0, 0], [0, 0, 0]] },
            { "position": [0, 0, 0], "scale": [0, 0, 0], "rotation": [0, 0, 0, 1],
              "color": [0, 0, 0, 1] }
        ] }"#;
        match load_json(doc.as_bytes()) {
            Err(SpzGltfError::MalformedVertex { index, field, .. }) => {
                assert_eq!((index, field), (1, "sh1"));
            }
            other => panic!("expected MalformedVertex, got {:?}", other),
        }
    }

    #[test]
    fn test_band_with_bad_channel_count() {
        let doc = r#"{ "vertices": [
            { "position": [0, 0, 0], "scale": [0, 0, 0], "rotation": [0, 0, 0, 1],
              "color": [0, 0, 0, 1], "sh1": [[0, 0, 0], [0, 0], [0, 0, 0]] }
        ] }"#;
        let err = load_json(doc.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("coefficient 1 has 2 channels"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            load_json(b"{ not json"),
            Err(SpzGltfError::ParseJson(_))
        ));
    }
}
