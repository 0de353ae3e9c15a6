use crate::common::degree_for_dim;
use crate::common::dim_for_degree;
use crate::error::SpzGltfError;
use crate::structures::GaussianCloud;
use foldhash::HashMap;
use foldhash::HashMapExt;

#[inline]
fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;

    match memchr::memchr(b'\n', &buffer[*offset..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            Some(&buffer[start..start + pos])
        }
        None => {
            *offset = buffer.len();
            Some(&buffer[start..])
        }
    }
}

#[inline(always)]
fn idx_of(hm: &HashMap<&str, usize>, name: &str) -> Result<usize, SpzGltfError> {
    hm.get(name)
        .cloned()
        .ok_or_else(|| SpzGltfError::ParseSplat(format!("Missing required field: {}", name)))
}

#[inline(always)]
fn read_f32(vertex: &[u8], idx: usize, field_name: &str) -> Result<f32, SpzGltfError> {
    let bytes = &vertex[idx * 4..(idx + 1) * 4];
    Ok(f32::from_le_bytes(bytes.try_into().map_err(|e| {
        SpzGltfError::ParseSplat(format!("Byte conversion error for {}: {}", field_name, e))
    })?))
}

/// Parses a binary little-endian PLY produced by 3DGS trainers.
///
/// Only `property float` fields are accepted. The `f_rest_*` block is stored
/// channel-major on disk and is reordered to coefficient-major here, and
/// `rot_0` (w) is moved to the last quaternion slot.
#[inline(never)]
pub fn load_ply(raw_data: &[u8]) -> Result<GaussianCloud, SpzGltfError> {
    let mut offset = 0;

    // Line #1: "ply"
    let line1 = next_line(raw_data, &mut offset)
        .ok_or_else(|| SpzGltfError::ParseSplat("No 'ply' line".to_string()))?;
    if line1.trim_ascii_end() != b"ply" {
        return Err(SpzGltfError::ParseSplat(
            "Not a .ply file (missing 'ply' header)".to_string(),
        ));
    }

    // Line #2: "format binary_little_endian 1.0"
    let line2 = next_line(raw_data, &mut offset)
        .ok_or_else(|| SpzGltfError::ParseSplat("Missing format line".to_string()))?;
    if line2.trim_ascii_end() != b"format binary_little_endian 1.0" {
        return Err(SpzGltfError::ParseSplat(
            "Unsupported .ply format (only binary_little_endian 1.0 is supported)".to_string(),
        ));
    }

    // Line #3: "element vertex N"
    let line3 = next_line(raw_data, &mut offset)
        .ok_or_else(|| SpzGltfError::ParseSplat("Missing 'element vertex' line".to_string()))?;
    if !line3.starts_with(b"element vertex ") {
        return Err(SpzGltfError::ParseSplat(
            "Missing 'element vertex' definition".to_string(),
        ));
    }
    let num_str = &line3[b"element vertex ".len()..];
    let num_points: usize = {
        let s = std::str::from_utf8(num_str)
            .map_err(|e| SpzGltfError::ParseSplat(format!("UTF-8 error: {}", e)))?
            .trim();
        s.parse()
            .map_err(|e| SpzGltfError::ParseSplat(format!("Parse error: {}", e)))?
    };
    if num_points == 0 {
        return Ok(GaussianCloud::default());
    }

    let mut field_names = Vec::new();
    loop {
        let line = match next_line(raw_data, &mut offset) {
            Some(l) => l.trim_ascii_end(),
            None => {
                return Err(SpzGltfError::ParseSplat(
                    "No 'end_header' found before EOF".to_string(),
                ))
            }
        };

        if line.starts_with(b"end_header") {
            break;
        }

        // Only support "property float <name>"
        if !line.starts_with(b"property float ") {
            return Err(SpzGltfError::ParseSplat(format!(
                "Unsupported property line: {}",
                String::from_utf8_lossy(line)
            )));
        }

        field_names.push(&line[b"property float ".len()..]);
    }

    let mut field_map: HashMap<&str, usize> = HashMap::with_capacity(field_names.len());
    for (i, &f_bytes) in field_names.iter().enumerate() {
        let s = std::str::from_utf8(f_bytes)
            .map_err(|e| SpzGltfError::ParseSplat(format!("UTF-8 error in field name: {}", e)))?;
        field_map.insert(s, i);
    }

    let ix = idx_of(&field_map, "x")?;
    let iy = idx_of(&field_map, "y")?;
    let iz = idx_of(&field_map, "z")?;
    let is0 = idx_of(&field_map, "scale_0")?;
    let is1 = idx_of(&field_map, "scale_1")?;
    let is2 = idx_of(&field_map, "scale_2")?;
    let ir0 = idx_of(&field_map, "rot_0")?;
    let ir1 = idx_of(&field_map, "rot_1")?;
    let ir2 = idx_of(&field_map, "rot_2")?;
    let ir3 = idx_of(&field_map, "rot_3")?;
    let iop = idx_of(&field_map, "opacity")?;
    let ic0 = idx_of(&field_map, "f_dc_0")?;
    let ic1 = idx_of(&field_map, "f_dc_1")?;
    let ic2 = idx_of(&field_map, "f_dc_2")?;

    // Optional spherical harmonics: f_rest_0 to f_rest_44
    let mut sh_idx = Vec::new();
    for i in 0..45 {
        let nm = format!("f_rest_{}", i);
        if let Some(&found) = field_map.get(nm.as_str()) {
            sh_idx.push(found);
        } else {
            break;
        }
    }
    if sh_idx.len() % 3 != 0 {
        return Err(SpzGltfError::ParseSplat(
            "Incomplete spherical harmonics fields".to_string(),
        ));
    }
    // Drop coefficients beyond the highest complete degree.
    let sh_degree = degree_for_dim(sh_idx.len() / 3);
    let sh_dim = dim_for_degree(sh_degree);
    let rest_dim = sh_idx.len() / 3;

    let fields_per_vertex = field_names.len();
    let expected_bytes = num_points
        .checked_mul(fields_per_vertex)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| SpzGltfError::ParseSplat("Overflow in byte calculation".to_string()))?;

    if raw_data.len() < offset + expected_bytes {
        return Err(SpzGltfError::ParseSplat(format!(
            "Binary data is too short, need {} bytes, have {}",
            expected_bytes,
            raw_data.len() - offset
        )));
    }

    let data = &raw_data[offset..offset + expected_bytes];

    let mut cloud = GaussianCloud {
        num_points,
        sh_degree,
        antialiased: false,
        positions: Vec::with_capacity(num_points * 3),
        scales: Vec::with_capacity(num_points * 3),
        rotations: Vec::with_capacity(num_points * 4),
        alphas: Vec::with_capacity(num_points),
        colors: Vec::with_capacity(num_points * 3),
        sh: Vec::with_capacity(num_points * sh_dim * 3),
    };

    let sh_indices: Vec<_> = (0..sh_dim)
        .map(|j| (sh_idx[j], sh_idx[j + rest_dim], sh_idx[j + 2 * rest_dim]))
        .collect();

    for vertex in data.chunks_exact(fields_per_vertex * 4) {
        let x = read_f32(vertex, ix, "x")?;
        let y = read_f32(vertex, iy, "y")?;
        let z = read_f32(vertex, iz, "z")?;
        cloud.positions.extend_from_slice(&[x, y, z]);

        let s0 = read_f32(vertex, is0, "scale_0")?;
        let s1 = read_f32(vertex, is1, "scale_1")?;
        let s2 = read_f32(vertex, is2, "scale_2")?;
        cloud.scales.extend_from_slice(&[s0, s1, s2]);

        let r0 = read_f32(vertex, ir0, "rot_0")?;
        let r1 = read_f32(vertex, ir1, "rot_1")?;
        let r2 = read_f32(vertex, ir2, "rot_2")?;
        let r3 = read_f32(vertex, ir3, "rot_3")?;
        cloud.rotations.extend_from_slice(&[r1, r2, r3, r0]);

        cloud.alphas.push(read_f32(vertex, iop, "opacity")?);

        let c0 = read_f32(vertex, ic0, "f_dc_0")?;
        let c1 = read_f32(vertex, ic1, "f_dc_1")?;
        let c2 = read_f32(vertex, ic2, "f_dc_2")?;
        cloud.colors.extend_from_slice(&[c0, c1, c2]);

        for &(r_idx, g_idx, b_idx) in &sh_indices {
            let r = read_f32(vertex, r_idx, "sh_r")?;
            let g = read_f32(vertex, g_idx, "sh_g")?;
            let b = read_f32(vertex, b_idx, "sh_b")?;
            cloud.sh.extend_from_slice(&[r, g, b]);
        }
    }

    log::debug!(
        "Parsed PLY with {} points, SH degree {}",
        cloud.num_points,
        cloud.sh_degree
    );
    Ok(cloud)
}
