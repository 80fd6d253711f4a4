//! Packed embedding vectors: little-endian f32, 4 bytes per dimension.

/// Unpacks `dims` floats; `None` on a length mismatch or non-finite values
pub fn unpack_f32_le(bytes: &[u8], dims: usize) -> Option<Vec<f32>> {
    if dims == 0 || bytes.len() != dims * 4 {
        return None;
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if values.iter().all(|v| v.is_finite()) {
        Some(values)
    } else {
        None
    }
}

pub fn pack_f32_le(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Scales to unit length in place. Returns false for a zero vector.
pub fn l2_normalize(values: &mut [f32]) -> bool {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return false;
    }
    for v in values.iter_mut() {
        *v /= norm;
    }
    true
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
