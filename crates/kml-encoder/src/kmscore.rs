//! The kmscore heuristic: vector placemarks or a raster overlay.

/// Largest feature count still drawn as vectors for a kmscore.
pub fn vector_threshold(kmscore: u8) -> f64 {
    10f64.powf(f64::from(kmscore) / 15.0)
}

/// `true` to emit placemarks, `false` to emit an image.
///
/// 100 always picks vectors and 0 always picks raster; in between the
/// tolerated feature count grows as `10^(kmscore/15)`.
pub fn use_vector_output(kmscore: u8, num_features: usize) -> bool {
    match kmscore {
        0 => false,
        s if s >= 100 => true,
        s => (num_features as f64) <= vector_threshold(s),
    }
}
