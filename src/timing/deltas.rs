use itertools::Itertools;

/// Gap to the previous timestamp; the first sample has none and gets 0.
pub fn deltas(timestamps: &[f64]) -> Vec<f64> {
    if timestamps.is_empty() {
        return Vec::new();
    }
    std::iter::once(0.0)
        .chain(timestamps.iter().tuple_windows().map(|(a, b)| b - a))
        .collect()
}
