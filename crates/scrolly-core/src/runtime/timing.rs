//! Pure interpolation helpers shared by the progress mapper and the frame
//! drain scheduler.

/// Linear interpolation between two values
///
/// # Arguments
/// * `from` - Start value
/// * `to` - End value
/// * `t` - Interpolation factor [0.0, 1.0]
#[inline]
pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

/// Position of `value` inside `[start, end]` as a ratio clamped to [0.0, 1.0]
///
/// A degenerate range (`end - start` below one unit) is widened to one unit
/// so the division is always defined.
#[inline]
pub fn ratio_clamped(value: f64, start: f64, end: f64) -> f64 {
    let extent = (end - start).max(1.0);
    ((value - start) / extent).clamp(0.0, 1.0)
}

/// `steps` evenly spaced values walking from `from` to `to`, excluding
/// `from` and ending exactly on `to`
pub fn ramp(from: f64, to: f64, steps: usize) -> Vec<f64> {
    let steps = steps.max(1);
    let diff = (to - from) / steps as f64;
    (1..=steps).map(|i| from + i as f64 * diff).collect()
}
