use crate::utils::ValidationError;

/// Validates that a batch width is usable.
pub fn validate_batch_size(size: usize) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::BatchSize(size));
    }
    Ok(())
}

/// Validates a `[min, max]` batch size window.
pub fn validate_bounds(min: usize, max: usize) -> Result<(), ValidationError> {
    validate_batch_size(min)?;
    if min > max {
        return Err(ValidationError::Bounds { min, max });
    }
    Ok(())
}

/// Validates that a ratio threshold lies within `[0, 1]`.
pub fn validate_ratio(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::threshold(name, value));
    }
    Ok(())
}

/// Sanitizes a telemetry usage ratio.
///
/// Missing or garbage readings are not errors. NaN reads as `neutral`;
/// everything else, infinities included, is clamped into `[0, 1]`.
pub fn sanitize_ratio(value: f64, neutral: f64) -> f64 {
    if value.is_nan() {
        neutral
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Sanitizes a non-negative telemetry measurement such as latency or bandwidth.
///
/// NaN reads as `neutral`. `+inf` stays unbounded so it compares above every
/// threshold.
pub fn sanitize_measure(value: f64, neutral: f64) -> f64 {
    if value.is_nan() { neutral } else { value.max(0.0) }
}
