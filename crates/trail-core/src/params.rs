//! Per-index animation parameters.
//!
//! Every instance's look and motion is a pure function of its slot in the
//! pool and of the global [`Tuning`]. Later slots fade in, lag more and
//! pick later materials, which produces the trailing gradient.

use crate::constants::{
    DELAY_MAX, INITIAL_DELAY_BASE, LONG_PRESS_DELAY_SCALE, MAX_SMOOTHING, PAN_SENSITIVITY,
};
use crate::error::{Result, TrailError};

/// Global knobs read by [`derive_parameters`]. The material count is not a
/// knob; it comes from the resolved catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    pub max_smoothing: f32,
    /// The one knob gestures rescale at runtime.
    pub delay_base: f32,
    pub long_press_delay_scale: f32,
    pub delay_max: f32,
    pub pan_sensitivity: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_smoothing: MAX_SMOOTHING,
            delay_base: INITIAL_DELAY_BASE,
            long_press_delay_scale: LONG_PRESS_DELAY_SCALE,
            delay_max: DELAY_MAX,
            pan_sensitivity: PAN_SENSITIVITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterSet {
    pub material_index: usize,
    pub opacity: f32,
    /// Exponential smoothing time constant in milliseconds.
    pub smoothing_factor: f32,
    /// Delay applied to the tracked transform, in milliseconds.
    pub delay_magnitude: f32,
}

pub fn validate_pool(pool_size: usize, material_count: usize) -> Result<()> {
    if pool_size == 0 {
        return Err(TrailError::InvalidPoolSize(pool_size));
    }
    if material_count == 0 {
        return Err(TrailError::EmptyMaterialCatalog);
    }
    Ok(())
}

/// Derive the parameters of slot `index` in a pool of `pool_size` drawing
/// from `material_count` materials.
pub fn derive_parameters(
    index: usize,
    pool_size: usize,
    material_count: usize,
    tuning: &Tuning,
) -> Result<ParameterSet> {
    validate_pool(pool_size, material_count)?;
    if index >= pool_size {
        return Err(TrailError::IndexOutOfRange { index, pool_size });
    }
    let n = pool_size as f32;
    let i = index as f32;
    let last_material = (material_count - 1) as f32;
    let material_index = ((i / n) * last_material).round() as usize;
    Ok(ParameterSet {
        material_index: material_index.min(material_count - 1),
        opacity: i / n,
        smoothing_factor: tuning.max_smoothing / n * (i + 1.0),
        delay_magnitude: delay_magnitude(index, pool_size, tuning.delay_base),
    })
}

/// Quadratic delay curve: `((index + 1) / pool_size * delay_base)^2`.
#[inline]
pub fn delay_magnitude(index: usize, pool_size: usize, delay_base: f32) -> f32 {
    let ramp = (index as f32 + 1.0) / pool_size as f32 * delay_base;
    ramp * ramp
}
