// Reference tuning shared by the controller, the sandbox host and the native driver.

// Pool layout
pub const POOL_SIZE: usize = 20; // instances trailing the tracked face
pub const MAX_SMOOTHING: f32 = 350.0; // smoothing factor (ms) reached by the last instance
pub const INITIAL_DELAY_BASE: f32 = 1.0; // delay knob before any gesture

// Gesture mapping
pub const LONG_PRESS_DELAY_SCALE: f32 = 0.01; // delay base added per pressed ms
pub const DELAY_MAX: f32 = 50.0; // pans clamp the delay base to this
pub const DELAY_MIN: f32 = 1.0; // and to this
pub const PAN_SENSITIVITY: f32 = 100.0;

// Rebuild timer
pub const REBUILD_PERIOD_MS: u64 = 4_000;

// Host resource names
pub const PARENT_NODE_NAME: &str = "meshesNullObj";
pub const TEXTURE_NAME: &str = "faceTracker0 Texture";
pub const MATERIAL_PATTERN: &str = "mask-material*";
pub const NODE_KIND: &str = "FaceMesh";
pub const NODE_NAME_PREFIX: &str = "mesh";

#[inline]
pub fn node_name(index: usize) -> String {
    format!("{NODE_NAME_PREFIX}{index}")
}
