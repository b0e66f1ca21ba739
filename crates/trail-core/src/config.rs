use crate::binder::DelayBinding;
use crate::constants::{
    MATERIAL_PATTERN, NODE_KIND, PARENT_NODE_NAME, POOL_SIZE, REBUILD_PERIOD_MS, TEXTURE_NAME,
};
use std::time::Duration;

/// Static wiring of one controller: pool size and the host names it resolves at start.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub pool_size: usize,
    pub delay_binding: DelayBinding,
    pub parent_name: String,
    pub node_kind: String,
    pub material_pattern: String,
    pub texture_name: String,
    pub rebuild_period: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pool_size: POOL_SIZE,
            delay_binding: DelayBinding::Named,
            parent_name: PARENT_NODE_NAME.to_string(),
            node_kind: NODE_KIND.to_string(),
            material_pattern: MATERIAL_PATTERN.to_string(),
            texture_name: TEXTURE_NAME.to_string(),
            rebuild_period: Duration::from_millis(REBUILD_PERIOD_MS),
        }
    }
}

impl ControllerConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_delay_binding(mut self, delay_binding: DelayBinding) -> Self {
        self.delay_binding = delay_binding;
        self
    }
}
