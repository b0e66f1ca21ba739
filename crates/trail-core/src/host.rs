//! Capabilities the controller consumes from its host.
//!
//! Scene mutation and resource lookup are asynchronous and are the only
//! suspension points of a rebuild. Signal sources are synchronous: setting a
//! held value never suspends.
#![allow(async_fn_in_trait)]

use crate::signal::{ChannelExpr, DelayKey};
use std::fmt::Debug;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Material {
    pub name: String,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texture {
    pub name: String,
}

impl Texture {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What a node is drawn with: a shared catalog material whose diffuse slot
/// samples the tracker texture at the mesh UVs, plus the instance opacity.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialBinding {
    pub material: Material,
    pub diffuse: Texture,
    pub opacity: f32,
}

pub trait SceneGraph {
    type Node: Clone + Debug + 'static;

    async fn create_node(&self, kind: &str, name: &str) -> anyhow::Result<Self::Node>;
    async fn destroy_node(&self, node: Self::Node) -> anyhow::Result<()>;
    async fn attach_child(&self, parent: &Self::Node, child: &Self::Node) -> anyhow::Result<()>;
    async fn find_node_by_name(&self, name: &str) -> anyhow::Result<Option<Self::Node>>;

    fn set_material(&self, node: &Self::Node, binding: MaterialBinding);
    /// Drive one transform channel of `node` continuously from `expr`.
    fn bind_channel(&self, node: &Self::Node, expr: ChannelExpr);
}

pub trait ResourceCatalog {
    async fn find_texture(&self, name: &str) -> anyhow::Result<Option<Texture>>;
    /// Unordered; callers sort by name.
    async fn find_materials(&self, pattern: &str) -> anyhow::Result<Vec<Material>>;
}

pub trait SignalSystem {
    fn create_scalar_source(&self, key: DelayKey, value: f32);
    fn set_scalar_source(&self, key: &DelayKey, value: f32) -> bool;
    fn release_scalar_source(&self, key: &DelayKey);
}

/// Everything the pool controller needs from one host.
pub trait Host: SceneGraph + ResourceCatalog + SignalSystem + 'static {}

impl<T> Host for T where T: SceneGraph + ResourceCatalog + SignalSystem + 'static {}
