//! Headless in-memory host.
//!
//! Implements every collaborator the controller needs, evaluates bound
//! channel expressions on demand and keeps an ordered journal of scene
//! mutations so callers can check ordering. Latency and failures can be
//! injected per operation.

use crate::constants::{MATERIAL_PATTERN, PARENT_NODE_NAME, TEXTURE_NAME};
use crate::host::{Material, MaterialBinding, ResourceCatalog, SceneGraph, SignalSystem, Texture};
use crate::signal::{Axis, ChannelExpr, ChannelFollower, DelayKey, DelaySources, Transform, TransformHistory};
use anyhow::{anyhow, bail};
use fnv::FnvHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};
use std::time::Duration;

const HISTORY_RETAIN_MS: f64 = 10_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    CreateIssued { name: String },
    CreateResolved { id: NodeId, name: String },
    DestroyIssued { id: NodeId },
    DestroyResolved { id: NodeId },
    Attached { parent: NodeId, child: NodeId },
}

/// Simulated host latency in milliseconds; `jitter_ms` adds a random extra.
#[derive(Clone, Copy, Debug, Default)]
pub struct Latency {
    pub create_ms: u64,
    pub destroy_ms: u64,
    pub attach_ms: u64,
    pub jitter_ms: u64,
}

#[derive(Debug)]
struct NodeRecord {
    name: String,
    kind: String,
    parent: Option<NodeId>,
    material: Option<MaterialBinding>,
    channels: [Option<(ChannelExpr, ChannelFollower)>; 6],
    bind_calls: usize,
    transform: Transform,
}

impl NodeRecord {
    fn new(kind: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            parent: None,
            material: None,
            channels: Default::default(),
            bind_calls: 0,
            transform: Transform::default(),
        }
    }
}

pub struct SandboxHost {
    next_id: Cell<u64>,
    nodes: RefCell<FnvHashMap<NodeId, NodeRecord>>,
    textures: Vec<Texture>,
    materials: Vec<Material>,
    sources: RefCell<DelaySources>,
    history: RefCell<TransformHistory>,
    journal: RefCell<Vec<JournalEntry>>,
    latency: Cell<Latency>,
    rng: RefCell<StdRng>,
    fail_create: RefCell<Option<String>>,
    fail_destroy: RefCell<Option<String>>,
}

impl SandboxHost {
    pub fn empty(seed: u64) -> Self {
        Self {
            next_id: Cell::new(1),
            nodes: RefCell::new(FnvHashMap::default()),
            textures: Vec::new(),
            materials: Vec::new(),
            sources: RefCell::new(DelaySources::default()),
            history: RefCell::new(TransformHistory::new(HISTORY_RETAIN_MS)),
            journal: RefCell::new(Vec::new()),
            latency: Cell::new(Latency::default()),
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            fail_create: RefCell::new(None),
            fail_destroy: RefCell::new(None),
        }
    }

    /// A scene with the anchor node, the tracker texture and `material_count`
    /// matching materials registered in reverse name order, plus one decoy.
    pub fn with_reference_scene(material_count: usize, seed: u64) -> Self {
        let prefix = MATERIAL_PATTERN.trim_end_matches('*');
        let mut host = Self::empty(seed);
        host.add_node("Null", PARENT_NODE_NAME);
        host.textures.push(Texture::new(TEXTURE_NAME));
        host.materials = (0..material_count)
            .rev()
            .map(|i| Material::new(format!("{prefix}{i:02}")))
            .collect();
        host.materials.push(Material::new("backdrop-material"));
        host
    }

    pub fn add_node(&self, kind: &str, name: &str) -> NodeId {
        let id = NodeId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.nodes.borrow_mut().insert(id, NodeRecord::new(kind, name));
        id
    }

    pub fn with_latency(self, latency: Latency) -> Self {
        self.latency.set(latency);
        self
    }

    pub fn set_latency(&self, latency: Latency) {
        self.latency.set(latency);
    }

    /// Make every `create_node` for `name` fail.
    pub fn fail_create_of(&self, name: Option<&str>) {
        *self.fail_create.borrow_mut() = name.map(str::to_string);
    }

    /// Make every `destroy_node` of a node called `name` fail.
    pub fn fail_destroy_of(&self, name: Option<&str>) {
        *self.fail_destroy.borrow_mut() = name.map(str::to_string);
    }

    pub fn push_transform(&self, at_ms: f64, transform: Transform) {
        self.history.borrow_mut().push(at_ms, transform);
    }

    /// Evaluate every bound channel at `now_ms`.
    pub fn advance(&self, now_ms: f64) {
        let sources = self.sources.borrow();
        let history = self.history.borrow();
        for node in self.nodes.borrow_mut().values_mut() {
            for slot in node.channels.iter_mut() {
                if let Some((expr, follower)) = slot {
                    if let Some(v) = follower.step(expr, &sources, &history, now_ms) {
                        node.transform.set_channel(expr.axis, v);
                    }
                }
            }
        }
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.borrow().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.borrow_mut().clear();
    }

    pub fn find_live(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(_, n)| n.name == name)
            .map(|(id, _)| *id)
            .min()
    }

    pub fn live_count(&self, kind: &str) -> usize {
        self.nodes.borrow().values().filter(|n| n.kind == kind).count()
    }

    pub fn children_of(&self, parent: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<_> = self
            .nodes
            .borrow()
            .iter()
            .filter(|(_, n)| n.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn name_of(&self, id: NodeId) -> Option<String> {
        self.nodes.borrow().get(&id).map(|n| n.name.clone())
    }

    pub fn material_of(&self, id: NodeId) -> Option<MaterialBinding> {
        self.nodes.borrow().get(&id).and_then(|n| n.material.clone())
    }

    pub fn transform_of(&self, id: NodeId) -> Option<Transform> {
        self.nodes.borrow().get(&id).map(|n| n.transform)
    }

    pub fn channel_of(&self, id: NodeId, axis: Axis) -> Option<ChannelExpr> {
        let nodes = self.nodes.borrow();
        let node = nodes.get(&id)?;
        node.channels[axis as usize].as_ref().map(|(expr, _)| *expr)
    }

    /// Number of `bind_channel` calls received by the node.
    pub fn bind_calls(&self, id: NodeId) -> usize {
        self.nodes.borrow().get(&id).map_or(0, |n| n.bind_calls)
    }

    /// Delay currently applied to `axis` of the node, in milliseconds.
    pub fn effective_delay(&self, id: NodeId, axis: Axis) -> Option<f32> {
        let expr = self.channel_of(id, axis)?;
        Some(expr.delay_ms(&self.sources.borrow()))
    }

    pub fn delay_source(&self, key: &DelayKey) -> Option<f32> {
        self.sources.borrow().get(key)
    }

    pub fn delay_source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    async fn pause(&self, base_ms: u64) {
        let jitter = self.latency.get().jitter_ms;
        let ms = if jitter > 0 {
            base_ms + self.rng.borrow_mut().gen_range(0..=jitter)
        } else {
            base_ms
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    fn record(&self, entry: JournalEntry) {
        self.journal.borrow_mut().push(entry);
    }
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    }
}

impl SceneGraph for SandboxHost {
    type Node = NodeId;

    async fn create_node(&self, kind: &str, name: &str) -> anyhow::Result<NodeId> {
        self.record(JournalEntry::CreateIssued {
            name: name.to_string(),
        });
        self.pause(self.latency.get().create_ms).await;
        if self.fail_create.borrow().as_deref() == Some(name) {
            bail!("host refused to create `{name}`");
        }
        let id = self.add_node(kind, name);
        self.record(JournalEntry::CreateResolved {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn destroy_node(&self, node: NodeId) -> anyhow::Result<()> {
        self.record(JournalEntry::DestroyIssued { id: node });
        self.pause(self.latency.get().destroy_ms).await;
        let name = self
            .name_of(node)
            .ok_or_else(|| anyhow!("node {:?} does not exist", node))?;
        if self.fail_destroy.borrow().as_deref() == Some(name.as_str()) {
            bail!("host refused to destroy `{name}`");
        }
        self.nodes.borrow_mut().remove(&node);
        self.record(JournalEntry::DestroyResolved { id: node });
        Ok(())
    }

    async fn attach_child(&self, parent: &NodeId, child: &NodeId) -> anyhow::Result<()> {
        self.pause(self.latency.get().attach_ms).await;
        if !self.nodes.borrow().contains_key(parent) {
            bail!("parent {:?} does not exist", parent);
        }
        match self.nodes.borrow_mut().get_mut(child) {
            Some(node) => node.parent = Some(*parent),
            None => bail!("child {:?} does not exist", child),
        }
        self.record(JournalEntry::Attached {
            parent: *parent,
            child: *child,
        });
        Ok(())
    }

    async fn find_node_by_name(&self, name: &str) -> anyhow::Result<Option<NodeId>> {
        tokio::task::yield_now().await;
        Ok(self.find_live(name))
    }

    fn set_material(&self, node: &NodeId, binding: MaterialBinding) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node) {
            n.material = Some(binding);
        }
    }

    fn bind_channel(&self, node: &NodeId, expr: ChannelExpr) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(n) = nodes.get_mut(node) else {
            log::warn!("[sandbox] bind on missing node {:?}", node);
            return;
        };
        n.bind_calls += 1;
        match &mut n.channels[expr.axis as usize] {
            // rebinding keeps the follower so the channel does not jump
            Some((current, _)) => *current = expr,
            slot => *slot = Some((expr, ChannelFollower::default())),
        }
    }
}

impl ResourceCatalog for SandboxHost {
    async fn find_texture(&self, name: &str) -> anyhow::Result<Option<Texture>> {
        tokio::task::yield_now().await;
        Ok(self.textures.iter().find(|t| t.name == name).cloned())
    }

    async fn find_materials(&self, pattern: &str) -> anyhow::Result<Vec<Material>> {
        tokio::task::yield_now().await;
        Ok(self
            .materials
            .iter()
            .filter(|m| matches_pattern(pattern, &m.name))
            .cloned()
            .collect())
    }
}

impl SignalSystem for SandboxHost {
    fn create_scalar_source(&self, key: DelayKey, value: f32) {
        self.sources.borrow_mut().create(key, value);
    }

    fn set_scalar_source(&self, key: &DelayKey, value: f32) -> bool {
        self.sources.borrow_mut().set(key, value)
    }

    fn release_scalar_source(&self, key: &DelayKey) {
        self.sources.borrow_mut().release(key);
    }
}
