//! Building and tearing down the instance pool against the host scene graph.
//!
//! Creation walks indices in order and stops at the first failure. Teardown
//! issues every destroy at once and returns only when all of them resolved,
//! so a rebuild never creates a node while a node of the previous generation
//! is still being destroyed. Instances whose destroy failed are kept as
//! orphans and retried before the next creation pass.

use crate::binder::{ChannelBindings, SignalBinder};
use crate::config::ControllerConfig;
use crate::constants::node_name;
use crate::error::{Result, TrailError};
use crate::host::{Host, Material, MaterialBinding, Texture};
use crate::params::{delay_magnitude, derive_parameters, validate_pool, ParameterSet, Tuning};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::task::JoinSet;

/// Resources resolved once at start and shared by every generation.
#[derive(Clone, Debug)]
pub struct PoolConfig<N> {
    pub pool_size: usize,
    pub parent: N,
    /// Sorted by name; `material_index` indexes this.
    pub materials: Vec<Material>,
    pub texture: Texture,
    pub node_kind: String,
    pub binder: SignalBinder,
}

/// Look up the anchor node, tracker texture and material catalog concurrently.
pub async fn resolve_config<H: Host>(host: &H, config: &ControllerConfig) -> Result<PoolConfig<H::Node>> {
    let (parent, texture, materials) = tokio::join!(
        host.find_node_by_name(&config.parent_name),
        host.find_texture(&config.texture_name),
        host.find_materials(&config.material_pattern),
    );
    let parent = parent
        .map_err(|e| TrailError::collaborator("find_node_by_name", None, e))?
        .ok_or_else(|| TrailError::NotFound {
            kind: "scene node",
            name: config.parent_name.clone(),
        })?;
    let texture = texture
        .map_err(|e| TrailError::collaborator("find_texture", None, e))?
        .ok_or_else(|| TrailError::NotFound {
            kind: "texture",
            name: config.texture_name.clone(),
        })?;
    let mut materials = materials.map_err(|e| TrailError::collaborator("find_materials", None, e))?;
    if materials.is_empty() {
        return Err(TrailError::NotFound {
            kind: "material pattern",
            name: config.material_pattern.clone(),
        });
    }
    validate_pool(config.pool_size, materials.len())?;
    materials.sort_by(|a, b| a.name.cmp(&b.name));
    log::info!(
        "[pool] resolved parent={:?} texture={} materials={}",
        parent,
        texture.name,
        materials.len()
    );
    Ok(PoolConfig {
        pool_size: config.pool_size,
        parent,
        materials,
        texture,
        node_kind: config.node_kind.clone(),
        binder: SignalBinder::new(config.delay_binding),
    })
}

#[derive(Clone, Debug)]
pub struct Instance<N> {
    pub index: usize,
    pub node: N,
    pub params: ParameterSet,
    pub bindings: ChannelBindings,
}

/// One generation of live instances, slot `i` at position `i`.
#[derive(Debug)]
pub struct Pool<N> {
    pub generation: u64,
    instances: Vec<Instance<N>>,
}

impl<N> Pool<N> {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instance<N>> {
        self.instances.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance<N>> {
        self.instances.iter()
    }

    pub fn parameters(&self) -> Vec<ParameterSet> {
        self.instances.iter().map(|i| i.params).collect()
    }
}

pub struct InstancePool<H: Host> {
    host: Rc<H>,
    config: PoolConfig<H::Node>,
    generation: Cell<u64>,
    /// Bumped on every creation pass, successful or not; stamps delay keys.
    epoch: Cell<u64>,
    /// Instances whose destroy failed. Still in the scene, sources still held.
    orphans: RefCell<Vec<Instance<H::Node>>>,
}

impl<H: Host> InstancePool<H> {
    pub fn new(host: Rc<H>, config: PoolConfig<H::Node>) -> Self {
        Self {
            host,
            config,
            generation: Cell::new(0),
            epoch: Cell::new(0),
            orphans: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig<H::Node> {
        &self.config
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.borrow().len()
    }

    /// Build a fresh generation. Orphans from an earlier failed teardown are
    /// destroyed first; if any of them still cannot be destroyed nothing is
    /// created.
    pub async fn create_all(&self, tuning: &Tuning) -> Result<Pool<H::Node>> {
        validate_pool(self.config.pool_size, self.config.materials.len())?;
        self.destroy_orphans().await?;
        let generation = self.generation.get() + 1;
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        let mut instances = Vec::with_capacity(self.config.pool_size);
        for index in 0..self.config.pool_size {
            let step = match self.create_instance(index, epoch, tuning).await {
                Ok(instance) => {
                    let attached = self.attach(&instance).await;
                    instances.push(instance);
                    attached
                }
                Err(e) => Err(e),
            };
            if let Err(err) = step {
                log::error!("[pool] generation {} failed at index {}: {}", generation, index, err);
                self.rollback(instances).await;
                return Err(err);
            }
        }
        self.generation.set(generation);
        log::info!(
            "[pool] created generation {} with {} instances",
            generation,
            instances.len()
        );
        Ok(Pool {
            generation,
            instances,
        })
    }

    async fn create_instance(&self, index: usize, epoch: u64, tuning: &Tuning) -> Result<Instance<H::Node>> {
        let params = derive_parameters(index, self.config.pool_size, self.config.materials.len(), tuning)?;
        let name = node_name(index);
        let node = self
            .host
            .create_node(&self.config.node_kind, &name)
            .await
            .map_err(|e| TrailError::collaborator("create_node", Some(index), e))?;
        let material = self
            .config
            .materials
            .get(params.material_index)
            .cloned()
            .ok_or(TrailError::EmptyMaterialCatalog)?;
        self.host.set_material(
            &node,
            MaterialBinding {
                material,
                diffuse: self.config.texture.clone(),
                opacity: params.opacity,
            },
        );
        let bindings = self.config.binder.bind(&*self.host, &node, epoch, index, &params);
        log::debug!(
            "[pool] {} material={} opacity={:.3} smooth={:.1} delay={:.4}",
            name,
            params.material_index,
            params.opacity,
            params.smoothing_factor,
            params.delay_magnitude
        );
        Ok(Instance {
            index,
            node,
            params,
            bindings,
        })
    }

    async fn attach(&self, instance: &Instance<H::Node>) -> Result<()> {
        self.host
            .attach_child(&self.config.parent, &instance.node)
            .await
            .map_err(|e| TrailError::collaborator("attach_child", Some(instance.index), e))
    }

    async fn rollback(&self, instances: Vec<Instance<H::Node>>) {
        let partial = Pool {
            generation: 0,
            instances,
        };
        if let Err(err) = self.destroy_all(partial).await {
            log::error!("[pool] rollback left nodes behind: {}", err);
        }
    }

    /// Issue every destroy, then wait for all of them. Orphans of an earlier
    /// teardown are retried in the same batch. Delay sources of an instance
    /// are released once its node is gone; instances whose destroy failed
    /// become orphans and the first failure is returned.
    pub async fn destroy_all(&self, pool: Pool<H::Node>) -> Result<()> {
        let Pool {
            generation,
            instances,
        } = pool;
        let count = self.teardown(instances).await?;
        log::info!("[pool] destroyed generation {} ({} instances)", generation, count);
        Ok(())
    }

    /// Retry the destroys that failed during an earlier teardown.
    pub async fn destroy_orphans(&self) -> Result<()> {
        if self.orphan_count() == 0 {
            return Ok(());
        }
        let count = self.teardown(Vec::new()).await?;
        log::info!("[pool] destroyed {} orphaned instances", count);
        Ok(())
    }

    async fn teardown(&self, instances: Vec<Instance<H::Node>>) -> Result<usize> {
        let mut targets = std::mem::take(&mut *self.orphans.borrow_mut());
        targets.extend(instances);
        let count = targets.len();
        let mut pending = JoinSet::new();
        for instance in targets {
            let host = Rc::clone(&self.host);
            pending.spawn_local(async move {
                let outcome = host.destroy_node(instance.node.clone()).await;
                (instance, outcome)
            });
        }
        let mut first_err = None;
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((instance, Ok(()))) => {
                    self.config.binder.release(&*self.host, &instance.bindings);
                }
                Ok((instance, Err(e))) => {
                    log::warn!("[pool] destroy of instance {} failed, kept as orphan: {}", instance.index, e);
                    first_err
                        .get_or_insert_with(|| TrailError::collaborator("destroy_node", Some(instance.index), e));
                    self.orphans.borrow_mut().push(instance);
                }
                Err(e) => {
                    first_err.get_or_insert_with(|| TrailError::collaborator("destroy_node", None, e.into()));
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    /// Tear down `old` completely, then build a fresh generation.
    pub async fn rebuild(&self, old: Pool<H::Node>, tuning: &Tuning) -> Result<Pool<H::Node>> {
        self.destroy_all(old).await?;
        self.create_all(tuning).await
    }

    /// Push the delay implied by `tuning.delay_base` into every live instance.
    /// Material, opacity and smoothing are left alone.
    pub fn reparametrize(&self, pool: &mut Pool<H::Node>, tuning: &Tuning) {
        let pool_size = pool.instances.len();
        for instance in pool.instances.iter_mut() {
            let delay = delay_magnitude(instance.index, pool_size, tuning.delay_base);
            self.config
                .binder
                .rebind_delay(&*self.host, &instance.node, &mut instance.bindings, delay);
            instance.params.delay_magnitude = delay;
        }
        log::info!(
            "[pool] generation {} retuned with delay base {:.3}",
            pool.generation,
            tuning.delay_base
        );
    }
}
