//! The pool as a single-owner actor.
//!
//! [`PoolController`] owns the live pool, the tuning and the gesture
//! accumulators, and processes one [`Command`] at a time. Everything else
//! talks to it through a cloneable [`ControllerHandle`]. Rebuild triggers
//! pass the [`CycleGate`] at submission, so a trigger arriving while a cycle
//! is queued or running is dropped rather than queued.

use crate::config::ControllerConfig;
use crate::error::{Result, TrailError};
use crate::gate::CycleGate;
use crate::gesture::{
    CompletedGesture, DelayTracker, GestureEvent, GestureKind, GestureStream,
};
use crate::host::Host;
use crate::params::{ParameterSet, Tuning};
use crate::pool::{resolve_config, InstancePool, Pool};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Tap,
}

enum Command {
    Rebuild(Trigger),
    Gesture(GestureEvent),
    Snapshot(oneshot::Sender<PoolSnapshot>),
    Shutdown,
}

/// Observable state of the controller between two commands.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolSnapshot {
    /// `None` when the last cycle failed and no pool is live.
    pub generation: Option<u64>,
    pub parameters: Vec<ParameterSet>,
    pub tuning: Tuning,
    pub rebuilds: usize,
    /// Instances whose destroy failed and that wait for a retry.
    pub orphans: usize,
}

#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Command>,
    gate: Rc<CycleGate>,
    taps: Rc<RefCell<GestureStream>>,
}

impl ControllerHandle {
    /// Queue a rebuild unless one is already queued or running.
    pub fn request_rebuild(&self, trigger: Trigger) -> bool {
        if !self.gate.try_enter() {
            log::warn!("[gate] {:?} rebuild dropped, cycle in flight", trigger);
            return false;
        }
        if self.tx.send(Command::Rebuild(trigger)).is_err() {
            self.gate.exit();
            return false;
        }
        true
    }

    /// Feed one gesture transition. A completed tap requests a rebuild;
    /// returns false when the event was dropped.
    pub fn gesture(&self, event: GestureEvent) -> bool {
        if event.kind == GestureKind::Tap {
            let completed = self.taps.borrow_mut().advance(&event);
            return match completed {
                Some(_) => self.request_rebuild(Trigger::Tap),
                None => true,
            };
        }
        self.tx.send(Command::Gesture(event)).is_ok()
    }

    pub async fn snapshot(&self) -> Result<PoolSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply))
            .map_err(|_| TrailError::ControllerClosed)?;
        rx.await.map_err(|_| TrailError::ControllerClosed)
    }

    pub fn shutdown(&self) {
        _ = self.tx.send(Command::Shutdown);
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct PoolController<H: Host> {
    pool: InstancePool<H>,
    live: Option<Pool<H::Node>>,
    tuning: Tuning,
    gate: Rc<CycleGate>,
    long_press: GestureStream,
    pan: GestureStream,
    delay_tracker: DelayTracker,
    rebuilds: usize,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<H: Host> PoolController<H> {
    /// Resolve host resources and build the first generation.
    ///
    /// Must run inside a `tokio::task::LocalSet`.
    pub async fn start(host: Rc<H>, config: &ControllerConfig, tuning: Tuning) -> Result<(Self, ControllerHandle)> {
        let pool_config = resolve_config(&*host, config).await?;
        let pool = InstancePool::new(host, pool_config);
        let live = pool.create_all(&tuning).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Rc::new(CycleGate::new());
        let handle = ControllerHandle {
            tx,
            gate: Rc::clone(&gate),
            taps: Rc::new(RefCell::new(GestureStream::new(GestureKind::Tap))),
        };
        let delay_tracker = DelayTracker::new(&tuning);
        let controller = Self {
            pool,
            live: Some(live),
            tuning,
            gate,
            long_press: GestureStream::new(GestureKind::LongPress),
            pan: GestureStream::new(GestureKind::Pan),
            delay_tracker,
            rebuilds: 0,
            rx,
        };
        Ok((controller, handle))
    }

    /// Process commands until shutdown or until every handle is gone, then
    /// tear the live pool and any orphans down.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                Command::Rebuild(trigger) => self.rebuild(trigger).await,
                Command::Gesture(event) => self.on_gesture(event),
                Command::Snapshot(reply) => {
                    _ = reply.send(self.snapshot());
                }
                Command::Shutdown => break,
            }
        }
        let teardown = match self.live.take() {
            Some(pool) => self.pool.destroy_all(pool).await,
            None => self.pool.destroy_orphans().await,
        };
        if let Err(err) = teardown {
            log::error!("[controller] teardown on shutdown failed: {}", err);
        }
        log::info!("[controller] stopped after {} rebuilds", self.rebuilds);
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            generation: self.live.as_ref().map(|p| p.generation),
            parameters: self.live.as_ref().map(Pool::parameters).unwrap_or_default(),
            tuning: self.tuning.clone(),
            rebuilds: self.rebuilds,
            orphans: self.pool.orphan_count(),
        }
    }

    async fn rebuild(&mut self, trigger: Trigger) {
        let gate = Rc::clone(&self.gate);
        let _cycle = gate.adopt();
        log::info!("[controller] {:?} rebuild started", trigger);
        let result = match self.live.take() {
            Some(old) => self.pool.rebuild(old, &self.tuning).await,
            None => self.pool.create_all(&self.tuning).await,
        };
        match result {
            Ok(pool) => {
                self.rebuilds += 1;
                log::info!("[controller] swapped in generation {}", pool.generation);
                self.live = Some(pool);
            }
            Err(err) => log::error!("[controller] {:?} rebuild aborted: {}", trigger, err),
        }
    }

    fn on_gesture(&mut self, event: GestureEvent) {
        let completed = match event.kind {
            GestureKind::LongPress => self.long_press.advance(&event),
            GestureKind::Pan => self.pan.advance(&event),
            GestureKind::Tap => None,
        };
        let delay_base = match completed {
            Some(CompletedGesture::LongPress { elapsed_ms }) => {
                let base = self.delay_tracker.long_press(elapsed_ms);
                log::info!("[gesture] long press {}ms, delay base {:.3}", elapsed_ms, base);
                base
            }
            Some(CompletedGesture::Pan {
                distance,
                reference_width,
            }) => {
                let base = self.delay_tracker.pan(distance, reference_width);
                log::info!("[gesture] pan {:.3}, delay base {:.3}", distance, base);
                base
            }
            _ => return,
        };
        self.apply_delay_base(delay_base);
    }

    fn apply_delay_base(&mut self, delay_base: f32) {
        self.tuning.delay_base = delay_base;
        match self.live.as_mut() {
            Some(pool) => self.pool.reparametrize(pool, &self.tuning),
            None => log::warn!("[controller] no live pool; delay base {:.3} kept for next cycle", delay_base),
        }
    }
}

/// Request a timer rebuild every `period`. Ticks that find a cycle in
/// flight are skipped. Stops once the controller is gone.
pub fn spawn_rebuild_timer(handle: ControllerHandle, period: Duration) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if handle.is_closed() {
                break;
            }
            handle.request_rebuild(Trigger::Timer);
        }
    })
}
