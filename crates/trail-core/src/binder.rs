use crate::host::{SceneGraph, SignalSystem};
use crate::params::ParameterSet;
use crate::signal::{Axis, ChannelExpr, DelayKey, DelayParam};
use smallvec::SmallVec;

/// How the delay enters each channel expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DelayBinding {
    /// Read through one mutable source per axis; retuning only sets values.
    #[default]
    Named,
    /// Delay is a constant in the expression; retuning rebinds all channels.
    Baked,
}

impl DelayBinding {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "named" => Some(Self::Named),
            "baked" => Some(Self::Baked),
            _ => None,
        }
    }
}

/// The six live channel expressions of one instance.
#[derive(Clone, Debug)]
pub struct ChannelBindings {
    pub exprs: [ChannelExpr; 6],
    /// Empty for [`DelayBinding::Baked`].
    pub sources: SmallVec<[DelayKey; 6]>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SignalBinder {
    pub mode: DelayBinding,
}

impl SignalBinder {
    pub fn new(mode: DelayBinding) -> Self {
        Self { mode }
    }

    /// Bind all six channels of `node`. `epoch` identifies the creation pass
    /// and keeps delay keys of different passes apart.
    pub fn bind<H>(&self, host: &H, node: &H::Node, epoch: u64, index: usize, params: &ParameterSet) -> ChannelBindings
    where
        H: SceneGraph + SignalSystem,
    {
        let mut sources = SmallVec::new();
        let exprs = Axis::ALL.map(|axis| {
            let delay = match self.mode {
                DelayBinding::Named => {
                    let key = DelayKey { epoch, index, axis };
                    host.create_scalar_source(key, params.delay_magnitude);
                    sources.push(key);
                    DelayParam::Source(key)
                }
                DelayBinding::Baked => DelayParam::Fixed(params.delay_magnitude),
            };
            ChannelExpr {
                axis,
                delay,
                smoothing: params.smoothing_factor,
            }
        });
        for expr in &exprs {
            host.bind_channel(node, *expr);
        }
        ChannelBindings { exprs, sources }
    }

    /// Apply a new delay to an already bound instance. Smoothing is untouched.
    pub fn rebind_delay<H>(&self, host: &H, node: &H::Node, bindings: &mut ChannelBindings, delay_ms: f32)
    where
        H: SceneGraph + SignalSystem,
    {
        if bindings.sources.is_empty() {
            for expr in bindings.exprs.iter_mut() {
                expr.delay = DelayParam::Fixed(delay_ms);
                host.bind_channel(node, *expr);
            }
            return;
        }
        for key in &bindings.sources {
            if !host.set_scalar_source(key, delay_ms) {
                log::warn!("[binder] delay source {:?} is gone", key);
            }
        }
    }

    pub fn release<H: SignalSystem>(&self, host: &H, bindings: &ChannelBindings) {
        for key in &bindings.sources {
            host.release_scalar_source(key);
        }
    }
}
