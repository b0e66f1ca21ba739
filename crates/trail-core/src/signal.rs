//! Reactive channel expressions and the primitives a host needs to evaluate them.
//!
//! Each bound transform channel reads `smooth(delay(tracked[axis], ms), factor)`.
//! The delay is either baked into the expression or read from a mutable
//! scalar source addressed by a [`DelayKey`], so it can change after binding
//! without rebuilding the expression.

use fnv::FnvHashMap;
use glam::Vec3;
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
    RotationX,
    RotationY,
    RotationZ,
}

impl Axis {
    pub const ALL: [Axis; 6] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::RotationX,
        Axis::RotationY,
        Axis::RotationZ,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::RotationX => "rotationX",
            Axis::RotationY => "rotationY",
            Axis::RotationZ => "rotationZ",
        }
    }
}

/// Six-channel pose of the tracked subject.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Transform {
    pub fn new(position: Vec3, rotation: Vec3) -> Self {
        Self { position, rotation }
    }

    #[inline]
    pub fn channel(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.position.x,
            Axis::Y => self.position.y,
            Axis::Z => self.position.z,
            Axis::RotationX => self.rotation.x,
            Axis::RotationY => self.rotation.y,
            Axis::RotationZ => self.rotation.z,
        }
    }

    pub fn set_channel(&mut self, axis: Axis, value: f32) {
        match axis {
            Axis::X => self.position.x = value,
            Axis::Y => self.position.y = value,
            Axis::Z => self.position.z = value,
            Axis::RotationX => self.rotation.x = value,
            Axis::RotationY => self.rotation.y = value,
            Axis::RotationZ => self.rotation.z = value,
        }
    }
}

/// Address of one named delay source.
///
/// `epoch` counts creation passes, so sources of two passes sharing an index
/// never alias, however close together they ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelayKey {
    pub epoch: u64,
    pub index: usize,
    pub axis: Axis,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DelayParam {
    Fixed(f32),
    Source(DelayKey),
}

/// `smooth(delay(tracked[axis], delay), smoothing)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelExpr {
    pub axis: Axis,
    pub delay: DelayParam,
    pub smoothing: f32,
}

impl ChannelExpr {
    /// Current delay in milliseconds. A released source reads as zero delay.
    pub fn delay_ms(&self, sources: &DelaySources) -> f32 {
        match self.delay {
            DelayParam::Fixed(ms) => ms,
            DelayParam::Source(key) => sources.get(&key).unwrap_or(0.0),
        }
    }
}

/// Mutable scalar sources backing [`DelayParam::Source`].
#[derive(Clone, Debug, Default)]
pub struct DelaySources {
    values: FnvHashMap<DelayKey, f32>,
}

impl DelaySources {
    pub fn create(&mut self, key: DelayKey, value: f32) {
        self.values.insert(key, value);
    }

    /// Returns false when the key was never created or already released.
    pub fn set(&mut self, key: &DelayKey, value: f32) -> bool {
        match self.values.get_mut(key) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &DelayKey) -> Option<f32> {
        self.values.get(key).copied()
    }

    pub fn release(&mut self, key: &DelayKey) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Time-ordered samples of the tracked transform, enough to answer delayed reads.
#[derive(Clone, Debug)]
pub struct TransformHistory {
    samples: VecDeque<(f64, Transform)>,
    retain_ms: f64,
}

impl TransformHistory {
    pub fn new(retain_ms: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            retain_ms,
        }
    }

    /// Out-of-order samples are ignored.
    pub fn push(&mut self, at_ms: f64, transform: Transform) {
        if let Some((last, _)) = self.samples.back() {
            if at_ms < *last {
                return;
            }
        }
        self.samples.push_back((at_ms, transform));
        let cutoff = at_ms - self.retain_ms;
        // keep one sample at or before the cutoff so reads at the edge still resolve
        while self.samples.len() > 1 && self.samples[1].0 <= cutoff {
            self.samples.pop_front();
        }
    }

    /// Latest sample taken at or before `at_ms`.
    pub fn sample_at(&self, at_ms: f64) -> Option<&Transform> {
        let idx = self.samples.partition_point(|(t, _)| *t <= at_ms);
        if idx == 0 {
            return None;
        }
        self.samples.get(idx - 1).map(|(_, tr)| tr)
    }

    pub fn latest(&self) -> Option<&Transform> {
        self.samples.back().map(|(_, tr)| tr)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Running state of one bound channel.
#[derive(Clone, Debug, Default)]
pub struct ChannelFollower {
    value: Option<f32>,
    last_ms: Option<f64>,
}

impl ChannelFollower {
    /// Advance to `now_ms`. Holds the last value while the delayed read has
    /// no sample (tracking lost or not yet started).
    pub fn step(
        &mut self,
        expr: &ChannelExpr,
        sources: &DelaySources,
        history: &TransformHistory,
        now_ms: f64,
    ) -> Option<f32> {
        let delay = expr.delay_ms(sources) as f64;
        let Some(target) = history.sample_at(now_ms - delay).map(|t| t.channel(expr.axis)) else {
            return self.value;
        };
        let next = match (self.value, self.last_ms) {
            (Some(prev), Some(last)) if expr.smoothing > 0.0 => {
                let dt = (now_ms - last).max(0.0);
                let alpha = 1.0 - (-dt / expr.smoothing as f64).exp();
                prev + (target - prev) * alpha as f32
            }
            _ => target,
        };
        self.value = Some(next);
        self.last_ms = Some(now_ms);
        self.value
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32) -> Transform {
        Transform::new(Vec3::new(x, 0.0, 0.0), Vec3::ZERO)
    }

    fn fixed(delay: f32, smoothing: f32) -> ChannelExpr {
        ChannelExpr {
            axis: Axis::X,
            delay: DelayParam::Fixed(delay),
            smoothing,
        }
    }

    #[test]
    fn history_reads_latest_sample_before_time() {
        let mut h = TransformHistory::new(1_000.0);
        h.push(0.0, at(1.0));
        h.push(10.0, at(2.0));
        h.push(20.0, at(3.0));
        assert!(h.sample_at(-1.0).is_none());
        assert_eq!(h.sample_at(0.0).unwrap().position.x, 1.0);
        assert_eq!(h.sample_at(15.0).unwrap().position.x, 2.0);
        assert_eq!(h.sample_at(99.0).unwrap().position.x, 3.0);
    }

    #[test]
    fn history_trims_but_keeps_edge_sample() {
        let mut h = TransformHistory::new(10.0);
        for i in 0..100 {
            h.push(i as f64, at(i as f32));
        }
        assert!(h.len() <= 12);
        assert_eq!(h.sample_at(89.5).unwrap().position.x, 89.0);
        h.push(50.0, at(-1.0));
        assert_eq!(h.latest().unwrap().position.x, 99.0);
    }

    #[test]
    fn delay_reads_the_past() {
        let mut h = TransformHistory::new(1_000.0);
        let mut f = ChannelFollower::default();
        let expr = fixed(30.0, 0.0);
        let sources = DelaySources::default();
        for t in 0..=100 {
            h.push(t as f64, at(t as f32));
        }
        assert_eq!(f.step(&expr, &sources, &h, 100.0), Some(70.0));
    }

    #[test]
    fn smoothing_converges_towards_target() {
        let mut h = TransformHistory::new(10_000.0);
        h.push(0.0, at(0.0));
        let mut f = ChannelFollower::default();
        let expr = fixed(0.0, 100.0);
        let sources = DelaySources::default();
        assert_eq!(f.step(&expr, &sources, &h, 0.0), Some(0.0));
        h.push(1.0, at(10.0));
        let after_one_tau = f.step(&expr, &sources, &h, 100.0).unwrap();
        assert!((after_one_tau - 10.0 * (1.0 - (-1.0f32).exp())).abs() < 1e-3);
        let later = f.step(&expr, &sources, &h, 2_000.0).unwrap();
        assert!((later - 10.0).abs() < 1e-3);
    }

    #[test]
    fn follower_holds_while_tracking_is_missing() {
        let h = TransformHistory::new(1_000.0);
        let mut f = ChannelFollower::default();
        let sources = DelaySources::default();
        assert_eq!(f.step(&fixed(0.0, 0.0), &sources, &h, 5.0), None);

        let mut h = TransformHistory::new(1_000.0);
        h.push(0.0, at(4.0));
        f.step(&fixed(0.0, 0.0), &sources, &h, 1.0);
        // delayed read lands before the first sample
        assert_eq!(f.step(&fixed(500.0, 0.0), &sources, &h, 2.0), Some(4.0));
    }

    #[test]
    fn source_delay_is_read_live() {
        let key = DelayKey {
            epoch: 7,
            index: 0,
            axis: Axis::X,
        };
        let mut sources = DelaySources::default();
        sources.create(key, 10.0);
        let expr = ChannelExpr {
            axis: Axis::X,
            delay: DelayParam::Source(key),
            smoothing: 0.0,
        };
        assert_eq!(expr.delay_ms(&sources), 10.0);
        assert!(sources.set(&key, 25.0));
        assert_eq!(expr.delay_ms(&sources), 25.0);
        assert!(sources.release(&key));
        assert!(!sources.set(&key, 1.0));
        assert_eq!(expr.delay_ms(&sources), 0.0);
    }
}
