use glam::Vec3;
use rand::prelude::*;
use trail_core::Transform;

/// Synthetic head motion: a slow sway and nod with a little sensor noise.
pub struct HeadMotion {
    rng: StdRng,
    noise: f32,
}

impl HeadMotion {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: 0.002,
        }
    }

    pub fn sample(&mut self, t_sec: f32) -> Transform {
        let mut jitter = || (self.rng.gen::<f32>() - 0.5) * self.noise;
        let position = Vec3::new(
            0.08 * (t_sec * 0.9).sin() + jitter(),
            0.03 * (t_sec * 1.7).sin() + jitter(),
            -0.45 + 0.02 * (t_sec * 0.5).cos() + jitter(),
        );
        let rotation = Vec3::new(
            0.15 * (t_sec * 1.3).sin(),
            0.35 * (t_sec * 0.7).sin(),
            0.05 * (t_sec * 2.1).cos(),
        );
        Transform::new(position, rotation)
    }
}
