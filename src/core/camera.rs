//! Scene camera: tracking, eased moves, and shake.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::schema::geometry::Vec2;

/// What the camera centres on when it is not tweening.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CameraTarget {
    #[default]
    Free,
    Player,
    Entity(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Tween {
    from: Vec2,
    to: Vec2,
    elapsed: f32,
    duration: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Shake {
    remaining: f32,
    intensity: f32,
}

/// `(1 - cos(πt)) / 2`, for `t` in `[0, 1]`.
pub fn ease_in_out(t: f32) -> f32 {
    (1.0 - (std::f32::consts::PI * t).cos()) / 2.0
}

/// Owned by a scene. `pos` is the top-left of the viewport in world pixels.
#[derive(Debug, Clone)]
pub struct Camera {
    pos: Vec2,
    window: Vec2,
    tracking: CameraTarget,
    tween: Option<Tween>,
    shake: Option<Shake>,
    jitter: Vec2,
    rng: StdRng,
}

impl Camera {
    pub fn new(window: Vec2, seed: u64) -> Self {
        Self {
            pos: Vec2::ZERO,
            window,
            tracking: CameraTarget::Free,
            tween: None,
            shake: None,
            jitter: Vec2::ZERO,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn position(&self) -> Vec2 {
        self.pos
    }

    pub fn tracking(&self) -> &CameraTarget {
        &self.tracking
    }

    pub fn track(&mut self, target: CameraTarget) {
        self.tracking = target;
    }

    pub fn is_moving(&self) -> bool {
        self.tween.is_some()
    }

    pub fn is_shaking(&self) -> bool {
        self.shake.is_some()
    }

    /// Viewport origin that centres `focus`, clamped to the scene.
    fn centred(&self, focus: Vec2, bounds: Vec2) -> Vec2 {
        let raw = focus - self.window * 0.5;
        Vec2::new(
            raw.x.min(bounds.x - self.window.x).max(0.0),
            raw.y.min(bounds.y - self.window.y).max(0.0),
        )
    }

    /// Jump so `focus` is centred.
    pub fn center_on(&mut self, focus: Vec2, bounds: Vec2) {
        self.pos = self.centred(focus, bounds);
    }

    /// Ease towards centring `focus` over `duration` seconds. Stops tracking.
    /// A non-positive duration jumps immediately.
    pub fn move_to(&mut self, focus: Vec2, duration: f32, bounds: Vec2) {
        self.tracking = CameraTarget::Free;
        let to = self.centred(focus, bounds);
        if duration <= 0.0 {
            self.pos = to;
            self.tween = None;
            return;
        }
        self.tween = Some(Tween {
            from: self.pos,
            to,
            elapsed: 0.0,
            duration,
        });
    }

    pub fn shake(&mut self, time: f32, intensity: f32) {
        self.shake = Some(Shake {
            remaining: time,
            intensity,
        });
    }

    pub fn stop_shake(&mut self) {
        self.shake = None;
        self.jitter = Vec2::ZERO;
    }

    /// Advance one frame. `focus` is the tracked actor's pixel position,
    /// if the camera is tracking one that still exists.
    pub fn update(&mut self, dt: f32, focus: Option<Vec2>, bounds: Vec2) {
        if let Some(tween) = &mut self.tween {
            tween.elapsed += dt;
            let t = (tween.elapsed / tween.duration).min(1.0);
            if t >= 1.0 {
                self.pos = tween.to;
                self.tween = None;
            } else {
                self.pos = tween.from.lerp(tween.to, ease_in_out(t));
            }
        } else if let Some(focus) = focus {
            self.center_on(focus, bounds);
        }

        if let Some(shake) = &mut self.shake {
            shake.remaining -= dt;
            if shake.remaining <= 0.0 {
                self.stop_shake();
            } else if shake.intensity > 0.0 {
                let i = shake.intensity;
                self.jitter = Vec2::new(self.rng.gen_range(-i..=i), self.rng.gen_range(-i..=i));
            }
        }
    }

    /// World pixel position to camera space.
    pub fn view_position(&self, world: Vec2) -> Vec2 {
        world - self.pos - self.jitter
    }
}
