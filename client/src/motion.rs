//! Local player movement: held keys to a bounded, wall-aware displacement per tick.
//!
//! This is unreconciled prediction. The position computed here is what gets rendered and
//! sent; nothing from the server ever corrects it.

use shared::{MapBounds, Rgb, Slot, Vec2, Wall, PLAYER_SIZE, PLAYER_SPEED};
use std::f32::consts::FRAC_1_SQRT_2;

/// Displacements at or below this on both axes do not count as movement.
pub const MOVE_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldKeys {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    /// Distance covered per tick along one axis.
    pub speed: f32,
    pub player_size: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: PLAYER_SPEED,
            player_size: PLAYER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPlayer {
    pub position: Vec2,
    pub color: Option<Rgb>,
    pub slot: Option<Slot>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionOutcome {
    pub moved: bool,
    pub position: Vec2,
}

#[derive(Debug)]
pub struct MotionController {
    config: MotionConfig,
    player: LocalPlayer,
}

impl MotionController {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            player: LocalPlayer::default(),
        }
    }

    pub fn player(&self) -> &LocalPlayer {
        &self.player
    }

    pub fn position(&self) -> Vec2 {
        self.player.position
    }

    pub fn config(&self) -> MotionConfig {
        self.config
    }

    /// Places the player at a room spawn.
    pub fn spawn(&mut self, player: LocalPlayer) {
        self.player = player;
    }

    pub fn reset(&mut self) {
        self.player = LocalPlayer::default();
    }

    /// Unit (or diagonal-normalised) direction for the held keys at `position`.
    ///
    /// Left wins over right and up over down, but only while that key can still move: a key
    /// pressed against the map edge it is touching yields to the opposite key, and an axis
    /// with no movable key contributes nothing, so the free axis keeps full speed.
    pub fn direction(&self, keys: HeldKeys, bounds: MapBounds) -> Vec2 {
        let size = self.config.player_size;
        let position = self.player.position;

        let mut dx = if keys.left && position.x > 0.0 {
            -1.0
        } else if keys.right && position.x < bounds.width - size {
            1.0
        } else {
            0.0
        };
        let mut dy = if keys.up && position.y > 0.0 {
            -1.0
        } else if keys.down && position.y < bounds.height - size {
            1.0
        } else {
            0.0
        };

        if dx != 0.0 && dy != 0.0 {
            dx *= FRAC_1_SQRT_2;
            dy *= FRAC_1_SQRT_2;
        }

        Vec2::new(dx, dy)
    }

    pub fn tick(&mut self, keys: HeldKeys, bounds: MapBounds, walls: &[Wall]) -> MotionOutcome {
        let origin = self.player.position;
        let direction = self.direction(keys, bounds);

        if direction == Vec2::ZERO {
            return MotionOutcome {
                moved: false,
                position: origin,
            };
        }

        let size = self.config.player_size;
        let candidate = bounds.clamp_box(origin + direction * self.config.speed, size);

        // X first, then Y against the possibly updated X, so diagonal contact slides.
        let mut position = origin;
        if !self.blocked(Vec2::new(candidate.x, position.y), bounds, walls) {
            position.x = candidate.x;
        }
        if !self.blocked(Vec2::new(position.x, candidate.y), bounds, walls) {
            position.y = candidate.y;
        }

        self.player.position = position;

        MotionOutcome {
            moved: (position.x - origin.x).abs() > MOVE_EPSILON
                || (position.y - origin.y).abs() > MOVE_EPSILON,
            position,
        }
    }

    fn blocked(&self, position: Vec2, bounds: MapBounds, walls: &[Wall]) -> bool {
        let size = self.config.player_size;
        !bounds.contains_box(position, size)
            || walls.iter().any(|wall| wall.overlaps_box(position, size))
    }
}
