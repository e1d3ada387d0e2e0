//! Keyboard sampling: held movement keys plus edge-detected control presses

use crate::motion::HeldKeys;
use macroquad::prelude::*;

/// Raw key state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySample {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub escape: bool,
    pub debug: bool,
    pub start: bool,
    pub leave: bool,
    pub create: bool,
    pub join: bool,
}

impl KeySample {
    /// Reads the keyboard (arrow keys or WASD for movement)
    pub fn capture() -> Self {
        Self {
            left: is_key_down(KeyCode::Left) || is_key_down(KeyCode::A),
            right: is_key_down(KeyCode::Right) || is_key_down(KeyCode::D),
            up: is_key_down(KeyCode::Up) || is_key_down(KeyCode::W),
            down: is_key_down(KeyCode::Down) || is_key_down(KeyCode::S),
            escape: is_key_down(KeyCode::Escape),
            debug: is_key_down(KeyCode::F2),
            start: is_key_down(KeyCode::Enter),
            leave: is_key_down(KeyCode::L),
            create: is_key_down(KeyCode::C),
            join: is_key_down(KeyCode::J),
        }
    }
}

/// Control keys pressed this frame (down now, up last frame)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub escape: bool,
    pub toggle_debug: bool,
    pub start_game: bool,
    pub leave_room: bool,
    pub create_room: bool,
    pub join_room: bool,
}

impl Controls {
    pub fn any(&self) -> bool {
        self.escape
            || self.toggle_debug
            || self.start_game
            || self.leave_room
            || self.create_room
            || self.join_room
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub held: HeldKeys,
    pub controls: Controls,
}

/// Turns per-frame key samples into movement state and one-shot controls
#[derive(Debug, Default)]
pub struct InputManager {
    previous: KeySample,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the keyboard for this frame
    pub fn update(&mut self) -> InputFrame {
        self.apply(KeySample::capture())
    }

    pub fn apply(&mut self, sample: KeySample) -> InputFrame {
        let prev = self.previous;
        let pressed = |now: bool, before: bool| now && !before;

        let controls = Controls {
            escape: pressed(sample.escape, prev.escape),
            toggle_debug: pressed(sample.debug, prev.debug),
            start_game: pressed(sample.start, prev.start),
            leave_room: pressed(sample.leave, prev.leave),
            create_room: pressed(sample.create, prev.create),
            join_room: pressed(sample.join, prev.join),
        };

        self.previous = sample;

        InputFrame {
            held: HeldKeys {
                left: sample.left,
                right: sample.right,
                up: sample.up,
                down: sample.down,
            },
            controls,
        }
    }
}
