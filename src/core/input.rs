//! Logical input snapshot polled once per frame.

use serde::{Deserialize, Serialize};

use crate::schema::geometry::GridPos;

/// Which logical keys are held this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSnapshot {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub confirm: bool,
}

impl InputSnapshot {
    pub const NONE: InputSnapshot = InputSnapshot {
        up: false,
        down: false,
        left: false,
        right: false,
        confirm: false,
    };

    pub fn confirm() -> Self {
        Self {
            confirm: true,
            ..Self::NONE
        }
    }

    /// Movement intent from held keys, horizontal axis first.
    pub fn axis(&self) -> GridPos {
        let dx = self.right as i32 - self.left as i32;
        let dy = self.down as i32 - self.up as i32;
        GridPos::new(dx, dy).cardinal_step()
    }

    /// Keys held now that were not held in `previous`.
    pub fn pressed_since(&self, previous: &InputSnapshot) -> InputSnapshot {
        InputSnapshot {
            up: self.up && !previous.up,
            down: self.down && !previous.down,
            left: self.left && !previous.left,
            right: self.right && !previous.right,
            confirm: self.confirm && !previous.confirm,
        }
    }
}
