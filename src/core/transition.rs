//! Scene entrances and exits, and the overlay fade that carries the player
//! between scenes.

use tracing::debug;

use crate::core::entity::Entity;
use crate::core::flags::FlagStore;
use crate::schema::conditions::Conditions;
use crate::schema::descriptor::{EntranceDescriptor, ExitDescriptor, TransitionKind};
use crate::schema::geometry::{GridPos, GridRect};

/// Opaque overlay alpha.
pub const FADE_MAX: f32 = 255.0;

/// Overlay points per second to cover the full range in `time` seconds.
pub fn fade_step(time: f32) -> f32 {
    FADE_MAX / time.max(0.001)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntrance {
    pub id: String,
    pub spawn: GridPos,
    pub transition: Option<TransitionKind>,
    pub transition_time: f32,
}

impl From<&EntranceDescriptor> for SceneEntrance {
    fn from(desc: &EntranceDescriptor) -> Self {
        Self {
            id: desc.identifier.clone(),
            spawn: desc.spawn,
            transition: desc.transition,
            transition_time: desc.transition_time,
        }
    }
}

impl SceneEntrance {
    /// Fade the overlay out. True once it is fully clear.
    pub fn update(&self, fade: &mut f32, dt: f32) -> bool {
        match self.transition {
            Some(TransitionKind::Fade) => {
                *fade = (*fade - fade_step(self.transition_time) * dt).clamp(0.0, FADE_MAX);
                *fade == 0.0
            }
            Some(TransitionKind::Teleport) | None => {
                *fade = 0.0;
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneExit {
    pub rect: GridRect,
    /// Only taken on confirm while facing into `rect`.
    pub require_interact: bool,
    pub transition: Option<TransitionKind>,
    pub transition_time: f32,
    pub next_scene: String,
    pub entrance: String,
    pub conditions: Conditions,
}

impl From<&ExitDescriptor> for SceneExit {
    fn from(desc: &ExitDescriptor) -> Self {
        Self {
            rect: desc.rect,
            require_interact: desc.require_interact,
            transition: desc.transition,
            transition_time: desc.transition_time,
            next_scene: desc.next_scene.clone(),
            entrance: desc.entrance.clone(),
            conditions: desc.conditions.clone(),
        }
    }
}

impl SceneExit {
    pub fn available(&self, flags: &FlagStore) -> bool {
        self.conditions.satisfied(flags)
    }

    /// Walk-in exits fire when the player stands inside.
    pub fn entered(&self, cell: GridPos) -> bool {
        !self.require_interact && self.rect.contains(cell)
    }

    pub fn can_interact(&self, player: &Entity) -> bool {
        self.rect.contains(player.grid_pos + player.facing.offset())
    }

    /// Fade the overlay in. True once it is opaque, or immediately for
    /// instant transitions.
    pub fn update(&self, fade: &mut f32, dt: f32) -> bool {
        match self.transition {
            Some(TransitionKind::Fade) => {
                *fade = (*fade + fade_step(self.transition_time) * dt).clamp(0.0, FADE_MAX);
                let done = *fade == FADE_MAX;
                if done {
                    debug!(scene = %self.next_scene, "exit fade complete");
                }
                done
            }
            Some(TransitionKind::Teleport) | None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::geometry::Direction;

    fn exit(require_interact: bool) -> SceneExit {
        SceneExit {
            rect: GridRect::new(5, 0, 2, 1),
            require_interact,
            transition: Some(TransitionKind::Fade),
            transition_time: 0.5,
            next_scene: "harbour".to_string(),
            entrance: "pier".to_string(),
            conditions: Conditions::none_of(&["locked"]),
        }
    }

    #[test]
    fn entrance_fade_clears_overlay() {
        let entrance = SceneEntrance {
            id: "door".to_string(),
            spawn: GridPos::ZERO,
            transition: Some(TransitionKind::Fade),
            transition_time: 1.0,
        };
        let mut fade = FADE_MAX;
        assert!(!entrance.update(&mut fade, 0.5));
        assert!((fade - 127.5).abs() < 1e-3);
        assert!(entrance.update(&mut fade, 0.6));
        assert_eq!(fade, 0.0);
    }

    #[test]
    fn teleport_entrance_is_instant() {
        let entrance = SceneEntrance {
            id: "door".to_string(),
            spawn: GridPos::ZERO,
            transition: Some(TransitionKind::Teleport),
            transition_time: 0.0,
        };
        let mut fade = 200.0;
        assert!(entrance.update(&mut fade, 0.0));
        assert_eq!(fade, 0.0);
    }

    #[test]
    fn exit_fade_saturates() {
        let exit = exit(false);
        let mut fade = 0.0;
        assert!(!exit.update(&mut fade, 0.25));
        assert!(exit.update(&mut fade, 0.3));
        assert_eq!(fade, FADE_MAX);
    }

    #[test]
    fn walk_in_and_interact_regions() {
        let walk = exit(false);
        let door = exit(true);
        assert!(walk.entered(GridPos::new(6, 0)));
        assert!(!door.entered(GridPos::new(6, 0)));

        let mut player = Entity::new("player", GridPos::new(5, 1), 32.0);
        player.facing = Direction::Up;
        assert!(door.can_interact(&player));
        player.facing = Direction::Down;
        assert!(!door.can_interact(&player));
    }

    #[test]
    fn exit_gated_by_conditions() {
        let exit = exit(false);
        assert!(exit.available(&FlagStore::new()));
        let flags: FlagStore = ["locked"].iter().collect();
        assert!(!exit.available(&flags));
    }
}
