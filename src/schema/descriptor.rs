//! The scene descriptor DSL: JSON documents declaring scenes, entities,
//! routes, dialogues, triggers, entrances and exits.
//!
//! These types mirror the on-disk shape exactly. `core::loader` turns them
//! into the runtime graph and rejects dangling references.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::conditions::Conditions;
use super::geometry::{Color, Direction, GridPos, GridRect};
use crate::core::flags::FlagMutation;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level guide listing every scene of the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneGuide {
    pub start_scene: String,
    #[serde(default)]
    pub start_entrance: String,
    pub scenes: Vec<SceneRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneRef {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescriptor {
    #[serde(default)]
    pub void_color: Color,
    pub bounds: GridPos,
    pub background_music: MusicDescriptor,
    #[serde(default)]
    pub map_elements: Vec<MapElementDescriptor>,
    #[serde(default)]
    pub entity_lookup: Vec<EntityLookupDescriptor>,
    pub player: PlayerDescriptor,
    #[serde(default)]
    pub triggers: Vec<TriggerDescriptor>,
    #[serde(default)]
    pub entrances: Vec<EntranceDescriptor>,
    #[serde(default)]
    pub exits: Vec<ExitDescriptor>,
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicDescriptor {
    pub identifier: String,
    #[serde(default)]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapElementDescriptor {
    pub rect: GridRect,
    pub image: String,
    #[serde(default)]
    pub collision: bool,
}

/// A reusable sprite binding referenced by entities and the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLookupDescriptor {
    pub id: String,
    pub sprite: String,
    #[serde(default)]
    pub default_animation: String,
    #[serde(default)]
    pub animation_frame_time: f32,
    #[serde(default)]
    pub collision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDescriptor {
    pub lookup: String,
    #[serde(default)]
    pub fallback_spawn: GridPos,
    pub move_duration: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: String,
    pub lookup: String,
    #[serde(default)]
    pub spawn: GridPos,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub dialogues: Vec<DialogueDescriptor>,
    #[serde(default)]
    pub routes: Vec<RouteDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub waypoints: Vec<WaypointDescriptor>,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointDescriptor {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default = "default_waypoint_speed")]
    pub speed: f32,
    #[serde(default, deserialize_with = "face_dir_or_default")]
    pub face_dir: Direction,
    #[serde(default)]
    pub wait: f32,
}

fn default_waypoint_speed() -> f32 {
    1.0
}

/// `face_dir` may be an empty string in older descriptors; that means "down".
fn face_dir_or_default<'de, D>(deserializer: D) -> Result<Direction, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.as_str() {
        "" | "down" => Ok(Direction::Down),
        "up" => Ok(Direction::Up),
        "left" => Ok(Direction::Left),
        "right" => Ok(Direction::Right),
        other => Err(serde::de::Error::unknown_variant(
            other,
            &["up", "down", "left", "right"],
        )),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub start_monologue: Vec<StartMonologueDescriptor>,
    #[serde(default)]
    pub monologues: Vec<MonologueDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMonologueDescriptor {
    pub id: String,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonologueDescriptor {
    pub id: String,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub alt_monologue: Option<String>,
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub lines: Vec<LineDescriptor>,
    #[serde(default)]
    pub font: String,
    #[serde(default)]
    pub next_monologue: Option<String>,
    #[serde(default)]
    pub set_route_on_reach: Vec<RouteAssignmentDescriptor>,
    #[serde(default)]
    pub dispatch_on_reach: Vec<DispatchDescriptor>,
    #[serde(default)]
    pub modify_flags_on_reach: Vec<FlagMutation>,
    #[serde(default)]
    pub options: Vec<OptionDescriptor>,
    #[serde(default)]
    pub speaker_image: Option<String>,
    #[serde(default)]
    pub speaking_sfx: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDescriptor {
    pub text: String,
    /// Seconds per revealed character.
    #[serde(default)]
    pub char_time: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAssignmentDescriptor {
    pub id: String,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub text: String,
    pub next_monologue: String,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub identifier: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub once: bool,
    #[serde(default)]
    pub catch: Vec<CatchDescriptor>,
    #[serde(default)]
    pub dispatch: Vec<DispatchDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchDescriptor {
    #[serde(flatten)]
    pub kind: CatchKindDescriptor,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum CatchKindDescriptor {
    OnPlayerEnter {
        rect: GridRect,
    },
    OnEntityEnter {
        ids: Vec<String>,
        rect: GridRect,
    },
    #[serde(rename = "on_scene_enter", alias = "on_scene_start")]
    OnSceneStart,
    OnSceneExit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchDescriptor {
    #[serde(flatten)]
    pub kind: DispatchKindDescriptor,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub wait_for_previous: bool,
    /// Pre-dispatch delay in seconds.
    #[serde(default)]
    pub wait: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum DispatchKindDescriptor {
    AddEntity {
        ids: Vec<String>,
    },
    RemoveEntity {
        ids: Vec<String>,
    },
    SetRoute {
        entity_id: String,
        route_id: String,
    },
    StartEntityDialogue {
        entity_id: String,
        dialogue_id: String,
    },
    StartIndependentDialogue {
        dialogue: Box<DialogueDescriptor>,
    },
    EndDialogue,
    MoveCameraToPos {
        pos: GridPos,
        #[serde(default)]
        duration: f32,
    },
    MoveCameraToEntity {
        entity_id: String,
        #[serde(default)]
        duration: f32,
    },
    MoveCameraFollowEntity {
        entity_id: String,
    },
    MovePlayer {
        waypoints: Vec<WaypointDescriptor>,
    },
    ResetCamera,
    ShakeCamera {
        time: f32,
        #[serde(default)]
        intensity: f32,
    },
    StopShakeCamera,
    PlayAudio {
        identifier: String,
        #[serde(default)]
        volume: f32,
    },
    FadeAudioVolume {
        fraction: f32,
    },
    EnableTrigger {
        identifier: String,
    },
    DisableTrigger {
        identifier: String,
    },
    StartEntityAnimation {
        entity_id: String,
        animation_name: String,
    },
    StopEntityAnimation {
        entity_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    #[serde(rename = "fade")]
    Fade,
    #[serde(rename = "no transition")]
    Teleport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntranceDescriptor {
    pub identifier: String,
    pub spawn: GridPos,
    #[serde(default)]
    pub transition: Option<TransitionKind>,
    #[serde(default)]
    pub transition_time: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitDescriptor {
    pub rect: GridRect,
    #[serde(default)]
    pub require_interact: bool,
    #[serde(default)]
    pub transition: Option<TransitionKind>,
    #[serde(default)]
    pub transition_time: f32,
    pub next_scene: String,
    #[serde(default)]
    pub entrance: String,
    #[serde(default)]
    pub conditions: Conditions,
}

impl SceneGuide {
    pub fn load(path: &Path) -> Result<SceneGuide, DescriptorError> {
        read_json(path)
    }
}

impl SceneDescriptor {
    pub fn load(path: &Path) -> Result<SceneDescriptor, DescriptorError> {
        read_json(path)
    }

    /// Parse a scene descriptor from a JSON string.
    pub fn parse_json(input: &str) -> Result<SceneDescriptor, DescriptorError> {
        serde_json::from_str(input).map_err(|source| DescriptorError::Json {
            path: "<inline>".to_string(),
            source,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DescriptorError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| DescriptorError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Treat `""` as an absent reference, as older descriptors write it.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_kinds_parse_by_name() {
        let c: CatchDescriptor = serde_json::from_str(
            r#"{"name": "on_entity_enter", "ids": ["gull"], "rect": {"x": 1, "y": 2, "w": 3, "h": 1},
                "conditions": {"all": ["storm"]}}"#,
        )
        .unwrap();
        assert!(matches!(c.kind, CatchKindDescriptor::OnEntityEnter { ref ids, .. } if ids == &["gull"]));
        assert_eq!(c.conditions.all, vec!["storm".to_string()]);

        let start: CatchDescriptor = serde_json::from_str(r#"{"name": "on_scene_enter"}"#).unwrap();
        assert!(matches!(start.kind, CatchKindDescriptor::OnSceneStart));
        assert!(start.conditions.is_unconditional());
    }

    #[test]
    fn dispatch_common_fields_sit_beside_the_tag() {
        let d: DispatchDescriptor = serde_json::from_str(
            r#"{"name": "move_camera_to_pos", "pos": {"x": 4, "y": 5}, "duration": 1.5,
                "wait_for_previous": true, "wait": 0.25}"#,
        )
        .unwrap();
        assert!(d.wait_for_previous);
        assert_eq!(d.wait, 0.25);
        match d.kind {
            DispatchKindDescriptor::MoveCameraToPos { pos, duration } => {
                assert_eq!(pos, GridPos::new(4, 5));
                assert_eq!(duration, 1.5);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn unknown_dispatch_name_is_an_error() {
        let result: Result<DispatchDescriptor, _> =
            serde_json::from_str(r#"{"name": "summon_dragon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn waypoint_defaults() {
        let w: WaypointDescriptor = serde_json::from_str(r#"{"x": 3, "face_dir": ""}"#).unwrap();
        assert_eq!(w.x, 3);
        assert_eq!(w.y, 0);
        assert_eq!(w.speed, 1.0);
        assert_eq!(w.face_dir, Direction::Down);
        assert_eq!(w.wait, 0.0);

        let w: WaypointDescriptor = serde_json::from_str(r#"{"face_dir": "left"}"#).unwrap();
        assert_eq!(w.face_dir, Direction::Left);
    }

    #[test]
    fn transitions_use_descriptor_spelling() {
        let e: EntranceDescriptor = serde_json::from_str(
            r#"{"identifier": "dock", "spawn": {"x": 1, "y": 1}, "transition": "no transition"}"#,
        )
        .unwrap();
        assert_eq!(e.transition, Some(TransitionKind::Teleport));
    }

    #[test]
    fn empty_alt_monologue_is_absent() {
        assert_eq!(non_empty(&Some(String::new())), None);
        assert_eq!(non_empty(&Some("b".to_string())), Some("b"));
        assert_eq!(non_empty(&None), None);
    }
}
