//! Owns every scene of a game, the flag store, and the cross-scene overlay
//! fade. Built via `SceneManager::builder()`.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::core::assets::AssetProvider;
use crate::core::audio::AudioSink;
use crate::core::config::EngineConfig;
use crate::core::flags::FlagStore;
use crate::core::input::InputSnapshot;
use crate::core::loader::{LoadError, SceneLoader};
use crate::core::render::Renderer;
use crate::core::scene::{Scene, SceneContext};
use crate::core::transition::FADE_MAX;
use crate::schema::descriptor::{DescriptorError, SceneDescriptor, SceneGuide};
use crate::schema::geometry::Direction;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scene '{scene}' failed to load: {source}")]
    Load {
        scene: String,
        #[source]
        source: LoadError,
    },
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("unknown scene: {0}")]
    UnknownScene(String),
    #[error("scene '{scene}' has no entrance '{entrance}'")]
    UnknownEntrance { scene: String, entrance: String },
    #[error("no scene is active")]
    NoActiveScene,
}

pub struct SceneManager {
    scenes: FxHashMap<String, Scene>,
    current: Option<String>,
    start_scene: String,
    start_entrance: String,
    flags: FlagStore,
    fade: f32,
}

/// Builder for constructing a `SceneManager`.
pub struct SceneManagerBuilder {
    guide: Option<PathBuf>,
    config: EngineConfig,
    descriptors: Vec<(String, SceneDescriptor)>,
    start: Option<(String, String)>,
    flags: FlagStore,
}

impl SceneManager {
    pub fn builder() -> SceneManagerBuilder {
        SceneManagerBuilder {
            guide: None,
            config: EngineConfig::default(),
            descriptors: Vec::new(),
            start: None,
            flags: FlagStore::new(),
        }
    }

    /// Register an already built scene, replacing any with the same name.
    pub fn add_scene(&mut self, scene: Scene) {
        self.scenes.insert(scene.name.clone(), scene);
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.get(name)
    }

    pub fn scene_mut(&mut self, name: &str) -> Option<&mut Scene> {
        self.scenes.get_mut(name)
    }

    /// Scene names, sorted.
    pub fn scene_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scenes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.current.as_deref().and_then(|name| self.scenes.get(name))
    }

    pub fn current_scene_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagStore {
        &mut self.flags
    }

    /// Overlay alpha, 0–255.
    pub fn fade(&self) -> f32 {
        self.fade
    }

    /// Enter the start scene from a black screen.
    pub fn start(&mut self, audio: &mut dyn AudioSink) -> Result<(), EngineError> {
        self.fade = FADE_MAX;
        let scene = self.start_scene.clone();
        let entrance = self.start_entrance.clone();
        self.load_scene(&scene, &entrance, Direction::Down, false, audio)
    }

    /// Leave the current scene and enter `name` through `entrance`.
    pub fn load_scene(
        &mut self,
        name: &str,
        entrance: &str,
        facing: Direction,
        resume: bool,
        audio: &mut dyn AudioSink,
    ) -> Result<(), EngineError> {
        if !self.scenes.contains_key(name) {
            return Err(EngineError::UnknownScene(name.to_string()));
        }
        let mut ctx = SceneContext {
            flags: &mut self.flags,
            audio,
            fade: &mut self.fade,
        };
        if let Some(current) = self.current.as_deref().and_then(|c| self.scenes.get_mut(c)) {
            current.unload(&mut ctx);
        }
        if let Some(scene) = self.scenes.get_mut(name) {
            scene.load(entrance, facing, resume, &mut ctx);
        }
        info!(scene = %name, entrance = %entrance, "scene switched");
        self.current = Some(name.to_string());
        Ok(())
    }

    /// One frame: input, then update, then any scene switch the update
    /// asked for.
    pub fn frame(
        &mut self,
        held: &InputSnapshot,
        dt: f32,
        audio: &mut dyn AudioSink,
    ) -> Result<(), EngineError> {
        let name = self.current.clone().ok_or(EngineError::NoActiveScene)?;
        let scene = self
            .scenes
            .get_mut(&name)
            .ok_or_else(|| EngineError::UnknownScene(name.clone()))?;
        let mut ctx = SceneContext {
            flags: &mut self.flags,
            audio: &mut *audio,
            fade: &mut self.fade,
        };
        scene.input(held, &mut ctx);
        let request = scene.update(dt, &mut ctx);
        if let Some(request) = request {
            self.load_scene(&request.scene, &request.entrance, request.facing, false, audio)?;
        }
        Ok(())
    }

    pub fn render(&self, renderer: &mut dyn Renderer) -> Result<(), EngineError> {
        let scene = self.current_scene().ok_or(EngineError::NoActiveScene)?;
        scene.render(renderer, &self.flags);
        if self.fade > 0.0 {
            renderer.draw_overlay(self.fade.round().clamp(0.0, FADE_MAX) as u8);
        }
        Ok(())
    }
}

impl SceneManagerBuilder {
    /// Load scenes from a guide file. Scene paths are relative to it.
    pub fn guide(mut self, path: &Path) -> Self {
        self.guide = Some(path.to_path_buf());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Provide a scene descriptor directly (for testing without files).
    pub fn with_scene(mut self, name: &str, descriptor: SceneDescriptor) -> Self {
        self.descriptors.push((name.to_string(), descriptor));
        self
    }

    /// Override the guide's start scene and entrance.
    pub fn start(mut self, scene: &str, entrance: &str) -> Self {
        self.start = Some((scene.to_string(), entrance.to_string()));
        self
    }

    /// Seed the flag store.
    pub fn flags(mut self, flags: FlagStore) -> Self {
        self.flags = flags;
        self
    }

    pub fn build(self, assets: &dyn AssetProvider) -> Result<SceneManager, EngineError> {
        let mut descriptors = Vec::new();
        let mut start = None;
        if let Some(path) = &self.guide {
            let guide = SceneGuide::load(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            for scene in &guide.scenes {
                descriptors.push((scene.name.clone(), SceneDescriptor::load(&base.join(&scene.path))?));
            }
            info!(guide = %path.display(), scenes = guide.scenes.len(), "scene guide loaded");
            start = Some((guide.start_scene, guide.start_entrance));
        }
        descriptors.extend(self.descriptors);
        let (start_scene, start_entrance) = self
            .start
            .or(start)
            .or_else(|| descriptors.first().map(|(name, _)| (name.clone(), String::new())))
            .ok_or_else(|| EngineError::UnknownScene(String::new()))?;

        let loader = SceneLoader::new(assets, &self.config);
        let mut scenes = FxHashMap::default();
        for (name, descriptor) in &descriptors {
            let scene = loader.load(name, descriptor).map_err(|source| EngineError::Load {
                scene: name.clone(),
                source,
            })?;
            if scenes.insert(name.clone(), scene).is_some() {
                return Err(EngineError::Load {
                    scene: name.clone(),
                    source: LoadError::DuplicateId {
                        kind: "scene",
                        id: name.clone(),
                    },
                });
            }
        }

        check_links(&scenes, &start_scene, &start_entrance)?;

        Ok(SceneManager {
            scenes,
            current: None,
            start_scene,
            start_entrance,
            flags: self.flags,
            fade: 0.0,
        })
    }
}

fn check_entrance(
    scenes: &FxHashMap<String, Scene>,
    scene: &str,
    entrance: &str,
) -> Result<(), EngineError> {
    let target = scenes
        .get(scene)
        .ok_or_else(|| EngineError::UnknownScene(scene.to_string()))?;
    if !entrance.is_empty() && target.entrance(entrance).is_none() {
        return Err(EngineError::UnknownEntrance {
            scene: scene.to_string(),
            entrance: entrance.to_string(),
        });
    }
    Ok(())
}

/// Every exit and the start point must name a real scene and, if given,
/// a real entrance.
fn check_links(
    scenes: &FxHashMap<String, Scene>,
    start_scene: &str,
    start_entrance: &str,
) -> Result<(), EngineError> {
    check_entrance(scenes, start_scene, start_entrance)?;
    for scene in scenes.values() {
        for exit in &scene.exits {
            check_entrance(scenes, &exit.next_scene, &exit.entrance)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assets::{AssetRegistry, SpriteSheet};
    use crate::core::audio::RecordingAudio;
    use crate::core::render::{DrawCommand, RecordingRenderer};
    use crate::core::scene::SceneState;
    use crate::schema::geometry::{GridPos, Vec2};

    fn assets() -> AssetRegistry {
        let mut assets = AssetRegistry::new();
        let image = assets.add_image("walker", "walker.png").unwrap();
        assets.add_audio("waves", "waves.ogg").unwrap();
        assets
            .add_sprite(
                "walker",
                SpriteSheet {
                    image,
                    dimensions: Vec2::new(32.0, 32.0),
                    animations: Vec::new(),
                    row_major: true,
                    num_frames: 1,
                },
            )
            .unwrap();
        assets
    }

    fn descriptor(entrance: &str, spawn: (i32, i32), exit_to: &str, exit_entrance: &str) -> SceneDescriptor {
        let json = format!(
            r#"{{
                "bounds": {{"x": 10, "y": 10}},
                "background_music": {{"identifier": "waves", "volume": 1.0}},
                "entity_lookup": [{{"id": "walker", "sprite": "walker"}}],
                "player": {{"lookup": "walker", "move_duration": 0.1}},
                "entrances": [{{"identifier": "{entrance}", "spawn": {{"x": {}, "y": {}}},
                                "transition": "fade", "transition_time": 0.5}}],
                "exits": [{{"rect": {{"x": 9, "y": 5, "w": 1, "h": 1}}, "transition": "fade",
                            "transition_time": 0.1, "next_scene": "{exit_to}", "entrance": "{exit_entrance}"}}]
            }}"#,
            spawn.0, spawn.1
        );
        SceneDescriptor::parse_json(&json).unwrap()
    }

    fn manager() -> SceneManager {
        SceneManager::builder()
            .with_scene("lighthouse", descriptor("stairs", (8, 5), "cliffs", "path"))
            .with_scene("cliffs", descriptor("path", (1, 1), "lighthouse", "stairs"))
            .start("lighthouse", "stairs")
            .build(&assets())
            .unwrap()
    }

    #[test]
    fn walking_through_an_exit_switches_scenes() {
        let mut manager = manager();
        let mut audio = RecordingAudio::new();
        manager.start(&mut audio).unwrap();
        assert_eq!(manager.current_scene_name(), Some("lighthouse"));

        let right = InputSnapshot {
            right: true,
            ..InputSnapshot::NONE
        };
        for _ in 0..40 {
            manager.frame(&right, 0.05, &mut audio).unwrap();
            if manager.current_scene_name() == Some("cliffs") {
                break;
            }
        }
        assert_eq!(manager.current_scene_name(), Some("cliffs"));
        assert_eq!(manager.fade(), 255.0);
        let scene = manager.current_scene().unwrap();
        assert_eq!(scene.state(), SceneState::Entering);
        assert_eq!(scene.world.player.entity.grid_pos, GridPos::new(1, 1));
        assert_eq!(scene.world.player.entity.facing, Direction::Right);
        assert_eq!(manager.scene("lighthouse").map(Scene::state), Some(SceneState::Exited));

        let mut renderer = RecordingRenderer::new();
        manager.render(&mut renderer).unwrap();
        assert_eq!(renderer.commands.last(), Some(&DrawCommand::Overlay(255)));

        for _ in 0..12 {
            manager.frame(&InputSnapshot::NONE, 0.05, &mut audio).unwrap();
        }
        assert_eq!(manager.fade(), 0.0);
        assert_eq!(manager.current_scene().map(Scene::state), Some(SceneState::Entered));
        manager.render(&mut renderer).unwrap();
        assert!(!renderer.commands.iter().any(|c| matches!(c, DrawCommand::Overlay(_))));
    }

    #[test]
    fn frame_without_a_scene_fails() {
        let mut manager = manager();
        let mut audio = RecordingAudio::new();
        assert!(matches!(
            manager.frame(&InputSnapshot::NONE, 0.1, &mut audio),
            Err(EngineError::NoActiveScene)
        ));
        assert!(matches!(
            manager.load_scene("attic", "", Direction::Down, false, &mut audio),
            Err(EngineError::UnknownScene(_))
        ));
    }

    #[test]
    fn dangling_exit_is_rejected() {
        let result = SceneManager::builder()
            .with_scene("lighthouse", descriptor("stairs", (8, 5), "cliffs", "path"))
            .build(&assets());
        assert!(matches!(result, Err(EngineError::UnknownScene(s)) if s == "cliffs"));

        let result = SceneManager::builder()
            .with_scene("lighthouse", descriptor("stairs", (8, 5), "cliffs", "cave"))
            .with_scene("cliffs", descriptor("path", (1, 1), "lighthouse", "stairs"))
            .build(&assets());
        assert!(matches!(result, Err(EngineError::UnknownEntrance { entrance, .. }) if entrance == "cave"));
    }

    #[test]
    fn flags_persist_across_scenes() {
        let mut manager = manager();
        let mut audio = RecordingAudio::new();
        manager.start(&mut audio).unwrap();
        manager.flags_mut().set("lamp_lit");
        manager
            .load_scene("cliffs", "path", Direction::Up, false, &mut audio)
            .unwrap();
        assert!(manager.flags().is_set("lamp_lit"));
        assert_eq!(manager.scene_names(), vec!["cliffs", "lighthouse"]);
    }
}
