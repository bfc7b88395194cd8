//! Build a runtime `Scene` from its descriptor.
//!
//! Every cross-reference (entities, routes, dialogues, monologues, triggers,
//! assets) is resolved here. A scene that loads never looks anything up by a
//! name that does not exist, except for roster membership, which dispatch
//! events change at runtime.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::core::assets::{AssetError, AssetProvider, AudioHandle, ImageHandle};
use crate::core::audio::BackgroundMusic;
use crate::core::config::EngineConfig;
use crate::core::dialogue::{
    Dialogue, Monologue, MonologueLine, MonologueOption, RouteAssignment, StartCandidate,
};
use crate::core::dispatch::{CatchEvent, CatchKind, DispatchChain, DispatchEvent, DispatchKind};
use crate::core::entity::{Entity, Interactable, MapElement, Player, SpriteState, SCRIPTED_ROUTE};
use crate::core::route::{EntityRoute, RouteTable, Waypoint};
use crate::core::scene::{Scene, SceneWorld};
use crate::core::transition::{SceneEntrance, SceneExit};
use crate::core::trigger::Trigger;
use crate::schema::conditions::Conditions;
use crate::schema::descriptor::{
    non_empty, CatchDescriptor, CatchKindDescriptor, DescriptorError, DialogueDescriptor,
    DispatchDescriptor, DispatchKindDescriptor, EntityLookupDescriptor, MonologueDescriptor,
    SceneDescriptor,
};
use crate::schema::geometry::{GridPos, Vec2};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("unknown {kind} asset: {name}")]
    UnknownAsset { kind: &'static str, name: String },
    #[error("unknown entity lookup: {0}")]
    UnknownLookup(String),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("entity '{entity}' has no route '{route}'")]
    UnknownRoute { entity: String, route: String },
    #[error("entity '{entity}' has no dialogue '{dialogue}'")]
    UnknownDialogue { entity: String, dialogue: String },
    #[error("dialogue '{dialogue}' has no monologue '{monologue}'")]
    UnknownMonologue { dialogue: String, monologue: String },
    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("alt_monologue cycle in dialogue '{dialogue}' at '{monologue}'")]
    AltMonologueCycle { dialogue: String, monologue: String },
    #[error("dialogue '{0}' has no monologues")]
    EmptyDialogue(String),
}

/// Ids declared by one entity.
#[derive(Default)]
struct EntityIds<'d> {
    routes: FxHashSet<&'d str>,
    dialogues: FxHashSet<&'d str>,
}

/// Every id a scene declares, collected before anything is built so
/// forward references resolve.
#[derive(Default)]
struct Catalog<'d> {
    lookups: FxHashMap<&'d str, &'d EntityLookupDescriptor>,
    entities: FxHashMap<&'d str, EntityIds<'d>>,
    triggers: FxHashSet<&'d str>,
}

fn unique<'d>(seen: &mut FxHashSet<&'d str>, kind: &'static str, id: &'d str) -> Result<(), LoadError> {
    if !seen.insert(id) {
        return Err(LoadError::DuplicateId {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

impl<'d> Catalog<'d> {
    fn collect(desc: &'d SceneDescriptor) -> Result<Self, LoadError> {
        let mut catalog = Catalog::default();
        for lookup in &desc.entity_lookup {
            if catalog.lookups.insert(&lookup.id, lookup).is_some() {
                return Err(LoadError::DuplicateId {
                    kind: "entity_lookup",
                    id: lookup.id.clone(),
                });
            }
        }
        for entity in &desc.entities {
            let mut ids = EntityIds::default();
            for route in &entity.routes {
                unique(&mut ids.routes, "route", &route.id)?;
            }
            for dialogue in &entity.dialogues {
                unique(&mut ids.dialogues, "dialogue", &dialogue.id)?;
            }
            if catalog.entities.insert(&entity.id, ids).is_some() {
                return Err(LoadError::DuplicateId {
                    kind: "entity",
                    id: entity.id.clone(),
                });
            }
        }
        for trigger in &desc.triggers {
            unique(&mut catalog.triggers, "trigger", &trigger.identifier)?;
        }
        Ok(catalog)
    }

    fn entity(&self, id: &str) -> Result<&EntityIds<'d>, LoadError> {
        self.entities
            .get(id)
            .ok_or_else(|| LoadError::UnknownEntity(id.to_string()))
    }

    fn route(&self, entity: &str, route: &str) -> Result<(), LoadError> {
        if self.entity(entity)?.routes.contains(route) {
            Ok(())
        } else {
            Err(LoadError::UnknownRoute {
                entity: entity.to_string(),
                route: route.to_string(),
            })
        }
    }

    fn dialogue(&self, entity: &str, dialogue: &str) -> Result<(), LoadError> {
        if self.entity(entity)?.dialogues.contains(dialogue) {
            Ok(())
        } else {
            Err(LoadError::UnknownDialogue {
                entity: entity.to_string(),
                dialogue: dialogue.to_string(),
            })
        }
    }

    fn trigger(&self, id: &str) -> Result<(), LoadError> {
        if self.triggers.contains(id) {
            Ok(())
        } else {
            Err(LoadError::UnknownTrigger(id.to_string()))
        }
    }
}

/// Turns descriptors into scenes against one asset provider and config.
pub struct SceneLoader<'a> {
    assets: &'a dyn AssetProvider,
    config: &'a EngineConfig,
}

impl<'a> SceneLoader<'a> {
    pub fn new(assets: &'a dyn AssetProvider, config: &'a EngineConfig) -> Self {
        Self { assets, config }
    }

    pub fn load(&self, name: &str, desc: &SceneDescriptor) -> Result<Scene, LoadError> {
        let catalog = Catalog::collect(desc)?;
        let tile = self.config.tile_size;

        let music = BackgroundMusic::new(
            self.audio(&desc.background_music.identifier)?,
            desc.background_music.volume,
        );

        let (sprite, hit_box, collision) = self.sprite(&catalog, &desc.player.lookup)?;
        let mut player_entity = Entity::new("player", desc.player.fallback_spawn, tile);
        player_entity.sprite = sprite;
        player_entity.hit_box = hit_box;
        player_entity.collision = collision;
        let player = Player::new(player_entity, desc.player.move_duration);

        let mut world = SceneWorld::new(player, desc.bounds, music, self.config.clone());

        for element in &desc.map_elements {
            world.map_elements.push(MapElement {
                rect: element.rect,
                image: self.image(&element.image)?,
                collision: element.collision,
            });
        }

        for entity_desc in &desc.entities {
            let (sprite, hit_box, collision) = self.sprite(&catalog, &entity_desc.lookup)?;
            let mut entity = Entity::new(&entity_desc.id, entity_desc.spawn, tile);
            entity.sprite = sprite;
            entity.hit_box = hit_box;
            entity.collision = collision;
            entity.conditions = entity_desc.conditions.clone();
            entity.routes = RouteTable::new(entity_desc.routes.iter().map(EntityRoute::from).collect());
            if !entity_desc.dialogues.is_empty() {
                let dialogues = entity_desc
                    .dialogues
                    .iter()
                    .map(|d| self.dialogue(d, Some(&entity_desc.id), &catalog))
                    .collect::<Result<Vec<_>, _>>()?;
                entity.interactable = Some(Interactable::new(dialogues));
            }
            world.add_entity(entity);
        }

        for trigger_desc in &desc.triggers {
            let catches = trigger_desc
                .catch
                .iter()
                .map(|c| self.catch(c, &catalog))
                .collect::<Result<Vec<_>, _>>()?;
            let mut trigger = Trigger::new(
                &trigger_desc.identifier,
                catches,
                self.chain(&trigger_desc.dispatch, &catalog)?,
            );
            trigger.disabled = trigger_desc.disabled;
            trigger.once = trigger_desc.once;
            world.triggers.push(trigger);
        }

        let mut entrance_ids = FxHashSet::default();
        for entrance in &desc.entrances {
            unique(&mut entrance_ids, "entrance", &entrance.identifier)?;
        }
        let entrances = desc.entrances.iter().map(SceneEntrance::from).collect();
        let exits = desc.exits.iter().map(SceneExit::from).collect();

        debug!(
            scene = %name,
            entities = desc.entities.len(),
            triggers = desc.triggers.len(),
            "scene built"
        );
        Ok(Scene::new(name, desc.void_color, world, entrances, exits))
    }

    fn image(&self, name: &str) -> Result<ImageHandle, LoadError> {
        self.assets.image(name).ok_or_else(|| LoadError::UnknownAsset {
            kind: "image",
            name: name.to_string(),
        })
    }

    fn audio(&self, name: &str) -> Result<AudioHandle, LoadError> {
        self.assets.audio(name).ok_or_else(|| LoadError::UnknownAsset {
            kind: "audio",
            name: name.to_string(),
        })
    }

    /// Sprite state, hit box in cells, and collision flag for a lookup.
    fn sprite(&self, catalog: &Catalog<'_>, lookup: &str) -> Result<(SpriteState, GridPos, bool), LoadError> {
        let entry = catalog
            .lookups
            .get(lookup)
            .ok_or_else(|| LoadError::UnknownLookup(lookup.to_string()))?;
        let sheet = self
            .assets
            .sprite(&entry.sprite)
            .ok_or_else(|| LoadError::UnknownAsset {
                kind: "sprite",
                name: entry.sprite.clone(),
            })?;
        let hit_box = cells(sheet.dimensions, self.config.tile_size);
        let state = SpriteState::new(sheet, &entry.default_animation, entry.animation_frame_time);
        Ok((state, hit_box, entry.collision))
    }

    fn catch(&self, desc: &CatchDescriptor, catalog: &Catalog<'_>) -> Result<CatchEvent, LoadError> {
        let kind = match &desc.kind {
            CatchKindDescriptor::OnPlayerEnter { rect } => CatchKind::OnPlayerEnter { rect: *rect },
            CatchKindDescriptor::OnEntityEnter { ids, rect } => {
                for id in ids {
                    catalog.entity(id)?;
                }
                CatchKind::OnEntityEnter {
                    ids: ids.clone(),
                    rect: *rect,
                }
            }
            CatchKindDescriptor::OnSceneStart => CatchKind::OnSceneStart,
            CatchKindDescriptor::OnSceneExit => CatchKind::OnSceneExit,
        };
        Ok(CatchEvent {
            kind,
            conditions: desc.conditions.clone(),
        })
    }

    fn chain(&self, events: &[DispatchDescriptor], catalog: &Catalog<'_>) -> Result<DispatchChain, LoadError> {
        let events = events
            .iter()
            .map(|e| self.event(e, catalog))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DispatchChain::new(events))
    }

    fn event(&self, desc: &DispatchDescriptor, catalog: &Catalog<'_>) -> Result<DispatchEvent, LoadError> {
        let kind = match &desc.kind {
            DispatchKindDescriptor::AddEntity { ids } => {
                for id in ids {
                    catalog.entity(id)?;
                }
                DispatchKind::AddEntity { ids: ids.clone() }
            }
            DispatchKindDescriptor::RemoveEntity { ids } => {
                for id in ids {
                    catalog.entity(id)?;
                }
                DispatchKind::RemoveEntity { ids: ids.clone() }
            }
            DispatchKindDescriptor::SetRoute {
                entity_id,
                route_id,
            } => {
                catalog.route(entity_id, route_id)?;
                DispatchKind::SetEntityRoute {
                    entity_id: entity_id.clone(),
                    route_id: route_id.clone(),
                }
            }
            DispatchKindDescriptor::StartEntityDialogue {
                entity_id,
                dialogue_id,
            } => {
                catalog.dialogue(entity_id, dialogue_id)?;
                DispatchKind::BeginEntityDialogue {
                    entity_id: entity_id.clone(),
                    dialogue_id: dialogue_id.clone(),
                }
            }
            DispatchKindDescriptor::StartIndependentDialogue { dialogue } => {
                DispatchKind::BeginIndependentDialogue {
                    dialogue: Box::new(self.dialogue(dialogue, None, catalog)?),
                }
            }
            DispatchKindDescriptor::EndDialogue => DispatchKind::EndDialogueAbruptly,
            DispatchKindDescriptor::MoveCameraToPos { pos, duration } => {
                DispatchKind::MoveCameraToPosition {
                    pos: *pos,
                    duration: *duration,
                }
            }
            DispatchKindDescriptor::MoveCameraToEntity {
                entity_id,
                duration,
            } => {
                catalog.entity(entity_id)?;
                DispatchKind::MoveCameraToEntity {
                    entity_id: entity_id.clone(),
                    duration: *duration,
                }
            }
            DispatchKindDescriptor::MoveCameraFollowEntity { entity_id } => {
                catalog.entity(entity_id)?;
                DispatchKind::MoveCameraFollowEntity {
                    entity_id: entity_id.clone(),
                }
            }
            DispatchKindDescriptor::MovePlayer { waypoints } => DispatchKind::MovePlayerAlongRoute {
                route: EntityRoute {
                    id: SCRIPTED_ROUTE.to_string(),
                    waypoints: waypoints.iter().map(Waypoint::from).collect(),
                    conditions: Conditions::always(),
                },
            },
            DispatchKindDescriptor::ResetCamera => DispatchKind::ResetCameraTracking,
            DispatchKindDescriptor::ShakeCamera { time, intensity } => DispatchKind::ShakeCamera {
                time: *time,
                intensity: *intensity,
            },
            DispatchKindDescriptor::StopShakeCamera => DispatchKind::StopCameraShake,
            DispatchKindDescriptor::PlayAudio { identifier, volume } => DispatchKind::PlayAudio {
                audio: self.audio(identifier)?,
                volume: *volume,
            },
            DispatchKindDescriptor::FadeAudioVolume { fraction } => {
                DispatchKind::FadeAudioVolume { fraction: *fraction }
            }
            DispatchKindDescriptor::EnableTrigger { identifier } => {
                catalog.trigger(identifier)?;
                DispatchKind::EnableTrigger {
                    trigger_id: identifier.clone(),
                }
            }
            DispatchKindDescriptor::DisableTrigger { identifier } => {
                catalog.trigger(identifier)?;
                DispatchKind::DisableTrigger {
                    trigger_id: identifier.clone(),
                }
            }
            DispatchKindDescriptor::StartEntityAnimation {
                entity_id,
                animation_name,
            } => {
                catalog.entity(entity_id)?;
                DispatchKind::StartEntityAnimation {
                    entity_id: entity_id.clone(),
                    animation: animation_name.clone(),
                }
            }
            DispatchKindDescriptor::StopEntityAnimation { entity_id } => {
                catalog.entity(entity_id)?;
                DispatchKind::StopEntityAnimation {
                    entity_id: entity_id.clone(),
                }
            }
        };

        let mut event = DispatchEvent::new(kind)
            .with_conditions(desc.conditions.clone())
            .with_wait(desc.wait.max(0.0));
        event.wait_for_previous = desc.wait_for_previous;
        Ok(event)
    }

    /// `owner` is the entity whose routes `set_route_on_reach` may name.
    fn dialogue(
        &self,
        desc: &DialogueDescriptor,
        owner: Option<&str>,
        catalog: &Catalog<'_>,
    ) -> Result<Dialogue, LoadError> {
        if desc.monologues.is_empty() {
            return Err(LoadError::EmptyDialogue(desc.id.clone()));
        }
        let mut ids = FxHashSet::default();
        for monologue in &desc.monologues {
            unique(&mut ids, "monologue", &monologue.id)?;
        }
        let known = |monologue: &str| -> Result<(), LoadError> {
            if ids.contains(monologue) {
                Ok(())
            } else {
                Err(LoadError::UnknownMonologue {
                    dialogue: desc.id.clone(),
                    monologue: monologue.to_string(),
                })
            }
        };

        let mut start = Vec::with_capacity(desc.start_monologue.len());
        for candidate in &desc.start_monologue {
            known(&candidate.id)?;
            start.push(StartCandidate {
                monologue: candidate.id.clone(),
                conditions: candidate.conditions.clone(),
            });
        }

        let mut monologues = Vec::with_capacity(desc.monologues.len());
        for m in &desc.monologues {
            for target in [non_empty(&m.next_monologue), non_empty(&m.alt_monologue)]
                .into_iter()
                .flatten()
            {
                known(target)?;
            }
            for option in &m.options {
                known(&option.next_monologue)?;
            }
            for assignment in &m.set_route_on_reach {
                match owner {
                    Some(entity) => catalog.route(entity, &assignment.id)?,
                    None => {
                        return Err(LoadError::UnknownRoute {
                            entity: String::new(),
                            route: assignment.id.clone(),
                        })
                    }
                }
            }
            monologues.push(self.monologue(m, catalog)?);
        }

        check_alt_cycles(&desc.id, &desc.monologues)?;

        let mut dialogue = Dialogue::new(&desc.id, start, monologues);
        dialogue.conditions = desc.conditions.clone();
        dialogue.fade_rate = self.config.dialogue_fade_rate;
        Ok(dialogue)
    }

    fn monologue(&self, desc: &MonologueDescriptor, catalog: &Catalog<'_>) -> Result<Monologue, LoadError> {
        let lines = desc
            .lines
            .iter()
            .map(|l| MonologueLine::new(&l.text, l.char_time))
            .collect();
        let mut monologue = Monologue::new(&desc.id, &desc.speaker, lines);
        monologue.conditions = desc.conditions.clone();
        monologue.alt_monologue = non_empty(&desc.alt_monologue).map(str::to_string);
        monologue.next_monologue = non_empty(&desc.next_monologue).map(str::to_string);
        monologue.font = if desc.font.is_empty() {
            None
        } else {
            Some(self.assets.font(&desc.font).ok_or_else(|| LoadError::UnknownAsset {
                kind: "font",
                name: desc.font.clone(),
            })?)
        };
        monologue.set_route = desc
            .set_route_on_reach
            .iter()
            .map(|r| RouteAssignment {
                route: r.id.clone(),
                conditions: r.conditions.clone(),
            })
            .collect();
        monologue.dispatch = self.chain(&desc.dispatch_on_reach, catalog)?;
        monologue.modify_flags = desc.modify_flags_on_reach.clone();
        monologue.options = desc
            .options
            .iter()
            .map(|o| MonologueOption {
                text: o.text.clone(),
                next_monologue: o.next_monologue.clone(),
                conditions: o.conditions.clone(),
            })
            .collect();
        monologue.speaker_image = non_empty(&desc.speaker_image)
            .map(|name| self.image(name))
            .transpose()?;
        monologue.speaking_sfx = non_empty(&desc.speaking_sfx)
            .map(|name| self.audio(name))
            .transpose()?;
        monologue.choice_fade_rate = self.config.choice_fade_rate;
        Ok(monologue)
    }
}

/// Sprite pixel size to whole cells, at least one in each axis.
fn cells(dimensions: Vec2, tile_size: f32) -> GridPos {
    if tile_size <= 0.0 {
        return GridPos::new(1, 1);
    }
    GridPos::new(
        ((dimensions.x / tile_size) as i32).max(1),
        ((dimensions.y / tile_size) as i32).max(1),
    )
}

/// Reject any loop of `alt_monologue` links, satisfiable or not.
fn check_alt_cycles(dialogue: &str, monologues: &[MonologueDescriptor]) -> Result<(), LoadError> {
    let alt: FxHashMap<&str, &str> = monologues
        .iter()
        .filter_map(|m| non_empty(&m.alt_monologue).map(|a| (m.id.as_str(), a)))
        .collect();
    for start in alt.keys() {
        let mut seen = FxHashSet::default();
        let mut at = *start;
        while let Some(&next) = alt.get(at) {
            if !seen.insert(at) {
                return Err(LoadError::AltMonologueCycle {
                    dialogue: dialogue.to_string(),
                    monologue: at.to_string(),
                });
            }
            at = next;
        }
    }
    Ok(())
}
