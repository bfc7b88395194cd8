//! One scene: its world state, entrance/exit lifecycle and the per-frame
//! update order.
//!
//! A frame runs camera, chains, triggers, transitions, player, exits,
//! dialogue and finally the other entities. Chain spawns/retirements and
//! roster changes are buffered and merged at fixed points so nothing is
//! mutated while it is being walked.

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::core::audio::{AudioSink, BackgroundMusic};
use crate::core::camera::{Camera, CameraTarget};
use crate::core::config::EngineConfig;
use crate::core::dialogue::{Arrival, Dialogue, DialogueStep};
use crate::core::dispatch::{ChainArena, ChainStatus};
use crate::core::entity::{Entity, MapElement, Obstacles, Player};
use crate::core::flags::FlagStore;
use crate::core::input::InputSnapshot;
use crate::core::render::Renderer;
use crate::core::transition::{SceneEntrance, SceneExit};
use crate::core::trigger::Trigger;
use crate::schema::geometry::{Color, Direction, GridPos, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneState {
    Entering,
    Entered,
    Exiting,
    #[default]
    Exited,
}

/// Process-wide state a scene borrows for one call.
pub struct SceneContext<'a> {
    pub flags: &'a mut FlagStore,
    pub audio: &'a mut dyn AudioSink,
    /// Cross-scene overlay alpha, 0–255.
    pub fade: &'a mut f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueOrigin {
    /// Owned by an NPC. Route assignments in the dialogue target it.
    Entity(String),
    Independent,
}

#[derive(Debug, Clone)]
pub struct ActiveDialogue {
    pub dialogue: Dialogue,
    pub origin: DialogueOrigin,
    /// Distinguishes successive dialogues for completion checks.
    pub serial: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    Add(String),
    Remove(String),
}

/// Ask the manager to switch scenes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneRequest {
    pub scene: String,
    pub entrance: String,
    pub facing: Direction,
}

/// Everything dispatch events can touch.
#[derive(Debug)]
pub struct SceneWorld {
    pub player: Player,
    /// Every entity the scene declares, live or not.
    pub entities: FxHashMap<String, Entity>,
    /// Declaration order of `entities`.
    pub entity_order: Vec<String>,
    /// Live entity ids.
    pub roster: Vec<String>,
    pub map_elements: Vec<MapElement>,
    pub triggers: Vec<Trigger>,
    pub dialogue: Option<ActiveDialogue>,
    pub camera: Camera,
    pub chains: ChainArena,
    pub music: BackgroundMusic,
    /// Scene size in cells.
    pub bounds: GridPos,
    pub config: EngineConfig,
    roster_changes: Vec<RosterChange>,
    next_serial: u64,
}

impl SceneWorld {
    pub fn new(
        player: Player,
        bounds: GridPos,
        music: BackgroundMusic,
        config: EngineConfig,
    ) -> Self {
        let mut camera = Camera::new(config.window_dimensions, config.shake_seed);
        camera.track(CameraTarget::Player);
        Self {
            player,
            entities: FxHashMap::default(),
            entity_order: Vec::new(),
            roster: Vec::new(),
            map_elements: Vec::new(),
            triggers: Vec::new(),
            dialogue: None,
            camera,
            chains: ChainArena::new(),
            music,
            bounds,
            config,
            roster_changes: Vec::new(),
            next_serial: 0,
        }
    }

    /// Register an entity. It is not live until it joins the roster.
    pub fn add_entity(&mut self, entity: Entity) {
        if !self.entities.contains_key(&entity.id) {
            self.entity_order.push(entity.id.clone());
        }
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn pixel_bounds(&self) -> Vec2 {
        self.bounds.to_pixels(self.config.tile_size)
    }

    /// A live entity.
    pub fn roster_entity(&self, id: &str) -> Option<&Entity> {
        if !self.roster.iter().any(|r| r == id) {
            return None;
        }
        self.entities.get(id)
    }

    pub fn roster_entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        if !self.roster.iter().any(|r| r == id) {
            return None;
        }
        self.entities.get_mut(id)
    }

    pub fn entity_pixel_pos(&self, id: &str) -> Option<Vec2> {
        self.roster_entity(id).map(|e| e.pos)
    }

    pub fn queue_roster(&mut self, change: RosterChange) {
        self.roster_changes.push(change);
    }

    pub fn apply_roster_changes(&mut self) {
        for change in std::mem::take(&mut self.roster_changes) {
            match change {
                RosterChange::Add(id) => {
                    if !self.entities.contains_key(&id) {
                        warn!(entity = %id, "cannot add unknown entity");
                    } else if !self.roster.contains(&id) {
                        debug!(entity = %id, "entity added");
                        self.roster.push(id);
                    }
                }
                RosterChange::Remove(id) => {
                    debug!(entity = %id, "entity removed");
                    self.roster.retain(|r| *r != id);
                }
            }
        }
    }

    pub fn set_entity_route(&mut self, entity_id: &str, route_id: &str) {
        match self.entities.get_mut(entity_id) {
            Some(entity) => {
                if !entity.set_route(route_id) {
                    warn!(entity = %entity_id, route = %route_id, "unknown route");
                }
            }
            None => warn!(entity = %entity_id, "route target is not in the scene"),
        }
    }

    pub fn set_trigger_disabled(&mut self, trigger_id: &str, disabled: bool) {
        match self.triggers.iter_mut().find(|t| t.id == trigger_id) {
            Some(trigger) => trigger.disabled = disabled,
            None => warn!(trigger = %trigger_id, "unknown trigger"),
        }
    }

    pub fn dialogue_serial(&self) -> Option<u64> {
        self.dialogue.as_ref().map(|d| d.serial)
    }

    /// Start one of a live NPC's dialogues, by id or the first whose
    /// conditions hold. The NPC turns towards the player. Ignores the NPC's
    /// cooldown.
    pub fn begin_entity_dialogue(
        &mut self,
        entity_id: &str,
        dialogue_id: Option<&str>,
        ctx: &mut SceneContext<'_>,
    ) -> Option<u64> {
        let Some(entity) = self.roster_entity(entity_id) else {
            warn!(entity = %entity_id, "dialogue target is not in the scene");
            return None;
        };
        let Some(interactable) = entity.interactable.as_ref() else {
            warn!(entity = %entity_id, "entity has no dialogues");
            return None;
        };
        if interactable.select(dialogue_id, ctx.flags).is_none() {
            warn!(entity = %entity_id, "no dialogue is available");
            return None;
        }

        // The outgoing dialogue releases its NPC, which may be this one.
        self.end_dialogue(ctx);

        let player_cell = self.player.entity.grid_pos;
        let entity = self.roster_entity_mut(entity_id)?;
        let dialogue = entity.interactable.as_mut()?.engage(dialogue_id, ctx.flags)?;
        entity.look_at(player_cell);

        let serial = self.begin_dialogue(dialogue, DialogueOrigin::Entity(entity_id.to_string()), ctx);
        if serial.is_none() {
            let cooldown = self.config.interaction_cooldown;
            if let Some(i) = self.entities.get_mut(entity_id).and_then(|e| e.interactable.as_mut()) {
                i.release(cooldown);
            }
        }
        serial
    }

    /// Make `dialogue` the active one. Any dialogue already running is cut
    /// off. `None` if no start candidate holds.
    pub fn begin_dialogue(
        &mut self,
        mut dialogue: Dialogue,
        origin: DialogueOrigin,
        ctx: &mut SceneContext<'_>,
    ) -> Option<u64> {
        if self.dialogue.is_some() {
            self.end_dialogue(ctx);
        }
        let Some(arrival) = dialogue.start(ctx.flags) else {
            warn!(dialogue = %dialogue.id, "no start monologue is available");
            return None;
        };
        let serial = self.next_serial;
        self.next_serial += 1;
        self.music.scale(1.0 / self.config.dialogue_music_duck, ctx.audio);
        self.dialogue = Some(ActiveDialogue {
            dialogue,
            origin,
            serial,
        });
        self.apply_arrival(arrival, ctx);
        Some(serial)
    }

    fn apply_arrival(&mut self, arrival: Arrival, ctx: &mut SceneContext<'_>) {
        let owner = match self.dialogue.as_ref().map(|d| &d.origin) {
            Some(DialogueOrigin::Entity(id)) => Some(id.clone()),
            _ => None,
        };
        for route in &arrival.routes {
            match &owner {
                Some(id) => self.set_entity_route(id, route),
                None => debug!(route = %route, "route assignment without an owning entity"),
            }
        }
        if let Some(chain) = arrival.chain {
            self.chains.spawn(chain);
        }
        if let Some(sfx) = arrival.sfx {
            ctx.audio.play(sfx, 1.0, false, 0);
        }
    }

    /// Drop the active dialogue immediately, skipping the fade.
    pub fn end_dialogue(&mut self, ctx: &mut SceneContext<'_>) {
        if let Some(mut active) = self.dialogue.take() {
            active.dialogue.reset();
            self.teardown(active, ctx);
        }
    }

    fn teardown(&mut self, active: ActiveDialogue, ctx: &mut SceneContext<'_>) {
        debug!(dialogue = %active.dialogue.id, "dialogue ended");
        if let DialogueOrigin::Entity(id) = &active.origin {
            let cooldown = self.config.interaction_cooldown;
            if let Some(i) = self.entities.get_mut(id).and_then(|e| e.interactable.as_mut()) {
                i.release(cooldown);
            }
        }
        self.music.scale(self.config.dialogue_music_duck, ctx.audio);
    }

    /// Tick the active dialogue, tearing it down once fully faded out.
    pub fn update_dialogue(&mut self, dt: f32, ctx: &mut SceneContext<'_>) {
        let Some(active) = self.dialogue.as_mut() else {
            return;
        };
        active.dialogue.update(dt);
        if !active.dialogue.is_playing() {
            if let Some(mut active) = self.dialogue.take() {
                active.dialogue.reset();
                self.teardown(active, ctx);
            }
        }
    }

    pub fn dialogue_input(&mut self, pressed: &InputSnapshot, ctx: &mut SceneContext<'_>) {
        let Some(active) = self.dialogue.as_mut() else {
            return;
        };
        if let DialogueStep::Arrived(arrival) = active.dialogue.input(pressed, ctx.flags) {
            self.apply_arrival(arrival, ctx);
        }
    }

    /// Merge queued chains, tick every active chain, then drop retired ones.
    pub fn run_chains(&mut self, dt: f32, ctx: &mut SceneContext<'_>) {
        self.chains.merge_added();
        for id in self.chains.active_ids() {
            let Some(mut chain) = self.chains.take(id) else {
                continue;
            };
            let status = chain.update(dt, self, ctx);
            self.chains.restore(id, chain);
            if status == ChainStatus::Retired {
                self.chains.retire(id);
            }
        }
        self.chains.merge_removed();
    }

    /// Fire every trigger whose catch holds. All catches are evaluated
    /// before any trigger fires.
    pub fn fire_triggers(&mut self, state: SceneState, flags: &FlagStore) {
        let fired: Vec<usize> = self
            .triggers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.catches(self, state, flags))
            .map(|(i, _)| i)
            .collect();
        for i in fired {
            self.triggers[i].fire(&mut self.chains);
        }
    }

    pub fn camera_focus(&self) -> Option<Vec2> {
        match self.camera.tracking() {
            CameraTarget::Free => None,
            CameraTarget::Player => Some(self.player.entity.pos),
            CameraTarget::Entity(id) => self.entity_pixel_pos(id),
        }
    }

    pub fn step_player(&mut self, dt: f32) {
        let obstacles = Obstacles {
            entities: &self.entities,
            roster: &self.roster,
            player: None,
            map: &self.map_elements,
            bounds: self.bounds,
        };
        self.player.update(dt, &obstacles);
    }

    /// Step every live entity. Each one is lifted out of the table while it
    /// moves so it cannot collide with itself.
    pub fn step_entities(&mut self, dt: f32) {
        for i in 0..self.roster.len() {
            let id = self.roster[i].clone();
            let Some(mut entity) = self.entities.remove(&id) else {
                continue;
            };
            let obstacles = Obstacles {
                entities: &self.entities,
                roster: &self.roster,
                player: Some(&self.player.entity),
                map: &self.map_elements,
                bounds: self.bounds,
            };
            entity.update(dt, &obstacles);
            self.entities.insert(id, entity);
        }
    }

    /// Talk to the first live NPC the player faces. True if a dialogue
    /// started.
    pub fn interact(&mut self, ctx: &mut SceneContext<'_>) -> bool {
        let facing: Vec<String> = self
            .roster
            .iter()
            .filter(|id| {
                self.entities
                    .get(id.as_str())
                    .is_some_and(|e| e.can_interact(&self.player.entity))
            })
            .cloned()
            .collect();
        facing
            .iter()
            .any(|id| self.begin_entity_dialogue(id, None, ctx).is_some())
    }
}

#[derive(Debug)]
pub struct Scene {
    pub name: String,
    pub void_color: Color,
    pub world: SceneWorld,
    pub entrances: Vec<SceneEntrance>,
    pub exits: Vec<SceneExit>,
    state: SceneState,
    has_loaded_prev: bool,
    entering_through: Option<usize>,
    exiting_through: Option<usize>,
    last_input: InputSnapshot,
}

impl Scene {
    pub fn new(
        name: &str,
        void_color: Color,
        world: SceneWorld,
        entrances: Vec<SceneEntrance>,
        exits: Vec<SceneExit>,
    ) -> Self {
        Self {
            name: name.to_string(),
            void_color,
            world,
            entrances,
            exits,
            state: SceneState::Exited,
            has_loaded_prev: false,
            entering_through: None,
            exiting_through: None,
            last_input: InputSnapshot::NONE,
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    /// The roster has been populated at least once.
    pub fn has_loaded(&self) -> bool {
        self.has_loaded_prev
    }

    pub fn entrance(&self, id: &str) -> Option<&SceneEntrance> {
        self.entrances.iter().find(|e| e.id == id)
    }

    pub fn exiting_through(&self) -> Option<&SceneExit> {
        self.exiting_through.and_then(|i| self.exits.get(i))
    }

    /// Enter the scene through `entrance`. With `resume` set, a scene that
    /// has been entered before keeps the player where it was and appears
    /// without a transition.
    pub fn load(&mut self, entrance: &str, facing: Direction, resume: bool, ctx: &mut SceneContext<'_>) {
        if self.state != SceneState::Exited {
            return;
        }
        self.state = SceneState::Entered;
        self.world.music.start(ctx.audio, self.world.config.music_fade_ms);
        self.last_input = InputSnapshot::NONE;

        if resume && self.has_loaded_prev {
            *ctx.fade = 0.0;
            info!(scene = %self.name, "scene resumed");
            return;
        }

        self.world.camera.track(CameraTarget::Player);
        let cell = match self.entrances.iter().position(|e| e.id == entrance) {
            Some(i) => {
                self.entering_through = Some(i);
                self.state = SceneState::Entering;
                self.entrances[i].spawn
            }
            None => {
                *ctx.fade = 0.0;
                self.world.player.entity.grid_pos
            }
        };
        self.world.player.entity.place(cell);
        self.world.player.entity.facing = facing;
        let bounds = self.world.pixel_bounds();
        self.world.camera.center_on(self.world.player.entity.pos, bounds);
        info!(scene = %self.name, entrance = %entrance, "scene loaded");

        if self.has_loaded_prev {
            return;
        }
        for id in &self.world.entity_order {
            let present = self
                .world
                .entities
                .get_mut(id)
                .is_some_and(|e| e.load(ctx.flags));
            if present {
                self.world.roster.push(id.clone());
            }
        }
        self.has_loaded_prev = true;
    }

    pub fn unload(&mut self, ctx: &mut SceneContext<'_>) {
        self.state = SceneState::Exited;
        self.world.music.stop(ctx.audio, self.world.config.music_fade_ms);
    }

    /// Handle held keys. Movement reads held keys; confirm and option
    /// navigation act on presses only.
    pub fn input(&mut self, held: &InputSnapshot, ctx: &mut SceneContext<'_>) {
        let pressed = held.pressed_since(&self.last_input);
        self.last_input = *held;
        if matches!(self.state, SceneState::Exiting | SceneState::Exited) {
            return;
        }
        if self.world.dialogue.is_some() {
            self.world.dialogue_input(&pressed, ctx);
            return;
        }
        if self.world.player.controls_disabled {
            return;
        }

        self.world.player.input(held.axis());
        if !pressed.confirm || self.world.interact(ctx) {
            return;
        }
        let player = &self.world.player.entity;
        let exit = self
            .exits
            .iter()
            .position(|e| e.available(ctx.flags) && e.can_interact(player));
        if let Some(i) = exit {
            self.begin_exit(i);
        }
    }

    fn begin_exit(&mut self, index: usize) {
        if let Some(exit) = self.exits.get(index) {
            debug!(scene = %self.name, next = %exit.next_scene, entrance = %exit.entrance, "exit taken");
        }
        self.exiting_through = Some(index);
        self.state = SceneState::Exiting;
    }

    /// Advance one frame. Returns a request once an exit has fully
    /// completed.
    pub fn update(&mut self, dt: f32, ctx: &mut SceneContext<'_>) -> Option<SceneRequest> {
        let focus = self.world.camera_focus();
        let bounds = self.world.pixel_bounds();
        self.world.camera.update(dt, focus, bounds);

        if self.state == SceneState::Exited {
            let exit = self.exits.get(self.exiting_through.take()?)?;
            return Some(SceneRequest {
                scene: exit.next_scene.clone(),
                entrance: exit.entrance.clone(),
                facing: self.world.player.entity.facing,
            });
        }

        self.world.run_chains(dt, ctx);
        self.world.apply_roster_changes();
        self.world.fire_triggers(self.state, ctx.flags);

        if let Some(i) = self.entering_through {
            if self.entrances[i].update(ctx.fade, dt) {
                self.entering_through = None;
                self.state = SceneState::Entered;
            }
        } else if let Some(i) = self.exiting_through {
            if self.exits[i].update(ctx.fade, dt) {
                self.state = SceneState::Exited;
                self.world.fire_triggers(SceneState::Exited, ctx.flags);
            }
            return None;
        }

        self.world.step_player(dt);

        if self.state == SceneState::Entered {
            let cell = self.world.player.entity.grid_pos;
            let exit = self
                .exits
                .iter()
                .position(|e| e.available(ctx.flags) && e.entered(cell));
            if let Some(i) = exit {
                self.begin_exit(i);
            }
        }

        self.world.update_dialogue(dt, ctx);
        self.world.step_entities(dt);
        None
    }

    /// Draw order: void, entities, map, player, dialogue.
    pub fn render(&self, renderer: &mut dyn Renderer, flags: &FlagStore) {
        let world = &self.world;
        let tile = world.config.tile_size;
        renderer.clear(self.void_color);
        for entity in world.roster.iter().filter_map(|id| world.entities.get(id)) {
            renderer.draw_entity(entity.frame(), world.camera.view_position(entity.pos));
        }
        for element in &world.map_elements {
            let origin = element.rect.origin().to_pixels(tile);
            renderer.draw_map_element(element.image, element.rect, world.camera.view_position(origin));
        }
        let player = &world.player.entity;
        renderer.draw_entity(player.frame(), world.camera.view_position(player.pos));
        if let Some(view) = world.dialogue.as_ref().and_then(|d| d.dialogue.view(flags)) {
            renderer.draw_dialogue(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assets::{AudioHandle, ImageHandle};
    use crate::core::audio::RecordingAudio;
    use crate::core::dialogue::{Monologue, MonologueLine, StartCandidate};
    use crate::core::dispatch::{CatchEvent, CatchKind, DispatchChain, DispatchEvent, DispatchKind};
    use crate::core::entity::Interactable;
    use crate::core::render::{DrawCommand, RecordingRenderer};
    use crate::schema::conditions::Conditions;
    use crate::schema::descriptor::TransitionKind;
    use crate::schema::geometry::GridRect;

    const MUSIC: AudioHandle = AudioHandle(1);

    fn keeper_dialogue() -> Dialogue {
        Dialogue::new(
            "greeting",
            vec![StartCandidate {
                monologue: "hello".to_string(),
                conditions: Conditions::always(),
            }],
            vec![Monologue::new("hello", "Keeper", vec![MonologueLine::new("Evening.", 0.01)])],
        )
    }

    fn scene() -> Scene {
        let player = Player::new(Entity::new("player", GridPos::new(2, 2), 32.0), 0.1);
        let mut world = SceneWorld::new(
            player,
            GridPos::new(12, 12),
            BackgroundMusic::new(MUSIC, 0.9),
            EngineConfig::default(),
        );
        let mut keeper = Entity::new("keeper", GridPos::new(5, 5), 32.0);
        keeper.collision = true;
        keeper.interactable = Some(Interactable::new(vec![keeper_dialogue()]));
        world.add_entity(keeper);
        let mut ghost = Entity::new("ghost", GridPos::new(8, 8), 32.0);
        ghost.conditions = Conditions::all_of(&["haunted"]);
        world.add_entity(ghost);
        world.map_elements.push(MapElement {
            rect: GridRect::new(0, 0, 12, 1),
            image: ImageHandle(4),
            collision: true,
        });

        Scene::new(
            "lighthouse",
            Color::default(),
            world,
            vec![SceneEntrance {
                id: "stairs".to_string(),
                spawn: GridPos::new(4, 5),
                transition: Some(TransitionKind::Fade),
                transition_time: 0.5,
            }],
            vec![SceneExit {
                rect: GridRect::new(11, 5, 1, 1),
                require_interact: false,
                transition: Some(TransitionKind::Teleport),
                transition_time: 0.0,
                next_scene: "cliffs".to_string(),
                entrance: "path".to_string(),
                conditions: Conditions::always(),
            }],
        )
    }

    struct Harness {
        flags: FlagStore,
        audio: RecordingAudio,
        fade: f32,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                flags: FlagStore::new(),
                audio: RecordingAudio::new(),
                fade: 255.0,
            }
        }

        fn ctx(&mut self) -> SceneContext<'_> {
            SceneContext {
                flags: &mut self.flags,
                audio: &mut self.audio,
                fade: &mut self.fade,
            }
        }
    }

    fn run(scene: &mut Scene, h: &mut Harness, frames: usize) -> Option<SceneRequest> {
        let mut request = None;
        for _ in 0..frames {
            request = request.or(scene.update(0.05, &mut h.ctx()));
        }
        request
    }

    fn press(scene: &mut Scene, h: &mut Harness, keys: InputSnapshot) {
        scene.input(&InputSnapshot::NONE, &mut h.ctx());
        scene.input(&keys, &mut h.ctx());
    }

    #[test]
    fn load_places_player_and_fades_in() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Right, false, &mut h.ctx());
        assert_eq!(scene.state(), SceneState::Entering);
        assert_eq!(scene.world.player.entity.grid_pos, GridPos::new(4, 5));
        assert_eq!(scene.world.player.entity.facing, Direction::Right);
        assert_eq!(scene.world.roster, vec!["keeper".to_string()]);

        run(&mut scene, &mut h, 12);
        assert_eq!(scene.state(), SceneState::Entered);
        assert_eq!(h.fade, 0.0);
    }

    #[test]
    fn unknown_entrance_enters_immediately() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("nowhere", Direction::Down, false, &mut h.ctx());
        assert_eq!(scene.state(), SceneState::Entered);
        assert_eq!(h.fade, 0.0);
        assert_eq!(scene.world.player.entity.grid_pos, GridPos::new(2, 2));
    }

    #[test]
    fn roster_populates_once() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Down, false, &mut h.ctx());
        scene.world.queue_roster(RosterChange::Remove("keeper".to_string()));
        scene.world.apply_roster_changes();
        scene.unload(&mut h.ctx());

        h.flags.set("haunted");
        scene.load("stairs", Direction::Down, false, &mut h.ctx());
        assert!(scene.world.roster.is_empty());
        assert!(scene.has_loaded());
    }

    #[test]
    fn talking_ducks_music_and_blocks_npc() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Right, false, &mut h.ctx());
        run(&mut scene, &mut h, 12);

        press(&mut scene, &mut h, InputSnapshot::confirm());
        assert!(scene.world.dialogue.is_some());
        assert!((scene.world.music.volume - 0.3).abs() < 1e-5);
        assert_eq!(scene.world.entities["keeper"].facing, Direction::Left);

        // Reveal, then finish the only line.
        press(&mut scene, &mut h, InputSnapshot::confirm());
        press(&mut scene, &mut h, InputSnapshot::confirm());
        assert!(scene.world.dialogue.is_some());
        run(&mut scene, &mut h, 10);
        assert!(scene.world.dialogue.is_none());
        assert!((scene.world.music.volume - 0.9).abs() < 1e-5);

        let keeper = &scene.world.entities["keeper"];
        assert!(keeper.interactable.as_ref().is_some_and(Interactable::is_blocked));
        press(&mut scene, &mut h, InputSnapshot::confirm());
        assert!(scene.world.dialogue.is_none());

        run(&mut scene, &mut h, 25);
        press(&mut scene, &mut h, InputSnapshot::confirm());
        assert!(scene.world.dialogue.is_some());
    }

    #[test]
    fn restarting_a_conversation_keeps_the_npc_blocked() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Right, false, &mut h.ctx());
        run(&mut scene, &mut h, 12);
        press(&mut scene, &mut h, InputSnapshot::confirm());
        let first = scene.world.dialogue_serial();
        assert!(first.is_some());

        let again = scene
            .world
            .begin_entity_dialogue("keeper", Some("greeting"), &mut h.ctx());
        assert!(again.is_some());
        assert_ne!(again, first);
        assert!((scene.world.music.volume - 0.3).abs() < 1e-5);

        // Longer than the cooldown, with the dialogue still open.
        run(&mut scene, &mut h, 30);
        assert_eq!(scene.world.dialogue_serial(), again);
        let keeper = &scene.world.entities["keeper"];
        assert!(keeper.interactable.as_ref().is_some_and(Interactable::is_blocked));
    }

    #[test]
    fn removed_npc_cannot_be_engaged() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Right, false, &mut h.ctx());
        scene.world.queue_roster(RosterChange::Remove("keeper".to_string()));
        scene.world.apply_roster_changes();

        let started = scene
            .world
            .begin_entity_dialogue("keeper", Some("greeting"), &mut h.ctx());
        assert!(started.is_none());
        assert!(scene.world.dialogue.is_none());
        let keeper = &scene.world.entities["keeper"];
        assert!(!keeper.interactable.as_ref().is_some_and(Interactable::is_blocked));
    }

    #[test]
    fn resumed_scene_clears_the_overlay() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Down, false, &mut h.ctx());
        scene.world.player.entity.place(GridPos::new(7, 7));
        scene.unload(&mut h.ctx());

        h.fade = 255.0;
        scene.load("stairs", Direction::Down, true, &mut h.ctx());
        assert_eq!(h.fade, 0.0);
        assert_eq!(scene.state(), SceneState::Entered);
        assert_eq!(scene.world.player.entity.grid_pos, GridPos::new(7, 7));
    }

    #[test]
    fn walk_in_exit_requests_next_scene() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("nowhere", Direction::Right, false, &mut h.ctx());
        scene.world.player.entity.place(GridPos::new(10, 5));
        scene.world.roster.clear();

        let held = InputSnapshot {
            right: true,
            ..InputSnapshot::NONE
        };
        scene.input(&held, &mut h.ctx());
        run(&mut scene, &mut h, 3);
        assert_eq!(scene.state(), SceneState::Exited);
        assert_eq!(scene.exiting_through().map(|e| e.next_scene.as_str()), Some("cliffs"));

        let request = scene.update(0.05, &mut h.ctx());
        assert_eq!(
            request,
            Some(SceneRequest {
                scene: "cliffs".to_string(),
                entrance: "path".to_string(),
                facing: Direction::Right,
            })
        );
        assert!(scene.update(0.05, &mut h.ctx()).is_none());
    }

    #[test]
    fn scene_start_trigger_adds_entity_after_barrier() {
        let mut scene = scene();
        let mut h = Harness::new();
        let mut trigger = Trigger::new(
            "haunt",
            vec![CatchEvent::new(CatchKind::OnSceneStart)],
            DispatchChain::new(vec![DispatchEvent::new(DispatchKind::AddEntity {
                ids: vec!["ghost".to_string()],
            })]),
        );
        trigger.once = true;
        scene.world.triggers.push(trigger);

        scene.load("nowhere", Direction::Down, false, &mut h.ctx());
        scene.update(0.05, &mut h.ctx());
        assert!(scene.world.roster_entity("ghost").is_none());
        scene.update(0.05, &mut h.ctx());
        assert!(scene.world.roster_entity("ghost").is_some());
        assert!(scene.world.triggers[0].disabled);
    }

    #[test]
    fn scene_exit_trigger_runs_on_return() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.world.triggers.push(Trigger::new(
            "farewell",
            vec![CatchEvent::new(CatchKind::OnSceneExit)],
            DispatchChain::new(vec![DispatchEvent::new(DispatchKind::PlayAudio {
                audio: AudioHandle(9),
                volume: 0.5,
            })]),
        ));
        scene.load("nowhere", Direction::Down, false, &mut h.ctx());
        scene.begin_exit(0);
        scene.update(0.05, &mut h.ctx());
        assert_eq!(scene.state(), SceneState::Exited);
        assert_eq!(scene.world.chains.len(), 1);

        scene.update(0.05, &mut h.ctx());
        scene.unload(&mut h.ctx());
        scene.load("stairs", Direction::Down, true, &mut h.ctx());
        scene.update(0.05, &mut h.ctx());
        assert_eq!(h.audio.last_volume(AudioHandle(9)), Some(0.5));
    }

    #[test]
    fn render_order() {
        let mut scene = scene();
        let mut h = Harness::new();
        scene.load("stairs", Direction::Down, false, &mut h.ctx());
        let mut renderer = RecordingRenderer::new();
        scene.render(&mut renderer, &h.flags);
        assert!(matches!(renderer.commands[0], DrawCommand::Clear(_)));
        assert!(matches!(renderer.commands[1], DrawCommand::Entity { .. }));
        assert!(matches!(renderer.commands[2], DrawCommand::MapElement { .. }));
        assert!(matches!(renderer.commands[3], DrawCommand::Entity { .. }));
        assert_eq!(renderer.commands.len(), 4);
    }
}
