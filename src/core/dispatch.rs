//! Scripted actions. A `DispatchChain` runs its events strictly in order,
//! one pending at a time, across as many frames as the events need.
//! `CatchEvent`s are the predicates that start chains via triggers.

use tracing::{debug, warn};

use crate::core::assets::AudioHandle;
use crate::core::camera::CameraTarget;
use crate::core::dialogue::Dialogue;
use crate::core::flags::FlagStore;
use crate::core::route::EntityRoute;
use crate::core::scene::{DialogueOrigin, RosterChange, SceneContext, SceneState, SceneWorld};
use crate::schema::conditions::Conditions;
use crate::schema::geometry::{GridPos, GridRect};

/// The action a dispatch event performs.
#[derive(Debug, Clone)]
pub enum DispatchKind {
    AddEntity { ids: Vec<String> },
    RemoveEntity { ids: Vec<String> },
    SetEntityRoute { entity_id: String, route_id: String },
    BeginEntityDialogue { entity_id: String, dialogue_id: String },
    BeginIndependentDialogue { dialogue: Box<Dialogue> },
    EndDialogueAbruptly,
    MoveCameraToPosition { pos: GridPos, duration: f32 },
    MoveCameraToEntity { entity_id: String, duration: f32 },
    MoveCameraFollowEntity { entity_id: String },
    MovePlayerAlongRoute { route: EntityRoute },
    ResetCameraTracking,
    ShakeCamera { time: f32, intensity: f32 },
    StopCameraShake,
    PlayAudio { audio: AudioHandle, volume: f32 },
    FadeAudioVolume { fraction: f32 },
    EnableTrigger { trigger_id: String },
    DisableTrigger { trigger_id: String },
    StartEntityAnimation { entity_id: String, animation: String },
    StopEntityAnimation { entity_id: String },
}

impl DispatchKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddEntity { .. } => "add_entity",
            Self::RemoveEntity { .. } => "remove_entity",
            Self::SetEntityRoute { .. } => "set_route",
            Self::BeginEntityDialogue { .. } => "start_entity_dialogue",
            Self::BeginIndependentDialogue { .. } => "start_independent_dialogue",
            Self::EndDialogueAbruptly => "end_dialogue",
            Self::MoveCameraToPosition { .. } => "move_camera_to_pos",
            Self::MoveCameraToEntity { .. } => "move_camera_to_entity",
            Self::MoveCameraFollowEntity { .. } => "move_camera_follow_entity",
            Self::MovePlayerAlongRoute { .. } => "move_player",
            Self::ResetCameraTracking => "reset_camera",
            Self::ShakeCamera { .. } => "shake_camera",
            Self::StopCameraShake => "stop_shake_camera",
            Self::PlayAudio { .. } => "play_audio",
            Self::FadeAudioVolume { .. } => "fade_audio_volume",
            Self::EnableTrigger { .. } => "enable_trigger",
            Self::DisableTrigger { .. } => "disable_trigger",
            Self::StartEntityAnimation { .. } => "start_entity_animation",
            Self::StopEntityAnimation { .. } => "stop_entity_animation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub kind: DispatchKind,
    /// Unsatisfied events are skipped, never delayed.
    pub conditions: Conditions,
    /// Hold until the previously dispatched event is complete.
    pub wait_for_previous: bool,
    /// Delay before dispatch, in seconds.
    pub wait: f32,
    remaining_wait: f32,
    dispatched: bool,
    elapsed: f32,
    dialogue_serial: Option<u64>,
}

impl DispatchEvent {
    pub fn new(kind: DispatchKind) -> Self {
        Self {
            kind,
            conditions: Conditions::always(),
            wait_for_previous: false,
            wait: 0.0,
            remaining_wait: 0.0,
            dispatched: false,
            elapsed: 0.0,
            dialogue_serial: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_wait(mut self, wait: f32) -> Self {
        self.wait = wait;
        self.remaining_wait = wait;
        self
    }

    pub fn after_previous(mut self) -> Self {
        self.wait_for_previous = true;
        self
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    /// Seconds spent pending since dispatch.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    fn reset(&mut self) {
        self.remaining_wait = self.wait;
        self.dispatched = false;
        self.elapsed = 0.0;
        self.dialogue_serial = None;
    }

    /// Perform the one-shot side effect.
    pub fn dispatch(&mut self, world: &mut SceneWorld, ctx: &mut SceneContext<'_>) {
        self.dispatched = true;
        debug!(event = self.kind.name(), "dispatching event");
        match &self.kind {
            DispatchKind::AddEntity { ids } => {
                for id in ids {
                    world.queue_roster(RosterChange::Add(id.clone()));
                }
            }
            DispatchKind::RemoveEntity { ids } => {
                for id in ids {
                    world.queue_roster(RosterChange::Remove(id.clone()));
                }
            }
            DispatchKind::SetEntityRoute {
                entity_id,
                route_id,
            } => world.set_entity_route(entity_id, route_id),
            DispatchKind::BeginEntityDialogue {
                entity_id,
                dialogue_id,
            } => {
                self.dialogue_serial = world.begin_entity_dialogue(entity_id, Some(dialogue_id.as_str()), ctx);
            }
            DispatchKind::BeginIndependentDialogue { dialogue } => {
                self.dialogue_serial = world.begin_dialogue(
                    dialogue.as_ref().clone(),
                    DialogueOrigin::Independent,
                    ctx,
                );
            }
            DispatchKind::EndDialogueAbruptly => world.end_dialogue(ctx),
            DispatchKind::MoveCameraToPosition { pos, duration } => {
                let focus = pos.to_pixels(world.config.tile_size);
                let bounds = world.pixel_bounds();
                world.camera.move_to(focus, *duration, bounds);
            }
            DispatchKind::MoveCameraToEntity {
                entity_id,
                duration,
            } => match world.entity_pixel_pos(entity_id) {
                Some(focus) => {
                    let bounds = world.pixel_bounds();
                    world.camera.move_to(focus, *duration, bounds);
                }
                None => warn!(entity = %entity_id, "camera target is not in the scene"),
            },
            DispatchKind::MoveCameraFollowEntity { entity_id } => {
                world.camera.track(CameraTarget::Entity(entity_id.clone()));
            }
            DispatchKind::MovePlayerAlongRoute { route } => {
                world.player.follow(route.waypoints.clone());
            }
            DispatchKind::ResetCameraTracking => {
                world.camera.track(CameraTarget::Player);
            }
            DispatchKind::ShakeCamera { time, intensity } => world.camera.shake(*time, *intensity),
            DispatchKind::StopCameraShake => world.camera.stop_shake(),
            DispatchKind::PlayAudio { audio, volume } => ctx.audio.play(*audio, *volume, false, 0),
            DispatchKind::FadeAudioVolume { fraction } => world.music.scale(*fraction, ctx.audio),
            DispatchKind::EnableTrigger { trigger_id } => world.set_trigger_disabled(trigger_id, false),
            DispatchKind::DisableTrigger { trigger_id } => world.set_trigger_disabled(trigger_id, true),
            DispatchKind::StartEntityAnimation {
                entity_id,
                animation,
            } => match world.roster_entity_mut(entity_id) {
                Some(entity) => entity.sprite.play_override(animation),
                None => warn!(entity = %entity_id, "animation target is not in the scene"),
            },
            DispatchKind::StopEntityAnimation { entity_id } => {
                if let Some(entity) = world.roster_entity_mut(entity_id) {
                    entity.sprite.clear_override();
                }
            }
        }
    }

    pub fn update(&mut self, dt: f32) {
        if self.dispatched {
            self.elapsed += dt;
        }
    }

    /// Dispatched, and whatever it started has finished.
    pub fn is_complete(&self, world: &SceneWorld) -> bool {
        if !self.dispatched {
            return false;
        }
        match &self.kind {
            DispatchKind::MoveCameraToPosition { .. } | DispatchKind::MoveCameraToEntity { .. } => {
                !world.camera.is_moving()
            }
            DispatchKind::MovePlayerAlongRoute { .. } => !world.player.controls_disabled,
            DispatchKind::BeginEntityDialogue { .. } | DispatchKind::BeginIndependentDialogue { .. } => {
                match self.dialogue_serial {
                    Some(serial) => world.dialogue_serial() != Some(serial),
                    None => true,
                }
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Running,
    /// Every event has dispatched and completed.
    Retired,
}

/// An ordered list of events. `last_dispatched` is `None` while the cursor
/// sits on the implicit head, which counts as complete.
#[derive(Debug, Clone, Default)]
pub struct DispatchChain {
    events: Vec<DispatchEvent>,
    last_dispatched: Option<usize>,
    next: usize,
}

impl DispatchChain {
    pub fn new(events: Vec<DispatchEvent>) -> Self {
        Self {
            events,
            last_dispatched: None,
            next: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[DispatchEvent] {
        &self.events
    }

    pub fn last_dispatch_index(&self) -> Option<usize> {
        self.last_dispatched
    }

    pub fn dispatch_index(&self) -> usize {
        self.next
    }

    /// Rewind to the head.
    pub fn start(&mut self) {
        for event in &mut self.events {
            event.reset();
        }
        self.last_dispatched = None;
        self.next = 0;
    }

    pub fn update(
        &mut self,
        dt: f32,
        world: &mut SceneWorld,
        ctx: &mut SceneContext<'_>,
    ) -> ChainStatus {
        while let Some(event) = self.events.get(self.next) {
            if event.conditions.satisfied(ctx.flags) {
                break;
            }
            debug!(event = event.kind.name(), index = self.next, "skipping event");
            self.next += 1;
        }

        let previous_complete = match self.last_dispatched {
            Some(i) => self.events[i].is_complete(world),
            None => true,
        };
        if self.next >= self.events.len() && previous_complete {
            return ChainStatus::Retired;
        }
        if let Some(i) = self.last_dispatched {
            if !previous_complete {
                self.events[i].update(dt);
            }
        }

        let Some(event) = self.events.get_mut(self.next) else {
            return ChainStatus::Running;
        };
        if event.wait_for_previous && !previous_complete {
            return ChainStatus::Running;
        }
        if event.remaining_wait > 0.0 {
            event.remaining_wait -= dt;
            if event.remaining_wait > 0.0 {
                return ChainStatus::Running;
            }
        }
        event.dispatch(world, ctx);
        self.last_dispatched = Some(self.next);
        self.next += 1;
        ChainStatus::Running
    }
}

/// Scene predicate that can fire a trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum CatchKind {
    OnPlayerEnter { rect: GridRect },
    OnEntityEnter { ids: Vec<String>, rect: GridRect },
    OnSceneStart,
    OnSceneExit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchEvent {
    pub kind: CatchKind,
    pub conditions: Conditions,
}

impl CatchEvent {
    pub fn new(kind: CatchKind) -> Self {
        Self {
            kind,
            conditions: Conditions::always(),
        }
    }

    pub fn catches(&self, world: &SceneWorld, state: SceneState, flags: &FlagStore) -> bool {
        if !self.conditions.satisfied(flags) {
            return false;
        }
        match &self.kind {
            CatchKind::OnPlayerEnter { rect } => rect.contains(world.player.entity.grid_pos),
            CatchKind::OnEntityEnter { ids, rect } => ids
                .iter()
                .filter_map(|id| world.roster_entity(id))
                .any(|e| rect.intersects(&e.rect())),
            CatchKind::OnSceneStart => state == SceneState::Entered,
            CatchKind::OnSceneExit => state == SceneState::Exited,
        }
    }
}

/// Stable handle to a chain in a `ChainArena`. Stale after the chain is
/// retired, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    occupied: bool,
    chain: Option<DispatchChain>,
}

/// The set of running chains. Spawns and retirements are queued and only
/// take effect at `merge_added`/`merge_removed`, so the active list never
/// changes while it is being walked.
#[derive(Debug, Clone, Default)]
pub struct ChainArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    active: Vec<ChainId>,
    added: Vec<ChainId>,
    removed: Vec<ChainId>,
}

impl ChainArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `chain` and queue it for activation.
    pub fn spawn(&mut self, mut chain: DispatchChain) -> ChainId {
        chain.start();
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        debug!(chain = index, events = chain.len(), "chain spawned");
        let slot = &mut self.slots[index as usize];
        slot.occupied = true;
        slot.chain = Some(chain);
        let id = ChainId {
            index,
            generation: slot.generation,
        };
        self.added.push(id);
        id
    }

    pub fn merge_added(&mut self) {
        self.active.append(&mut self.added);
    }

    /// Snapshot of the active list, in spawn order.
    pub fn active_ids(&self) -> Vec<ChainId> {
        self.active.clone()
    }

    pub fn is_alive(&self, id: ChainId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|s| s.occupied && s.generation == id.generation)
    }

    /// Borrow a chain out of its slot for ticking.
    pub fn take(&mut self, id: ChainId) -> Option<DispatchChain> {
        if !self.is_alive(id) {
            return None;
        }
        self.slots[id.index as usize].chain.take()
    }

    pub fn restore(&mut self, id: ChainId, chain: DispatchChain) {
        if self.is_alive(id) {
            self.slots[id.index as usize].chain = Some(chain);
        }
    }

    pub fn retire(&mut self, id: ChainId) {
        self.removed.push(id);
    }

    pub fn merge_removed(&mut self) {
        for id in std::mem::take(&mut self.removed) {
            if !self.is_alive(id) {
                continue;
            }
            self.active.retain(|a| *a != id);
            let slot = &mut self.slots[id.index as usize];
            slot.occupied = false;
            slot.chain = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
            debug!(chain = id.index, "chain retired");
        }
    }

    /// Running plus queued chains.
    pub fn len(&self) -> usize {
        self.active.len() + self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
