//! Grid actors: interpolated movement, collision, route following, and the
//! optional dialogue capability that makes an entity an NPC.

use rustc_hash::FxHashMap;

use crate::core::assets::{FrameRef, ImageHandle, SpriteSheet};
use crate::core::dialogue::Dialogue;
use crate::core::flags::FlagStore;
use crate::core::route::{EntityRoute, RouteCursor, RouteStep, RouteTable, Waypoint};
use crate::schema::conditions::Conditions;
use crate::schema::geometry::{Direction, GridPos, GridRect, Vec2};

/// Anything that can stop a mover from entering a rectangle of cells.
pub trait Collider {
    fn blocks(&self, rect: &GridRect) -> bool;
}

/// Static, tiled map geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct MapElement {
    pub rect: GridRect,
    pub image: ImageHandle,
    pub collision: bool,
}

impl Collider for MapElement {
    fn blocks(&self, rect: &GridRect) -> bool {
        self.collision && rect.intersects(&self.rect)
    }
}

/// Animation playback for one entity.
#[derive(Debug, Clone)]
pub struct SpriteState {
    sheet: Option<SpriteSheet>,
    pub default_animation: String,
    pub frame_time: f32,
    progress: f32,
    frame: u32,
    pose: Option<(bool, Direction)>,
    key: String,
    override_animation: Option<String>,
}

impl SpriteState {
    pub fn new(sheet: SpriteSheet, default_animation: &str, frame_time: f32) -> Self {
        Self {
            sheet: Some(sheet),
            default_animation: default_animation.to_string(),
            frame_time,
            progress: 0.0,
            frame: 0,
            pose: None,
            key: default_animation.to_string(),
            override_animation: None,
        }
    }

    /// A sprite with no sheet. Always draws the null frame.
    pub fn blank() -> Self {
        Self {
            sheet: None,
            default_animation: String::new(),
            frame_time: 0.0,
            progress: 0.0,
            frame: 0,
            pose: None,
            key: String::new(),
            override_animation: None,
        }
    }

    pub fn dimensions(&self) -> Vec2 {
        self.sheet.as_ref().map_or(Vec2::ZERO, |s| s.dimensions)
    }

    /// Current animation key: the override if one is playing, otherwise
    /// `idle_<dir>` or `walk_<dir>`.
    pub fn animation(&self) -> &str {
        self.override_animation.as_deref().unwrap_or(&self.key)
    }

    pub fn play_override(&mut self, animation: &str) {
        self.override_animation = Some(animation.to_string());
        self.frame = 0;
        self.progress = 0.0;
    }

    pub fn clear_override(&mut self) {
        self.override_animation = None;
    }

    fn set_pose(&mut self, walking: bool, facing: Direction) {
        if self.pose == Some((walking, facing)) {
            return;
        }
        self.pose = Some((walking, facing));
        let verb = if walking { "walk" } else { "idle" };
        self.key = format!("{}_{}", verb, facing.as_str());
        self.frame = 0;
        self.progress = 0.0;
    }

    pub fn update(&mut self, dt: f32) {
        self.progress += dt;
        if self.progress >= self.frame_time {
            self.progress = 0.0;
            let frames = self.sheet.as_ref().map_or(1, |s| s.num_frames.max(1));
            self.frame = (self.frame + 1) % frames;
        }
    }

    /// The frame to draw. Falls back to the default animation, then to
    /// `FrameRef::NULL`.
    pub fn frame(&self) -> FrameRef {
        let Some(sheet) = &self.sheet else {
            return FrameRef::NULL;
        };
        sheet
            .frame(self.animation(), self.frame)
            .or_else(|| sheet.frame(&self.default_animation, self.frame))
            .unwrap_or(FrameRef::NULL)
    }
}

/// Dialogue capability. An entity with one of these is an NPC.
#[derive(Debug, Clone, Default)]
pub struct Interactable {
    pub dialogues: Vec<Dialogue>,
    pub current_dialogue: Option<String>,
    block: bool,
    engaged: bool,
    cooldown: f32,
}

impl Interactable {
    pub fn new(dialogues: Vec<Dialogue>) -> Self {
        Self {
            dialogues,
            ..Self::default()
        }
    }

    /// Set while talking and for a cooldown afterwards.
    pub fn is_blocked(&self) -> bool {
        self.block
    }

    pub fn dialogue(&self, id: &str) -> Option<&Dialogue> {
        self.dialogues.iter().find(|d| d.id == id)
    }

    /// The dialogue `engage` would pick: `dialogue_id`, or the first one
    /// whose conditions hold.
    pub fn select(&self, dialogue_id: Option<&str>, flags: &FlagStore) -> Option<&Dialogue> {
        match dialogue_id {
            Some(id) => self.dialogue(id),
            None => self.dialogues.iter().find(|d| d.conditions.satisfied(flags)),
        }
    }

    /// Pick a dialogue and mark the NPC as talking. Returns a fresh copy
    /// of the template.
    pub fn engage(&mut self, dialogue_id: Option<&str>, flags: &FlagStore) -> Option<Dialogue> {
        let dialogue = self.select(dialogue_id, flags)?.clone();
        self.current_dialogue = Some(dialogue.id.clone());
        self.block = true;
        self.engaged = true;
        Some(dialogue)
    }

    /// The conversation is over; start the cooldown.
    pub fn release(&mut self, cooldown: f32) {
        self.engaged = false;
        self.cooldown = cooldown;
    }

    pub fn update(&mut self, dt: f32) {
        if self.block && !self.engaged {
            self.cooldown -= dt;
            if self.cooldown <= 0.0 {
                self.cooldown = 0.0;
                self.block = false;
            }
        }
    }
}

/// Everything a mover can collide with this frame. The mover itself must
/// not be reachable through `entities`/`roster` or `player`.
pub struct Obstacles<'a> {
    pub entities: &'a FxHashMap<String, Entity>,
    pub roster: &'a [String],
    pub player: Option<&'a Entity>,
    pub map: &'a [MapElement],
    pub bounds: GridPos,
}

impl Obstacles<'_> {
    pub fn entity_blocks(&self, rect: &GridRect) -> bool {
        self.roster
            .iter()
            .filter_map(|id| self.entities.get(id))
            .chain(self.player)
            .any(|e| e.blocks(rect))
    }

    pub fn map_blocks(&self, rect: &GridRect) -> bool {
        self.map.iter().any(|m| m.blocks(rect))
    }

    pub fn out_of_bounds(&self, cell: GridPos) -> bool {
        !GridRect::new(0, 0, self.bounds.x, self.bounds.y).contains(cell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Motion {
    step: GridPos,
    elapsed: f32,
    duration: f32,
    /// Driven by a route rather than the keyboard.
    scripted: bool,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: String,
    /// Authoritative logical cell.
    pub grid_pos: GridPos,
    /// Pixel position, lagging `grid_pos` while a move interpolates.
    pub pos: Vec2,
    pub facing: Direction,
    /// Footprint in cells.
    pub hit_box: GridPos,
    pub collision: bool,
    pub conditions: Conditions,
    pub routes: RouteTable,
    pub route: RouteCursor,
    pub sprite: SpriteState,
    pub interactable: Option<Interactable>,
    tile_size: f32,
    motion: Option<Motion>,
}

impl Collider for Entity {
    fn blocks(&self, rect: &GridRect) -> bool {
        self.collision && rect.intersects(&self.rect())
    }
}

impl Entity {
    pub fn new(id: &str, spawn: GridPos, tile_size: f32) -> Self {
        Self {
            id: id.to_string(),
            grid_pos: spawn,
            pos: spawn.to_pixels(tile_size),
            facing: Direction::Down,
            hit_box: GridPos::new(1, 1),
            collision: false,
            conditions: Conditions::always(),
            routes: RouteTable::default(),
            route: RouteCursor::default(),
            sprite: SpriteState::blank(),
            interactable: None,
            tile_size,
            motion: None,
        }
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn rect(&self) -> GridRect {
        GridRect::at(self.grid_pos, self.hit_box)
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_some()
    }

    /// Unit step of the move in flight, or zero.
    pub fn velocity(&self) -> GridPos {
        self.motion.map_or(GridPos::ZERO, |m| m.step)
    }

    /// Teleport to `cell`, cancelling any move.
    pub fn place(&mut self, cell: GridPos) {
        self.grid_pos = cell;
        self.pos = cell.to_pixels(self.tile_size);
        self.motion = None;
    }

    /// Pick the first route whose conditions hold, and report whether the
    /// entity itself is present.
    pub fn load(&mut self, flags: &FlagStore) -> bool {
        let route = self.routes.first_satisfied(flags).map(|r| r.id.clone());
        if route.is_some() {
            self.route.assign(route.as_deref());
        }
        self.conditions.satisfied(flags)
    }

    /// Switch to a named route. False if the entity has no such route.
    pub fn set_route(&mut self, id: &str) -> bool {
        if !self.routes.contains(id) {
            return false;
        }
        self.route.assign(Some(id));
        true
    }

    /// Turn to face `target` along the dominant axis.
    pub fn look_at(&mut self, target: GridPos) {
        let diff = self.grid_pos - target;
        if diff.is_zero() {
            return;
        }
        self.facing = if diff.y.abs() > diff.x.abs() {
            Direction::from_offset(GridPos::new(0, -diff.y.signum()))
        } else {
            Direction::from_offset(GridPos::new(-diff.x.signum(), 0))
        };
    }

    /// Start walking one cell. Ignored while a move is already in flight.
    pub fn begin_move(&mut self, step: GridPos, duration: f32, scripted: bool) -> bool {
        if self.motion.is_some() || step.is_zero() {
            return false;
        }
        self.motion = Some(Motion {
            step,
            elapsed: 0.0,
            duration,
            scripted,
        });
        true
    }

    /// Tick the route wait and, when idle, take the next route step.
    /// `fixed_duration` overrides the waypoint speed.
    pub(crate) fn follow_route(&mut self, dt: f32, fixed_duration: Option<f32>) {
        self.route.tick(dt);
        if self.motion.is_some() {
            return;
        }
        match self.route.steer(&self.routes, self.grid_pos) {
            RouteStep::Move { step, duration } => {
                self.facing = Direction::from_offset(step);
                self.begin_move(step, fixed_duration.unwrap_or(duration), true);
            }
            RouteStep::Arrived { face } => self.facing = face,
            RouteStep::Idle => {}
        }
    }

    /// Collide and interpolate the move in flight.
    ///
    /// Entities and bounds halt the move where it stands. Map geometry
    /// halts it too, and a route-driven mover is also snapped back to its
    /// confirmed cell.
    pub fn advance_move(&mut self, dt: f32, obstacles: &Obstacles<'_>) {
        let Some(mut motion) = self.motion else {
            return;
        };
        let target = self.grid_pos + motion.step;
        let rect = GridRect::at(target, self.hit_box);

        if obstacles.out_of_bounds(target) || obstacles.entity_blocks(&rect) {
            self.motion = None;
            return;
        }
        if obstacles.map_blocks(&rect) {
            if motion.scripted {
                self.pos = self.grid_pos.to_pixels(self.tile_size);
            }
            self.motion = None;
            return;
        }

        motion.elapsed += dt;
        let t = if motion.duration > 0.0 {
            (motion.elapsed / motion.duration).min(1.0)
        } else {
            1.0
        };
        let to = target.to_pixels(self.tile_size);
        if t >= 1.0 {
            self.grid_pos = target;
            self.pos = to;
            self.motion = None;
        } else {
            self.pos = self.grid_pos.to_pixels(self.tile_size).lerp(to, t);
            self.motion = Some(motion);
        }
    }

    fn animate(&mut self, dt: f32) {
        self.sprite.set_pose(self.motion.is_some(), self.facing);
        self.sprite.update(dt);
    }

    pub fn frame(&self) -> FrameRef {
        self.sprite.frame()
    }

    /// True if this entity talks and the player is facing into it.
    pub fn can_interact(&self, player: &Entity) -> bool {
        self.interactable.as_ref().is_some_and(|i| !i.is_blocked())
            && self.rect().contains(player.grid_pos + player.facing.offset())
    }

    /// One frame for a non-player entity.
    pub fn update(&mut self, dt: f32, obstacles: &Obstacles<'_>) {
        self.follow_route(dt, None);
        self.advance_move(dt, obstacles);
        self.animate(dt);
        if let Some(interactable) = &mut self.interactable {
            interactable.update(dt);
        }
    }
}

/// Route id used for scripted player moves.
pub const SCRIPTED_ROUTE: &str = "scripted_move";

#[derive(Debug, Clone)]
pub struct Player {
    pub entity: Entity,
    /// Seconds per cell.
    pub move_duration: f32,
    pub controls_disabled: bool,
}

impl Player {
    pub fn new(entity: Entity, move_duration: f32) -> Self {
        Self {
            entity,
            move_duration,
            controls_disabled: false,
        }
    }

    /// Keyboard intent. Only starts a move while standing still.
    pub fn input(&mut self, axis: GridPos) {
        if self.controls_disabled || self.entity.is_moving() || axis.is_zero() {
            return;
        }
        self.entity.facing = Direction::from_offset(axis);
        self.entity.begin_move(axis, self.move_duration, false);
    }

    /// Walk `waypoints` with controls disabled until the route and its
    /// final wait are done.
    pub fn follow(&mut self, waypoints: Vec<Waypoint>) {
        self.entity.routes.insert(EntityRoute {
            id: SCRIPTED_ROUTE.to_string(),
            waypoints,
            conditions: Conditions::always(),
        });
        self.entity.route.assign(Some(SCRIPTED_ROUTE));
        self.controls_disabled = true;
    }

    pub fn update(&mut self, dt: f32, obstacles: &Obstacles<'_>) {
        if self.controls_disabled {
            self.entity.follow_route(dt, Some(self.move_duration));
            if !self.entity.is_moving() && self.entity.route.is_idle() {
                self.controls_disabled = false;
            }
        }
        self.entity.advance_move(dt, obstacles);
        self.clamp_to(obstacles.bounds);
        self.entity.animate(dt);
    }

    fn clamp_to(&mut self, bounds: GridPos) {
        let clamped = GridPos::new(
            self.entity.grid_pos.x.min(bounds.x - 1).max(0),
            self.entity.grid_pos.y.min(bounds.y - 1).max(0),
        );
        if clamped != self.entity.grid_pos {
            self.entity.place(clamped);
        }
    }
}
