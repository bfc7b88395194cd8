//! Scripted movement paths and the per-entity cursor that walks them.

use crate::core::flags::FlagStore;
use crate::schema::conditions::Conditions;
use crate::schema::descriptor::{RouteDescriptor, WaypointDescriptor};
use crate::schema::geometry::{Direction, GridPos};

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub pos: GridPos,
    /// Seconds per cell while walking towards this waypoint.
    pub speed: f32,
    /// Facing once the waypoint is reached.
    pub face_dir: Direction,
    /// Pause after arrival, in seconds.
    pub wait: f32,
}

impl From<&WaypointDescriptor> for Waypoint {
    fn from(desc: &WaypointDescriptor) -> Self {
        Self {
            pos: GridPos::new(desc.x, desc.y),
            speed: desc.speed,
            face_dir: desc.face_dir,
            wait: desc.wait.max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRoute {
    pub id: String,
    pub waypoints: Vec<Waypoint>,
    pub conditions: Conditions,
}

impl From<&RouteDescriptor> for EntityRoute {
    fn from(desc: &RouteDescriptor) -> Self {
        Self {
            id: desc.id.clone(),
            waypoints: desc.waypoints.iter().map(Waypoint::from).collect(),
            conditions: desc.conditions.clone(),
        }
    }
}

/// An entity's named routes, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTable {
    routes: Vec<EntityRoute>,
}

impl RouteTable {
    pub fn new(routes: Vec<EntityRoute>) -> Self {
        Self { routes }
    }

    pub fn get(&self, id: &str) -> Option<&EntityRoute> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace the route with the same id.
    pub fn insert(&mut self, route: EntityRoute) {
        match self.routes.iter_mut().find(|r| r.id == route.id) {
            Some(slot) => *slot = route,
            None => self.routes.push(route),
        }
    }

    /// First route whose conditions hold.
    pub fn first_satisfied(&self, flags: &FlagStore) -> Option<&EntityRoute> {
        self.routes.iter().find(|r| r.conditions.satisfied(flags))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRoute> {
        self.routes.iter()
    }
}

/// What the route wants the entity to do this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteStep {
    /// No route, or still waiting.
    Idle,
    /// Walk one cell by `step`, taking `duration` seconds.
    Move { step: GridPos, duration: f32 },
    /// A waypoint was reached; face `face` and start its wait.
    Arrived { face: Direction },
}

/// Progress along the current route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteCursor {
    current: Option<String>,
    waypoint: usize,
    wait: f32,
}

impl RouteCursor {
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn waypoint_index(&self) -> usize {
        self.waypoint
    }

    pub fn wait_remaining(&self) -> f32 {
        self.wait
    }

    /// No route and no pending wait.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.wait == 0.0
    }

    /// Switch to `route` from its first waypoint, cancelling any wait.
    pub fn assign(&mut self, route: Option<&str>) {
        self.current = route.map(str::to_string);
        self.waypoint = 0;
        self.wait = 0.0;
    }

    /// Count the wait timer down, flooring at zero.
    pub fn tick(&mut self, dt: f32) {
        if self.wait != 0.0 {
            self.wait = (self.wait - dt).max(0.0);
        }
    }

    /// Decide the next step from `at`. Only call while the entity is not
    /// mid-move.
    pub fn steer(&mut self, routes: &RouteTable, at: GridPos) -> RouteStep {
        if self.wait != 0.0 {
            return RouteStep::Idle;
        }
        let Some(id) = self.current.as_deref() else {
            return RouteStep::Idle;
        };
        let Some(route) = routes.get(id) else {
            self.assign(None);
            return RouteStep::Idle;
        };
        let Some(target) = route.waypoints.get(self.waypoint) else {
            self.assign(None);
            return RouteStep::Idle;
        };

        let step = (target.pos - at).cardinal_step();
        if !step.is_zero() {
            return RouteStep::Move {
                step,
                duration: target.speed,
            };
        }

        let face = target.face_dir;
        self.wait = target.wait;
        self.waypoint += 1;
        if self.waypoint >= route.waypoints.len() {
            self.waypoint = 0;
            self.current = None;
        }
        RouteStep::Arrived { face }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waypoint(x: i32, y: i32, wait: f32) -> Waypoint {
        Waypoint {
            pos: GridPos::new(x, y),
            speed: 0.5,
            face_dir: Direction::Left,
            wait,
        }
    }

    fn table() -> RouteTable {
        RouteTable::new(vec![EntityRoute {
            id: "patrol".to_string(),
            waypoints: vec![waypoint(2, 0, 1.0), waypoint(2, 3, 0.0)],
            conditions: Conditions::always(),
        }])
    }

    #[test]
    fn steers_one_cardinal_cell() {
        let mut cursor = RouteCursor::default();
        cursor.assign(Some("patrol"));
        let step = cursor.steer(&table(), GridPos::new(0, 2));
        assert_eq!(
            step,
            RouteStep::Move {
                step: GridPos::new(1, 0),
                duration: 0.5
            }
        );
    }

    #[test]
    fn arrival_arms_wait_and_advances() {
        let routes = table();
        let mut cursor = RouteCursor::default();
        cursor.assign(Some("patrol"));
        let step = cursor.steer(&routes, GridPos::new(2, 0));
        assert_eq!(step, RouteStep::Arrived { face: Direction::Left });
        assert_eq!(cursor.waypoint_index(), 1);
        assert_eq!(cursor.wait_remaining(), 1.0);
        assert_eq!(cursor.steer(&routes, GridPos::new(2, 0)), RouteStep::Idle);
        cursor.tick(0.6);
        cursor.tick(0.6);
        assert_eq!(cursor.wait_remaining(), 0.0);
        assert!(matches!(cursor.steer(&routes, GridPos::new(2, 0)), RouteStep::Move { .. }));
    }

    #[test]
    fn exhausted_route_clears_and_rewinds() {
        let routes = table();
        let mut cursor = RouteCursor::default();
        cursor.assign(Some("patrol"));
        cursor.steer(&routes, GridPos::new(2, 0));
        cursor.tick(1.0);
        cursor.steer(&routes, GridPos::new(2, 3));
        assert_eq!(cursor.current(), None);
        assert_eq!(cursor.waypoint_index(), 0);
        assert!(cursor.is_idle());
    }

    #[test]
    fn unknown_or_empty_route_clears() {
        let mut cursor = RouteCursor::default();
        cursor.assign(Some("missing"));
        assert_eq!(cursor.steer(&table(), GridPos::ZERO), RouteStep::Idle);
        assert_eq!(cursor.current(), None);

        let empty = RouteTable::new(vec![EntityRoute {
            id: "nowhere".to_string(),
            waypoints: Vec::new(),
            conditions: Conditions::always(),
        }]);
        cursor.assign(Some("nowhere"));
        cursor.steer(&empty, GridPos::ZERO);
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn first_satisfied_respects_order_and_flags() {
        let mut routes = table();
        routes.insert(EntityRoute {
            id: "storm".to_string(),
            waypoints: Vec::new(),
            conditions: Conditions::all_of(&["storm"]),
        });
        let flags: FlagStore = ["storm"].iter().collect();
        assert_eq!(routes.first_satisfied(&flags).map(|r| r.id.as_str()), Some("patrol"));
        let mut only_storm = RouteTable::new(Vec::new());
        only_storm.insert(routes.get("storm").unwrap().clone());
        assert!(only_storm.first_satisfied(&FlagStore::new()).is_none());
        assert!(only_storm.first_satisfied(&flags).is_some());
    }
}
