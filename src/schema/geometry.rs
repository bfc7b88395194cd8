//! Grid and pixel geometry shared by the descriptor and runtime layers.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// An integer grid cell, or an integer offset between cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

impl GridPos {
    pub const ZERO: GridPos = GridPos { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    /// Clamp each axis of the offset to `-1..=1`, then zero the vertical axis
    /// if the horizontal one is non-zero. Diagonals resolve horizontal-first.
    pub fn cardinal_step(&self) -> GridPos {
        let dx = self.x.clamp(-1, 1);
        let dy = if dx != 0 { 0 } else { self.y.clamp(-1, 1) };
        GridPos::new(dx, dy)
    }

    /// Top-left pixel coordinate of this cell.
    pub fn to_pixels(&self, tile_size: f32) -> Vec2 {
        Vec2::new(self.x as f32 * tile_size, self.y as f32 * tile_size)
    }
}

impl Add for GridPos {
    type Output = GridPos;

    fn add(self, rhs: GridPos) -> GridPos {
        GridPos::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for GridPos {
    fn add_assign(&mut self, rhs: GridPos) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for GridPos {
    type Output = GridPos;

    fn sub(self, rhs: GridPos) -> GridPos {
        GridPos::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A pixel-space vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Linear interpolation; `t` is not clamped.
    pub fn lerp(self, to: Vec2, t: f32) -> Vec2 {
        self + (to - self) * t
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// An axis-aligned rectangle of grid cells. `x..x+w` by `y..y+h`, exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridRect {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub w: i32,
    #[serde(default)]
    pub h: i32,
}

impl GridRect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// A rectangle anchored at `origin` spanning `size` cells.
    pub fn at(origin: GridPos, size: GridPos) -> Self {
        Self::new(origin.x, origin.y, size.x, size.y)
    }

    pub fn origin(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }

    /// True if the cell lies inside the rectangle. Empty rectangles contain nothing.
    pub fn contains(&self, p: GridPos) -> bool {
        self.w > 0
            && self.h > 0
            && p.x >= self.x
            && p.x < self.x + self.w
            && p.y >= self.y
            && p.y < self.y + self.h
    }

    /// True if the two rectangles share at least one cell.
    pub fn intersects(&self, other: &GridRect) -> bool {
        self.w > 0
            && self.h > 0
            && other.w > 0
            && other.h > 0
            && self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// One of the four cardinal directions an actor can face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit grid offset for this direction.
    pub fn offset(&self) -> GridPos {
        match self {
            Self::Up => GridPos::new(0, -1),
            Self::Down => GridPos::new(0, 1),
            Self::Left => GridPos::new(-1, 0),
            Self::Right => GridPos::new(1, 0),
        }
    }

    /// Direction of a unit offset. Zero and diagonal offsets read as `Down`.
    pub fn from_offset(offset: GridPos) -> Direction {
        match (offset.x, offset.y) {
            (1, 0) => Self::Right,
            (-1, 0) => Self::Left,
            (0, -1) => Self::Up,
            _ => Self::Down,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// An RGBA colour, 0–255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    #[serde(default)]
    pub r: u8,
    #[serde(default)]
    pub g: u8,
    #[serde(default)]
    pub b: u8,
    #[serde(default)]
    pub a: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_step_prefers_horizontal() {
        assert_eq!(GridPos::new(3, -5).cardinal_step(), GridPos::new(1, 0));
        assert_eq!(GridPos::new(0, -5).cardinal_step(), GridPos::new(0, -1));
        assert_eq!(GridPos::new(-2, 2).cardinal_step(), GridPos::new(-1, 0));
        assert_eq!(GridPos::ZERO.cardinal_step(), GridPos::ZERO);
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = GridRect::new(2, 2, 2, 1);
        assert!(r.contains(GridPos::new(2, 2)));
        assert!(r.contains(GridPos::new(3, 2)));
        assert!(!r.contains(GridPos::new(4, 2)));
        assert!(!r.contains(GridPos::new(2, 3)));
    }

    #[test]
    fn empty_rect_never_collides() {
        let empty = GridRect::new(0, 0, 0, 0);
        assert!(!empty.contains(GridPos::ZERO));
        assert!(!empty.intersects(&GridRect::new(0, 0, 5, 5)));
    }

    #[test]
    fn adjacent_rects_do_not_intersect() {
        let a = GridRect::new(0, 0, 1, 1);
        let b = GridRect::new(1, 0, 1, 1);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&GridRect::new(0, 0, 2, 2)));
    }

    #[test]
    fn direction_round_trips_offsets() {
        for dir in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
            assert_eq!(Direction::from_offset(dir.offset()), dir);
        }
        assert_eq!(Direction::from_offset(GridPos::ZERO), Direction::Down);
    }

    #[test]
    fn lerp_midpoint() {
        let a = Vec2::new(0.0, 32.0);
        let b = Vec2::new(32.0, 32.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(16.0, 32.0));
    }
}
