//! Renderer seam. The engine decides what is visible and where; the host
//! decides how it is drawn.

use crate::core::assets::{FontHandle, FrameRef, ImageHandle};
use crate::schema::geometry::{Color, GridRect, Vec2};

/// Everything a dialogue box needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueView<'a> {
    pub speaker: &'a str,
    /// Revealed portion of the current line.
    pub text: &'a str,
    pub font: Option<FontHandle>,
    pub portrait: Option<ImageHandle>,
    /// Options whose conditions currently hold, in declaration order.
    pub options: Vec<&'a str>,
    pub selected: usize,
    /// Box visibility, 0–255.
    pub fade: f32,
    /// Option highlight visibility, 0–255.
    pub choice_fade: f32,
}

pub trait Renderer {
    fn clear(&mut self, void: Color);
    /// `view_pos` is the top-left of the element in camera space.
    fn draw_map_element(&mut self, image: ImageHandle, rect: GridRect, view_pos: Vec2);
    /// `view_pos` is the top-left of the sprite in camera space.
    fn draw_entity(&mut self, frame: FrameRef, view_pos: Vec2);
    fn draw_dialogue(&mut self, view: &DialogueView<'_>);
    /// Full-screen black overlay for scene transitions.
    fn draw_overlay(&mut self, alpha: u8);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    MapElement {
        image: ImageHandle,
        rect: GridRect,
        view_pos: Vec2,
    },
    Entity {
        frame: FrameRef,
        view_pos: Vec2,
    },
    Dialogue {
        speaker: String,
        text: String,
        options: Vec<String>,
        selected: usize,
        fade: f32,
    },
    Overlay(u8),
}

/// Records draw calls, one frame at a time.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    pub commands: Vec<DrawCommand>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dialogue text drawn this frame, if any.
    pub fn dialogue_text(&self) -> Option<&str> {
        self.commands.iter().find_map(|c| match c {
            DrawCommand::Dialogue { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl Renderer for RecordingRenderer {
    fn clear(&mut self, void: Color) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear(void));
    }

    fn draw_map_element(&mut self, image: ImageHandle, rect: GridRect, view_pos: Vec2) {
        self.commands.push(DrawCommand::MapElement {
            image,
            rect,
            view_pos,
        });
    }

    fn draw_entity(&mut self, frame: FrameRef, view_pos: Vec2) {
        self.commands.push(DrawCommand::Entity { frame, view_pos });
    }

    fn draw_dialogue(&mut self, view: &DialogueView<'_>) {
        self.commands.push(DrawCommand::Dialogue {
            speaker: view.speaker.to_string(),
            text: view.text.to_string(),
            options: view.options.iter().map(|o| o.to_string()).collect(),
            selected: view.selected,
            fade: view.fade,
        });
    }

    fn draw_overlay(&mut self, alpha: u8) {
        self.commands.push(DrawCommand::Overlay(alpha));
    }
}
