//! Asset provider seam: symbolic names resolved to opaque handles.
//!
//! Decoding images, fonts and audio is the host's job. The engine only
//! needs stable handles to pass back to the renderer and audio sink, plus
//! sprite sheet geometry for hit boxes and animation frames.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::geometry::Vec2;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate {kind} asset name: {name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("sprite '{sprite}' references unknown sheet image '{sheet}'")]
    UnknownSheet { sprite: String, sheet: String },
}

/// Newtype wrapper for image handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHandle(pub u64);

impl ImageHandle {
    /// Placeholder image drawn when a sprite frame lookup fails.
    pub const NULL: ImageHandle = ImageHandle(u64::MAX);
}

/// Newtype wrapper for font handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontHandle(pub u64);

/// Newtype wrapper for audio handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioHandle(pub u64);

/// Geometry of a sprite sheet: fixed-size cells, one animation per row
/// (or per column), `num_frames` frames each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteSheet {
    pub image: ImageHandle,
    /// Cell size in pixels.
    pub dimensions: Vec2,
    pub animations: Vec<String>,
    pub row_major: bool,
    pub num_frames: u32,
}

/// One cell of a sprite sheet, ready for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRef {
    pub image: ImageHandle,
    pub column: u32,
    pub row: u32,
}

impl FrameRef {
    pub const NULL: FrameRef = FrameRef {
        image: ImageHandle::NULL,
        column: 0,
        row: 0,
    };
}

impl SpriteSheet {
    /// Locate frame `index` of `animation`, or `None` if the sheet has no
    /// such animation.
    pub fn frame(&self, animation: &str, index: u32) -> Option<FrameRef> {
        let line = self.animations.iter().position(|a| a == animation)? as u32;
        let index = if self.num_frames == 0 {
            0
        } else {
            index % self.num_frames
        };
        let (column, row) = if self.row_major {
            (index, line)
        } else {
            (line, index)
        };
        Some(FrameRef {
            image: self.image,
            column,
            row,
        })
    }
}

/// Resolves names used in scene descriptors. Unknown names return `None`;
/// the loader turns that into a fatal load error.
pub trait AssetProvider {
    fn image(&self, name: &str) -> Option<ImageHandle>;
    fn font(&self, name: &str) -> Option<FontHandle>;
    fn audio(&self, name: &str) -> Option<AudioHandle>;
    fn sprite(&self, name: &str) -> Option<SpriteSheet>;
}

// Asset guide shape, as written by the game's content tooling.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub audio: Vec<NamedPath>,
    #[serde(default)]
    pub fonts: Vec<FontEntry>,
    #[serde(default)]
    pub images: Vec<NamedPath>,
    #[serde(default)]
    pub sprites: Vec<SpriteEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedPath {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sizes: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteEntry {
    pub name: String,
    pub sprite_sheet: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub animations: Vec<String>,
    /// `"rows"` for one animation per row, anything else for columns.
    #[serde(default)]
    pub animation_layout: String,
    #[serde(default = "default_num_frames")]
    pub num_frames: u32,
}

fn default_num_frames() -> u32 {
    1
}

/// In-memory `AssetProvider` built from an asset manifest.
///
/// Handles are assigned in manifest order. Paths are retained so a host
/// renderer can decode the files behind each handle.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    images: FxHashMap<String, ImageHandle>,
    fonts: FxHashMap<String, FontHandle>,
    audio: FxHashMap<String, AudioHandle>,
    sprites: FxHashMap<String, SpriteSheet>,
    paths: FxHashMap<u64, String>,
    next_handle: u64,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<AssetRegistry, AssetError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_json(&contents)
    }

    pub fn parse_json(input: &str) -> Result<AssetRegistry, AssetError> {
        let manifest: AssetManifest = serde_json::from_str(input)?;
        Self::from_manifest(&manifest)
    }

    pub fn from_manifest(manifest: &AssetManifest) -> Result<AssetRegistry, AssetError> {
        let mut registry = AssetRegistry::new();
        for entry in &manifest.audio {
            registry.add_audio(&entry.name, &entry.path)?;
        }
        for entry in &manifest.fonts {
            for size in &entry.sizes {
                registry.add_font(&format!("{}{}", entry.name, size), &entry.path)?;
            }
        }
        for entry in &manifest.images {
            registry.add_image(&entry.name, &entry.path)?;
        }
        for entry in &manifest.sprites {
            let image = registry
                .images
                .get(&entry.sprite_sheet)
                .copied()
                .ok_or_else(|| AssetError::UnknownSheet {
                    sprite: entry.name.clone(),
                    sheet: entry.sprite_sheet.clone(),
                })?;
            registry.add_sprite(
                &entry.name,
                SpriteSheet {
                    image,
                    dimensions: Vec2::new(entry.width, entry.height),
                    animations: entry.animations.clone(),
                    row_major: entry.animation_layout == "rows",
                    num_frames: entry.num_frames,
                },
            )?;
        }
        Ok(registry)
    }

    fn next(&mut self, path: &str) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.paths.insert(handle, path.to_string());
        handle
    }

    pub fn add_image(&mut self, name: &str, path: &str) -> Result<ImageHandle, AssetError> {
        if self.images.contains_key(name) {
            return Err(AssetError::DuplicateName {
                kind: "image",
                name: name.to_string(),
            });
        }
        let handle = ImageHandle(self.next(path));
        self.images.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn add_font(&mut self, name: &str, path: &str) -> Result<FontHandle, AssetError> {
        if self.fonts.contains_key(name) {
            return Err(AssetError::DuplicateName {
                kind: "font",
                name: name.to_string(),
            });
        }
        let handle = FontHandle(self.next(path));
        self.fonts.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn add_audio(&mut self, name: &str, path: &str) -> Result<AudioHandle, AssetError> {
        if self.audio.contains_key(name) {
            return Err(AssetError::DuplicateName {
                kind: "audio",
                name: name.to_string(),
            });
        }
        let handle = AudioHandle(self.next(path));
        self.audio.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn add_sprite(&mut self, name: &str, sheet: SpriteSheet) -> Result<(), AssetError> {
        if self.sprites.contains_key(name) {
            return Err(AssetError::DuplicateName {
                kind: "sprite",
                name: name.to_string(),
            });
        }
        self.sprites.insert(name.to_string(), sheet);
        Ok(())
    }

    /// File path registered for a raw handle value.
    pub fn path_of(&self, handle: u64) -> Option<&str> {
        self.paths.get(&handle).map(|s| s.as_str())
    }
}

impl AssetProvider for AssetRegistry {
    fn image(&self, name: &str) -> Option<ImageHandle> {
        self.images.get(name).copied()
    }

    fn font(&self, name: &str) -> Option<FontHandle> {
        self.fonts.get(name).copied()
    }

    fn audio(&self, name: &str) -> Option<AudioHandle> {
        self.audio.get(name).copied()
    }

    fn sprite(&self, name: &str) -> Option<SpriteSheet> {
        self.sprites.get(name).cloned()
    }
}
