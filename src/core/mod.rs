pub mod assets;
pub mod audio;
pub mod camera;
pub mod config;
pub mod dialogue;
pub mod dispatch;
pub mod entity;
pub mod flags;
pub mod input;
pub mod loader;
pub mod manager;
pub mod render;
pub mod route;
pub mod scene;
pub mod transition;
pub mod trigger;
