/// Lighthouse example: plays the bundled lighthouse scenes headless.
///
/// An autopilot stands in for the player: it sits through the opening pan,
/// climbs to the keeper, agrees to light the lamp, then walks down to the
/// shore. Dialogue is printed as it is read and audio cues as they play.
///
/// Run with: cargo run --example lighthouse

use scene_engine::core::assets::{AssetRegistry, AudioHandle};
use scene_engine::core::audio::AudioSink;
use scene_engine::core::config::EngineConfig;
use scene_engine::core::input::InputSnapshot;
use scene_engine::core::manager::SceneManager;
use scene_engine::core::render::{DrawCommand, RecordingRenderer};
use std::path::Path;

const DT: f32 = 1.0 / 30.0;

/// Prints audio cues by file name.
struct ConsoleAudio {
    assets: AssetRegistry,
}

impl ConsoleAudio {
    fn name(&self, handle: AudioHandle) -> &str {
        self.assets.path_of(handle.0).unwrap_or("?")
    }
}

impl AudioSink for ConsoleAudio {
    fn play(&mut self, handle: AudioHandle, volume: f32, looped: bool, _fade_in_ms: u32) {
        let kind = if looped { "music" } else { "sfx" };
        println!("    ~ {} {} at {:.2}", kind, self.name(handle), volume);
    }

    fn fade_out(&mut self, handle: AudioHandle, fade_ms: u32) {
        println!("    ~ fade out {} over {}ms", self.name(handle), fade_ms);
    }

    fn set_volume(&mut self, handle: AudioHandle, volume: f32) {
        println!("    ~ {} volume {:.2}", self.name(handle), volume);
    }

    fn stop(&mut self, handle: AudioHandle) {
        println!("    ~ stop {}", self.name(handle));
    }
}

/// What the autopilot does when no dialogue is open.
#[derive(Debug, Clone, Copy)]
enum Step {
    Wait(u32),
    Hold(InputSnapshot, u32),
    Press,
}

fn held(up: bool, down: bool) -> InputSnapshot {
    InputSnapshot {
        up,
        down,
        ..InputSnapshot::NONE
    }
}

fn main() {
    // --- Load the lighthouse content pack ---
    let pack = Path::new("scene_data/lighthouse");
    let assets = AssetRegistry::load(&pack.join("assets.json")).expect("Failed to load assets");
    let config = EngineConfig::load(&pack.join("config.ron")).expect("Failed to load config");

    let mut manager = SceneManager::builder()
        .guide(&pack.join("guide.json"))
        .config(config)
        .build(&assets)
        .expect("Failed to build scene manager");

    let mut audio = ConsoleAudio {
        assets: assets.clone(),
    };
    manager.start(&mut audio).expect("Failed to enter the start scene");
    println!("=== {} ===", manager.current_scene_name().unwrap_or("?"));

    // --- Autopilot plan ---
    let mut plan = vec![
        Step::Wait(30),
        Step::Hold(held(true, false), 40),
        Step::Wait(2),
        Step::Press,
        Step::Wait(60),
        Step::Hold(held(false, true), 120),
        Step::Wait(60),
    ];
    plan.reverse();

    let mut scene_name = manager.current_scene_name().map(str::to_string);
    let mut released = true;
    let mut frame = 0;

    while frame < 3000 {
        frame += 1;
        let mut input = InputSnapshot::NONE;

        let reading = manager
            .current_scene()
            .and_then(|scene| scene.world.dialogue.as_ref())
            .filter(|d| !d.dialogue.is_ending())
            .and_then(|d| d.dialogue.current_monologue());

        if let Some(monologue) = reading {
            // Confirm once each line is fully shown; always take the first option.
            let line = monologue.lines.get(monologue.line_index()).map(|l| l.text.as_str());
            let revealed = line.is_some_and(|text| monologue.spoken() == text);
            if released && (revealed || monologue.is_awaiting_choice()) {
                if monologue.is_awaiting_choice() {
                    let options: Vec<&str> = monologue
                        .available_options(manager.flags())
                        .map(|o| o.text.as_str())
                        .collect();
                    println!("  [{}] -> {}", options.join(" / "), options.first().unwrap_or(&"?"));
                } else if let Some(text) = line {
                    let speaker = if monologue.speaker.is_empty() {
                        "*"
                    } else {
                        monologue.speaker.as_str()
                    };
                    println!("  {}: {}", speaker, text);
                }
                input.confirm = true;
            }
        } else {
            match plan.pop() {
                Some(Step::Wait(n)) if n > 1 => plan.push(Step::Wait(n - 1)),
                Some(Step::Hold(keys, n)) => {
                    input = keys;
                    if n > 1 {
                        plan.push(Step::Hold(keys, n - 1));
                    }
                }
                Some(Step::Press) => input.confirm = released,
                Some(Step::Wait(_)) => {}
                None => break,
            }
        }
        released = !input.confirm;

        manager
            .frame(&input, DT, &mut audio)
            .expect("Frame failed");

        let now = manager.current_scene_name().map(str::to_string);
        if now != scene_name {
            println!("=== {} ===", now.as_deref().unwrap_or("?"));
            scene_name = now;
        }
    }

    // --- Final frame summary ---
    let mut renderer = RecordingRenderer::new();
    manager.render(&mut renderer).expect("Render failed");
    let sprites = renderer
        .commands
        .iter()
        .filter(|c| matches!(c, DrawCommand::Entity { .. }))
        .count();
    let flags: Vec<&str> = manager.flags().iter_set().collect();
    println!(
        "\nStopped after {} frames: {} sprites on screen, flags {:?}",
        frame, sprites, flags
    );
}
