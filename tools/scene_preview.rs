/// Preview: runs a scene guide headless and prints what a player would see.
///
/// Usage: scene_preview <guide.json> --assets <assets.json> [--config <file>]
///                      [--script <input.ron>] [--frames <n>] [--dt <seconds>]
///
/// The script is a RON list of steps, each holding keys for some frames:
///
///   [
///     (frames: 30),
///     (frames: 1, input: (confirm: true)),
///     (frames: 12, input: (up: true)),
///   ]

use scene_engine::core::assets::AssetRegistry;
use scene_engine::core::audio::NullAudio;
use scene_engine::core::config::EngineConfig;
use scene_engine::core::input::InputSnapshot;
use scene_engine::core::manager::SceneManager;
use scene_engine::core::scene::SceneState;
use serde::Deserialize;
use std::path::Path;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
struct ScriptStep {
    frames: u32,
    #[serde(default)]
    input: InputSnapshot,
}

/// What changed since the last frame worth printing.
#[derive(Debug, Default, PartialEq)]
struct Observed {
    scene: Option<String>,
    state: Option<SceneState>,
    /// Dialogue, monologue and line the player is reading.
    line: Option<(String, String, usize)>,
    awaiting_choice: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scene_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let guide_path = args[1].clone();
    let mut assets_path = None;
    let mut config_path = None;
    let mut script_path = None;
    let mut frames: Option<u32> = None;
    let mut dt: f32 = 1.0 / 60.0;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--assets" if i + 1 < args.len() => {
                i += 1;
                assets_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--script" if i + 1 < args.len() => {
                i += 1;
                script_path = Some(args[i].clone());
            }
            "--frames" if i + 1 < args.len() => {
                i += 1;
                frames = args[i].parse().ok();
            }
            "--dt" if i + 1 < args.len() => {
                i += 1;
                dt = args[i].parse().unwrap_or(dt);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(assets_path) = assets_path else {
        eprintln!("ERROR: --assets is required");
        process::exit(1);
    };
    let assets = AssetRegistry::load(Path::new(&assets_path)).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to load assets: {}", e);
        process::exit(1);
    });
    let config = match config_path {
        Some(path) => EngineConfig::load(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load config: {}", e);
            process::exit(1);
        }),
        None => EngineConfig::default(),
    };
    let script = match script_path {
        Some(path) => load_script(&path),
        None => Vec::new(),
    };

    let mut manager = SceneManager::builder()
        .guide(Path::new(&guide_path))
        .config(config)
        .build(&assets)
        .unwrap_or_else(|e| {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        });

    let mut audio = NullAudio;
    if let Err(e) = manager.start(&mut audio) {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    }

    // Expand the script to one input per frame, padded with idle frames.
    let mut inputs: Vec<InputSnapshot> = script
        .iter()
        .flat_map(|step| std::iter::repeat(step.input).take(step.frames as usize))
        .collect();
    let total = frames.map_or(inputs.len().max(600), |n| n as usize);
    inputs.resize(total, InputSnapshot::NONE);

    let mut last = Observed::default();
    for (frame, input) in inputs.iter().enumerate() {
        if let Err(e) = manager.frame(input, dt, &mut audio) {
            eprintln!("ERROR: frame {}: {}", frame, e);
            process::exit(1);
        }
        let now = observe(&manager);
        report(frame, &last, &now, &manager);
        last = now;
    }

    let flags: Vec<&str> = manager.flags().iter_set().collect();
    println!("\nRan {} frames. Flags set: {:?}", total, flags);
}

fn print_usage() {
    println!("Usage: scene_preview <guide.json> --assets <assets.json> [--config <file>]");
    println!("                     [--script <input.ron>] [--frames <n>] [--dt <seconds>]");
}

fn load_script(path: &str) -> Vec<ScriptStep> {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to read script {}: {}", path, e);
        process::exit(1);
    });
    ron::from_str(&contents).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to parse script {}: {}", path, e);
        process::exit(1);
    })
}

fn observe(manager: &SceneManager) -> Observed {
    let Some(scene) = manager.current_scene() else {
        return Observed::default();
    };
    let monologue = scene
        .world
        .dialogue
        .as_ref()
        .filter(|d| !d.dialogue.is_ending())
        .and_then(|d| d.dialogue.current_monologue().map(|m| (&d.dialogue.id, m)));
    Observed {
        scene: Some(scene.name.clone()),
        state: Some(scene.state()),
        line: monologue.map(|(dialogue, m)| (dialogue.clone(), m.id.clone(), m.line_index())),
        awaiting_choice: monologue.is_some_and(|(_, m)| m.is_awaiting_choice()),
    }
}

fn report(frame: usize, last: &Observed, now: &Observed, manager: &SceneManager) {
    if now.scene != last.scene {
        println!("[{:>5}] scene: {}", frame, now.scene.as_deref().unwrap_or("-"));
    }
    if now.state != last.state {
        println!("[{:>5}] state: {:?}", frame, now.state);
    }
    if now.line.is_none() {
        if last.line.is_some() {
            println!("[{:>5}] (dialogue closed)", frame);
        }
        return;
    }
    let Some(monologue) = manager
        .current_scene()
        .and_then(|scene| scene.world.dialogue.as_ref())
        .and_then(|d| d.dialogue.current_monologue())
    else {
        return;
    };
    if now.line != last.line {
        if let Some(line) = monologue.lines.get(monologue.line_index()) {
            let speaker = if monologue.speaker.is_empty() {
                "*"
            } else {
                monologue.speaker.as_str()
            };
            println!("[{:>5}] {}: {}", frame, speaker, line.text);
        }
    }
    if now.awaiting_choice && !last.awaiting_choice {
        let options: Vec<&str> = monologue
            .available_options(manager.flags())
            .map(|o| o.text.as_str())
            .collect();
        println!("[{:>5}]   options: {}", frame, options.join(" | "));
    }
}
