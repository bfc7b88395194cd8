/// Scene Linter: validates a scene guide and every scene it lists.
///
/// Usage: scene_linter <guide.json> --assets <assets.json> [--config <file>]

use rustc_hash::FxHashSet;
use scene_engine::core::assets::AssetRegistry;
use scene_engine::core::config::EngineConfig;
use scene_engine::core::loader::SceneLoader;
use scene_engine::schema::descriptor::{
    DialogueDescriptor, DispatchDescriptor, DispatchKindDescriptor, SceneDescriptor, SceneGuide,
};
use std::path::Path;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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
        println!("Usage: scene_linter <guide.json> --assets <assets.json> [--config <file>]");
        process::exit(0);
    }

    let guide_path = Path::new(&args[1]);
    let mut assets_path = None;
    let mut config_path = None;

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
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(assets_path) = assets_path else {
        eprintln!("ERROR: --assets is required");
        process::exit(1);
    };
    let assets = match AssetRegistry::load(Path::new(&assets_path)) {
        Ok(assets) => assets,
        Err(e) => {
            eprintln!("ERROR: Failed to load assets: {}", e);
            process::exit(1);
        }
    };
    let config = match config_path {
        Some(path) => match EngineConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    let guide = match SceneGuide::load(guide_path) {
        Ok(guide) => guide,
        Err(e) => {
            eprintln!("ERROR: Failed to load guide: {}", e);
            process::exit(1);
        }
    };

    let base = guide_path.parent().unwrap_or_else(|| Path::new("."));
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut scenes = Vec::new();
    for scene in &guide.scenes {
        match SceneDescriptor::load(&base.join(&scene.path)) {
            Ok(desc) => {
                println!("  Loaded: {}", scene.path);
                scenes.push((scene.name.as_str(), desc));
            }
            Err(e) => errors.push(format!("{}: {}", scene.name, e)),
        }
    }

    let loader = SceneLoader::new(&assets, &config);
    for (name, desc) in &scenes {
        if let Err(e) = loader.load(name, desc) {
            errors.push(format!("{}: {}", name, e));
        }
        let (new_errors, new_warnings) = lint_scene(name, desc, &scenes);
        errors.extend(new_errors);
        warnings.extend(new_warnings);
    }
    if !scenes.iter().any(|(name, _)| *name == guide.start_scene) {
        errors.push(format!("start scene '{}' is not in the guide", guide.start_scene));
    }

    println!("\n=== Scene Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} scenes, {} errors, {} warnings",
        scenes.len(),
        errors.len(),
        warnings.len()
    );

    if !errors.is_empty() {
        process::exit(1);
    }
}

/// Every dialogue in the scene and every dispatch event, including those
/// nested inside monologues and independent dialogues.
fn collect(desc: &SceneDescriptor) -> (Vec<&DialogueDescriptor>, Vec<&DispatchDescriptor>) {
    let mut dialogues = Vec::new();
    let mut events = Vec::new();
    let mut pending: Vec<&DispatchDescriptor> = desc.triggers.iter().flat_map(|t| &t.dispatch).collect();
    for dialogue in desc.entities.iter().flat_map(|e| &e.dialogues) {
        visit_dialogue(dialogue, &mut dialogues, &mut pending);
    }
    while let Some(event) = pending.pop() {
        if let DispatchKindDescriptor::StartIndependentDialogue { dialogue } = &event.kind {
            visit_dialogue(dialogue, &mut dialogues, &mut pending);
        }
        events.push(event);
    }
    (dialogues, events)
}

fn visit_dialogue<'a>(
    dialogue: &'a DialogueDescriptor,
    dialogues: &mut Vec<&'a DialogueDescriptor>,
    pending: &mut Vec<&'a DispatchDescriptor>,
) {
    dialogues.push(dialogue);
    for monologue in &dialogue.monologues {
        pending.extend(&monologue.dispatch_on_reach);
    }
}

/// Monologue ids no start candidate can lead to.
fn unreachable_monologues(dialogue: &DialogueDescriptor) -> Vec<&str> {
    let mut seen = FxHashSet::default();
    let mut stack: Vec<&str> = dialogue.start_monologue.iter().map(|s| s.id.as_str()).collect();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(monologue) = dialogue.monologues.iter().find(|m| m.id == id) else {
            continue;
        };
        let links = [&monologue.next_monologue, &monologue.alt_monologue];
        stack.extend(links.into_iter().filter_map(|l| l.as_deref()).filter(|l| !l.is_empty()));
        stack.extend(monologue.options.iter().map(|o| o.next_monologue.as_str()));
    }
    dialogue
        .monologues
        .iter()
        .map(|m| m.id.as_str())
        .filter(|id| !seen.contains(id))
        .collect()
}

fn lint_scene(
    name: &str,
    desc: &SceneDescriptor,
    scenes: &[(&str, SceneDescriptor)],
) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let (dialogues, events) = collect(desc);

    for dialogue in &dialogues {
        for monologue in unreachable_monologues(dialogue) {
            warnings.push(format!(
                "{}: monologue '{}' in dialogue '{}' is unreachable",
                name, monologue, dialogue.id
            ));
        }
    }

    for trigger in desc.triggers.iter().filter(|t| t.disabled) {
        let enabled = events.iter().any(|e| {
            matches!(&e.kind, DispatchKindDescriptor::EnableTrigger { identifier } if *identifier == trigger.identifier)
        });
        if !enabled {
            warnings.push(format!(
                "{}: trigger '{}' starts disabled and is never enabled",
                name, trigger.identifier
            ));
        }
    }

    for exit in &desc.exits {
        match scenes.iter().find(|(n, _)| *n == exit.next_scene) {
            None => errors.push(format!("{}: exit leads to unknown scene '{}'", name, exit.next_scene)),
            Some((_, target)) => {
                if !exit.entrance.is_empty()
                    && !target.entrances.iter().any(|e| e.identifier == exit.entrance)
                {
                    errors.push(format!(
                        "{}: exit leads to unknown entrance '{}' of '{}'",
                        name, exit.entrance, exit.next_scene
                    ));
                }
            }
        }
    }

    (errors, warnings)
}
