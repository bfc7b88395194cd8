/// Dialogue integration tests: descriptor to runtime dialogue graph.

use scene_engine::core::assets::{AssetProvider, AssetRegistry};
use scene_engine::core::config::EngineConfig;
use scene_engine::core::dialogue::{Dialogue, DialogueStep};
use scene_engine::core::flags::FlagStore;
use scene_engine::core::loader::{LoadError, SceneLoader};
use scene_engine::core::scene::Scene;
use scene_engine::schema::descriptor::{
    DispatchKindDescriptor, RouteAssignmentDescriptor, SceneDescriptor,
};
use std::path::Path;

const PACK: &str = "scene_data/lighthouse";

fn assets() -> AssetRegistry {
    AssetRegistry::load(&Path::new(PACK).join("assets.json")).unwrap()
}

fn descriptor() -> SceneDescriptor {
    SceneDescriptor::load(&Path::new(PACK).join("lantern_room.json")).unwrap()
}

fn load(desc: &SceneDescriptor) -> Result<Scene, LoadError> {
    let assets = assets();
    let config = EngineConfig::default();
    SceneLoader::new(&assets, &config).load("lantern_room", desc)
}

fn evening(scene: &Scene) -> Dialogue {
    scene.world.entities["keeper"]
        .interactable
        .as_ref()
        .and_then(|i| i.dialogue("evening"))
        .cloned()
        .unwrap()
}

#[test]
fn greeting_walks_lines_then_offers_choices() {
    let scene = load(&descriptor()).unwrap();
    let mut dialogue = evening(&scene);
    let mut flags = FlagStore::new();

    let arrival = dialogue.start(&mut flags).unwrap();
    assert_eq!(arrival.monologue, "greet");
    assert_eq!(arrival.sfx, assets().audio("blip"));
    assert!(arrival.routes.is_empty());

    // Reveal "Evening.", page, reveal the question, then the options appear.
    assert!(matches!(dialogue.advance(&mut flags), DialogueStep::Continue));
    assert!(matches!(dialogue.advance(&mut flags), DialogueStep::Continue));
    assert!(matches!(dialogue.advance(&mut flags), DialogueStep::Continue));
    assert!(matches!(dialogue.advance(&mut flags), DialogueStep::AwaitingChoice));

    let view = dialogue.view(&flags).unwrap();
    assert_eq!(view.speaker, "Keeper");
    assert_eq!(view.text, "Will you light the lamp?");
    assert_eq!(view.options, vec!["Yes", "Not now"]);
    assert_eq!(view.font, assets().font("serif16"));
    assert_eq!(view.portrait, assets().image("keeper_portrait"));
}

#[test]
fn declining_leaves_the_lamp_cold() {
    let scene = load(&descriptor()).unwrap();
    let mut dialogue = evening(&scene);
    let mut flags = FlagStore::new();
    dialogue.start(&mut flags);
    for _ in 0..4 {
        dialogue.advance(&mut flags);
    }

    match dialogue.choose(1, &mut flags) {
        DialogueStep::Arrived(arrival) => {
            assert_eq!(arrival.monologue, "later");
            assert!(arrival.chain.is_none());
        }
        other => panic!("unexpected step {:?}", other),
    }
    assert!(!flags.is_set("lamp_lit"));
    assert!(matches!(dialogue.advance(&mut flags), DialogueStep::Continue));
    assert!(matches!(dialogue.advance(&mut flags), DialogueStep::Ended));
    assert!(dialogue.is_ending());
}

#[test]
fn accepting_lights_the_lamp_and_sets_the_keeper_pacing() {
    let scene = load(&descriptor()).unwrap();
    let mut dialogue = evening(&scene);
    let mut flags = FlagStore::new();
    dialogue.start(&mut flags);
    for _ in 0..4 {
        dialogue.advance(&mut flags);
    }

    let arrival = match dialogue.choose(0, &mut flags) {
        DialogueStep::Arrived(arrival) => arrival,
        other => panic!("unexpected step {:?}", other),
    };
    assert_eq!(arrival.monologue, "thanks");
    assert_eq!(arrival.routes, vec!["pace".to_string()]);
    let chain = arrival.chain.unwrap();
    let names: Vec<&str> = chain.events().iter().map(|e| e.kind.name()).collect();
    assert_eq!(names, vec!["shake_camera", "play_audio"]);
    assert!(flags.is_set("lamp_lit"));

    // A second conversation opens on the settled line.
    let mut again = evening(&scene);
    assert_eq!(again.start(&mut flags).unwrap().monologue, "settled");
}

#[test]
fn opening_trigger_embeds_the_narration() {
    let scene = load(&descriptor()).unwrap();
    let opening = scene
        .world
        .triggers
        .iter()
        .find(|t| t.id == "opening")
        .unwrap();
    assert!(opening.once);
    assert!(!opening.disabled);

    let events = opening.dispatch.events();
    let names: Vec<&str> = events.iter().map(|e| e.kind.name()).collect();
    assert_eq!(
        names,
        vec!["move_camera_to_entity", "start_independent_dialogue", "reset_camera"]
    );
    assert!(!events[0].wait_for_previous);
    assert!(events[1].wait_for_previous);
    assert!(events[2].wait_for_previous);
}

#[test]
fn option_to_a_missing_monologue_fails_the_load() {
    let mut desc = descriptor();
    let greet = desc.entities[0].dialogues[0]
        .monologues
        .iter_mut()
        .find(|m| m.id == "greet")
        .unwrap();
    greet.options[1].next_monologue = "nowhere".to_string();

    match load(&desc) {
        Err(LoadError::UnknownMonologue { dialogue, monologue }) => {
            assert_eq!(dialogue, "evening");
            assert_eq!(monologue, "nowhere");
        }
        other => panic!("expected UnknownMonologue, got {:?}", other.err()),
    }
}

#[test]
fn independent_dialogue_cannot_assign_routes() {
    let mut desc = descriptor();
    let opening = desc
        .triggers
        .iter_mut()
        .find(|t| t.identifier == "opening")
        .unwrap();
    let DispatchKindDescriptor::StartIndependentDialogue { dialogue } = &mut opening.dispatch[1].kind
    else {
        panic!("second opening event should be the narration");
    };
    dialogue.monologues[0]
        .set_route_on_reach
        .push(RouteAssignmentDescriptor {
            id: "pace".to_string(),
            conditions: Default::default(),
        });

    assert!(matches!(
        load(&desc),
        Err(LoadError::UnknownRoute { entity, route }) if entity.is_empty() && route == "pace"
    ));
}
