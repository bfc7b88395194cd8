//! Dialogue graphs: monologue pages with timed reveal, branching options,
//! and reach effects.
//!
//! A `Dialogue` is a template owned by an NPC (or embedded in a dispatch
//! event). Starting one clones it into the scene's active slot, so progress
//! never leaks between conversations.

use tracing::debug;

use crate::core::assets::{AudioHandle, FontHandle, ImageHandle};
use crate::core::dispatch::DispatchChain;
use crate::core::flags::{FlagMutation, FlagStore};
use crate::core::input::InputSnapshot;
use crate::core::render::DialogueView;
use crate::schema::conditions::Conditions;

pub const DEFAULT_FADE_RATE: f32 = 1020.0;
const FADE_MAX: f32 = 255.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MonologueLine {
    pub text: String,
    /// Seconds per revealed character.
    pub char_time: f32,
}

impl MonologueLine {
    pub fn new(text: &str, char_time: f32) -> Self {
        Self {
            text: text.to_string(),
            char_time,
        }
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonologueOption {
    pub text: String,
    pub next_monologue: String,
    pub conditions: Conditions,
}

/// Route change applied to the speaking entity when a monologue is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteAssignment {
    pub route: String,
    pub conditions: Conditions,
}

/// Outcome of confirming on a monologue.
#[derive(Debug, Clone, PartialEq)]
pub enum MonologueAdvance {
    /// The current line was completed instantly.
    Revealed,
    /// Moved to the next line.
    NextLine,
    /// The final line is showing and options are up.
    AwaitingChoice,
    /// The monologue is over. `None` ends the dialogue.
    Finished(Option<String>),
}

#[derive(Debug, Clone)]
pub struct Monologue {
    pub id: String,
    pub conditions: Conditions,
    pub alt_monologue: Option<String>,
    pub speaker: String,
    pub lines: Vec<MonologueLine>,
    pub font: Option<FontHandle>,
    pub next_monologue: Option<String>,
    pub set_route: Vec<RouteAssignment>,
    pub dispatch: DispatchChain,
    pub modify_flags: Vec<FlagMutation>,
    pub options: Vec<MonologueOption>,
    pub speaker_image: Option<ImageHandle>,
    pub speaking_sfx: Option<AudioHandle>,
    pub choice_fade_rate: f32,

    line_index: usize,
    char_index: usize,
    char_duration: f32,
    awaiting_choice: bool,
    choice_fade: f32,
}

impl Monologue {
    pub fn new(id: &str, speaker: &str, lines: Vec<MonologueLine>) -> Self {
        Self {
            id: id.to_string(),
            conditions: Conditions::always(),
            alt_monologue: None,
            speaker: speaker.to_string(),
            lines,
            font: None,
            next_monologue: None,
            set_route: Vec::new(),
            dispatch: DispatchChain::default(),
            modify_flags: Vec::new(),
            options: Vec::new(),
            speaker_image: None,
            speaking_sfx: None,
            choice_fade_rate: DEFAULT_FADE_RATE,
            line_index: 0,
            char_index: 0,
            char_duration: 0.0,
            awaiting_choice: false,
            choice_fade: 0.0,
        }
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn char_index(&self) -> usize {
        self.char_index
    }

    pub fn is_awaiting_choice(&self) -> bool {
        self.awaiting_choice
    }

    pub fn choice_fade(&self) -> f32 {
        self.choice_fade
    }

    /// Zero all progress.
    pub fn reset(&mut self) {
        self.line_index = 0;
        self.char_index = 0;
        self.char_duration = 0.0;
        self.awaiting_choice = false;
        self.choice_fade = 0.0;
    }

    fn current_line(&self) -> Option<&MonologueLine> {
        self.lines.get(self.line_index)
    }

    fn line_revealed(&self) -> bool {
        self.current_line()
            .map_or(true, |line| self.char_index >= line.len())
    }

    /// Revealed text of the current line.
    pub fn spoken(&self) -> &str {
        let Some(line) = self.current_line() else {
            return "";
        };
        let end = line
            .text
            .char_indices()
            .nth(self.char_index)
            .map_or(line.text.len(), |(i, _)| i);
        &line.text[..end]
    }

    /// Options whose conditions hold, in declaration order.
    pub fn available_options<'a>(
        &'a self,
        flags: &'a FlagStore,
    ) -> impl Iterator<Item = &'a MonologueOption> + 'a {
        self.options.iter().filter(move |o| o.conditions.satisfied(flags))
    }

    pub fn update(&mut self, dt: f32) {
        let target = if self.awaiting_choice { FADE_MAX } else { 0.0 };
        let step = self.choice_fade_rate * dt;
        self.choice_fade = if self.choice_fade < target {
            (self.choice_fade + step).min(target)
        } else {
            (self.choice_fade - step).max(target)
        };

        let Some(line) = self.current_line() else {
            return;
        };
        if self.char_index >= line.len() {
            return;
        }
        let char_time = line.char_time;
        self.char_duration += dt;
        if self.char_duration >= char_time {
            self.char_duration = 0.0;
            self.char_index += 1;
        }
    }

    /// Confirm pressed: finish the line, turn the page, or end.
    pub fn advance(&mut self, flags: &FlagStore) -> MonologueAdvance {
        if self.awaiting_choice {
            return MonologueAdvance::AwaitingChoice;
        }
        if !self.line_revealed() {
            if let Some(len) = self.current_line().map(MonologueLine::len) {
                self.char_index = len;
            }
            return MonologueAdvance::Revealed;
        }
        if self.line_index + 1 < self.lines.len() {
            self.line_index += 1;
            self.char_index = 0;
            self.char_duration = 0.0;
            return MonologueAdvance::NextLine;
        }
        if self.available_options(flags).next().is_some() {
            self.awaiting_choice = true;
            return MonologueAdvance::AwaitingChoice;
        }
        MonologueAdvance::Finished(self.next_monologue.clone())
    }

    /// Target of the `index`th available option. Only valid while
    /// awaiting a choice.
    pub fn choose(&self, index: usize, flags: &FlagStore) -> Option<String> {
        if !self.awaiting_choice {
            return None;
        }
        self.available_options(flags)
            .nth(index)
            .map(|o| o.next_monologue.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartCandidate {
    pub monologue: String,
    pub conditions: Conditions,
}

/// Effects produced by reaching a monologue. Route assignments name routes
/// of whichever entity owns the dialogue.
#[derive(Debug, Clone)]
pub struct Arrival {
    pub monologue: String,
    pub routes: Vec<String>,
    pub chain: Option<DispatchChain>,
    pub sfx: Option<AudioHandle>,
}

#[derive(Debug, Clone)]
pub enum DialogueStep {
    Continue,
    AwaitingChoice,
    Arrived(Arrival),
    /// The graph is exhausted and the fade-out has begun.
    Ended,
}

#[derive(Debug, Clone)]
pub struct Dialogue {
    pub id: String,
    pub conditions: Conditions,
    pub start: Vec<StartCandidate>,
    pub monologues: Vec<Monologue>,
    pub fade_rate: f32,

    current: Option<usize>,
    playing: bool,
    ending: bool,
    fade: f32,
    choice_index: usize,
}

impl Dialogue {
    pub fn new(id: &str, start: Vec<StartCandidate>, monologues: Vec<Monologue>) -> Self {
        Self {
            id: id.to_string(),
            conditions: Conditions::always(),
            start,
            monologues,
            fade_rate: DEFAULT_FADE_RATE,
            current: None,
            playing: false,
            ending: false,
            fade: 0.0,
            choice_index: 0,
        }
    }

    /// True from a successful `start` until the fade-out reaches zero.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_ending(&self) -> bool {
        self.ending
    }

    pub fn fade(&self) -> f32 {
        self.fade
    }

    pub fn choice_index(&self) -> usize {
        self.choice_index
    }

    pub fn current_monologue(&self) -> Option<&Monologue> {
        self.current.and_then(|i| self.monologues.get(i))
    }

    fn current_monologue_mut(&mut self) -> Option<&mut Monologue> {
        self.current.and_then(|i| self.monologues.get_mut(i))
    }

    pub fn monologue(&self, id: &str) -> Option<&Monologue> {
        self.monologues.iter().find(|m| m.id == id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.monologues.iter().position(|m| m.id == id)
    }

    /// Follow `alt_monologue` links from `id` until a monologue whose
    /// conditions hold. Gives up after visiting every monologue once.
    pub fn resolve(&self, id: &str, flags: &FlagStore) -> Option<usize> {
        let mut index = self.index_of(id)?;
        for _ in 0..self.monologues.len() {
            let monologue = &self.monologues[index];
            if monologue.conditions.satisfied(flags) {
                return Some(index);
            }
            index = self.index_of(monologue.alt_monologue.as_deref()?)?;
        }
        None
    }

    fn arrive(&mut self, id: &str, flags: &mut FlagStore) -> Option<Arrival> {
        let index = self.resolve(id, flags)?;
        self.current = Some(index);
        self.choice_index = 0;

        let monologue = &mut self.monologues[index];
        monologue.reset();
        let routes = monologue
            .set_route
            .iter()
            .filter(|r| r.conditions.satisfied(flags))
            .map(|r| r.route.clone())
            .collect();
        for mutation in &monologue.modify_flags {
            flags.apply(mutation);
        }
        let chain = (!monologue.dispatch.is_empty()).then(|| monologue.dispatch.clone());
        debug!(dialogue = %self.id, monologue = %monologue.id, "monologue reached");

        Some(Arrival {
            monologue: monologue.id.clone(),
            routes,
            chain,
            sfx: monologue.speaking_sfx,
        })
    }

    /// Begin at the first start candidate whose conditions hold. `None` if
    /// no candidate resolves; the dialogue then stays idle.
    pub fn start(&mut self, flags: &mut FlagStore) -> Option<Arrival> {
        self.reset();
        let id = self
            .start
            .iter()
            .find(|c| c.conditions.satisfied(flags))
            .map(|c| c.monologue.clone())?;
        let arrival = self.arrive(&id, flags)?;
        self.playing = true;
        debug!(dialogue = %self.id, "dialogue started");
        Some(arrival)
    }

    /// Begin fading out. Progress is kept until the fade completes.
    pub fn end(&mut self) {
        if self.playing && !self.ending {
            debug!(dialogue = %self.id, "dialogue ending");
        }
        self.ending = true;
    }

    pub fn advance(&mut self, flags: &mut FlagStore) -> DialogueStep {
        if self.ending {
            return DialogueStep::Ended;
        }
        let Some(monologue) = self.current_monologue_mut() else {
            return DialogueStep::Ended;
        };
        match monologue.advance(flags) {
            MonologueAdvance::Revealed | MonologueAdvance::NextLine => DialogueStep::Continue,
            MonologueAdvance::AwaitingChoice => DialogueStep::AwaitingChoice,
            MonologueAdvance::Finished(None) => {
                self.end();
                DialogueStep::Ended
            }
            MonologueAdvance::Finished(Some(next)) => self.transition(&next, flags),
        }
    }

    pub fn choose(&mut self, index: usize, flags: &mut FlagStore) -> DialogueStep {
        if self.ending {
            return DialogueStep::Ended;
        }
        let target = self
            .current_monologue()
            .and_then(|m| m.choose(index, flags));
        match target {
            Some(next) => self.transition(&next, flags),
            None => DialogueStep::Continue,
        }
    }

    fn transition(&mut self, next: &str, flags: &mut FlagStore) -> DialogueStep {
        match self.arrive(next, flags) {
            Some(arrival) => DialogueStep::Arrived(arrival),
            None => {
                self.end();
                DialogueStep::Ended
            }
        }
    }

    /// Move the option highlight, clamped to the available options.
    pub fn move_choice(&mut self, delta: i32, flags: &FlagStore) {
        let count = self
            .current_monologue()
            .map_or(0, |m| m.available_options(flags).count());
        if count == 0 {
            self.choice_index = 0;
            return;
        }
        let next = self.choice_index as i64 + delta as i64;
        self.choice_index = next.clamp(0, count as i64 - 1) as usize;
    }

    /// Handle one frame of key presses.
    pub fn input(&mut self, pressed: &InputSnapshot, flags: &mut FlagStore) -> DialogueStep {
        if pressed.down {
            self.move_choice(1, flags);
        }
        if pressed.up {
            self.move_choice(-1, flags);
        }
        if !pressed.confirm {
            return DialogueStep::Continue;
        }
        let awaiting = self
            .current_monologue()
            .is_some_and(Monologue::is_awaiting_choice);
        if awaiting {
            self.choose(self.choice_index, flags)
        } else {
            self.advance(flags)
        }
    }

    pub fn update(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        let step = self.fade_rate * dt;
        if self.ending {
            self.fade = (self.fade - step).max(0.0);
            if self.fade == 0.0 {
                self.playing = false;
            }
            return;
        }
        self.fade = (self.fade + step).min(FADE_MAX);
        if let Some(monologue) = self.current_monologue_mut() {
            monologue.update(dt);
        }
    }

    /// Drop all progress without fading.
    pub fn reset(&mut self) {
        self.current = None;
        self.playing = false;
        self.ending = false;
        self.fade = 0.0;
        self.choice_index = 0;
        for monologue in &mut self.monologues {
            monologue.reset();
        }
    }

    pub fn view<'a>(&'a self, flags: &'a FlagStore) -> Option<DialogueView<'a>> {
        let monologue = self.current_monologue()?;
        Some(DialogueView {
            speaker: &monologue.speaker,
            text: monologue.spoken(),
            font: monologue.font,
            portrait: monologue.speaker_image,
            options: if monologue.is_awaiting_choice() {
                monologue
                    .available_options(flags)
                    .map(|o| o.text.as_str())
                    .collect()
            } else {
                Vec::new()
            },
            selected: self.choice_index,
            fade: self.fade,
            choice_fade: monologue.choice_fade(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> MonologueLine {
        MonologueLine::new(text, 0.05)
    }

    fn option(text: &str, next: &str) -> MonologueOption {
        MonologueOption {
            text: text.to_string(),
            next_monologue: next.to_string(),
            conditions: Conditions::always(),
        }
    }

    fn start(id: &str) -> StartCandidate {
        StartCandidate {
            monologue: id.to_string(),
            conditions: Conditions::always(),
        }
    }

    #[test]
    fn reveal_one_char_per_elapsed_char_time() {
        let mut m = Monologue::new("a", "Keeper", vec![line("Hello")]);
        m.update(0.02);
        assert_eq!(m.spoken(), "");
        m.update(0.04);
        assert_eq!(m.spoken(), "H");
        m.update(0.05);
        assert_eq!(m.spoken(), "He");
    }

    #[test]
    fn spoken_respects_char_boundaries() {
        let mut m = Monologue::new("a", "", vec![MonologueLine::new("héllo", 0.0)]);
        m.update(0.0);
        m.update(0.0);
        assert_eq!(m.spoken(), "hé");
    }

    #[test]
    fn advance_reveals_then_moves_forward() {
        let flags = FlagStore::new();
        let mut m = Monologue::new("a", "", vec![line("one"), line("two"), line("three")]);
        assert_eq!(m.advance(&flags), MonologueAdvance::Revealed);
        assert_eq!(m.spoken(), "one");
        let mut last = m.line_index();
        loop {
            match m.advance(&flags) {
                MonologueAdvance::NextLine => {
                    assert!(m.line_index() > last);
                    last = m.line_index();
                    assert_eq!(m.advance(&flags), MonologueAdvance::Revealed);
                }
                MonologueAdvance::Finished(next) => {
                    assert_eq!(next, None);
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(last, 2);
    }

    #[test]
    fn options_gate_on_conditions() {
        let mut flags = FlagStore::new();
        let mut m = Monologue::new("a", "", vec![MonologueLine::new("?", 0.0)]);
        m.options.push(MonologueOption {
            conditions: Conditions::all_of(&["lamp_lit"]),
            ..option("Light", "lit")
        });
        m.next_monologue = Some("fallback".to_string());
        m.advance(&flags);
        assert_eq!(
            m.advance(&flags),
            MonologueAdvance::Finished(Some("fallback".to_string()))
        );

        flags.set("lamp_lit");
        m.reset();
        m.advance(&flags);
        assert_eq!(m.advance(&flags), MonologueAdvance::AwaitingChoice);
        assert_eq!(m.choose(0, &flags), Some("lit".to_string()));
        assert_eq!(m.choose(1, &flags), None);
    }

    #[test]
    fn choice_fade_ramps_both_ways() {
        let flags = FlagStore::new();
        let mut m = Monologue::new("a", "", vec![MonologueLine::new("", 0.0)]);
        m.options.push(option("Go", "b"));
        m.advance(&flags);
        m.update(0.1);
        assert!(m.choice_fade() > 0.0);
        m.update(1.0);
        assert_eq!(m.choice_fade(), 255.0);
        m.reset();
        assert_eq!(m.choice_fade(), 0.0);
    }

    fn branching() -> Dialogue {
        let mut a = Monologue::new("A", "Keeper", vec![line("Stay?")]);
        a.options.push(option("Yes", "B"));
        let b = Monologue::new("B", "Keeper", vec![line("Good.")]);
        Dialogue::new("talk", vec![start("A")], vec![a, b])
    }

    #[test]
    fn option_path_ends_after_fade() {
        let mut flags = FlagStore::new();
        let mut d = branching();
        let arrival = d.start(&mut flags).unwrap();
        assert_eq!(arrival.monologue, "A");
        assert!(d.is_playing());
        d.update(1.0);
        assert_eq!(d.fade(), 255.0);

        assert!(matches!(d.advance(&mut flags), DialogueStep::Continue));
        assert!(matches!(d.advance(&mut flags), DialogueStep::AwaitingChoice));
        match d.choose(0, &mut flags) {
            DialogueStep::Arrived(a) => assert_eq!(a.monologue, "B"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(d.advance(&mut flags), DialogueStep::Continue));
        assert!(matches!(d.advance(&mut flags), DialogueStep::Ended));
        assert!(d.is_playing());

        d.update(0.1);
        assert!(d.is_playing());
        d.update(0.1);
        d.update(0.1);
        assert_eq!(d.fade(), 0.0);
        assert!(!d.is_playing());
    }

    #[test]
    fn fade_in_reaches_full() {
        let mut flags = FlagStore::new();
        let mut d = branching();
        d.start(&mut flags);
        d.update(0.1);
        assert!((d.fade() - 102.0).abs() < 1e-3);
        d.update(1.0);
        assert_eq!(d.fade(), 255.0);
    }

    #[test]
    fn alt_chain_falls_back() {
        let mut flags = FlagStore::new();
        let mut gated = Monologue::new("gated", "", vec![line("secret")]);
        gated.conditions = Conditions::all_of(&["trusted"]);
        gated.alt_monologue = Some("plain".to_string());
        let plain = Monologue::new("plain", "", vec![line("hello")]);
        let mut d = Dialogue::new("talk", vec![start("gated")], vec![gated, plain]);

        assert_eq!(d.start(&mut flags).unwrap().monologue, "plain");
        flags.set("trusted");
        assert_eq!(d.start(&mut flags).unwrap().monologue, "gated");
    }

    #[test]
    fn alt_cycle_gives_up() {
        let mut flags = FlagStore::new();
        let mut a = Monologue::new("a", "", vec![]);
        a.conditions = Conditions::all_of(&["x"]);
        a.alt_monologue = Some("b".to_string());
        let mut b = Monologue::new("b", "", vec![]);
        b.conditions = Conditions::all_of(&["x"]);
        b.alt_monologue = Some("a".to_string());
        let mut d = Dialogue::new("loop", vec![start("a")], vec![a, b]);
        assert!(d.start(&mut flags).is_none());
        assert!(!d.is_playing());
    }

    #[test]
    fn arrival_effects_fire_once() {
        let mut flags = FlagStore::new();
        let mut m = Monologue::new("a", "", vec![line("hi")]);
        m.modify_flags.push(FlagMutation {
            how: crate::core::flags::FlagOp::Toggle,
            flag: "met".to_string(),
        });
        m.set_route.push(RouteAssignment {
            route: "walk".to_string(),
            conditions: Conditions::none_of(&["met"]),
        });
        let mut d = Dialogue::new("talk", vec![start("a")], vec![m]);
        let arrival = d.start(&mut flags).unwrap();
        assert!(flags.is_set("met"));
        assert_eq!(arrival.routes, vec!["walk".to_string()]);
        assert!(arrival.chain.is_none());
    }

    #[test]
    fn no_satisfied_start_stays_idle() {
        let mut flags = FlagStore::new();
        let mut d = Dialogue::new(
            "talk",
            vec![StartCandidate {
                monologue: "a".to_string(),
                conditions: Conditions::all_of(&["never"]),
            }],
            vec![Monologue::new("a", "", vec![])],
        );
        assert!(d.start(&mut flags).is_none());
        assert!(d.current_monologue().is_none());
    }

    #[test]
    fn input_uses_press_edges_and_clamps_choice() {
        let mut flags = FlagStore::new();
        let mut a = Monologue::new("A", "", vec![MonologueLine::new("", 0.0)]);
        a.options.push(option("One", "B"));
        a.options.push(option("Two", "C"));
        let b = Monologue::new("B", "", vec![line("b")]);
        let c = Monologue::new("C", "", vec![line("c")]);
        let mut d = Dialogue::new("talk", vec![start("A")], vec![a, b, c]);
        d.start(&mut flags);

        let confirm = InputSnapshot::confirm();
        let down = InputSnapshot {
            down: true,
            ..InputSnapshot::NONE
        };
        assert!(matches!(d.input(&confirm, &mut flags), DialogueStep::AwaitingChoice));
        d.input(&down, &mut flags);
        d.input(&down, &mut flags);
        assert_eq!(d.choice_index(), 1);
        match d.input(&confirm, &mut flags) {
            DialogueStep::Arrived(a) => assert_eq!(a.monologue, "C"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(d.choice_index(), 0);
    }
}
