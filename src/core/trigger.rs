use tracing::debug;

use crate::core::dispatch::{CatchEvent, ChainArena, ChainId, DispatchChain};
use crate::core::flags::FlagStore;
use crate::core::scene::{SceneState, SceneWorld};

/// Binds catch predicates to a dispatch chain. Catches are OR'd.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub id: String,
    pub disabled: bool,
    pub once: bool,
    pub catches: Vec<CatchEvent>,
    pub dispatch: DispatchChain,
    running: Option<ChainId>,
}

impl Trigger {
    pub fn new(id: &str, catches: Vec<CatchEvent>, dispatch: DispatchChain) -> Self {
        Self {
            id: id.to_string(),
            disabled: false,
            once: false,
            catches,
            dispatch,
            running: None,
        }
    }

    /// The chain started by the last firing, if it is still running.
    pub fn running(&self, chains: &ChainArena) -> Option<ChainId> {
        self.running.filter(|id| chains.is_alive(*id))
    }

    /// True when enabled, idle, and any catch holds. A trigger never
    /// overlaps its own chain.
    pub fn catches(
        &self,
        world: &SceneWorld,
        state: SceneState,
        flags: &FlagStore,
    ) -> bool {
        if self.disabled || self.running(&world.chains).is_some() {
            return false;
        }
        self.catches.iter().any(|c| c.catches(world, state, flags))
    }

    /// Queue a fresh copy of the chain. A `once` trigger disables itself
    /// here, before its chain has run.
    pub fn fire(&mut self, chains: &mut ChainArena) -> Option<ChainId> {
        if self.disabled {
            return None;
        }
        if self.once {
            self.disabled = true;
        }
        debug!(trigger = %self.id, once = self.once, "trigger fired");
        let id = chains.spawn(self.dispatch.clone());
        self.running = Some(id);
        Some(id)
    }
}
