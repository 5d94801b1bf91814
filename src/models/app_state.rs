use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix::prelude::*;
use log::{info, warn};
use uuid::Uuid;

use crate::engine::bridge::{BridgeConfig, EngineBridge};
use crate::errors::RegistryError;
use crate::game::oracle::LegalityOracle;
use crate::game::session::{GameSessionActor, SessionConfig};
use crate::models::seat::Seat;
use crate::team::TeamChannels;

/// Process-wide registry: match id → owning session actor, plus the
/// engine-bridge capacity gate. Matches never share state; the map only
/// routes requests to the owning actor.
pub struct AppState {
    matches: Mutex<HashMap<Uuid, Addr<GameSessionActor>>>,
    engine_slots: Mutex<usize>,
}

impl AppState {
    pub fn new(engine_capacity: usize) -> Arc<AppState> {
        Arc::new(AppState {
            matches: Mutex::new(HashMap::new()),
            engine_slots: Mutex::new(engine_capacity),
        })
    }

    /// Start a session actor for a fully seated match and register it.
    pub fn create_match(
        &self,
        config: SessionConfig,
        oracle: Box<dyn LegalityOracle>,
    ) -> (Uuid, Addr<GameSessionActor>) {
        let actor = GameSessionActor::new(config, oracle);
        let match_id = actor.match_id();
        let addr = actor.start();
        self.matches.lock().unwrap().insert(match_id, addr.clone());
        info!("registered match {}", match_id);
        (match_id, addr)
    }

    pub fn lookup(&self, match_id: Uuid) -> Result<Addr<GameSessionActor>, RegistryError> {
        self.matches
            .lock()
            .unwrap()
            .get(&match_id)
            .cloned()
            .ok_or_else(|| RegistryError::MatchNotFound(match_id.to_string()))
    }

    /// Drop a finished match once its result has been reported.
    pub fn remove_match(&self, match_id: Uuid) {
        if self.matches.lock().unwrap().remove(&match_id).is_some() {
            info!("removed match {}", match_id);
        }
    }

    pub fn running_matches(&self) -> usize {
        self.matches.lock().unwrap().len()
    }

    /// Start an engine bridge for `seats` of a match, enforcing the
    /// configured capacity. The bridge itself does not self-limit.
    pub fn spawn_bridge(
        self: &Arc<Self>,
        config: BridgeConfig,
        seats: Vec<Seat>,
        session: Addr<GameSessionActor>,
        channels: Arc<TeamChannels>,
    ) -> Result<Addr<EngineBridge>, RegistryError> {
        let slot = self.try_acquire_engine_slot()?;
        let bridge = EngineBridge::new(config, seats, session, channels).with_slot(slot);
        Ok(bridge.start())
    }

    fn try_acquire_engine_slot(self: &Arc<Self>) -> Result<EngineSlot, RegistryError> {
        let mut slots = self.engine_slots.lock().unwrap();
        if *slots == 0 {
            warn!("engine bridge capacity exhausted");
            return Err(RegistryError::EngineCapacityExhausted);
        }
        *slots -= 1;
        Ok(EngineSlot {
            state: Arc::clone(self),
        })
    }

    fn release_engine_slot(&self) {
        *self.engine_slots.lock().unwrap() += 1;
    }

    pub fn free_engine_slots(&self) -> usize {
        *self.engine_slots.lock().unwrap()
    }
}

/// Holds one unit of engine-bridge capacity; returned to the pool on drop.
pub struct EngineSlot {
    state: Arc<AppState>,
}

impl Drop for EngineSlot {
    fn drop(&mut self) {
        self.state.release_engine_slot();
    }
}
