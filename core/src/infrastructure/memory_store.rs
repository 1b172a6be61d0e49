// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory mission store.
//!
//! The reference persistence backend: a `RwLock`-guarded map. Durable
//! stores implement the same [`MissionStore`] port out of tree.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::action::ActionLog;
use crate::domain::mission::{Mission, MissionId};
use crate::domain::store::MissionStore;

#[derive(Default)]
pub struct InMemoryMissionStore {
    missions: RwLock<HashMap<MissionId, Mission>>,
}

impl InMemoryMissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MissionStore for InMemoryMissionStore {
    fn put(&self, mission: Mission) {
        self.missions.write().insert(mission.id.clone(), mission);
    }

    fn get(&self, id: &MissionId) -> Option<Mission> {
        self.missions.read().get(id).cloned()
    }

    fn list(&self) -> Vec<Mission> {
        self.missions.read().values().cloned().collect()
    }

    fn update(&self, id: &MissionId, f: Box<dyn FnOnce(&mut Mission) + Send>) -> bool {
        let mut missions = self.missions.write();
        match missions.get_mut(id) {
            Some(mission) => {
                f(mission);
                true
            }
            None => false,
        }
    }

    fn add_action_log(&self, log: ActionLog, mission_id: &MissionId) {
        let mut missions = self.missions.write();
        if let Some(mission) = missions.get_mut(mission_id) {
            mission.push_recent(log);
        }
    }
}
