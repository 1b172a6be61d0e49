// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mission store port.
//!
//! The runtime needs only this narrow read/write contract; persistence
//! mechanics live behind it. `update` exists so concurrent writers (the
//! orchestrator merging agent exits, the logger flushing aggregates)
//! perform read-modify-write atomically instead of racing `get`/`put`.

use crate::domain::action::ActionLog;
use crate::domain::mission::{Mission, MissionId};

pub trait MissionStore: Send + Sync {
    /// Insert or replace a mission record.
    fn put(&self, mission: Mission);

    /// Fetch a mission by id, if known.
    fn get(&self, id: &MissionId) -> Option<Mission>;

    /// All known missions, in no particular order.
    fn list(&self) -> Vec<Mission>;

    /// Atomically mutate a mission in place. Returns `false` when the
    /// mission is unknown.
    fn update(&self, id: &MissionId, f: Box<dyn FnOnce(&mut Mission) + Send>) -> bool;

    /// Append one action log to a mission's durable record.
    fn add_action_log(&self, log: ActionLog, mission_id: &MissionId);
}
