// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod mission;
pub mod agent;
pub mod action;
pub mod page;
pub mod events;
pub mod decision;
pub mod executor;
pub mod store;

pub use mission::{Mission, MissionId, MissionStatus, CreateMissionRequest};
pub use agent::{AgentId, AgentSnapshot, AgentStatus};
pub use action::{Action, ActionLog, ActionResult, Decision};
pub use page::{Element, ElementKind, PageSnapshot};
pub use events::{AgentEvent, Event, EventPayload, SummaryEvent};
