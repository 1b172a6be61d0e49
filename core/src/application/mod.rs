// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_runner;
pub mod event_logger;
pub mod orchestrator;

pub use agent_runner::{AgentConfig, AgentRunner};
pub use event_logger::EventLogger;
pub use orchestrator::{MissionOrchestrator, OrchestratorError};
