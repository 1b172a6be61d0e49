// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stampede Core
//!
//! Swarm runtime for autonomous web-testing agents.
//!
//! # Architecture
//!
//! - **domain** — missions, agents, actions, events, and the ports the
//!   runtime depends on (decision policy, mission store, action backends).
//! - **application** — the mission orchestrator, the per-agent state
//!   machine, and the event logger / metrics aggregator.
//! - **infrastructure** — token-bucket rate limiting, the event bus, the
//!   HTML snapshot parser, concrete action backends, and the Gemini
//!   decision adapter.
//! - **presentation** — the REST API and the WebSocket broadcast hub.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
