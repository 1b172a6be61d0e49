// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod rate_limit;
pub mod event_bus;
pub mod memory_store;
pub mod html;
pub mod executor;
pub mod decision;

pub use event_bus::EventBus;
pub use memory_store::InMemoryMissionStore;
pub use rate_limit::{RateLimiter, RateLimiterRegistry};
