// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod http;
pub mod session;

pub use http::{HttpBackend, HttpBackendFactory};
pub use session::SessionBackend;
