// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiDecider;
