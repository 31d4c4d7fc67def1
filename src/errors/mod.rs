// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod compute;
mod config;
mod graph;
mod trigger;

pub use compute::ComputeError;
pub use config::ConfigError;
pub use graph::GraphError;
pub use trigger::TriggerError;
