// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;

#[cfg(test)]
mod integration_tests;
pub mod consts;

pub use consts::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_FAULT_HISTORY, DEFAULT_LOG_FILTER, DEFAULT_MAX_CATCH_UP_STEPS,
    DEFAULT_STEP_SIZE_MS, DEFAULT_STOP_TIMEOUT_MS,
};
pub use loader::{
    load_and_validate_config, load_config, parse_config, validate_config, ConfigFormat,
    EngineConfig, EventsConfig, LoggingConfig, LoopedTriggerConfig, StepsConfig,
};
