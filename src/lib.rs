// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // engine config loading + validation
pub mod data;       // typed data values and slots
pub mod engine;     // steps, triggers, groups, scheduling
pub mod errors;     // error handling
pub mod observability;
pub mod steps;      // stock steps
pub mod traits;     // step and listener abstractions
