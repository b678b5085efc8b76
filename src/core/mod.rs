// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout the engine.
//!
//! This module provides the foundational types:
//! - [`EngineError`] - Error taxonomy for serving traffic
//! - [`EngineConfig`] - Fixed startup parameters

pub mod config;
pub mod error;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
