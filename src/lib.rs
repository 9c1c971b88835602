// Copyright 2026 Fellowscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fellowscout library — fellowship acquisition pipeline.
//!
//! Collector → Intake → Raw Store → Refiner → Processed Store → Query Engine.
//! Each stage is independently invocable; the raw store's `processed` tag is
//! the checkpoint that lets the refiner resume after a partial run.

#![allow(clippy::new_without_default)]

pub mod browser;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod intake;
pub mod query;
pub mod refine;
pub mod store;
