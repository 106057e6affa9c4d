//! # CASCADE Driver
//!
//! The sample three-component pipeline and a headless runner for it.
//!
//! - [`demo`] - components C1..C3, System A, System B, and [`demo::Pipeline`]
//! - [`script`] - TOML scripts of spawns, edits and destroys
//! - [`panel`] - text rendering of entities, change log and frame reports

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod demo;
pub mod panel;
pub mod script;

pub use demo::{Pipeline, C1, C2, C3};
pub use script::DemoConfig;
