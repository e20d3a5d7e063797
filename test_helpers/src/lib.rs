//! Test infrastructure for the exposure time calculator.
//!
//! The calculator is driven entirely by a configuration directory: a
//! `settings.json` document plus atmosphere cells, throughput curves and
//! source templates. This crate writes a small synthetic directory of that
//! shape into a temporary location so that unit and integration tests can
//! exercise every model without shipping observatory data.
//!
//! Every data file is generated from a closed-form function exposed here
//! (see [`fixture`]), so tests compare against exact expected values
//! rather than against stored numbers.
//!
//! # Usage
//!
//! ```rust
//! use test_helpers::Fixture;
//!
//! let fixture = Fixture::new();
//! assert!(fixture.path().join("settings.json").exists());
//! ```
//!
//! Tests that need a different configuration edit the settings document
//! before writing it:
//!
//! ```rust
//! use test_helpers::{fixture, Fixture};
//!
//! let mut settings = fixture::default_settings();
//! settings["calculator"]["defaults"]["dithers"] = 4.into();
//! let fixture = Fixture::with_settings(&settings).unwrap();
//! ```

pub mod fits;
pub mod fixture;

pub use fixture::Fixture;

/// Errors raised while writing fixture trees.
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to write fixture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode settings: {0}")]
    Json(#[from] serde_json::Error),
}
