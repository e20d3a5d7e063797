//! Exposure time calculator for a ground-based spectrograph.
//!
//! A [`Calculator`] owns one model per physical concern and combines them
//! into photon rates over a wavelength grid:
//!
//! - [`AtmosphereModel`]: transmission and sky emission over an
//!   airmass × water-vapor × wavelength grid
//! - [`InstrumentModel`]: the selected instrument's throughput curves and
//!   detector parameters per mode
//! - [`SourceModel`]: the target's spectral flux density
//!
//! Depending on the target, the calculator then solves either the
//! signal-to-noise ratio reached in a set of exposure times, or the exposure
//! time needed for a set of signal-to-noise ratios.
//!
//! ```no_run
//! use calculator::Calculator;
//!
//! let mut calc = Calculator::from_dir("config".as_ref())?;
//! calc.set_parameter("source.brightness", "18 magab")?;
//! calc.set_parameter("exposure", vec!["600 s", "1200 s"])?;
//! let snr = &calc.results().signal_noise_ratio;
//! # Ok::<(), calculator::CalculatorError>(())
//! ```

pub mod atmosphere;
pub mod calculator;
pub mod config;
pub mod error;
pub mod instrument;
pub mod parameters;
pub mod photometry;
pub mod source;

pub use atmosphere::AtmosphereModel;
pub use calculator::{Calculator, Results};
pub use config::{Config, Target};
pub use error::{CalculatorError, ConfigError, InstrumentError, ParameterError, SourceError};
pub use instrument::InstrumentModel;
pub use parameters::{ParamValue, ParameterInfo};
pub use source::SourceModel;

/// Log a non-fatal problem and keep it for the results snapshot.
pub(crate) fn record_warning(warnings: &mut Vec<String>, message: impl Into<String>) {
    let message = message.into();
    log::warn!("{message}");
    warnings.push(message);
}
