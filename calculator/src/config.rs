//! Typed configuration loaded from `settings.json`.
//!
//! The configuration directory holds the settings document and the data
//! directories it names. Quantities are written either as strings such as
//! `"0.8 arcsec"` or as bare numbers, and are checked for the right
//! dimension when the document is loaded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use shared::algo::is_strictly_increasing;
use shared::units::{Quantity, Unit};

use crate::error::ConfigError;

pub const SETTINGS_FILENAME: &str = "settings.json";

/// Which quantity the calculator solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    SignalNoiseRatio,
    Exposure,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::SignalNoiseRatio, Target::Exposure];

    pub fn key(&self) -> &'static str {
        match self {
            Target::SignalNoiseRatio => "signal_noise_ratio",
            Target::Exposure => "exposure",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Target::SignalNoiseRatio => "Signal to Noise Ratio",
            Target::Exposure => "Exposure",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.key() == key)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn default_wavelength_count() -> usize {
    400
}

fn default_nm() -> String {
    "nm".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculatorDefaults {
    pub target: Target,
    pub exposure: Vec<Quantity>,
    pub signal_noise_ratio: Vec<f64>,
    pub dithers: u32,
    pub repeats: u32,
    pub coadds: u32,
    pub reads: u32,
    /// Key into [`Config::instruments`]
    pub instrument: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculatorSettings {
    pub telescope_area: Quantity,
    #[serde(default = "default_wavelength_count")]
    pub wavelength_count: usize,
    pub defaults: CalculatorDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtmosphereDefaults {
    pub airmass: Quantity,
    pub water_vapor: Quantity,
    pub seeing: Quantity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtmosphereSettings {
    pub directory: String,
    pub transmission_prefix: String,
    pub emission_prefix: String,
    pub airmass_index: Vec<f64>,
    pub water_vapor_index: Vec<Quantity>,
    /// `[start, stop, step]`, stop excluded
    pub wavelength_index: Vec<Quantity>,
    #[serde(default = "default_nm")]
    pub wavelength_unit: String,
    pub emission_unit: String,
    pub defaults: AtmosphereDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeDefaults {
    pub slit: [Quantity; 2],
    pub binning: [u32; 2],
    pub grating: Option<String>,
    pub grism: Option<String>,
    pub filter: Option<String>,
    pub dichroic: Option<String>,
}

impl ModeDefaults {
    pub fn option(&self, axis: &str) -> Option<&str> {
        match axis {
            "grating" => self.grating.as_deref(),
            "grism" => self.grism.as_deref(),
            "filter" => self.filter.as_deref(),
            "dichroic" => self.dichroic.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeSettings {
    pub spectral_resolution: f64,
    pub pixel_size: Quantity,
    pub dark_current: Quantity,
    pub read_noise: Quantity,
    pub gain: Quantity,
    pub nonlinear_depth: Quantity,
    pub slit_options: Vec<[Quantity; 2]>,
    #[serde(default)]
    pub custom_slits: bool,
    pub binning_options: Vec<[u32; 2]>,
    #[serde(default)]
    pub grating_options: Vec<String>,
    #[serde(default)]
    pub grism_options: Vec<String>,
    #[serde(default)]
    pub filter_options: Vec<String>,
    #[serde(default)]
    pub dichroic_options: Vec<String>,
    pub defaults: ModeDefaults,
}

/// Instrument configuration axes that select a throughput curve, besides `mode`.
pub const OPTION_AXES: [&str; 4] = ["grating", "grism", "filter", "dichroic"];

impl ModeSettings {
    pub fn options(&self, axis: &str) -> &[String] {
        match axis {
            "grating" => &self.grating_options,
            "grism" => &self.grism_options,
            "filter" => &self.filter_options,
            "dichroic" => &self.dichroic_options,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentSettings {
    /// Display name
    pub name: String,
    pub directory: String,
    #[serde(default = "default_nm")]
    pub wavelength_unit: String,
    /// Source brightness reference band selected along with this instrument
    pub wavelength_band: String,
    pub default_mode: String,
    pub modes: BTreeMap<String, ModeSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Blackbody,
    PowerLaw,
    EmissionLine,
    Flat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceTypeSettings {
    pub name: String,
    pub generator: Option<GeneratorKind>,
    pub filename: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Quantity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefaults {
    #[serde(rename = "type")]
    pub source_type: String,
    pub brightness: Quantity,
    pub redshift: f64,
    pub wavelength_band: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub directory: String,
    pub vega_filename: String,
    pub wavelength_bands: BTreeMap<String, Quantity>,
    pub defaults: SourceDefaults,
    pub types: BTreeMap<String, SourceTypeSettings>,
}

/// The full configuration, rooted at the directory holding `settings.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub root: PathBuf,
    pub calculator: CalculatorSettings,
    pub atmosphere: AtmosphereSettings,
    /// Selectable instruments by key
    pub instruments: BTreeMap<String, InstrumentSettings>,
    pub source: SourceSettings,
}

/// `dithers · repeats · coadds`, or `None` if the product overflows.
pub(crate) fn subexposure_count(dithers: u32, repeats: u32, coadds: u32) -> Option<u32> {
    dithers.checked_mul(repeats)?.checked_mul(coadds)
}

/// Numeric value of `quantity` in `unit`.
///
/// A bare number is taken to already be in `unit`.
pub(crate) fn value_in(field: &str, quantity: &Quantity, unit: &str) -> Result<f64, ConfigError> {
    if quantity.unit.is_dimensionless() {
        return Ok(quantity.value);
    }
    quantity.value_in(unit).map_err(|source| ConfigError::Unit {
        field: field.to_string(),
        source,
    })
}

/// Like [`value_in`], but the value must be strictly positive.
pub(crate) fn positive_in(field: &str, quantity: &Quantity, unit: &str) -> Result<f64, ConfigError> {
    let value = value_in(field, quantity, unit)?;
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::invalid(field, format!("{quantity} must be positive")))
    }
}

pub(crate) fn parse_unit(field: &str, text: &str) -> Result<Unit, ConfigError> {
    Unit::parse(text).map_err(|source| ConfigError::Unit {
        field: field.to_string(),
        source,
    })
}

fn check_increasing(field: &str, values: &[f64]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::invalid(field, "index is empty"));
    }
    if !is_strictly_increasing(values) {
        return Err(ConfigError::invalid(field, "index must be strictly increasing"));
    }
    Ok(())
}

fn check_within(field: &str, value: f64, index: &[f64]) -> Result<(), ConfigError> {
    let (min, max) = (index[0], index[index.len() - 1]);
    if !(min..=max).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("default {value} lies outside [{min}, {max}]"),
        ));
    }
    Ok(())
}

fn check_option(field: &str, value: Option<&str>, options: &[String]) -> Result<(), ConfigError> {
    match (value, options.is_empty()) {
        (None, true) => Ok(()),
        (Some(value), false) if options.iter().any(|o| o == value) => Ok(()),
        (Some(value), false) => Err(ConfigError::invalid(
            field,
            format!("default '{value}' is not among {options:?}"),
        )),
        (None, false) => Err(ConfigError::invalid(field, "a default must be declared")),
        (Some(value), true) => Err(ConfigError::invalid(
            field,
            format!("default '{value}' given but no options are declared"),
        )),
    }
}

impl AtmosphereSettings {
    /// Water-vapor index in millimetres.
    pub fn water_vapor_mm(&self) -> Result<Vec<f64>, ConfigError> {
        self.water_vapor_index
            .iter()
            .map(|q| value_in("atmosphere.water_vapor_index", q, "mm"))
            .collect()
    }

    /// `(start, stop, step)` of the wavelength axis in nanometers.
    pub fn wavelength_axis_nm(&self) -> Result<(f64, f64, f64), ConfigError> {
        let field = "atmosphere.wavelength_index";
        let [start, stop, step] = self.wavelength_index.as_slice() else {
            return Err(ConfigError::invalid(field, "expected [start, stop, step]"));
        };
        let unit = &self.wavelength_unit;
        let to_nm = |q: &Quantity| -> Result<f64, ConfigError> {
            let value = value_in(field, q, unit)?;
            Quantity::new(value, parse_unit(field, unit)?)
                .value_in("nm")
                .map_err(|source| ConfigError::Unit {
                    field: field.to_string(),
                    source,
                })
        };
        let (start, stop, step) = (to_nm(start)?, to_nm(stop)?, to_nm(step)?);
        if step <= 0.0 || stop <= start {
            return Err(ConfigError::invalid(
                field,
                format!("[{start}, {stop}, {step}] nm is not an increasing range"),
            ));
        }
        Ok((start, stop, step))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_increasing("atmosphere.airmass_index", &self.airmass_index)?;
        let water_vapor = self.water_vapor_mm()?;
        check_increasing("atmosphere.water_vapor_index", &water_vapor)?;
        self.wavelength_axis_nm()?;
        parse_unit("atmosphere.emission_unit", &self.emission_unit)?;

        let airmass = value_in("atmosphere.defaults.airmass", &self.defaults.airmass, "")?;
        check_within("atmosphere.defaults.airmass", airmass, &self.airmass_index)?;
        let vapor = value_in("atmosphere.defaults.water_vapor", &self.defaults.water_vapor, "mm")?;
        check_within("atmosphere.defaults.water_vapor", vapor, &water_vapor)?;
        positive_in("atmosphere.defaults.seeing", &self.defaults.seeing, "arcsec")?;
        Ok(())
    }
}

impl ModeSettings {
    fn validate(&self, prefix: &str, mode: &str) -> Result<(), ConfigError> {
        let field = |name: &str| format!("{prefix}.modes.{mode}.{name}");
        if !(self.spectral_resolution > 0.0) {
            return Err(ConfigError::invalid(field("spectral_resolution"), "must be positive"));
        }
        positive_in(&field("pixel_size"), &self.pixel_size, "arcsec")?;
        value_in(&field("dark_current"), &self.dark_current, "electron / s")?;
        value_in(&field("read_noise"), &self.read_noise, "electron")?;
        positive_in(&field("gain"), &self.gain, "electron / adu")?;
        positive_in(&field("nonlinear_depth"), &self.nonlinear_depth, "adu")?;

        let slit = |pair: &[Quantity; 2]| -> Result<[f64; 2], ConfigError> {
            Ok([
                positive_in(&field("slit"), &pair[0], "arcsec")?,
                positive_in(&field("slit"), &pair[1], "arcsec")?,
            ])
        };
        let presets = self
            .slit_options
            .iter()
            .map(slit)
            .collect::<Result<Vec<_>, _>>()?;
        let default_slit = slit(&self.defaults.slit)?;
        if !self.custom_slits && !presets.contains(&default_slit) {
            return Err(ConfigError::invalid(
                field("defaults.slit"),
                "default slit is not a declared preset",
            ));
        }

        if self.binning_options.iter().flatten().any(|&b| b == 0) {
            return Err(ConfigError::invalid(field("binning_options"), "binning must be positive"));
        }
        if !self.binning_options.contains(&self.defaults.binning) {
            return Err(ConfigError::invalid(
                field("defaults.binning"),
                format!("{:?} is not a declared option", self.defaults.binning),
            ));
        }

        for axis in OPTION_AXES {
            check_option(
                &field(&format!("defaults.{axis}")),
                self.defaults.option(axis),
                self.options(axis),
            )?;
        }
        Ok(())
    }
}

impl Config {
    /// Read and validate `settings.json` in `dir`.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(SETTINGS_FILENAME);
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(dir, &text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a settings document whose data directories live under `root`.
    pub fn from_json(root: &Path, text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(text)?;
        config.root = root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn atmosphere_dir(&self) -> PathBuf {
        self.root.join(&self.atmosphere.directory)
    }

    pub fn instrument_dir(&self, settings: &InstrumentSettings) -> PathBuf {
        self.root.join(&settings.directory)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.source.directory)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let calc = &self.calculator;
        positive_in("calculator.telescope_area", &calc.telescope_area, "cm2")?;
        if calc.wavelength_count < 2 {
            return Err(ConfigError::invalid(
                "calculator.wavelength_count",
                "at least two wavelengths are needed",
            ));
        }
        let defaults = &calc.defaults;
        if defaults.exposure.is_empty() {
            return Err(ConfigError::invalid("calculator.defaults.exposure", "list is empty"));
        }
        for exposure in &defaults.exposure {
            if value_in("calculator.defaults.exposure", exposure, "s")? < 0.0 {
                return Err(ConfigError::invalid(
                    "calculator.defaults.exposure",
                    "exposure times must not be negative",
                ));
            }
        }
        if defaults.signal_noise_ratio.is_empty()
            || defaults.signal_noise_ratio.iter().any(|&s| !(s > 0.0))
        {
            return Err(ConfigError::invalid(
                "calculator.defaults.signal_noise_ratio",
                "expected a non-empty list of positive values",
            ));
        }
        for (name, value) in [
            ("dithers", defaults.dithers),
            ("repeats", defaults.repeats),
            ("coadds", defaults.coadds),
            ("reads", defaults.reads),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(
                    format!("calculator.defaults.{name}"),
                    "must be at least 1",
                ));
            }
        }
        if subexposure_count(defaults.dithers, defaults.repeats, defaults.coadds).is_none() {
            return Err(ConfigError::invalid(
                "calculator.defaults",
                "dithers x repeats x coadds overflows",
            ));
        }

        self.atmosphere.validate()?;

        if !self.instruments.contains_key(&defaults.instrument) {
            return Err(ConfigError::invalid(
                "calculator.defaults.instrument",
                format!("'{}' is not a declared instrument", defaults.instrument),
            ));
        }
        for (key, instrument) in &self.instruments {
            let prefix = format!("instruments.{key}");
            if !instrument.modes.contains_key(&instrument.default_mode) {
                return Err(ConfigError::invalid(
                    format!("{prefix}.default_mode"),
                    format!("'{}' is not a declared mode", instrument.default_mode),
                ));
            }
            for (name, mode) in &instrument.modes {
                mode.validate(&prefix, name)?;
            }
            if !self.source.wavelength_bands.contains_key(&instrument.wavelength_band) {
                return Err(ConfigError::invalid(
                    format!("{prefix}.wavelength_band"),
                    format!("'{}' is not a declared band", instrument.wavelength_band),
                ));
            }
        }

        let source = &self.source;
        for (band, wavelength) in &source.wavelength_bands {
            positive_in(&format!("source.wavelength_bands.{band}"), wavelength, "nm")?;
        }
        if !source.wavelength_bands.contains_key(&source.defaults.wavelength_band) {
            return Err(ConfigError::invalid(
                "source.defaults.wavelength_band",
                format!("'{}' is not a declared band", source.defaults.wavelength_band),
            ));
        }
        if !source.types.contains_key(&source.defaults.source_type) {
            return Err(ConfigError::invalid(
                "source.defaults.type",
                format!("'{}' is not a declared type", source.defaults.source_type),
            ));
        }
        if !(source.defaults.redshift > -1.0) {
            return Err(ConfigError::invalid("source.defaults.redshift", "must be > -1"));
        }
        for (key, kind) in &source.types {
            if kind.generator.is_some() == kind.filename.is_some() {
                return Err(ConfigError::invalid(
                    format!("source.types.{key}"),
                    "exactly one of generator or filename is required",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use serde_json::Value;
    use test_helpers::{fixture, Fixture};

    use super::*;

    fn load(settings: &Value) -> Result<Config, ConfigError> {
        Config::from_json(Path::new("/tmp"), &settings.to_string())
    }

    #[test]
    fn test_load_fixture() {
        let fixture = Fixture::new();
        let config = Config::load(fixture.path()).unwrap();
        assert_eq!(config.root, fixture.path());
        assert_eq!(config.calculator.defaults.target, Target::SignalNoiseRatio);
        assert_eq!(config.instruments.len(), 2);
        assert_eq!(config.instruments["nir"].modes.len(), 2);
        assert_eq!(config.instrument_dir(&config.instruments["optical"]), fixture.path().join("optical"));
        assert_eq!(config.atmosphere.water_vapor_mm().unwrap(), vec![1.0, 3.0, 5.0]);
        let (start, stop, step) = config.atmosphere.wavelength_axis_nm().unwrap();
        assert_relative_eq!(start, 900.0);
        assert_relative_eq!(stop, 2500.0);
        assert_relative_eq!(step, 10.0);
    }

    #[test]
    fn test_missing_settings_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_rejects_unsorted_index() {
        let mut settings = fixture::default_settings();
        settings["atmosphere"]["airmass_index"] = serde_json::json!([1.0, 2.0, 1.5]);
        assert!(matches!(load(&settings), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_default_outside_index() {
        let mut settings = fixture::default_settings();
        settings["atmosphere"]["defaults"]["airmass"] = 3.0.into();
        let err = load(&settings).unwrap_err();
        assert!(err.to_string().contains("atmosphere.defaults.airmass"));
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let mut settings = fixture::default_settings();
        settings["calculator"]["telescope_area"] = "76 m".into();
        assert!(matches!(load(&settings), Err(ConfigError::Unit { .. })));
    }

    #[test]
    fn test_rejects_undeclared_default_option() {
        let mut settings = fixture::default_settings();
        settings["instruments"]["nir"]["modes"]["spectroscopy"]["defaults"]["grating"] = "MEDIUM".into();
        let err = load(&settings).unwrap_err();
        assert!(err.to_string().contains("instruments.nir.modes.spectroscopy"));
    }

    #[test]
    fn test_rejects_unknown_instrument_references() {
        let mut settings = fixture::default_settings();
        settings["calculator"]["defaults"]["instrument"] = "uv".into();
        let err = load(&settings).unwrap_err();
        assert!(err.to_string().contains("calculator.defaults.instrument"));

        let mut settings = fixture::default_settings();
        settings["instruments"]["optical"]["wavelength_band"] = "L".into();
        let err = load(&settings).unwrap_err();
        assert!(err.to_string().contains("instruments.optical.wavelength_band"));
    }

    #[test]
    fn test_rejects_overflowing_subexposures() {
        let mut settings = fixture::default_settings();
        settings["calculator"]["defaults"]["dithers"] = 100000.into();
        settings["calculator"]["defaults"]["repeats"] = 100000.into();
        let err = load(&settings).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_rejects_source_type_with_both_forms() {
        let mut settings = fixture::default_settings();
        settings["source"]["types"]["flat"]["filename"] = "qso.txt".into();
        let err = load(&settings).unwrap_err();
        assert!(err.to_string().contains("source.types.flat"));
    }

    #[test]
    fn test_rejects_bad_quantity_string() {
        let mut settings = fixture::default_settings();
        settings["atmosphere"]["defaults"]["seeing"] = "0.8 furlongs".into();
        assert!(matches!(load(&settings), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_target_keys() {
        assert_eq!(Target::from_key("exposure"), Some(Target::Exposure));
        assert_eq!(Target::SignalNoiseRatio.to_string(), "signal_noise_ratio");
        assert_eq!(Target::from_key("snr"), None);
    }
}
