//! Instrument throughput and detector model.
//!
//! Several instruments may be configured; one is active at a time. Each
//! observing mode carries its own detector parameters and slit/binning
//! choices. Throughput curves are tagged with the mode and the optical
//! elements (grating, grism, filter, dichroic) they were measured with; the
//! curve in use is the single one whose tags all match the current
//! selection.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use itertools::Itertools;
use log::info;
use shared::algo::Interpolator;
use shared::table::{self, Table};
use shared::units::Quantity;

use crate::config::{
    parse_unit, positive_in, value_in, Config, InstrumentSettings, ModeSettings, OPTION_AXES,
};
use crate::error::{ConfigError, InstrumentError, ParameterError};
use crate::parameters::{ParamValue, ParameterInfo, ParameterOption};
use crate::record_warning;

/// Parameters owned by the instrument.
pub const FIELDS: [&str; 8] = [
    "name", "mode", "grating", "grism", "filter", "dichroic", "slit", "binning",
];

/// Relative tolerance when comparing a requested slit to a preset.
const SLIT_TOLERANCE: f64 = 1e-9;

/// Measured efficiency of one optical configuration.
#[derive(Debug, Clone)]
pub struct ThroughputCurve {
    source: String,
    tags: BTreeMap<String, String>,
    curve: Interpolator,
}

impl ThroughputCurve {
    /// Build a curve from a tagged table.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the table has no `mode` tag
    /// - wavelengths are not strictly ascending
    /// - any efficiency value is outside the range [0.0, 1.0]
    pub fn from_table(table: &Table, source: &str, wavelength_unit: &str) -> Result<Self, ConfigError> {
        let table_error = |e| ConfigError::Table {
            path: source.to_string(),
            source: e,
        };
        let shape_error = |reason: String| ConfigError::DataShape {
            path: source.to_string(),
            reason,
        };

        let mut tags = BTreeMap::new();
        for key in std::iter::once("mode").chain(OPTION_AXES) {
            if let Some(value) = table.meta_value(&[key]) {
                tags.insert(key.to_string(), value.to_string());
            }
        }
        if !tags.contains_key("mode") {
            return Err(shape_error("missing mode tag".to_string()));
        }

        let wavelength = table
            .column(&["wavelength", "wave", "lambda"])
            .or_else(|_| table.column_at(0))
            .map_err(table_error)?;
        let unit = wavelength.unit.as_deref().unwrap_or(wavelength_unit);
        let to_nm = Quantity::new(1.0, parse_unit(source, unit)?)
            .value_in("nm")
            .map_err(|e| ConfigError::Unit {
                field: source.to_string(),
                source: e,
            })?;
        let efficiency = table
            .column(&["throughput", "efficiency", "transmission"])
            .or_else(|_| table.column_at(1))
            .map_err(table_error)?;

        if let Some(bad) = efficiency.values.iter().find(|e| !(0.0..=1.0).contains(*e)) {
            return Err(shape_error(format!(
                "efficiency {bad} is outside the range [0.0, 1.0]"
            )));
        }
        let wavelengths = wavelength.values.iter().map(|w| w * to_nm).collect();
        let curve = Interpolator::new(wavelengths, efficiency.values.clone())
            .map_err(|e| shape_error(e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            tags,
            curve,
        })
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Every declared tag equals the selected value, ignoring case.
    pub fn matches(&self, selection: &BTreeMap<String, String>) -> bool {
        self.tags.iter().all(|(key, value)| {
            selection
                .get(key)
                .is_some_and(|selected| selected.eq_ignore_ascii_case(value))
        })
    }

    pub fn bounds(&self) -> (f64, f64) {
        self.curve.bounds()
    }

    pub fn at(&self, wavelength_nm: f64) -> Option<f64> {
        self.curve.at(wavelength_nm).ok()
    }
}

/// Detector and geometry parameters of one mode, in working units.
#[derive(Debug, Clone, PartialEq)]
struct ModeParameters {
    spectral_resolution: f64,
    pixel_size_arcsec: f64,
    dark_current: Quantity,
    read_noise: Quantity,
    gain: f64,
    nonlinear_depth: f64,
    slit_presets: Vec<[f64; 2]>,
    custom_slits: bool,
    binning_options: Vec<[u32; 2]>,
    options: BTreeMap<String, Vec<String>>,
    default_slit: [f64; 2],
    default_binning: [u32; 2],
    default_options: BTreeMap<String, String>,
}

impl ModeParameters {
    fn resolve(prefix: &str, mode: &str, settings: &ModeSettings) -> Result<Self, ConfigError> {
        let field = |name: &str| format!("{prefix}.modes.{mode}.{name}");
        let slit = |pair: &[Quantity; 2]| -> Result<[f64; 2], ConfigError> {
            Ok([
                positive_in(&field("slit"), &pair[0], "arcsec")?,
                positive_in(&field("slit"), &pair[1], "arcsec")?,
            ])
        };
        let electron_rate = parse_unit(&field("dark_current"), "electron / s")?;
        let electron = parse_unit(&field("read_noise"), "electron")?;

        let mut options = BTreeMap::new();
        let mut default_options = BTreeMap::new();
        for axis in OPTION_AXES {
            let declared = settings.options(axis);
            if declared.is_empty() {
                continue;
            }
            options.insert(axis.to_string(), declared.to_vec());
            if let Some(default) = settings.defaults.option(axis) {
                default_options.insert(axis.to_string(), default.to_string());
            }
        }

        Ok(Self {
            spectral_resolution: settings.spectral_resolution,
            pixel_size_arcsec: positive_in(&field("pixel_size"), &settings.pixel_size, "arcsec")?,
            dark_current: Quantity::new(
                value_in(&field("dark_current"), &settings.dark_current, "electron / s")?,
                electron_rate,
            ),
            read_noise: Quantity::new(
                value_in(&field("read_noise"), &settings.read_noise, "electron")?,
                electron,
            ),
            gain: positive_in(&field("gain"), &settings.gain, "electron / adu")?,
            nonlinear_depth: positive_in(&field("nonlinear_depth"), &settings.nonlinear_depth, "adu")?,
            slit_presets: settings
                .slit_options
                .iter()
                .map(slit)
                .collect::<Result<Vec<_>, _>>()?,
            custom_slits: settings.custom_slits,
            binning_options: settings.binning_options.clone(),
            options,
            default_slit: slit(&settings.defaults.slit)?,
            default_binning: settings.defaults.binning,
            default_options,
        })
    }
}

/// Everything loaded for one instrument.
#[derive(Debug)]
struct InstrumentData {
    key: String,
    name: String,
    default_mode: String,
    wavelength_band: String,
    modes: BTreeMap<String, ModeParameters>,
    curves: Vec<ThroughputCurve>,
}

impl InstrumentData {
    fn load(key: &str, settings: &InstrumentSettings, directory: &Path) -> Result<Self, ConfigError> {
        let prefix = format!("instruments.{key}");
        let modes = settings
            .modes
            .iter()
            .map(|(name, mode)| Ok((name.clone(), ModeParameters::resolve(&prefix, name, mode)?)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let curves = load_curves(directory, &settings.wavelength_unit)?;
        info!(
            "Loaded {} throughput curves for {} from {}",
            curves.len(),
            settings.name,
            directory.display()
        );
        Ok(Self {
            key: key.to_string(),
            name: settings.name.clone(),
            default_mode: settings.default_mode.clone(),
            wavelength_band: settings.wavelength_band.clone(),
            modes,
            curves,
        })
    }
}

fn load_curves(directory: &Path, wavelength_unit: &str) -> Result<Vec<ThroughputCurve>, ConfigError> {
    let mut paths = std::fs::read_dir(directory)
        .map_err(|source| ConfigError::Io {
            path: directory.display().to_string(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    paths.sort();

    let curves = paths
        .iter()
        .map(|path| {
            let display = path.display().to_string();
            let table = table::read(path).map_err(|source| ConfigError::Table {
                path: display.clone(),
                source,
            })?;
            ThroughputCurve::from_table(&table, &display, wavelength_unit)
        })
        .collect::<Result<Vec<_>, _>>()?;
    if curves.is_empty() {
        return Err(ConfigError::NoFiles {
            kind: "throughput",
            prefix: String::new(),
            directory: directory.display().to_string(),
        });
    }
    Ok(curves)
}

/// The active instrument and its selected configuration.
///
/// Loaded curves and mode tables are shared between clones, so a clone
/// copies only the selection.
#[derive(Debug, Clone)]
pub struct InstrumentModel {
    instruments: BTreeMap<String, Arc<InstrumentData>>,
    default_instrument: String,
    active: Arc<InstrumentData>,
    mode: String,
    selections: BTreeMap<String, String>,
    slit: [f64; 2],
    binning: [u32; 2],
}

fn format_slit(slit: &[f64; 2]) -> String {
    format!("{}x{}", slit[0], slit[1])
}

fn format_binning(binning: &[u32; 2]) -> String {
    format!("{}x{}", binning[0], binning[1])
}

fn same_slit(a: &[f64; 2], b: &[f64; 2]) -> bool {
    a.iter()
        .zip(b)
        .all(|(x, y)| (x - y).abs() <= SLIT_TOLERANCE * x.abs().max(y.abs()))
}

impl InstrumentModel {
    /// Load the throughput curves of every configured instrument.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let instruments = config
            .instruments
            .iter()
            .map(|(key, settings)| {
                let data = InstrumentData::load(key, settings, &config.instrument_dir(settings))?;
                Ok((key.clone(), Arc::new(data)))
            })
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let default_instrument = config.calculator.defaults.instrument.clone();
        let active = instruments
            .get(&default_instrument)
            .cloned()
            .ok_or_else(|| {
                ConfigError::invalid(
                    "calculator.defaults.instrument",
                    format!("'{default_instrument}' is not a declared instrument"),
                )
            })?;

        let mut model = Self {
            instruments,
            default_instrument,
            active,
            mode: String::new(),
            selections: BTreeMap::new(),
            slit: [0.0; 2],
            binning: [1, 1],
        };
        let mode = model.active.default_mode.clone();
        model.apply_mode(&mode);
        Ok(model)
    }

    /// Make `key` the active instrument in its default mode.
    fn switch_instrument(&mut self, key: &str) {
        let Some(data) = self.instruments.get(key) else {
            return;
        };
        self.active = Arc::clone(data);
        let mode = self.active.default_mode.clone();
        self.apply_mode(&mode);
    }

    /// Switch to `mode` and restore its declared defaults.
    fn apply_mode(&mut self, mode: &str) {
        let Some(params) = self.active.modes.get(mode) else {
            return;
        };
        self.slit = params.default_slit;
        self.binning = params.default_binning;
        self.selections = params.default_options.clone();
        self.mode = mode.to_string();
    }

    fn params(&self) -> &ModeParameters {
        // The active mode is always one of the active instrument's modes
        &self.active.modes[&self.mode]
    }

    /// The tag values curves are matched against.
    fn selection(&self) -> BTreeMap<String, String> {
        let mut selection = self.selections.clone();
        selection.insert("mode".to_string(), self.mode.clone());
        selection
    }

    fn describe_selection(&self) -> String {
        self.selection()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .join(", ")
    }

    /// The single curve matching the current selection.
    pub fn curve(&self) -> Result<&ThroughputCurve, InstrumentError> {
        let selection = self.selection();
        let matching = self
            .active
            .curves
            .iter()
            .filter(|curve| curve.matches(&selection))
            .collect::<Vec<_>>();
        match matching.as_slice() {
            [curve] => Ok(*curve),
            [] => Err(InstrumentError::NoMatchingCurve {
                selection: self.describe_selection(),
            }),
            many => Err(InstrumentError::AmbiguousCurve {
                selection: self.describe_selection(),
                count: many.len(),
            }),
        }
    }

    /// Efficiency at each wavelength (nm). Wavelengths off the curve give NaN.
    pub fn throughput(
        &self,
        wavelengths: &[f64],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<f64>, InstrumentError> {
        let curve = self.curve()?;
        let values = wavelengths
            .iter()
            .map(|&nm| curve.at(nm).unwrap_or(f64::NAN))
            .collect::<Vec<_>>();
        let undefined = values.iter().filter(|v| v.is_nan()).count();
        if undefined > 0 {
            let (lo, hi) = curve.bounds();
            record_warning(
                warnings,
                format!(
                    "throughput of {} is undefined at {undefined} wavelength(s) outside [{lo}, {hi}] nm",
                    curve.source
                ),
            );
        }
        Ok(values)
    }

    /// Wavelength coverage of the selected curve, in nm.
    pub fn wavelength_range(&self) -> Result<(f64, f64), InstrumentError> {
        Ok(self.curve()?.bounds())
    }

    /// Display name of the active instrument.
    pub fn name(&self) -> &str {
        &self.active.name
    }

    /// Configuration key of the active instrument.
    pub fn key(&self) -> &str {
        &self.active.key
    }

    /// Reference band a source should use with the active instrument.
    pub fn wavelength_band(&self) -> &str {
        &self.active.wavelength_band
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Selected value of an option axis such as `grating`.
    pub fn option(&self, axis: &str) -> Option<&str> {
        self.selections.get(axis).map(String::as_str)
    }

    /// `[width, length]` in arcsec.
    pub fn slit(&self) -> [f64; 2] {
        self.slit
    }

    /// `[spectral, spatial]` binning factors.
    pub fn binning(&self) -> [u32; 2] {
        self.binning
    }

    pub fn spectral_resolution(&self) -> f64 {
        self.params().spectral_resolution
    }

    /// Angular size of one pixel side, in arcsec.
    pub fn pixel_size(&self) -> f64 {
        self.params().pixel_size_arcsec
    }

    /// Dark current in electron / s.
    pub fn dark_current(&self) -> &Quantity {
        &self.params().dark_current
    }

    /// Read noise in electron.
    pub fn read_noise(&self) -> &Quantity {
        &self.params().read_noise
    }

    /// Gain in electron / adu.
    pub fn gain(&self) -> f64 {
        self.params().gain
    }

    /// Nonlinearity limit of one pixel, in adu.
    pub fn nonlinear_depth(&self) -> f64 {
        self.params().nonlinear_depth
    }

    pub fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "name" => {
                let requested = value
                    .as_text()
                    .ok_or_else(|| ParameterError::invalid(name, "expected an instrument name"))?;
                let key = self
                    .instruments
                    .keys()
                    .find(|k| k.eq_ignore_ascii_case(requested))
                    .cloned()
                    .ok_or_else(|| ParameterError::InvalidOption {
                        name: name.to_string(),
                        value: requested.to_string(),
                        options: self.instruments.keys().cloned().collect(),
                    })?;
                self.switch_instrument(&key);
            }
            "mode" => {
                let requested = value
                    .as_text()
                    .ok_or_else(|| ParameterError::invalid(name, "expected a mode name"))?;
                let mode = self
                    .active
                    .modes
                    .keys()
                    .find(|m| m.eq_ignore_ascii_case(requested))
                    .cloned()
                    .ok_or_else(|| ParameterError::InvalidOption {
                        name: name.to_string(),
                        value: requested.to_string(),
                        options: self.active.modes.keys().cloned().collect(),
                    })?;
                self.apply_mode(&mode);
            }
            "slit" => self.slit = self.parse_slit(value)?,
            "binning" => self.binning = self.parse_binning(value)?,
            axis if OPTION_AXES.contains(&axis) => {
                let declared = self.params().options.get(axis).cloned().unwrap_or_default();
                if declared.is_empty() {
                    return Err(ParameterError::invalid(
                        name,
                        format!("mode {} has no {axis} options", self.mode),
                    ));
                }
                let requested = value
                    .as_text()
                    .map(str::to_string)
                    .or_else(|| match value {
                        ParamValue::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .ok_or_else(|| ParameterError::invalid(name, "expected an option name"))?;
                let option = declared
                    .iter()
                    .find(|o| o.eq_ignore_ascii_case(&requested))
                    .cloned()
                    .ok_or_else(|| ParameterError::InvalidOption {
                        name: name.to_string(),
                        value: requested.clone(),
                        options: declared.clone(),
                    })?;
                self.selections.insert(axis.to_string(), option);
            }
            _ => return Err(ParameterError::UnknownParameter(format!("instrument.{name}"))),
        }
        Ok(())
    }

    fn parse_slit(&self, value: &ParamValue) -> Result<[f64; 2], ParameterError> {
        let items = value.items();
        let [width, length] = items.as_slice() else {
            return Err(ParameterError::invalid("slit", "expected width and length"));
        };
        let slit = [
            width.to_f64_in("slit", "arcsec")?,
            length.to_f64_in("slit", "arcsec")?,
        ];
        let params = self.params();
        if params.slit_presets.iter().any(|preset| same_slit(preset, &slit)) {
            return Ok(slit);
        }
        if !params.custom_slits {
            return Err(ParameterError::InvalidOption {
                name: "slit".to_string(),
                value: format_slit(&slit),
                options: params.slit_presets.iter().map(format_slit).collect(),
            });
        }
        if slit.iter().any(|&s| s <= 0.0) {
            return Err(ParameterError::invalid("slit", "width and length must be positive"));
        }
        Ok(slit)
    }

    fn parse_binning(&self, value: &ParamValue) -> Result<[u32; 2], ParameterError> {
        let items = value.items();
        let [spectral, spatial] = items.as_slice() else {
            return Err(ParameterError::invalid("binning", "expected spectral and spatial factors"));
        };
        let binning = [spectral.to_count("binning")?, spatial.to_count("binning")?];
        let options = &self.params().binning_options;
        if !options.contains(&binning) {
            return Err(ParameterError::InvalidOption {
                name: "binning".to_string(),
                value: format_binning(&binning),
                options: options.iter().map(format_binning).collect(),
            });
        }
        Ok(binning)
    }

    /// Restore the default instrument in its default mode.
    pub fn reset_parameters(&mut self) {
        let key = self.default_instrument.clone();
        self.switch_instrument(&key);
    }

    pub fn parameters(&self) -> BTreeMap<String, ParameterInfo> {
        let params = self.params();
        let mut info = BTreeMap::new();
        info.insert(
            "name".to_string(),
            ParameterInfo::new(self.active.key.clone()).with_options(
                self.instruments
                    .values()
                    .map(|data| ParameterOption::new(data.key.clone(), data.name.clone())),
            ),
        );
        info.insert(
            "mode".to_string(),
            ParameterInfo::new(self.mode.clone())
                .with_options(self.active.modes.keys().map(|m| ParameterOption::plain(m))),
        );
        for (axis, options) in &params.options {
            info.insert(
                axis.clone(),
                ParameterInfo::new(self.option(axis).unwrap_or_default())
                    .with_options(options.iter().map(|o| ParameterOption::plain(o))),
            );
        }

        let mut slit_options = params
            .slit_presets
            .iter()
            .map(|preset| ParameterOption::new(preset.to_vec(), format_slit(preset)))
            .collect::<Vec<_>>();
        if params.custom_slits {
            slit_options.push(ParameterOption::new("custom", "Custom"));
        }
        info.insert(
            "slit".to_string(),
            ParameterInfo::new(self.slit.to_vec())
                .with_unit("arcsec")
                .with_options(slit_options),
        );
        info.insert(
            "binning".to_string(),
            ParameterInfo::new(self.binning.to_vec()).with_options(
                params
                    .binning_options
                    .iter()
                    .map(|b| ParameterOption::new(b.to_vec(), format_binning(b))),
            ),
        );
        info
    }
}
