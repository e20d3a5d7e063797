//! The calculator: parameter routing, the photon-rate pipeline and the
//! signal-to-noise / exposure-time solve.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use shared::algo::{is_strictly_increasing, linspace};

use crate::atmosphere::{self, AtmosphereModel};
use crate::config::{positive_in, subexposure_count, value_in, Config, Target};
use crate::error::{CalculatorError, ConfigError, ParameterError};
use crate::instrument::{self, InstrumentModel};
use crate::parameters::{ParamValue, ParameterInfo, ParameterOption};
use crate::record_warning;
use crate::source::SourceModel;

/// Parameters owned by the calculator itself rather than a sub-model.
pub const FIELDS: [&str; 8] = [
    "target",
    "wavelengths",
    "exposure",
    "signal_noise_ratio",
    "dithers",
    "reads",
    "repeats",
    "coadds",
];

/// Keys applied ahead of the rest of a batch, in this order, since they
/// change which other names are valid.
const BATCH_FIRST: [&str; 5] = [
    "instrument",
    "instrument.name",
    "instrument.mode",
    "source",
    "source.type",
];

/// Light loss of a circular seeing disk centred on a rectangular slit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlitGeometry {
    /// Slit area in arcsec²
    pub slit_area: f64,
    /// Area of the seeing disk that falls inside the slit, in arcsec²
    pub source_area: f64,
    /// Fraction of the source light passing the slit
    pub source_fraction: f64,
    /// Slit area in detector pixels
    pub slit_area_pixels: f64,
    /// Area of one pixel in arcsec²
    pub pixel_area: f64,
}

impl SlitGeometry {
    /// # Arguments
    ///
    /// * `slit` - `[width, length]` in arcsec
    /// * `seeing` - Seeing disk diameter in arcsec
    /// * `pixel_size` - Angular size of one pixel side in arcsec
    pub fn new(slit: [f64; 2], seeing: f64, pixel_size: f64) -> Self {
        let [width, length] = slit;
        let disk_area = PI * (seeing / 2.0).powi(2);
        let occluded_area = if seeing > width {
            let s2 = seeing * seeing;
            (s2 * (width / seeing).acos() - width * (s2 - width * width).sqrt()) / 2.0
        } else {
            0.0
        };
        let source_area = disk_area - occluded_area;
        let pixel_area = pixel_size * pixel_size;
        Self {
            slit_area: width * length,
            source_area,
            source_fraction: source_area / disk_area,
            slit_area_pixels: width * length / pixel_area,
            pixel_area,
        }
    }
}

/// Electron rates over the wavelength grid for the current state.
#[derive(Debug, Clone)]
struct Rates {
    source: Vec<f64>,
    background: Vec<f64>,
    /// Dark current over the slit, electron / s
    dark: f64,
    /// Read noise variance over the slit for one subexposure, electron²
    read: f64,
}

impl Rates {
    fn noise(&self, i: usize) -> f64 {
        self.source[i] + self.background[i] + self.dark
    }

    fn signal_noise_ratio(&self, i: usize, exposure: f64, subexposures: f64) -> f64 {
        let signal = self.source[i] * exposure * subexposures;
        signal / (self.noise(i) * exposure * subexposures + self.read * subexposures).sqrt()
    }

    /// Subexposure time reaching `snr` at grid point `i`.
    ///
    /// Solves `a·t² + b·t + c = 0` and keeps the first non-negative real root.
    fn exposure(&self, i: usize, snr: f64, subexposures: f64) -> Option<f64> {
        let snr2 = snr * snr;
        let a = self.source[i] * self.source[i];
        let b = -snr2 * self.noise(i) / subexposures;
        let c = -snr2 * self.read / subexposures;
        if !(a > 0.0) {
            return None;
        }
        let discriminant = b * b - 4.0 * a * c;
        if !(discriminant >= 0.0) {
            return None;
        }
        let root = discriminant.sqrt();
        [(-b + root) / (2.0 * a), (-b - root) / (2.0 * a)]
            .into_iter()
            .find(|t| *t >= 0.0)
    }
}

/// Snapshot of the last recalculation.
///
/// Per-candidate fields are `[candidate][wavelength]` matrices aligned with
/// `wavelengths`. Unsolvable points hold NaN, which serializes as `null`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    pub target: Target,
    /// nm
    pub wavelengths: Vec<f64>,
    /// Single subexposure time, s
    pub exposure: Vec<Vec<f64>>,
    pub signal_noise_ratio: Vec<Vec<f64>>,
    /// Total time over all subexposures, s
    pub integration_time: Vec<Vec<f64>>,
    pub source_count_adu: Vec<Vec<f64>>,
    pub background_count_adu: Vec<Vec<f64>>,
    pub dark_current_count_adu: Vec<Vec<f64>>,
    pub read_noise_count_adu: Vec<Vec<f64>>,
    /// photon / (s cm2 nm)
    pub source_flux: Vec<f64>,
    /// Throughput of the selected instrument configuration
    pub efficiency: Vec<f64>,
    pub warnings: Vec<String>,
}

impl Results {
    fn push_counts(
        &mut self,
        rates: &Rates,
        geometry: &SlitGeometry,
        exposure: &[f64],
        subexposures: f64,
        gain: f64,
    ) {
        let per_pixel = |rate: f64, area: f64, t: f64| rate * geometry.pixel_area / area * t * subexposures / gain;
        self.source_count_adu.push(
            exposure
                .iter()
                .zip(&rates.source)
                .map(|(&t, &rate)| per_pixel(rate, geometry.source_area, t))
                .collect(),
        );
        self.background_count_adu.push(
            exposure
                .iter()
                .zip(&rates.background)
                .map(|(&t, &rate)| per_pixel(rate, geometry.slit_area, t))
                .collect(),
        );
        let dark_per_pixel = rates.dark / geometry.slit_area_pixels;
        self.dark_current_count_adu.push(
            exposure
                .iter()
                .map(|&t| dark_per_pixel * t * subexposures / gain)
                .collect(),
        );
        let read = rates.read / geometry.slit_area_pixels * subexposures / gain;
        self.read_noise_count_adu.push(vec![read; exposure.len()]);
        self.integration_time
            .push(exposure.iter().map(|t| t * subexposures).collect());
    }
}

/// Exposure time calculator for one site and its configured instruments.
///
/// Every successful mutation recalculates [`Results`]. A failed mutation
/// leaves the calculator exactly as it was: mutations work on a snapshot
/// taken by `clone`, which shares the loaded grids, curves and results and
/// copies only the parameter state.
#[derive(Debug, Clone)]
pub struct Calculator {
    config: Arc<Config>,
    atmosphere: AtmosphereModel,
    instrument: InstrumentModel,
    source: SourceModel,
    telescope_area_cm2: f64,
    target: Target,
    wavelengths: Vec<f64>,
    exposure: Vec<f64>,
    signal_noise_ratio: Vec<f64>,
    dithers: u32,
    reads: u32,
    repeats: u32,
    coadds: u32,
    /// Warnings raised while applying parameters, moved into the next snapshot
    pending_warnings: Vec<String>,
    results: Arc<Results>,
}

impl Calculator {
    pub fn new(config: Config) -> Result<Self, CalculatorError> {
        let atmosphere = AtmosphereModel::new(&config)?;
        let instrument = InstrumentModel::new(&config)?;
        let source = SourceModel::new(&config)?;
        let telescope_area_cm2 = positive_in(
            "calculator.telescope_area",
            &config.calculator.telescope_area,
            "cm2",
        )?;
        let defaults = &config.calculator.defaults;

        let mut calculator = Self {
            telescope_area_cm2,
            target: defaults.target,
            wavelengths: Vec::new(),
            exposure: Self::default_exposure(&config)?,
            signal_noise_ratio: defaults.signal_noise_ratio.clone(),
            dithers: defaults.dithers,
            reads: defaults.reads,
            repeats: defaults.repeats,
            coadds: defaults.coadds,
            pending_warnings: Vec::new(),
            results: Arc::default(),
            atmosphere,
            instrument,
            source,
            config: Arc::new(config),
        };
        calculator.wavelengths = calculator.default_wavelengths()?;
        calculator.recalculate()?;
        info!(
            "Calculator ready: {} over {} wavelengths",
            calculator.instrument.name(),
            calculator.wavelengths.len()
        );
        Ok(calculator)
    }

    /// Load `settings.json` and the data files from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, CalculatorError> {
        Self::new(Config::load(dir)?)
    }

    fn default_exposure(config: &Config) -> Result<Vec<f64>, ConfigError> {
        config
            .calculator
            .defaults
            .exposure
            .iter()
            .map(|t| value_in("calculator.defaults.exposure", t, "s"))
            .collect()
    }

    /// Evenly spaced grid over the overlap of atmosphere and instrument coverage.
    fn default_wavelengths(&self) -> Result<Vec<f64>, CalculatorError> {
        let (atm_lo, atm_hi) = self.atmosphere.wavelength_range();
        let (inst_lo, inst_hi) = self.instrument.wavelength_range()?;
        let lo = atm_lo.max(inst_lo);
        let hi = atm_hi.min(inst_hi);
        if lo >= hi {
            return Err(ParameterError::invalid(
                "wavelengths",
                format!(
                    "instrument coverage [{inst_lo}, {inst_hi}] nm does not overlap the atmosphere grid [{atm_lo}, {atm_hi}] nm"
                ),
            )
            .into());
        }
        Ok(linspace(lo, hi, self.config.calculator.wavelength_count))
    }

    fn switch_target(&mut self, target: Target) {
        if target == self.target {
            return;
        }
        let defaults = &self.config.calculator.defaults;
        match target {
            Target::Exposure => self.signal_noise_ratio = defaults.signal_noise_ratio.clone(),
            // Defaults were validated when the configuration loaded
            Target::SignalNoiseRatio => {
                if let Ok(exposure) = Self::default_exposure(&self.config) {
                    self.exposure = exposure;
                }
            }
        }
        self.target = target;
    }

    /// Resolve aliases and bare sub-model names to a dotted name.
    fn route(&mut self, name: &str) -> Result<String, ParameterError> {
        match name {
            "source" => return Ok("source.type".to_string()),
            "instrument" => return Ok("instrument.name".to_string()),
            _ => {}
        }
        if name.contains('.') || FIELDS.contains(&name) {
            return Ok(name.to_string());
        }
        let owner = if instrument::FIELDS.contains(&name) {
            "instrument"
        } else if self.source.fields().iter().any(|field| field == name) {
            "source"
        } else if atmosphere::FIELDS.contains(&name) {
            "atmosphere"
        } else {
            return Err(ParameterError::UnknownParameter(name.to_string()));
        };
        let routed = format!("{owner}.{name}");
        record_warning(
            &mut self.pending_warnings,
            format!("interpreting parameter '{name}' as '{routed}'"),
        );
        Ok(routed)
    }

    /// Apply one parameter without recalculating.
    fn apply(&mut self, name: &str, value: &ParamValue) -> Result<(), CalculatorError> {
        let name = self.route(name)?;
        if let Some(field) = name.strip_prefix("instrument.") {
            self.instrument.set_parameter(field, value)?;
            if field == "name" {
                let band = ParamValue::from(self.instrument.wavelength_band());
                self.source
                    .set_parameter("wavelength_band", &band, &mut self.pending_warnings)?;
            }
            self.wavelengths = self.default_wavelengths()?;
            return Ok(());
        }
        if let Some(field) = name.strip_prefix("source.") {
            self.source
                .set_parameter(field, value, &mut self.pending_warnings)?;
            return Ok(());
        }
        if let Some(field) = name.strip_prefix("atmosphere.") {
            self.atmosphere.set_parameter(field, value)?;
            return Ok(());
        }

        match name.as_str() {
            "target" => {
                let requested = value
                    .as_text()
                    .ok_or_else(|| ParameterError::invalid(&name, "expected a target name"))?;
                let target = Target::from_key(requested).ok_or_else(|| ParameterError::InvalidOption {
                    name: name.clone(),
                    value: requested.to_string(),
                    options: Target::ALL.iter().map(|t| t.key().to_string()).collect(),
                })?;
                self.switch_target(target);
            }
            "wavelengths" => {
                let wavelengths = value
                    .items()
                    .iter()
                    .map(|item| item.to_f64_in(&name, "nm"))
                    .collect::<Result<Vec<_>, _>>()?;
                if wavelengths.is_empty() || wavelengths[0] <= 0.0 {
                    return Err(ParameterError::invalid(&name, "wavelengths must be positive").into());
                }
                if !is_strictly_increasing(&wavelengths) {
                    return Err(
                        ParameterError::invalid(&name, "wavelengths must be strictly increasing").into(),
                    );
                }
                self.wavelengths = wavelengths;
            }
            "exposure" => {
                let exposure = value
                    .items()
                    .iter()
                    .map(|item| item.to_f64_in(&name, "s"))
                    .collect::<Result<Vec<_>, _>>()?;
                if exposure.is_empty() || exposure.iter().any(|t| *t < 0.0) {
                    return Err(ParameterError::invalid(
                        &name,
                        "expected one or more exposure times of at least 0 s",
                    )
                    .into());
                }
                self.exposure = exposure;
                self.target = Target::SignalNoiseRatio;
            }
            "signal_noise_ratio" => {
                let snr = value
                    .items()
                    .iter()
                    .map(|item| item.to_f64_in(&name, ""))
                    .collect::<Result<Vec<_>, _>>()?;
                if snr.is_empty() || snr.iter().any(|s| *s <= 0.0) {
                    return Err(ParameterError::invalid(
                        &name,
                        "expected one or more positive signal-to-noise ratios",
                    )
                    .into());
                }
                self.signal_noise_ratio = snr;
                self.target = Target::Exposure;
            }
            "reads" => self.reads = value.to_count(&name)?,
            "dithers" | "repeats" | "coadds" => {
                let count = value.to_count(&name)?;
                let (mut dithers, mut repeats, mut coadds) = (self.dithers, self.repeats, self.coadds);
                match name.as_str() {
                    "dithers" => dithers = count,
                    "repeats" => repeats = count,
                    _ => coadds = count,
                }
                if subexposure_count(dithers, repeats, coadds).is_none() {
                    return Err(ParameterError::invalid(
                        &name,
                        format!("{dithers} dithers x {repeats} repeats x {coadds} coadds is too many subexposures"),
                    )
                    .into());
                }
                (self.dithers, self.repeats, self.coadds) = (dithers, repeats, coadds);
            }
            _ => return Err(ParameterError::UnknownParameter(name).into()),
        }
        Ok(())
    }

    /// Set one parameter by dotted name and recalculate.
    ///
    /// Names are either the calculator's own ([`FIELDS`]) or prefixed with
    /// `instrument.`, `source.` or `atmosphere.`. A bare sub-model name is
    /// accepted with a warning. On error the calculator is left unchanged.
    pub fn set_parameter(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), CalculatorError> {
        let value = value.into();
        let previous = self.clone();
        let outcome = self.apply(name, &value).and_then(|_| self.recalculate());
        if outcome.is_err() {
            *self = previous;
        }
        outcome
    }

    /// Set several parameters and recalculate once.
    ///
    /// Every entry is attempted. Failed entries leave no trace and are
    /// reported together in [`CalculatorError::Batch`] after the others have
    /// been applied.
    pub fn set_parameters<I, K, V>(&mut self, parameters: I) -> Result<(), CalculatorError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let (mut first, rest): (Vec<_>, Vec<_>) = parameters
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .partition(|(name, _): &(String, ParamValue)| BATCH_FIRST.contains(&name.as_str()));
        first.sort_by_key(|(name, _)| BATCH_FIRST.iter().position(|key| *key == name.as_str()));

        let mut failures = Vec::new();
        for (name, value) in first.into_iter().chain(rest) {
            let previous = self.clone();
            if let Err(e) = self.apply(&name, &value) {
                *self = previous;
                failures.push((name, e));
            }
        }

        let previous = self.clone();
        if let Err(e) = self.recalculate() {
            *self = previous;
            failures.push(("recalculate".to_string(), e));
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CalculatorError::Batch(failures))
        }
    }

    /// Set parameters from a JSON object such as a web form submission.
    pub fn set_parameters_json(&mut self, parameters: &Value) -> Result<(), CalculatorError> {
        let Value::Object(entries) = parameters else {
            return Err(ParameterError::invalid("parameters", "expected a JSON object").into());
        };
        let mut failures = Vec::new();
        let mut values = Vec::new();
        for (name, value) in entries {
            match ParamValue::from_json(value) {
                Some(value) => values.push((name.clone(), value)),
                None => failures.push((
                    name.clone(),
                    ParameterError::invalid(name, format!("unsupported value {value}")).into(),
                )),
            }
        }
        match self.set_parameters(values) {
            Ok(()) if failures.is_empty() => Ok(()),
            Ok(()) => Err(CalculatorError::Batch(failures)),
            Err(CalculatorError::Batch(mut others)) => {
                failures.append(&mut others);
                Err(CalculatorError::Batch(failures))
            }
            Err(e) => Err(e),
        }
    }

    /// Register an uploaded spectrum, select it and recalculate.
    ///
    /// Returns the key of the new source type.
    pub fn add_template(&mut self, bytes: &[u8], filename: &str) -> Result<String, CalculatorError> {
        let previous = self.clone();
        let outcome = self
            .source
            .add_template(bytes, filename)
            .map_err(CalculatorError::from)
            .and_then(|key| {
                self.source.set_type(&key, &mut self.pending_warnings);
                self.recalculate().map(|_| key)
            });
        if outcome.is_err() {
            *self = previous;
        }
        outcome
    }

    /// Restore every parameter to its configured default and recalculate.
    pub fn reset_parameters(&mut self) -> Result<(), CalculatorError> {
        let previous = self.clone();
        let outcome = self.reset().and_then(|_| self.recalculate());
        if outcome.is_err() {
            *self = previous;
        }
        outcome
    }

    fn reset(&mut self) -> Result<(), CalculatorError> {
        self.atmosphere.reset_parameters();
        self.instrument.reset_parameters();
        self.source.reset_parameters();
        let defaults = &self.config.calculator.defaults;
        self.target = defaults.target;
        self.signal_noise_ratio = defaults.signal_noise_ratio.clone();
        self.dithers = defaults.dithers;
        self.reads = defaults.reads;
        self.repeats = defaults.repeats;
        self.coadds = defaults.coadds;
        self.exposure = Self::default_exposure(&self.config)?;
        self.wavelengths = self.default_wavelengths()?;
        Ok(())
    }

    /// Describe every settable parameter by the dotted name it is set with.
    pub fn get_parameters(&self) -> BTreeMap<String, ParameterInfo> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "target".to_string(),
            ParameterInfo::new(self.target.key()).with_options(
                Target::ALL
                    .iter()
                    .map(|t| ParameterOption::new(t.key(), t.display_name())),
            ),
        );
        parameters.insert(
            "wavelengths".to_string(),
            ParameterInfo::new(self.wavelengths.clone()).with_unit("nm"),
        );
        parameters.insert(
            "exposure".to_string(),
            ParameterInfo::new(self.exposure.clone()).with_unit("s"),
        );
        parameters.insert(
            "signal_noise_ratio".to_string(),
            ParameterInfo::new(self.signal_noise_ratio.clone()),
        );
        for (name, count) in [
            ("dithers", self.dithers),
            ("reads", self.reads),
            ("repeats", self.repeats),
            ("coadds", self.coadds),
        ] {
            parameters.insert(name.to_string(), ParameterInfo::new(count));
        }

        let range = match (self.wavelengths.first(), self.wavelengths.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => (f64::NAN, f64::NAN),
        };
        let prefixed = |prefix: &str, entries: BTreeMap<String, ParameterInfo>| {
            entries
                .into_iter()
                .map(move |(name, info)| (format!("{prefix}.{name}"), info))
                .collect::<Vec<_>>()
        };
        parameters.extend(prefixed("instrument", self.instrument.parameters()));
        parameters.extend(prefixed("source", self.source.parameters(range)));
        parameters.extend(prefixed("atmosphere", self.atmosphere.parameters()));
        parameters
    }

    fn rates(
        &self,
        source_flux: &[f64],
        efficiency: &[f64],
        geometry: &SlitGeometry,
    ) -> Rates {
        let transmission = self.atmosphere.transmission(&self.wavelengths);
        let emission = self.atmosphere.emission(&self.wavelengths);
        let [binning_spectral, binning_spatial] = self.instrument.binning().map(f64::from);
        let resolution = self.instrument.spectral_resolution();

        let mut source = Vec::with_capacity(self.wavelengths.len());
        let mut background = Vec::with_capacity(self.wavelengths.len());
        for (i, &nm) in self.wavelengths.iter().enumerate() {
            let collected = efficiency[i]
                * self.telescope_area_cm2
                * (nm / resolution)
                * binning_spectral
                * binning_spatial;
            source.push(source_flux[i] * transmission[i] * collected * geometry.source_fraction);
            background.push(emission[i] * collected * geometry.slit_area);
        }

        let read_noise = self.instrument.read_noise().value;
        Rates {
            source,
            background,
            dark: self.instrument.dark_current().value * geometry.slit_area_pixels,
            read: read_noise * read_noise * (f64::from(self.reads) / 2.0) * geometry.slit_area_pixels
                / binning_spatial,
        }
    }

    /// Pixel level in adu reached within one subexposure of `t` seconds.
    fn pixel_level(&self, rates: &Rates, geometry: &SlitGeometry, i: usize, t: f64) -> f64 {
        let electrons = rates.source[i] * geometry.pixel_area / geometry.source_area
            + rates.background[i] * geometry.pixel_area / geometry.slit_area
            + rates.dark / geometry.slit_area_pixels;
        electrons * t / self.instrument.gain()
    }

    /// Rebuild [`Results`] from the current state.
    pub fn recalculate(&mut self) -> Result<(), CalculatorError> {
        let mut warnings = std::mem::take(&mut self.pending_warnings);
        let source_flux = self.source.flux(&self.wavelengths, &mut warnings)?;
        let efficiency = self.instrument.throughput(&self.wavelengths, &mut warnings)?;
        let geometry = SlitGeometry::new(
            self.instrument.slit(),
            self.atmosphere.seeing(),
            self.instrument.pixel_size(),
        );
        let rates = self.rates(&source_flux, &efficiency, &geometry);
        let subexposures = self.subexposures() as f64;
        let depth = self.instrument.nonlinear_depth();
        let count = self.wavelengths.len();

        let mut results = Results {
            target: self.target,
            wavelengths: self.wavelengths.clone(),
            ..Results::default()
        };
        match self.target {
            Target::SignalNoiseRatio => {
                for &t in &self.exposure {
                    let saturated = (0..count)
                        .filter(|&i| self.pixel_level(&rates, &geometry, i, t) > depth)
                        .count();
                    if saturated > 0 {
                        record_warning(
                            &mut warnings,
                            format!("a {t} s exposure saturates the detector at {saturated} of {count} wavelength(s)"),
                        );
                    }
                    let exposure = vec![t; count];
                    results.signal_noise_ratio.push(
                        (0..count)
                            .map(|i| rates.signal_noise_ratio(i, t, subexposures))
                            .collect(),
                    );
                    results.push_counts(&rates, &geometry, &exposure, subexposures, self.instrument.gain());
                    results.exposure.push(exposure);
                }
            }
            Target::Exposure => {
                for &snr in &self.signal_noise_ratio {
                    let mut unsolved = 0;
                    let mut saturated = 0;
                    let exposure = (0..count)
                        .map(|i| {
                            if !rates.source[i].is_finite() {
                                return f64::NAN;
                            }
                            match rates.exposure(i, snr, subexposures) {
                                None => {
                                    unsolved += 1;
                                    f64::NAN
                                }
                                Some(t) if self.pixel_level(&rates, &geometry, i, t) > depth => {
                                    saturated += 1;
                                    f64::NAN
                                }
                                Some(t) => t,
                            }
                        })
                        .collect::<Vec<_>>();
                    if unsolved > 0 {
                        record_warning(
                            &mut warnings,
                            format!("no exposure time reaches S/N {snr} at {unsolved} of {count} wavelength(s), returning NaN"),
                        );
                    }
                    if saturated > 0 {
                        record_warning(
                            &mut warnings,
                            format!("S/N {snr} saturates the detector at {saturated} of {count} wavelength(s), returning NaN"),
                        );
                    }
                    results.signal_noise_ratio.push(
                        exposure
                            .iter()
                            .enumerate()
                            .map(|(i, &t)| rates.signal_noise_ratio(i, t, subexposures))
                            .collect(),
                    );
                    results.push_counts(&rates, &geometry, &exposure, subexposures, self.instrument.gain());
                    results.exposure.push(exposure);
                }
            }
        }
        debug!(
            "Recalculated {} candidate(s) over {count} wavelengths with {} warning(s)",
            results.exposure.len(),
            warnings.len()
        );
        results.source_flux = source_flux;
        results.efficiency = efficiency;
        results.warnings = warnings;
        self.results = Arc::new(results);
        Ok(())
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    /// `dithers · repeats · coadds`
    pub fn subexposures(&self) -> u32 {
        subexposure_count(self.dithers, self.repeats, self.coadds).unwrap_or(u32::MAX)
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// nm
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Candidate subexposure times, s
    pub fn exposure(&self) -> &[f64] {
        &self.exposure
    }

    pub fn signal_noise_ratio(&self) -> &[f64] {
        &self.signal_noise_ratio
    }

    pub fn dithers(&self) -> u32 {
        self.dithers
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    pub fn coadds(&self) -> u32 {
        self.coadds
    }

    pub fn telescope_area_cm2(&self) -> f64 {
        self.telescope_area_cm2
    }

    pub fn atmosphere(&self) -> &AtmosphereModel {
        &self.atmosphere
    }

    pub fn instrument(&self) -> &InstrumentModel {
        &self.instrument
    }

    pub fn source(&self) -> &SourceModel {
        &self.source
    }
}
