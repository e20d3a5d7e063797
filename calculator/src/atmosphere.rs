//! Atmospheric transmission and sky emission.
//!
//! Both quantities are tabulated on an airmass × water-vapor × wavelength
//! grid built from one data file per `(airmass, water vapor)` cell. Queries
//! interpolate trilinearly at the current operating point.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use ndarray::Array3;
use shared::algo::{arange, RegularGrid3};
use shared::table::{self, Table};
use shared::units::{Quantity, SpectralContext};

use crate::config::{parse_unit, value_in, Config};
use crate::error::{ConfigError, ParameterError};
use crate::parameters::{ParamValue, ParameterInfo};

/// Internal unit of sky emission.
pub const EMISSION_UNIT: &str = "photon / (s cm2 nm arcsec2)";

/// Parameters owned by the atmosphere.
pub const FIELDS: [&str; 3] = ["airmass", "water_vapor", "seeing"];

const AIRMASS_TAGS: [&str; 1] = ["airmass"];
const WATER_VAPOR_TAGS: [&str; 2] = ["water_vapor", "vapor"];

/// Relative tolerance when matching file tags to index values.
const TAG_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Transmission,
    Emission,
}

impl CellKind {
    fn name(&self) -> &'static str {
        match self {
            CellKind::Transmission => "transmission",
            CellKind::Emission => "emission",
        }
    }
}

/// Operating point of the atmosphere.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OperatingPoint {
    airmass: f64,
    water_vapor_mm: f64,
    seeing_arcsec: f64,
}

/// Clones share the loaded grids; only the operating point is copied.
#[derive(Debug, Clone)]
pub struct AtmosphereModel {
    transmission: Arc<RegularGrid3>,
    emission: Arc<RegularGrid3>,
    current: OperatingPoint,
    defaults: OperatingPoint,
}

fn index_of(index: &[f64], value: f64) -> Option<usize> {
    index
        .iter()
        .position(|&x| (x - value).abs() <= TAG_TOLERANCE * x.abs().max(value.abs()))
}

/// Accumulates cells of one grid while files are scanned.
struct GridBuilder {
    kind: CellKind,
    values: Array3<f64>,
    filled: Vec<Option<PathBuf>>,
    files: usize,
}

impl GridBuilder {
    fn new(kind: CellKind, shape: (usize, usize, usize)) -> Self {
        Self {
            kind,
            values: Array3::zeros(shape),
            filled: vec![None; shape.0 * shape.1],
            files: 0,
        }
    }

    fn insert(
        &mut self,
        path: &Path,
        cell: (usize, usize),
        samples: Vec<f64>,
    ) -> Result<(), ConfigError> {
        let slot = cell.0 * self.values.shape()[1] + cell.1;
        if let Some(previous) = &self.filled[slot] {
            return Err(ConfigError::DataShape {
                path: path.display().to_string(),
                reason: format!(
                    "{} cell already provided by {}",
                    self.kind.name(),
                    previous.display()
                ),
            });
        }
        for (k, value) in samples.into_iter().enumerate() {
            self.values[[cell.0, cell.1, k]] = value;
        }
        self.filled[slot] = Some(path.to_path_buf());
        self.files += 1;
        Ok(())
    }

    fn finish(
        self,
        axes: [Vec<f64>; 3],
        prefix: &str,
        directory: &Path,
    ) -> Result<RegularGrid3, ConfigError> {
        if self.files == 0 {
            return Err(ConfigError::NoFiles {
                kind: self.kind.name(),
                prefix: prefix.to_string(),
                directory: directory.display().to_string(),
            });
        }
        let columns = axes[1].len();
        if let Some(slot) = self.filled.iter().position(Option::is_none) {
            return Err(ConfigError::MissingCell {
                kind: self.kind.name(),
                airmass: axes[0][slot / columns],
                water_vapor: axes[1][slot % columns],
            });
        }
        RegularGrid3::new(axes, self.values).map_err(|e| ConfigError::DataShape {
            path: directory.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Everything needed to turn one file into a grid cell.
struct CellReader<'a> {
    airmass_index: &'a [f64],
    water_vapor_index: &'a [f64],
    wavelengths_nm: &'a [f64],
    wavelength_unit: &'a str,
    emission_unit: &'a str,
}

impl CellReader<'_> {
    fn read(&self, path: &Path, kind: CellKind) -> Result<((usize, usize), Vec<f64>), ConfigError> {
        let display = path.display().to_string();
        let table = table::read(path).map_err(|source| ConfigError::Table {
            path: display.clone(),
            source,
        })?;
        let cell = self.cell(&display, &table)?;

        let wavelength = table
            .column(&["wavelength", "wave", "lambda"])
            .or_else(|_| table.column_at(0))
            .map_err(|source| ConfigError::Table {
                path: display.clone(),
                source,
            })?;
        let unit = wavelength.unit.as_deref().unwrap_or(self.wavelength_unit);
        let to_nm = Quantity::new(1.0, parse_unit(&display, unit)?)
            .value_in("nm")
            .map_err(|source| ConfigError::Unit {
                field: display.clone(),
                source,
            })?;
        if wavelength.values.len() != self.wavelengths_nm.len() {
            return Err(ConfigError::DataShape {
                path: display,
                reason: format!(
                    "expected {} wavelength samples, found {}",
                    self.wavelengths_nm.len(),
                    wavelength.values.len()
                ),
            });
        }
        let mismatch = wavelength
            .values
            .iter()
            .zip(self.wavelengths_nm)
            .position(|(&value, &expected)| (value * to_nm - expected).abs() > 1e-6 * expected);
        if let Some(row) = mismatch {
            return Err(ConfigError::DataShape {
                path: display,
                reason: format!(
                    "wavelength {} does not match the declared index value {} nm",
                    wavelength.values[row], self.wavelengths_nm[row]
                ),
            });
        }

        let samples = match kind {
            CellKind::Transmission => {
                let column = table
                    .column(&["transmission", "trans"])
                    .or_else(|_| table.column_at(1))
                    .map_err(|source| ConfigError::Table {
                        path: display.clone(),
                        source,
                    })?;
                column.values.clone()
            }
            CellKind::Emission => {
                let column = table
                    .column(&["emission", "flux"])
                    .or_else(|_| table.column_at(1))
                    .map_err(|source| ConfigError::Table {
                        path: display.clone(),
                        source,
                    })?;
                let unit = parse_unit(&display, column.unit.as_deref().unwrap_or(self.emission_unit))?;
                let target = parse_unit(&display, EMISSION_UNIT)?;
                self.wavelengths_nm
                    .iter()
                    .zip(&column.values)
                    .map(|(&nm, &value)| {
                        Quantity::new(value, unit.clone())
                            .to_with(&target, &SpectralContext::at_nm(nm))
                            .map(|q| q.value)
                            .map_err(|source| ConfigError::Unit {
                                field: display.clone(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok((cell, samples))
    }

    fn cell(&self, display: &str, table: &Table) -> Result<(usize, usize), ConfigError> {
        let missing = |tag: &str| ConfigError::DataShape {
            path: display.to_string(),
            reason: format!("missing {tag} tag"),
        };
        let airmass_text = table.meta_value(&AIRMASS_TAGS).ok_or_else(|| missing("airmass"))?;
        let airmass = Quantity::parse(airmass_text)
            .and_then(|q| q.value_in(""))
            .map_err(|source| ConfigError::Unit {
                field: format!("{display} airmass"),
                source,
            })?;
        let vapor_text = table
            .meta_value(&WATER_VAPOR_TAGS)
            .ok_or_else(|| missing("water_vapor"))?;
        let vapor = Quantity::parse(vapor_text).map_err(|source| ConfigError::Unit {
            field: format!("{display} water_vapor"),
            source,
        })?;
        let vapor_mm = value_in(&format!("{display} water_vapor"), &vapor, "mm")?;

        let i = index_of(self.airmass_index, airmass).ok_or_else(|| ConfigError::UnknownTag {
            path: display.to_string(),
            tag: "airmass",
            value: airmass,
        })?;
        let j = index_of(self.water_vapor_index, vapor_mm).ok_or_else(|| ConfigError::UnknownTag {
            path: display.to_string(),
            tag: "water_vapor",
            value: vapor_mm,
        })?;
        Ok((i, j))
    }
}

impl AtmosphereModel {
    /// Build both grids from the configured data directory.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let settings = &config.atmosphere;
        let airmass_index = settings.airmass_index.clone();
        let water_vapor_index = settings.water_vapor_mm()?;
        let (start, stop, step) = settings.wavelength_axis_nm()?;
        let wavelengths = arange(start, stop, step);
        let shape = (airmass_index.len(), water_vapor_index.len(), wavelengths.len());

        let directory = config.atmosphere_dir();
        let mut paths = std::fs::read_dir(&directory)
            .map_err(|source| ConfigError::Io {
                path: directory.display().to_string(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        paths.sort();

        let reader = CellReader {
            airmass_index: &airmass_index,
            water_vapor_index: &water_vapor_index,
            wavelengths_nm: &wavelengths,
            wavelength_unit: &settings.wavelength_unit,
            emission_unit: &settings.emission_unit,
        };
        let mut transmission = GridBuilder::new(CellKind::Transmission, shape);
        let mut emission = GridBuilder::new(CellKind::Emission, shape);

        for path in &paths {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let builder = if filename.starts_with(&settings.transmission_prefix) {
                &mut transmission
            } else if filename.starts_with(&settings.emission_prefix) {
                &mut emission
            } else {
                debug!("Skipping {} in atmosphere directory", filename);
                continue;
            };
            let (cell, samples) = reader.read(path, builder.kind)?;
            builder.insert(path, cell, samples)?;
        }

        let axes = [airmass_index, water_vapor_index, wavelengths];
        let transmission =
            transmission.finish(axes.clone(), &settings.transmission_prefix, &directory)?;
        let emission = emission.finish(axes, &settings.emission_prefix, &directory)?;
        info!(
            "Loaded atmosphere grid of shape {:?} from {}",
            transmission.values().shape(),
            directory.display()
        );

        let defaults = OperatingPoint {
            airmass: value_in("atmosphere.defaults.airmass", &settings.defaults.airmass, "")?,
            water_vapor_mm: value_in(
                "atmosphere.defaults.water_vapor",
                &settings.defaults.water_vapor,
                "mm",
            )?,
            seeing_arcsec: value_in("atmosphere.defaults.seeing", &settings.defaults.seeing, "arcsec")?,
        };
        Ok(Self {
            transmission: Arc::new(transmission),
            emission: Arc::new(emission),
            current: defaults,
            defaults,
        })
    }

    /// Fraction of light transmitted at each wavelength (nm); zero off the grid.
    pub fn transmission(&self, wavelengths: &[f64]) -> Vec<f64> {
        self.sample(&self.transmission, wavelengths)
    }

    /// Sky emission in photon / (s cm2 nm arcsec2) at each wavelength (nm); zero off the grid.
    pub fn emission(&self, wavelengths: &[f64]) -> Vec<f64> {
        self.sample(&self.emission, wavelengths)
    }

    fn sample(&self, grid: &RegularGrid3, wavelengths: &[f64]) -> Vec<f64> {
        grid.sample_z(
            self.current.airmass,
            self.current.water_vapor_mm,
            wavelengths,
            0.0,
        )
        .unwrap_or_else(|| vec![0.0; wavelengths.len()])
    }

    pub fn airmass(&self) -> f64 {
        self.current.airmass
    }

    pub fn water_vapor(&self) -> f64 {
        self.current.water_vapor_mm
    }

    pub fn seeing(&self) -> f64 {
        self.current.seeing_arcsec
    }

    pub fn airmass_index(&self) -> &[f64] {
        self.transmission.axis(0)
    }

    pub fn water_vapor_index(&self) -> &[f64] {
        self.transmission.axis(1)
    }

    /// First and last sample of the wavelength axis, in nm.
    pub fn wavelength_range(&self) -> (f64, f64) {
        let axis = self.transmission.axis(2);
        (axis[0], axis[axis.len() - 1])
    }

    fn bounded(name: &str, value: f64, index: &[f64]) -> Result<f64, ParameterError> {
        let (min, max) = (index[0], index[index.len() - 1]);
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ParameterError::OutOfBounds {
                name: name.to_string(),
                value,
                min,
                max,
            })
        }
    }

    pub fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ParameterError> {
        match name {
            "airmass" => {
                let airmass = value.to_f64_in(name, "")?;
                self.current.airmass = Self::bounded(name, airmass, self.airmass_index())?;
            }
            "water_vapor" => {
                let vapor = value.to_f64_in(name, "mm")?;
                self.current.water_vapor_mm = Self::bounded(name, vapor, self.water_vapor_index())?;
            }
            "seeing" => {
                let seeing = value.to_f64_in(name, "arcsec")?;
                if seeing <= 0.0 {
                    return Err(ParameterError::invalid(name, "seeing must be positive"));
                }
                self.current.seeing_arcsec = seeing;
            }
            _ => return Err(ParameterError::UnknownParameter(format!("atmosphere.{name}"))),
        }
        Ok(())
    }

    /// Restore the configured operating point.
    pub fn reset_parameters(&mut self) {
        self.current = self.defaults;
    }

    pub fn parameters(&self) -> BTreeMap<String, ParameterInfo> {
        let bounds = |index: &[f64]| (index[0], index[index.len() - 1]);
        let (am_min, am_max) = bounds(self.airmass_index());
        let (wv_min, wv_max) = bounds(self.water_vapor_index());
        BTreeMap::from([
            (
                "airmass".to_string(),
                ParameterInfo::new(self.current.airmass).with_bounds(am_min, am_max),
            ),
            (
                "water_vapor".to_string(),
                ParameterInfo::new(self.current.water_vapor_mm)
                    .with_unit("mm")
                    .with_bounds(wv_min, wv_max),
            ),
            (
                "seeing".to_string(),
                ParameterInfo::new(self.current.seeing_arcsec).with_unit("arcsec"),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use test_helpers::fixture::{self, emission, transmission};
    use test_helpers::Fixture;

    use super::*;

    fn model(fixture: &Fixture) -> AtmosphereModel {
        let config = Config::load(fixture.path()).unwrap();
        AtmosphereModel::new(&config).unwrap()
    }

    #[test]
    fn test_grid_shape_and_defaults() {
        let fixture = Fixture::new();
        let atm = model(&fixture);
        assert_eq!(atm.airmass_index(), &[1.0, 1.5, 2.0]);
        assert_eq!(atm.water_vapor_index(), &[1.0, 3.0, 5.0]);
        assert_eq!(atm.wavelength_range(), (900.0, 2490.0));
        assert_relative_eq!(atm.airmass(), 1.5);
        assert_relative_eq!(atm.water_vapor(), 3.0);
        assert_relative_eq!(atm.seeing(), 0.8);
    }

    #[test]
    fn test_exact_grid_hit_reproduces_cell() {
        let fixture = Fixture::new();
        let mut atm = model(&fixture);
        atm.set_parameter("airmass", &2.0.into()).unwrap();
        atm.set_parameter("water_vapor", &"5 mm".into()).unwrap();
        let grid = atm.transmission.values();
        let stored = grid[[2, 2, 40]];
        let sampled = atm.transmission(&[1300.0]);
        assert_eq!(sampled[0], stored);
        assert_relative_eq!(sampled[0], transmission(2.0, 5.0, 1300.0), max_relative = 1e-12);
    }

    #[test]
    fn test_interpolated_operating_point() {
        let fixture = Fixture::new();
        let mut atm = model(&fixture);
        atm.set_parameter("airmass", &1.3.into()).unwrap();
        atm.set_parameter("water_vapor", &2.0.into()).unwrap();
        let wavelengths = [1234.5, 2000.0];
        let trans = atm.transmission(&wavelengths);
        let emis = atm.emission(&wavelengths);
        for (k, &nm) in wavelengths.iter().enumerate() {
            assert_relative_eq!(trans[k], transmission(1.3, 2.0, nm), max_relative = 1e-10);
            // Files are per m2, the model per cm2
            assert_relative_eq!(emis[k], emission(1.3, 2.0, nm) * 1e-4, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_off_grid_wavelengths_are_zero() {
        let fixture = Fixture::new();
        let atm = model(&fixture);
        let trans = atm.transmission(&[899.0, 900.0, 2490.0, 2491.0]);
        assert_eq!(trans[0], 0.0);
        assert!(trans[1] > 0.0 && trans[1].is_finite());
        assert!(trans[2] > 0.0 && trans[2].is_finite());
        assert_eq!(trans[3], 0.0);
        let emis = atm.emission(&[2491.0, 1500.0]);
        assert_eq!(emis[0], 0.0);
        assert!(emis[1] > 0.0);
    }

    #[test]
    fn test_string_and_number_airmass_agree() {
        let fixture = Fixture::new();
        let mut from_text = model(&fixture);
        let mut from_number = from_text.clone();
        from_text.set_parameter("airmass", &"1.3".into()).unwrap();
        from_number.set_parameter("airmass", &1.3.into()).unwrap();
        assert_eq!(from_text.airmass(), from_number.airmass());
    }

    #[test]
    fn test_out_of_bounds_is_rejected() {
        let fixture = Fixture::new();
        let mut atm = model(&fixture);
        let err = atm.set_parameter("airmass", &2.5.into()).unwrap_err();
        assert_eq!(
            err,
            ParameterError::OutOfBounds {
                name: "airmass".to_string(),
                value: 2.5,
                min: 1.0,
                max: 2.0
            }
        );
        assert_relative_eq!(atm.airmass(), 1.5);
        assert!(atm.set_parameter("seeing", &0.0.into()).is_err());
        assert!(matches!(
            atm.set_parameter("water_vapor", &"3 s".into()),
            Err(ParameterError::Unit { .. })
        ));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let fixture = Fixture::new();
        let mut atm = model(&fixture);
        atm.set_parameter("seeing", &"1.2 arcsec".into()).unwrap();
        atm.reset_parameters();
        assert_relative_eq!(atm.seeing(), 0.8);
    }

    #[test]
    fn test_clones_share_grids() {
        let fixture = Fixture::new();
        let atm = model(&fixture);
        let mut copy = atm.clone();
        copy.set_parameter("airmass", &2.0.into()).unwrap();
        assert!(Arc::ptr_eq(&atm.transmission, &copy.transmission));
        assert!(Arc::ptr_eq(&atm.emission, &copy.emission));
        assert_relative_eq!(atm.airmass(), 1.5);
        assert_relative_eq!(copy.airmass(), 2.0);
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let fixture = Fixture::new();
        fixture
            .write_file("atmosphere/trans_am3_wv1.txt", fixture::transmission_file(3.0, 1.0))
            .unwrap();
        let config = Config::load(fixture.path()).unwrap();
        assert!(matches!(
            AtmosphereModel::new(&config),
            Err(ConfigError::UnknownTag { tag: "airmass", .. })
        ));
    }

    #[test]
    fn test_missing_cell_is_fatal() {
        let fixture = Fixture::new();
        fixture.remove_file("atmosphere/emiss_am2_wv3.txt").unwrap();
        let config = Config::load(fixture.path()).unwrap();
        assert!(matches!(
            AtmosphereModel::new(&config),
            Err(ConfigError::MissingCell { kind: "emission", .. })
        ));
    }

    #[test]
    fn test_no_emission_files_is_fatal() {
        let mut settings = fixture::default_settings();
        settings["atmosphere"]["emission_prefix"] = "sky_".into();
        let fixture = Fixture::with_settings(&settings).unwrap();
        let config = Config::load(fixture.path()).unwrap();
        assert!(matches!(
            AtmosphereModel::new(&config),
            Err(ConfigError::NoFiles { kind: "emission", .. })
        ));
    }

    #[test]
    fn test_parameter_description() {
        let fixture = Fixture::new();
        let params = model(&fixture).parameters();
        assert_eq!(params["airmass"].bounds, Some([1.0, 2.0]));
        assert_eq!(params["water_vapor"].unit.as_deref(), Some("mm"));
        assert_eq!(params["seeing"].value, serde_json::json!(0.8));
    }
}
