//! The observed target: spectral shape, brightness and redshift.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::info;
use shared::table;
use shared::units::{Quantity, Unit};

use crate::config::{value_in, Config, GeneratorKind, SourceSettings};
use crate::error::{ConfigError, ParameterError, SourceError};
use crate::parameters::{ParamValue, ParameterInfo, ParameterOption};
use crate::photometry::{
    Blackbody, EmissionLine, Flat, GeneratorContext, PowerLaw, ReferenceSpectrum, SourceGenerator,
    Template, PHOTON_FLUX_UNIT,
};
use crate::record_warning;

/// Parameters every source type has.
pub const COMMON_FIELDS: [&str; 4] = ["type", "brightness", "redshift", "wavelength_band"];

/// A registered, selectable source type.
#[derive(Debug, Clone)]
struct SourceType {
    name: String,
    generator: Arc<dyn SourceGenerator>,
    defaults: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
struct SourceState {
    source_type: String,
    brightness: Quantity,
    redshift: f64,
    band: String,
    parameters: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct SourceModel {
    types: BTreeMap<String, SourceType>,
    bands: BTreeMap<String, f64>,
    vega: Arc<ReferenceSpectrum>,
    photon_unit: Unit,
    state: SourceState,
    defaults: SourceState,
}

fn generator_for(kind: GeneratorKind) -> Arc<dyn SourceGenerator> {
    match kind {
        GeneratorKind::Blackbody => Arc::new(Blackbody),
        GeneratorKind::PowerLaw => Arc::new(PowerLaw),
        GeneratorKind::EmissionLine => Arc::new(EmissionLine),
        GeneratorKind::Flat => Arc::new(Flat),
    }
}

/// `stem` of a filename, used as the key of an uploaded template.
fn template_key(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

impl SourceModel {
    /// Build the type registry and load the reference spectrum and templates.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let settings = &config.source;
        let directory = config.source_dir();
        let vega = ReferenceSpectrum::load(&directory.join(&settings.vega_filename))?;
        let photon_unit = Unit::parse(PHOTON_FLUX_UNIT).map_err(|source| ConfigError::Unit {
            field: "source".to_string(),
            source,
        })?;

        let bands = settings
            .wavelength_bands
            .iter()
            .map(|(band, wavelength)| {
                Ok((
                    band.clone(),
                    value_in(&format!("source.wavelength_bands.{band}"), wavelength, "nm")?,
                ))
            })
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let mut types = BTreeMap::new();
        for (key, declared) in &settings.types {
            let field = format!("source.types.{key}");
            let generator: Arc<dyn SourceGenerator> = match (&declared.generator, &declared.filename) {
                (Some(kind), _) => generator_for(*kind),
                (None, Some(filename)) => {
                    let path = directory.join(filename);
                    let table = table::read(&path).map_err(|source| ConfigError::Table {
                        path: path.display().to_string(),
                        source,
                    })?;
                    let template = Template::from_table(&declared.name, &table, &vega)
                        .map_err(|e| ConfigError::invalid(&field, e.to_string()))?;
                    Arc::new(template)
                }
                (None, None) => {
                    return Err(ConfigError::invalid(&field, "no generator or filename"));
                }
            };

            let mut defaults = BTreeMap::new();
            for spec in generator.parameters() {
                let value = declared.parameters.get(spec.name).ok_or_else(|| {
                    ConfigError::invalid(&field, format!("missing default for {}", spec.name))
                })?;
                let value = value_in(&format!("{field}.{}", spec.name), value, spec.unit)?;
                if spec.positive && value <= 0.0 {
                    return Err(ConfigError::invalid(
                        format!("{field}.{}", spec.name),
                        "must be positive",
                    ));
                }
                defaults.insert(spec.name.to_string(), value);
            }
            types.insert(
                key.clone(),
                SourceType {
                    name: declared.name.clone(),
                    generator,
                    defaults,
                },
            );
        }
        info!("Registered {} source types", types.len());

        let defaults = Self::default_state(settings, &types)?;
        let model = Self {
            types,
            bands,
            vega: Arc::new(vega),
            photon_unit,
            state: defaults.clone(),
            defaults,
        };
        model
            .brightness_at_reference(&model.state.brightness)
            .map_err(|e| ConfigError::Unit {
                field: "source.defaults.brightness".to_string(),
                source: e,
            })?;
        Ok(model)
    }

    fn default_state(
        settings: &SourceSettings,
        types: &BTreeMap<String, SourceType>,
    ) -> Result<SourceState, ConfigError> {
        let source_type = &settings.defaults.source_type;
        let parameters = types
            .get(source_type)
            .map(|t| t.defaults.clone())
            .ok_or_else(|| ConfigError::invalid("source.defaults.type", "not a declared type"))?;
        Ok(SourceState {
            source_type: source_type.clone(),
            brightness: settings.defaults.brightness.clone(),
            redshift: settings.defaults.redshift,
            band: settings.defaults.wavelength_band.clone(),
            parameters,
        })
    }

    fn active(&self) -> Option<&SourceType> {
        self.types.get(&self.state.source_type)
    }

    /// Central wavelength of the selected band, in nm.
    pub fn reference_wavelength(&self) -> f64 {
        self.bands.get(&self.state.band).copied().unwrap_or(f64::NAN)
    }

    /// `brightness` as photon / (s cm2 nm) at the reference wavelength.
    fn brightness_at_reference(&self, brightness: &Quantity) -> Result<f64, shared::units::UnitError> {
        let reference = self.reference_wavelength();
        brightness
            .to_with(&self.photon_unit, &self.vega.context(reference))
            .map(|q| q.value)
    }

    /// Flux density in photon / (s cm2 nm) at each wavelength (nm).
    pub fn flux(&self, wavelengths: &[f64], warnings: &mut Vec<String>) -> Result<Vec<f64>, SourceError> {
        let Some(active) = self.active() else {
            return Err(SourceError::Template {
                name: self.state.source_type.clone(),
                reason: "type is not registered".to_string(),
            });
        };
        let context = GeneratorContext {
            brightness: self.brightness_at_reference(&self.state.brightness)?,
            reference_nm: self.reference_wavelength(),
            redshift: self.state.redshift,
            parameters: &self.state.parameters,
        };
        Ok(active.generator.flux(wavelengths, &context, warnings))
    }

    /// Select a registered type, resetting its parameters to their defaults.
    ///
    /// An unknown name leaves the current type active and records a warning.
    pub fn set_type(&mut self, name: &str, warnings: &mut Vec<String>) -> bool {
        let Some(selected) = self.types.get(name) else {
            record_warning(
                warnings,
                format!(
                    "unknown source type '{name}', keeping '{}'",
                    self.state.source_type
                ),
            );
            return false;
        };
        self.state.parameters = selected.defaults.clone();
        self.state.source_type = name.to_string();
        true
    }

    /// Set the brightness from a quantity or a string such as `"20 magab"`.
    pub fn set_brightness(&mut self, value: &ParamValue) -> Result<(), ParameterError> {
        let brightness = value.to_quantity("brightness")?;
        let flux = self
            .brightness_at_reference(&brightness)
            .map_err(|e| ParameterError::unit("brightness", e))?;
        if !flux.is_finite() || flux < 0.0 {
            return Err(ParameterError::invalid(
                "brightness",
                format!("{brightness} is not a usable flux"),
            ));
        }
        self.state.brightness = brightness;
        Ok(())
    }

    pub fn set_parameter(
        &mut self,
        name: &str,
        value: &ParamValue,
        warnings: &mut Vec<String>,
    ) -> Result<(), ParameterError> {
        match name {
            "type" => {
                let requested = value
                    .as_text()
                    .ok_or_else(|| ParameterError::invalid(name, "expected a type name"))?;
                self.set_type(requested, warnings);
            }
            "brightness" | "flux" => self.set_brightness(value)?,
            "redshift" => {
                let redshift = value.to_f64_in(name, "")?;
                if redshift <= -1.0 {
                    return Err(ParameterError::invalid(name, "redshift must be greater than -1"));
                }
                self.state.redshift = redshift;
            }
            "wavelength_band" => {
                let requested = value
                    .as_text()
                    .ok_or_else(|| ParameterError::invalid(name, "expected a band name"))?;
                if !self.bands.contains_key(requested) {
                    return Err(ParameterError::InvalidOption {
                        name: name.to_string(),
                        value: requested.to_string(),
                        options: self.bands.keys().cloned().collect(),
                    });
                }
                // Brightness must stay convertible at the new reference
                let previous = std::mem::replace(&mut self.state.band, requested.to_string());
                if let Err(e) = self.brightness_at_reference(&self.state.brightness) {
                    self.state.band = previous;
                    return Err(ParameterError::unit("brightness", e));
                }
            }
            _ => {
                let spec = self
                    .active()
                    .and_then(|t| t.generator.parameters().iter().find(|s| s.name == name).copied())
                    .ok_or_else(|| ParameterError::UnknownParameter(format!("source.{name}")))?;
                let parameter = value.to_f64_in(name, spec.unit)?;
                if spec.positive && parameter <= 0.0 {
                    return Err(ParameterError::invalid(name, "must be positive"));
                }
                self.state.parameters.insert(name.to_string(), parameter);
            }
        }
        Ok(())
    }

    /// Register an uploaded spectrum as a new type keyed by the file stem.
    pub fn add_template(&mut self, bytes: &[u8], filename: &str) -> Result<String, SourceError> {
        let key = template_key(filename);
        let table = table::from_bytes(bytes, filename).map_err(|e| SourceError::Template {
            name: filename.to_string(),
            reason: e.to_string(),
        })?;
        let template = Template::from_table(&key, &table, &self.vega)?;
        info!("Registered template {key} from {filename}");
        self.types.insert(
            key.clone(),
            SourceType {
                name: key.clone(),
                generator: Arc::new(template),
                defaults: BTreeMap::new(),
            },
        );
        Ok(key)
    }

    /// Common parameter names followed by the active type's own.
    pub fn active_parameters(&self) -> Vec<String> {
        let mut names = COMMON_FIELDS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        if let Some(active) = self.active() {
            names.extend(active.generator.parameters().iter().map(|s| s.name.to_string()));
        }
        names
    }

    /// Names accepted by [`SourceModel::set_parameter`] in the current state.
    pub fn fields(&self) -> Vec<String> {
        let mut names = self.active_parameters();
        names.push("flux".to_string());
        names
    }

    /// `(key, display name)` of every registered type.
    pub fn available_types(&self) -> Vec<(String, String)> {
        self.types
            .iter()
            .map(|(key, t)| (key.clone(), t.name.clone()))
            .collect()
    }

    pub fn source_type(&self) -> &str {
        &self.state.source_type
    }

    pub fn brightness(&self) -> &Quantity {
        &self.state.brightness
    }

    pub fn redshift(&self) -> f64 {
        self.state.redshift
    }

    pub fn wavelength_band(&self) -> &str {
        &self.state.band
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.state.parameters.get(name).copied()
    }

    /// Restore the configured type, brightness, redshift and band.
    ///
    /// Uploaded templates stay registered.
    pub fn reset_parameters(&mut self) {
        self.state = self.defaults.clone();
    }

    /// Describe the source parameters. Band options are limited to bands
    /// inside `[lo, hi]` nm plus the active one.
    pub fn parameters(&self, range: (f64, f64)) -> BTreeMap<String, ParameterInfo> {
        let mut info = BTreeMap::new();
        info.insert(
            "type".to_string(),
            ParameterInfo::new(self.state.source_type.clone()).with_options(
                self.types
                    .iter()
                    .map(|(key, t)| ParameterOption::new(key.as_str(), t.name.as_str())),
            ),
        );
        info.insert(
            "brightness".to_string(),
            ParameterInfo::new(self.state.brightness.value)
                .with_unit(self.state.brightness.unit.to_string()),
        );
        info.insert("redshift".to_string(), ParameterInfo::new(self.state.redshift));
        info.insert(
            "wavelength_band".to_string(),
            ParameterInfo::new(self.state.band.clone()).with_options(
                self.bands
                    .iter()
                    .filter(|(band, nm)| {
                        **band == self.state.band || (range.0..=range.1).contains(*nm)
                    })
                    .map(|(band, nm)| ParameterOption::new(band.as_str(), format!("{band} ({nm} nm)"))),
            ),
        );
        if let Some(active) = self.active() {
            for spec in active.generator.parameters() {
                let mut parameter =
                    ParameterInfo::new(self.parameter(spec.name).unwrap_or(f64::NAN));
                if !spec.unit.is_empty() {
                    parameter = parameter.with_unit(spec.unit);
                }
                info.insert(spec.name.to_string(), parameter);
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use test_helpers::fixture::{template_flux, vega_flux};
    use test_helpers::Fixture;

    use super::*;
    use crate::photometry::wavelength_to_ergs;

    fn model(fixture: &Fixture) -> SourceModel {
        let config = Config::load(fixture.path()).unwrap();
        SourceModel::new(&config).unwrap()
    }

    #[test]
    fn test_defaults() {
        let fixture = Fixture::new();
        let source = model(&fixture);
        assert_eq!(source.source_type(), "flat");
        assert_eq!(source.wavelength_band(), "K");
        assert_relative_eq!(source.reference_wavelength(), 2190.0);
        assert_eq!(source.brightness().to_string(), "16 mag(AB)");
        assert_eq!(source.available_types().len(), 5);
    }

    #[test]
    fn test_flat_ab_source_is_constant() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        source.set_brightness(&"20 mag(AB)".into()).unwrap();
        let flux = source.flux(&[1200.0, 2200.0], &mut Vec::new()).unwrap();
        assert_eq!(flux[0], flux[1]);
        // 3631 Jy · 10^-8 at 2190 nm as photons
        let expected = 3631e-23 * 1e-8 / (6.62607015e-27 * 2190e-7) * 1e-7;
        assert_relative_eq!(flux[0], expected, max_relative = 1e-10);
    }

    #[test]
    fn test_vega_magnitude_uses_reference_spectrum() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        source.set_brightness(&"2.5 vegamag".into()).unwrap();
        let flux = source.flux(&[1000.0], &mut Vec::new()).unwrap();
        assert_relative_eq!(flux[0], vega_flux(2190.0) / 10.0, max_relative = 1e-3);
    }

    #[test]
    fn test_brightness_rejects_incompatible_units() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        for bad in ["20 nm", "4.7 mag(bol)", "12"] {
            assert!(
                matches!(
                    source.set_brightness(&bad.into()),
                    Err(ParameterError::Unit { .. })
                ),
                "{bad}"
            );
        }
        assert_eq!(source.brightness().to_string(), "16 mag(AB)");
        source.set_parameter("flux", &"1e-17 erg/s/cm2/AA".into(), &mut Vec::new())
            .unwrap();
        assert_relative_eq!(source.brightness().value, 1e-17);
    }

    #[test]
    fn test_type_switch_resets_parameters() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        let mut warnings = Vec::new();
        assert!(source.set_type("blackbody", &mut warnings));
        assert_eq!(
            source.active_parameters(),
            vec!["type", "brightness", "redshift", "wavelength_band", "temperature"]
        );
        source.set_parameter("temperature", &"9000 K".into(), &mut warnings).unwrap();
        assert_eq!(source.parameter("temperature"), Some(9000.0));

        assert!(source.set_type("flat", &mut warnings));
        assert!(!source.active_parameters().contains(&"temperature".to_string()));
        assert!(source.set_type("blackbody", &mut warnings));
        assert_eq!(source.parameter("temperature"), Some(5800.0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_type_soft_fails() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        let mut warnings = Vec::new();
        assert!(!source.set_type("galaxy", &mut warnings));
        assert_eq!(source.source_type(), "flat");
        assert_eq!(warnings.len(), 1);
        source.set_parameter("type", &"galaxy".into(), &mut warnings).unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_parameter_validation() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        let mut warnings = Vec::new();
        assert!(source.set_parameter("redshift", &(-1.0).into(), &mut warnings).is_err());
        assert!(matches!(
            source.set_parameter("wavelength_band", &"Z".into(), &mut warnings),
            Err(ParameterError::InvalidOption { .. })
        ));
        assert!(matches!(
            source.set_parameter("temperature", &"5000 K".into(), &mut warnings),
            Err(ParameterError::UnknownParameter(_))
        ));
        source.set_type("emission_line", &mut warnings);
        assert!(source.set_parameter("width", &"-1 nm".into(), &mut warnings).is_err());
        source.set_parameter("width", &"20 AA".into(), &mut warnings).unwrap();
        assert_relative_eq!(source.parameter("width").unwrap(), 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_configured_template() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        let mut warnings = Vec::new();
        source.set_type("qso", &mut warnings);
        source.set_brightness(&"1e-3 photon / (s cm2 nm)".into()).unwrap();
        let flux = source.flux(&[1500.0, 2190.0], &mut warnings).unwrap();
        assert_relative_eq!(flux[1], 1e-3, max_relative = 1e-12);
        // erg to photon conversion adds a factor of λ to the 1/λ template
        let ratio = (template_flux(1500.0) / wavelength_to_ergs(1500.0))
            / (template_flux(2190.0) / wavelength_to_ergs(2190.0));
        assert_relative_eq!(flux[0] / flux[1], ratio, max_relative = 1e-3);
    }

    #[test]
    fn test_add_template_registers_type() {
        let fixture = Fixture::new();
        let mut source = model(&fixture);
        let text = b"wavelength [nm] flux\n1000 2\n3000 2\n";
        let key = source.add_template(text, "uploads/flat_spectrum.txt").unwrap();
        assert_eq!(key, "flat_spectrum");
        assert!(source.set_type(&key, &mut Vec::new()));
        let flux = source.flux(&[1500.0, 3500.0], &mut Vec::new()).unwrap();
        assert!(flux[0] > 0.0);
        assert_eq!(flux[1], 0.0);

        assert!(matches!(
            source.add_template(b"not a table", "junk.txt"),
            Err(SourceError::Template { .. })
        ));
    }

    #[test]
    fn test_band_options_follow_grid() {
        let fixture = Fixture::new();
        let source = model(&fixture);
        let params = source.parameters((1000.0, 2000.0));
        let bands = params["wavelength_band"]
            .options
            .iter()
            .map(|o| o.value.as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(bands, vec!["H", "J", "K"]);
        assert_eq!(params["type"].options.len(), 5);
        assert_eq!(params["brightness"].unit.as_deref(), Some("mag(AB)"));
    }
}
