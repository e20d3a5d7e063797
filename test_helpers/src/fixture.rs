//! Synthetic configuration directory.
//!
//! Layout written by [`Fixture::new`]:
//!
//! ```text
//! settings.json
//! atmosphere/trans_am1.5_wv3.txt     9 transmission cells
//! atmosphere/emiss_am1.5_wv3.txt     9 emission cells
//! instrument/spec_low.txt            spectroscopy, grating LOW
//! instrument/spec_high.txt           spectroscopy, grating HIGH
//! instrument/img_j.txt               imaging, filter J
//! instrument/img_k.txt               imaging, filter K
//! optical/spec_blue.txt              second instrument, grating BLUE
//! source/vega.txt                    reference spectrum
//! source/qso.txt                     template in erg / (s cm2 AA)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::TestHelperError;

pub const AIRMASS_INDEX: [f64; 3] = [1.0, 1.5, 2.0];
pub const WATER_VAPOR_INDEX_MM: [f64; 3] = [1.0, 3.0, 5.0];

pub const WAVELENGTH_START_NM: f64 = 900.0;
pub const WAVELENGTH_STOP_NM: f64 = 2500.0;
pub const WAVELENGTH_STEP_NM: f64 = 10.0;

/// Number of points in the default calculator wavelength grid.
pub const WAVELENGTH_COUNT: usize = 301;

pub const TELESCOPE_AREA_CM2: f64 = 760_000.0;
pub const SPECTRAL_RESOLUTION: f64 = 3000.0;
pub const PIXEL_SIZE_ARCSEC: f64 = 0.18;
pub const DARK_CURRENT: f64 = 0.02;
pub const READ_NOISE: f64 = 5.0;
pub const GAIN: f64 = 2.0;
pub const NONLINEAR_DEPTH_ADU: f64 = 60_000.0;
pub const SLIT_ARCSEC: [f64; 2] = [0.7, 20.0];
pub const SEEING_ARCSEC: f64 = 0.8;

/// Samples of the atmosphere wavelength axis, `stop` excluded.
pub fn atmosphere_wavelengths() -> Vec<f64> {
    let count = ((WAVELENGTH_STOP_NM - WAVELENGTH_START_NM) / WAVELENGTH_STEP_NM) as usize;
    (0..count)
        .map(|i| WAVELENGTH_START_NM + WAVELENGTH_STEP_NM * i as f64)
        .collect()
}

/// Transmission of the synthetic atmosphere.
///
/// Separately linear in each axis, so trilinear interpolation reproduces it
/// everywhere inside the grid.
pub fn transmission(airmass: f64, water_vapor_mm: f64, wavelength_nm: f64) -> f64 {
    (1.0 - 0.08 * (airmass - 1.0))
        * (1.0 - 0.01 * water_vapor_mm)
        * (0.9 + 0.05 * (wavelength_nm - WAVELENGTH_START_NM) / 1600.0)
}

/// Sky emission in photon / (s arcsec2 nm m2).
pub fn emission(airmass: f64, water_vapor_mm: f64, wavelength_nm: f64) -> f64 {
    20.0 * (1.0 + 0.2 * (airmass - 1.0))
        * (1.0 + 0.05 * water_vapor_mm)
        * (1.0 + (wavelength_nm - WAVELENGTH_START_NM) / 1600.0)
}

/// Throughput of the LOW grating curve, linear in wavelength.
pub fn low_throughput(wavelength_nm: f64) -> f64 {
    0.30 + 0.10 * (wavelength_nm - 950.0) / 1500.0
}

pub const HIGH_THROUGHPUT: f64 = 0.25;
pub const FILTER_J_THROUGHPUT: f64 = 0.40;
pub const FILTER_K_THROUGHPUT: f64 = 0.45;
pub const OPTICAL_THROUGHPUT: f64 = 0.35;

/// Coverage of the optical instrument's only curve, in nm.
pub const OPTICAL_RANGE_NM: (f64, f64) = (950.0, 1350.0);

/// Vega reference spectrum in photon / (s cm2 nm).
pub fn vega_flux(wavelength_nm: f64) -> f64 {
    1000.0 * (1000.0 / wavelength_nm).powi(2)
}

/// Quasar template in erg / (s cm2 AA).
pub fn template_flux(wavelength_nm: f64) -> f64 {
    1e-16 * (1000.0 / wavelength_nm)
}

/// `start..=stop` in steps of `step`.
fn inclusive_range(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let count = ((stop - start) / step).round() as usize + 1;
    (0..count).map(|i| start + step * i as f64).collect()
}

/// The settings document matching the files written by [`Fixture::new`].
pub fn default_settings() -> Value {
    json!({
        "calculator": {
            "telescope_area": "76 m2",
            "wavelength_count": WAVELENGTH_COUNT,
            "defaults": {
                "target": "signal_noise_ratio",
                "exposure": ["1200 s"],
                "signal_noise_ratio": [10],
                "dithers": 2,
                "repeats": 1,
                "coadds": 1,
                "reads": 16,
                "instrument": "nir"
            }
        },
        "atmosphere": {
            "directory": "atmosphere",
            "transmission_prefix": "trans_",
            "emission_prefix": "emiss_",
            "airmass_index": AIRMASS_INDEX,
            "water_vapor_index": ["1 mm", "3 mm", "5 mm"],
            "wavelength_index": ["900 nm", "2500 nm", "10 nm"],
            "wavelength_unit": "nm",
            "emission_unit": "photon / (s arcsec2 nm m2)",
            "defaults": {
                "airmass": 1.5,
                "water_vapor": "3 mm",
                "seeing": "0.8 arcsec"
            }
        },
        "instruments": {
          "nir": {
            "name": "Synthetic NIR spectrograph",
            "directory": "instrument",
            "wavelength_unit": "nm",
            "wavelength_band": "K",
            "default_mode": "spectroscopy",
            "modes": {
                "spectroscopy": {
                    "spectral_resolution": SPECTRAL_RESOLUTION,
                    "pixel_size": "0.18 arcsec",
                    "dark_current": "0.02 electron/s",
                    "read_noise": "5 electron",
                    "gain": "2 electron/adu",
                    "nonlinear_depth": "60000 adu",
                    "slit_options": [["0.7 arcsec", "20 arcsec"], ["1.0 arcsec", "20 arcsec"]],
                    "custom_slits": true,
                    "binning_options": [[1, 1], [2, 1], [2, 2]],
                    "grating_options": ["LOW", "HIGH"],
                    "defaults": {
                        "slit": ["0.7 arcsec", "20 arcsec"],
                        "binning": [1, 1],
                        "grating": "LOW"
                    }
                },
                "imaging": {
                    "spectral_resolution": 5,
                    "pixel_size": "0.25 arcsec",
                    "dark_current": "0.05 electron/s",
                    "read_noise": "8 electron",
                    "gain": "4 electron/adu",
                    "nonlinear_depth": "30000 adu",
                    "slit_options": [["2 arcsec", "2 arcsec"]],
                    "custom_slits": false,
                    "binning_options": [[1, 1]],
                    "filter_options": ["J", "K"],
                    "defaults": {
                        "slit": ["2 arcsec", "2 arcsec"],
                        "binning": [1, 1],
                        "filter": "K"
                    }
                }
            }
          },
          "optical": {
            "name": "Synthetic optical spectrograph",
            "directory": "optical",
            "wavelength_unit": "nm",
            "wavelength_band": "J",
            "default_mode": "spectroscopy",
            "modes": {
                "spectroscopy": {
                    "spectral_resolution": 2000,
                    "pixel_size": "0.2 arcsec",
                    "dark_current": "0.01 electron/s",
                    "read_noise": "3 electron",
                    "gain": "1.5 electron/adu",
                    "nonlinear_depth": "50000 adu",
                    "slit_options": [["1 arcsec", "10 arcsec"]],
                    "custom_slits": false,
                    "binning_options": [[1, 1]],
                    "grating_options": ["BLUE"],
                    "defaults": {
                        "slit": ["1 arcsec", "10 arcsec"],
                        "binning": [1, 1],
                        "grating": "BLUE"
                    }
                }
            }
          }
        },
        "source": {
            "directory": "source",
            "vega_filename": "vega.txt",
            "wavelength_bands": {
                "V": "550 nm",
                "J": "1220 nm",
                "H": "1630 nm",
                "K": "2190 nm"
            },
            "defaults": {
                "type": "flat",
                "brightness": "16 magab",
                "redshift": 0,
                "wavelength_band": "K"
            },
            "types": {
                "blackbody": {
                    "name": "Blackbody",
                    "generator": "blackbody",
                    "parameters": { "temperature": "5800 K" }
                },
                "power_law": {
                    "name": "Power law",
                    "generator": "power_law",
                    "parameters": { "index": -2 }
                },
                "emission_line": {
                    "name": "Emission line",
                    "generator": "emission_line",
                    "parameters": { "width": "2 nm" }
                },
                "flat": { "name": "Flat", "generator": "flat" },
                "qso": { "name": "Quasar", "filename": "qso.txt" }
            }
        }
    })
}

fn format_rows(rows: impl IntoIterator<Item = (f64, f64)>) -> String {
    rows.into_iter()
        .map(|(x, y)| format!("{x} {y}\n"))
        .collect()
}

/// Text of one transmission cell. Water vapor is written as a bare number.
pub fn transmission_file(airmass: f64, water_vapor_mm: f64) -> String {
    let mut text = format!("# airmass: {airmass}\n# water_vapor: {water_vapor_mm}\n");
    text.push_str("wavelength [nm] transmission\n");
    text.push_str(&format_rows(
        atmosphere_wavelengths()
            .into_iter()
            .map(|nm| (nm, transmission(airmass, water_vapor_mm, nm))),
    ));
    text
}

/// Text of one emission cell, using the upper-case tag spellings.
pub fn emission_file(airmass: f64, water_vapor_mm: f64) -> String {
    let mut text = format!("# AIRMASS: {airmass}\n# VAPOR: {water_vapor_mm} mm\n");
    text.push_str("wavelength [nm] emission [photon / (s arcsec2 nm m2)]\n");
    text.push_str(&format_rows(
        atmosphere_wavelengths()
            .into_iter()
            .map(|nm| (nm, emission(airmass, water_vapor_mm, nm))),
    ));
    text
}

/// Text of a throughput curve tagged with `tags`.
pub fn curve_file(tags: &[(&str, &str)], start: f64, stop: f64, efficiency: impl Fn(f64) -> f64) -> String {
    let mut text: String = tags
        .iter()
        .map(|(key, value)| format!("# {key}: {value}\n"))
        .collect();
    text.push_str("wavelength [nm] throughput\n");
    text.push_str(&format_rows(
        inclusive_range(start, stop, 50.0)
            .into_iter()
            .map(|nm| (nm, efficiency(nm))),
    ));
    text
}

/// A configuration directory in a temporary location, removed on drop.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Write the default configuration tree.
    pub fn new() -> Self {
        Self::with_settings(&default_settings()).expect("Failed to write fixture")
    }

    /// Write the default data files with a custom settings document.
    pub fn with_settings(settings: &Value) -> Result<Self, TestHelperError> {
        let fixture = Self {
            dir: TempDir::new()?,
        };
        fixture.write_settings(settings)?;

        for airmass in AIRMASS_INDEX {
            for water_vapor in WATER_VAPOR_INDEX_MM {
                fixture.write_file(
                    &format!("atmosphere/trans_am{airmass}_wv{water_vapor}.txt"),
                    transmission_file(airmass, water_vapor),
                )?;
                fixture.write_file(
                    &format!("atmosphere/emiss_am{airmass}_wv{water_vapor}.txt"),
                    emission_file(airmass, water_vapor),
                )?;
            }
        }
        fixture.write_file("atmosphere/README", "synthetic atmosphere\n")?;

        fixture.write_file(
            "instrument/spec_low.txt",
            curve_file(
                &[("mode", "spectroscopy"), ("grating", "LOW")],
                950.0,
                2450.0,
                low_throughput,
            ),
        )?;
        fixture.write_file(
            "instrument/spec_high.txt",
            curve_file(
                &[("mode", "spectroscopy"), ("grating", "HIGH")],
                1000.0,
                2400.0,
                |_| HIGH_THROUGHPUT,
            ),
        )?;
        fixture.write_file(
            "instrument/img_j.txt",
            curve_file(
                &[("mode", "imaging"), ("filter", "J")],
                1100.0,
                1400.0,
                |_| FILTER_J_THROUGHPUT,
            ),
        )?;
        fixture.write_file(
            "instrument/img_k.txt",
            curve_file(
                &[("mode", "imaging"), ("filter", "K")],
                1950.0,
                2400.0,
                |_| FILTER_K_THROUGHPUT,
            ),
        )?;

        fixture.write_file(
            "optical/spec_blue.txt",
            curve_file(
                &[("mode", "spectroscopy"), ("grating", "BLUE")],
                OPTICAL_RANGE_NM.0,
                OPTICAL_RANGE_NM.1,
                |_| OPTICAL_THROUGHPUT,
            ),
        )?;

        let mut vega = String::from("# name: Vega\nwavelength [nm] flux [photon / (s cm2 nm)]\n");
        vega.push_str(&format_rows(
            inclusive_range(300.0, 3000.0, 10.0)
                .into_iter()
                .map(|nm| (nm, vega_flux(nm))),
        ));
        fixture.write_file("source/vega.txt", vega)?;

        let mut qso = String::from("wavelength [nm] flux [erg / (s cm2 AA)]\n");
        qso.push_str(&format_rows(
            inclusive_range(500.0, 3000.0, 10.0)
                .into_iter()
                .map(|nm| (nm, template_flux(nm))),
        ));
        fixture.write_file("source/qso.txt", qso)?;

        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Replace `settings.json`.
    pub fn write_settings(&self, settings: &Value) -> Result<(), TestHelperError> {
        let text = serde_json::to_string_pretty(settings)?;
        self.write_file("settings.json", text)?;
        Ok(())
    }

    /// Write `contents` at `relative`, creating parent directories.
    pub fn write_file(
        &self,
        relative: &str,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf, TestHelperError> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn remove_file(&self, relative: &str) -> Result<(), TestHelperError> {
        fs::remove_file(self.dir.path().join(relative))?;
        Ok(())
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_tree_is_complete() {
        let fixture = Fixture::new();
        let root = fixture.path();
        assert!(root.join("settings.json").exists());
        assert!(root.join("atmosphere/trans_am1.5_wv3.txt").exists());
        assert!(root.join("atmosphere/emiss_am2_wv5.txt").exists());
        assert!(root.join("instrument/spec_low.txt").exists());
        assert!(root.join("optical/spec_blue.txt").exists());
        assert!(root.join("source/vega.txt").exists());
    }

    #[test]
    fn test_atmosphere_axis_excludes_stop() {
        let axis = atmosphere_wavelengths();
        assert_eq!(axis.len(), 160);
        assert_eq!(axis[159], 2490.0);
    }

    #[test]
    fn test_settings_round_trip() {
        let mut settings = default_settings();
        settings["calculator"]["defaults"]["dithers"] = 4.into();
        let fixture = Fixture::with_settings(&settings).unwrap();
        let text = fs::read_to_string(fixture.path().join("settings.json")).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["calculator"]["defaults"]["dithers"], 4);
    }
}
