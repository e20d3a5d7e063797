//! Registry of unit symbols with their dimensions and SI scale factors.
//!
//! Scale factors convert FROM the registered unit TO SI base units
//! (kg, m, s, K, rad, count). For example `AA` has factor 1e-10 and
//! `photlam` has factor 1e14 (photon s⁻¹ cm⁻² Å⁻¹ expressed per m³ s).

use std::collections::HashMap;
use std::f64::consts::PI;

use once_cell::sync::Lazy;

use super::dimension::Dimension;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitInfo {
    pub dimension: Dimension,
    pub to_si_factor: f64,
}

impl UnitInfo {
    const fn new(dimension: Dimension, to_si_factor: f64) -> Self {
        Self {
            dimension,
            to_si_factor,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SiPrefix {
    pub symbol: &'static str,
    pub factor: f64,
}

pub static SI_PREFIXES: &[SiPrefix] = &[
    SiPrefix {
        symbol: "T",
        factor: 1e12,
    },
    SiPrefix {
        symbol: "G",
        factor: 1e9,
    },
    SiPrefix {
        symbol: "M",
        factor: 1e6,
    },
    SiPrefix {
        symbol: "k",
        factor: 1e3,
    },
    SiPrefix {
        symbol: "c",
        factor: 1e-2,
    },
    SiPrefix {
        symbol: "m",
        factor: 1e-3,
    },
    SiPrefix {
        symbol: "u",
        factor: 1e-6,
    }, // 'u' for micro
    SiPrefix {
        symbol: "n",
        factor: 1e-9,
    },
    SiPrefix {
        symbol: "p",
        factor: 1e-12,
    },
    SiPrefix {
        symbol: "f",
        factor: 1e-15,
    },
];

pub static UNIT_REGISTRY: Lazy<UnitRegistry> = Lazy::new(UnitRegistry::new);

#[derive(Debug)]
pub struct UnitRegistry {
    units: HashMap<&'static str, UnitInfo>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
            aliases: HashMap::new(),
        };
        registry.register_base_units();
        registry.register_time_units();
        registry.register_angle_units();
        registry.register_count_units();
        registry.register_radiometric_units();
        registry
    }

    /// Resolve a symbol by exact match, then alias, then SI prefix.
    pub fn lookup(&self, symbol: &str) -> Option<UnitInfo> {
        if let Some(info) = self.units.get(symbol) {
            return Some(*info);
        }
        if let Some(canonical) = self.aliases.get(symbol) {
            return self.units.get(canonical).copied();
        }
        self.lookup_prefixed(symbol)
    }

    fn lookup_prefixed(&self, symbol: &str) -> Option<UnitInfo> {
        SI_PREFIXES.iter().find_map(|prefix| {
            let base_symbol = symbol.strip_prefix(prefix.symbol)?;
            let base = self.units.get(base_symbol).or_else(|| {
                self.aliases
                    .get(base_symbol)
                    .and_then(|canonical| self.units.get(canonical))
            })?;
            Some(UnitInfo::new(
                base.dimension,
                base.to_si_factor * prefix.factor,
            ))
        })
    }

    fn insert(&mut self, symbol: &'static str, dimension: Dimension, to_si_factor: f64) {
        self.units
            .insert(symbol, UnitInfo::new(dimension, to_si_factor));
    }

    fn alias(&mut self, aliases: &[&'static str], canonical: &'static str) {
        for alias in aliases {
            self.aliases.insert(*alias, canonical);
        }
    }

    fn register_base_units(&mut self) {
        self.insert("1", Dimension::dimensionless(), 1.0);
        self.alias(&["dimensionless"], "1");

        self.insert("g", Dimension::MASS, 1e-3);

        self.insert("m", Dimension::LENGTH, 1.0);
        self.insert("AA", Dimension::LENGTH, 1e-10);
        self.insert("micron", Dimension::LENGTH, 1e-6);
        self.alias(&["Angstrom", "angstrom", "Å"], "AA");
        self.alias(&["microns"], "micron");

        self.insert("K", Dimension::TEMPERATURE, 1.0);
    }

    fn register_time_units(&mut self) {
        self.insert("s", Dimension::TIME, 1.0);
        self.insert("min", Dimension::TIME, 60.0);
        self.insert("h", Dimension::TIME, 3600.0);
        self.alias(&["sec", "second", "seconds"], "s");
        self.alias(&["minute", "minutes"], "min");
        self.alias(&["hr", "hour", "hours"], "h");
    }

    fn register_angle_units(&mut self) {
        self.insert("rad", Dimension::ANGLE, 1.0);
        self.insert("deg", Dimension::ANGLE, PI / 180.0);
        self.insert("arcmin", Dimension::ANGLE, PI / 10_800.0);
        self.insert("arcsec", Dimension::ANGLE, PI / 648_000.0);
        self.alias(&["degree", "degrees"], "deg");
    }

    fn register_count_units(&mut self) {
        self.insert("photon", Dimension::COUNT, 1.0);
        self.insert("electron", Dimension::COUNT, 1.0);
        self.insert("adu", Dimension::COUNT, 1.0);
        self.insert("ct", Dimension::COUNT, 1.0);
        self.alias(&["ph", "photons"], "photon");
        self.alias(&["e", "electrons"], "electron");
        self.alias(&["ADU"], "adu");
        self.alias(&["count", "counts"], "ct");

        // Detector pixels do not carry a dimension of their own
        self.insert("pix", Dimension::dimensionless(), 1.0);
        self.alias(&["pixel", "pixels"], "pix");
    }

    fn register_radiometric_units(&mut self) {
        self.insert("J", Dimension::ENERGY, 1.0);
        self.insert("erg", Dimension::ENERGY, 1e-7);
        self.insert("W", Dimension::POWER, 1.0);
        self.insert("Hz", Dimension::FREQUENCY, 1.0);
        self.insert("Jy", Dimension::ENERGY_FNU, 1e-26);

        // photon s⁻¹ cm⁻² Å⁻¹
        self.insert("photlam", Dimension::PHOTON_FLUX_DENSITY, 1e14);
        // erg s⁻¹ cm⁻² Å⁻¹
        self.insert("flam", Dimension::ENERGY_FLUX_DENSITY, 1e7);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_exact_and_alias_lookup() {
        let aa = UNIT_REGISTRY.lookup("Angstrom").unwrap();
        assert_eq!(aa.dimension, Dimension::LENGTH);
        assert_relative_eq!(aa.to_si_factor, 1e-10);

        let ph = UNIT_REGISTRY.lookup("ph").unwrap();
        assert_eq!(ph.dimension, Dimension::COUNT);
    }

    #[test]
    fn test_prefixed_lookup() {
        let nm = UNIT_REGISTRY.lookup("nm").unwrap();
        assert_eq!(nm.dimension, Dimension::LENGTH);
        assert_relative_eq!(nm.to_si_factor, 1e-9);

        let mjy = UNIT_REGISTRY.lookup("mJy").unwrap();
        assert_relative_eq!(mjy.to_si_factor, 1e-29);

        let kg = UNIT_REGISTRY.lookup("kg").unwrap();
        assert_relative_eq!(kg.to_si_factor, 1.0);
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        // "min" must not resolve as milli-"in", "ph" must not be pico-hour
        let min = UNIT_REGISTRY.lookup("min").unwrap();
        assert_relative_eq!(min.to_si_factor, 60.0);
        let ph = UNIT_REGISTRY.lookup("ph").unwrap();
        assert_relative_eq!(ph.to_si_factor, 1.0);
    }

    #[test]
    fn test_unknown_symbol() {
        assert!(UNIT_REGISTRY.lookup("furlong").is_none());
        assert!(UNIT_REGISTRY.lookup("mag").is_none());
    }
}
