//! Parameter routing, validation and the descriptions returned to clients.

use approx::assert_relative_eq;
use calculator::{Calculator, CalculatorError, InstrumentError, ParamValue, ParameterError};
use serde_json::json;
use test_helpers::fixture::curve_file;
use test_helpers::Fixture;

fn calculator(fixture: &Fixture) -> Calculator {
    Calculator::from_dir(fixture.path()).expect("Failed to build calculator")
}

#[test]
fn test_bare_names_are_rerouted() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameter("airmass", 1.2).unwrap();
    assert_relative_eq!(calc.atmosphere().airmass(), 1.2);
    assert!(calc
        .results()
        .warnings
        .iter()
        .any(|w| w.contains("'atmosphere.airmass'")));

    calc.set_parameter("grating", "HIGH").unwrap();
    assert_eq!(calc.instrument().option("grating"), Some("HIGH"));

    calc.set_parameter("brightness", "18 magab").unwrap();
    assert_eq!(calc.source().brightness().value, 18.0);
}

#[test]
fn test_warnings_do_not_carry_over() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameter("seeing", "1 arcsec").unwrap();
    let rerouted = |calc: &Calculator| {
        calc.results()
            .warnings
            .iter()
            .any(|w| w.contains("'atmosphere.seeing'"))
    };
    assert!(rerouted(&calc));
    calc.set_parameter("atmosphere.seeing", "1.1 arcsec").unwrap();
    assert!(!rerouted(&calc));
}

#[test]
fn test_unknown_name_is_rejected() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    let err = calc.set_parameter("focal_length", "10 m").unwrap_err();
    assert!(matches!(
        err,
        CalculatorError::Parameter(ParameterError::UnknownParameter(ref name)) if name == "focal_length"
    ));
    assert!(calc.set_parameter("atmosphere.pressure", 1.0).is_err());
}

#[test]
fn test_source_alias_and_soft_type_failure() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameter("source", "power_law").unwrap();
    assert_eq!(calc.source().source_type(), "power_law");

    calc.set_parameter("source", "nebula").unwrap();
    assert_eq!(calc.source().source_type(), "power_law");
    assert!(calc
        .results()
        .warnings
        .iter()
        .any(|w| w.contains("nebula")));
}

#[test]
fn test_batch_collects_failures_and_applies_the_rest() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    let err = calc
        .set_parameters(vec![
            ("atmosphere.airmass", ParamValue::from(1.2)),
            ("dithers", ParamValue::from(0)),
            ("atmosphere.water_vapor", ParamValue::from("9 mm")),
            ("bogus", ParamValue::from(1)),
            ("coadds", ParamValue::from(3)),
        ])
        .unwrap_err();

    let CalculatorError::Batch(failures) = err else {
        panic!("expected a batch error");
    };
    let names = failures.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["dithers", "atmosphere.water_vapor", "bogus"]);
    assert!(matches!(
        failures[1].1,
        CalculatorError::Parameter(ParameterError::OutOfBounds { .. })
    ));

    assert_relative_eq!(calc.atmosphere().airmass(), 1.2);
    assert_eq!(calc.dithers(), 2);
    assert_eq!(calc.coadds(), 3);
    assert_eq!(calc.subexposures(), 6);
}

#[test]
fn test_batch_applies_type_before_its_parameters() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameters([("source.temperature", "3000 K"), ("source.type", "blackbody")])
        .unwrap();
    assert_eq!(calc.source().parameter("temperature"), Some(3000.0));
}

#[test]
fn test_batch_switches_instrument_before_band() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameters([
        ("source.wavelength_band", "H"),
        ("instrument.grating", "BLUE"),
        ("instrument", "optical"),
    ])
    .unwrap();
    assert_eq!(calc.instrument().key(), "optical");
    assert_eq!(calc.instrument().option("grating"), Some("BLUE"));
    assert_eq!(calc.source().wavelength_band(), "H");

    calc.set_parameters_json(&json!({ "instrument.name": "nir", "instrument.mode": "imaging" }))
        .unwrap();
    assert_eq!(calc.instrument().mode(), "imaging");
    assert_eq!(calc.source().wavelength_band(), "K");
}

#[test]
fn test_json_batch() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameters_json(&json!({
        "exposure": ["10 min", 1200],
        "instrument.binning": [2, 1],
        "source.redshift": 0.1
    }))
    .unwrap();
    assert_eq!(calc.exposure(), &[600.0, 1200.0]);
    assert_eq!(calc.instrument().binning(), [2, 1]);

    let err = calc
        .set_parameters_json(&json!({ "dithers": null, "reads": 4 }))
        .unwrap_err();
    assert!(matches!(err, CalculatorError::Batch(ref failures) if failures.len() == 1));
    assert_eq!(calc.reads(), 4);
}

#[test]
fn test_missing_curve_is_rejected_without_change() {
    let fixture = Fixture::new();
    fixture.remove_file("instrument/img_j.txt").unwrap();
    let mut calc = calculator(&fixture);
    calc.set_parameter("instrument.mode", "imaging").unwrap();
    assert_eq!(calc.instrument().option("filter"), Some("K"));
    assert_relative_eq!(calc.wavelengths()[0], 1950.0);
    assert_relative_eq!(calc.wavelengths()[calc.wavelengths().len() - 1], 2400.0);

    let err = calc.set_parameter("instrument.filter", "J").unwrap_err();
    assert!(matches!(
        err,
        CalculatorError::Instrument(InstrumentError::NoMatchingCurve { .. })
    ));
    assert_eq!(calc.instrument().option("filter"), Some("K"));
    assert_relative_eq!(calc.wavelengths()[0], 1950.0);
}

#[test]
fn test_ambiguous_curve_is_rejected() {
    let fixture = Fixture::new();
    fixture
        .write_file(
            "instrument/spec_high_copy.txt",
            curve_file(
                &[("mode", "spectroscopy"), ("grating", "HIGH")],
                1000.0,
                2400.0,
                |_| 0.3,
            ),
        )
        .unwrap();
    let mut calc = calculator(&fixture);
    let err = calc.set_parameter("instrument.grating", "HIGH").unwrap_err();
    assert!(matches!(
        err,
        CalculatorError::Instrument(InstrumentError::AmbiguousCurve { count: 2, .. })
    ));
    assert_eq!(calc.instrument().option("grating"), Some("LOW"));
}

#[test]
fn test_grating_change_regenerates_grid() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    calc.set_parameter("wavelengths", vec!["1.2 micron", "1.6 micron"]).unwrap();
    assert_eq!(calc.wavelengths().len(), 2);
    assert_relative_eq!(calc.wavelengths()[0], 1200.0, max_relative = 1e-12);

    calc.set_parameter("instrument.grating", "HIGH").unwrap();
    assert_eq!(calc.wavelengths().len(), test_helpers::fixture::WAVELENGTH_COUNT);
    assert_relative_eq!(calc.wavelengths()[0], 1000.0);
    assert_relative_eq!(calc.wavelengths()[calc.wavelengths().len() - 1], 2400.0);
}

#[test]
fn test_custom_slit() {
    let fixture = Fixture::new();
    let mut calc = calculator(&fixture);
    let wide = calc.results().source_count_adu[0][100];

    calc.set_parameter("instrument.slit", "0.5x20").unwrap();
    assert_eq!(calc.instrument().slit(), [0.5, 20.0]);
    assert!(calc.results().signal_noise_ratio[0][100].is_finite());
    assert_ne!(calc.results().source_count_adu[0][100], wide);

    calc.set_parameter("instrument.mode", "imaging").unwrap();
    assert!(calc.set_parameter("instrument.slit", "1x1").is_err());
    assert_eq!(calc.instrument().slit(), [2.0, 2.0]);
}

#[test]
fn test_get_parameters_describes_every_field() {
    let fixture = Fixture::new();
    let calc = calculator(&fixture);
    let parameters = calc.get_parameters();

    for key in [
        "target",
        "wavelengths",
        "exposure",
        "signal_noise_ratio",
        "dithers",
        "reads",
        "repeats",
        "coadds",
        "instrument.name",
        "instrument.mode",
        "instrument.slit",
        "instrument.binning",
        "source.type",
        "source.brightness",
        "source.wavelength_band",
        "atmosphere.airmass",
        "atmosphere.water_vapor",
        "atmosphere.seeing",
    ] {
        assert!(parameters.contains_key(key), "missing {key}");
    }

    let target = &parameters["target"];
    assert_eq!(target.value, json!("signal_noise_ratio"));
    assert_eq!(target.options[0].name, "Signal to Noise Ratio");
    assert_eq!(parameters["exposure"].unit.as_deref(), Some("s"));
    assert_eq!(parameters["atmosphere.airmass"].bounds, Some([1.0, 2.0]));

    let bands = parameters["source.wavelength_band"]
        .options
        .iter()
        .map(|option| option.value.clone())
        .collect::<Vec<_>>();
    assert!(bands.contains(&json!("K")));
    assert!(!bands.contains(&json!("V")));

    let types = &parameters["source.type"].options;
    assert!(types
        .iter()
        .any(|option| option.value == json!("qso") && option.name == "Quasar"));
}

#[test]
fn test_parameters_serialize() {
    let fixture = Fixture::new();
    let calc = calculator(&fixture);
    let json = serde_json::to_value(calc.get_parameters()).unwrap();
    assert_eq!(json["dithers"]["value"], json!(2));
    assert!(json["dithers"].get("unit").is_none());
    assert_eq!(json["atmosphere.seeing"]["unit"], json!("arcsec"));
}
