//! Command-line front end for the exposure time calculator
//!
//! Loads a configuration directory, applies `--set NAME=VALUE` overrides and
//! prints the results snapshot (or the parameter descriptions) as JSON.
//!
//! ```text
//! etc --config config --set source.brightness="18 magab" --set exposure='["600 s","1200 s"]'
//! etc --config config --set instrument=optical --set signal_noise_ratio=10 --pretty
//! etc --config config --template qso.fits --parameters
//! ```

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use calculator::{Calculator, ParamValue};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(
    name = "etc",
    about = "Signal-to-noise and exposure time calculator for a ground-based spectrograph",
    long_about = None
)]
struct Args {
    /// Directory holding settings.json and the data files
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// Parameter override as NAME=VALUE; VALUE may be JSON. Repeatable.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, ParamValue)>,

    /// Spectrum file (text or FITS table) to register and select as the source
    #[arg(long)]
    template: Option<PathBuf>,

    /// Print parameter descriptions instead of results
    #[arg(long)]
    parameters: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn parse_assignment(text: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{text}'"))?;
    Ok((name.trim().to_string(), ParamValue::from_cli(value.trim())))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut calc = Calculator::from_dir(&args.config)?;

    if let Some(path) = &args.template {
        let bytes = fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let key = calc.add_template(&bytes, &filename)?;
        info!("Selected template source type {key}");
    }

    if !args.set.is_empty() {
        calc.set_parameters(args.set)?;
    }

    let output = if args.parameters {
        serde_json::to_value(calc.get_parameters())?
    } else {
        serde_json::to_value(calc.results())?
    };
    let text = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{text}");
    Ok(())
}
