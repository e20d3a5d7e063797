//! Readers for tabulated spectra and grid cells.
//!
//! Atmosphere cells, throughput curves and source templates all arrive as a
//! table of named numeric columns plus a small metadata header. Two on-disk
//! forms are accepted:
//!
//! - tagged text tables (see [`text`])
//! - FITS binary tables (see [`fits`]), read through `fitsio`
//!
//! Both produce the same [`Table`].

pub mod fits;
pub mod text;

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("table has no column named any of {0:?}")]
    MissingColumn(Vec<String>),

    #[error("FITS error: {0}")]
    Fits(String),
}

/// One named column of numbers with an optional unit string.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub unit: Option<String>,
    pub values: Vec<f64>,
}

/// A set of equal-length columns and header metadata.
///
/// Metadata keys are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub meta: BTreeMap<String, String>,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First column whose name matches one of `aliases`, ignoring case.
    pub fn column(&self, aliases: &[&str]) -> Result<&Column, TableError> {
        aliases
            .iter()
            .find_map(|alias| {
                self.columns
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(alias))
            })
            .ok_or_else(|| TableError::MissingColumn(aliases.iter().map(|a| a.to_string()).collect()))
    }

    /// The column at `index`, for tables that name their columns loosely.
    pub fn column_at(&self, index: usize) -> Result<&Column, TableError> {
        self.columns
            .get(index)
            .ok_or_else(|| TableError::MissingColumn(vec![format!("#{index}")]))
    }

    /// First metadata value whose key matches one of `aliases`, ignoring case.
    pub fn meta_value(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .find_map(|alias| self.meta.get(&alias.to_lowercase()))
            .map(String::as_str)
    }
}

fn is_fits_name(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".fits", ".fit", ".fts"].iter().any(|ext| lower.ends_with(ext))
}

/// Parse raw bytes, choosing the format from the file extension.
pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Table, TableError> {
    if is_fits_name(filename) {
        fits::parse(bytes)
    } else {
        let text = std::str::from_utf8(bytes).map_err(|e| TableError::Malformed {
            line: 0,
            reason: format!("not UTF-8 text: {e}"),
        })?;
        text::parse(text)
    }
}

/// Read a table from disk.
pub fn read(path: &Path) -> Result<Table, TableError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if is_fits_name(&filename) {
        let table = fits::read(path)?;
        debug!("Loaded FITS table {} ({} rows)", path.display(), table.len());
        return Ok(table);
    }
    let bytes = std::fs::read(path).map_err(|source| TableError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let table = from_bytes(&bytes, &filename)?;
    debug!(
        "Loaded {} ({} columns, {} rows)",
        path.display(),
        table.columns.len(),
        table.len()
    );
    Ok(table)
}
