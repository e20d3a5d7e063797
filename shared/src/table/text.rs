//! Tagged text tables.
//!
//! ```text
//! # airmass: 1.5
//! # water_vapor: 3 mm
//! wavelength [nm]   transmission
//! 900.0             0.81
//! 910.0             0.83
//! ```
//!
//! Metadata lines start with `#` and hold `key: value` or `key = value`.
//! Other comment lines are ignored. The first non-comment line names the
//! columns; each name may carry a `[unit]` suffix. Remaining lines are
//! numeric rows separated by whitespace or commas.

use std::collections::BTreeMap;

use super::{Column, Table, TableError};

fn split_fields(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .collect()
}

fn parse_meta(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':').or_else(|| line.split_once('='))?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key.to_lowercase(), value.trim().to_string()))
}

/// Split the header line into `(name, unit)` pairs.
///
/// Units in brackets may contain spaces, so the header is scanned rather
/// than split.
fn parse_header(line: &str, line_no: usize) -> Result<Vec<(String, Option<String>)>, TableError> {
    let mut columns: Vec<(String, Option<String>)> = Vec::new();
    let mut rest = line.trim();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| TableError::Malformed {
                line: line_no,
                reason: "unclosed '[' in header".to_string(),
            })?;
            let unit = after[..close].trim().to_string();
            match columns.last_mut() {
                Some((_, slot @ None)) => *slot = Some(unit),
                _ => {
                    return Err(TableError::Malformed {
                        line: line_no,
                        reason: format!("unit [{unit}] does not follow a column name"),
                    })
                }
            }
            rest = after[close + 1..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
            continue;
        }
        let end = rest
            .find(|c: char| c == ',' || c == '[' || c.is_whitespace())
            .unwrap_or(rest.len());
        columns.push((rest[..end].to_string(), None));
        rest = rest[end..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }
    Ok(columns)
}

/// Parse the text of a tagged table.
pub fn parse(text: &str) -> Result<Table, TableError> {
    let mut meta = BTreeMap::new();
    let mut header: Option<Vec<(String, Option<String>)>> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some((key, value)) = parse_meta(comment) {
                meta.insert(key, value);
            }
            continue;
        }

        let Some(columns) = header.as_ref() else {
            header = Some(parse_header(line, line_no)?);
            continue;
        };

        let fields = split_fields(line);
        if fields.len() != columns.len() {
            return Err(TableError::Malformed {
                line: line_no,
                reason: format!("expected {} fields, found {}", columns.len(), fields.len()),
            });
        }
        let row = fields
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| TableError::Malformed {
                    line: line_no,
                    reason: format!("'{field}' is not a number"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    let header = header.ok_or_else(|| TableError::Malformed {
        line: 0,
        reason: "no column header".to_string(),
    })?;

    let columns = header
        .into_iter()
        .enumerate()
        .map(|(col, (name, unit))| Column {
            name,
            unit,
            values: rows.iter().map(|row| row[col]).collect(),
        })
        .collect();

    Ok(Table { meta, columns })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata_and_units() {
        let table = parse(
            "# airmass: 1.5\n\
             # WATER_VAPOR = 3 mm\n\
             # free comment without a tag\n\
             wavelength [nm]  emission [photon / (s arcsec2 nm m2)]\n\
             900 12.5\n\
             910, 13.0\n",
        )
        .unwrap();

        assert_eq!(table.meta.get("airmass").map(String::as_str), Some("1.5"));
        assert_eq!(table.meta_value(&["water_vapor"]), Some("3 mm"));
        assert_eq!(table.meta.len(), 2);

        let emission = table.column(&["emission"]).unwrap();
        assert_eq!(emission.unit.as_deref(), Some("photon / (s arcsec2 nm m2)"));
        assert_eq!(emission.values, vec![12.5, 13.0]);
        assert_eq!(table.column(&["wavelength"]).unwrap().values, vec![900.0, 910.0]);
    }

    #[test]
    fn test_header_without_units() {
        let table = parse("wave,flux\n1,2\n3,4\n").unwrap();
        assert_eq!(table.columns.len(), 2);
        assert!(table.columns.iter().all(|c| c.unit.is_none()));
        assert_eq!(table.column(&["FLUX"]).unwrap().values, vec![2.0, 4.0]);
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let err = parse("a b\n1 2\n3\n").unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 3, .. }));
    }

    #[test]
    fn test_non_numeric_row_is_rejected() {
        let err = parse("a b\n1 two\n").unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            parse("# only: comments\n"),
            Err(TableError::Malformed { .. })
        ));
    }
}
