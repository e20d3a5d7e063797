//! FITS binary-table reader.
//!
//! The first extension HDU must be a binary table. Every column that reads
//! as 64-bit floats becomes a [`Column`]; `TUNITn` cards supply units. Only
//! the keywords in [`HEADER_KEYWORDS`] are copied into the table metadata,
//! looked up on the table HDU first and then on the primary HDU.

use std::io::Write;
use std::path::Path;

use fitsio::compat::hdu::HduInfo;
use fitsio::compat::fitsfile::FitsFile;
use log::debug;
use tempfile::NamedTempFile;

use super::{Column, Table, TableError};

/// FITS block size; the primary and table headers take at least one each.
const BLOCK: u64 = 2880;

/// Header keywords consumed by atmosphere cells, throughput curves and
/// templates.
pub const HEADER_KEYWORDS: [&str; 11] = [
    "AIRMASS", "VAPOR", "PWV", "MODE", "GRATING", "GRISM", "FILTER", "DICHROIC", "SLIT",
    "BINNING", "EXTNAME",
];

fn fits_error(e: fitsio::compat::errors::Error) -> TableError {
    TableError::Fits(e.to_string())
}

/// Read an optional keyword as text. Absent keywords are `None`.
fn optional_key(fptr: &mut FitsFile, hdu: &fitsio::compat::hdu::FitsHdu, keyword: &str) -> Option<String> {
    hdu.read_key::<String>(fptr, keyword)
        .ok()
        .map(|value| value.trim().to_string())
}

fn required_count(fptr: &mut FitsFile, hdu: &fitsio::compat::hdu::FitsHdu, keyword: &str) -> Result<u64, TableError> {
    let raw = optional_key(fptr, hdu, keyword)
        .ok_or_else(|| TableError::Fits(format!("missing {keyword} keyword")))?;
    let value = raw
        .parse::<i64>()
        .map_err(|_| TableError::Fits(format!("{keyword} = '{raw}' is not an integer")))?;
    u64::try_from(value).map_err(|_| TableError::Fits(format!("{keyword} = {value} is negative")))
}

/// Decode the first binary table extension of the file at `path`.
pub fn read(path: &Path) -> Result<Table, TableError> {
    let file_len = std::fs::metadata(path)
        .map_err(|source| TableError::Io {
            path: path.display().to_string(),
            source,
        })?
        .len();

    let mut fptr = FitsFile::open(path).map_err(fits_error)?;
    let primary = fptr.hdu(0).map_err(fits_error)?;
    let hdu = fptr
        .hdu(1)
        .map_err(|e| TableError::Fits(format!("no table extension: {e}")))?;

    let (names, num_rows) = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            num_rows,
        } => (
            column_descriptions
                .iter()
                .map(|cd| cd.name.clone())
                .collect::<Vec<_>>(),
            *num_rows,
        ),
        _ => return Err(TableError::Fits("first extension is not a table".to_string())),
    };

    // Header sizes are trusted only as far as the bytes on disk back them.
    let data_len = file_len.saturating_sub(2 * BLOCK);
    let row_bytes = required_count(&mut fptr, &hdu, "NAXIS1")?;
    let rows = required_count(&mut fptr, &hdu, "NAXIS2")?;
    let table_bytes = row_bytes
        .checked_mul(rows)
        .filter(|&size| size <= data_len)
        .ok_or_else(|| {
            TableError::Fits(format!(
                "table of {rows} rows x {row_bytes} bytes does not fit in {data_len} bytes of data"
            ))
        })?;
    if rows != num_rows as u64 || table_bytes == 0 {
        return Err(TableError::Fits("table row count is inconsistent".to_string()));
    }

    let mut columns = Vec::with_capacity(names.len());
    for (n, name) in names.into_iter().enumerate() {
        let values = match hdu.read_col::<f64>(&mut fptr, &name) {
            Ok(values) => values,
            Err(e) => {
                debug!("Skipping FITS column {name}: {e}");
                continue;
            }
        };
        let unit = optional_key(&mut fptr, &hdu, &format!("TUNIT{}", n + 1)).filter(|u| !u.is_empty());
        columns.push(Column { name, unit, values });
    }
    if columns.is_empty() {
        return Err(TableError::Fits("table has no numeric columns".to_string()));
    }

    let mut meta = std::collections::BTreeMap::new();
    for keyword in HEADER_KEYWORDS {
        let value = optional_key(&mut fptr, &hdu, keyword)
            .or_else(|| optional_key(&mut fptr, &primary, keyword));
        if let Some(value) = value {
            meta.insert(keyword.to_lowercase(), value);
        }
    }

    Ok(Table { meta, columns })
}

/// Decode FITS bytes held in memory, such as an uploaded template.
pub fn parse(bytes: &[u8]) -> Result<Table, TableError> {
    let io_error = |source| TableError::Io {
        path: "uploaded FITS".to_string(),
        source,
    };
    let mut file = NamedTempFile::new().map_err(io_error)?;
    file.write_all(bytes).map_err(io_error)?;
    file.flush().map_err(io_error)?;
    read(file.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rewrite the value of an integer card in place.
    fn patch_card(bytes: &mut [u8], keyword: &str, value: &str) {
        let card = format!("{keyword:<8}= {value:>20}");
        let start = bytes
            .chunks(80)
            .position(|chunk| chunk.starts_with(format!("{keyword:<8}=").as_bytes()))
            .expect("card present")
            * 80;
        bytes[start..start + card.len()].copy_from_slice(card.as_bytes());
    }

    #[test]
    fn test_parse_bintable() {
        let bytes = test_helpers::fits::bintable_bytes(
            &[("AIRMASS", "2.0"), ("VAPOR", "3 mm")],
            &[
                ("WAVELENGTH", "nm", vec![900.0, 910.0, 920.0]),
                ("TRANSMISSION", "", vec![0.5, 0.25, 0.125]),
            ],
        );
        let table = parse(&bytes).unwrap();
        assert_eq!(table.meta_value(&["airmass"]).map(|v| v.parse::<f64>().unwrap()), Some(2.0));
        assert_eq!(table.meta_value(&["vapor"]), Some("3 mm"));
        let wave = table.column(&["wavelength"]).unwrap();
        assert_eq!(wave.unit.as_deref(), Some("nm"));
        assert_eq!(wave.values, vec![900.0, 910.0, 920.0]);
        let trans = table.column(&["transmission"]).unwrap();
        assert!(trans.unit.is_none());
        assert_eq!(trans.values, vec![0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_truncated_file() {
        let mut bytes = test_helpers::fits::bintable_bytes(
            &[],
            &[("WAVELENGTH", "nm", vec![1.0; 600])],
        );
        bytes.truncate(bytes.len() - 2880);
        assert!(parse(&bytes).is_err());
        assert!(parse(b"not a fits file").is_err());
    }

    #[test]
    fn test_oversized_table_header_is_rejected() {
        let mut bytes = test_helpers::fits::bintable_bytes(
            &[],
            &[("WAVELENGTH", "nm", vec![1.0, 2.0, 3.0])],
        );
        patch_card(&mut bytes, "NAXIS1", "4294967296");
        patch_card(&mut bytes, "NAXIS2", "4294967296");
        assert!(parse(&bytes).is_err());

        let mut bytes = test_helpers::fits::bintable_bytes(
            &[],
            &[("WAVELENGTH", "nm", vec![1.0, 2.0, 3.0])],
        );
        patch_card(&mut bytes, "NAXIS2", "9223372036854775807");
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn test_garbage_after_primary_header_is_rejected() {
        let mut bytes = test_helpers::fits::bintable_bytes(
            &[],
            &[("WAVELENGTH", "nm", vec![1.0, 2.0])],
        );
        for byte in bytes.iter_mut().skip(2880) {
            *byte = 0xff;
        }
        assert!(parse(&bytes).is_err());
    }
}
