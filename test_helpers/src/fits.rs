//! Writer for small FITS binary tables.
//!
//! Produces an empty primary HDU followed by a single `BINTABLE` extension
//! whose columns are all 64-bit floats.

/// Pad a header card to 80 characters.
fn card(text: &str) -> String {
    format!("{text:<80}")
}

fn value_card(key: &str, value: &str) -> String {
    let is_number = value.parse::<f64>().is_ok();
    let is_logical = value == "T" || value == "F";
    if is_number || is_logical {
        card(&format!("{key:<8}= {value:>20}"))
    } else {
        let quoted = format!("'{}'", value.replace('\'', "''"));
        card(&format!("{key:<8}= {quoted:<20}"))
    }
}

/// Close a header with END and pad it to whole 2880-byte blocks.
fn finish_header(mut header: String) -> Vec<u8> {
    header.push_str(&card("END"));
    let padding_needed = (2880 - (header.len() % 2880)) % 2880;
    header.push_str(&" ".repeat(padding_needed));
    header.into_bytes()
}

/// Encode a FITS file holding one binary table.
///
/// `meta` entries become header cards on the table extension. Each column is
/// `(name, unit, values)`; an empty unit omits the `TUNITn` card. All columns
/// must have the same length.
pub fn bintable_bytes(meta: &[(&str, &str)], columns: &[(&str, &str, Vec<f64>)]) -> Vec<u8> {
    let rows = columns.first().map_or(0, |(_, _, values)| values.len());
    assert!(
        columns.iter().all(|(_, _, values)| values.len() == rows),
        "all columns must have the same length"
    );

    let mut primary = String::new();
    primary.push_str(&value_card("SIMPLE", "T"));
    primary.push_str(&value_card("BITPIX", "8"));
    primary.push_str(&value_card("NAXIS", "0"));
    primary.push_str(&value_card("EXTEND", "T"));
    let mut bytes = finish_header(primary);

    let mut header = String::new();
    header.push_str(&value_card("XTENSION", "BINTABLE"));
    header.push_str(&value_card("BITPIX", "8"));
    header.push_str(&value_card("NAXIS", "2"));
    header.push_str(&value_card("NAXIS1", &(columns.len() * 8).to_string()));
    header.push_str(&value_card("NAXIS2", &rows.to_string()));
    header.push_str(&value_card("PCOUNT", "0"));
    header.push_str(&value_card("GCOUNT", "1"));
    header.push_str(&value_card("TFIELDS", &columns.len().to_string()));
    for (n, (name, unit, _)) in columns.iter().enumerate() {
        header.push_str(&value_card(&format!("TTYPE{}", n + 1), name));
        header.push_str(&value_card(&format!("TFORM{}", n + 1), "1D"));
        if !unit.is_empty() {
            header.push_str(&value_card(&format!("TUNIT{}", n + 1), unit));
        }
    }
    for (key, value) in meta {
        header.push_str(&value_card(&key.to_uppercase(), value));
    }
    bytes.extend(finish_header(header));

    // Row-major, big-endian
    let data_start = bytes.len();
    for row in 0..rows {
        for (_, _, values) in columns {
            bytes.extend_from_slice(&values[row].to_be_bytes());
        }
    }
    let data_len = bytes.len() - data_start;
    let data_padding = (2880 - (data_len % 2880)) % 2880;
    bytes.extend(std::iter::repeat(0u8).take(data_padding));
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_aligned() {
        let bytes = bintable_bytes(&[("MODE", "imaging")], &[("WAVE", "nm", vec![1.0, 2.0])]);
        assert_eq!(bytes.len() % 2880, 0);
        assert_eq!(&bytes[..6], b"SIMPLE");
        assert_eq!(&bytes[2880..2888], b"XTENSION");
    }

    #[test]
    fn test_string_cards_are_quoted() {
        assert!(value_card("MODE", "imaging").contains("'imaging'"));
        assert!(value_card("NAXIS1", "16").ends_with(' '));
        assert_eq!(value_card("NAXIS1", "16").len(), 80);
    }
}
