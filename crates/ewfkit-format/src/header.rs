//! Header value serialization
//!
//! Acquisition metadata travels in zlib-compressed text tables. The
//! `header` section is codepage text (governed by the handle's header
//! codepage); `header2` and `xheader` are UTF-16LE with a BOM. The table
//! itself is line oriented: a format line, a `main` line, a tab-separated
//! identifier row and a tab-separated value row.
//!
//! Identifiers are short on disk (`c`, `n`, `av`, ...) and long in memory
//! (`case_number`, `evidence_number`, ...); translation happens here.

use crate::codec::{deflate_compress, deflate_decompress};
use ewfkit_core::{Error, Result};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Header codepage selection for the `header` section
///
/// `header2` and `xheader` are always UTF-16 and ignore this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderCodepage {
    /// 7-bit ASCII
    Ascii,
    /// Windows-1250 (Central European)
    Windows1250,
    /// Windows-1251 (Cyrillic)
    Windows1251,
    /// Windows-1252 (Western European)
    #[default]
    Windows1252,
    /// Windows-1253 (Greek)
    Windows1253,
    /// Windows-1254 (Turkish)
    Windows1254,
    /// Windows-1255 (Hebrew)
    Windows1255,
    /// Windows-1256 (Arabic)
    Windows1256,
    /// Windows-1257 (Baltic)
    Windows1257,
    /// Windows-1258 (Vietnamese)
    Windows1258,
}

impl HeaderCodepage {
    /// Codepage from its conventional name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ascii" => Some(Self::Ascii),
            "windows-1250" => Some(Self::Windows1250),
            "windows-1251" => Some(Self::Windows1251),
            "windows-1252" => Some(Self::Windows1252),
            "windows-1253" => Some(Self::Windows1253),
            "windows-1254" => Some(Self::Windows1254),
            "windows-1255" => Some(Self::Windows1255),
            "windows-1256" => Some(Self::Windows1256),
            "windows-1257" => Some(Self::Windows1257),
            "windows-1258" => Some(Self::Windows1258),
            _ => None,
        }
    }

    /// Conventional name of the codepage
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Windows1250 => "windows-1250",
            Self::Windows1251 => "windows-1251",
            Self::Windows1252 => "windows-1252",
            Self::Windows1253 => "windows-1253",
            Self::Windows1254 => "windows-1254",
            Self::Windows1255 => "windows-1255",
            Self::Windows1256 => "windows-1256",
            Self::Windows1257 => "windows-1257",
            Self::Windows1258 => "windows-1258",
        }
    }

    fn encoding(&self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            Self::Ascii => None,
            Self::Windows1250 => Some(encoding_rs::WINDOWS_1250),
            Self::Windows1251 => Some(encoding_rs::WINDOWS_1251),
            Self::Windows1252 => Some(encoding_rs::WINDOWS_1252),
            Self::Windows1253 => Some(encoding_rs::WINDOWS_1253),
            Self::Windows1254 => Some(encoding_rs::WINDOWS_1254),
            Self::Windows1255 => Some(encoding_rs::WINDOWS_1255),
            Self::Windows1256 => Some(encoding_rs::WINDOWS_1256),
            Self::Windows1257 => Some(encoding_rs::WINDOWS_1257),
            Self::Windows1258 => Some(encoding_rs::WINDOWS_1258),
        }
    }

    /// Encode UTF-8 text into this codepage
    pub fn encode_text(&self, text: &str) -> Result<Vec<u8>> {
        match self.encoding() {
            None => {
                if !text.is_ascii() {
                    return Err(Error::encoding(
                        "header text contains non-ASCII characters under the ascii codepage",
                    ));
                }
                Ok(text.as_bytes().to_vec())
            }
            Some(encoding) => {
                let (bytes, _, had_unmappable) = encoding.encode(text);
                if had_unmappable {
                    return Err(Error::encoding(format!(
                        "header text contains characters unmappable to {}",
                        self.name()
                    )));
                }
                Ok(bytes.into_owned())
            }
        }
    }

    /// Decode codepage bytes into UTF-8 text
    pub fn decode_text(&self, bytes: &[u8]) -> String {
        match self.encoding() {
            None => String::from_utf8_lossy(bytes).into_owned(),
            Some(encoding) => {
                let (text, _, _) = encoding.decode(bytes);
                text.into_owned()
            }
        }
    }
}

/// Encode UTF-8 text as BOM-prefixed UTF-16LE
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 + text.len() * 2);
    bytes.extend_from_slice(&[0xFF, 0xFE]);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Decode UTF-16LE bytes (optionally BOM-prefixed) into UTF-8 text
pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    let body = bytes.strip_prefix(&[0xFF, 0xFE]).unwrap_or(bytes);
    if body.len() % 2 != 0 {
        return Err(Error::encoding("UTF-16 text has an odd byte count"));
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| Error::encoding(format!("invalid UTF-16 text: {}", e)))
}

/// Translation between short on-disk identifiers and long API names
///
/// Order matters: it is the serialization order of known identifiers.
const IDENTIFIER_TABLE: &[(&str, &str)] = &[
    ("c", "case_number"),
    ("n", "evidence_number"),
    ("a", "description"),
    ("e", "examiner_name"),
    ("t", "notes"),
    ("md", "model"),
    ("sn", "serial_number"),
    ("av", "acquiry_software_version"),
    ("ov", "acquiry_operating_system"),
    ("m", "acquiry_date"),
    ("u", "system_date"),
    ("p", "password"),
    ("r", "compression_level"),
];

/// Long API name for a short identifier, if known
pub fn long_identifier(short: &str) -> Option<&'static str> {
    IDENTIFIER_TABLE
        .iter()
        .find(|(s, _)| *s == short)
        .map(|(_, l)| *l)
}

/// Short on-disk identifier for a long API name, if known
pub fn short_identifier(long: &str) -> Option<&'static str> {
    IDENTIFIER_TABLE
        .iter()
        .find(|(_, l)| *l == long)
        .map(|(s, _)| *s)
}

/// Known long identifiers in serialization order
pub const KNOWN_HEADER_IDENTIFIERS: &[&str] = &[
    "case_number",
    "evidence_number",
    "description",
    "examiner_name",
    "notes",
    "model",
    "serial_number",
    "acquiry_software_version",
    "acquiry_operating_system",
    "acquiry_date",
    "system_date",
    "password",
    "compression_level",
];

/// Build the line-oriented value table
///
/// `values` are (long identifier, value) pairs. Known identifiers are
/// written in table order under their short codes; unknown identifiers
/// follow verbatim.
fn build_value_table(format_line: &str, values: &[(String, String)]) -> String {
    let mut identifiers: Vec<&str> = Vec::with_capacity(values.len());
    let mut row_values: Vec<&str> = Vec::with_capacity(values.len());

    for (short, long) in IDENTIFIER_TABLE {
        if let Some((_, value)) = values.iter().find(|(id, _)| id.as_str() == *long) {
            identifiers.push(*short);
            row_values.push(value.as_str());
        }
    }
    for (id, value) in values {
        if short_identifier(id).is_none() {
            identifiers.push(id.as_str());
            row_values.push(value.as_str());
        }
    }
    format!(
        "{}\nmain\n{}\n{}\n\n",
        format_line,
        identifiers.join("\t"),
        row_values.join("\t")
    )
}

/// Parse the value table into (long identifier, value) pairs
///
/// Accepts the canonical two-row form and, as a fallback, the
/// one-pair-per-line form used by early images. Short identifiers are
/// translated to their long names; unknown identifiers pass through.
fn parse_value_table(text: &str) -> Vec<(String, String)> {
    let lines: Vec<&str> = text
        .lines()
        .map(|line| line.trim_start_matches('\u{FEFF}').trim_end_matches('\r'))
        .filter(|line| !line.trim_matches('\0').is_empty())
        .collect();

    // Canonical form: the identifier and value rows follow the `main`
    // line. Either row may hold a single column, so tabs alone cannot
    // locate them.
    if let Some(anchor) = lines.iter().position(|line| line.trim() == "main") {
        if lines.len() > anchor + 2 {
            return zip_rows(lines[anchor + 1], lines[anchor + 2]);
        }
    }

    // Older images: the table is the first pair of consecutive tabbed
    // lines.
    for window in 0..lines.len().saturating_sub(1) {
        if lines[window].contains('\t') && lines[window + 1].contains('\t') {
            return zip_rows(lines[window], lines[window + 1]);
        }
    }

    // Fallback: identifier<TAB>value per line.
    let mut pairs = Vec::new();
    for line in lines {
        if let Some((id, value)) = line.split_once('\t') {
            let id = id.trim_matches('\0');
            let long = long_identifier(id).map(str::to_string).unwrap_or_else(|| id.to_string());
            pairs.push((long, value.trim_matches('\0').to_string()));
        }
    }
    pairs
}

/// Pair up an identifier row with its value row
fn zip_rows(identifier_row: &str, value_row: &str) -> Vec<(String, String)> {
    identifier_row
        .split('\t')
        .zip(value_row.split('\t'))
        .map(|(id, value)| {
            let id = id.trim_matches('\0');
            let long = long_identifier(id)
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string());
            (long, value.trim_matches('\0').to_string())
        })
        .collect()
}

/// Serialize a `header` section payload (compressed codepage text)
pub fn encode_header(values: &[(String, String)], codepage: HeaderCodepage) -> Result<Vec<u8>> {
    let text = build_value_table("1", values);
    let bytes = codepage.encode_text(&text)?;
    let (compressed, _) = deflate_compress(&bytes, 6)?;
    Ok(compressed)
}

/// Serialize a `header2` or `xheader` section payload (compressed UTF-16)
pub fn encode_header2(values: &[(String, String)]) -> Result<Vec<u8>> {
    let text = build_value_table("3", values);
    let bytes = encode_utf16le(&text);
    let (compressed, _) = deflate_compress(&bytes, 6)?;
    Ok(compressed)
}

/// Parse a `header` section payload
pub fn parse_header(payload: &[u8], codepage: HeaderCodepage) -> Result<Vec<(String, String)>> {
    let bytes = inflate_all(payload)?;
    let text = codepage.decode_text(&bytes);
    Ok(parse_value_table(&text))
}

/// Parse a `header2` or `xheader` section payload
pub fn parse_header2(payload: &[u8]) -> Result<Vec<(String, String)>> {
    let bytes = inflate_all(payload)?;
    let text = decode_utf16le(&bytes)?;
    Ok(parse_value_table(&text))
}

/// Inflate a compressed text payload whose expanded size is unknown
fn inflate_all(payload: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| Error::bad_section_header(format!("header inflation failed: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_values() -> Vec<(String, String)> {
        vec![
            ("case_number".to_string(), "2024-117".to_string()),
            ("examiner_name".to_string(), "J. Doe".to_string()),
            ("notes".to_string(), "front office workstation".to_string()),
            ("acquiry_date".to_string(), "2024 3 9 13 6 27".to_string()),
        ]
    }

    #[test]
    fn test_header_roundtrip() {
        let values = sample_values();
        let payload = encode_header(&values, HeaderCodepage::Windows1252).unwrap();
        let parsed = parse_header(&payload, HeaderCodepage::Windows1252).unwrap();
        for pair in &values {
            assert!(parsed.contains(pair), "missing {:?}", pair);
        }
    }

    #[test]
    fn test_header2_roundtrip() {
        let mut values = sample_values();
        values.push(("custom_field".to_string(), "Zürich".to_string()));
        let payload = encode_header2(&values).unwrap();
        let parsed = parse_header2(&payload).unwrap();
        for pair in &values {
            assert!(parsed.contains(pair), "missing {:?}", pair);
        }
    }

    #[test]
    fn test_identifier_translation() {
        assert_eq!(long_identifier("c"), Some("case_number"));
        assert_eq!(long_identifier("av"), Some("acquiry_software_version"));
        assert_eq!(short_identifier("examiner_name"), Some("e"));
        assert_eq!(long_identifier("zz"), None);
    }

    #[test]
    fn test_single_value_roundtrip() {
        let values = vec![("case_number".to_string(), "2024-117".to_string())];
        let payload = encode_header(&values, HeaderCodepage::Windows1252).unwrap();
        let parsed = parse_header(&payload, HeaderCodepage::Windows1252).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_parse_fallback_line_form() {
        let text = "case header\nc\t2024-117\n";
        let pairs = parse_value_table(text);
        assert_eq!(
            pairs,
            vec![("case_number".to_string(), "2024-117".to_string())]
        );
    }

    #[test]
    fn test_ascii_codepage_rejects_non_ascii() {
        let values = vec![("notes".to_string(), "Zürich".to_string())];
        assert!(matches!(
            encode_header(&values, HeaderCodepage::Ascii),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_utf16_roundtrip() {
        let text = "main\nc\tπ-case\n";
        let bytes = encode_utf16le(text);
        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        assert_eq!(decode_utf16le(&bytes).unwrap(), text);
    }

    #[test]
    fn test_utf16_odd_length_rejected() {
        assert!(matches!(
            decode_utf16le(&[0xFF, 0xFE, 0x41]),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_codepage_names() {
        assert_eq!(
            HeaderCodepage::from_name("windows-1251"),
            Some(HeaderCodepage::Windows1251)
        );
        assert_eq!(HeaderCodepage::Windows1252.name(), "windows-1252");
        assert_eq!(HeaderCodepage::from_name("utf-32"), None);
    }
}
