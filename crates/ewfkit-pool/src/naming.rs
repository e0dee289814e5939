//! Segment file naming
//!
//! Multi-segment images roll their filename extension: the first segment is
//! `.E01`, segments 2-99 count up to `.E99`, segment 100 becomes `.EAA` and
//! subsequent segments count through `.EZZ`, `.FAA` and so on up to `.ZZZ`
//! (segment 14971). Logical evidence chains use `L`, SMART uses lowercase
//! `s`, and the Ex01 dialect uses lowercase `e`.

use ewfkit_core::{Error, Result};

/// Extension scheme of a segment chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// `.E01`, `.E02`, ... (EWF-E01 family)
    E01,
    /// `.L01`, `.L02`, ... (logical evidence)
    L01,
    /// `.s01`, `.s02`, ... (SMART)
    S01,
    /// `.e01`, `.e02`, ... (Ex01)
    Ex01,
}

impl NamingScheme {
    /// Scheme for a first-segment extension, if recognized
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "E01" => Some(NamingScheme::E01),
            "L01" => Some(NamingScheme::L01),
            "s01" => Some(NamingScheme::S01),
            "e01" => Some(NamingScheme::Ex01),
            _ => None,
        }
    }

    fn first_character(&self) -> u8 {
        match self {
            NamingScheme::E01 => b'E',
            NamingScheme::L01 => b'L',
            NamingScheme::S01 => b's',
            NamingScheme::Ex01 => b'e',
        }
    }

    fn is_upper_case(&self) -> bool {
        matches!(self, NamingScheme::E01 | NamingScheme::L01)
    }
}

/// Highest segment number any scheme can express (`.ZZZ` / `.zzz`)
pub const MAX_SEGMENT_NUMBER: u16 = 14971;

/// Compute the filename extension for a 1-based segment number
pub fn segment_extension(segment_number: u16, scheme: NamingScheme) -> Result<String> {
    if segment_number == 0 {
        return Err(Error::argument("segment number 0 is not valid"));
    }
    let first = scheme.first_character();
    let mut extension = [0u8; 3];

    if segment_number < 100 {
        extension[0] = first;
        extension[1] = b'0' + (segment_number / 10) as u8;
        extension[2] = b'0' + (segment_number % 10) as u8;
    } else {
        let base = if scheme.is_upper_case() { b'A' } else { b'a' };
        let mut remainder = (segment_number - 100) as u32;

        extension[2] = base + (remainder % 26) as u8;
        remainder /= 26;
        extension[1] = base + (remainder % 26) as u8;
        remainder /= 26;
        extension[0] = first + remainder as u8;

        let last = if scheme.is_upper_case() { b'Z' } else { b'z' };
        if extension[0] > last {
            return Err(Error::argument(format!(
                "segment number {} exceeds the naming scheme maximum",
                segment_number
            )));
        }
    }
    // All three bytes are ASCII by construction.
    Ok(String::from_utf8(extension.to_vec()).expect("extension is ASCII"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_digit_extensions() {
        assert_eq!(segment_extension(1, NamingScheme::E01).unwrap(), "E01");
        assert_eq!(segment_extension(99, NamingScheme::E01).unwrap(), "E99");
        assert_eq!(segment_extension(1, NamingScheme::L01).unwrap(), "L01");
        assert_eq!(segment_extension(1, NamingScheme::S01).unwrap(), "s01");
        assert_eq!(segment_extension(1, NamingScheme::Ex01).unwrap(), "e01");
    }

    #[test]
    fn test_alphabetic_rollover() {
        assert_eq!(segment_extension(100, NamingScheme::E01).unwrap(), "EAA");
        assert_eq!(segment_extension(125, NamingScheme::E01).unwrap(), "EAZ");
        assert_eq!(segment_extension(126, NamingScheme::E01).unwrap(), "EBA");
        assert_eq!(segment_extension(776, NamingScheme::E01).unwrap(), "FAA");
        assert_eq!(segment_extension(14296, NamingScheme::E01).unwrap(), "ZAA");
        assert_eq!(segment_extension(14971, NamingScheme::E01).unwrap(), "ZZZ");
    }

    #[test]
    fn test_lowercase_rollover() {
        assert_eq!(segment_extension(100, NamingScheme::S01).unwrap(), "saa");
        assert_eq!(segment_extension(100, NamingScheme::Ex01).unwrap(), "eaa");
    }

    #[test]
    fn test_out_of_range() {
        assert!(segment_extension(0, NamingScheme::E01).is_err());
        assert!(segment_extension(14972, NamingScheme::E01).is_err());
    }

    #[test]
    fn test_scheme_detection() {
        assert_eq!(NamingScheme::from_extension("E01"), Some(NamingScheme::E01));
        assert_eq!(NamingScheme::from_extension("s01"), Some(NamingScheme::S01));
        assert_eq!(NamingScheme::from_extension("S01"), None);
        assert_eq!(NamingScheme::from_extension("img"), None);
    }
}
