//! Dialect detection
//!
//! The dialect is determined from the first segment file: its magic
//! family, the first section's tag, and the pattern of `volume`, `disk`,
//! `header2`, `xheader` and `digest` sections. Detection runs once at open
//! time; the result is immutable for the image.

use crate::section::{scan_segment, MagicFamily, Section, SectionKind};
use crate::volume::VolumePayload;
use ewfkit_core::{Dialect, Error, Result, SegmentPool};

/// Detect the dialect of an image from its first segment
pub fn detect_dialect<P: SegmentPool + ?Sized>(pool: &mut P) -> Result<Dialect> {
    if pool.count() == 0 {
        return Err(Error::argument("cannot detect dialect of an empty pool"));
    }
    let (header, sections) = scan_segment(pool, 0)?;
    let dialect = detect_from_sections(header.family, &sections)?;
    tracing::debug!(%dialect, "detected dialect");
    Ok(dialect)
}

/// Classify from the magic family and the first segment's section pattern
pub fn detect_from_sections(family: MagicFamily, sections: &[Section]) -> Result<Dialect> {
    match family {
        MagicFamily::Evf2 => return Ok(Dialect::Ex01),
        MagicFamily::Lvf => return Ok(Dialect::L01),
        MagicFamily::Evf => {}
    }

    let first_kind = sections
        .first()
        .map(|section| &section.kind)
        .ok_or_else(|| Error::unsupported("segment contains no sections"))?;

    let has = |kind: &SectionKind| sections.iter().any(|section| &section.kind == kind);
    let smart_volume = sections.iter().any(|section| {
        matches!(section.kind, SectionKind::Volume | SectionKind::Disk)
            && VolumePayload::is_smart_layout(section.payload_size())
    });

    if smart_volume {
        return Ok(Dialect::Smart);
    }
    if has(&SectionKind::Xheader) {
        return Ok(Dialect::Ftk);
    }
    if has(&SectionKind::Header2) {
        // EnCase writes header2 before header; linen writes header first.
        if *first_kind == SectionKind::Header {
            return Ok(Dialect::Linen);
        }
        if has(&SectionKind::Digest) {
            return Ok(Dialect::Encase6);
        }
        return Ok(Dialect::Encase4);
    }
    if has(&SectionKind::Header) {
        return Ok(Dialect::Encase3);
    }
    Err(Error::unsupported(
        "section pattern matches no known dialect",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(kind: SectionKind, payload_size: u64) -> Section {
        Section {
            kind,
            offset: 13,
            next_offset: 13 + 76 + payload_size,
            size: 76 + payload_size,
        }
    }

    #[test]
    fn test_ex01_and_l01_from_magic() {
        assert_eq!(
            detect_from_sections(MagicFamily::Evf2, &[]).unwrap(),
            Dialect::Ex01
        );
        assert_eq!(
            detect_from_sections(MagicFamily::Lvf, &[]).unwrap(),
            Dialect::L01
        );
    }

    #[test]
    fn test_smart_by_volume_layout() {
        let sections = vec![
            section(SectionKind::Header, 120),
            section(SectionKind::Volume, 94),
        ];
        assert_eq!(
            detect_from_sections(MagicFamily::Evf, &sections).unwrap(),
            Dialect::Smart
        );
    }

    #[test]
    fn test_encase6_by_header2_and_digest() {
        let sections = vec![
            section(SectionKind::Header2, 200),
            section(SectionKind::Header, 120),
            section(SectionKind::Volume, 1052),
            section(SectionKind::Digest, 80),
        ];
        assert_eq!(
            detect_from_sections(MagicFamily::Evf, &sections).unwrap(),
            Dialect::Encase6
        );
    }

    #[test]
    fn test_encase4_without_digest() {
        let sections = vec![
            section(SectionKind::Header2, 200),
            section(SectionKind::Header, 120),
            section(SectionKind::Volume, 1052),
        ];
        assert_eq!(
            detect_from_sections(MagicFamily::Evf, &sections).unwrap(),
            Dialect::Encase4
        );
    }

    #[test]
    fn test_linen_by_header_order() {
        let sections = vec![
            section(SectionKind::Header, 120),
            section(SectionKind::Header2, 200),
            section(SectionKind::Volume, 1052),
        ];
        assert_eq!(
            detect_from_sections(MagicFamily::Evf, &sections).unwrap(),
            Dialect::Linen
        );
    }

    #[test]
    fn test_ftk_by_xheader() {
        let sections = vec![
            section(SectionKind::Header2, 200),
            section(SectionKind::Xheader, 90),
            section(SectionKind::Volume, 1052),
        ];
        assert_eq!(
            detect_from_sections(MagicFamily::Evf, &sections).unwrap(),
            Dialect::Ftk
        );
    }

    #[test]
    fn test_header_only_is_early_encase() {
        let sections = vec![
            section(SectionKind::Header, 120),
            section(SectionKind::Volume, 1052),
        ];
        assert_eq!(
            detect_from_sections(MagicFamily::Evf, &sections).unwrap(),
            Dialect::Encase3
        );
    }

    #[test]
    fn test_unknown_pattern() {
        let sections = vec![section(SectionKind::Sectors, 4096)];
        assert!(matches!(
            detect_from_sections(MagicFamily::Evf, &sections),
            Err(Error::Unsupported(_))
        ));
    }
}
