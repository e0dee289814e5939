//! Logical evidence record streams
//!
//! L01 images carry a text stream instead of raw media metadata: category
//! blocks (`file`, `source`, `subject`, `permission`, `auth`), each opened
//! by its keyword on a line of its own, followed by a tab-separated row of
//! short type codes, zero or more tab-separated value rows, and the
//! keyword again as terminator.
//!
//! Value rows must have exactly as many columns as the type row. Unknown
//! type codes are ignored (counted as diagnostics); empty values leave
//! their field unset. Numeric fields are signed or unsigned decimal per
//! field, hex fields are lowercase hexadecimal without separators.

use crate::header::{decode_utf16le, encode_utf16le};
use ewfkit_core::{Diagnostics, Error, Result};
use std::collections::HashMap;

/// Sentinel for unset logical/physical offsets
const UNSET_OFFSET: i64 = -1;

/// Kind of a file entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileEntryKind {
    /// Regular file
    #[default]
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Device node, socket or other special entry
    Special,
}

impl FileEntryKind {
    fn code(&self) -> &'static str {
        match self {
            FileEntryKind::File => "f",
            FileEntryKind::Directory => "d",
            FileEntryKind::Symlink => "l",
            FileEntryKind::Special => "s",
        }
    }

    fn from_code(code: &str) -> Result<Self> {
        match code {
            "f" => Ok(FileEntryKind::File),
            "d" => Ok(FileEntryKind::Directory),
            "l" => Ok(FileEntryKind::Symlink),
            "s" => Ok(FileEntryKind::Special),
            other => Err(Error::malformed_record(format!(
                "unknown file entry type code: {:?}",
                other
            ))),
        }
    }
}

/// One node of the logical evidence file tree
#[derive(Debug, Clone, Default)]
pub struct FileEntry {
    /// Entry identifier; 0 is the synthetic root
    pub identifier: u64,
    /// Identifier of the parent entry
    pub parent_identifier: u64,
    /// Entry name
    pub name: String,
    /// Entry kind
    pub kind: FileEntryKind,
    /// Size in bytes
    pub size: u64,
    /// Creation time (POSIX epoch), unset if absent
    pub creation_time: Option<i64>,
    /// Modification time (POSIX epoch), unset if absent
    pub modification_time: Option<i64>,
    /// Access time (POSIX epoch), unset if absent
    pub access_time: Option<i64>,
    /// Entry modification time (POSIX epoch), unset if absent
    pub entry_modification_time: Option<i64>,
    /// Offset of the entry's data stream within the stored media payload
    pub data_offset: u64,
    /// Length of the entry's data stream
    pub data_size: u64,
    /// Entry flags
    pub flags: u32,
    /// MD5 of the entry data, lowercase hex
    pub md5_hash: Option<String>,
    /// Arena indices of child entries
    pub children: Vec<usize>,
}

/// The file entry forest, stored as an arena
///
/// Entries are attached to their parents by identifier after the whole
/// stream is parsed; the synthetic root has identifier 0.
#[derive(Debug, Clone, Default)]
pub struct FileEntryTree {
    entries: Vec<FileEntry>,
    by_identifier: HashMap<u64, usize>,
}

impl FileEntryTree {
    /// Build the tree from parsed entries
    ///
    /// Fails with [`Error::DanglingParent`] for unknown parent identifiers
    /// or parent cycles, and with [`Error::MalformedRecord`] for duplicate
    /// identifiers.
    pub fn build(parsed: Vec<FileEntry>) -> Result<Self> {
        let mut entries = Vec::with_capacity(parsed.len() + 1);
        entries.push(FileEntry {
            identifier: 0,
            kind: FileEntryKind::Directory,
            ..FileEntry::default()
        });
        let mut by_identifier = HashMap::with_capacity(parsed.len() + 1);
        by_identifier.insert(0u64, 0usize);

        for entry in parsed {
            if by_identifier.contains_key(&entry.identifier) {
                return Err(Error::malformed_record(format!(
                    "duplicate file entry identifier {}",
                    entry.identifier
                )));
            }
            by_identifier.insert(entry.identifier, entries.len());
            entries.push(entry);
        }

        // Attach children, then verify every entry reaches the root.
        for index in 1..entries.len() {
            let parent_identifier = entries[index].parent_identifier;
            let parent_index = *by_identifier.get(&parent_identifier).ok_or(
                Error::DanglingParent {
                    entry: entries[index].identifier,
                    parent: parent_identifier,
                },
            )?;
            entries[parent_index].children.push(index);
        }
        let tree = Self {
            entries,
            by_identifier,
        };
        tree.verify_forest()?;
        Ok(tree)
    }

    fn verify_forest(&self) -> Result<()> {
        for start in 1..self.entries.len() {
            let mut index = start;
            let mut steps = 0usize;
            while index != 0 {
                let parent = self.entries[index].parent_identifier;
                index = self.by_identifier[&parent];
                steps += 1;
                if steps > self.entries.len() {
                    return Err(Error::DanglingParent {
                        entry: self.entries[start].identifier,
                        parent,
                    });
                }
            }
        }
        Ok(())
    }

    /// The synthetic root entry
    pub fn root(&self) -> &FileEntry {
        &self.entries[0]
    }

    /// Entry at an arena index
    pub fn entry(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    /// Entry by identifier
    pub fn entry_by_identifier(&self, identifier: u64) -> Option<&FileEntry> {
        self.by_identifier
            .get(&identifier)
            .map(|&index| &self.entries[index])
    }

    /// Number of entries including the synthetic root
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree holds only the synthetic root
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// All entries except the synthetic root, in record order
    pub fn iter_non_root(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().skip(1)
    }
}

/// Device or host provenance of acquired evidence
#[derive(Debug, Clone)]
pub struct Source {
    /// Source identifier
    pub identifier: u64,
    /// Source name
    pub name: String,
    /// Evidence number
    pub evidence_number: String,
    /// Acquisition location
    pub location: String,
    /// Device GUID, lowercase hex
    pub device_guid: String,
    /// Primary device GUID, lowercase hex
    pub primary_device_guid: String,
    /// Drive type character
    pub drive_type: Option<char>,
    /// Manufacturer
    pub manufacturer: String,
    /// Model
    pub model: String,
    /// Serial number
    pub serial_number: String,
    /// Network domain
    pub domain: String,
    /// IP address
    pub ip_address: String,
    /// MAC address, lowercase hex
    pub mac_address: String,
    /// Total bytes acquired from the source
    pub size: u64,
    /// Logical offset; -1 when unset
    logical_offset: i64,
    /// Physical offset; -1 when unset
    physical_offset: i64,
    /// Acquisition time (POSIX epoch)
    pub acquisition_time: Option<i64>,
    /// MD5 of the source, lowercase hex
    pub md5_hash: String,
    /// SHA1 of the source, lowercase hex
    pub sha1_hash: String,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            identifier: 0,
            name: String::new(),
            evidence_number: String::new(),
            location: String::new(),
            device_guid: String::new(),
            primary_device_guid: String::new(),
            drive_type: None,
            manufacturer: String::new(),
            model: String::new(),
            serial_number: String::new(),
            domain: String::new(),
            ip_address: String::new(),
            mac_address: String::new(),
            size: 0,
            logical_offset: UNSET_OFFSET,
            physical_offset: UNSET_OFFSET,
            acquisition_time: None,
            md5_hash: String::new(),
            sha1_hash: String::new(),
        }
    }
}

impl Source {
    /// Logical offset, or `None` when unset
    ///
    /// The on-disk sentinel -1 means unset; zero is a real offset.
    pub fn logical_offset(&self) -> Option<i64> {
        (self.logical_offset != UNSET_OFFSET).then_some(self.logical_offset)
    }

    /// Physical offset, or `None` when unset
    pub fn physical_offset(&self) -> Option<i64> {
        (self.physical_offset != UNSET_OFFSET).then_some(self.physical_offset)
    }

    /// Set the logical offset
    pub fn set_logical_offset(&mut self, offset: i64) {
        self.logical_offset = offset;
    }

    /// Set the physical offset
    pub fn set_physical_offset(&mut self, offset: i64) {
        self.physical_offset = offset;
    }
}

/// A subject record
#[derive(Debug, Clone, Default)]
pub struct Subject {
    /// Subject identifier
    pub identifier: u64,
    /// Subject name
    pub name: String,
    /// Subject GUID, lowercase hex
    pub guid: String,
}

/// A permission record
#[derive(Debug, Clone, Default)]
pub struct Permission {
    /// Permission identifier
    pub identifier: u64,
    /// Holder name
    pub name: String,
    /// Access mask
    pub access_mask: u32,
}

/// Everything parsed from a logical evidence record stream
#[derive(Debug, Clone, Default)]
pub struct LefRecords {
    /// The file entry forest
    pub tree: FileEntryTree,
    /// Source records in stream order
    pub sources: Vec<Source>,
    /// Subject records in stream order
    pub subjects: Vec<Subject>,
    /// Permission records in stream order
    pub permissions: Vec<Permission>,
    /// Auth records as (name, value) pairs
    pub auth: Vec<(String, String)>,
}

/// Parse a record stream from its decoded text
pub fn parse_records(text: &str, diagnostics: &Diagnostics) -> Result<LefRecords> {
    let lines: Vec<&str> = text.lines().map(|line| line.trim_end_matches('\r')).collect();
    let mut cursor = 0usize;

    let mut file_entries = Vec::new();
    let mut records = LefRecords::default();

    while cursor < lines.len() {
        let category = lines[cursor].trim();
        cursor += 1;
        if category.is_empty() {
            continue;
        }
        let block_end = find_terminator(&lines, cursor, category)?;
        match category {
            "file" => parse_block(&lines[cursor..block_end], |row| {
                file_entries.push(parse_file_entry(row, diagnostics)?);
                Ok(())
            })?,
            "source" => parse_block(&lines[cursor..block_end], |row| {
                records.sources.push(parse_source(row, diagnostics)?);
                Ok(())
            })?,
            "subject" => parse_block(&lines[cursor..block_end], |row| {
                records.subjects.push(parse_subject(row, diagnostics)?);
                Ok(())
            })?,
            "permission" => parse_block(&lines[cursor..block_end], |row| {
                records.permissions.push(parse_permission(row, diagnostics)?);
                Ok(())
            })?,
            "auth" => parse_block(&lines[cursor..block_end], |row| {
                let mut name = String::new();
                let mut value = String::new();
                for (code, field) in row {
                    match *code {
                        "n" => name = field.to_string(),
                        "v" => value = field.to_string(),
                        other => diagnostics.count_unknown_lef_type(other),
                    }
                }
                records.auth.push((name, value));
                Ok(())
            })?,
            unknown => {
                diagnostics.count_unknown_lef_type(unknown);
            }
        }
        cursor = block_end + 1;
    }

    records.tree = FileEntryTree::build(file_entries)?;
    Ok(records)
}

/// Locate the category terminator line
fn find_terminator(lines: &[&str], start: usize, category: &str) -> Result<usize> {
    lines[start..]
        .iter()
        .position(|line| line.trim() == category)
        .map(|offset| start + offset)
        .ok_or_else(|| {
            Error::malformed_record(format!("category {:?} is missing its terminator", category))
        })
}

/// Parse one category block: a type row then value rows
///
/// The callback receives each value row as (code, value) pairs.
fn parse_block<F>(block: &[&str], mut on_row: F) -> Result<()>
where
    F: FnMut(&[(&str, &str)]) -> Result<()>,
{
    let Some((types_line, value_lines)) = block.split_first() else {
        return Err(Error::malformed_record("category block has no type row"));
    };
    let codes: Vec<&str> = types_line.split('\t').collect();
    for line in value_lines {
        let values: Vec<&str> = line.split('\t').collect();
        if values.len() != codes.len() {
            return Err(Error::malformed_record(format!(
                "value row has {} columns, type row has {}",
                values.len(),
                codes.len()
            )));
        }
        let row: Vec<(&str, &str)> = codes.iter().copied().zip(values).collect();
        on_row(&row)?;
    }
    Ok(())
}

fn parse_file_entry(row: &[(&str, &str)], diagnostics: &Diagnostics) -> Result<FileEntry> {
    let mut entry = FileEntry::default();
    for (code, value) in row {
        if value.is_empty() {
            continue;
        }
        match *code {
            "id" => entry.identifier = parse_unsigned(value)?,
            "pid" => entry.parent_identifier = parse_unsigned(value)?,
            "n" => entry.name = value.to_string(),
            "ty" => entry.kind = FileEntryKind::from_code(value)?,
            "sz" => entry.size = parse_unsigned(value)?,
            "cr" => entry.creation_time = Some(parse_signed(value)?),
            "mo" => entry.modification_time = Some(parse_signed(value)?),
            "ac" => entry.access_time = Some(parse_signed(value)?),
            "em" => entry.entry_modification_time = Some(parse_signed(value)?),
            "ofs" => entry.data_offset = parse_unsigned(value)?,
            "dsz" => entry.data_size = parse_unsigned(value)?,
            "fl" => entry.flags = parse_unsigned(value)? as u32,
            "ah" => entry.md5_hash = Some(parse_hex(value)?),
            other => diagnostics.count_unknown_lef_type(other),
        }
    }
    if entry.identifier == 0 {
        return Err(Error::malformed_record(
            "file entry record without an identifier",
        ));
    }
    Ok(entry)
}

fn parse_source(row: &[(&str, &str)], diagnostics: &Diagnostics) -> Result<Source> {
    let mut source = Source::default();
    for (code, value) in row {
        if value.is_empty() {
            continue;
        }
        match *code {
            "id" => source.identifier = parse_unsigned(value)?,
            "n" => source.name = value.to_string(),
            "ev" => source.evidence_number = value.to_string(),
            "loc" => source.location = value.to_string(),
            "gu" => source.device_guid = parse_hex(value)?,
            "pgu" => source.primary_device_guid = parse_hex(value)?,
            "dt" => {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => source.drive_type = Some(c),
                    _ => {
                        return Err(Error::malformed_record(format!(
                            "drive type must be a single character, got {:?}",
                            value
                        )))
                    }
                }
            }
            "mfr" => source.manufacturer = value.to_string(),
            "mo" => source.model = value.to_string(),
            "se" => source.serial_number = value.to_string(),
            "do" => source.domain = value.to_string(),
            "ip" => source.ip_address = value.to_string(),
            "ma" => source.mac_address = parse_hex(value)?,
            "tb" => source.size = parse_unsigned(value)?,
            "lo" => source.logical_offset = parse_signed(value)?,
            "po" => source.physical_offset = parse_signed(value)?,
            "aq" => source.acquisition_time = Some(parse_signed(value)?),
            "ah" => source.md5_hash = parse_hex(value)?,
            "sh" => source.sha1_hash = parse_hex(value)?,
            // "si" is reserved for subject information; not implemented.
            other => diagnostics.count_unknown_lef_type(other),
        }
    }
    Ok(source)
}

fn parse_subject(row: &[(&str, &str)], diagnostics: &Diagnostics) -> Result<Subject> {
    let mut subject = Subject::default();
    for (code, value) in row {
        if value.is_empty() {
            continue;
        }
        match *code {
            "id" => subject.identifier = parse_unsigned(value)?,
            "n" => subject.name = value.to_string(),
            "gu" => subject.guid = parse_hex(value)?,
            other => diagnostics.count_unknown_lef_type(other),
        }
    }
    Ok(subject)
}

fn parse_permission(row: &[(&str, &str)], diagnostics: &Diagnostics) -> Result<Permission> {
    let mut permission = Permission::default();
    for (code, value) in row {
        if value.is_empty() {
            continue;
        }
        match *code {
            "id" => permission.identifier = parse_unsigned(value)?,
            "n" => permission.name = value.to_string(),
            "pr" => permission.access_mask = parse_unsigned(value)? as u32,
            other => diagnostics.count_unknown_lef_type(other),
        }
    }
    Ok(permission)
}

fn parse_unsigned(value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        Error::malformed_record(format!("expected unsigned decimal, got {:?}", value))
    })
}

fn parse_signed(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| Error::malformed_record(format!("expected signed decimal, got {:?}", value)))
}

fn parse_hex(value: &str) -> Result<String> {
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::malformed_record(format!(
            "expected hexadecimal, got {:?}",
            value
        )));
    }
    Ok(value.to_ascii_lowercase())
}

const FILE_TYPE_ROW: &[&str] = &[
    "id", "pid", "n", "ty", "sz", "cr", "mo", "ac", "em", "ofs", "dsz", "fl", "ah",
];
const SOURCE_TYPE_ROW: &[&str] = &[
    "id", "n", "ev", "loc", "gu", "pgu", "dt", "mfr", "mo", "se", "do", "ip", "ma", "tb", "lo",
    "po", "aq", "ah", "sh",
];
const SUBJECT_TYPE_ROW: &[&str] = &["id", "n", "gu"];
const PERMISSION_TYPE_ROW: &[&str] = &["id", "n", "pr"];
const AUTH_TYPE_ROW: &[&str] = &["n", "v"];

/// Serialize records back into stream text
pub fn serialize_records(records: &LefRecords) -> String {
    let mut text = String::new();

    if !records.tree.is_empty() {
        emit_block(&mut text, "file", FILE_TYPE_ROW, records.tree.iter_non_root(), |entry| {
            vec![
                entry.identifier.to_string(),
                entry.parent_identifier.to_string(),
                entry.name.clone(),
                entry.kind.code().to_string(),
                entry.size.to_string(),
                optional_time(entry.creation_time),
                optional_time(entry.modification_time),
                optional_time(entry.access_time),
                optional_time(entry.entry_modification_time),
                entry.data_offset.to_string(),
                entry.data_size.to_string(),
                entry.flags.to_string(),
                entry.md5_hash.clone().unwrap_or_default(),
            ]
        });
    }
    if !records.sources.is_empty() {
        emit_block(&mut text, "source", SOURCE_TYPE_ROW, records.sources.iter(), |source| {
            vec![
                source.identifier.to_string(),
                source.name.clone(),
                source.evidence_number.clone(),
                source.location.clone(),
                source.device_guid.clone(),
                source.primary_device_guid.clone(),
                source.drive_type.map(String::from).unwrap_or_default(),
                source.manufacturer.clone(),
                source.model.clone(),
                source.serial_number.clone(),
                source.domain.clone(),
                source.ip_address.clone(),
                source.mac_address.clone(),
                source.size.to_string(),
                source.logical_offset.to_string(),
                source.physical_offset.to_string(),
                optional_time(source.acquisition_time),
                source.md5_hash.clone(),
                source.sha1_hash.clone(),
            ]
        });
    }
    if !records.subjects.is_empty() {
        emit_block(&mut text, "subject", SUBJECT_TYPE_ROW, records.subjects.iter(), |subject| {
            vec![
                subject.identifier.to_string(),
                subject.name.clone(),
                subject.guid.clone(),
            ]
        });
    }
    if !records.permissions.is_empty() {
        emit_block(
            &mut text,
            "permission",
            PERMISSION_TYPE_ROW,
            records.permissions.iter(),
            |permission| {
                vec![
                    permission.identifier.to_string(),
                    permission.name.clone(),
                    permission.access_mask.to_string(),
                ]
            },
        );
    }
    if !records.auth.is_empty() {
        emit_block(&mut text, "auth", AUTH_TYPE_ROW, records.auth.iter(), |(name, value)| {
            vec![name.clone(), value.clone()]
        });
    }
    text
}

fn optional_time(time: Option<i64>) -> String {
    time.map(|t| t.to_string()).unwrap_or_default()
}

fn emit_block<T>(
    text: &mut String,
    category: &str,
    type_row: &[&str],
    items: impl Iterator<Item = T>,
    to_row: impl Fn(T) -> Vec<String>,
) {
    text.push_str(category);
    text.push('\n');
    text.push_str(&type_row.join("\t"));
    text.push('\n');
    for item in items {
        text.push_str(&to_row(item).join("\t"));
        text.push('\n');
    }
    text.push_str(category);
    text.push('\n');
}

/// Encode an `ltree` section payload
pub fn encode_ltree(records: &LefRecords) -> Vec<u8> {
    encode_utf16le(&serialize_records(records))
}

/// Parse an `ltree` section payload
pub fn parse_ltree(payload: &[u8], diagnostics: &Diagnostics) -> Result<LefRecords> {
    let text = decode_utf16le(payload)?;
    parse_records(&text, diagnostics)
}
