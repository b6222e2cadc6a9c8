//! `VersionEdit`: one atomic change to the live-file set and counters.
//!
//! ## Wire format
//!
//! An edit is a sequence of `[tag: varint32][fields]` entries in any order:
//!
//! | tag | field              | payload                                          |
//! |-----|--------------------|--------------------------------------------------|
//! | 1   | comparator         | length-prefixed name                             |
//! | 2   | log number         | varint64                                         |
//! | 3   | next file number   | varint64                                         |
//! | 4   | last sequence      | varint64                                         |
//! | 6   | deleted file       | level varint32, number varint64                  |
//! | 7   | new file           | level, number, size, smallest, largest           |
//! | 9   | prev log number    | varint64                                         |
//! | 100 | new file (v2)      | v1 fields, smallest seqno, largest seqno         |
//! | 102 | new file (v3)      | level, number, path id, size, keys, seqnos       |
//! | 200 | column family      | varint32                                         |
//! | 201 | column family add  | length-prefixed name                             |
//! | 202 | column family drop | (none)                                           |
//! | 203 | max column family  | varint32                                         |
//!
//! Unknown tags are a hard error: a reader that does not understand a field
//! cannot know whether ignoring it is safe.

use std::collections::BTreeSet;
use std::fmt;

use coding::{
    get_length_prefixed_slice, get_varint32, get_varint64, put_length_prefixed_slice,
    put_varint32, put_varint64,
};

use crate::{DecodeError, NUM_LEVELS};

const TAG_COMPARATOR: u32 = 1;
const TAG_LOG_NUMBER: u32 = 2;
const TAG_NEXT_FILE_NUMBER: u32 = 3;
const TAG_LAST_SEQUENCE: u32 = 4;
const TAG_DELETED_FILE: u32 = 6;
const TAG_NEW_FILE: u32 = 7;
const TAG_PREV_LOG_NUMBER: u32 = 9;
const TAG_NEW_FILE2: u32 = 100;
const TAG_NEW_FILE3: u32 = 102;
const TAG_COLUMN_FAMILY: u32 = 200;
const TAG_COLUMN_FAMILY_ADD: u32 = 201;
const TAG_COLUMN_FAMILY_DROP: u32 = 202;
const TAG_MAX_COLUMN_FAMILY: u32 = 203;

/// Metadata of one sorted table file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetaData {
    pub number: u64,
    /// Index of the data directory holding the file; `0` is the DB directory.
    pub path_id: u32,
    pub file_size: u64,
    /// Smallest internal key in the file.
    pub smallest: Vec<u8>,
    /// Largest internal key in the file.
    pub largest: Vec<u8>,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
}

impl FileMetaData {
    /// Metadata without sequence-number bounds, in the default path.
    pub fn new(number: u64, file_size: u64, smallest: Vec<u8>, largest: Vec<u8>) -> Self {
        Self {
            number,
            file_size,
            smallest,
            largest,
            ..Self::default()
        }
    }

    /// Sets the sequence-number range covered by the file.
    #[must_use]
    pub fn with_seqnos(mut self, smallest_seqno: u64, largest_seqno: u64) -> Self {
        self.smallest_seqno = smallest_seqno;
        self.largest_seqno = largest_seqno;
        self
    }

    /// Places the file in data directory `path_id`.
    #[must_use]
    pub fn with_path_id(mut self, path_id: u32) -> Self {
        self.path_id = path_id;
        self
    }

    /// The oldest wire variant able to carry every field in use.
    pub fn wire_format(&self) -> NewFileFormat {
        if self.path_id != 0 {
            NewFileFormat::V3
        } else if self.smallest_seqno != 0 || self.largest_seqno != 0 {
            NewFileFormat::V2
        } else {
            NewFileFormat::V1
        }
    }
}

/// Wire variant of a new-file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewFileFormat {
    /// Tag 7: number, size and key range.
    V1,
    /// Tag 100: adds the sequence-number range.
    V2,
    /// Tag 102: adds the path id.
    V3,
}

impl NewFileFormat {
    pub fn tag(self) -> u32 {
        match self {
            NewFileFormat::V1 => TAG_NEW_FILE,
            NewFileFormat::V2 => TAG_NEW_FILE2,
            NewFileFormat::V3 => TAG_NEW_FILE3,
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            NewFileFormat::V1 => "new-file entry",
            NewFileFormat::V2 => "new-file2 entry",
            NewFileFormat::V3 => "new-file3 entry",
        }
    }
}

/// A sparse diff against the current version.
///
/// Absent scalar fields leave the accumulated value untouched when edits
/// are folded. An edit with no column family applies to the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionEdit {
    comparator_name: Option<String>,
    log_number: Option<u64>,
    prev_log_number: Option<u64>,
    next_file_number: Option<u64>,
    last_sequence: Option<u64>,
    max_column_family: Option<u32>,

    column_family: Option<u32>,
    column_family_add: Option<String>,
    column_family_drop: bool,

    deleted_files: BTreeSet<(u32, u64)>,
    new_files: Vec<(u32, FileMetaData)>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field to absent.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // -------------------- Setters --------------------

    pub fn set_comparator_name(&mut self, name: impl Into<String>) {
        self.comparator_name = Some(name.into());
    }

    pub fn set_log_number(&mut self, number: u64) {
        self.log_number = Some(number);
    }

    pub fn set_prev_log_number(&mut self, number: u64) {
        self.prev_log_number = Some(number);
    }

    pub fn set_next_file_number(&mut self, number: u64) {
        self.next_file_number = Some(number);
    }

    pub fn set_last_sequence(&mut self, sequence: u64) {
        self.last_sequence = Some(sequence);
    }

    pub fn set_max_column_family(&mut self, id: u32) {
        self.max_column_family = Some(id);
    }

    /// Targets this edit at column family `id`.
    pub fn set_column_family(&mut self, id: u32) {
        self.column_family = Some(id);
    }

    /// Marks this edit as creating its column family under `name`.
    pub fn add_column_family(&mut self, name: impl Into<String>) {
        self.column_family_add = Some(name.into());
    }

    /// Marks this edit as dropping its column family.
    pub fn drop_column_family(&mut self) {
        self.column_family_drop = true;
    }

    /// Adds `file` at `level`.
    ///
    /// # Panics
    ///
    /// If `level >= NUM_LEVELS`.
    pub fn add_file(&mut self, level: u32, file: FileMetaData) {
        assert!((level as usize) < NUM_LEVELS, "level {} out of range", level);
        self.new_files.push((level, file));
    }

    /// Removes file `number` from `level`.
    ///
    /// # Panics
    ///
    /// If `level >= NUM_LEVELS`.
    pub fn delete_file(&mut self, level: u32, number: u64) {
        assert!((level as usize) < NUM_LEVELS, "level {} out of range", level);
        self.deleted_files.insert((level, number));
    }

    // -------------------- Getters --------------------

    pub fn comparator_name(&self) -> Option<&str> {
        self.comparator_name.as_deref()
    }

    pub fn log_number(&self) -> Option<u64> {
        self.log_number
    }

    pub fn prev_log_number(&self) -> Option<u64> {
        self.prev_log_number
    }

    pub fn next_file_number(&self) -> Option<u64> {
        self.next_file_number
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn max_column_family(&self) -> Option<u32> {
        self.max_column_family
    }

    pub fn column_family(&self) -> Option<u32> {
        self.column_family
    }

    /// Name of the column family this edit creates, if any.
    pub fn column_family_add(&self) -> Option<&str> {
        self.column_family_add.as_deref()
    }

    pub fn is_column_family_drop(&self) -> bool {
        self.column_family_drop
    }

    pub fn deleted_files(&self) -> &BTreeSet<(u32, u64)> {
        &self.deleted_files
    }

    pub fn new_files(&self) -> &[(u32, FileMetaData)] {
        &self.new_files
    }

    // -------------------- Encoding --------------------

    /// Appends the encoded edit to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        if let Some(name) = &self.comparator_name {
            put_varint32(dst, TAG_COMPARATOR);
            put_length_prefixed_slice(dst, name.as_bytes());
        }
        if let Some(n) = self.log_number {
            put_varint32(dst, TAG_LOG_NUMBER);
            put_varint64(dst, n);
        }
        if let Some(n) = self.prev_log_number {
            put_varint32(dst, TAG_PREV_LOG_NUMBER);
            put_varint64(dst, n);
        }
        if let Some(n) = self.next_file_number {
            put_varint32(dst, TAG_NEXT_FILE_NUMBER);
            put_varint64(dst, n);
        }
        if let Some(id) = self.max_column_family {
            put_varint32(dst, TAG_MAX_COLUMN_FAMILY);
            put_varint32(dst, id);
        }
        if let Some(s) = self.last_sequence {
            put_varint32(dst, TAG_LAST_SEQUENCE);
            put_varint64(dst, s);
        }

        for &(level, number) in &self.deleted_files {
            put_varint32(dst, TAG_DELETED_FILE);
            put_varint32(dst, level);
            put_varint64(dst, number);
        }

        for (level, f) in &self.new_files {
            let format = f.wire_format();
            put_varint32(dst, format.tag());
            put_varint32(dst, *level);
            put_varint64(dst, f.number);
            if format == NewFileFormat::V3 {
                put_varint32(dst, f.path_id);
            }
            put_varint64(dst, f.file_size);
            put_length_prefixed_slice(dst, &f.smallest);
            put_length_prefixed_slice(dst, &f.largest);
            if format != NewFileFormat::V1 {
                put_varint64(dst, f.smallest_seqno);
                put_varint64(dst, f.largest_seqno);
            }
        }

        if let Some(id) = self.column_family {
            put_varint32(dst, TAG_COLUMN_FAMILY);
            put_varint32(dst, id);
        }
        if let Some(name) = &self.column_family_add {
            put_varint32(dst, TAG_COLUMN_FAMILY_ADD);
            put_length_prefixed_slice(dst, name.as_bytes());
        }
        if self.column_family_drop {
            put_varint32(dst, TAG_COLUMN_FAMILY_DROP);
        }
    }

    /// Encodes the edit into a fresh buffer, ready to be one log record.
    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        self.encode_to(&mut dst);
        dst
    }

    /// Decodes an edit previously produced by [`VersionEdit::encode`].
    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        let mut edit = Self::default();
        let mut input = src;

        while let Some(tag) = get_varint32(&mut input) {
            match tag {
                TAG_COMPARATOR => {
                    let name = get_string(&mut input).ok_or(DecodeError::Field("comparator name"))?;
                    edit.comparator_name = Some(name);
                }
                TAG_LOG_NUMBER => {
                    let n = get_varint64(&mut input).ok_or(DecodeError::Field("log number"))?;
                    edit.log_number = Some(n);
                }
                TAG_PREV_LOG_NUMBER => {
                    let n = get_varint64(&mut input)
                        .ok_or(DecodeError::Field("previous log number"))?;
                    edit.prev_log_number = Some(n);
                }
                TAG_NEXT_FILE_NUMBER => {
                    let n = get_varint64(&mut input).ok_or(DecodeError::Field("next file number"))?;
                    edit.next_file_number = Some(n);
                }
                TAG_LAST_SEQUENCE => {
                    let n = get_varint64(&mut input)
                        .ok_or(DecodeError::Field("last sequence number"))?;
                    edit.last_sequence = Some(n);
                }
                TAG_DELETED_FILE => {
                    let level = get_level(&mut input).ok_or(DecodeError::Field("deleted file"))?;
                    let number = get_varint64(&mut input).ok_or(DecodeError::Field("deleted file"))?;
                    edit.deleted_files.insert((level, number));
                }
                TAG_NEW_FILE => {
                    let entry = get_new_file(&mut input, NewFileFormat::V1)?;
                    edit.new_files.push(entry);
                }
                TAG_NEW_FILE2 => {
                    let entry = get_new_file(&mut input, NewFileFormat::V2)?;
                    edit.new_files.push(entry);
                }
                TAG_NEW_FILE3 => {
                    let entry = get_new_file(&mut input, NewFileFormat::V3)?;
                    edit.new_files.push(entry);
                }
                TAG_COLUMN_FAMILY => {
                    let id = get_varint32(&mut input).ok_or(DecodeError::Field("column family id"))?;
                    edit.column_family = Some(id);
                }
                TAG_COLUMN_FAMILY_ADD => {
                    let name =
                        get_string(&mut input).ok_or(DecodeError::Field("column family add"))?;
                    edit.column_family_add = Some(name);
                }
                TAG_COLUMN_FAMILY_DROP => {
                    edit.column_family_drop = true;
                }
                TAG_MAX_COLUMN_FAMILY => {
                    let id =
                        get_varint32(&mut input).ok_or(DecodeError::Field("max column family"))?;
                    edit.max_column_family = Some(id);
                }
                other => return Err(DecodeError::UnknownTag(other)),
            }
        }

        if !input.is_empty() {
            return Err(DecodeError::InvalidTag);
        }
        Ok(edit)
    }
}

fn get_level(input: &mut &[u8]) -> Option<u32> {
    let mut probe = *input;
    let level = get_varint32(&mut probe)?;
    if (level as usize) >= NUM_LEVELS {
        return None;
    }
    *input = probe;
    Some(level)
}

fn get_string(input: &mut &[u8]) -> Option<String> {
    let mut probe = *input;
    let bytes = get_length_prefixed_slice(&mut probe)?;
    let s = String::from_utf8(bytes.to_vec()).ok()?;
    *input = probe;
    Some(s)
}

fn get_new_file(
    input: &mut &[u8],
    format: NewFileFormat,
) -> Result<(u32, FileMetaData), DecodeError> {
    let err = DecodeError::Field(format.field_name());
    let level = get_level(input).ok_or(err)?;

    let mut f = FileMetaData {
        number: get_varint64(input).ok_or(err)?,
        ..FileMetaData::default()
    };
    if format == NewFileFormat::V3 {
        f.path_id = get_varint32(input).ok_or(err)?;
    }
    f.file_size = get_varint64(input).ok_or(err)?;
    f.smallest = get_length_prefixed_slice(input).ok_or(err)?.to_vec();
    f.largest = get_length_prefixed_slice(input).ok_or(err)?.to_vec();
    if format != NewFileFormat::V1 {
        f.smallest_seqno = get_varint64(input).ok_or(err)?;
        f.largest_seqno = get_varint64(input).ok_or(err)?;
    }
    Ok((level, f))
}

impl fmt::Display for VersionEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VersionEdit {{")?;
        if let Some(name) = &self.comparator_name {
            writeln!(f, "  Comparator: {}", name)?;
        }
        if let Some(n) = self.log_number {
            writeln!(f, "  LogNumber: {}", n)?;
        }
        if let Some(n) = self.prev_log_number {
            writeln!(f, "  PrevLogNumber: {}", n)?;
        }
        if let Some(n) = self.next_file_number {
            writeln!(f, "  NextFileNumber: {}", n)?;
        }
        if let Some(id) = self.max_column_family {
            writeln!(f, "  MaxColumnFamily: {}", id)?;
        }
        if let Some(s) = self.last_sequence {
            writeln!(f, "  LastSeq: {}", s)?;
        }
        for (level, number) in &self.deleted_files {
            writeln!(f, "  DeleteFile: {} {}", level, number)?;
        }
        for (level, file) in &self.new_files {
            write!(f, "  AddFile: {} {} {}", level, file.number, file.file_size)?;
            if file.path_id != 0 {
                write!(f, " path={}", file.path_id)?;
            }
            writeln!(
                f,
                " '{}' .. '{}' seq {}..{}",
                file.smallest.escape_ascii(),
                file.largest.escape_ascii(),
                file.smallest_seqno,
                file.largest_seqno
            )?;
        }
        if let Some(id) = self.column_family {
            writeln!(f, "  ColumnFamily: {}", id)?;
        }
        if let Some(name) = &self.column_family_add {
            writeln!(f, "  ColumnFamilyAdd: {}", name)?;
        }
        if self.column_family_drop {
            writeln!(f, "  ColumnFamilyDrop")?;
        }
        write!(f, "}}")
    }
}
