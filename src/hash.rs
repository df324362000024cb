//! Hashed-string tables.
//!
//! Symbols and folders are referenced by a 32-bit hash. The original strings are
//! kept in a trailing table of each file, but the source tool does not always
//! retain them, so failing to resolve a hash is expected and must not be fatal
//! when only displaying it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::FormatError;
use crate::primitive::{ByteReader, ByteWriter};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown hash 0x{0:08X}")]
pub struct UnknownHash(pub u32);

/// Formats a hash as `0xNNNNNNNN`.
pub fn hex(hash: u32) -> String {
    format!("0x{hash:08X}")
}

/// Anything that can map a hash back to its original string.
pub trait HashStrings {
    fn get_hash_string(&self, hash: u32) -> Result<&str, UnknownHash>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashStringTable {
    strings: BTreeMap<u32, String>,
}

impl HashStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins on duplicate hashes.
    pub fn insert(&mut self, hash: u32, original: impl Into<String>) {
        self.strings.insert(hash, original.into());
    }

    pub fn resolve(&self, hash: u32) -> Result<&str, UnknownHash> {
        self.strings
            .get(&hash)
            .map(String::as_str)
            .ok_or(UnknownHash(hash))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.strings.iter().map(|(hash, s)| (*hash, s.as_str()))
    }

    /// Reads the trailing `count × (hash, string)` section of a build/anim file.
    pub(crate) fn read(reader: &mut ByteReader) -> Result<Self, FormatError> {
        let count = reader.read_u32()?;
        let mut table = Self::new();
        for _ in 0..count {
            let hash = reader.read_u32()?;
            let original = reader.read_string()?;
            table.insert(hash, original);
        }
        Ok(table)
    }

    pub(crate) fn write(&self, writer: &mut ByteWriter) {
        writer.write_len(self.strings.len());
        for (hash, original) in &self.strings {
            writer.write_u32(*hash);
            writer.write_string(original, true);
        }
    }
}

impl HashStrings for HashStringTable {
    fn get_hash_string(&self, hash: u32) -> Result<&str, UnknownHash> {
        self.resolve(hash)
    }
}

impl FromIterator<(u32, String)> for HashStringTable {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        Self {
            strings: iter.into_iter().collect(),
        }
    }
}

/// A string referenced by hash. The table that resolves it is supplied by the
/// owning file at lookup time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashRef(pub u32);

impl HashRef {
    pub fn hash(self) -> u32 {
        self.0
    }

    pub fn resolve<T: HashStrings + ?Sized>(self, table: &T) -> Result<&str, UnknownHash> {
        table.get_hash_string(self.0)
    }

    /// Displays the original string, or the hex hash when it is not in `table`.
    pub fn display<T: HashStrings + ?Sized>(self, table: &T) -> HashDisplay<'_, T> {
        HashDisplay { hash: self, table }
    }
}

pub struct HashDisplay<'a, T: ?Sized> {
    hash: HashRef,
    table: &'a T,
}

impl<T: HashStrings + ?Sized> fmt::Display for HashDisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hash.resolve(self.table) {
            Ok(s) => f.write_str(s),
            Err(_) => f.write_str(&hex(self.hash.0)),
        }
    }
}
