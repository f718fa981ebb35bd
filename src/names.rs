//! The hash → path dictionary used to give hashed archive records their
//! names back.
//!
//! The hashed index stores only a 32-bit hash of each canonical archive path
//! (lower-cased, forward slashes, leading `/`). Recovering the path requires
//! a dictionary of every name the game is known to request. Two file shapes
//! feed it: the dictionary proper, one `<hex hash> <path>` pair per line,
//! and a plain path listing whose hashes are computed at load time. The
//! listing bundled under `data/` covers the shipped archives; both shapes
//! can be merged in at runtime.

use crate::{Error, Result};
use bstr::BString;
use std::collections::HashMap;

const BUNDLED_LISTING: &str = include_str!("../data/filelist.txt");

/// Hashes a canonical archive path the way the hashed index does: multiply
/// by 37 and add each byte, lower-cased, with `\` treated as `/`.
#[must_use]
pub fn hash_path(path: &str) -> u32 {
    path.bytes().fold(0u32, |hash, byte| {
        let byte = match byte {
            b'A'..=b'Z' => byte - b'A' + b'a',
            b'\\' => b'/',
            _ => byte,
        };
        hash.wrapping_mul(37).wrapping_add(u32::from(byte))
    })
}

/// Rewrites `\` separators to `/` in a raw record name.
pub(crate) fn normalize_separators(name: &mut BString) {
    for byte in name.iter_mut() {
        if *byte == b'\\' {
            *byte = b'/';
        }
    }
}

pub struct NameTable {
    map: HashMap<u32, String>,
}

impl NameTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// The table built from the bundled listing.
    #[must_use]
    pub fn bundled() -> Self {
        Self::from_listing(BUNDLED_LISTING)
    }

    /// Builds a table from a listing: one path per line, `#` comments and
    /// blank lines skipped. Hashes are computed at load time.
    #[must_use]
    pub fn from_listing(listing: &str) -> Self {
        let mut table = Self::new();
        table.extend_from_listing(listing);
        table
    }

    pub fn extend_from_listing(&mut self, listing: &str) {
        for line in listing.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.insert(line);
        }
    }

    /// Builds a table from a dictionary file: one `<hex hash> <path>` pair
    /// per line, `#` comments and blank lines skipped. The hash may carry an
    /// `0x` prefix and is taken as given, not recomputed from the path.
    pub fn from_pairs(dictionary: &str) -> Result<Self> {
        let mut table = Self::new();
        table.extend_from_pairs(dictionary)?;
        Ok(table)
    }

    pub fn extend_from_pairs(&mut self, dictionary: &str) -> Result<()> {
        for line in dictionary.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((hash, path)) = line.split_once(char::is_whitespace) else {
                return Err(Error::Malformed(format!(
                    "dictionary line has no path: {line:?}"
                )));
            };
            let digits = hash
                .strip_prefix("0x")
                .or_else(|| hash.strip_prefix("0X"))
                .unwrap_or(hash);
            let hash = u32::from_str_radix(digits, 16).map_err(|error| {
                Error::Malformed(format!("dictionary hash {hash:?}: {error}"))
            })?;
            self.map.insert(hash, path.trim_start().to_owned());
        }
        Ok(())
    }

    /// Registers a path, returning its hash. A later entry with the same
    /// hash replaces the earlier one.
    pub fn insert(&mut self, path: &str) -> u32 {
        let hash = hash_path(path);
        self.map.insert(hash, path.to_owned());
        hash
    }

    #[must_use]
    pub fn get(&self, hash: u32) -> Option<&str> {
        self.map.get(&hash).map(String::as_str)
    }

    pub fn resolve(&self, hash: u32) -> Result<&str> {
        self.get(hash).ok_or(Error::UnknownHash(hash))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.map.iter().map(|(&hash, path)| (hash, path.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{hash_path, NameTable};
    use crate::Error;

    #[test]
    fn validate_hashing() {
        assert_eq!(hash_path("/chr/c0000.anibnd.dcx"), 0xF863_0FB1);
        assert_eq!(hash_path("/msg/ENGLISH/menu.msgbnd.dcx"), 0x76EA_6189);
        assert_eq!(hash_path("/event/common.emevd"), 0x471A_8BA8);
        assert_eq!(hash_path("/mtd/Mtd.mtdbnd.dcx"), 0xE101_C004);
        assert_eq!(hash_path("dir/file.txt"), 0xE358_1124);
    }

    #[test]
    fn hashes_are_case_insensitive() {
        assert_eq!(
            hash_path("/CHR/C0000.ANIBND.DCX"),
            hash_path("/chr/c0000.anibnd.dcx")
        );
    }

    #[test]
    fn back_slashes_are_same_as_forward_slashes() {
        assert_eq!(
            hash_path("\\chr\\c0000.anibnd.dcx"),
            hash_path("/chr/c0000.anibnd.dcx")
        );
    }

    #[test]
    fn listing_round_trips() {
        let table = NameTable::from_listing("# comment\n/dir/a.bin\n\n/dir/b.bin\n");
        assert_eq!(table.len(), 2);
        for (hash, path) in table.iter() {
            assert_eq!(hash_path(path), hash);
            assert_eq!(table.get(hash), Some(path));
        }
    }

    #[test]
    fn bundled_listing_round_trips() {
        let table = NameTable::bundled();
        assert!(!table.is_empty());
        assert_eq!(
            table.resolve(0xF863_0FB1).ok(),
            Some("/chr/c0000.anibnd.dcx")
        );
        for (hash, path) in table.iter() {
            assert_eq!(hash_path(path), hash);
        }
    }

    #[test]
    fn pair_dictionary_round_trips() {
        let table = NameTable::from_pairs(
            "# dictionary\n\
             0x2EF41580 /param/GameParam/GameParam.parambnd.dcx\n\
             E3581124\tdir/file.txt\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(0x2EF4_1580),
            Some("/param/GameParam/GameParam.parambnd.dcx")
        );
        assert_eq!(table.get(0xE358_1124), Some("dir/file.txt"));
    }

    #[test]
    fn pair_hashes_are_taken_as_given() {
        let table = NameTable::from_pairs("0000002A /some/alias.bin").unwrap();
        assert_eq!(table.get(42), Some("/some/alias.bin"));
    }

    #[test]
    fn malformed_dictionary_lines_are_fatal() {
        assert!(matches!(
            NameTable::from_pairs("0xZZZZZZZZ /dir/file.txt"),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            NameTable::from_pairs("deadbeef"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn missing_hash_is_fatal() {
        let table = NameTable::new();
        assert!(matches!(
            table.resolve(0xDEAD_BEEF),
            Err(Error::UnknownHash(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn later_entry_wins() {
        let mut table = NameTable::new();
        let first = table.insert("/dir/a.bin");
        let second = table.insert("/DIR/A.BIN");
        assert_eq!(first, second);
        assert_eq!(table.get(first), Some("/DIR/A.BIN"));
    }
}
