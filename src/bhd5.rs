//! The hashed index half of the four outer archive pairs.
//!
//! Records carry no names, only a 32-bit hash of the canonical path; the
//! bins are a hash-bucketed directory and matter only for the game's own
//! lookups, so parsing flattens them in directory order.

use crate::{
    io::{BorrowedSource, Endian, Source},
    names::NameTable,
    Error, Result,
};
use std::{fs, path::Path};

mod constants {
    pub const MAGIC: &[u8] = b"BHD5";
    pub const SENTINEL: &[u8] = &[0xFF, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
}

#[derive(Clone, Copy, Debug)]
pub struct Record {
    pub name_hash: u32,
    pub payload_size: u32,
    pub payload_offset: u32,
}

pub struct Index {
    records: Vec<Record>,
}

impl Index {
    /// Reads and parses an index file. Index files are small; the whole file
    /// is buffered.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(bytes);
        source.expect_tag(constants::MAGIC)?;
        source.expect_tag(constants::SENTINEL)?;

        let (_file_size, bin_count, _bin_offset): (u32, u32, u32) = source.read(Endian::Little)?;

        let mut records = Vec::new();
        for _ in 0..bin_count {
            let (record_count, record_offset): (u32, u32) = source.read(Endian::Little)?;
            source.save_restore_position(|source| -> Result<()> {
                source.seek_absolute(record_offset as usize)?;
                for _ in 0..record_count {
                    let (name_hash, payload_size, payload_offset, terminator): (u32, u32, u32, u32) =
                        source.read(Endian::Little)?;
                    if terminator != 0 {
                        return Err(Error::Malformed(format!(
                            "record terminator is {terminator}, want 0"
                        )));
                    }
                    records.push(Record {
                        name_hash,
                        payload_size,
                        payload_offset,
                    });
                }
                Ok(())
            })??;
        }

        Ok(Self { records })
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pairs every record with its canonical path. A hash the dictionary
    /// does not know is fatal.
    pub fn resolve<'names>(&self, names: &'names NameTable) -> Result<Vec<(&'names str, Record)>> {
        self.records
            .iter()
            .map(|&record| Ok((names.resolve(record.name_hash)?, record)))
            .collect()
    }
}
