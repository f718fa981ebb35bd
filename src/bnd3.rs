//! The single-file binder: an index plus inline payloads in one buffer.
//!
//! Three record layouts exist, keyed by the header's magic flag. `0x74` and
//! `0x54` records carry a duplicate of the size field; `0x70` records do
//! not. Record names historically came from a build machine's `N:` network
//! share, and names still carrying that prefix are routed to a separate
//! output root.

use crate::{
    io::{BorrowedSource, Endian, Source},
    names,
    strings::ZString,
    Error, Result,
};
use bstr::BString;

mod constants {
    pub const MAGIC: &[u8] = b"BND3";
    pub const FLAGS_OFFSET: usize = 0x0C;
    pub const RECORDS_OFFSET: usize = 0x20;
    pub const RECORD_SEP: u32 = 0x40;
}

#[derive(Clone, Debug)]
pub struct File<'bytes> {
    /// Parsed but unused downstream; kept for tooling that wants it.
    pub id: u32,
    /// Separators normalised to `/`, `N:` prefix stripped.
    pub name: BString,
    /// True when the raw name carried an `N:` prefix: the file belongs under
    /// the alternate output root.
    pub n_rooted: bool,
    payload: &'bytes [u8],
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn payload(&self) -> &'bytes [u8] {
        self.payload
    }
}

pub struct Binder<'bytes> {
    magic_flag: u32,
    files: Vec<File<'bytes>>,
}

impl<'bytes> Binder<'bytes> {
    pub fn parse(bytes: &'bytes [u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(bytes);
        source.expect_tag(constants::MAGIC)?;

        source.seek_absolute(constants::FLAGS_OFFSET)?;
        let (magic_flag, record_count, _names_end): (u32, u32, u32) =
            source.read(Endian::Little)?;
        if !matches!(magic_flag, 0x70 | 0x74 | 0x54) {
            return Err(Error::UnknownFlag(magic_flag));
        }

        source.seek_absolute(constants::RECORDS_OFFSET)?;
        let mut files = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let (record_sep, payload_size, payload_offset, id, name_offset): (
                u32,
                u32,
                u32,
                u32,
                u32,
            ) = source.read(Endian::Little)?;
            if magic_flag != 0x70 {
                let payload_size_dup: u32 = source.read(Endian::Little)?;
                if payload_size != payload_size_dup {
                    return Err(Error::Malformed(format!(
                        "record size {payload_size} does not match its duplicate {payload_size_dup}"
                    )));
                }
            }
            if record_sep != constants::RECORD_SEP {
                return Err(Error::Malformed(format!(
                    "record separator is {record_sep:#x}, want {:#x}",
                    constants::RECORD_SEP
                )));
            }

            let mut name = source.save_restore_position(|source| -> std::io::Result<BString> {
                source.seek_absolute(name_offset as usize)?;
                source.read_protocol::<ZString>(Endian::Little)
            })??;
            names::normalize_separators(&mut name);
            let n_rooted = strip_n_prefix(&mut name);

            let start = payload_offset as usize;
            let stop = start + payload_size as usize;
            let payload = bytes.get(start..stop).ok_or(Error::Truncated)?;

            files.push(File {
                id,
                name,
                n_rooted,
                payload,
            });
        }

        Ok(Self { magic_flag, files })
    }

    #[must_use]
    pub fn magic_flag(&self) -> u32 {
        self.magic_flag
    }

    #[must_use]
    pub fn files(&self) -> &[File<'bytes>] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn strip_n_prefix(name: &mut BString) -> bool {
    if name.len() >= 2 && (name[0] == b'N' || name[0] == b'n') && name[1] == b':' {
        name.drain(..2);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::Binder;
    use crate::Error;

    fn record_width(flag: u32) -> usize {
        if flag == 0x70 {
            20
        } else {
            24
        }
    }

    fn build_binder(flag: u32, entries: &[(&str, &[u8])]) -> Vec<u8> {
        let width = record_width(flag);
        let names_start = 0x20 + width * entries.len();
        let names_len: usize = entries.iter().map(|(name, _)| name.len() + 1).sum();
        let payload_start = names_start + names_len;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"BND307D7R6\x00\x00");
        bytes.extend_from_slice(&flag.to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(entries.len()).unwrap().to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(payload_start).unwrap().to_le_bytes());
        bytes.resize(0x20, 0);

        let mut name_offset = names_start;
        let mut payload_offset = payload_start;
        for (index, (name, payload)) in entries.iter().enumerate() {
            bytes.extend_from_slice(&0x40u32.to_le_bytes());
            bytes.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_le_bytes());
            bytes.extend_from_slice(&u32::try_from(payload_offset).unwrap().to_le_bytes());
            bytes.extend_from_slice(&u32::try_from(index).unwrap().to_le_bytes());
            bytes.extend_from_slice(&u32::try_from(name_offset).unwrap().to_le_bytes());
            if flag != 0x70 {
                bytes.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_le_bytes());
            }
            name_offset += name.len() + 1;
            payload_offset += payload.len();
        }
        for (name, _) in entries {
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(0);
        }
        for (_, payload) in entries {
            bytes.extend_from_slice(payload);
        }
        bytes
    }

    #[test]
    fn round_trips_record_order() {
        let entries: &[(&str, &[u8])] = &[
            ("test.txt", b"hello"),
            ("menu\\menu.drb", b"\x01\x02\x03"),
            ("sub\\dir\\deep.bin", b""),
        ];
        let bytes = build_binder(0x74, entries);
        assert!(crate::appears_bnd3(&bytes));

        let binder = Binder::parse(&bytes).unwrap();
        assert_eq!(binder.magic_flag(), 0x74);
        assert_eq!(binder.len(), 3);
        assert_eq!(binder.files()[0].name, "test.txt");
        assert_eq!(binder.files()[0].payload(), b"hello");
        assert_eq!(binder.files()[1].name, "menu/menu.drb");
        assert_eq!(binder.files()[1].payload(), b"\x01\x02\x03");
        assert_eq!(binder.files()[2].name, "sub/dir/deep.bin");
        assert_eq!(binder.files()[2].payload(), b"");
        assert!(binder.files().iter().all(|file| !file.n_rooted));
    }

    #[test]
    fn narrow_records() {
        let bytes = build_binder(0x70, &[("N:\\chr\\c0000.anibnd", b"X")]);
        let binder = Binder::parse(&bytes).unwrap();
        assert_eq!(binder.magic_flag(), 0x70);
        let file = &binder.files()[0];
        assert!(file.n_rooted);
        assert_eq!(file.name, "/chr/c0000.anibnd");
        assert_eq!(file.payload(), b"X");
    }

    #[test]
    fn all_known_flags_parse() {
        for flag in [0x70, 0x74, 0x54] {
            let bytes = build_binder(flag, &[("a.bin", b"a")]);
            assert_eq!(Binder::parse(&bytes).unwrap().magic_flag(), flag);
        }
    }

    #[test]
    fn lowercase_n_prefix_also_reroots() {
        let bytes = build_binder(0x54, &[("n:\\map\\m10.hkx", b"data")]);
        let binder = Binder::parse(&bytes).unwrap();
        assert!(binder.files()[0].n_rooted);
        assert_eq!(binder.files()[0].name, "/map/m10.hkx");
    }

    #[test]
    fn file_ids_are_preserved() {
        let bytes = build_binder(0x74, &[("a.bin", b"a"), ("b.bin", b"b")]);
        let binder = Binder::parse(&bytes).unwrap();
        assert_eq!(binder.files()[0].id, 0);
        assert_eq!(binder.files()[1].id, 1);
    }

    #[test]
    fn unknown_flag() {
        let bytes = build_binder(0x64, &[]);
        assert!(matches!(
            Binder::parse(&bytes),
            Err(Error::UnknownFlag(0x64))
        ));
    }

    #[test]
    fn wrong_magic() {
        let mut bytes = build_binder(0x74, &[]);
        bytes[0..4].copy_from_slice(b"BND4");
        assert!(matches!(
            Binder::parse(&bytes),
            Err(Error::BadMagic { offset: 0 })
        ));
    }

    #[test]
    fn size_duplicate_mismatch() {
        let mut bytes = build_binder(0x74, &[("a.bin", b"abc")]);
        bytes[0x34] = 2; // duplicate size field
        assert!(matches!(Binder::parse(&bytes), Err(Error::Malformed(_))));
    }

    #[test]
    fn bad_record_separator() {
        let mut bytes = build_binder(0x70, &[("a.bin", b"abc")]);
        bytes[0x20] = 0;
        assert!(matches!(Binder::parse(&bytes), Err(Error::Malformed(_))));
    }

    #[test]
    fn payload_out_of_bounds() {
        let mut bytes = build_binder(0x74, &[("a.bin", b"abc")]);
        let len = bytes.len();
        bytes.truncate(len - 2);
        assert!(matches!(Binder::parse(&bytes), Err(Error::Truncated)));
    }
}
