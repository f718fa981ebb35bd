//! Classifying the game executable and archives by checksum, and patching
//! the executable so it reads the loose file tree instead of the archives.

use crate::Result;
use bstr::ByteSlice as _;
use memmap2::MmapMut;
use sha2::{Digest as _, Sha256};
use std::{
    fs,
    io::Read as _,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const EXE_NAME: &str = "DARKSOULS.exe";
pub const GFWL_EXE_NAME: &str = "DATA.exe";

mod checksums {
    pub const RELEASE: &str = "67bcab513c8f0ed6164279d85f302e06b1d8a53abff5df7f3d10e1d4dfd81459";
    pub const RELEASE_PATCHED: &str =
        "52877d26431ae4f543c97a8fbe2d0eb0b836de29e8946556f99cf05c94a670b5";
    pub const DEBUG: &str = "b6958f3f0db5fdb7ce6f56bff14353d8d81da8bae3456795a39dbe217c1897cf";
    pub const DEBUG_PATCHED: &str =
        "13e5333bbf11cdcc1a20d9c53ca822ce872ce0405c6cc8cc5eaa04174f991fd0";
}

/// The eight archive files and their known checksums, in file-name order.
pub const ARCHIVE_CHECKSUMS: &[(&str, &str)] = &[
    (
        "dvdbnd0.bdt",
        "5ba004380a984a08acbe7e231a26ebe5aeafba68cf2803ee76d5b73e61cfd41b",
    ),
    (
        "dvdbnd0.bhd5",
        "48f8df35af7dbece0805994fe699e6e8ff99351022d135b0ea49e1a119078107",
    ),
    (
        "dvdbnd1.bdt",
        "c3d7827642e76564c4c13eccb0280e105896f88c0b3f68c58025cce051e9c98f",
    ),
    (
        "dvdbnd1.bhd5",
        "a1d814182df2f71be406aab5dc6da7bca696028d1ae7dfad12666d0f7c6cd9e0",
    ),
    (
        "dvdbnd2.bdt",
        "3d085778404185881a60c12dadaaca6041af643efbbf63f2da15a7ab6af45e0a",
    ),
    (
        "dvdbnd2.bhd5",
        "e4fb6eec5f38225c4f785f0172128bcd885605a49ee2acb5d8def513c3a14b83",
    ),
    (
        "dvdbnd3.bdt",
        "13578a204b1fb3efa246b63bd15ed45006017d416a91b06659b4d3c3ee5f8a89",
    ),
    (
        "dvdbnd3.bhd5",
        "a0e0d0255e375838dc4a0ccff85b21f4896e01a06f43a4e78282dc4e3cba5de6",
    ),
];

// UTF-16LE find/replace pairs, equal length so the binary never changes
// size. The archive device names become the loose-tree devices.
const STRING_PATCHES: &[(&[u8], &[u8])] = &[
    (
        b"d\0v\0d\0b\0n\0d\0\x30\0:\0",
        b"d\0v\0d\0r\0o\0o\0t\0:\0",
    ),
    (
        b"d\0v\0d\0b\0n\0d\0\x31\0:\0",
        b"d\0v\0d\0r\0o\0o\0t\0:\0",
    ),
    (
        b"d\0v\0d\0b\0n\0d\0\x32\0:\0",
        b"d\0v\0d\0r\0o\0o\0t\0:\0",
    ),
    (
        b"d\0v\0d\0b\0n\0d\0\x33\0:\0",
        b"d\0v\0d\0r\0o\0o\0t\0:\0",
    ),
    (b"h\0k\0x\0b\0n\0d\0:\0", b"m\0a\0p\0h\0k\0x\0:\0"),
    (b"t\0p\0f\0b\0n\0d\0:\0", b"m\0a\0p\0:\0/\0t\0x\0"),
    (b"%\0s\0t\0p\0f\0", b"c\0h\0r\0\0\0\0\0"),
];

mod patch_offsets {
    // Two-byte JMP over the DCX loader branch, per build. Selected by the
    // pre-patch checksum; unknown builds are left alone.
    pub const DCX_SKIP: [u8; 2] = [0xEB, 0x12];
    pub const RELEASE_DCX_SKIP: usize = 0x007E_41D0;
    pub const DEBUG_DCX_SKIP: usize = 0x0083_F6B0;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExeStatus {
    /// The known retail build, not yet patched.
    Pristine,
    /// The known debug build, not yet patched.
    PristineDebug,
    /// The retail build after patching.
    Patched,
    /// The debug build after patching.
    PatchedDebug,
    /// `DARKSOULS.exe` exists but matches no known checksum.
    Unknown,
    /// Only the unsupported Games for Windows Live `DATA.exe` exists.
    Gfwl,
    /// No executable found.
    Missing,
}

/// SHA-256 of a whole file, read in 64 KiB blocks.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = fs::File::open(path)?;
    let mut block = [0u8; 65536];
    loop {
        let count = file.read(&mut block)?;
        if count == 0 {
            break;
        }
        hasher.update(&block[..count]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Finds the executable in `dir` and classifies it by checksum.
pub fn classify_exe(dir: &Path) -> Result<(PathBuf, ExeStatus)> {
    let exe = dir.join(EXE_NAME);
    if exe.is_file() {
        let checksum = file_checksum(&exe)?;
        let status = match checksum.as_str() {
            checksums::RELEASE => ExeStatus::Pristine,
            checksums::DEBUG => ExeStatus::PristineDebug,
            checksums::RELEASE_PATCHED => ExeStatus::Patched,
            checksums::DEBUG_PATCHED => ExeStatus::PatchedDebug,
            _ => ExeStatus::Unknown,
        };
        return Ok((exe, status));
    }

    let gfwl = dir.join(GFWL_EXE_NAME);
    if gfwl.is_file() {
        Ok((gfwl, ExeStatus::Gfwl))
    } else {
        Ok((exe, ExeStatus::Missing))
    }
}

/// What `check_archives` found in the directory.
pub struct ArchiveReport {
    pub present: Vec<String>,
    pub matching: Vec<String>,
    pub missing: Vec<String>,
}

/// Checksums every archive file in `dir` against the known values.
pub fn check_archives(dir: &Path) -> Result<ArchiveReport> {
    let mut report = ArchiveReport {
        present: Vec::new(),
        matching: Vec::new(),
        missing: Vec::new(),
    };
    for (name, expected) in ARCHIVE_CHECKSUMS {
        let path = dir.join(name);
        if path.is_file() {
            info!("computing checksum of archive file {name}");
            report.present.push((*name).to_owned());
            if file_checksum(&path)? == *expected {
                report.matching.push((*name).to_owned());
            }
        } else {
            report.missing.push((*name).to_owned());
        }
    }
    Ok(report)
}

/// Applies every string patch to `bytes`, returning how many occurrences
/// were rewritten.
pub fn patch_strings(bytes: &mut [u8]) -> usize {
    let mut count = 0;
    for (find, replace) in STRING_PATCHES {
        debug_assert_eq!(find.len(), replace.len());
        let mut start = 0;
        while let Some(position) = bytes[start..].find(find) {
            let at = start + position;
            bytes[at..at + replace.len()].copy_from_slice(replace);
            count += 1;
            start = at + replace.len();
        }
    }
    count
}

fn dcx_skip_offset(status: ExeStatus) -> Option<usize> {
    match status {
        ExeStatus::Pristine => Some(patch_offsets::RELEASE_DCX_SKIP),
        ExeStatus::PristineDebug => Some(patch_offsets::DEBUG_DCX_SKIP),
        _ => None,
    }
}

/// Patches the executable in place through a memory map: device-string
/// replacements everywhere, plus the DCX-loader skip for known builds.
/// `status` must be the classification from before any modification.
pub fn patch_executable(path: &Path, status: ExeStatus) -> Result<usize> {
    let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
    let mut map = unsafe { MmapMut::map_mut(&file)? };

    let count = patch_strings(&mut map);
    info!("rewrote {count} archive device strings in {}", path.display());

    if let Some(offset) = dcx_skip_offset(status) {
        if offset + patch_offsets::DCX_SKIP.len() <= map.len() {
            map[offset..offset + patch_offsets::DCX_SKIP.len()]
                .copy_from_slice(&patch_offsets::DCX_SKIP);
        } else {
            warn!(
                "executable is too small for the DCX skip at {offset:#x}; leaving it unpatched"
            );
        }
    }

    map.flush()?;
    Ok(count)
}
