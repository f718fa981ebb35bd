#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

pub mod bdt;
pub mod bhd5;
pub mod bhf3;
pub mod bnd3;
mod cc;
pub mod dcx;
pub mod exe;
mod guess;
mod io;
pub mod names;
pub mod output;
mod strings;
pub mod unpack;

pub use guess::{
    appears_bdf3, appears_bhd5, appears_bhf3, appears_bnd3, appears_dcx, guess_format,
    ContainerKind,
};

pub use bstr::{BStr, BString};

use std::path::PathBuf;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unexpected magic bytes at offset {offset:#x}")]
    BadMagic { offset: usize },

    #[error(transparent)]
    Io(std::io::Error),

    #[error("malformed structure: {0}")]
    Malformed(String),

    #[error("read ran past the end of the data")]
    Truncated,

    #[error("no output route for data file extension: {path:?}")]
    UnknownExtension { path: PathBuf },

    #[error("unrecognised magic flag: {0:#x}")]
    UnknownFlag(u32),

    #[error("name hash {0:#010x} is not in the name dictionary")]
    UnknownHash(u32),

    #[error("data file {data:?} has no matching header file")]
    Unpaired { data: PathBuf },
}

// In-buffer reads surface exhaustion as `UnexpectedEof`; everything else is a
// genuine file-system failure.
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(value),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
