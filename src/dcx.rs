//! The DEFLATE wrapper the game stores most leaf assets in.
//!
//! A frame is a fixed run of tagged blocks (`DCX`, `DCS`, `DCP`/`DFLT`,
//! `DCA`) followed by a two-byte zlib prefix and a raw DEFLATE stream. Only
//! the `DFLT` algorithm exists in the wild and only it is accepted.

use crate::{
    io::{BorrowedSource, Endian, Source},
    Error, Result,
};
use bstr::ByteSlice as _;
use core::ops::Range;
use flate2::read::DeflateDecoder;
use std::io::Read as _;

mod constants {
    pub const DCX: &[u8] = b"DCX\x00";
    pub const DCS: &[u8] = b"DCS\x00";
    pub const DCP: &[u8] = b"DCP\x00";
    pub const DFLT: &[u8] = b"DFLT";
    pub const DCA: &[u8] = b"DCA\x00";
    pub const ZLIB_PREFIX: &[u8] = &[0x78, 0xDA];

    pub const FORMAT_WORD: u32 = 0x100;
    pub const HEADER_WORDS: [u32; 3] = [0x18, 0x24, 0x24];
    // Sits between DFLT and DCA. Meaning unknown; never validated.
    pub const OPAQUE_LEN: usize = 0x18;
}

/// A validated frame header. `payload` indexes the raw DEFLATE stream inside
/// the buffer the frame was parsed from, with the zlib prefix stripped.
#[derive(Clone, Debug)]
pub struct Frame {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    payload: Range<usize>,
}

impl Frame {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(bytes);
        source.expect_tag(constants::DCX)?;

        let format: u32 = source.read(Endian::Little)?;
        if format != constants::FORMAT_WORD {
            return Err(Error::Malformed(format!(
                "expected DCX format word {:#x}, got {format:#x}",
                constants::FORMAT_WORD
            )));
        }
        let words: (u32, u32, u32) = source.read(Endian::Big)?;
        if [words.0, words.1, words.2] != constants::HEADER_WORDS {
            return Err(Error::Malformed(format!(
                "unexpected DCX header words {words:#x?}"
            )));
        }
        let _header_length: u32 = source.read(Endian::Big)?;

        expect_block(&mut source, constants::DCS)?;
        let (uncompressed_size, compressed_size): (u32, u32) = source.read(Endian::Big)?;

        expect_block(&mut source, constants::DCP)?;
        expect_block(&mut source, constants::DFLT)?;
        source.skip(constants::OPAQUE_LEN)?;

        expect_block(&mut source, constants::DCA)?;
        let _compression_header_length: u32 = source.read(Endian::Big)?;

        expect_block(&mut source, constants::ZLIB_PREFIX)?;

        // The prefix counts towards the declared compressed size.
        let Some(deflated_len) = compressed_size.checked_sub(2) else {
            return Err(Error::Malformed(format!(
                "compressed size {compressed_size} is smaller than the zlib prefix"
            )));
        };
        let start = source.stream_position();
        let stop = start + deflated_len as usize;
        if stop > bytes.len() {
            return Err(Error::Truncated);
        }

        Ok(Self {
            uncompressed_size,
            compressed_size,
            payload: start..stop,
        })
    }

    /// The raw DEFLATE stream within `bytes`, which must be the buffer this
    /// frame was parsed from.
    #[must_use]
    pub fn payload<'bytes>(&self, bytes: &'bytes [u8]) -> &'bytes [u8] {
        &bytes[self.payload.clone()]
    }
}

/// Parses the frame and inflates the payload, requiring the output to match
/// the declared uncompressed size exactly.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let frame = Frame::parse(bytes)?;
    let mut decoder = DeflateDecoder::new(frame.payload(bytes));
    let mut inflated = Vec::with_capacity(frame.uncompressed_size as usize);
    decoder
        .read_to_end(&mut inflated)
        .map_err(|error| Error::Malformed(format!("DEFLATE stream: {error}")))?;
    if inflated.len() != frame.uncompressed_size as usize {
        return Err(Error::Malformed(format!(
            "inflated to {} bytes, expected {}",
            inflated.len(),
            frame.uncompressed_size
        )));
    }

    Ok(inflated)
}

fn expect_block<'bytes, In>(source: &mut In, tag: &'static [u8]) -> Result<()>
where
    In: ?Sized + Source<'bytes>,
{
    let offset = source.stream_position();
    let bytes = source.read_bytes(tag.len()).map_err(Error::from)?;
    if bytes == tag {
        Ok(())
    } else {
        Err(Error::Malformed(format!(
            "expected {:?} at offset {offset:#x}, got {:?}",
            tag.as_bstr(),
            bytes.as_bstr()
        )))
    }
}
