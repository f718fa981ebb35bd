use crate::io::{BinaryReadable, Endian, Source};
use bstr::BString as ByteString;
use std::io;

pub(crate) struct ZString;

impl BinaryReadable for ZString {
    type Item = ByteString;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let mut result = Vec::<u8>::new();
        loop {
            let byte: u8 = stream.read(endian)?;
            match byte {
                0 => break,
                byte => result.push(byte),
            };
        }

        Ok(ByteString::new(result))
    }
}
