use crate::Error;
use core::mem;
use std::io;

#[derive(Clone, Copy)]
pub(crate) enum Endian {
    Little,
    Big,
}

pub(crate) trait Source<'bytes> {
    fn read_bytes(&mut self, len: usize) -> io::Result<&'bytes [u8]>;

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn seek_absolute(&mut self, pos: usize) -> io::Result<()>;

    #[must_use]
    fn stream_position(&self) -> usize;

    fn read<T>(&mut self, endian: Endian) -> io::Result<T>
    where
        T: BinaryReadable<Item = T>,
    {
        T::from_stream(self, endian)
    }

    fn read_protocol<T>(&mut self, endian: Endian) -> io::Result<T::Item>
    where
        T: BinaryReadable,
    {
        T::from_stream(self, endian)
    }

    fn save_restore_position<F, T>(&mut self, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let position = self.stream_position();
        let result = f(self);
        self.seek_absolute(position)?;
        Ok(result)
    }

    fn skip(&mut self, len: usize) -> io::Result<()> {
        if let Some(pos) = self.stream_position().checked_add(len) {
            self.seek_absolute(pos)
        } else {
            Err(io::ErrorKind::UnexpectedEof.into())
        }
    }

    fn expect_tag(&mut self, tag: &'static [u8]) -> crate::Result<()> {
        let offset = self.stream_position();
        let bytes = self.read_bytes(tag.len()).map_err(Error::from)?;
        if bytes == tag {
            Ok(())
        } else {
            Err(Error::BadMagic { offset })
        }
    }
}

pub(crate) struct BorrowedSource<'bytes> {
    source: &'bytes [u8],
    pos: usize,
}

impl<'bytes> From<&'bytes [u8]> for BorrowedSource<'bytes> {
    fn from(source: &'bytes [u8]) -> Self {
        Self { source, pos: 0 }
    }
}

impl<'bytes> Source<'bytes> for BorrowedSource<'bytes> {
    fn read_bytes(&mut self, len: usize) -> io::Result<&'bytes [u8]> {
        let start = self.pos;
        let stop = start + len;
        if stop > self.source.len() {
            Err(io::ErrorKind::UnexpectedEof.into())
        } else {
            self.pos = stop;
            Ok(&self.source[start..stop])
        }
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let bytes = self.read_bytes(buf.len())?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    fn seek_absolute(&mut self, pos: usize) -> io::Result<()> {
        if pos > self.source.len() {
            Err(io::ErrorKind::UnexpectedEof.into())
        } else {
            self.pos = pos;
            Ok(())
        }
    }

    fn stream_position(&self) -> usize {
        self.pos
    }
}

pub(crate) trait BinaryReadable {
    type Item;

    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>;
}

macro_rules! make_binary_readable {
    ($t:ty) => {
        impl BinaryReadable for $t {
            type Item = $t;

            fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
            where
                In: ?Sized + Source<'bytes>,
            {
                let mut bytes = [0u8; mem::size_of::<Self::Item>()];
                stream.read_into(&mut bytes)?;
                Ok(match endian {
                    Endian::Little => Self::from_le_bytes(bytes),
                    Endian::Big => Self::from_be_bytes(bytes),
                })
            }
        }
    };
}

make_binary_readable!(u8);
make_binary_readable!(u16);
make_binary_readable!(u32);

macro_rules! make_binary_readable_tuple {
    ($($t:ident),+) => {
        impl<$($t,)+> BinaryReadable for ($($t,)+)
        where
            $($t: BinaryReadable,)+
        {
            type Item = ($($t::Item,)+);

            fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self::Item>
            where
                In: ?Sized + Source<'bytes>,
            {
                Ok(($(
                    $t::from_stream(stream, endian)?,
                )+))
            }
        }
    };
}

make_binary_readable_tuple!(T0, T1);
make_binary_readable_tuple!(T0, T1, T2);
make_binary_readable_tuple!(T0, T1, T2, T3);
make_binary_readable_tuple!(T0, T1, T2, T3, T4);
make_binary_readable_tuple!(T0, T1, T2, T3, T4, T5);
