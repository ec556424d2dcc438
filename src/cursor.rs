use std::marker::PhantomData;

use byteorder::ByteOrder;

use crate::ReadError;

/// A forward-only reader over the payload of a single record.
///
/// The word order is a type parameter, so that the caller picks it once per
/// stream (see [`Endianness`](linux_perf_event_reader::Endianness)) and every
/// read in the decoder is monomorphized for it.
///
/// Reads never go past the end of the payload. Running out of bytes is
/// reported as a [`ReadError`], because record sizes come from the file and
/// cannot be trusted to match the fields they announce.
///
/// The `_if` variants implement the "optional field" pattern of the sample
/// format: if the condition is false they return zero and consume nothing.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a, T: ByteOrder> {
    data: &'a [u8],
    pos: usize,
    _order: PhantomData<T>,
}

impl<'a, T: ByteOrder> ByteCursor<'a, T> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            _order: PhantomData,
        }
    }

    /// The offset of the next unread byte, from the start of the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The number of bytes which haven't been consumed yet.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        let available = self.remaining();
        if len > available {
            return Err(ReadError::OutOfBounds {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(T::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(T::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReadError> {
        Ok(T::read_u64(self.take(8)?))
    }

    pub fn read_i8(&mut self) -> Result<i8, ReadError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        Ok(T::read_i16(self.take(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        Ok(T::read_i32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ReadError> {
        Ok(T::read_i64(self.take(8)?))
    }

    pub fn read_u8_if(&mut self, cond: bool) -> Result<u8, ReadError> {
        if cond {
            self.read_u8()
        } else {
            Ok(0)
        }
    }

    pub fn read_u16_if(&mut self, cond: bool) -> Result<u16, ReadError> {
        if cond {
            self.read_u16()
        } else {
            Ok(0)
        }
    }

    pub fn read_u32_if(&mut self, cond: bool) -> Result<u32, ReadError> {
        if cond {
            self.read_u32()
        } else {
            Ok(0)
        }
    }

    pub fn read_u64_if(&mut self, cond: bool) -> Result<u64, ReadError> {
        if cond {
            self.read_u64()
        } else {
            Ok(0)
        }
    }

    pub fn read_i8_if(&mut self, cond: bool) -> Result<i8, ReadError> {
        if cond {
            self.read_i8()
        } else {
            Ok(0)
        }
    }

    pub fn read_i16_if(&mut self, cond: bool) -> Result<i16, ReadError> {
        if cond {
            self.read_i16()
        } else {
            Ok(0)
        }
    }

    pub fn read_i32_if(&mut self, cond: bool) -> Result<i32, ReadError> {
        if cond {
            self.read_i32()
        } else {
            Ok(0)
        }
    }

    pub fn read_i64_if(&mut self, cond: bool) -> Result<i64, ReadError> {
        if cond {
            self.read_i64()
        } else {
            Ok(0)
        }
    }

    /// Reads a NUL-terminated string and returns the bytes before the NUL.
    /// The NUL itself is consumed too; any padding after it is not.
    pub fn read_cstr(&mut self) -> Result<&'a [u8], ReadError> {
        let rest = &self.data[self.pos..];
        let len = memchr::memchr(0, rest)
            .ok_or(ReadError::UnterminatedString { offset: self.pos })?;
        let s = &rest[..len];
        self.pos += len + 1;
        Ok(s)
    }

    pub fn read_cstr_if(&mut self, cond: bool) -> Result<&'a [u8], ReadError> {
        if cond {
            self.read_cstr()
        } else {
            Ok(&[])
        }
    }

    /// Borrows the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        self.take(len)
    }

    pub fn read_bytes_if(&mut self, cond: bool, len: usize) -> Result<&'a [u8], ReadError> {
        if cond {
            self.read_bytes(len)
        } else {
            Ok(&[])
        }
    }

    /// Fills `dest` with consecutive u64 values.
    pub fn read_u64_into(&mut self, dest: &mut [u64]) -> Result<(), ReadError> {
        let bytes = self.take(dest.len() * 8)?;
        T::read_u64_into(bytes, dest);
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ReadError> {
        self.take(len).map(|_| ())
    }

    pub fn skip_if(&mut self, cond: bool, len: usize) -> Result<(), ReadError> {
        if cond {
            self.skip(len)
        } else {
            Ok(())
        }
    }

    /// Reads a u64 item count and checks that `count` items of `elem_size`
    /// bytes each still fit into the rest of the payload.
    pub fn read_len(&mut self, elem_size: usize) -> Result<usize, ReadError> {
        let offset = self.pos;
        let count = self.read_u64()?;
        self.check_len(offset, count, elem_size)
    }

    /// Like [`read_len`](Self::read_len), but for a u32 count.
    pub fn read_len_u32(&mut self, elem_size: usize) -> Result<usize, ReadError> {
        let offset = self.pos;
        let count = self.read_u32()?;
        self.check_len(offset, u64::from(count), elem_size)
    }

    fn check_len(&self, offset: usize, count: u64, elem_size: usize) -> Result<usize, ReadError> {
        let available = self.remaining();
        let fits = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(elem_size))
            .is_some_and(|total| total <= available);
        if !fits {
            return Err(ReadError::LengthTooLarge {
                offset,
                count,
                elem_size,
                available,
            });
        }
        Ok(count as usize)
    }
}
