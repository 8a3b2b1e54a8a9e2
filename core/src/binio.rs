//! Binary Readers and Writers
//!
//! Helpers for the little-endian binary files used for compiled scenes and
//! tabulated BSDFs.

use crate::geometry::Vector3f;
use crate::math::Float;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Errors reading or writing binary files.
#[derive(Error, Debug)]
pub enum BinaryError {
    /// Underlying I/O failure, including truncated files.
    #[error("I/O error. {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the expected magic bytes.
    #[error("invalid header '{found}'. Expected '{expected}'")]
    BadHeader {
        /// Header found, lossily decoded.
        found: String,
        /// Header expected.
        expected: String,
    },

    /// A value was read successfully but is not acceptable.
    #[error("{0}")]
    Invalid(String),
}

/// Opens a file for reading or returns an error if unable to do so.
///
/// * `path` - The file path.
pub fn open_file(path: &str) -> Result<File, BinaryError> {
    debug!("Opening '{}'", path);
    File::open(path).map_err(|err| {
        BinaryError::Io(io::Error::new(err.kind(), format!("could not open {}. {}", path, err)))
    })
}

/// Interface to add helpers for reading little-endian binary files.
///
/// `NOTE`: Implemented for every `Read` so it works on files and in-memory
/// buffers alike.
pub trait BinaryReader: Read {
    /// Reads the header bytes and compares them to the expected header.
    ///
    /// * `expected` - The expected magic bytes.
    fn check_header(&mut self, expected: &[u8]) -> Result<(), BinaryError> {
        let mut header = vec![0_u8; expected.len()];
        self.read_exact(&mut header)?;
        if header == expected {
            Ok(())
        } else {
            Err(BinaryError::BadHeader {
                found: String::from_utf8_lossy(&header).into_owned(),
                expected: String::from_utf8_lossy(expected).into_owned(),
            })
        }
    }

    /// Reads one unsigned byte.
    fn read_byte(&mut self) -> Result<u8, BinaryError> {
        Ok(ReadBytesExt::read_u8(self)?)
    }

    /// Reads one 32-bit unsigned value.
    fn read_u32_le(&mut self) -> Result<u32, BinaryError> {
        Ok(ReadBytesExt::read_u32::<LittleEndian>(self)?)
    }

    /// Reads one 32-bit signed value.
    fn read_i32_le(&mut self) -> Result<i32, BinaryError> {
        Ok(ReadBytesExt::read_i32::<LittleEndian>(self)?)
    }

    /// Reads one 64-bit unsigned value.
    fn read_u64_le(&mut self) -> Result<u64, BinaryError> {
        Ok(ReadBytesExt::read_u64::<LittleEndian>(self)?)
    }

    /// Reads one 32-bit floating point value.
    fn read_f32_le(&mut self) -> Result<Float, BinaryError> {
        Ok(ReadBytesExt::read_f32::<LittleEndian>(self)? as Float)
    }

    /// Reads one 64-bit floating point value.
    fn read_f64_le(&mut self) -> Result<Float, BinaryError> {
        Ok(ReadBytesExt::read_f64::<LittleEndian>(self)?)
    }

    /// Reads a count that must not exceed `limit`. Guards allocations
    /// against corrupt files.
    ///
    /// * `limit` - Largest acceptable count.
    /// * `what`  - Name used in the error message.
    fn read_count(&mut self, limit: usize, what: &str) -> Result<usize, BinaryError> {
        let n = self.read_u32_le()? as usize;
        if n > limit {
            Err(BinaryError::Invalid(format!(
                "{} count {} exceeds limit {}",
                what, n, limit
            )))
        } else {
            Ok(n)
        }
    }

    /// Reads given number of 32-bit signed values.
    ///
    /// * `count` - Number of values to read.
    fn read_i32_vec(&mut self, count: usize) -> Result<Vec<i32>, BinaryError> {
        let mut buffer = vec![0_i32; count];
        ReadBytesExt::read_i32_into::<LittleEndian>(self, &mut buffer)?;
        Ok(buffer)
    }

    /// Reads given number of 32-bit floating point values.
    ///
    /// * `count` - Number of values to read.
    fn read_f32_vec(&mut self, count: usize) -> Result<Vec<Float>, BinaryError> {
        let mut buffer: Vec<f32> = vec![0.0; count];
        ReadBytesExt::read_f32_into::<LittleEndian>(self, &mut buffer)?;
        Ok(buffer.into_iter().map(|v| v as Float).collect())
    }

    /// Reads given number of 64-bit floating point values.
    ///
    /// * `count` - Number of values to read.
    fn read_f64_vec(&mut self, count: usize) -> Result<Vec<Float>, BinaryError> {
        let mut buffer: Vec<f64> = vec![0.0; count];
        ReadBytesExt::read_f64_into::<LittleEndian>(self, &mut buffer)?;
        Ok(buffer)
    }

    /// Reads three 64-bit floating point values as a vector.
    fn read_vector3f(&mut self) -> Result<Vector3f, BinaryError> {
        let x = self.read_f64_le()?;
        let y = self.read_f64_le()?;
        let z = self.read_f64_le()?;
        Ok(Vector3f::new(x, y, z))
    }

    /// Reads a length prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String, BinaryError> {
        let n = self.read_count(1 << 20, "string length")?;
        let mut buf = vec![0_u8; n];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|err| BinaryError::Invalid(format!("invalid string. {}", err)))
    }
}

impl<R: Read + ?Sized> BinaryReader for R {}

/// Interface to add helpers for writing little-endian binary files.
pub trait BinaryWriter: Write {
    /// Writes one unsigned byte.
    ///
    /// * `v` - The value.
    fn write_byte(&mut self, v: u8) -> Result<(), BinaryError> {
        Ok(WriteBytesExt::write_u8(self, v)?)
    }

    /// Writes one 32-bit unsigned value.
    ///
    /// * `v` - The value.
    fn write_u32_le(&mut self, v: u32) -> Result<(), BinaryError> {
        Ok(WriteBytesExt::write_u32::<LittleEndian>(self, v)?)
    }

    /// Writes one 32-bit signed value.
    ///
    /// * `v` - The value.
    fn write_i32_le(&mut self, v: i32) -> Result<(), BinaryError> {
        Ok(WriteBytesExt::write_i32::<LittleEndian>(self, v)?)
    }

    /// Writes one 64-bit unsigned value.
    ///
    /// * `v` - The value.
    fn write_u64_le(&mut self, v: u64) -> Result<(), BinaryError> {
        Ok(WriteBytesExt::write_u64::<LittleEndian>(self, v)?)
    }

    /// Writes one value narrowed to 32-bit floating point.
    ///
    /// * `v` - The value.
    fn write_f32_le(&mut self, v: Float) -> Result<(), BinaryError> {
        Ok(WriteBytesExt::write_f32::<LittleEndian>(self, v as f32)?)
    }

    /// Writes one 64-bit floating point value.
    ///
    /// * `v` - The value.
    fn write_f64_le(&mut self, v: Float) -> Result<(), BinaryError> {
        Ok(WriteBytesExt::write_f64::<LittleEndian>(self, v)?)
    }

    /// Writes a vector as three 64-bit floating point values.
    ///
    /// * `v` - The vector.
    fn write_vector3f(&mut self, v: &Vector3f) -> Result<(), BinaryError> {
        self.write_f64_le(v.x)?;
        self.write_f64_le(v.y)?;
        self.write_f64_le(v.z)
    }

    /// Writes a length prefixed UTF-8 string.
    ///
    /// * `s` - The string.
    fn write_string(&mut self, s: &str) -> Result<(), BinaryError> {
        self.write_u32_le(s.len() as u32)?;
        Ok(self.write_all(s.as_bytes())?)
    }
}

impl<W: Write + ?Sized> BinaryWriter for W {}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn values_written_are_read_back_in_order() {
        let mut buf = Vec::new();
        buf.write_all(b"MAGIC").unwrap();
        buf.write_u32_le(7).unwrap();
        buf.write_f64_le(-2.5).unwrap();
        buf.write_string("sky").unwrap();
        buf.write_vector3f(&Vector3f::new(1.0, 2.0, 3.0)).unwrap();

        let mut r = Cursor::new(buf);
        r.check_header(b"MAGIC").unwrap();
        assert_eq!(r.read_u32_le().unwrap(), 7);
        assert_eq!(r.read_f64_le().unwrap(), -2.5);
        assert_eq!(r.read_string().unwrap(), "sky");
        assert_eq!(r.read_vector3f().unwrap(), Vector3f::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn wrong_header_is_rejected() {
        let mut r = Cursor::new(b"NOTMAGIC".to_vec());
        assert!(matches!(
            r.check_header(b"SCATFUN\x01"),
            Err(BinaryError::BadHeader { .. })
        ));
    }

    #[test]
    fn truncated_input_is_an_io_error() {
        let mut r = Cursor::new(vec![1_u8, 2]);
        assert!(matches!(r.read_u32_le(), Err(BinaryError::Io(_))));
    }

    #[test]
    fn oversized_count_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u32_le(1000).unwrap();
        let mut r = Cursor::new(buf);
        assert!(matches!(r.read_count(10, "node"), Err(BinaryError::Invalid(_))));
    }
}
