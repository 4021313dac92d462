//! Bitcoin compact-size integers

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::errors::{ProofError, WalletResult};

/// Read a compact-size integer, rejecting non-canonical encodings
pub fn read_varint<R: Read>(reader: &mut R) -> WalletResult<u64> {
    let n = reader.read_u8()?;
    let value = match n {
        0..=0xfc => n as u64,
        0xfd => {
            let v = reader.read_u16::<LittleEndian>()? as u64;
            if v < 0xfd {
                return Err(non_canonical(v));
            }
            v
        }
        0xfe => {
            let v = reader.read_u32::<LittleEndian>()? as u64;
            if v <= 0xffff {
                return Err(non_canonical(v));
            }
            v
        }
        0xff => {
            let v = reader.read_u64::<LittleEndian>()?;
            if v <= 0xffff_ffff {
                return Err(non_canonical(v));
            }
            v
        }
    };
    Ok(value)
}

fn non_canonical(v: u64) -> crate::errors::WalletError {
    ProofError::InvalidVarInt(v).into()
}

/// Append a compact-size integer
pub fn write_varint<W: Write>(writer: &mut W, n: u64) -> WalletResult<()> {
    if n < 0xfd {
        writer.write_u8(n as u8)?;
    } else if n <= 0xffff {
        writer.write_u8(0xfd)?;
        writer.write_u16::<LittleEndian>(n as u16)?;
    } else if n <= 0xffff_ffff {
        writer.write_u8(0xfe)?;
        writer.write_u32::<LittleEndian>(n as u32)?;
    } else {
        writer.write_u8(0xff)?;
        writer.write_u64::<LittleEndian>(n)?;
    }
    Ok(())
}

/// Encoded length in bytes
pub fn varint_size(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_varint() {
        let data = vec![
            0x01, 0xfd, 0x00, 0x01, 0xfe, 0x00, 0x00, 0x01, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
        ];
        let mut cursor = Cursor::new(data);
        assert_eq!(read_varint(&mut cursor).unwrap(), 1);
        assert_eq!(read_varint(&mut cursor).unwrap(), 0x100);
        assert_eq!(read_varint(&mut cursor).unwrap(), 0x10000);
        assert_eq!(read_varint(&mut cursor).unwrap(), 0x1_0000_0000);
    }

    #[test]
    fn test_write_varint() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 1).unwrap();
        write_varint(&mut buf, 0x100).unwrap();
        write_varint(&mut buf, 0x1_0000_0000).unwrap();
        assert_eq!(
            buf,
            vec![0x01, 0xfd, 0x00, 0x01, 0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_rejects_non_canonical() {
        let mut cursor = Cursor::new(vec![0xfd, 0x10, 0x00]);
        assert!(read_varint(&mut cursor).is_err());
    }

    #[test]
    fn test_truncated_varint() {
        let mut cursor = Cursor::new(vec![0xfe, 0x01]);
        assert!(read_varint(&mut cursor).is_err());
    }

    #[test]
    fn test_varint_size() {
        assert_eq!(varint_size(0), 1);
        assert_eq!(varint_size(0xfc), 1);
        assert_eq!(varint_size(0xfd), 3);
        assert_eq!(varint_size(0x1_0000), 5);
        assert_eq!(varint_size(u64::MAX), 9);
    }
}
