use std::io::Read;

use flate2::read::GzDecoder;

use crate::defs::{Error, ErrorKind::*, IntoResult, Result};
use crate::store::{Compression, Tag, MAGIC, VERSION};

pub struct Reader {
    reader: Box<dyn Read>,
}

impl Reader {
    pub fn new<R: Read + 'static>(mut reader: R, tag: Tag) -> Result<Self> {
        let mut buf = [0; 4];

        reader
            .read_exact(&mut buf)
            .res(|| "failed to read magic".to_string())?;
        let val = u32::from_le_bytes(buf);
        if val != MAGIC {
            return Err(Error::new(
                MalformedData,
                format!("bad magic '{:#X}'", val),
            ));
        }

        reader
            .read_exact(&mut buf)
            .res(|| "failed to read version".to_string())?;
        let val = u32::from_le_bytes(buf);
        if val != VERSION {
            return Err(Error::new(
                UnsupportedFeature,
                format!("unsupported version '{}'", val),
            ));
        }

        reader
            .read_exact(&mut buf)
            .res(|| "failed to read payload tag".to_string())?;
        if buf != tag {
            return Err(Error::new(
                MalformedData,
                format!(
                    "unexpected payload tag '{}'",
                    String::from_utf8_lossy(&buf)
                ),
            ));
        }

        reader
            .read_exact(&mut buf)
            .res(|| "failed to read compression".to_string())?;
        let val = i32::from_le_bytes(buf);

        const COMPRESSION_NONE: i32 = Compression::None as i32;
        const COMPRESSION_GZIP: i32 = Compression::Gzip as i32;

        let dec_reader: Box<dyn Read> = match val {
            COMPRESSION_NONE => Box::new(reader),
            COMPRESSION_GZIP => Box::new(GzDecoder::new(reader)),
            _ => {
                return Err(Error::new(
                    MalformedData,
                    format!("unknown compression '{}'", val),
                ));
            }
        };

        Ok(Self { reader: dec_reader })
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0; N];
        self.reader
            .read_exact(&mut buf)
            .res(|| format!("failed to read {}", what))?;
        Ok(buf)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array("u32 value")?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array("u64 value")?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array("f32 value")?))
    }
}
