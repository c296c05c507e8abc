use std::io;
use std::io::Write as _;

use flate2::write::GzEncoder;

use crate::defs::{IntoResult, Result};
use crate::store::{Compression, Tag, WriterParams, MAGIC, VERSION};

enum RawWriter<W: io::Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: io::Write> io::Write for RawWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RawWriter::Plain(inner) => inner.write(buf),
            RawWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RawWriter::Plain(inner) => inner.flush(),
            RawWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

pub struct Writer<W: io::Write> {
    writer: RawWriter<W>,
}

impl<W: io::Write> Writer<W> {
    pub fn new(mut inner: W, tag: Tag, params: &WriterParams) -> Result<Self> {
        inner
            .write_all(&MAGIC.to_le_bytes())
            .res(|| "failed to write magic".to_string())?;
        inner
            .write_all(&VERSION.to_le_bytes())
            .res(|| "failed to write version".to_string())?;
        inner
            .write_all(&tag)
            .res(|| "failed to write payload tag".to_string())?;
        inner
            .write_all(&(params.compression as i32).to_le_bytes())
            .res(|| "failed to write compression".to_string())?;

        let writer = match params.compression {
            Compression::None => RawWriter::Plain(inner),
            Compression::Gzip => {
                let compression = flate2::Compression::new(params.gzip_level);
                RawWriter::Gzip(GzEncoder::new(inner, compression))
            }
        };

        Ok(Self { writer })
    }

    pub fn write_u32(&mut self, val: u32) -> Result<()> {
        self.writer
            .write_all(&val.to_le_bytes())
            .res(|| "failed to write u32 value".to_string())
    }

    pub fn write_u64(&mut self, val: u64) -> Result<()> {
        self.writer
            .write_all(&val.to_le_bytes())
            .res(|| "failed to write u64 value".to_string())
    }

    pub fn write_f32(&mut self, val: f32) -> Result<()> {
        self.writer
            .write_all(&val.to_le_bytes())
            .res(|| "failed to write f32 value".to_string())
    }

    // Must be called to flush the compressor; dropping the writer may
    // silently lose the tail of the payload.
    pub fn into_inner(self) -> Result<W> {
        match self.writer {
            RawWriter::Plain(mut inner) => {
                inner.flush().res(|| "failed to flush payload".to_string())?;
                Ok(inner)
            }
            RawWriter::Gzip(encoder) => encoder
                .finish()
                .res(|| "failed to finish encoding".to_string()),
        }
    }
}
