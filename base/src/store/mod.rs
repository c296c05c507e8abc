// Framed binary container for intermediate results (data costs, labelings).
// Layout: magic, version, 4-byte tag, compression, then a little-endian
// payload which is optionally gzip-compressed.

mod reader;
mod writer;

use std::result::Result as StdResult;
use std::str::FromStr;

use structopt::StructOpt;

use crate::defs::{Error, ErrorKind::*, Result};
pub use reader::*;
pub use writer::*;

pub const MAGIC: u32 = 0x7E3C_5EA1;
pub const VERSION: u32 = 1;

pub type Tag = [u8; 4];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None = 0,
    Gzip = 1,
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            _ => Err(Error::new(
                MalformedData,
                "unknown compression (can be 'none' or 'gzip')".to_string(),
            )),
        }
    }
}

pub const DEFAULT_COMPRESSION: &str = "gzip";
pub const DEFAULT_GZIP_LEVEL: &str = "6";

fn validate_gzip_level(value: String) -> StdResult<(), String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|_| "must be a positive integer".to_string())?;
    if parsed > 9 {
        return Err("unsupported gzip level (can be from 0 to 9)".to_string());
    }
    Ok(())
}

#[derive(Clone, Copy, StructOpt)]
pub struct WriterParams {
    #[structopt(
        name = "store-compression",
        help = "Type of compression for intermediate result files",
        default_value = DEFAULT_COMPRESSION,
        long
    )]
    pub compression: Compression,

    #[structopt(
        name = "store-gzip-level",
        help = "Level of gzip-compression for intermediate result files",
        default_value = DEFAULT_GZIP_LEVEL,
        long,
        validator = validate_gzip_level
    )]
    pub gzip_level: u32,
}

impl Default for WriterParams {
    fn default() -> Self {
        Self {
            compression: Compression::Gzip,
            gzip_level: 6,
        }
    }
}
