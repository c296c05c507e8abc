use std::fs::{read, read_to_string, write, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::defs::{IntoResult, Result};

fn path_desc(verb: &str, path: &Path) -> String {
    if let Some(path) = path.to_str() {
        format!("failed to {} file '{}'", verb, path)
    } else {
        format!("failed to {} file", verb)
    }
}

pub fn open_file<P: AsRef<Path>>(path: P) -> Result<BufReader<File>> {
    let path = path.as_ref();
    let file = File::open(path).res(|| path_desc("open", path))?;
    Ok(BufReader::new(file))
}

pub fn create_file<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    let path = path.as_ref();
    let file = File::create(path).res(|| path_desc("create", path))?;
    Ok(BufWriter::new(file))
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    read(path).res(|| path_desc("read", path))
}

pub fn read_file_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    read_to_string(path).res(|| path_desc("read", path))
}

pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    write(path, data).res(|| path_desc("write", path))
}

pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return true; // Current directory.
    }
    path.is_dir()
}
