use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::defs::{Error, ErrorKind::*, Result};
use crate::util::fs;

#[derive(StructOpt)]
pub struct OutputPrefix {
    #[structopt(
        help = "Output prefix (files are named <prefix>.obj, <prefix>.mtl, ...)",
        name = "out-prefix"
    )]
    pub path: PathBuf,
}

impl OutputPrefix {
    pub fn check_dir(&self) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| "".as_ref());
        if !fs::dir_exists(dir) {
            return Err(Error::new(
                IoError,
                "destination directory does not exist".to_string(),
            ));
        }
        if self.path.file_name().is_none() {
            return Err(Error::new(
                MalformedData,
                "output prefix has no file name".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_suffix() {
        let prefix = OutputPrefix {
            path: PathBuf::from("/some/dir/model"),
        };
        assert_eq!(
            prefix.with_suffix("_labeling.vec"),
            PathBuf::from("/some/dir/model_labeling.vec")
        );
    }

    #[test]
    fn test_missing_dir() {
        let prefix = OutputPrefix {
            path: PathBuf::from("/definitely/not/existing/dir/model"),
        };
        let err = prefix.check_dir().unwrap_err();
        assert_eq!(err.kind, IoError);
        assert_eq!(&err.description, "destination directory does not exist");
    }
}
