use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    ImageError,
    InconsistentState,
    IoError,
    MalformedData,
    UnsupportedFeature,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub description: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, description: String) -> Error {
        Error {
            kind,
            description,
            source: None,
        }
    }

    pub fn with_source<E: StdError + Send + Sync + 'static>(
        kind: ErrorKind,
        description: String,
        source: E,
    ) -> Error {
        Error {
            kind,
            description,
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{} ({})", self.description, source)
        } else {
            write!(f, "{}", self.description)
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::with_source(ErrorKind::IoError, "i/o failure".to_string(), err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// Attaches a description (and the error kind implied by the source type)
// to a foreign error.
pub trait IntoResult<T> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T>;

    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T>
    where
        Self: Sized,
    {
        self.into_result(desc_fn)
    }
}

impl<T> IntoResult<T> for std::result::Result<T, std::io::Error> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| Error::with_source(ErrorKind::IoError, desc_fn(), e))
    }
}

impl<T> IntoResult<T> for std::result::Result<T, serde_json::Error> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| {
            let kind = if e.is_io() {
                ErrorKind::IoError
            } else {
                ErrorKind::MalformedData
            };
            Error::with_source(kind, desc_fn(), e)
        })
    }
}

impl<T> IntoResult<T> for std::result::Result<T, std::fmt::Error> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| Error::with_source(ErrorKind::IoError, desc_fn(), e))
    }
}

impl<T> IntoResult<T> for Option<T> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.ok_or_else(|| Error::new(ErrorKind::MalformedData, desc_fn()))
    }
}
