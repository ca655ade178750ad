use std::path::PathBuf;

use crate::deps::thiserror;



#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("an io error occurred: {source}")]
    IO {
        #[from]
        source: std::io::Error,
        #[cfg(feature = "nightly")]
        backtrace: std::backtrace::Backtrace,
    },

    #[error("a syscall failed: {source}")]
    Sys {
        #[from]
        source: crate::deps::nix::Error,
    },

    #[error("an error occurred casting between integer types: {source}")]
    Number {
        #[from]
        source: std::num::TryFromIntError,
        #[cfg(feature = "nightly")]
        backtrace: std::backtrace::Backtrace,
    },

    #[error("probing {path:?} failed: {source}")]
    Probe {
        path:   PathBuf,
        source: Box<Error>,
    },

    #[error("catalog query failed: {source}")]
    Catalog {
        #[from]
        source: crate::deps::postgres::Error,
    },

    #[error("serializing output failed: {source}")]
    Json {
        #[from]
        source: crate::deps::serde_json::Error,
    },

    #[error("parsing {typename} from {value:?}, reason: {reason:}")]
    Parse {
        value:    String,
        typename: &'static str,
        reason:   String,
    },

    #[error("no cached memory source was readable")]
    CachedMemoryUnavailable,
}


impl Error {
    /// Wrap any failure with the path of the file being probed.
    pub fn probing<P>(
        path: P,
        source: Error,
    ) -> Self
    where
        P: Into<PathBuf>,
    {
        Error::Probe {
            path:   path.into(),
            source: Box::new(source),
        }
    }
}
