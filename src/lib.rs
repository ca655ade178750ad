#![allow(warnings)]
#![cfg_attr(feature = "nightly", feature(backtrace))]

pub(crate) mod deps {
    pub use derive_more;
    pub use lazy_static;
    pub use libc;
    pub use log;
    pub use nix;
    pub use postgres;
    pub use serde;
    pub use serde_json;
    pub use thiserror;
}

mod fmt;
mod io;

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod kpageflags;
pub mod memory;
pub mod mmapfile;
pub mod output;
pub mod pagemap;
pub mod paths;
pub mod probe;
pub mod relation;
pub mod segment;
pub mod stats;
