//! # HiPERCAM and ULTRACAM frame spooling
//!
//! Reads the frames of ULTRACAM/ULTRASPEC and HiPERCAM runs, from local raw files,
//! from the acquisition server or from lists of frame files, through a common [Spooler]
//! interface, and median-combines them with [Averun].
//!
//! The source of the frames is chosen with [data_source] (or [Source::data_source]):
//! ```no_run
//! use hipercam::{Averun, HangAbout, Source, Config};
//!
//! let source: Source = "us".parse().unwrap();
//! let mut spool = source.data_source(&Config::from_env(), "run0042", 10, false)?;
//! Averun::new("flat.hcm")
//!     .first(10)
//!     .last(20)
//!     .hang_about(HangAbout::default())
//!     .clobber(true)
//!     .run(spool.as_mut())?;
//! # Ok::<(), hipercam::Error>(())
//! ```

pub mod averun;
pub mod ccd;
pub mod config;
pub mod error;
mod group;
pub mod hang_about;
pub mod raw;
pub mod spooler;
#[cfg(test)]
mod test_utils;

pub use averun::Averun;
pub use ccd::{Ccd, Frame, Window};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use group::Group;
pub use hang_about::HangAbout;
pub use spooler::{data_source, get_ccd_pars, ActiveSpool, ReadOutcome, Source, Spooler};
