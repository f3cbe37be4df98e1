//! Uniform access to sequences of frames
//!
//! Frames come from raw runs on disk ([DiskSpool]), from an acquisition server
//! ([ServerSpool]) or from lists of frame files ([ListSpool]).
//! They all implement [Spooler] and are traversed through an [ActiveSpool]:
//! ```no_run
//! use hipercam::spooler::{data_source, ActiveSpool, ReadOutcome};
//!
//! let mut spool = data_source("HIPER", "run0003", false, false, 1, false)?;
//! for outcome in ActiveSpool::open(spool.as_mut())? {
//!     match outcome? {
//!         ReadOutcome::Frame(frame) => println!("{:?}", frame.labels().collect::<Vec<_>>()),
//!         ReadOutcome::NotYetAvailable => break,
//!         ReadOutcome::EndOfSequence => unreachable!(),
//!     }
//! }
//! # Ok::<(), hipercam::spooler::SpoolError>(())
//! ```

use std::{io, path::PathBuf};

use crate::{ccd::CcdError, ccd::Frame, raw::RawError};

mod disk;
pub use disk::DiskSpool;
mod list;
pub use list::ListSpool;
mod server;
pub use server::{FrameServer, RunFileServer, ServerSpool};
mod source;
pub use source::{
    data_source, data_source_with, get_ccd_pars, CcdPars, CcdParsTable, Instrument, Source,
    HCM_NXTOT, HCM_NYTOT,
};

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error(r#"instrument "{0}" is not recognised, expected "ULTRA" or "HIPER""#)]
    UnknownInstrument(String),
    #[error("{what} not implemented for instrument {instrument}")]
    Unsupported {
        instrument: Instrument,
        what: &'static str,
    },
    #[error("run header names an unsupported instrument: {0}")]
    UnsupportedInstrument(String),
    #[error("{0:?} not found")]
    ResourceNotFound(PathBuf),
    #[error("failed to find any file names in {0:?}")]
    EmptyList(PathBuf),
    #[error("failed to access {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to read the raw run")]
    Raw(#[from] RawError),
    #[error("failed to read the frame file")]
    Ccd(#[from] CcdError),
    #[error("the spool must be opened before reading frames")]
    NotOpen,
}
pub type Result<T> = std::result::Result<T, SpoolError>;

/// Outcome of a read attempt
#[derive(Debug)]
pub enum ReadOutcome {
    /// A new frame
    Frame(Frame),
    /// The source has not produced the next frame yet; try again later
    NotYetAvailable,
    /// There are no more frames; no further read is meaningful
    EndOfSequence,
}

/// A sequential source of frames bound to a single resource
pub trait Spooler {
    /// Acquires the underlying resource
    fn open(&mut self) -> Result<()>;
    /// Reads the next frame
    fn next_frame(&mut self) -> Result<ReadOutcome>;
    /// Releases the underlying resource, it must be safe to call more than once
    fn close(&mut self);
}

/// An opened [Spooler]
///
/// The resource is released when the [ActiveSpool] is dropped, whichever way the scope is left.
/// The mutable borrow of the spooler prevents two traversals at once.
pub struct ActiveSpool<'a, S: Spooler + ?Sized> {
    spool: &'a mut S,
}
impl<'a, S: Spooler + ?Sized> ActiveSpool<'a, S> {
    /// Opens the spooler
    pub fn open(spool: &'a mut S) -> Result<Self> {
        spool.open()?;
        Ok(Self { spool })
    }
    pub fn next_frame(&mut self) -> Result<ReadOutcome> {
        self.spool.next_frame()
    }
}
impl<'a, S: Spooler + ?Sized> Drop for ActiveSpool<'a, S> {
    fn drop(&mut self) {
        self.spool.close();
    }
}
/// Iterates until [ReadOutcome::EndOfSequence], which is never yielded
impl<'a, S: Spooler + ?Sized> Iterator for ActiveSpool<'a, S> {
    type Item = Result<ReadOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(ReadOutcome::EndOfSequence) => None,
            outcome => Some(outcome),
        }
    }
}
