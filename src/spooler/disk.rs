use std::path::{Path, PathBuf};

use super::{Instrument, ReadOutcome, Result, SpoolError, Spooler};
use crate::raw::{run_path, RawError, RawFrame, RawRun};

/// Frames of a raw ULTRACAM, ULTRASPEC or HiPERCAM run on a local disk
#[derive(Debug)]
pub struct DiskSpool {
    instrument: Instrument,
    path: PathBuf,
    first: usize,
    flt: bool,
    run: Option<RawRun>,
    next: usize,
}
impl DiskSpool {
    /// Attaches the spool to a run, e.g. "run003" or "data/run004", starting at frame `first`
    ///
    /// Pixels are always held as `f32`, which represents the raw `u16` counts exactly;
    /// `flt` only records that a floating point conversion was asked for.
    pub fn new<P: AsRef<Path>>(instrument: Instrument, run: P, first: usize, flt: bool) -> Self {
        Self {
            instrument,
            path: run_path(run),
            first: first.max(1),
            flt,
            run: None,
            next: first.max(1),
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl Spooler for DiskSpool {
    fn open(&mut self) -> Result<()> {
        if !self.path.is_file() {
            return Err(SpoolError::ResourceNotFound(self.path.clone()));
        }
        let run = RawRun::open(&self.path)?;
        let detected = &run.header().instrument;
        if !self.instrument.reads(detected) {
            return Err(SpoolError::UnsupportedInstrument(detected.clone()));
        }
        log::debug!(
            "spooling {:?} from frame {} (float conversion: {})",
            self.path,
            self.first,
            self.flt
        );
        self.run = Some(run);
        self.next = self.first;
        Ok(())
    }
    fn next_frame(&mut self) -> Result<ReadOutcome> {
        let run = self.run.as_mut().ok_or(SpoolError::NotOpen)?;
        match run.read_frame(self.next)? {
            RawFrame::Complete(frame) => {
                self.next += 1;
                Ok(ReadOutcome::Frame(frame))
            }
            RawFrame::Absent => Ok(ReadOutcome::EndOfSequence),
            RawFrame::Partial => Err(RawError::Truncated {
                frame: self.next,
                path: self.path.clone(),
            }
            .into()),
        }
    }
    fn close(&mut self) {
        if self.run.take().is_some() {
            log::debug!("closed {:?}", self.path);
        }
    }
}
