use std::path::{Path, PathBuf};

use super::{ReadOutcome, Result, SpoolError, Spooler};
use crate::raw::{run_path, RawFrame, RawRun};

/// Provider of frames from a remote acquisition service
pub trait FrameServer {
    /// Connects to the service and selects `run`
    fn connect(&mut self, run: &str) -> Result<()>;
    /// Requests frame `n`, counting from 1
    ///
    /// Frames the instrument has not produced yet are [ReadOutcome::NotYetAvailable].
    fn fetch(&mut self, n: usize) -> Result<ReadOutcome>;
    /// Drops the connection
    fn disconnect(&mut self);
}

/// Serves the runs the acquisition system is writing under a root directory
#[derive(Debug)]
pub struct RunFileServer {
    root: PathBuf,
    run: Option<RawRun>,
}
impl RunFileServer {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            run: None,
        }
    }
}
impl FrameServer for RunFileServer {
    fn connect(&mut self, run: &str) -> Result<()> {
        if !self.root.is_dir() {
            return Err(SpoolError::ResourceNotFound(self.root.clone()));
        }
        let path = self.root.join(run_path(run));
        if !path.is_file() {
            return Err(SpoolError::ResourceNotFound(path));
        }
        self.run = Some(RawRun::open(path)?);
        Ok(())
    }
    fn fetch(&mut self, n: usize) -> Result<ReadOutcome> {
        let run = self.run.as_mut().ok_or(SpoolError::NotOpen)?;
        Ok(match run.read_frame(n)? {
            RawFrame::Complete(frame) => ReadOutcome::Frame(frame),
            RawFrame::Partial | RawFrame::Absent => ReadOutcome::NotYetAvailable,
        })
    }
    fn disconnect(&mut self) {
        self.run = None;
    }
}

/// Frames of a run served by a [FrameServer]
///
/// The spool never reaches [ReadOutcome::EndOfSequence] by itself:
/// a run that stops growing keeps answering [ReadOutcome::NotYetAvailable].
#[derive(Debug)]
pub struct ServerSpool<P: FrameServer = RunFileServer> {
    run: String,
    first: usize,
    flt: bool,
    next: usize,
    provider: P,
    connected: bool,
}
impl<P: FrameServer> ServerSpool<P> {
    /// Attaches the spool to a served run, starting at frame `first`
    pub fn new<S: Into<String>>(run: S, first: usize, flt: bool, provider: P) -> Self {
        Self {
            run: run.into(),
            first: first.max(1),
            flt,
            next: first.max(1),
            provider,
            connected: false,
        }
    }
}
impl<P: FrameServer> Spooler for ServerSpool<P> {
    fn open(&mut self) -> Result<()> {
        self.provider.connect(&self.run)?;
        log::debug!(
            "connected to run {} from frame {} (float conversion: {})",
            self.run,
            self.first,
            self.flt
        );
        self.connected = true;
        self.next = self.first;
        Ok(())
    }
    fn next_frame(&mut self) -> Result<ReadOutcome> {
        if !self.connected {
            return Err(SpoolError::NotOpen);
        }
        let outcome = self.provider.fetch(self.next)?;
        if let ReadOutcome::Frame(_) = outcome {
            self.next += 1;
        }
        Ok(outcome)
    }
    fn close(&mut self) {
        if self.connected {
            self.provider.disconnect();
            self.connected = false;
            log::debug!("disconnected from run {}", self.run);
        }
    }
}
