//! Bounded polling of sources that are not ready yet
//!
//! An acquisition server answers [ReadOutcome::NotYetAvailable] while the instrument is still
//! exposing. [HangAbout] waits `twait` seconds between attempts and gives up once the total
//! wait since the last frame would exceed `tmax`.

use std::{fmt, thread, time::Duration};

use crate::{ccd::Frame, spooler::ReadOutcome};

#[derive(Debug, thiserror::Error)]
pub enum HangAboutError {
    #[error("invalid wait times (twait={twait}s, tmax={tmax}s): both must be finite, twait positive")]
    InvalidWait { twait: f64, tmax: f64 },
}
type Result<T> = std::result::Result<T, HangAboutError>;

/// What to do after a read attempt
#[derive(Debug)]
pub enum Verdict {
    /// A frame was read
    Proceed(Frame),
    /// The wait was done, read again
    TryAgain,
    /// The source stopped producing frames
    GiveUp,
    /// The source has no more frames
    Exhausted,
}

/// Retry policy for reads that return [ReadOutcome::NotYetAvailable]
pub struct HangAbout {
    twait: f64,
    tmax: f64,
    total: f64,
    sleeper: Box<dyn FnMut(Duration)>,
}
impl fmt::Debug for HangAbout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HangAbout")
            .field("twait", &self.twait)
            .field("tmax", &self.tmax)
            .field("total", &self.total)
            .finish()
    }
}
impl Default for HangAbout {
    fn default() -> Self {
        Self {
            twait: 1.,
            tmax: 10.,
            total: 0.,
            sleeper: Box::new(thread::sleep),
        }
    }
}
impl HangAbout {
    /// Creates the policy with a wait increment and a maximum total wait, both in seconds
    ///
    /// `twait` must be strictly positive for the total wait to ever reach `tmax`.
    pub fn new(twait: f64, tmax: f64) -> Result<Self> {
        if !(twait > 0. && twait.is_finite() && tmax >= 0. && tmax.is_finite()) {
            return Err(HangAboutError::InvalidWait { twait, tmax });
        }
        Ok(Self {
            twait,
            tmax,
            ..Default::default()
        })
    }
    /// Replaces the function that performs the waits
    pub fn with_sleeper<F: FnMut(Duration) + 'static>(self, sleeper: F) -> Self {
        Self {
            sleeper: Box::new(sleeper),
            ..self
        }
    }
    /// Seconds waited since the last frame
    pub fn total_wait(&self) -> f64 {
        self.total
    }
    /// Decides on the next step given the outcome of a read
    ///
    /// A frame resets the total wait.
    /// If the source is not ready, the call blocks for `twait` seconds unless that would take
    /// the total wait beyond `tmax`, in which case it gives up.
    pub fn assess(&mut self, outcome: ReadOutcome) -> Verdict {
        match outcome {
            ReadOutcome::Frame(frame) => {
                self.total = 0.;
                Verdict::Proceed(frame)
            }
            ReadOutcome::EndOfSequence => Verdict::Exhausted,
            ReadOutcome::NotYetAvailable if self.total + self.twait > self.tmax => {
                log::warn!(
                    "no new frame after waiting {}s, the source has stopped",
                    self.total
                );
                Verdict::GiveUp
            }
            ReadOutcome::NotYetAvailable => {
                log::debug!(
                    "no new frame yet, waiting {}s (waited {}s out of {}s)",
                    self.twait,
                    self.total,
                    self.tmax
                );
                (self.sleeper)(Duration::from_secs_f64(self.twait));
                self.total += self.twait;
                Verdict::TryAgain
            }
        }
    }
}
