//! Median combination of the frames of a run
//!
//! [Averun] reads a range of frames from a [Spooler], subtracts an optional bias
//! and writes the pixel-by-pixel median of the frames to a frame file.
//! All the frames are held in memory until they are combined.
//!
//! ```no_run
//! use hipercam::{averun::Averun, hang_about::HangAbout, spooler::Source, Config};
//!
//! let mut spool = Source::HiperLocal.data_source(&Config::default(), "run0012", 1, false)?;
//! let average = Averun::new("run0012_ave.hcm")
//!     .first(1)
//!     .last(50)
//!     .hang_about(HangAbout::new(1., 10.)?)
//!     .run(spool.as_mut())?;
//! println!("{:?}", average.labels().collect::<Vec<_>>());
//! # Ok::<(), hipercam::Error>(())
//! ```

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use crate::{
    ccd::{median_stack, Ccd, CcdError, Frame},
    hang_about::{HangAbout, Verdict},
    spooler::{ActiveSpool, ReadOutcome, SpoolError, Spooler},
};

#[derive(Debug, thiserror::Error)]
pub enum AverunError {
    #[error("no data read")]
    NoData,
    #[error("no valid frames found for CCD {0}")]
    NoValidFrames(String),
    #[error("invalid frame range: first={first}, last={last}")]
    InvalidRange { first: usize, last: usize },
    #[error("{0:?} already exists and clobbering is disabled")]
    OutputConflict(PathBuf),
    #[error("failed to read the frames")]
    Spool(#[from] SpoolError),
    #[error("failed to combine the frames")]
    Ccd(#[from] CcdError),
}
type Result<T> = std::result::Result<T, AverunError>;

/// Median combination builder
pub struct Averun {
    output: PathBuf,
    first: usize,
    last: Option<usize>,
    hang_about: Option<HangAbout>,
    bias: Option<Frame>,
    clobber: bool,
    progress: Option<ProgressBar>,
}
impl Averun {
    /// Creates a new builder writing the average to `output`
    pub fn new<P: AsRef<Path>>(output: P) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            first: 1,
            last: None,
            hang_about: None,
            bias: None,
            clobber: false,
            progress: None,
        }
    }
    /// Number of the first frame, counting from 1
    ///
    /// The spooler must already be positioned at this frame, it only numbers the frames here.
    pub fn first(self, first: usize) -> Self {
        Self { first, ..self }
    }
    /// Number of the last frame to combine, by default all the frames are combined
    pub fn last(self, last: usize) -> Self {
        Self {
            last: Some(last),
            ..self
        }
    }
    /// Retries the reads that return [ReadOutcome::NotYetAvailable]
    ///
    /// Without a retry policy the acquisition stops at the first frame that is not ready.
    pub fn hang_about(self, hang_about: HangAbout) -> Self {
        Self {
            hang_about: Some(hang_about),
            ..self
        }
    }
    /// Bias frame subtracted from every frame
    pub fn bias(self, bias: Frame) -> Self {
        Self {
            bias: Some(bias),
            ..self
        }
    }
    /// Allows overwriting an existing output file
    pub fn clobber(self, clobber: bool) -> Self {
        Self { clobber, ..self }
    }
    /// Progress bar ticked for each frame read
    pub fn progress(self, progress: ProgressBar) -> Self {
        Self {
            progress: Some(progress),
            ..self
        }
    }
    /// Reads the frames, combines them and writes the result
    ///
    /// Nothing is written if any step fails.
    pub fn run<S: Spooler + ?Sized>(mut self, spool: &mut S) -> Result<Frame> {
        match self.last {
            Some(last) if self.first == 0 || last < self.first => {
                return Err(AverunError::InvalidRange {
                    first: self.first,
                    last,
                })
            }
            None if self.first == 0 => {
                return Err(AverunError::InvalidRange { first: 0, last: 0 })
            }
            _ => (),
        }
        if !self.clobber && self.output.exists() {
            return Err(AverunError::OutputConflict(self.output));
        }

        let frames = self.accumulate(spool);
        if let Some(progress) = &self.progress {
            match &frames {
                Ok(_) => progress.finish(),
                Err(_) => progress.abandon(),
            }
        }
        let frames = frames?;
        let average = median_combine(frames, self.bias.as_ref())?;

        average
            .write(&self.output, self.clobber)
            .map_err(|e| match e {
                CcdError::OutputConflict(path) => AverunError::OutputConflict(path),
                e => e.into(),
            })?;
        log::info!("Final average written to {:?}", self.output);
        Ok(average)
    }
    fn accumulate<S: Spooler + ?Sized>(&mut self, spool: &mut S) -> Result<Vec<Frame>> {
        // `last >= first` is checked by `run`
        let n_max = self.last.map(|last| last - self.first + 1);
        let mut frames = vec![];
        let mut active = ActiveSpool::open(spool)?;
        while n_max.map_or(true, |n| frames.len() < n) {
            let outcome = active.next_frame()?;
            let frame = match self.hang_about.as_mut() {
                Some(policy) => match policy.assess(outcome) {
                    Verdict::Proceed(frame) => frame,
                    Verdict::TryAgain => continue,
                    Verdict::GiveUp => break,
                    Verdict::Exhausted => {
                        log::debug!("end of the frames");
                        break;
                    }
                },
                None => match outcome {
                    ReadOutcome::Frame(frame) => frame,
                    ReadOutcome::NotYetAvailable => {
                        log::warn!("frame {} is not available", self.first + frames.len());
                        break;
                    }
                    ReadOutcome::EndOfSequence => {
                        log::debug!("end of the frames");
                        break;
                    }
                },
            };
            log::info!(" read frame {}", self.first + frames.len());
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// Median combination of frames sharing the same CCD and window layout
///
/// The first frame is the template of the result and the bias, if any, is cropped to it.
/// Each CCD is combined from the frames where it holds data, so two CCDs of the same run
/// may be combined from different numbers of frames.
pub fn median_combine(mut frames: Vec<Frame>, bias: Option<&Frame>) -> Result<Frame> {
    let mut average = frames.first().ok_or(AverunError::NoData)?.clone();
    let bias = bias.map(|bias| bias.crop(&average)).transpose()?;

    let labels: Vec<String> = average.labels().map(String::from).collect();
    let mut stacks: Vec<(String, Vec<Ccd>)> = Vec::with_capacity(labels.len());
    for label in labels {
        let mut stack = vec![];
        for frame in frames.iter_mut() {
            let mut ccd = frame
                .ccds
                .remove(&label)
                .ok_or_else(|| CcdError::MissingCcd(label.clone()))?;
            if !ccd.is_data() {
                continue;
            }
            if let Some(bias) = bias.as_ref().and_then(|bias| bias.get(&label)) {
                ccd.subtract(bias)?;
            }
            stack.push(ccd);
        }
        stacks.push((label, stack));
    }
    if let Some((label, _)) = stacks.iter().find(|(_, stack)| stack.is_empty()) {
        return Err(AverunError::NoValidFrames(label.clone()));
    }

    for (label, stack) in stacks {
        log::info!("Averaging {} CCDs labelled '{}'", stack.len(), label);
        let ccd = average
            .get_mut(&label)
            .ok_or_else(|| CcdError::MissingCcd(label.clone()))?;
        for (name, window) in ccd.windows.iter_mut() {
            let data = stack
                .iter()
                .map(|ccd| match ccd.window(name) {
                    Some(w) if w.same_format(window) => Ok(&w.data),
                    Some(_) => Err(CcdError::Shape(name.to_string())),
                    None => Err(CcdError::MissingWindow(name.to_string())),
                })
                .collect::<std::result::Result<Vec<_>, CcdError>>()?;
            if let Some(median) = median_stack(&data) {
                window.data = median;
            }
        }
        ccd.data_status = true;
    }
    Ok(average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{spooler::tests::Scripted, test_utils::frame};
    use std::fs;

    fn scripted(frames: Vec<Frame>) -> Scripted {
        Scripted::new(
            frames
                .into_iter()
                .map(|frame| Some(ReadOutcome::Frame(frame)))
                .collect(),
        )
    }
    fn pixels(frame: &Frame, label: &str) -> Vec<f32> {
        let data = &frame.get(label).unwrap().window("E1").unwrap().data;
        // row by row
        data.transpose().iter().copied().collect()
    }

    #[test]
    fn median_of_three_frames() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ave.hcm");
        let mut spool = scripted(vec![
            frame(&[("1", [1., 5., 3., 7.], true)]),
            frame(&[("1", [2., 4., 9., 0.], true)]),
            frame(&[("1", [3., 6., 1., 8.], true)]),
        ]);
        let average = Averun::new(&output)
            .progress(ProgressBar::hidden())
            .run(&mut spool)
            .unwrap();
        assert_eq!(pixels(&average, "1"), vec![2., 5., 3., 7.]);
        assert_eq!(Frame::read(&output).unwrap(), average);
        assert_eq!((spool.opened, spool.closed), (1, 1));
    }

    #[test]
    fn bias_subtraction_is_linear() {
        let dir = tempfile::tempdir().unwrap();
        let raw = [[10., 12., 14., 16.], [11., 20., 9., 18.], [15., 13., 12., 30.]];
        let offset = [1., 2., 3., 4.];
        let bias = frame(&[("1", offset, true)]);

        let mut spool = scripted(raw.iter().map(|v| frame(&[("1", *v, true)])).collect());
        let with_bias = Averun::new(dir.path().join("a.hcm"))
            .bias(bias)
            .run(&mut spool)
            .unwrap();

        let mut spool = scripted(
            raw.iter()
                .map(|v| {
                    let mut debiased = *v;
                    debiased.iter_mut().zip(offset).for_each(|(x, b)| *x -= b);
                    frame(&[("1", debiased, true)])
                })
                .collect(),
        );
        let debiased = Averun::new(dir.path().join("b.hcm"))
            .run(&mut spool)
            .unwrap();

        pixels(&with_bias, "1")
            .into_iter()
            .zip(pixels(&debiased, "1"))
            .for_each(|(a, b)| assert!((a - b).abs() < 1e-6));
    }

    #[test]
    fn blank_ccds_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = scripted(vec![
            frame(&[("1", [1.; 4], true), ("2", [1., 2., 3., 4.], true)]),
            frame(&[("1", [2.; 4], true), ("2", [100.; 4], false)]),
            frame(&[("1", [3.; 4], true), ("2", [3., 4., 5., 6.], true)]),
        ]);
        let average = Averun::new(dir.path().join("ave.hcm"))
            .run(&mut spool)
            .unwrap();
        assert_eq!(pixels(&average, "1"), vec![2.; 4]);
        assert_eq!(pixels(&average, "2"), vec![2., 3., 4., 5.]);
        assert!(average.iter().all(|(_, ccd)| ccd.is_data()));
    }

    #[test]
    fn no_data() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ave.hcm");
        let mut spool = scripted(vec![]);
        assert!(matches!(
            Averun::new(&output).run(&mut spool),
            Err(AverunError::NoData)
        ));
        assert!(!output.exists());
        assert_eq!(spool.closed, 1);
    }

    #[test]
    fn no_valid_frames() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ave.hcm");
        let mut spool = scripted(vec![
            frame(&[("1", [1.; 4], true), ("2", [1.; 4], false)]),
            frame(&[("1", [2.; 4], true), ("2", [2.; 4], false)]),
        ]);
        assert!(matches!(
            Averun::new(&output).run(&mut spool),
            Err(AverunError::NoValidFrames(label)) if label == "2"
        ));
        assert!(!output.exists());
    }

    #[test]
    fn stops_at_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = scripted((1..=5).map(|i| frame(&[("1", [i as f32; 4], true)])).collect());
        let average = Averun::new(dir.path().join("ave.hcm"))
            .first(3)
            .last(4)
            .run(&mut spool)
            .unwrap();
        assert_eq!(pixels(&average, "1"), vec![1.5; 4]);
        assert_eq!((spool.reads, spool.closed), (2, 1));
    }

    #[test]
    fn largest_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = scripted((1..=3).map(|i| frame(&[("1", [i as f32; 4], true)])).collect());
        let average = Averun::new(dir.path().join("ave.hcm"))
            .last(usize::MAX)
            .run(&mut spool)
            .unwrap();
        assert_eq!(pixels(&average, "1"), vec![2.; 4]);
        assert_eq!(spool.reads, 4);
    }

    #[test]
    fn invalid_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = scripted(vec![frame(&[("1", [1.; 4], true)])]);
        assert!(matches!(
            Averun::new(dir.path().join("ave.hcm"))
                .first(3)
                .last(2)
                .run(&mut spool),
            Err(AverunError::InvalidRange { first: 3, last: 2 })
        ));
        assert_eq!(spool.opened, 0);
    }

    #[test]
    fn gives_up_on_stalled_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = Scripted::new(vec![
            Some(ReadOutcome::Frame(frame(&[("1", [4.; 4], true)]))),
            Some(ReadOutcome::NotYetAvailable),
            Some(ReadOutcome::NotYetAvailable),
            Some(ReadOutcome::NotYetAvailable),
            Some(ReadOutcome::NotYetAvailable),
        ]);
        let average = Averun::new(dir.path().join("ave.hcm"))
            .last(10)
            .hang_about(HangAbout::new(1., 2.).unwrap().with_sleeper(|_| ()))
            .run(&mut spool)
            .unwrap();
        assert_eq!(pixels(&average, "1"), vec![4.; 4]);
        assert_eq!((spool.reads, spool.closed), (4, 1));

        let mut spool = Scripted::new(vec![
            Some(ReadOutcome::Frame(frame(&[("1", [4.; 4], true)]))),
            Some(ReadOutcome::NotYetAvailable),
        ]);
        Averun::new(dir.path().join("ave2.hcm"))
            .run(&mut spool)
            .unwrap();
        assert_eq!(spool.reads, 2);
    }

    #[test]
    fn read_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ave.hcm");
        let mut spool = Scripted::new(vec![
            Some(ReadOutcome::Frame(frame(&[("1", [4.; 4], true)]))),
            None,
        ]);
        let progress = ProgressBar::hidden();
        assert!(matches!(
            Averun::new(&output)
                .hang_about(HangAbout::default().with_sleeper(|_| ()))
                .progress(progress.clone())
                .run(&mut spool),
            Err(AverunError::Spool(_))
        ));
        assert!(!output.exists());
        assert_eq!(spool.closed, 1);
        assert!(progress.is_finished());
    }

    #[test]
    fn output_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ave.hcm");
        fs::write(&output, b"previous average").unwrap();

        let mut spool = scripted(vec![frame(&[("1", [4.; 4], true)])]);
        assert!(matches!(
            Averun::new(&output).run(&mut spool),
            Err(AverunError::OutputConflict(path)) if path == output
        ));
        assert_eq!(fs::read(&output).unwrap(), b"previous average");
        assert_eq!(spool.opened, 0);

        let average = Averun::new(&output)
            .clobber(true)
            .run(&mut spool)
            .unwrap();
        assert_eq!(Frame::read(&output).unwrap(), average);
    }

    #[test]
    fn bias_with_larger_windows() {
        use crate::ccd::Window;
        use nalgebra::DMatrix;

        let mut bias = frame(&[("1", [0.; 4], true)]);
        let ccd = bias.get_mut("1").unwrap();
        ccd.windows.insert(
            "E1",
            Window::new(1, 1, 1, 1, DMatrix::from_row_slice(3, 3, &[1.; 9])),
        );
        let average = median_combine(
            vec![frame(&[("1", [2.; 4], true)]), frame(&[("1", [4.; 4], true)])],
            Some(&bias),
        )
        .unwrap();
        assert_eq!(pixels(&average, "1"), vec![2.; 4]);
    }
}
