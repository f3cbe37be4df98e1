//! Multi-CCD frames
//!
//! A [Frame] is a [Group] of [Ccd]s, a [Ccd] is a [Group] of [Window]s and a [Window]
//! is a binned rectangular region of the detector with its pixel values.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, BufWriter, Write},
    ops::SubAssign,
    path::{Path, PathBuf},
};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use serde_pickle as pickle;

use crate::Group;

/// Extension of the frame files
pub const HCM_EXTENSION: &str = "hcm";

#[derive(Debug, thiserror::Error)]
pub enum CcdError {
    #[error("failed to access {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to decode the frame file {1:?}")]
    Decode(#[source] pickle::Error, PathBuf),
    #[error("failed to encode the frame into {1:?}")]
    Encode(#[source] pickle::Error, PathBuf),
    #[error("{0:?} already exists and clobbering is disabled")]
    OutputConflict(PathBuf),
    #[error("{0:?} holds a single CCD where a multi-CCD frame was expected")]
    NotAFrame(PathBuf),
    #[error("CCD {0} is missing")]
    MissingCcd(String),
    #[error("window {0} is missing")]
    MissingWindow(String),
    #[error("no window encloses window {0}")]
    NoEnclosingWindow(String),
    #[error("window {0} dimensions do not match")]
    Shape(String),
}
type Result<T> = std::result::Result<T, CcdError>;

/// Appends the frame file extension to `path` if it has none
pub fn hcm_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    match path.extension() {
        Some(_) => path.to_path_buf(),
        None => path.with_extension(HCM_EXTENSION),
    }
}

/// Median of a set of values
///
/// An even number of values gives the mean of the two middle ones.
/// Returns NaN if `values` is empty.
pub fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        return f32::NAN;
    }
    let (lower, upper, _) = values.select_nth_unstable_by(n / 2, f32::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let lower = lower
            .iter()
            .copied()
            .max_by(f32::total_cmp)
            .unwrap_or(upper);
        ((lower as f64 + upper as f64) * 0.5) as f32
    }
}

/// Element-wise median of a stack of arrays of identical shape
pub fn median_stack(arrays: &[&DMatrix<f32>]) -> Option<DMatrix<f32>> {
    let (nrows, ncols) = arrays.first()?.shape();
    let mut column = Vec::with_capacity(arrays.len());
    Some(DMatrix::from_fn(nrows, ncols, |i, j| {
        column.clear();
        column.extend(arrays.iter().map(|a| a[(i, j)]));
        median(&mut column)
    }))
}

/// A binned rectangular region of a CCD
///
/// `llx` and `lly` are the unbinned coordinates (starting at 1) of the lower-left pixel;
/// `data` has `ny` rows and `nx` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub llx: usize,
    pub lly: usize,
    pub xbin: usize,
    pub ybin: usize,
    pub data: DMatrix<f32>,
}
impl Window {
    pub fn new(llx: usize, lly: usize, xbin: usize, ybin: usize, data: DMatrix<f32>) -> Self {
        Self {
            llx,
            lly,
            xbin,
            ybin,
            data,
        }
    }
    /// A window filled with zeros
    pub fn zeros(llx: usize, lly: usize, nx: usize, ny: usize, xbin: usize, ybin: usize) -> Self {
        Self::new(llx, lly, xbin, ybin, DMatrix::zeros(ny, nx))
    }
    pub fn nx(&self) -> usize {
        self.data.ncols()
    }
    pub fn ny(&self) -> usize {
        self.data.nrows()
    }
    /// Unbinned x coordinate of the right-most pixel column
    pub fn urx(&self) -> usize {
        self.llx.saturating_add(self.nx().saturating_mul(self.xbin)).saturating_sub(1)
    }
    /// Unbinned y coordinate of the top pixel row
    pub fn ury(&self) -> usize {
        self.lly.saturating_add(self.ny().saturating_mul(self.ybin)).saturating_sub(1)
    }
    /// Checks if both windows cover the same pixels with the same binning
    pub fn same_format(&self, other: &Window) -> bool {
        self.llx == other.llx
            && self.lly == other.lly
            && self.xbin == other.xbin
            && self.ybin == other.ybin
            && self.data.shape() == other.data.shape()
    }
    /// Checks if `other` is a sub-region of this window on the same binned pixel grid
    ///
    /// Windows with a zero binning factor enclose nothing.
    pub fn encloses(&self, other: &Window) -> bool {
        self.xbin > 0
            && self.ybin > 0
            && self.xbin == other.xbin
            && self.ybin == other.ybin
            && other.llx >= self.llx
            && other.lly >= self.lly
            && other.urx() <= self.urx()
            && other.ury() <= self.ury()
            && (other.llx - self.llx) % self.xbin == 0
            && (other.lly - self.lly) % self.ybin == 0
    }
    /// Returns the part of this window matching the format of `layout`
    pub fn crop(&self, layout: &Window) -> Option<Window> {
        if !self.encloses(layout) {
            return None;
        }
        let ix = (layout.llx - self.llx) / self.xbin;
        let iy = (layout.lly - self.lly) / self.ybin;
        Some(Window::new(
            layout.llx,
            layout.lly,
            self.xbin,
            self.ybin,
            self.data
                .view((iy, ix), (layout.ny(), layout.nx()))
                .into_owned(),
        ))
    }
}
impl SubAssign<&Window> for Window {
    fn sub_assign(&mut self, rhs: &Window) {
        self.data -= &rhs.data;
    }
}

/// A single detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ccd {
    pub windows: Group<Window>,
    /// Unbinned detector width
    pub nxtot: usize,
    /// Unbinned detector height
    pub nytot: usize,
    /// `false` if the instrument blanked this CCD, e.g. when skipping frames
    pub data_status: bool,
}
impl Ccd {
    pub fn new(windows: Group<Window>, nxtot: usize, nytot: usize) -> Self {
        Self {
            windows,
            nxtot,
            nytot,
            data_status: true,
        }
    }
    /// Marks the CCD as blank
    pub fn blank(self) -> Self {
        Self {
            data_status: false,
            ..self
        }
    }
    /// Returns `true` unless the CCD was deliberately blanked
    pub fn is_data(&self) -> bool {
        self.data_status
    }
    pub fn window(&self, label: &str) -> Option<&Window> {
        self.windows.get(label)
    }
    /// Crops this CCD to the window layout of `template`
    pub fn crop(&self, template: &Ccd) -> Result<Ccd> {
        let windows = template
            .windows
            .iter()
            .map(|(label, layout)| {
                self.windows
                    .values()
                    .find_map(|window| window.crop(layout))
                    .map(|window| (label, window))
                    .ok_or_else(|| CcdError::NoEnclosingWindow(label.to_string()))
            })
            .collect::<Result<Group<Window>>>()?;
        Ok(Ccd {
            windows,
            nxtot: self.nxtot,
            nytot: self.nytot,
            data_status: self.data_status,
        })
    }
    /// Subtracts `other` window by window
    ///
    /// `other` must have a window with the same label and format for every window of this CCD.
    pub fn subtract(&mut self, other: &Ccd) -> Result<()> {
        for (label, window) in self.windows.iter() {
            let rhs = other
                .window(label)
                .ok_or_else(|| CcdError::MissingWindow(label.to_string()))?;
            if !window.same_format(rhs) {
                return Err(CcdError::Shape(label.to_string()));
            }
        }
        for (label, window) in self.windows.iter_mut() {
            if let Some(rhs) = other.window(label) {
                *window -= rhs;
            }
        }
        Ok(())
    }
}

/// One exposure across all the CCDs of the camera
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub ccds: Group<Ccd>,
}
impl Frame {
    pub fn new(ccds: Group<Ccd>) -> Self {
        Self { ccds }
    }
    pub fn get(&self, label: &str) -> Option<&Ccd> {
        self.ccds.get(label)
    }
    pub fn get_mut(&mut self, label: &str) -> Option<&mut Ccd> {
        self.ccds.get_mut(label)
    }
    /// Iterator over the CCD labels
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ccds.labels()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Ccd)> {
        self.ccds.iter()
    }
    /// Returns the unbinned dimensions `(nxtot, nytot)` of each CCD
    pub fn ccd_pars(&self) -> Group<(usize, usize)> {
        self.ccds
            .iter()
            .map(|(label, ccd)| (label, (ccd.nxtot, ccd.nytot)))
            .collect()
    }
    /// Crops this frame to the CCDs and windows of `template`
    pub fn crop(&self, template: &Frame) -> Result<Frame> {
        let ccds = template
            .iter()
            .map(|(label, layout)| {
                self.get(label)
                    .ok_or_else(|| CcdError::MissingCcd(label.to_string()))
                    .and_then(|ccd| ccd.crop(layout))
                    .map(|ccd| (label, ccd))
            })
            .collect::<Result<Group<Ccd>>>()?;
        Ok(Frame { ccds })
    }
    /// Reads a multi-CCD frame file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match read_hcm(path)? {
            Hcm::Frame(frame) => Ok(frame),
            Hcm::Ccd(_) => Err(CcdError::NotAFrame(path.to_path_buf())),
        }
    }
    /// Writes the frame to `path`
    ///
    /// If `clobber` is `false` and `path` exists, the existing file is left untouched
    /// and [CcdError::OutputConflict] is returned.
    pub fn write<P: AsRef<Path>>(&self, path: P, clobber: bool) -> Result<()> {
        write_hcm(path.as_ref(), &HcmRef::Frame(self), clobber)
    }
}

/// Content of a frame file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Hcm {
    Ccd(Ccd),
    Frame(Frame),
}
impl Hcm {
    pub fn write<P: AsRef<Path>>(&self, path: P, clobber: bool) -> Result<()> {
        let hcm = match self {
            Hcm::Ccd(ccd) => HcmRef::Ccd(ccd),
            Hcm::Frame(frame) => HcmRef::Frame(frame),
        };
        write_hcm(path.as_ref(), &hcm, clobber)
    }
}
// same variant names as `Hcm`, serializes without cloning
#[derive(Serialize)]
enum HcmRef<'a> {
    Ccd(&'a Ccd),
    Frame(&'a Frame),
}

/// Reads a frame file holding either a single CCD or a multi-CCD frame
pub fn read_hcm<P: AsRef<Path>>(path: P) -> Result<Hcm> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| CcdError::Io(e, path.to_path_buf()))?;
    pickle::from_reader(BufReader::new(file), Default::default())
        .map_err(|e| CcdError::Decode(e, path.to_path_buf()))
}

fn write_hcm(path: &Path, hcm: &HcmRef, clobber: bool) -> Result<()> {
    let file = if clobber {
        File::create(path)
    } else {
        OpenOptions::new().write(true).create_new(true).open(path)
    }
    .map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => CcdError::OutputConflict(path.to_path_buf()),
        _ => CcdError::Io(e, path.to_path_buf()),
    })?;
    let mut writer = BufWriter::new(file);
    pickle::to_writer(&mut writer, hcm, Default::default())
        .map_err(|e| CcdError::Encode(e, path.to_path_buf()))?;
    writer
        .flush()
        .map_err(|e| CcdError::Io(e, path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{frame, window};
    use rand::Rng;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&mut [3., 1., 2.]), 2.);
        assert_eq!(median(&mut [4., 1., 3., 2.]), 2.5);
        assert_eq!(median(&mut [7.]), 7.);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn median_matches_sorted_reference() {
        let mut rng = rand::thread_rng();
        for n in 1..20 {
            let mut values: Vec<f32> = (0..n).map(|_| rng.gen_range(-100f32..100f32)).collect();
            let mut sorted = values.clone();
            sorted.sort_by(f32::total_cmp);
            let expected = if n % 2 == 1 {
                sorted[n / 2]
            } else {
                ((sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) * 0.5) as f32
            };
            assert_eq!(median(&mut values), expected);
        }
    }

    #[test]
    fn median_of_three_2x2_arrays() {
        let a = DMatrix::from_row_slice(2, 2, &[1., 5., 9., 0.]);
        let b = DMatrix::from_row_slice(2, 2, &[3., 4., 7., 10.]);
        let c = DMatrix::from_row_slice(2, 2, &[2., 6., 8., -1.]);
        let m = median_stack(&[&a, &b, &c]).unwrap();
        assert_eq!(m, DMatrix::from_row_slice(2, 2, &[2., 5., 8., 0.]));
        assert!(median_stack(&[]).is_none());
    }

    #[test]
    fn crop_window() {
        let mut big = Window::zeros(11, 21, 4, 3, 2, 1);
        for (k, v) in big.data.iter_mut().enumerate() {
            *v = k as f32;
        }
        let layout = Window::zeros(13, 22, 2, 2, 2, 1);
        let cropped = big.crop(&layout).unwrap();
        assert!(cropped.same_format(&layout));
        assert_eq!(cropped.data[(0, 0)], big.data[(1, 1)]);
        assert_eq!(cropped.data[(1, 1)], big.data[(2, 2)]);
        // off the binned grid
        assert!(big.crop(&Window::zeros(12, 21, 1, 1, 2, 1)).is_none());
        // different binning
        assert!(big.crop(&Window::zeros(11, 21, 1, 1, 1, 1)).is_none());
        // overflowing
        assert!(big.crop(&Window::zeros(15, 21, 3, 1, 2, 1)).is_none());
        // corrupt binning
        let unbinned = Window::zeros(11, 21, 4, 3, 0, 1);
        assert!(unbinned.crop(&Window::zeros(11, 21, 1, 1, 0, 1)).is_none());
    }

    #[test]
    fn crop_frame_to_template() {
        let bias = Frame::new(
            [(
                "1",
                Ccd::new([("E1", Window::zeros(1, 1, 10, 10, 1, 1))].into_iter().collect(), 10, 10),
            )]
            .into_iter()
            .collect(),
        );
        let template = frame(&[("1", [1., 2., 3., 4.], true)]);
        let cropped = bias.crop(&template).unwrap();
        assert!(cropped.get("1").unwrap().window("E1").unwrap().same_format(
            template.get("1").unwrap().window("E1").unwrap()
        ));
        let other = frame(&[("2", [1., 2., 3., 4.], true)]);
        assert!(matches!(bias.crop(&other), Err(CcdError::MissingCcd(label)) if label == "2"));
    }

    #[test]
    fn subtract_checks_format() {
        let mut ccd = Ccd::new([("E1", window([5., 6., 7., 8.]))].into_iter().collect(), 4, 4);
        let bias = Ccd::new([("E1", window([1., 1., 2., 2.]))].into_iter().collect(), 4, 4);
        ccd.subtract(&bias).unwrap();
        assert_eq!(ccd.window("E1").unwrap().data, DMatrix::from_row_slice(2, 2, &[4., 5., 5., 6.]));

        let shifted = Ccd::new(
            [("E1", Window::new(2, 1, 1, 1, DMatrix::zeros(2, 2)))].into_iter().collect(),
            4,
            4,
        );
        assert!(matches!(ccd.subtract(&shifted), Err(CcdError::Shape(_))));
        let renamed = Ccd::new([("F1", window([0.; 4]))].into_iter().collect(), 4, 4);
        assert!(matches!(ccd.subtract(&renamed), Err(CcdError::MissingWindow(_))));
        // untouched by the failed attempts
        assert_eq!(ccd.window("E1").unwrap().data[(0, 0)], 4.);
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.hcm");
        let f = frame(&[("1", [1., 2., 3., 4.], true), ("2", [5., 6., 7., 8.], false)]);
        f.write(&path, false).unwrap();
        let g = Frame::read(&path).unwrap();
        assert_eq!(f, g);
        assert_eq!(g.labels().collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(!g.get("2").unwrap().is_data());
    }

    #[test]
    fn clobber_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.hcm");
        std::fs::write(&path, b"precious").unwrap();
        let f = frame(&[("1", [1., 2., 3., 4.], true)]);

        let err = f.write(&path, false).unwrap_err();
        assert!(matches!(err, CcdError::OutputConflict(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"precious");

        f.write(&path, true).unwrap();
        assert_eq!(Frame::read(&path).unwrap(), f);
    }

    #[test]
    fn single_ccd_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ccd.hcm");
        let ccd = Ccd::new([("E1", window([1., 2., 3., 4.]))].into_iter().collect(), 2, 2);
        Hcm::Ccd(ccd.clone()).write(&path, false).unwrap();
        assert_eq!(read_hcm(&path).unwrap(), Hcm::Ccd(ccd));
        assert!(matches!(Frame::read(&path), Err(CcdError::NotAFrame(_))));
    }

    #[test]
    fn hcm_extension() {
        assert_eq!(hcm_path("bias"), PathBuf::from("bias.hcm"));
        assert_eq!(hcm_path("bias.fits"), PathBuf::from("bias.fits"));
    }
}
