//! Raw run files
//!
//! A raw run is the stream of frames written by the instrument during one run:
//!  - the magic bytes [MAGIC],
//!  - the length of the header as a little-endian `u32`,
//!  - the pickled [RunHeader],
//!  - fixed-size frames: for each CCD, in header order, one status byte
//!    (non-zero for real data) then the `nx*ny` little-endian `u16` pixels of
//!    each window, row by row.
//!
//! Because all the frames have the same size, frame `n` is read by seeking straight to it.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::{Path, PathBuf},
};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use serde_pickle as pickle;

use crate::{
    ccd::{Ccd, Frame, Window},
    Group,
};

pub const MAGIC: &[u8; 8] = b"HIPRAW01";
/// Extension of the raw run files
pub const RAW_EXTENSION: &str = "raw";

#[derive(Debug, thiserror::Error)]
pub enum RawError {
    #[error("failed to access {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("{0:?} is not a raw run file")]
    Magic(PathBuf),
    #[error("the run header of {0:?} is truncated")]
    TruncatedHeader(PathBuf),
    #[error("failed to decode the run header of {1:?}")]
    Header(#[source] pickle::Error, PathBuf),
    #[error("failed to encode the run header into {1:?}")]
    EncodeHeader(#[source] pickle::Error, PathBuf),
    #[error("the run header of {0:?} has no pixels")]
    EmptyLayout(PathBuf),
    #[error("invalid run header in {0:?}: {1}")]
    InvalidHeader(PathBuf, String),
    #[error("frame {frame} of {path:?} is truncated")]
    Truncated { frame: usize, path: PathBuf },
    #[error("frame does not match the run layout: {0}")]
    Layout(String),
}
type Result<T> = std::result::Result<T, RawError>;

/// Appends the raw run extension to `run` if it has none
pub fn run_path<P: AsRef<Path>>(run: P) -> PathBuf {
    let run = run.as_ref();
    match run.extension() {
        Some(_) => run.to_path_buf(),
        None => run.with_extension(RAW_EXTENSION),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowLayout {
    pub label: String,
    pub llx: usize,
    pub lly: usize,
    pub nx: usize,
    pub ny: usize,
    pub xbin: usize,
    pub ybin: usize,
}
impl WindowLayout {
    fn npix(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcdLayout {
    pub label: String,
    pub nxtot: usize,
    pub nytot: usize,
    pub windows: Vec<WindowLayout>,
}

/// Instrument name and readout layout of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    /// "ULTRACAM", "ULTRASPEC" or "HIPERCAM"
    pub instrument: String,
    pub ccds: Vec<CcdLayout>,
}
impl RunHeader {
    /// Size of one frame in bytes, `None` if it does not fit in memory
    pub fn frame_size(&self) -> Option<usize> {
        self.ccds.iter().try_fold(0usize, |size, ccd| {
            ccd.windows
                .iter()
                .try_fold(0usize, |npix, w| npix.checked_add(w.npix()?))
                .and_then(|npix| npix.checked_mul(2))
                .and_then(|bytes| bytes.checked_add(1))
                .and_then(|bytes| size.checked_add(bytes))
        })
    }
    /// Checks the layout and returns the frame size
    fn validate(&self) -> std::result::Result<usize, String> {
        for ccd in &self.ccds {
            if let Some(w) = ccd.windows.iter().find(|w| w.xbin == 0 || w.ybin == 0) {
                return Err(format!(
                    "window {} of CCD {} has a zero binning factor",
                    w.label, ccd.label
                ));
            }
        }
        self.frame_size()
            .ok_or_else(|| "the frame size overflows".to_string())
    }
    // `bytes` must be `frame_size` long, which bounds every offset below
    fn decode(&self, bytes: &[u8]) -> Frame {
        let mut ccds = Group::new();
        let mut offset = 0;
        for layout in &self.ccds {
            let data_status = bytes[offset] != 0;
            offset += 1;
            let mut windows = Group::new();
            for w in &layout.windows {
                let end = offset + 2 * w.nx * w.ny;
                let data: Vec<f32> = bytes[offset..end]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32)
                    .collect();
                offset = end;
                windows.insert(
                    w.label.as_str(),
                    Window::new(
                        w.llx,
                        w.lly,
                        w.xbin,
                        w.ybin,
                        DMatrix::from_row_slice(w.ny, w.nx, &data),
                    ),
                );
            }
            ccds.insert(
                layout.label.as_str(),
                Ccd {
                    windows,
                    nxtot: layout.nxtot,
                    nytot: layout.nytot,
                    data_status,
                },
            );
        }
        Frame::new(ccds)
    }
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.frame_size().unwrap_or_default());
        for layout in &self.ccds {
            let ccd = frame
                .get(&layout.label)
                .ok_or_else(|| RawError::Layout(format!("CCD {} is missing", layout.label)))?;
            bytes.push(ccd.is_data() as u8);
            for w in &layout.windows {
                let window = ccd
                    .window(&w.label)
                    .filter(|window| window.data.shape() == (w.ny, w.nx))
                    .ok_or_else(|| {
                        RawError::Layout(format!(
                            "window {} of CCD {} is missing or misshapen",
                            w.label, layout.label
                        ))
                    })?;
                for row in window.data.row_iter() {
                    for value in row.iter() {
                        let count = value.round().clamp(0., u16::MAX as f32) as u16;
                        bytes.extend_from_slice(&count.to_le_bytes());
                    }
                }
            }
        }
        Ok(bytes)
    }
}

/// Availability of a frame in a raw run
pub(crate) enum RawFrame {
    Complete(Frame),
    /// some, but not all, of the frame bytes are on disk
    Partial,
    /// the run stops before the frame
    Absent,
}

/// Reader of a raw run file
#[derive(Debug)]
pub struct RawRun {
    path: PathBuf,
    file: File,
    header: RunHeader,
    frame_size: u64,
    data_start: u64,
}
impl RawRun {
    /// Opens a raw run and reads its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| RawError::Io(e, path.clone()))?;
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)
            .map_err(|_| RawError::Magic(path.clone()))?;
        if &magic != MAGIC {
            return Err(RawError::Magic(path));
        }
        let mut len = [0u8; 4];
        file.read_exact(&mut len)
            .map_err(|_| RawError::TruncatedHeader(path.clone()))?;
        let len = u32::from_le_bytes(len) as usize;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)
            .map_err(|_| RawError::TruncatedHeader(path.clone()))?;
        let header: RunHeader = pickle::from_slice(&bytes, Default::default())
            .map_err(|e| RawError::Header(e, path.clone()))?;
        let frame_size = header
            .validate()
            .map_err(|msg| RawError::InvalidHeader(path.clone(), msg))?;
        if frame_size == header.ccds.len() {
            return Err(RawError::EmptyLayout(path));
        }
        log::debug!("opened raw run {:?} ({})", path, header.instrument);
        Ok(Self {
            path,
            file,
            header,
            frame_size: frame_size as u64,
            data_start: (MAGIC.len() + 4 + len) as u64,
        })
    }
    pub fn header(&self) -> &RunHeader {
        &self.header
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| RawError::Io(e, self.path.clone()))
    }
    /// Number of frames fully written so far
    pub fn frames_available(&self) -> Result<usize> {
        Ok((self.len()?.saturating_sub(self.data_start) / self.frame_size) as usize)
    }
    /// Reads frame `n`, counting from 1
    pub(crate) fn read_frame(&mut self, n: usize) -> Result<RawFrame> {
        let size = self.frame_size;
        // a frame beyond the largest possible file is never written
        let Some((start, end)) = (n.saturating_sub(1) as u64)
            .checked_mul(size)
            .and_then(|offset| offset.checked_add(self.data_start))
            .and_then(|start| Some((start, start.checked_add(size)?)))
        else {
            return Ok(RawFrame::Absent);
        };
        let len = self.len()?;
        if len <= start {
            return Ok(RawFrame::Absent);
        }
        if len < end {
            return Ok(RawFrame::Partial);
        }
        let mut bytes = vec![0u8; size as usize];
        self.file
            .seek(SeekFrom::Start(start))
            .and_then(|_| self.file.read_exact(&mut bytes))
            .map_err(|e| RawError::Io(e, self.path.clone()))?;
        Ok(RawFrame::Complete(self.header.decode(&bytes)))
    }
}

/// Writer of a raw run file
///
/// Pixel values are rounded and clipped to the `u16` range.
#[derive(Debug)]
pub struct RunWriter {
    path: PathBuf,
    file: File,
    header: RunHeader,
}
impl RunWriter {
    /// Creates a new run file and writes its header
    pub fn create<P: AsRef<Path>>(path: P, header: RunHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        header
            .validate()
            .map_err(|msg| RawError::InvalidHeader(path.clone(), msg))?;
        let bytes =
            pickle::to_vec(&header, Default::default()).map_err(|e| RawError::EncodeHeader(e, path.clone()))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| RawError::Io(e, path.clone()))?;
        file.write_all(MAGIC)
            .and_then(|_| file.write_all(&(bytes.len() as u32).to_le_bytes()))
            .and_then(|_| file.write_all(&bytes))
            .map_err(|e| RawError::Io(e, path.clone()))?;
        Ok(Self { path, file, header })
    }
    /// Appends a frame to the run
    pub fn append(&mut self, frame: &Frame) -> Result<()> {
        let bytes = self.header.encode(frame)?;
        self.file
            .write_all(&bytes)
            .and_then(|_| self.file.flush())
            .map_err(|e| RawError::Io(e, self.path.clone()))
    }
    /// Appends the given byte range of a frame, as when the instrument is still writing it
    pub fn append_partial(&mut self, frame: &Frame, range: Range<usize>) -> Result<()> {
        let bytes = self.header.encode(frame)?;
        let end = range.end.min(bytes.len());
        self.file
            .write_all(&bytes[range.start.min(end)..end])
            .and_then(|_| self.file.flush())
            .map_err(|e| RawError::Io(e, self.path.clone()))
    }
}
