use std::{
    fs::File,
    io::{self, BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};

use super::{ReadOutcome, Result, SpoolError, Spooler};
use crate::ccd::Frame;

/// Returns the file name held by a line of a file list
///
/// Lines starting with `#` are comments; blank lines are skipped too.
fn entry(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        None
    } else {
        Some(line)
    }
}

fn open_list(path: &Path) -> Result<Lines<BufReader<File>>> {
    File::open(path)
        .map(|file| BufReader::new(file).lines())
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SpoolError::ResourceNotFound(path.to_path_buf()),
            _ => SpoolError::Io(e, path.to_path_buf()),
        })
}

/// Returns the first file name of a file list
pub(super) fn first_entry(path: &Path) -> Result<PathBuf> {
    for line in open_list(path)? {
        let line = line.map_err(|e| SpoolError::Io(e, path.to_path_buf()))?;
        if let Some(name) = entry(&line) {
            return Ok(PathBuf::from(name));
        }
    }
    Err(SpoolError::EmptyList(path.to_path_buf()))
}

/// Frames of a list of HiPERCAM frame files, one file name per line
#[derive(Debug)]
pub struct ListSpool {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
}
impl ListSpool {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lines: None,
        }
    }
}
impl Spooler for ListSpool {
    fn open(&mut self) -> Result<()> {
        self.lines = Some(open_list(&self.path)?);
        log::debug!("spooling the frames listed in {:?}", self.path);
        Ok(())
    }
    fn next_frame(&mut self) -> Result<ReadOutcome> {
        let lines = self.lines.as_mut().ok_or(SpoolError::NotOpen)?;
        for line in lines {
            let line = line.map_err(|e| SpoolError::Io(e, self.path.clone()))?;
            if let Some(name) = entry(&line) {
                let path = Path::new(name);
                if !path.is_file() {
                    return Err(SpoolError::ResourceNotFound(path.to_path_buf()));
                }
                return Ok(ReadOutcome::Frame(Frame::read(path)?));
            }
        }
        Ok(ReadOutcome::EndOfSequence)
    }
    fn close(&mut self) {
        if self.lines.take().is_some() {
            log::debug!("closed {:?}", self.path);
        }
    }
}
