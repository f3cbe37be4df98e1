use strum_macros::Display;

use crate::{
    averun::AverunError, ccd::CcdError, hang_about::HangAboutError, raw::RawError,
    spooler::SpoolError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `ccd` module")]
    Ccd(#[from] CcdError),
    #[error("Error in the `raw` module")]
    Raw(#[from] RawError),
    #[error("Error in the `spooler` module")]
    Spool(#[from] SpoolError),
    #[error("Error in the `averun` module")]
    Averun(#[from] AverunError),
    #[error("Error in the `hang_about` module")]
    HangAbout(#[from] HangAboutError),
}
pub type Result<T> = std::result::Result<T, Error>;

/// Families of failures, as reported to users
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// invalid instrument, source or option combination
    #[strum(serialize = "configuration error")]
    Configuration,
    /// missing or unreadable file
    #[strum(serialize = "resource error")]
    Resource,
    /// corrupt or unexpected content
    #[strum(serialize = "format error")]
    Format,
    /// nothing to combine
    #[strum(serialize = "no data")]
    NoData,
    /// the output file exists
    #[strum(serialize = "output conflict")]
    Output,
}

impl From<&CcdError> for ErrorKind {
    fn from(e: &CcdError) -> Self {
        match e {
            CcdError::Io(..) => ErrorKind::Resource,
            CcdError::OutputConflict(_) => ErrorKind::Output,
            _ => ErrorKind::Format,
        }
    }
}
impl From<&RawError> for ErrorKind {
    fn from(e: &RawError) -> Self {
        match e {
            RawError::Io(..) => ErrorKind::Resource,
            _ => ErrorKind::Format,
        }
    }
}
impl From<&SpoolError> for ErrorKind {
    fn from(e: &SpoolError) -> Self {
        match e {
            SpoolError::UnknownInstrument(_)
            | SpoolError::Unsupported { .. }
            | SpoolError::UnsupportedInstrument(_)
            | SpoolError::NotOpen => ErrorKind::Configuration,
            SpoolError::ResourceNotFound(_) | SpoolError::EmptyList(_) | SpoolError::Io(..) => {
                ErrorKind::Resource
            }
            SpoolError::Raw(e) => e.into(),
            SpoolError::Ccd(e) => e.into(),
        }
    }
}
impl From<&AverunError> for ErrorKind {
    fn from(e: &AverunError) -> Self {
        match e {
            AverunError::NoData | AverunError::NoValidFrames(_) => ErrorKind::NoData,
            AverunError::InvalidRange { .. } => ErrorKind::Configuration,
            AverunError::OutputConflict(_) => ErrorKind::Output,
            AverunError::Spool(e) => e.into(),
            AverunError::Ccd(e) => e.into(),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Ccd(e) => e.into(),
            Error::Raw(e) => e.into(),
            Error::Spool(e) => e.into(),
            Error::Averun(e) => e.into(),
            Error::HangAbout(_) => ErrorKind::Configuration,
        }
    }
}
