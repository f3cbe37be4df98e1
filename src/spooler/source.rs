use std::{fmt, path::Path, str::FromStr};

use strum_macros::{Display, EnumIter, EnumString};

use super::{
    list::first_entry, DiskSpool, ListSpool, Result, RunFileServer, ServerSpool, SpoolError,
    Spooler,
};
use crate::{ccd::Frame, config::Config, raw::run_path, raw::RawRun, Group};

/// Unbinned width of a HiPERCAM CCD
pub const HCM_NXTOT: usize = 2048;
/// Unbinned height of a HiPERCAM CCD
pub const HCM_NYTOT: usize = 1040;

const UCAM_NXTOT: usize = 1080;
const UCAM_NYTOT: usize = 1032;
const USPEC_NXTOT: usize = 1056;
const USPEC_NYTOT: usize = 1072;

/// CCD labels and maximum unbinned dimensions `(nxmax, nymax)`
pub type CcdPars = Group<(usize, usize)>;

/// Instrument families
#[derive(Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    /// ULTRACAM or ULTRASPEC
    #[strum(serialize = "ULTRA")]
    Ultra,
    /// HiPERCAM
    #[strum(serialize = "HIPER")]
    Hiper,
}
impl Instrument {
    /// Checks if a run header instrument name belongs to this family
    pub fn reads(&self, name: &str) -> bool {
        match self {
            Instrument::Ultra => matches!(name, "ULTRACAM" | "ULTRASPEC"),
            Instrument::Hiper => name == "HIPERCAM",
        }
    }
    fn parse(name: &str) -> Result<Self> {
        Instrument::from_str(name).map_err(|_| SpoolError::UnknownInstrument(name.to_string()))
    }
}

/// Data sources as chosen on the command line
#[derive(Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// HiPERCAM server
    #[strum(serialize = "hs")]
    HiperServer,
    /// local HiPERCAM run
    #[strum(serialize = "hl")]
    HiperLocal,
    /// ULTRACAM server
    #[strum(serialize = "us")]
    UltraServer,
    /// local ULTRACAM run
    #[strum(serialize = "ul")]
    UltraLocal,
    /// list of HiPERCAM frame files
    #[strum(serialize = "hf")]
    HiperFileList,
}
impl Source {
    pub fn instrument(&self) -> Instrument {
        match self {
            Source::HiperServer | Source::HiperLocal | Source::HiperFileList => Instrument::Hiper,
            Source::UltraServer | Source::UltraLocal => Instrument::Ultra,
        }
    }
    pub fn is_file_list(&self) -> bool {
        *self == Source::HiperFileList
    }
    pub fn is_server(&self) -> bool {
        matches!(self, Source::HiperServer | Source::UltraServer)
    }
    /// Checks if the source is a run, read from a server or from a local disk
    ///
    /// Runs are the sources that are polled and that honour a frame range.
    pub fn is_run(&self) -> bool {
        !self.is_file_list()
    }
    /// Returns the spooler for `resource`, see [data_source_with]
    pub fn data_source(
        &self,
        config: &Config,
        resource: &str,
        first: usize,
        flt: bool,
    ) -> Result<Box<dyn Spooler>> {
        data_source_with(
            config,
            &self.instrument().to_string(),
            resource,
            self.is_file_list(),
            self.is_server(),
            first,
            flt,
        )
    }
    /// Returns the CCD parameters of `resource`, see [get_ccd_pars]
    pub fn ccd_pars(&self, resource: &str) -> Result<CcdPars> {
        get_ccd_pars(&self.instrument().to_string(), resource, self.is_file_list())
    }
}

/// Returns the spooler needed to run through a set of exposures
///
/// The server root directory is taken from the environment, see [Config::from_env].
pub fn data_source(
    instrument: &str,
    resource: &str,
    flist: bool,
    server: bool,
    first: usize,
    flt: bool,
) -> Result<Box<dyn Spooler>> {
    data_source_with(
        &Config::from_env(),
        instrument,
        resource,
        flist,
        server,
        first,
        flt,
    )
}

/// Returns the spooler needed to run through a set of exposures
///
/// `instrument` is either "ULTRA" for ULTRACAM/ULTRASPEC or "HIPER" for HiPERCAM,
/// `resource` is a run name or, if `flist` is `true`, the name of a file list.
/// `server` selects access through the acquisition server, it is ignored for file lists.
/// `first` is the number of the first frame of a run, counting from 1,
/// and `flt` asks for a conversion of the pixels to floating point.
///
/// The spooler is only constructed: nothing is opened before [Spooler::open].
/// Unsupported combinations fail here, before any resource is touched.
pub fn data_source_with(
    config: &Config,
    instrument: &str,
    resource: &str,
    flist: bool,
    server: bool,
    first: usize,
    flt: bool,
) -> Result<Box<dyn Spooler>> {
    match (Instrument::parse(instrument)?, flist, server) {
        (Instrument::Ultra, true, _) => Err(SpoolError::Unsupported {
            instrument: Instrument::Ultra,
            what: "file lists",
        }),
        (Instrument::Ultra, false, true) => Ok(Box::new(ServerSpool::new(
            resource,
            first,
            flt,
            RunFileServer::new(&config.server_root),
        ))),
        (Instrument::Ultra, false, false) => Ok(Box::new(DiskSpool::new(
            Instrument::Ultra,
            resource,
            first,
            flt,
        ))),
        (Instrument::Hiper, true, _) => Ok(Box::new(ListSpool::new(resource))),
        (Instrument::Hiper, false, true) => Err(SpoolError::Unsupported {
            instrument: Instrument::Hiper,
            what: "server access",
        }),
        (Instrument::Hiper, false, false) => Ok(Box::new(DiskSpool::new(
            Instrument::Hiper,
            resource,
            first,
            flt,
        ))),
    }
}

/// Returns the labels and maximum dimensions of the CCDs of `resource`
///
/// Only headers are inspected, no frame is consumed.
/// For file lists the dimensions are those of the first file of the list,
/// all the files of a list are assumed to share them.
pub fn get_ccd_pars(instrument: &str, resource: &str, flist: bool) -> Result<CcdPars> {
    match (Instrument::parse(instrument)?, flist) {
        (Instrument::Ultra, true) => Err(SpoolError::Unsupported {
            instrument: Instrument::Ultra,
            what: "file lists",
        }),
        (Instrument::Ultra, false) => {
            let path = run_path(resource);
            if !path.is_file() {
                return Err(SpoolError::ResourceNotFound(path));
            }
            let run = RawRun::open(&path)?;
            match run.header().instrument.as_str() {
                "ULTRACAM" => Ok(["r", "g", "b"]
                    .into_iter()
                    .map(|label| (label, (UCAM_NXTOT, UCAM_NYTOT)))
                    .collect()),
                "ULTRASPEC" => Ok([("1", (USPEC_NXTOT, USPEC_NYTOT))].into_iter().collect()),
                other => Err(SpoolError::UnsupportedInstrument(other.to_string())),
            }
        }
        (Instrument::Hiper, true) => {
            let name = first_entry(Path::new(resource))?;
            if !name.is_file() {
                return Err(SpoolError::ResourceNotFound(name));
            }
            Ok(Frame::read(name)?.ccd_pars())
        }
        (Instrument::Hiper, false) => Ok(["1", "2", "3", "4", "5"]
            .into_iter()
            .map(|label| (label, (HCM_NXTOT, HCM_NYTOT)))
            .collect()),
    }
}

/// Prints one `label nxmax nymax` line per CCD
pub struct CcdParsTable<'a>(pub &'a CcdPars);
impl fmt::Display for CcdParsTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, (nx, ny)) in self.0.iter() {
            writeln!(f, "{:>3} {:5} {:5}", label, nx, ny)?;
        }
        Ok(())
    }
}
