use std::path::PathBuf;

use hipercam::{ccd::hcm_path, Averun, Config, Frame, HangAbout, Source};
use indicatif::ProgressBar;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "averun",
    about = "Median combination of the frames of a HiPERCAM or ULTRACAM run"
)]
struct Opt {
    /// Data source: hs (HiPERCAM server), hl (local HiPERCAM run), us (ULTRACAM server),
    /// ul (local ULTRACAM run) or hf (list of HiPERCAM frame files)
    #[structopt(short, long, default_value = "hl")]
    source: Source,
    /// Run name or, for the hf source, file list name
    run: String,
    /// First frame to combine, counting from 1 (ignored for file lists)
    #[structopt(short, long, default_value = "1")]
    first: usize,
    /// Last frame to combine, default to the first frame for runs and to the whole list for
    /// file lists
    #[structopt(short, long)]
    last: Option<usize>,
    /// Time to wait between attempts to read a frame that is not ready [s]
    #[structopt(long, default_value = "1")]
    twait: f64,
    /// Maximum total time to wait for a frame [s]
    #[structopt(long, default_value = "10")]
    tmax: f64,
    /// Bias frame to subtract, "none" to skip the subtraction
    #[structopt(short, long, default_value = "none")]
    bias: String,
    /// Overwrite the output file if it exists
    #[structopt(short, long)]
    clobber: bool,
    /// Convert the raw pixel counts to floating point while reading
    #[structopt(long)]
    flt: bool,
    /// Output frame file
    #[structopt(short, long)]
    output: PathBuf,
}

fn run(opt: Opt) -> hipercam::Result<()> {
    let config = Config::from_env();
    log::debug!("{:?}", config);

    let first = if opt.source.is_run() { opt.first } else { 1 };
    let last = match (opt.source.is_run(), opt.last) {
        (true, last) => Some(last.unwrap_or(first)),
        (false, last) => last,
    };

    let mut spool = opt.source.data_source(&config, &opt.run, first, opt.flt)?;

    let progress = match last {
        Some(last) => ProgressBar::new((last + 1).saturating_sub(first) as u64),
        None => ProgressBar::new_spinner(),
    };
    let mut averun = Averun::new(hcm_path(&opt.output))
        .first(first)
        .clobber(opt.clobber)
        .progress(progress);
    if let Some(last) = last {
        averun = averun.last(last);
    }
    if opt.source.is_run() {
        averun = averun.hang_about(HangAbout::new(opt.twait, opt.tmax)?);
    }
    if opt.bias.to_lowercase() != "none" {
        averun = averun.bias(Frame::read(hcm_path(&opt.bias))?);
    }
    averun.run(spool.as_mut())?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    log::debug!("{:?}", opt);
    run(opt).map_err(|e| {
        log::error!("averun failed ({})", e.kind());
        e
    })?;
    Ok(())
}
