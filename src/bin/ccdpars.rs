use hipercam::{spooler::CcdParsTable, Source};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "ccdpars", about = "Labels and maximum dimensions of the CCDs of a run")]
struct Opt {
    /// Data source: hs, hl, us, ul or hf
    #[structopt(short, long, default_value = "hl")]
    source: Source,
    /// Run name or, for the hf source, file list name
    resource: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let ccd_pars = opt.source.ccd_pars(&opt.resource)?;
    print!("{}", CcdParsTable(&ccd_pars));
    Ok(())
}
