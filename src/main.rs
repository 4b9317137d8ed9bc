use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use tdm_core::error::{exit_code, PkError, PkResult};
use tdm_core::query::{self, QueryData};
use tdm_core::unit::ConversionTable;
use tdm_core::version;

/// Illustrative CLI surface: reads a JSON query fixture, runs every
/// request through the extractor/PK pipeline and writes a JSON results
/// file. The real XML query import stays out of scope; this exists to
/// drive the pipeline end-to-end the way the production tool does.
#[derive(Parser)]
#[command(name = "tdm-core")]
#[command(version = version::VERSION)]
#[command(about = "Therapeutic drug monitoring: dosage extraction and PK calculation")]
struct Cli {
    /// Path to a JSON query fixture.
    #[arg(short, long)]
    query: PathBuf,

    /// Path to write the JSON results to.
    #[arg(short, long)]
    output: PathBuf,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(exit_code(&err) as u8)
        }
    }
}

fn run(cli: &Cli) -> PkResult<()> {
    info!("{}", version::banner());

    let raw = std::fs::read_to_string(&cli.query).map_err(PkError::Io)?;
    let query: QueryData = serde_json::from_str(&raw).map_err(PkError::Json)?;
    info!("loaded query with {} request(s) from {:?}", query.requests.len(), cli.query);

    let table = ConversionTable::standard();
    let results = query::run_query(&query, &table)?;
    info!("computed {} result(s)", results.len());

    let serialized = serde_json::to_string_pretty(&results).map_err(PkError::Json)?;
    std::fs::write(&cli.output, serialized).map_err(PkError::Io)?;
    info!("wrote results to {:?}", cli.output);

    Ok(())
}
