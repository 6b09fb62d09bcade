use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mavmerge::config::MergeConfig;
use mavmerge::csv_output::CsvTableWriter;
use mavmerge::json_output::JsonReport;
use mavmerge::router::OutputRouter;
use mavmerge::{cli::Cli, pipeline, source::JsonLinesDecoder};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber
///
/// `--debug` forces TRACE, `-v` DEBUG; otherwise `RUST_LOG` or warnings only.
fn init_tracing(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else if verbose {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Cli) -> Result<MergeConfig> {
    let mut config = match &args.config {
        Some(path) => MergeConfig::from_file(path)?,
        None => MergeConfig::default(),
    };
    config.apply_env();
    args.apply_to(&mut config)?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.verbose, args.debug);

    let config = load_config(&args)?;

    let outcome = pipeline::run(&config, &JsonLinesDecoder::new(), &args.paths)?;

    let router = OutputRouter::new(&config.output, &args.paths[0]);
    let written = router.route(&outcome.segments, &mut CsvTableWriter::new())?;

    eprint!("{}", outcome.summary);
    if written.is_empty() {
        eprintln!("No rows matched; nothing written");
    }
    for table in &written {
        eprintln!(
            "Wrote {} ({} rows x {} columns{})",
            table.path.display(),
            table.rows,
            table.columns,
            if table.truncated { ", truncated" } else { "" }
        );
    }

    if args.verbose && !outcome.rates.is_empty() {
        eprint!("{}", outcome.rates);
    }

    if let Some(path) = &args.report {
        JsonReport::new(&outcome.summary, &outcome.rates, &written)
            .write_to(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    Ok(())
}
