use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use harvest_common::observability::init_logging;
use harvest_config::HarvestConfigLoader;
use harvest_runtime::HarvestRuntime;
use harvest_web::Harvester;
use harvest_web::sink::{JsonLinesSink, RecordSink};
use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::time::Duration;

mod cli;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("harvest: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();

    // 1) Config file, then HARVEST_* env, then flags
    let mut cfg = HarvestConfigLoader::new()
        .with_optional_file(&args.config)
        .load()
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply_overrides(&mut cfg);

    let log_path = init_logging(cfg.log.to_log_config("harvest"))?;
    tracing::info!(target: "harvest.app", url = %args.url, log = %log_path.display(), "run.start");

    let harvester = Harvester::from_config(&cfg)?;
    let runtime = HarvestRuntime::build("harvest-worker", None)?;
    let handle = runtime.handle();
    let stop = handle.cancellation();
    let listener = handle.cancel_on_ctrl_c();

    let report = runtime.block_on(harvester.run(&args.request(), &stop));
    listener.abort();
    runtime.shutdown(Duration::from_secs(2));

    match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            JsonLinesSink::new(BufWriter::new(file)).write(&report.records)?;
        }
        None => JsonLinesSink::new(io::stdout().lock()).write(&report.records)?,
    }
    if let Some(path) = &args.report {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
    }

    eprintln!(
        "harvest: {} records from {} page(s) via {}; stopped: {:?}; details {}/{}; {} duplicate(s) removed",
        report.records.len(),
        report.pages,
        report
            .strategy
            .map_or_else(|| "none".to_string(), |s| s.to_string()),
        report.termination,
        report.enrichment.enriched,
        report.enrichment.attempted,
        report.duplicates_removed,
    );
    if let Some(failure) = &report.failure {
        eprintln!("harvest: {failure}");
    }
    tracing::info!(target: "harvest.app", records = report.records.len(), "run.finished");

    Ok(if report.fetch_exhausted() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}
