use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use oceanfleet::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
    trace::{JsonLinesTrace, WriterTrace},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Ocean fleet operations simulator")]
struct Cli {
    /// Path to the scenario file (YAML, or JSON with a .json extension)
    #[arg(long, default_value = "scenarios/two_harbors.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Write the trace to this file instead of stdout
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Emit the trace as JSON lines
    #[arg(long)]
    json: bool,

    /// Override snapshot interval in ticks
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Diagnostic log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", value_parser = parse_level)]
    log_level: log::LevelFilter,
}

fn parse_level(raw: &str) -> Result<log::LevelFilter, String> {
    raw.parse().map_err(|_| {
        format!("unknown log level '{raw}', expected off, error, warn, info, debug or trace")
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .format_timestamp(None)
        .init();

    let loader = ScenarioLoader::new(".");
    let scenario = loader
        .load(&cli.scenario)
        .with_context(|| format!("loading {}", cli.scenario.display()))?;
    let mut world = scenario.build_world()?;
    let ticks = scenario.ticks(cli.ticks);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_ticks);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        snapshot_interval_ticks: snapshot_interval,
        snapshot_dir,
    };
    let mut engine = EngineBuilder::standard(settings, scenario.event_system()).build();

    let out: Box<dyn Write> = match &cli.trace {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let summary = if cli.json {
        let mut sink = JsonLinesTrace::new(out);
        let summary = engine.run(&mut world, ticks, &mut sink)?;
        sink.finish().context("writing trace")?;
        summary
    } else {
        let mut sink = WriterTrace::new(out);
        let summary = engine.run(&mut world, ticks, &mut sink)?;
        sink.finish().context("writing trace")?;
        summary
    };

    eprintln!("Scenario '{}' completed for {} ticks.", scenario.name, summary.ticks);
    for (id, corp) in &summary.corporations {
        eprintln!(
            "  {id} {}: {} credits, {} ships, {} collected",
            corp.name, corp.credits, corp.ships, corp.collected
        );
    }
    eprintln!("  garbage left: {}", summary.garbage_left);
    Ok(())
}
