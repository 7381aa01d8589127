use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tripcount::constants::{BIKES_FILE, RESULT_FILE, STATIONS_FILE, TIMING_FILE};
use tripcount::io::ensure_dir;
use tripcount::loader::{load_bikes, load_registry};
use tripcount::timing::TimingLog;
use tripcount::{started_trips, CsvResultSink, OrderPolicy, PipelineConfig, ResultSink};

#[derive(Parser, Debug)]
#[command(about = "Counts started trips per station")]
struct Args {
    /// Directory holding bikes.csv and stations.csv
    #[arg(long)]
    in_path: PathBuf,
    /// Directory receiving query1.csv and time1.txt
    #[arg(long)]
    out_path: PathBuf,
    /// Enable the partition-local combine stage
    #[arg(long)]
    combiner: bool,
    /// Output order: station-asc or trips-desc
    #[arg(long, default_value_t = OrderPolicy::StationAsc)]
    order: OrderPolicy,
    /// Number of map partitions (overrides TRIPCOUNT_PARTITIONS)
    #[arg(long)]
    partitions: Option<usize>,
    /// Number of reduce shards (overrides TRIPCOUNT_REDUCERS)
    #[arg(long)]
    reducers: Option<usize>,
    /// Optional JSON file receiving the job statistics
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(p) = self.partitions {
            config = config.with_partitions(p);
            // keep reducers tracking partitions unless set separately
            if self.reducers.is_none() && std::env::var(tripcount::constants::ENV_REDUCERS).is_err() {
                config = config.with_reducers(p);
            }
        }
        if let Some(r) = self.reducers {
            config = config.with_reducers(r);
        }
        if self.combiner {
            config = config.with_combiner(true);
        }
        config
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.pipeline_config();
    config.validate()?;
    ensure_dir(&args.out_path)?;
    let mut timing = TimingLog::create(args.out_path.join(TIMING_FILE), "Query1")?;

    timing.record("Start of file reading")?;
    let records = load_bikes(args.in_path.join(BIKES_FILE))?;
    let registry = Arc::new(load_registry(args.in_path.join(STATIONS_FILE))?);
    info!(records = records.len(), stations = registry.len(), "Inputs loaded");
    timing.record("End of file reading")?;

    timing.record("Start of map/reduce job")?;
    let report = started_trips(&records, registry, &config, args.order)?;
    timing.record("End of map/reduce job")?;

    let mut sink = CsvResultSink::new(args.out_path.join(RESULT_FILE));
    sink.persist(&report.output)?;

    if let Some(path) = &args.stats_json {
        write_stats(path, &config, args.order, &report.stats)?;
    }
    Ok(())
}

fn write_stats(
    path: &Path,
    config: &PipelineConfig,
    order: OrderPolicy,
    stats: &tripcount::stats::StatsCollector,
) -> Result<()> {
    let body = serde_json::json!({ "config": config, "order": order, "stats": stats });
    let text = serde_json::to_string_pretty(&body)?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    info!(in_path = %args.in_path.display(), out_path = %args.out_path.display(), "Query1 starting");
    let code = match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let msg = format!("{e:#}");
            error!(error = %msg, "Query1 failed");
            ExitCode::FAILURE
        }
    };
    info!("Finished query 1");
    code
}
