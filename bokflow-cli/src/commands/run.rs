use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use bokflow::config::{ConfigResolver, Epoch, RunOverrides};
use bokflow::errors::BokflowError;
use bokflow::events::LoggingEventSink;
use bokflow::pipeline::{PipelineRunner, StageScheduler};
use bokflow::processor::{CommandProcessor, JsonObservationLog};
use bokflow::registry::StageRegistry;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct RunArgs {
    /// Observing night (YYYYMMDD)
    #[arg(long)]
    pub night: Option<String>,

    /// Raw data root (default: $BASSDATA, else ./rawdata)
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    /// Observation log (default: $BASSDIR/bass-newtiles-observed.json)
    #[arg(long)]
    pub obsdb: Option<PathBuf>,

    /// Output root (default: $BASSRDXDIR, else $GSCRATCH/rmreduce)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Comma-separated bands to process (default: every band observed)
    #[arg(short, long, value_delimiter = ',')]
    pub bands: Vec<String>,

    /// Comma-separated CCDs to process
    #[arg(long, value_delimiter = ',')]
    pub ccds: Vec<u8>,

    /// Units processed concurrently within a stage
    #[arg(short = 'j', long)]
    pub processes: Option<usize>,

    /// Comma-separated WCS solver config files
    #[arg(long)]
    pub wcs_config: Vec<String>,

    /// Data taken before the detector upgrade
    #[arg(long)]
    pub legacy: bool,

    /// Do not generate weight maps
    #[arg(long)]
    pub no_weight_maps: bool,

    /// Skip stages already completed with the same settings
    #[arg(long)]
    pub resume: bool,

    /// Program applied to each unit of work
    #[arg(long, default_value = "bokproc")]
    pub processor: PathBuf,

    /// Stages or groups to run
    #[arg(short, long, value_delimiter = ',', default_value = "all")]
    pub stages: Vec<String>,

    /// Print the plan and output locations without running anything
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    fn overrides(&self, verbose: bool) -> RunOverrides {
        RunOverrides {
            night: self.night.clone(),
            raw_data_root: self.raw_dir.clone(),
            obsdb: self.obsdb.clone(),
            output_root: self.output_dir.clone(),
            bands: self.bands.clone(),
            ccds: self.ccds.clone(),
            parallelism: self.processes,
            verbose,
            wcs_config: self.wcs_config.clone(),
            epoch: self.legacy.then_some(Epoch::Legacy),
            no_weight_maps: self.no_weight_maps,
            resume: self.resume,
        }
    }
}

pub async fn run(args: &RunArgs, verbose: bool) -> Result<()> {
    let config = ConfigResolver::new().resolve(&args.overrides(verbose))?;
    let registry = Arc::new(StageRegistry::standard());
    let plan = StageScheduler::new(&registry).plan(&args.stages)?;
    let obslog = JsonObservationLog::load(config.obsdb())
        .await
        .map_err(BokflowError::from)?;

    let runner = PipelineRunner::new(
        Arc::clone(&registry),
        Arc::new(CommandProcessor::new(&args.processor)),
        Arc::new(obslog),
    )
    .with_event_sink(Arc::new(LoggingEventSink::debug()));

    if args.dry_run {
        println!("plan: {plan}");
        for warning in plan.warnings() {
            println!("warning: {warning}");
        }
        for assignment in runner.assignments(&plan, &config)? {
            let tree = if assignment.scratch { "scratch" } else { "permanent" };
            println!(
                "{:<16} {:<24} {tree:<9} {}",
                assignment.stage,
                assignment.unit.to_string(),
                assignment.path.display()
            );
        }
        return Ok(());
    }

    let report = runner.execute(&plan, &config).await?;
    info!(
        run_id = %report.run_id,
        executed = report.executed().len(),
        skipped = report.skipped().len(),
        "Night {} reduced",
        report.night
    );
    if verbose {
        println!("{}", serde_json::to_string_pretty(&report.stages)?);
    }
    Ok(())
}
