use anyhow::Result;
use bokflow::pipeline::StageScheduler;
use bokflow::registry::StageRegistry;
use clap::Args;

#[derive(Args)]
pub struct PlanArgs {
    /// Stages or groups to plan (all, calib, skyflat-seq, science, or stage names)
    #[arg(short, long, value_delimiter = ',', default_value = "all")]
    pub stages: Vec<String>,
}

pub fn run(args: &PlanArgs) -> Result<()> {
    let registry = StageRegistry::standard();
    let plan = StageScheduler::new(&registry).plan(&args.stages)?;

    for (i, stage) in plan.stages().iter().enumerate() {
        let def = registry.stage(stage)?;
        let scratch = if def.is_scratch() { " (scratch)" } else { "" };
        println!(
            "{:>2}. {:<16} per {:<5} -> {}{scratch}",
            i + 1,
            stage,
            def.granularity.to_string(),
            def.produces
        );
    }
    for warning in plan.warnings() {
        println!("warning: {warning}");
    }
    Ok(())
}
