use clap::Parser;
use monkey_tools::{init_logging, ToolConfig};
use training::util::{run_train_with, TrainArgs};

fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    let cfg = ToolConfig::load();
    init_logging(args.log_level.as_deref().unwrap_or(&cfg.log_level));
    run_train_with(&args, cfg)?;
    Ok(())
}
