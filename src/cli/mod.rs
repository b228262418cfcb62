// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All work is delegated to Layer 2 (application).
//
//   1. `train`     trains a CCT on an image folder
//   2. `predict`   loads a checkpoint and classifies images
//   3. `summary`   prints shapes and parameter counts
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, SummaryArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cct",
    version,
    about = "Train and run Compact Convolutional Transformers on image folders."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; this layer only routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Summary(args) => run_summary(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.data_dir);

    let cfg: TrainConfig = args.try_into()?;
    let checkpoint_dir   = cfg.checkpoint_dir.clone();
    let report = TrainUseCase::new(cfg).execute()?;

    match report.best() {
        Some(best) => println!(
            "Training complete. Best epoch {} (val_loss={:.4}, val_acc={:.1}%), checkpoints in '{}'.",
            best.epoch, best.val_loss, best.val_acc * 100.0, checkpoint_dir,
        ),
        None => println!("Training complete. Checkpoints in '{}'.", checkpoint_dir),
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::from_checkpoint(&args.checkpoint_dir)?;
    for result in use_case.predict(&args.path, args.top_k)? {
        println!("{}", result.path.display());
        for p in &result.predictions {
            println!("  {:<24} {:>6.2}%", p.class_name, p.confidence * 100.0);
        }
    }
    Ok(())
}

fn run_summary(args: SummaryArgs) -> Result<()> {
    use crate::application::summary_use_case::SummaryUseCase;

    let mut cfg = TrainConfig { num_classes: args.num_classes, ..Default::default() };
    args.model.apply(&mut cfg)?;
    let model_cfg = cfg.model_config().with_add_top(!args.no_top);

    let summary = SummaryUseCase::new(model_cfg).execute()?;
    println!("{summary}");
    Ok(())
}
