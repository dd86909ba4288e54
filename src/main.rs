use std::process::ExitCode;

use anyhow::Context;

use channel_sorter::channels::build_source;
use channel_sorter::config::SorterConfig;
use channel_sorter::pipeline::processor::MessageProcessor;
use channel_sorter::store::{CollectionStore, OutputLayout};
use channel_sorter::{Classifier, Pipeline, RunOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    println!("📨 Channel Sorter v{}\n", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(RunOutcome::Written(summary)) => {
            for saved in &summary.saved {
                println!(
                    "   Saved {} {} to {}",
                    saved.count,
                    saved.category,
                    saved.path.display()
                );
            }
            println!("\n[SUCCESS] Done! Check your scripts/ and news/ folders.");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Empty) => {
            println!("[ERROR] No messages fetched. Nothing was written.");
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<RunOutcome> {
    let config = SorterConfig::from_env().context("Failed to load configuration")?;

    println!("   Limit: {}", config.limit);
    println!("   Output: {}\n", config.output_dir.display());

    let store = CollectionStore::new(OutputLayout::new(config.output_dir));
    let source = build_source(config.source);
    let pipeline = Pipeline::new(
        source,
        MessageProcessor::new(Classifier::default_rules()),
        store,
    );

    let outcome = pipeline.run(config.limit).await?;
    Ok(outcome)
}
