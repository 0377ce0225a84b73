//! Process command - run one package event through the pipeline

use console::style;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sealpack_engine::{DirectoryLoader, PackageEvent, Pipeline, PipelineConfig, PipelineReport};
use sealpack_repo::OciRegistry;

use crate::error::Result;
use crate::util::{format_size, short_digest};

pub async fn run(event_path: &Path, output_dir: &Path, config: PipelineConfig) -> Result<()> {
    let event = PackageEvent::from_file(event_path)?;

    let key_store = Arc::new(config.key_store()?);
    let registry = Arc::new(OciRegistry::new(&config.registry)?);
    let loader = DirectoryLoader::new(output_dir);
    let archive_path = loader.archive_path(&event.target);
    let pipeline = Pipeline::new(key_store, registry, Arc::new(loader), config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    println!(
        "{} {}",
        style("Processing").cyan().bold(),
        style(&event.target).bold()
    );
    let outcome = pipeline.run(&event, &cancel).await;
    signal.abort();

    let report = outcome?;
    print_report(&report, &archive_path);
    Ok(())
}

fn print_report(report: &PipelineReport, archive_path: &Path) {
    println!();
    println!("  {}: {}", style("Reference").dim(), report.reference);
    println!(
        "  {}: {:?} ({} layer(s))",
        style("Acquired").dim(),
        report.acquisition,
        report.layers
    );
    println!(
        "  {}: {} document(s), {} parsed",
        style("Contents").dim(),
        report.documents,
        report.schemas
    );
    if report.fallbacks > 0 {
        println!(
            "  {}: {} document(s) read as plaintext",
            style("Fallbacks").yellow(),
            report.fallbacks
        );
    }
    println!(
        "  {}: {} ({})",
        style("Archive").dim(),
        archive_path.display(),
        format_size(report.archive_size as u64)
    );
    println!(
        "  {}: {}",
        style("Layer").dim(),
        short_digest(&report.archive_digest, 12)
    );

    if report.has_errors() {
        println!();
        println!(
            "{} {} problem(s) skipped:",
            style("!").yellow().bold(),
            report.errors.len()
        );
        for error in &report.errors {
            println!(
                "  {} {} [{}]: {}",
                style("-").yellow(),
                error.source,
                error.kind,
                error.message
            );
        }
    }

    println!();
    println!(
        "{} Loaded {}",
        style("✓").green().bold(),
        style(&report.target).bold()
    );
}
