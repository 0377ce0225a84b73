//! Resolve command - pin a reference against the registry

use console::style;

use sealpack_engine::PipelineConfig;
use sealpack_repo::{OciRegistry, ReferenceResolver};

use crate::error::Result;

pub async fn run(reference: &str, config: &PipelineConfig) -> Result<()> {
    let registry = OciRegistry::new(&config.registry)?;
    let resolved = ReferenceResolver::new(&registry).resolve(reference).await?;

    if resolved.as_str() == reference.trim() {
        tracing::debug!(reference, "Reference was already pinned");
    } else {
        eprintln!(
            "{} {} {}",
            style(reference).dim(),
            style("->").dim(),
            style(&resolved).green()
        );
    }
    println!("{}", resolved);
    Ok(())
}
