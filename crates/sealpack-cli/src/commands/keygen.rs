//! Keygen command - create the private key used to unseal events

use console::style;
use std::path::Path;

use sealpack_core::crypto::generate_key_pair;
use sealpack_core::{CoreError, KeyStore};
use sealpack_engine::PipelineConfig;

use crate::error::{CliError, Result};

pub fn run(
    config: &PipelineConfig,
    bits: u32,
    public_out: Option<&Path>,
    force: bool,
) -> Result<()> {
    let store = config.key_store()?;
    let identity = config.identity();

    match store.get_secret(&identity.service, &identity.user) {
        Ok(_) if !force => {
            return Err(CliError::input_with_help(
                format!(
                    "a key for {}/{} already exists in {}",
                    identity.service,
                    identity.user,
                    store.root().display()
                ),
                "use --force to overwrite it",
            ));
        }
        Ok(_) | Err(CoreError::KeyNotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    eprintln!("{}", style("Generating RSA key pair...").cyan().bold());
    let pair = generate_key_pair(bits)?;
    store.set_secret(&identity.service, &identity.user, &pair.private_pem)?;
    tracing::info!(
        service = %identity.service,
        user = %identity.user,
        bits,
        "Stored private key"
    );

    eprintln!(
        "{} Private key stored for {}/{} in {}",
        style("✓").green().bold(),
        identity.service,
        identity.user,
        store.root().display()
    );

    match public_out {
        Some(path) => {
            std::fs::write(path, &pair.public_pem)?;
            eprintln!(
                "{} Public key written to {}",
                style("✓").green().bold(),
                path.display()
            );
        }
        None => print!("{}", pair.public_pem),
    }

    Ok(())
}
