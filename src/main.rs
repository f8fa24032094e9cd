use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use cifar100_prep::{Cifar100, PrepConfig};

const CONFIG_FILE: &str = "cifar100.json";

fn main() -> Result<()> {
    env_logger::init();

    let config = if Path::new(CONFIG_FILE).is_file() {
        info!("reading configuration from {CONFIG_FILE}");
        PrepConfig::from_path(CONFIG_FILE).with_context(|| format!("loading {CONFIG_FILE}"))?
    } else {
        PrepConfig::default()
    };

    let cifar = Cifar100::new(config).context("invalid configuration")?;
    let (fetched, extracted) = cifar.download()?;
    info!("fetch: {fetched:?}, extract: {extracted:?}");

    let summary = cifar.preprocess_and_save()?;
    info!(
        "wrote {} train, {} validation and {} test records",
        summary.train, summary.validation, summary.test
    );

    let batches = cifar.training_batches(false)?;
    info!(
        "{} training batches of up to {}",
        batches.num_batches(),
        batches.batch_size()
    );

    Ok(())
}
