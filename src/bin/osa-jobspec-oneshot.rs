//! "Oneshot" job-specification builder.
//!
//! This executable builds the data-server job for one product query, based on
//! arguments given on the command line, and prints it as JSON. Development
//! builds that should be accepted are listed, comma-separated, in
//! `OSA_KNOWN_DEV_VERSIONS`.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::env;

use cdci_osa_plugin::{knowledge::StaticVersionRegistry, query::ProductRegistry, Services};

fn main() -> Result<()> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let product = args.next().ok_or_else(|| {
        anyhow!(
            "first argument should be the product query ({})",
            ProductRegistry::standard()
                .names()
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;

    let json_text = args
        .next()
        .ok_or_else(|| anyhow!("second argument should be JSON parameter text"))?;
    let payload: Value =
        serde_json::from_str(&json_text).context("failed to parse the JSON parameters")?;

    let known = env::var("OSA_KNOWN_DEV_VERSIONS").unwrap_or_default();
    let registry = StaticVersionRegistry::new(
        known
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
    );

    let svcs = Services::init(Box::new(registry))?;

    let job = match svcs.job_spec(&product, payload) {
        Ok(j) => j,
        Err(e) if e.is_user_error() => {
            eprintln!("request rejected: {}", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    match job {
        Some(job) => serde_json::to_writer_pretty(std::io::stdout().lock(), &job)?,
        None => println!("{} needs no data-server job", product),
    }

    Ok(())
}
