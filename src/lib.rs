//! INTEGRAL/OSA data-server plugin
//!
//! This library crate turns product queries (images, spectra and light curves
//! of the ISGRI and JEM-X instruments) into jobs for the OSA data server,
//! submits them, and reports the outcome back to the hosting dispatcher as a
//! [`output::QueryOutput`].
//!
//! The pieces, bottom up: [`version`] parses and validates OSA version
//! strings, [`assume`] and [`jobspec`] build the target/modules/assume triple
//! the data server evaluates, [`matrix`] knows which modules each OSA release
//! needs, and [`dispatcher`] talks to the server. [`Services`] ties them
//! together for one deployment.
//!
//! Everything is synchronous. The data server itself and the knowledge
//! service that lists development builds are reached through traits
//! ([`dispatcher::DataServer`], [`knowledge::KnowledgeBase`]), so the
//! transport is up to the embedding application.

use std::{path::PathBuf, time::Duration};

use serde_json::Value;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

pub mod assume;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod instrument;
pub mod jobspec;
pub mod knowledge;
pub mod matrix;
pub mod output;
pub mod params;
pub mod products;
pub mod query;
pub mod version;

use config::{ConfigSources, ConnectionConfig};
use dispatcher::{BackendScwListResolver, DataServer, OsaDispatcher};
use error::{OsaError, Result};
use jobspec::{JobSpecification, PreparedJob};
use knowledge::VersionRegistry;
use matrix::ModuleMatrix;
use output::{JobStatus, QueryOutput};
use params::InstrumentParams;
use products::{default_prefix, process_products, Product};
use query::{ProductQuery, ProductRegistry};
use version::{VersionIdentifier, VersionPolicy};

/// How one product request should be run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub callback: Option<String>,
    pub run_asynch: bool,
    /// Serve canned products from the configured dummy cache instead of
    /// contacting the data server.
    pub dry_run: bool,
    pub max_trial: usize,
    pub probe_sleep: Duration,
    pub prefix: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            callback: None,
            run_asynch: true,
            dry_run: false,
            max_trial: 120,
            probe_sleep: Duration::from_secs(1),
            prefix: None,
        }
    }
}

pub struct Services {
    policy: VersionPolicy,
    matrix: ModuleMatrix,
    versions: Box<dyn VersionRegistry + Send + Sync>,
}

impl Services {
    /// Set up logging and create a state object for the plugin.
    ///
    /// Logging defaults to INFO and can be tuned with `RUST_LOG`.
    pub fn init(versions: Box<dyn VersionRegistry + Send + Sync>) -> Result<Self> {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false) // don't print the module name
            .without_time() // the host stamps its own log lines
            .finish();

        // Only the first caller gets to install the global logger.
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            if let Err(e) = tracing_log::LogTracer::init() {
                warn!("`log` records will not be forwarded: {}", e);
            }
        }

        Self::new(versions)
    }

    /// Create a state object without touching the global logger.
    pub fn new(versions: Box<dyn VersionRegistry + Send + Sync>) -> Result<Self> {
        Ok(Services {
            policy: VersionPolicy::default(),
            matrix: ModuleMatrix::standard()?,
            versions,
        })
    }

    /// Parse and validate a user-supplied OSA version.
    pub fn version(&self, raw: &str) -> Result<VersionIdentifier> {
        let version = VersionIdentifier::parse_default(raw)?;
        self.policy.validate(&version, self.versions.as_ref())?;
        Ok(version)
    }

    fn prepare(
        &self,
        product: &str,
        payload: Value,
    ) -> Result<(&'static dyn ProductQuery, InstrumentParams, VersionIdentifier)> {
        let query = ProductRegistry::standard().get(product)?;
        let params = InstrumentParams::from_value(payload)?;
        let version = self.version(&params.osa_version)?;
        Ok((query, params, version))
    }

    /// Build the data-server job for `product` from host parameters.
    ///
    /// Returns `None` for queries that need no backend job.
    pub fn job_spec(&self, product: &str, payload: Value) -> Result<Option<JobSpecification>> {
        let (query, params, version) = self.prepare(product, payload)?;
        Ok(query
            .build_job_spec(&self.matrix, &params, &version)?
            .map(|p| p.job))
    }

    /// Run one product request from start to finish.
    ///
    /// Validation failures are returned before any connection is made.
    /// Backend failures are recorded on `out` and returned as errors. On
    /// success `out` carries the product listing; an empty product list with
    /// a `submitted` status means the job completes asynchronously.
    pub fn dispatch<S, F>(
        &self,
        product: &str,
        payload: Value,
        sources: &ConfigSources,
        connect: F,
        opts: &RunOptions,
        out: &mut QueryOutput,
    ) -> Result<Vec<Product>>
    where
        S: DataServer,
        F: FnOnce(&ConnectionConfig) -> S,
    {
        let (query, params, version) = self.prepare(product, payload)?;

        let Some(PreparedJob { job, scw }) =
            query.build_job_spec(&self.matrix, &params, &version)?
        else {
            info!("{} is handled by the host", product);
            out.set_done(JobStatus::Done, "", "");
            return Ok(Vec::new());
        };

        let disp = OsaDispatcher::new(sources, job, connect)?;

        if opts.dry_run {
            let dummy_cache: PathBuf = disp.config().dummy_cache.clone().ok_or_else(|| {
                OsaError::ConfigProblem("dry run requested but no dummy_cache set".to_owned())
            })?;

            let products = query.build_dummy_products(&dummy_cache)?;
            out.set_done(JobStatus::Done, "", "");
            out.merge_products(process_products(query.kind(), &products));
            return Ok(products);
        }

        disp.test_communication(opts.max_trial, opts.probe_sleep, out)?;

        let resolver = BackendScwListResolver::new(disp.server());
        disp.test_has_input_products(params.scw_list.as_deref(), &scw, &resolver, out)?;

        let Some(res) = disp.run_query(opts.callback.as_deref(), opts.run_asynch, None, out)?
        else {
            return Ok(Vec::new());
        };

        let prefix = opts
            .prefix
            .as_deref()
            .or_else(|| default_prefix(query.kind()));
        let products = query.build_products(&res, prefix)?;
        out.merge_products(process_products(query.kind(), &products));
        Ok(products)
    }
}
