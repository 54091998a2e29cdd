//! Talking to the data server.
//!
//! One `OsaDispatcher` serves one request. It owns a data-server client, the
//! job to submit, and mirrors every backend failure onto the caller's
//! `QueryOutput` before returning it as a typed error.

use std::{fmt, thread, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    assume::ScwAssumption,
    config::{ConfigSources, ConnectionConfig},
    error::{OsaError, Result},
    jobspec::{scw_report_job, JobSpecification},
    output::{JobStatus, QueryOutput},
    products::ResultHandle,
};

/// One submission to the data server.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct JobRequest {
    pub target: String,
    pub modules: Vec<String>,
    pub assume: Vec<String>,
    pub inject: Vec<Value>,
    /// Ask the server to run the job asynchronously.
    pub prompt_delegate: bool,
    pub callback: Option<String>,
}

impl JobRequest {
    pub fn new(job: &JobSpecification, run_asynch: bool, callback: Option<&str>) -> Self {
        JobRequest {
            target: job.target.clone(),
            modules: job.modules.clone(),
            assume: job.assume.clone(),
            inject: job.inject.clone(),
            prompt_delegate: run_asynch,
            callback: callback.map(str::to_owned),
        }
    }
}

/// What a failing data-server call carries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendPayload {
    /// The raw response body, if any.
    pub content: Option<String>,
    pub exceptions: Vec<Value>,
}

impl BackendPayload {
    /// `result.status` of a JSON response body, or empty.
    pub fn status(&self) -> String {
        self.content
            .as_deref()
            .and_then(|c| serde_json::from_str::<Value>(c).ok())
            .and_then(|v| {
                v.get("result")
                    .and_then(|r| r.get("status"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_default()
    }

    /// The message of the first reported exception.
    ///
    /// Prefers its `exception` field; falls back to the whole record as JSON.
    pub fn exception_message(&self) -> String {
        let Some(first) = self.exceptions.first() else {
            return String::new();
        };

        let structured = match first {
            Value::Object(m) => m.get("exception").cloned(),
            Value::String(s) => serde_json::from_str::<Value>(s)
                .ok()
                .and_then(|v| v.get("exception").cloned()),
            _ => None,
        };

        match structured {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => match first {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            },
        }
    }
}

/// Failure modes of a data-server call.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendError {
    /// The analysis itself failed.
    Analysis(BackendPayload),
    /// A worker failed or the server is overloaded.
    Worker(BackendPayload),
    /// The job was accepted and will complete asynchronously.
    Delegated,
    /// Anything else, including transport failures.
    Other {
        description: String,
        content: Option<String>,
    },
}

impl BackendError {
    fn status(&self) -> String {
        match self {
            BackendError::Analysis(p) | BackendError::Worker(p) => p.status(),
            BackendError::Other { content, .. } => BackendPayload {
                content: content.clone(),
                exceptions: Vec::new(),
            }
            .status(),
            BackendError::Delegated => String::new(),
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, BackendError::Worker(_)) || self.status() == "busy"
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendError::Analysis(p) => write!(f, "AnalysisException: {}", p.exception_message()),
            BackendError::Worker(p) => write!(f, "WorkerException: {}", p.exception_message()),
            BackendError::Delegated => write!(f, "AnalysisDelegatedException"),
            BackendError::Other { description, .. } => write!(f, "{}", description),
        }
    }
}

/// The data-server client.
pub trait DataServer {
    fn query(&self, request: &JobRequest) -> std::result::Result<ResultHandle, BackendError>;

    /// Cheap liveness probe.
    fn poke(&self) -> std::result::Result<(), BackendError>;
}

/// Finds the science windows a range-query selection resolves to.
pub trait ScwListResolver {
    fn resolve(&self, scw: &ScwAssumption) -> std::result::Result<Vec<String>, BackendError>;
}

/// Resolves science-window lists through a data server.
pub struct BackendScwListResolver<'a, S> {
    server: &'a S,
}

impl<'a, S: DataServer> BackendScwListResolver<'a, S> {
    pub fn new(server: &'a S) -> Self {
        BackendScwListResolver { server }
    }
}

impl<S: DataServer> ScwListResolver for BackendScwListResolver<'_, S> {
    fn resolve(&self, scw: &ScwAssumption) -> std::result::Result<Vec<String>, BackendError> {
        let request = JobRequest::new(&scw_report_job(scw), false, None);
        let res = self.server.query(&request)?;

        Ok(res
            .attribute("scwidlist")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub struct OsaDispatcher<S> {
    config: ConnectionConfig,
    server: S,
    job: JobSpecification,
}

impl<S: DataServer> OsaDispatcher<S> {
    /// Resolve the connection settings and open a client with `connect`.
    pub fn new<F>(sources: &ConfigSources, job: JobSpecification, connect: F) -> Result<Self>
    where
        F: FnOnce(&ConnectionConfig) -> S,
    {
        let config = sources.resolve()?;
        info!(
            "data server {} (cache {})",
            config.data_server_url, config.data_server_cache
        );
        let server = connect(&config);

        Ok(OsaDispatcher {
            config,
            server,
            job,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Probe the data server until it answers.
    ///
    /// Transient failures (worker exceptions, a `busy` status) are retried
    /// `max_trial` times with a fixed `sleep` in between, then probed once
    /// more. Any other failure ends the probing at once.
    pub fn test_communication(
        &self,
        max_trial: usize,
        sleep: Duration,
        out: &mut QueryOutput,
    ) -> Result<()> {
        thread::sleep(sleep);

        let mut status = String::new();

        for trial in 0..=max_trial {
            match self.server.poke() {
                Ok(()) => {
                    info!("data server answered at trial {}", trial);
                    out.set_done(JobStatus::Done, "", "");
                    return Ok(());
                }

                Err(e) if e.is_transient() => {
                    status = e.status();
                    warn!("data server not ready at trial {}: {} ({})", trial, e, status);

                    if trial < max_trial {
                        thread::sleep(sleep);
                    }
                }

                Err(e) => {
                    let status = e.status();
                    let debug_message = match &e {
                        BackendError::Analysis(p) | BackendError::Worker(p) => {
                            p.exception_message()
                        }
                        _ => format!("{:?}", e),
                    };

                    out.set_failed(
                        "test connection",
                        &format!("connection_status={}", status),
                        "Connection Error",
                        &debug_message,
                    );
                    return Err(OsaError::Connectivity { status });
                }
            }
        }

        out.set_failed(
            "test busy",
            &format!("connection_status={}", status),
            "data server busy",
            "data server busy",
        );
        Err(OsaError::Connectivity { status })
    }

    /// Check that the selection covers at least one science window.
    ///
    /// Returns the science windows; an explicit list is returned as is.
    pub fn test_has_input_products(
        &self,
        scw_list: Option<&[String]>,
        scw: &ScwAssumption,
        resolver: &dyn ScwListResolver,
        out: &mut QueryOutput,
    ) -> Result<Vec<String>> {
        if let Some(ids) = scw_list.filter(|l| !l.is_empty()) {
            out.set_done(JobStatus::Done, "", "");
            return Ok(ids.to_vec());
        }

        let operation = "test has input prods";

        match resolver.resolve(scw) {
            Ok(ids) if ids.is_empty() => {
                out.set_failed(operation, "scwlist empty", "scwlist empty", "");
                Err(OsaError::ScwListEmpty)
            }

            Ok(ids) => {
                info!("selection resolved to {} science windows", ids.len());
                out.set_done(JobStatus::Done, "", "");
                Ok(ids)
            }

            Err(e) => Err(record_failure(operation, e, out)),
        }
    }

    /// Submit the job (or `job` in place of it) once.
    ///
    /// `Ok(None)` means the server took the job for asynchronous completion.
    pub fn run_query(
        &self,
        callback: Option<&str>,
        run_asynch: bool,
        job: Option<&JobSpecification>,
        out: &mut QueryOutput,
    ) -> Result<Option<ResultHandle>> {
        let job = job.unwrap_or(&self.job);
        let request = JobRequest::new(job, run_asynch, callback);

        info!(
            "submitting {} (asynch: {}, callback: {:?})",
            request.target, run_asynch, callback
        );
        debug!("job: {}", serde_json::to_string(&request).unwrap_or_default());

        match self.server.query(&request) {
            Ok(res) => {
                info!("cached object in {:?}", res.ddcache_root_local);
                out.set_done(JobStatus::Done, "", "");
                out.set_comments(&res.comment, &res.warning);
                Ok(Some(res))
            }

            Err(BackendError::Delegated) => {
                info!("job delegated");
                out.set_done(JobStatus::Submitted, "", "");
                Ok(None)
            }

            Err(e) => Err(record_failure("run query", e, out)),
        }
    }
}

/// Mirror a backend failure onto `out` and turn it into an error.
fn record_failure(operation: &str, e: BackendError, out: &mut QueryOutput) -> OsaError {
    match e {
        BackendError::Analysis(p) => {
            let mut message = p.exception_message();
            if message.is_empty() {
                message = "AnalysisException".to_owned();
            }
            let debug_message = Value::Array(p.exceptions).to_string();
            out.set_failed(
                operation,
                &format!("run query message={}", message),
                "AnalysisException",
                &debug_message,
            );
            OsaError::Analysis {
                message,
                debug_message,
            }
        }

        BackendError::Worker(p) => {
            let message = "WorkerException".to_owned();
            let debug_message = p.exception_message();
            out.set_failed(
                operation,
                &format!("run query message={}", message),
                &message,
                &debug_message,
            );
            OsaError::Worker {
                message,
                debug_message,
            }
        }

        other => {
            let message = format!("DDOSAUnknownException in {}", operation);
            let debug_message = format!("{:?}", other);
            out.set_failed(
                operation,
                &format!("run query message={}", message),
                &message,
                &debug_message,
            );
            OsaError::Unknown {
                message,
                debug_message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_status() {
        let p = BackendPayload {
            content: Some(r#"{"result": {"status": "busy"}}"#.to_owned()),
            exceptions: Vec::new(),
        };
        assert_eq!(p.status(), "busy");

        let p = BackendPayload {
            content: Some("<html>".to_owned()),
            exceptions: Vec::new(),
        };
        assert_eq!(p.status(), "");
    }

    #[test]
    fn payload_exception_message() {
        let p = BackendPayload {
            content: None,
            exceptions: vec![json!({"node": "ii_skyimage", "exception": "no data"})],
        };
        assert_eq!(p.exception_message(), "no data");

        let p = BackendPayload {
            content: None,
            exceptions: vec![json!("plain text")],
        };
        assert_eq!(p.exception_message(), "plain text");

        let p = BackendPayload {
            content: None,
            exceptions: vec![json!(r#"{"exception": "nested"}"#)],
        };
        assert_eq!(p.exception_message(), "nested");

        assert_eq!(BackendPayload::default().exception_message(), "");
    }

    #[test]
    fn transient_classification() {
        assert!(BackendError::Worker(BackendPayload::default()).is_transient());
        assert!(BackendError::Other {
            description: "503".to_owned(),
            content: Some(r#"{"result": {"status": "busy"}}"#.to_owned()),
        }
        .is_transient());
        assert!(!BackendError::Analysis(BackendPayload::default()).is_transient());
    }
}
