//! The outcome record handed back to the host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Nothing recorded yet.
    #[default]
    Unknown,
    Done,
    /// Accepted by the data server for asynchronous completion.
    Submitted,
    Failed,
}

/// What happened to one call, in the shape the host reports to users.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub job_status: JobStatus,
    /// 0 on success, 1 on failure.
    pub status: i32,
    pub message: String,
    pub debug_message: String,
    pub comment: String,
    pub warning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub prod_dictionary: Map<String, Value>,
}

impl QueryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_done(&mut self, job_status: JobStatus, message: &str, debug_message: &str) {
        self.job_status = job_status;
        self.status = 0;
        self.message = message.to_owned();
        self.debug_message = debug_message.to_owned();
        self.failed_operation = None;
        self.error_message = None;
    }

    pub fn set_comments(&mut self, comment: &str, warning: &str) {
        self.comment = comment.to_owned();
        self.warning = warning.to_owned();
    }

    /// Record a failure of `operation`. `message` is what users see,
    /// `e_message` is the short error name, `debug_message` the details.
    pub fn set_failed(&mut self, operation: &str, message: &str, e_message: &str, debug_message: &str) {
        warn!(
            operation,
            "{}: {} ({})",
            message,
            e_message,
            debug_message
        );

        self.job_status = JobStatus::Failed;
        self.status = 1;
        self.message = message.to_owned();
        self.debug_message = debug_message.to_owned();
        self.failed_operation = Some(operation.to_owned());
        self.error_message = Some(e_message.to_owned());
    }

    /// Fold product listings into this output.
    pub fn merge_products(&mut self, other: QueryOutput) {
        info!("{} product entries", other.prod_dictionary.len());
        self.prod_dictionary.extend(other.prod_dictionary);
    }
}
