//! Shared JSON output schema for the `golem` CLI.
//!
//! All stdout output is JSON only, one object per invocation. Tracing logs
//! go to stderr. Schema version is fixed at "1".

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1";

fn print_json_to_stdout(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).expect("JSON serialization failed")
    );
}

/// Top-level envelope used for every successful response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response<T: Serialize> {
    pub schema_version: &'static str,
    pub ok: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Response<T> {
    pub fn new(kind: &'static str, data: T) -> Self {
        Response {
            schema_version: SCHEMA_VERSION,
            ok: true,
            kind,
            data,
        }
    }

    pub fn print(&self) {
        print_json_to_stdout(self);
    }
}

/// Top-level envelope for error responses, mirroring `GolemError`'s category.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub schema_version: &'static str,
    pub ok: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub category: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorResponse {
            schema_version: SCHEMA_VERSION,
            ok: false,
            kind: "error",
            error: ErrorDetail {
                category: category.into(),
                message: message.into(),
            },
        }
    }

    pub fn print(&self) {
        print_json_to_stdout(self);
    }
}

/// Full view of a job's on-disk record, used by `session` (sync), `status`,
/// and as the element type of `list` and `chain`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub project_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Response for `session --async`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionAsyncData {
    pub job_id: String,
    pub status: String,
}

/// One job's summary line within a `list` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub project_id: String,
    /// `unknown` when the job directory has no `status` file yet, per the
    /// documented split between the listing command and the state-machine
    /// reader's own `failed` fallback.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListData {
    pub root: String,
    pub jobs: Vec<JobSummary>,
    pub truncated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultData {
    pub job_id: String,
    pub status: String,
    pub stdout: String,
    pub changelog: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogData {
    pub job_id: String,
    pub stream: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TailData {
    pub job_id: String,
    pub status: String,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanData {
    pub removed: Vec<String>,
    pub scanned: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KillData {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainData {
    pub steps: Vec<JobRecord>,
    pub aborted: bool,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CostData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub jobs_counted: u64,
    pub missing_usage: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorData {
    pub claude_on_path: bool,
    pub root_writable: bool,
    pub slot_counter: u64,
    pub observed_running: u64,
    pub consistent: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigShowData {
    pub model: String,
    pub opus_model: String,
    pub sonnet_model: String,
    pub haiku_model: String,
    pub permission_mode: String,
    pub max_parallel: u64,
    pub zai_base_url: String,
    pub zai_api_timeout_ms: String,
    pub debug: bool,
    pub zai_api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigGetData {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigSetData {
    pub key: String,
    pub value: String,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigInstallData {
    pub path: String,
    pub claude_on_path: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigUninstallData {
    pub removed: Vec<String>,
}
