use crate::DagError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults applied to compile requests that leave a setting unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DagContext {
    /// Seconds to wait for a submitted execution before timing out. A
    /// negative value (conventionally `-1`) waits forever.
    pub submit_timeout: f64,
    pub buffer_size_bytes: usize,
    pub max_inflight_executions: usize,
    pub max_buffered_results: usize,
    pub overlap_gpu_communication: bool,
}

impl Default for DagContext {
    fn default() -> Self {
        Self {
            submit_timeout: 10.0,
            buffer_size_bytes: 1_000_000,
            max_inflight_executions: 10,
            max_buffered_results: 1000,
            overlap_gpu_communication: false,
        }
    }
}

const ENV_PREFIX: &str = "TASK_DAG_";

impl DagContext {
    /// `None` when submissions never time out.
    pub fn submit_timeout(&self) -> Result<Option<Duration>, DagError> {
        timeout_from_secs(self.submit_timeout)
    }

    pub fn from_json(json: &str) -> Result<Self, DagError> {
        let ctx: Self = serde_json::from_str(json).map_err(|e| DagError::Config(e.to_string()))?;
        ctx.submit_timeout()?;
        Ok(ctx)
    }

    /// Defaults overridden by `TASK_DAG_*` environment variables.
    pub fn from_env() -> Result<Self, DagError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DagError> {
        let mut ctx = Self::default();
        if let Some(v) = lookup(&format!("{ENV_PREFIX}SUBMIT_TIMEOUT")) {
            ctx.submit_timeout = parse_setting("SUBMIT_TIMEOUT", &v)?;
            ctx.submit_timeout()?;
        }
        if let Some(v) = lookup(&format!("{ENV_PREFIX}BUFFER_SIZE_BYTES")) {
            ctx.buffer_size_bytes = parse_setting("BUFFER_SIZE_BYTES", &v)?;
        }
        if let Some(v) = lookup(&format!("{ENV_PREFIX}MAX_INFLIGHT_EXECUTIONS")) {
            ctx.max_inflight_executions = parse_setting("MAX_INFLIGHT_EXECUTIONS", &v)?;
        }
        if let Some(v) = lookup(&format!("{ENV_PREFIX}MAX_BUFFERED_RESULTS")) {
            ctx.max_buffered_results = parse_setting("MAX_BUFFERED_RESULTS", &v)?;
        }
        if let Some(v) = lookup(&format!("{ENV_PREFIX}OVERLAP_GPU_COMMUNICATION")) {
            ctx.overlap_gpu_communication = parse_setting("OVERLAP_GPU_COMMUNICATION", &v)?;
        }
        Ok(ctx)
    }
}

/// Negative seconds mean no timeout; NaN and values too large for a
/// `Duration` are rejected.
pub(crate) fn timeout_from_secs(secs: f64) -> Result<Option<Duration>, DagError> {
    if secs < 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| DagError::Config(format!("invalid submit timeout {secs}: {e}")))
}

fn parse_setting<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DagError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DagError::Config(format!("{ENV_PREFIX}{name}={value}: {e}")))
}
