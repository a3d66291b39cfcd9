use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The actor run ended in FAILED, ABORTED or TIMED-OUT.
    #[error("Run {run_id} finished with status {status}")]
    RunFailed { run_id: String, status: String },
}

impl ApifyError {
    /// True when the run was stopped on purpose (see `ApifyClient::abort_run`).
    pub fn is_aborted(&self) -> bool {
        matches!(self, ApifyError::RunFailed { status, .. } if status == "ABORTED")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_aborted_runs_count_as_aborted() {
        let failed = |status: &str| ApifyError::RunFailed {
            run_id: "r1".to_string(),
            status: status.to_string(),
        };
        assert!(failed("ABORTED").is_aborted());
        assert!(!failed("FAILED").is_aborted());
        assert!(!ApifyError::Api { status: 500, message: String::new() }.is_aborted());
    }
}
