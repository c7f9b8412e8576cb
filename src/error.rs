use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while staging a runtime bundle onto disk.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("request for {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} returned status code {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to read archive")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry has an unsafe path: {name}")]
    UnsafeArchivePath { name: String },

    #[error("all archive retrievers failed: [{}]", causes(.0))]
    RetrieversExhausted(Vec<ProvisionError>),

    #[error("finalizer failed: {0}")]
    Finalize(String),

    #[error("failed to encode deployment status")]
    Status(#[from] toml::ser::Error),
}

fn causes(errors: &[ProvisionError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the lifecycle controller.
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("provisioning failed")]
    Provision(#[from] ProvisionError),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("failed to launch {}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for the shell to connect")]
    ConnectTimeout,

    #[error("shutdown before the shell connected")]
    StartupAborted,

    #[error("shell is not connected")]
    NotConnected,

    #[error("failed to encode event")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TetherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_error_lists_every_cause() {
        let err = ProvisionError::RetrieversExhausted(vec![
            ProvisionError::HttpStatus {
                url: "http://a".into(),
                status: 404,
            },
            ProvisionError::Finalize("boom".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("status code 404"));
        assert!(msg.contains("boom"));
    }
}
