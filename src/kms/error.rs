//! KMS error types
//!
//! Every variant names the operation and its target (device path,
//! connector id or CRTC id) and carries the OS error when there is one.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmsError {
    #[error("cannot open DRM device {}: {source}", path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("failed to query {what} on {}: {source}", path.display())]
    ResourceQueryFailed {
        path: PathBuf,
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("connector {0} not found")]
    ConnectorNotFound(u32),

    #[error("connector {connector} is not connected (state: {state})")]
    ConnectorNotConnected { connector: u32, state: &'static str },

    #[error("mode {mode} not available on connector {connector}")]
    ModeNotAvailable { connector: u32, mode: String },

    #[error("no CRTC available for connector {0}")]
    NoCrtcAvailable(u32),

    #[error("failed to set mode {mode} on CRTC {crtc} / connector {connector}: {source}")]
    CommitFailed {
        crtc: u32,
        connector: u32,
        mode: String,
        #[source]
        source: io::Error,
    },
}

pub type KmsResult<T> = Result<T, KmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_failed_names_targets_and_os_error() {
        let err = KmsError::CommitFailed {
            crtc: 41,
            connector: 5,
            mode: "1920x1080".to_string(),
            // EINVAL
            source: io::Error::from_raw_os_error(22),
        };
        let msg = err.to_string();
        assert!(msg.contains("CRTC 41"));
        assert!(msg.contains("connector 5"));
        assert!(msg.contains("1920x1080"));
        assert!(msg.contains("Invalid argument"));
    }

    #[test]
    fn test_open_failed_names_path() {
        let err = KmsError::DeviceOpenFailed {
            path: PathBuf::from("/dev/dri/card9"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/dev/dri/card9"));
    }
}
