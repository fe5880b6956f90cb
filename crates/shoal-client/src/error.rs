//! Client errors and the retry classifier.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("event stream ended before a decisive event")]
    StreamEnded,

    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    #[error("unlock rejected: {0}")]
    UnlockRejected(String),
}

/// Whether an error is worth another attempt. Only transport-level failures
/// qualify: timeouts, refused or reset connections, EOF mid-response. A
/// refusal or an unexpected status is a server decision and retrying would
/// not change it.
pub(crate) fn is_retryable(error: &ClientError) -> bool {
    let ClientError::Transport(e) = error else {
        return false;
    };
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    // reqwest wraps hyper/io errors whose kinds are not exposed; fall back
    // to the same substrings the wire protocol has always considered
    // transient.
    let text = format!("{e:?}").to_ascii_lowercase();
    ["timeout", "connection", "network", "eof", "refused"]
        .iter()
        .any(|needle| text.contains(needle))
}
