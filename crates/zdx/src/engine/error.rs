//! 🏷️ Typed engine errors — so the retry loop knows who to let back in.
//!
//! Three ways a conversation with the cluster goes wrong, and they are NOT
//! interchangeable:
//! - the network ate the request, repeatedly → [`EngineError::RetriesExhausted`]
//! - the cluster answered with a well-formed "no" → [`EngineError::Application`]
//! - the cluster answered with modern art → [`EngineError::UnexpectedReply`]
//!
//! Only the first kind is ever retried, and by the time you see it, it
//! already was.

use serde_json::Value;
use thiserror::Error;

/// 🏷️ Everything the engine seam can throw at a caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// 🔁 Transient failures outlasted the retry budget. The `reason` is the
    /// last thing the network said before we stopped asking.
    #[error("request to {url} kept failing after {attempts} attempt(s): {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// 🚫 The cluster replied with an error payload. Well-formed, deliberate,
    /// and final — retrying this would just be arguing.
    #[error("engine error reply ({status}) from {url}: {body}")]
    Application { url: String, status: u16, body: Value },

    /// 🎨 The reply parsed, but matched no success shape we recognize.
    /// Neither a yes nor a no. The worst kind of answer.
    #[error("unrecognized engine reply from {url}: {body}")]
    UnexpectedReply { url: String, body: Value },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
