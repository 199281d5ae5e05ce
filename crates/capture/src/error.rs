use thiserror::Error;

/// Failure modes surfaced by a [`crate::CaptureDriver`] on a single `next()`
/// call. `Timeout` is not an error at all — it is the normal "no packet
/// arrived within the configured interval" outcome — and is folded into
/// [`crate::NextOutcome`] instead of this enum.
#[derive(Debug, Error, Clone)]
pub enum CaptureError {
    /// The driver returned a soft, retryable error (a single malformed
    /// read, a transient `EAGAIN`-class condition). The read stage logs
    /// and continues.
    #[error("transient capture error on {interface}: {message}")]
    Transient { interface: String, message: String },
    /// The device was closed or access was revoked. The read stage
    /// terminates this interface's pipeline; other interfaces are
    /// unaffected.
    #[error("fatal capture error on {interface}: {message}")]
    Fatal { interface: String, message: String },
}

impl CaptureError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Fatal { .. })
    }
}
