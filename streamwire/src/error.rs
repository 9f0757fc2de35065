use tokio::task::JoinError;

/// Crate-level error.
///
/// Protocol-level failures (malformed frame, handshake mismatch, timeout, ...) are not
/// represented here: they terminate the instance with an [`ExitReason`](crate::ExitReason) that
/// the owner observes through [`TransportHandle::join`](crate::TransportHandle::join) or the
/// metadata registry, never as a `Result` returned mid-flight. `Error` covers the handful of
/// ways interacting with the *handle itself* can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport task panicked or was aborted before it could report an exit reason.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// The instance terminated before replying to a `command` call.
    #[error("transport instance terminated before replying")]
    Terminated,
}
