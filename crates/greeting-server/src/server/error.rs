//! Error types for the server lifecycle.
//!
//! Only failures that end the whole process live here. Errors scoped to a
//! single call are returned to the caller as a [`tonic::Status`] by the
//! service that produced them and never reach this type.
//!
//! ## Error Cases
//! - `Bind`: the listener could not be created (port in use, permission
//!   denied, invalid address). Fatal and never retried.
//! - `Serve`: the transport failed after a successful bind.
//! - `ServeTask`: the background serving task panicked or was cancelled.
//! - `Forced`: a second termination signal cut the graceful stop short.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the server runner.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The TCP listener could not be created.
    #[error("could not create tcp listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The gRPC transport failed while serving.
    #[error("gRPC server failed: {0}")]
    Serve(#[from] tonic::transport::Error),

    /// The serving task did not run to completion.
    #[error("gRPC server task aborted: {0}")]
    ServeTask(#[from] tokio::task::JoinError),

    /// The graceful stop was abandoned before in-flight calls finished.
    #[error("graceful shutdown forced by a second signal")]
    Forced,
}
