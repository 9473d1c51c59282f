//! Errors shared by the coordinator service and its workers.
//!
//! `From<Error> for tonic::Status` lets handlers propagate with `?` and gives
//! workers a status code they can act on: `UNAVAILABLE` once a run has
//! ended, `NOT_FOUND` when they must reconnect.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The grammar or a structure is inconsistent.
    #[error("Grammar error: {0}")]
    Grammar(#[from] pcfg::Error),

    /// A wire message could not be converted.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The transport did not report the caller's address.
    #[error("Peer address unavailable")]
    MissingPeer,

    /// The caller never connected, or already disconnected.
    #[error("Unknown worker {peer}")]
    UnknownWorker { peer: String },

    /// Every target was recovered and the run is over.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Grammar(e) => Status::internal(format!("Grammar error: {e}")),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::MissingPeer => Status::failed_precondition("Peer address unavailable"),
            Error::UnknownWorker { peer } => {
                Status::not_found(format!("Worker {peer} is not connected"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn maps_to_actionable_status_codes() {
        assert_eq!(Status::from(Error::ServiceShutdown).code(), Code::Unavailable);
        assert_eq!(Status::from(Error::invalid("bad")).code(), Code::InvalidArgument);
        assert_eq!(Status::from(Error::MissingPeer).code(), Code::FailedPrecondition);
        assert_eq!(
            Status::from(Error::UnknownWorker {
                peer: "10.0.0.1:4000".into()
            })
            .code(),
            Code::NotFound
        );
        assert_eq!(
            Status::from(Error::Grammar(pcfg::Error::MissingStart)).code(),
            Code::Internal
        );
    }
}
