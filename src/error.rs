use std::fmt::Display;

use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    BsonSer(#[from] mongodb::bson::ser::Error),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Wallet has already voted in this election")]
    AlreadyVoted,
    #[error("Wallet address is already registered")]
    AlreadyRegistered,
    #[error("Election is not accepting votes: {0}")]
    ElectionNotActive(String),
    #[error("Candidate not found")]
    CandidateNotFound,
    #[error("Candidate is not eligible to receive votes")]
    CandidateNotEligible,
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("Ledger submission failed: {0}")]
    LedgerSubmissionFailed(#[from] LedgerError),
    #[error("Vote confirmed on the ledger but already recorded locally; reconciliation required")]
    DuplicateVoteDetectedPostLedger,
    #[error("Too many requests")]
    RateLimited,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn unauthorized(why: impl Display) -> Self {
        Self::Unauthorized(why.to_string())
    }

    /// The stable, machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Db(_) | Self::Jwt(_) | Self::BsonSer(_) | Self::Internal(_) => "INTERNAL",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::ElectionNotActive(_) => "ELECTION_NOT_ACTIVE",
            Self::CandidateNotFound => "CANDIDATE_NOT_FOUND",
            Self::CandidateNotEligible => "CANDIDATE_NOT_ELIGIBLE",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::LedgerSubmissionFailed(_) => "LEDGER_SUBMISSION_FAILED",
            Self::DuplicateVoteDetectedPostLedger => "DUPLICATE_VOTE_DETECTED_POST_LEDGER",
            Self::RateLimited => "RATE_LIMITED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Jwt(_) | Self::BsonSer(_) | Self::Internal(_) => {
                Status::InternalServerError
            }
            Self::InvalidSignature(_) | Self::Unauthorized(_) => Status::Unauthorized,
            Self::AlreadyVoted | Self::AlreadyRegistered => Status::Conflict,
            Self::ElectionNotActive(_)
            | Self::CandidateNotEligible
            | Self::InvalidTransition(_)
            | Self::BadRequest(_) => Status::BadRequest,
            Self::CandidateNotFound | Self::NotFound(_) => Status::NotFound,
            Self::LedgerSubmissionFailed(_) => Status::BadGateway,
            Self::DuplicateVoteDetectedPostLedger => Status::InternalServerError,
            Self::RateLimited => Status::TooManyRequests,
        }
    }

    /// The message shown to clients. Internal details never cross the
    /// service boundary.
    fn public_message(&self) -> String {
        match self {
            Self::Db(_) | Self::Jwt(_) | Self::BsonSer(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::LedgerSubmissionFailed(_) => {
                "Ledger submission failed; no vote was recorded and the request may be retried"
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// The JSON body attached to every error response.
#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 || matches!(self, Self::LedgerSubmissionFailed(_)) {
            error!("{self}");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.public_message(),
        };
        let mut response = Json(body).respond_to(req)?;
        response.set_status(status);
        Ok(response)
    }
}
