// ⚠️ Error taxonomy
//
// Every failure is caught at the boundary of the component that issued the
// call and turned into local state. Unmapped users are not errors at all.

use thiserror::Error;

/// Reference CSV or user list could not be loaded at all
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("data source {path} unavailable: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required column `{0}`")]
    MissingColumn(String),

    #[error("malformed tabular data: {0}")]
    Parse(#[from] csv::Error),

    #[error("user listing failed: {0}")]
    Users(String),
}

/// Rendering surface failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("map surface failed to initialize: {0}")]
    Init(String),

    #[error("map surface has been released")]
    Released,

    #[error("unknown source `{0}`")]
    UnknownSource(String),

    #[error("source `{0}` still has layers attached")]
    SourceInUse(String),

    #[error("duplicate id `{0}`")]
    Duplicate(String),
}

/// Profile save or lookup failed
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("profile could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("missing identity id")]
    MissingIdentity,

    /// Merged document no longer fits the profile shape
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

#[cfg(feature = "server")]
pub use http::AppError;

#[cfg(feature = "server")]
mod http {
    use super::PersistenceError;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use thiserror::Error;
    use tracing::error;

    /// Errors surfaced by the HTTP collaborators
    #[derive(Error, Debug)]
    pub enum AppError {
        #[error("Missing {0}")]
        MissingParameter(&'static str),

        #[error("{0} not found")]
        NotFound(&'static str),

        #[error("Not allowed to access another user's profile")]
        Forbidden,

        #[error("Invalid email: {0}")]
        InvalidEmail(String),

        #[error("Invalid request body: {0}")]
        InvalidBody(String),

        #[error("Database error")]
        Persistence(#[from] PersistenceError),

        #[error("Internal server error")]
        Internal(String),
    }

    impl AppError {
        pub fn status(&self) -> StatusCode {
            match self {
                AppError::MissingParameter(_) | AppError::InvalidEmail(_) | AppError::InvalidBody(_) => {
                    StatusCode::BAD_REQUEST
                }
                AppError::NotFound(_) => StatusCode::NOT_FOUND,
                AppError::Forbidden => StatusCode::FORBIDDEN,
                AppError::Persistence(_) | AppError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                error!(error = ?self, "request failed");
            }

            let body = serde_json::json!({
                "success": false,
                "message": self.to_string(),
            });

            (status, Json(body)).into_response()
        }
    }
}
