use std::collections::BTreeMap;
use std::{error, fmt, io};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::net::request_id::current_request_id;

pub type Result<T, E = Error> = anyhow::Result<T, E>;

/// Error taxonomy of the API surface. Each kind maps to one HTTP status
/// and one wire `code`.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    LoaderRequired,
    Gone,
    TooManyRequests,
    BadGateway,
    Internal,
    Canceled,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::LoaderRequired => StatusCode::CONFLICT,
            ErrorKind::Gone => StatusCode::GONE,
            ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
            // Canceled jobs never reach the wire as errors; treat as internal
            // if one ever does.
            ErrorKind::Internal | ErrorKind::Canceled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::LoaderRequired => "loader_required",
            ErrorKind::Gone => "gone",
            ErrorKind::TooManyRequests => "too_many_requests",
            ErrorKind::BadGateway => "bad_gateway",
            ErrorKind::Internal => "internal",
            ErrorKind::Canceled => "canceled",
        }
    }
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    WithFieldDetails(ErrorKind, &'static str, BTreeMap<String, String>),
    IoError(io::Error),
    DbError(diesel::result::Error),
    PoolError(r2d2::Error),
    HttpError(reqwest::Error),
    AnyhowError(anyhow::Error),
}

pub struct Error {
    repr: ErrorRepr,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _)
            | ErrorRepr::WithFieldDetails(kind, _, _) => *kind,
            ErrorRepr::DbError(diesel::result::Error::NotFound) => ErrorKind::NotFound,
            ErrorRepr::IoError(_)
            | ErrorRepr::DbError(_)
            | ErrorRepr::PoolError(_)
            | ErrorRepr::AnyhowError(_) => ErrorKind::Internal,
            ErrorRepr::HttpError(_) => ErrorKind::BadGateway,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }

    pub fn details(&self) -> Option<&BTreeMap<String, String>> {
        match &self.repr {
            ErrorRepr::WithFieldDetails(_, _, details) => Some(details),
            _ => None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Error {
        (ErrorKind::BadRequest, "validation failed", detail.into()).into()
    }

    pub fn validation(details: BTreeMap<String, String>) -> Error {
        Error {
            repr: ErrorRepr::WithFieldDetails(ErrorKind::BadRequest, "validation failed", details),
        }
    }

    pub fn unauthorized(desc: &'static str) -> Error {
        (ErrorKind::Unauthorized, desc).into()
    }

    pub fn forbidden(desc: &'static str) -> Error {
        (ErrorKind::Forbidden, desc).into()
    }

    pub fn not_found(detail: impl Into<String>) -> Error {
        (ErrorKind::NotFound, "not found", detail.into()).into()
    }

    pub fn conflict(detail: impl Into<String>) -> Error {
        (ErrorKind::Conflict, "conflict", detail.into()).into()
    }

    /// The requires-loader gating signal (409, code `loader_required`).
    pub fn loader_required() -> Error {
        (
            ErrorKind::LoaderRequired,
            "set a loader for this instance before managing mods",
        )
            .into()
    }

    pub fn gone(desc: &'static str) -> Error {
        (ErrorKind::Gone, desc).into()
    }

    pub fn too_many_requests(desc: &'static str) -> Error {
        (ErrorKind::TooManyRequests, desc).into()
    }

    pub fn bad_gateway(detail: impl Into<String>) -> Error {
        (ErrorKind::BadGateway, "upstream failure", detail.into()).into()
    }

    pub fn internal(detail: impl Into<String>) -> Error {
        (ErrorKind::Internal, "internal error", detail.into()).into()
    }

    pub fn canceled() -> Error {
        (ErrorKind::Canceled, "canceled").into()
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Error {
        Error {
            repr: ErrorRepr::DbError(err),
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Error {
        Error {
            repr: ErrorRepr::PoolError(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error {
            repr: ErrorRepr::HttpError(err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error {
            repr: ErrorRepr::AnyhowError(err),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Error {
        Error {
            repr: ErrorRepr::AnyhowError(err.into()),
        }
    }
}

impl From<(ErrorKind, &'static str)> for Error {
    fn from((kind, desc): (ErrorKind, &'static str)) -> Error {
        Error {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for Error {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> Error {
        Error {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&dyn error::Error> {
        match self.repr {
            ErrorRepr::IoError(ref err) => Some(err as &dyn error::Error),
            ErrorRepr::DbError(ref err) => Some(err as &dyn error::Error),
            ErrorRepr::HttpError(ref err) => Some(err as &dyn error::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.repr {
            ErrorRepr::WithDescription(_, desc) => desc.fmt(f),
            ErrorRepr::WithDescriptionAndDetail(_, desc, ref detail) => {
                desc.fmt(f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::WithFieldDetails(_, desc, ref details) => {
                desc.fmt(f)?;
                for (field, reason) in details {
                    write!(f, "; {field}: {reason}")?;
                }
                Ok(())
            }
            ErrorRepr::IoError(ref err) => err.fmt(f),
            ErrorRepr::DbError(ref err) => err.fmt(f),
            ErrorRepr::PoolError(ref err) => err.fmt(f),
            ErrorRepr::HttpError(ref err) => err.fmt(f),
            ErrorRepr::AnyhowError(ref err) => err.fmt(f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(rename = "requestId")]
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<BTreeMap<String, String>>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ErrorBody {
            code: kind.code(),
            message: self.to_string(),
            request_id: current_request_id().unwrap_or_default(),
            details: self.details().cloned(),
        };
        (kind.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_status_and_code() {
        assert_eq!(Error::loader_required().kind().status(), StatusCode::CONFLICT);
        assert_eq!(Error::loader_required().kind().code(), "loader_required");
        assert_eq!(Error::not_found("x").kind().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::bad_gateway("upstream").kind().status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn field_details_survive_the_round_trip() {
        let mut details = BTreeMap::new();
        details.insert("name".to_string(), "must not be empty".to_string());
        let err = Error::validation(details);
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(
            err.details().unwrap().get("name").map(String::as_str),
            Some("must not be empty")
        );
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: Error = diesel::result::Error::NotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
