//! Caller credential extraction.
//!
//! Identity is established by the gateway in front of this service and
//! forwarded as two headers: `x-subject-id` (UUID) and `x-subject-role`
//! (`user` or `admin`).

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;
use wayfare_core::identity::{Role, Subject};

use crate::error::ErrorBody;

/// Header carrying the subject id.
pub const SUBJECT_ID_HEADER: &str = "x-subject-id";
/// Header carrying the subject role.
pub const SUBJECT_ROLE_HEADER: &str = "x-subject-role";

/// The authenticated subject making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Subject);

/// Rejection for requests without a usable credential.
#[derive(Debug)]
pub struct MissingCredential(String);

impl IntoResponse for MissingCredential {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: "unauthenticated",
            message: self.0,
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, MissingCredential> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| MissingCredential(format!("missing {name} header")))?
        .to_str()
        .map(str::trim)
        .map_err(|_| MissingCredential(format!("{name} header is not valid text")))
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = MissingCredential;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject_id = Uuid::parse_str(header(parts, SUBJECT_ID_HEADER)?)
            .map_err(|e| MissingCredential(format!("{SUBJECT_ID_HEADER} is not a UUID: {e}")))?;
        let role: Role = header(parts, SUBJECT_ROLE_HEADER)?
            .parse()
            .map_err(|e| MissingCredential(format!("{SUBJECT_ROLE_HEADER}: {e}")))?;
        Ok(Self(Subject { subject_id, role }))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, MissingCredential> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_headers_yield_subject() {
        // Arrange
        let id = Uuid::new_v4();

        // Act
        let caller = extract(&[
            (SUBJECT_ID_HEADER, &id.to_string()),
            (SUBJECT_ROLE_HEADER, "admin"),
        ])
        .await
        .unwrap();

        // Assert
        assert_eq!(caller.0, Subject::admin(id));
    }

    #[tokio::test]
    async fn test_missing_role_is_rejected() {
        let id = Uuid::new_v4();

        let result = extract(&[(SUBJECT_ID_HEADER, &id.to_string())]).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected_with_401() {
        let rejection = extract(&[(SUBJECT_ID_HEADER, "nobody"), (SUBJECT_ROLE_HEADER, "user")])
            .await
            .unwrap_err();

        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let id = Uuid::new_v4();

        let result = extract(&[
            (SUBJECT_ID_HEADER, &id.to_string()),
            (SUBJECT_ROLE_HEADER, "superuser"),
        ])
        .await;

        assert!(result.is_err());
    }
}
