/// Request extractors that fail with the API error envelope
///
/// axum's own `Json`, `Path` and `Query` reject with plain-text bodies. These
/// wrappers run the same extraction and convert the rejection into an
/// [`ApiError`], so malformed input gets the usual
/// `{ "success": false, "error": ..., "message": ... }` response.
///
/// - [`JsonBody`]: required JSON body; wrong types or unknown enum values are 422
/// - [`OptionalJsonBody`]: an empty body is `None`; anything else must parse
/// - [`Path`], [`Query`]: bad path or query parameters are 400
///
/// # Example
///
/// ```no_run
/// use foodbridge_api::extract::{JsonBody, Path};
/// use serde::Deserialize;
/// use uuid::Uuid;
///
/// #[derive(Deserialize)]
/// struct Rename {
///     title: String,
/// }
///
/// async fn rename(Path(id): Path<Uuid>, JsonBody(req): JsonBody<Rename>) -> String {
///     format!("{} -> {}", id, req.title)
/// }
/// ```

use crate::error::ApiError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Request,
    },
};
use serde::de::DeserializeOwned;

/// Required JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// Query string parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// JSON body that may be left out entirely
///
/// Only an empty (or all-whitespace) body counts as absent. A body that is
/// present but malformed is rejected instead of being treated as missing.
#[derive(Debug)]
pub struct OptionalJsonBody<T>(pub Option<T>);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJsonBody(None));
        }

        serde_json::from_slice(&bytes)
            .map(|value| OptionalJsonBody(Some(value)))
            .map_err(|err| {
                if err.is_data() {
                    ApiError::invalid("body", err.to_string())
                } else {
                    ApiError::BadRequest(format!("Malformed JSON body: {}", err))
                }
            })
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON that doesn't fit the request type
            JsonRejection::JsonDataError(err) => ApiError::invalid("body", err.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Toggle {
        verified: bool,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("PUT")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_optional_body_empty_is_none() {
        for body in ["", "  \n"] {
            let OptionalJsonBody(parsed) =
                OptionalJsonBody::<Toggle>::from_request(json_request(body), &())
                    .await
                    .unwrap();
            assert!(parsed.is_none());
        }
    }

    #[tokio::test]
    async fn test_optional_body_parses_when_present() {
        let OptionalJsonBody(parsed) =
            OptionalJsonBody::<Toggle>::from_request(json_request(r#"{"verified": false}"#), &())
                .await
                .unwrap();
        assert!(!parsed.unwrap().verified);
    }

    #[tokio::test]
    async fn test_optional_body_rejects_wrong_type() {
        let err = OptionalJsonBody::<Toggle>::from_request(json_request(r#"{"verified": "no"}"#), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_optional_body_rejects_broken_json() {
        let err = OptionalJsonBody::<Toggle>::from_request(json_request("{\"verified\": "), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_json_body_errors_use_envelope_variants() {
        let err = JsonBody::<Toggle>::from_request(json_request(r#"{"verified": 3}"#), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let no_content_type = Request::builder()
            .method("PUT")
            .uri("/")
            .body(Body::from(r#"{"verified": true}"#))
            .unwrap();
        let err = JsonBody::<Toggle>::from_request(no_content_type, &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
