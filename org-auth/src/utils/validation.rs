use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::dtos::ErrorResponse;

/// JSON body that is deserialized and then validated.
///
/// Malformed JSON is a 400; a body that parses but fails validation is a 422.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            tracing::debug!(error = %e, "Rejected request body");
            let err_resp = ErrorResponse {
                error: "bad json".to_string(),
            };
            (StatusCode::BAD_REQUEST, Json(err_resp)).into_response()
        })?;

        value.validate().map_err(|e| {
            let err_resp = ErrorResponse {
                error: format!("Validation error: {}", e),
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(err_resp)).into_response()
        })?;

        Ok(ValidatedJson(value))
    }
}
