//! Custom Axum extractors

use axum::{
    extract::{FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON extractor that runs `validator` rules before the handler
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()).into_response())?;

        value
            .validate()
            .map_err(|e| ApiError::Validation(format_validation_errors(&e)).into_response())?;

        Ok(ValidatedJson(value))
    }
}

/// Flatten validator errors into one readable line
fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field}: validation failed"))
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}
