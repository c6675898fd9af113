//! JSON extractor that runs `validator` rules before the handler sees the body.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use serde_json::json;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::error::AppError;

/// Drop-in replacement for `Json<T>` that answers 400 with field-level
/// details when the body is malformed or breaks a validation rule.
pub struct Validated<T>(pub T);

impl<T, S> FromRequest<S> for Validated<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                AppError::bad_request(rejection.body_text()).with_code("invalid_body")
            })?;

        value.validate().map_err(|errors| {
            let details = field_errors(&errors);
            let message = details
                .first()
                .and_then(|detail| detail["message"].as_str())
                .unwrap_or("Request validation failed")
                .to_string();
            AppError::validation(details, message)
        })?;

        Ok(Validated(value))
    }
}

/// Flatten nested validation errors into `{field, message, code}` entries,
/// with dotted paths such as `books[1].quantity`.
pub fn field_errors(errors: &ValidationErrors) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    collect(errors, "", &mut out);
    out
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<serde_json::Value>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation failed for field '{path}'"));
                    out.push(json!({
                        "field": path,
                        "message": message,
                        "code": error.code,
                    }));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}
