use crate::error::Error;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub(crate) struct APIError(anyhow::Error);

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let any_err = self.0;
        let status = if let Some(err) = any_err.downcast_ref::<Error>() {
            match err {
                Error::AuthForbidden(_) | Error::IssuanceDenied(_) => StatusCode::FORBIDDEN,
                Error::InvalidDNS01 | Error::InvalidName(_) => StatusCode::BAD_REQUEST,
                Error::JsonExtractorRejection(err) => json_rejection_status(err),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(err) = any_err.downcast_ref::<JsonRejection>() {
            // WithRejection hands extractor rejections over unwrapped.
            json_rejection_status(err)
        } else if any_err.downcast_ref::<QueryRejection>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(json!({
            "error": format!("{any_err}"),
        }));
        (status, body).into_response()
    }
}

fn json_rejection_status(err: &JsonRejection) -> StatusCode {
    match err {
        JsonRejection::JsonDataError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        JsonRejection::JsonSyntaxError(_) => StatusCode::BAD_REQUEST,
        JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<E> From<E> for APIError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
