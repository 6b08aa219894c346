//! REST API endpoint modules.

pub mod companies;
pub mod giftcards;
pub mod members;
pub mod status;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use self::status::AppError;

/// Unwrap a JSON body, reporting a malformed one as a 400.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}
