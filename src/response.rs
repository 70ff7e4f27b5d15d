use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

/// Success envelope shared by the resource endpoints. Errors use the same
/// shape with `status: false` and no `data` (see `AppError`).
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: bool,
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(code: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status: true,
            code: code.as_u16(),
            message: message.into(),
            data,
        }
    }

    pub fn into_response(self) -> HttpResponse {
        let code = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        HttpResponse::build(code).json(self)
    }
}
