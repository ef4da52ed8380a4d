use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// Success envelope: `{ success, code, data }`. Failures take the
/// same shape through [`crate::error::Error`].
pub struct ApiResponse {
  code: StatusCode,
  data: serde_json::Value,
}

impl ApiResponse {
  pub fn ok(data: impl Serialize) -> ApiResponse {
    ApiResponse {
      code: StatusCode::OK,
      data: serde_json::to_value(data)
        .unwrap_or(serde_json::Value::Null),
    }
  }
}

impl IntoResponse for ApiResponse {
  fn into_response(self) -> Response {
    let body = json!({
      "success": self.code.is_success(),
      "code": self.code.as_u16(),
      "data": self.data,
    });
    (self.code, Json(body)).into_response()
  }
}
