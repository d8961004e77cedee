use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

/// 请求ID的最大长度，超出时重新生成
const MAX_REQUEST_ID_LEN: usize = 128;

/// 反序列化后立即执行 [`Validate`] 的 JSON 提取器
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = RejectedBody;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate().map_err(RejectedBody::Invalid)?;
        Ok(ValidatedJson(value))
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// JSON 请求体被拒绝的原因
#[derive(Debug, thiserror::Error)]
pub enum RejectedBody {
    #[error("JSON parse error: {0}")]
    Malformed(String),

    #[error("Validation error: {0}")]
    Invalid(String),
}

impl From<JsonRejection> for RejectedBody {
    fn from(rejection: JsonRejection) -> Self {
        RejectedBody::Malformed(rejection.body_text())
    }
}

impl IntoResponse for RejectedBody {
    fn into_response(self) -> Response {
        tracing::debug!("Rejected request body: {}", self);

        let body = serde_json::json!({
            "error": {
                "code": "VALIDATION_ERROR",
                "message": self.to_string(),
            }
        });

        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl Validate for crate::web::handlers::PredictJsonRequest {
    fn validate(&self) -> Result<(), String> {
        let image = self.image.trim();
        if image.is_empty() {
            return Err("Image data cannot be empty".to_string());
        }

        // data URL 必须声明为 base64 编码的图像
        if let Some(rest) = image.strip_prefix("data:") {
            let header = rest
                .split_once(',')
                .map(|(header, _)| header)
                .ok_or_else(|| "data URL has no payload".to_string())?;
            if !header.starts_with("image/") {
                return Err(format!("data URL is not an image: {}", header));
            }
            if !header.ends_with(";base64") {
                return Err("data URL must be base64 encoded".to_string());
            }
        }

        Ok(())
    }
}

/// 请求ID，优先使用客户端传入的 X-Request-ID
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}
