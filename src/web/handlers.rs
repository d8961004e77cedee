use super::extractors::{RequestId, ValidatedJson};
use super::AppState;
use crate::{
    image::ImageLoader,
    inference::{predict, predict_image, Prediction},
    utils::error::ClassifierError,
    Result,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// 表单中图像字段的名称
pub const IMAGE_FIELD: &str = "image";

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct PredictJsonRequest {
    /// Base64编码的图像数据，可带 data URL 前缀
    pub image: String,
}

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// 通过校验的上传文件
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

/// 首页：空白上传表单
pub async fn upload_form(State(state): State<AppState>) -> Result<Html<String>> {
    Ok(Html(state.templates.upload_form(None)?))
}

/// 表单提交：校验 → 保存到 media 目录 → 预测 → 渲染结果页
///
/// 校验失败时重新渲染表单；图像解码失败等错误交由统一错误响应处理。
pub async fn upload_submit(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Response> {
    let start_time = Instant::now();
    tracing::info!("Processing upload: request_id={}", request_id);

    let upload =
        match read_upload(&mut multipart, state.config.server_config.max_upload_size).await {
            Ok(upload) => upload,
            Err(e) if is_validation_error(&e) => {
                tracing::warn!("Upload rejected: request_id={}, reason={}", request_id, e);
                let page = state.templates.upload_form(Some(&e.to_string()))?;
                return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
            }
            Err(e) => return Err(e),
        };

    // 同名文件直接覆盖
    let path = state.config.media.media_dir.join(&upload.file_name);
    tokio::fs::write(&path, &upload.data).await?;
    tracing::debug!(
        "Stored upload: {} ({} bytes)",
        path.display(),
        upload.data.len()
    );

    let prediction = predict_stored(&state, path).await?;
    let image_url = state.config.media_url_for(&upload.file_name);
    let page = state.templates.result(&prediction, &image_url)?;

    tracing::info!(
        "Upload classified: request_id={}, label={}, index={}, time={:.3}s",
        request_id,
        prediction.label,
        prediction.index,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Html(page).into_response())
}

/// Multipart 文件上传预测接口，结果以 JSON 返回，不落盘
pub async fn api_predict(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Prediction>>> {
    let start_time = Instant::now();

    let upload = read_upload(&mut multipart, state.config.server_config.max_upload_size).await?;
    let max_size = state.config.server_config.max_upload_size;
    let prediction = predict_in_memory(&state, move || {
        ImageLoader::from_bytes(&upload.data, max_size)
    })
    .await?;

    tracing::info!(
        "API prediction: request_id={}, label={}, time={:.3}s",
        request_id,
        prediction.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(prediction, request_id)))
}

/// JSON base64上传预测接口
pub async fn api_predict_base64(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<PredictJsonRequest>,
) -> Result<Json<ApiResponse<Prediction>>> {
    let start_time = Instant::now();

    let max_size = state.config.server_config.max_upload_size;
    let prediction = predict_in_memory(&state, move || {
        ImageLoader::from_base64(&request.image, max_size)
    })
    .await?;

    tracing::info!(
        "Base64 prediction: request_id={}, label={}, time={:.3}s",
        request_id,
        prediction.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(prediction, request_id)))
}

/// 读取并校验表单中的图像字段
pub async fn read_upload(multipart: &mut Multipart, max_size: usize) -> Result<Upload> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ClassifierError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name != IMAGE_FIELD {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| ClassifierError::InvalidInput("Uploaded file has no name".to_string()))?;

        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") {
                return Err(ClassifierError::UnsupportedFormat(content_type.to_string()));
            }
        }

        if !ImageLoader::has_image_extension(&file_name) {
            return Err(ClassifierError::UnsupportedFormat(format!(
                "file extension of '{}' is not an image type",
                file_name
            )));
        }

        let data = field.bytes().await.map_err(|e| {
            ClassifierError::InvalidInput(format!("Failed to read file data: {}", e))
        })?;

        ImageLoader::validate_bytes(&data, max_size)?;
        upload = Some(Upload { file_name, data });
    }

    upload.ok_or_else(|| ClassifierError::InvalidInput("No image file provided".to_string()))
}

/// 表单校验类错误，需要重新展示表单
fn is_validation_error(error: &ClassifierError) -> bool {
    matches!(
        error,
        ClassifierError::InvalidInput(_)
            | ClassifierError::FileTooLarge(_, _)
            | ClassifierError::UnsupportedFormat(_)
    )
}

/// 只保留文件名本身，去掉目录部分并替换不安全字符
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next()?.trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.starts_with('.') {
        return None;
    }
    Some(cleaned)
}

/// 对已保存的文件做预测，推理在阻塞线程池中执行
async fn predict_stored(state: &AppState, path: PathBuf) -> Result<Prediction> {
    let model = state.model.clone();
    let labels = state.config.labels.clone();

    tokio::task::spawn_blocking(move || predict(&path, &model, &labels))
        .await
        .map_err(|e| ClassifierError::Internal(format!("Inference task failed: {}", e)))?
}

async fn predict_in_memory<F>(state: &AppState, load: F) -> Result<Prediction>
where
    F: FnOnce() -> Result<image::DynamicImage> + Send + 'static,
{
    let model = state.model.clone();
    let labels = state.config.labels.clone();

    tokio::task::spawn_blocking(move || {
        let image = load()?;
        predict_image(&image, &model, &labels)
    })
    .await
    .map_err(|e| ClassifierError::Internal(format!("Inference task failed: {}", e)))?
}
