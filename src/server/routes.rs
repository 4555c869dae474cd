use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context as _;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{AppState, error::ApiError};
use crate::{
    foundation::error::{OverlayError, OverlayResult},
    model::{OutputImage, OverlayParams, OverlaySpec},
    pipeline::overlay_gif_file,
    render::{BackendKind, create_backend},
};

pub const OUTPUTS_ROUTE: &str = "/outputs";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayResponse {
    #[serde(rename = "outputUrl")]
    pub output_url: String,
}

pub fn router(state: AppState) -> Router {
    let outputs = ServeDir::new(&state.config.outputs_dir);
    Router::new()
        .route("/overlay", post(overlay))
        .nest_service(OUTPUTS_ROUTE, outputs)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct UploadedFile {
    file_name: Option<String>,
    bytes: Bytes,
}

#[derive(Default)]
struct OverlayForm {
    file: Option<UploadedFile>,
    text: Option<String>,
    font_size: Option<String>,
    x: Option<String>,
    y: Option<String>,
    angle: Option<String>,
    color: Option<String>,
}

impl OverlayForm {
    async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                "gif" => {
                    let file_name = field.file_name().map(str::to_owned);
                    let bytes = field.bytes().await?;
                    // Browsers send an empty, nameless part when no file was picked.
                    let picked = file_name.as_deref().is_some_and(|n| !n.is_empty());
                    if picked || !bytes.is_empty() {
                        form.file = Some(UploadedFile { file_name, bytes });
                    }
                }
                "text" => form.text = Some(field.text().await?),
                "fontSize" => form.font_size = Some(field.text().await?),
                "x" => form.x = Some(field.text().await?),
                "y" => form.y = Some(field.text().await?),
                "angle" => form.angle = Some(field.text().await?),
                "color" => form.color = Some(field.text().await?),
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }

    fn params(&self) -> OverlayParams<'_> {
        OverlayParams {
            text: self.text.as_deref(),
            font_size: self.font_size.as_deref(),
            x: self.x.as_deref(),
            y: self.y.as_deref(),
            angle: self.angle.as_deref(),
            color: self.color.as_deref(),
        }
    }
}

async fn overlay(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OverlayResponse>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "request is not a multipart form");
        ApiError::MissingFile
    })?;
    let form = OverlayForm::read(multipart).await?;

    let Some(upload) = form.file.as_ref() else {
        return Err(ApiError::MissingFile);
    };
    if form.text.as_deref().is_none_or(str::is_empty) {
        return Err(ApiError::MissingText);
    }
    let spec = OverlaySpec::from_params(&form.params())?;

    let upload_path = state
        .config
        .uploads_dir
        .join(upload_file_name(upload.file_name.as_deref()));
    tokio::fs::write(&upload_path, &upload.bytes)
        .await
        .with_context(|| format!("store upload '{}'", upload_path.display()))?;

    let output_name = format!("{}.gif", uuid::Uuid::new_v4());
    let output_path = state.config.outputs_dir.join(&output_name);
    tracing::info!(
        upload = %upload_path.display(),
        bytes = upload.bytes.len(),
        output = %output_name,
        "processing overlay request"
    );

    match run_pipeline(&state, upload_path.clone(), output_path, spec).await {
        Ok(out) => {
            if let Err(err) = tokio::fs::remove_file(&upload_path).await {
                tracing::warn!(upload = %upload_path.display(), %err, "failed to delete upload");
            }
            tracing::info!(output = %output_name, frames = out.frame_count, "overlay done");
            Ok(Json(OverlayResponse {
                output_url: state.config.output_url(&output_name),
            }))
        }
        Err(err) => {
            // Uploads are only cleaned up on success.
            tracing::warn!(upload = %upload_path.display(), "upload left on disk after failure");
            Err(err.into())
        }
    }
}

async fn run_pipeline(
    state: &AppState,
    input: PathBuf,
    output: PathBuf,
    spec: OverlaySpec,
) -> OverlayResult<OutputImage> {
    let fonts = state.fonts.clone();
    tokio::task::spawn_blocking(move || {
        let font = fonts.font()?;
        let mut backend = create_backend(BackendKind::Cpu, font)?;
        overlay_gif_file(&input, &output, &spec, backend.as_mut())
    })
    .await
    .map_err(|e| OverlayError::Other(anyhow::Error::new(e).context("overlay worker failed")))?
}

/// `<unix millis>-<short id>-<sanitized original name>`.
fn upload_file_name(original: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let short_id = uuid::Uuid::new_v4().simple().to_string();
    let short_id = &short_id[..8];

    let base = original
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .map(|n| {
            n.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .filter(|n| !n.trim_matches('.').is_empty())
        .unwrap_or_else(|| "upload.gif".to_string());

    format!("{millis}-{short_id}-{base}")
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        tracing::debug!(status = %err.status(), %err, "unreadable multipart body");
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge
        } else {
            Self::MissingFile
        }
    }
}
