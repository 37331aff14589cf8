//! HTTP front end: the page, the credential contract, and the analyze route.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info};

use crate::capture::{capture_from_data_url, capture_from_upload, ImageAsset};
use crate::config::EnvReport;
use crate::error::{ConfigError, PipelineError};
use crate::pipeline::{Pipeline, PipelineOutcome};

pub struct AppState {
    pub pipeline: Result<Pipeline, ConfigError>,
    pub env_report: EnvReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(flatten)]
    outcome: PipelineOutcome,
    html: String,
    diagnostics_html: String,
}

/// Pipeline failure rendered as `{error, detail}` with a matching status.
pub struct AppError(PipelineError);

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        debug!("request failed ({status}): {}", self.0);
        let body = Json(json!({
            "error": self.0.user_message(),
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

async fn config(State(state): State<Arc<AppState>>) -> Response {
    match &state.pipeline {
        Ok(pipeline) => Json(pipeline.credentials().clone()).into_response(),
        Err(e) => {
            error!("{e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn test_env(State(state): State<Arc<AppState>>) -> Json<EnvReport> {
    Json(state.env_report.clone())
}

async fn read_asset(multipart: &mut Multipart) -> Result<ImageAsset, PipelineError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Decode(format!("form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| PipelineError::Decode(format!("image field: {e}")))?;
                return Ok(capture_from_upload(
                    data.to_vec(),
                    file_name.as_deref(),
                    content_type.as_deref(),
                ));
            }
            "snapshot" => {
                let data_url = field
                    .text()
                    .await
                    .map_err(|e| PipelineError::Decode(format!("snapshot field: {e}")))?;
                return capture_from_data_url(&data_url);
            }
            other => debug!("ignoring form field '{other}'"),
        }
    }
    Err(PipelineError::Decode("request: no image provided".to_string()))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let asset = read_asset(&mut multipart).await.map_err(|e| {
        error!(stage = "capture", "{e}");
        e
    })?;
    info!("received {} ({}, {} bytes)", asset.name, asset.mime_type, asset.len());

    let pipeline = state
        .pipeline
        .as_ref()
        .map_err(|e| PipelineError::Config(e.clone()))?;

    let outcome = pipeline.run(asset).await?;
    let html = outcome.html();
    let diagnostics_html = outcome.diagnostics_html();

    Ok(Json(AnalyzeResponse {
        outcome,
        html,
        diagnostics_html,
    }))
}

pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/config", get(config))
        .route("/test-env", get(test_env))
        .route("/analyze", post(analyze))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::disable()),
        )
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>FloralBot</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <div class="container">
        <header>
            <div class="logo">
                <h1>FloralBot</h1>
            </div>
            <p>Upload or snap a photo of flowers to find out what is blooming.</p>
        </header>

        <main>
            <section class="upload-section">
                <input type="file" id="fileInput" accept="image/*" class="hidden">
                <div class="input-buttons">
                    <button class="btn" id="uploadBtn">Upload Photo</button>
                    <button class="btn" id="cameraBtn">Use Camera</button>
                    <button class="btn hidden" id="captureBtn">Take Photo</button>
                </div>
                <video id="camera" class="hidden" autoplay playsinline></video>
                <canvas id="canvas" class="hidden"></canvas>
                <p class="status" id="status"></p>
            </section>

            <section class="results-section hidden" id="results">
                <div id="analysisResults"></div>
            </section>

            <section class="debug-section hidden" id="debug">
                <h3>Diagnostics</h3>
                <div class="debug-container" id="debugContainer"></div>
            </section>
        </main>
    </div>

    <script>
        const fileInput = document.getElementById('fileInput');
        const uploadBtn = document.getElementById('uploadBtn');
        const cameraBtn = document.getElementById('cameraBtn');
        const captureBtn = document.getElementById('captureBtn');
        const video = document.getElementById('camera');
        const canvas = document.getElementById('canvas');
        const statusLine = document.getElementById('status');
        const results = document.getElementById('results');
        const analysisResults = document.getElementById('analysisResults');
        const debug = document.getElementById('debug');
        const debugContainer = document.getElementById('debugContainer');

        let stream = null;
        let acquiring = false;

        function stopCamera() {
            if (stream) {
                stream.getTracks().forEach(track => track.stop());
                stream = null;
            }
            video.srcObject = null;
            video.classList.add('hidden');
            captureBtn.classList.add('hidden');
            cameraBtn.textContent = 'Use Camera';
        }

        async function toggleCamera() {
            if (acquiring) {
                return;
            }
            if (stream) {
                stopCamera();
                return;
            }
            acquiring = true;
            cameraBtn.disabled = true;
            try {
                const opened = await navigator.mediaDevices.getUserMedia({ video: true });
                if (stream) {
                    opened.getTracks().forEach(track => track.stop());
                    return;
                }
                stream = opened;
                video.srcObject = stream;
                video.classList.remove('hidden');
                captureBtn.classList.remove('hidden');
                cameraBtn.textContent = 'Stop Camera';
            } catch (error) {
                console.error('Camera error:', error);
                stopCamera();
                alert('Unable to access the camera. You can still upload a photo instead.');
            } finally {
                acquiring = false;
                cameraBtn.disabled = false;
            }
        }

        function captureSnapshot() {
            if (!stream) {
                return;
            }
            let dataUrl;
            try {
                canvas.width = video.videoWidth;
                canvas.height = video.videoHeight;
                canvas.getContext('2d').drawImage(video, 0, 0);
                dataUrl = canvas.toDataURL('image/jpeg', 0.85);
            } catch (error) {
                console.error('Capture error:', error);
                alert('Could not read the image. Please try another file.');
                return;
            } finally {
                stopCamera();
            }
            const form = new FormData();
            form.append('snapshot', dataUrl);
            submit(form);
        }

        async function submit(form) {
            statusLine.textContent = 'Analyzing...';
            try {
                const response = await fetch('/analyze', { method: 'POST', body: form });
                const body = await response.json();
                if (!response.ok) {
                    console.error('Analysis failed:', body.detail);
                    statusLine.textContent = '';
                    alert(body.error);
                    return;
                }
                statusLine.textContent = '';
                analysisResults.innerHTML = body.html;
                debugContainer.innerHTML = body.diagnosticsHtml;
                results.classList.remove('hidden');
                debug.classList.remove('hidden');
            } catch (error) {
                console.error('Request error:', error);
                statusLine.textContent = '';
                alert('The request could not be completed. Please try again.');
            }
        }

        uploadBtn.addEventListener('click', () => fileInput.click());
        fileInput.addEventListener('change', (e) => {
            const file = e.target.files[0];
            if (file) {
                const form = new FormData();
                form.append('image', file);
                submit(form);
            }
            fileInput.value = '';
        });
        cameraBtn.addEventListener('click', toggleCamera);
        captureBtn.addEventListener('click', captureSnapshot);
        window.addEventListener('beforeunload', stopCamera);
    </script>
</body>
</html>
        "#,
    )
}
