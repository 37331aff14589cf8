//! End-to-end pipeline runs against mocked storage and vision services.

mod common;

use std::io;
use std::sync::{Arc, Mutex};

use common::{
    jpeg_fixture, mount_storage, mount_vision, pipeline_for, tulip_response, SAS_SIGNATURE,
};
use floralbot::presenter::NO_FLOWERS_MESSAGE;
use floralbot::{ImageAsset, PipelineError};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tulip_photo() -> ImageAsset {
    ImageAsset::new(jpeg_fixture(), "image/jpeg", "tulips.jpg")
}

#[tokio::test]
async fn tulip_photo_renders_one_flower_one_color_and_caption() {
    let server = MockServer::start().await;
    mount_storage(&server, 201).await;
    mount_vision(&server, 200, tulip_response()).await;

    let outcome = pipeline_for(&server).run(tulip_photo()).await.unwrap();

    assert_eq!(outcome.analysis.flowers.len(), 1);
    assert_eq!(outcome.analysis.flowers[0].kind, "tulip");
    assert_eq!(outcome.analysis.flowers[0].count, 1);

    let text = outcome.text();
    assert!(text.contains("  Tulip\n    Count: 1\n    Confidence: 82.0%"));
    assert!(text.contains("■ Yellow"));
    assert!(text.contains("Description: a field of tulips"));

    let html = outcome.html();
    assert!(html.contains("<strong>Tulip</strong><br>Count: 1<br>Confidence: 82.0%"));
    assert_eq!(html.matches("color-swatch").count(), 1);
    assert!(html.contains("a field of tulips"));
}

#[tokio::test]
async fn uploaded_url_never_carries_the_token() {
    let server = MockServer::start().await;
    mount_storage(&server, 201).await;
    mount_vision(&server, 200, tulip_response()).await;

    let outcome = pipeline_for(&server).run(tulip_photo()).await.unwrap();

    let url = outcome.image_url.as_str();
    assert!(url.starts_with(&format!("{}/uploads/flower-", server.uri())));
    assert!(url.ends_with("-tulips.jpg"));
    assert!(!url.contains(SAS_SIGNATURE));
    assert!(!outcome.html().contains(SAS_SIGNATURE));
    assert!(!outcome.diagnostics_html().contains(SAS_SIGNATURE));
}

#[tokio::test]
async fn upload_and_vision_receive_identical_bytes() {
    let server = MockServer::start().await;
    mount_storage(&server, 201).await;
    mount_vision(&server, 200, tulip_response()).await;

    let photo = tulip_photo();
    let expected = photo.bytes.clone();
    pipeline_for(&server).run(photo).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method.as_str(), "PUT");
    assert_eq!(requests[1].method.as_str(), "POST");
    assert_eq!(requests[0].body, expected);
    assert_eq!(requests[1].body, expected);
}

#[tokio::test]
async fn no_tags_or_objects_reports_no_flowers() {
    let server = MockServer::start().await;
    mount_storage(&server, 201).await;
    mount_vision(&server, 200, json!({ "color": { "dominantColors": ["Grey"] } })).await;

    let outcome = pipeline_for(&server).run(tulip_photo()).await.unwrap();

    assert!(outcome.analysis.flowers.is_empty());
    assert!(outcome.html().contains(NO_FLOWERS_MESSAGE));
    assert!(outcome.text().contains(NO_FLOWERS_MESSAGE));
}

#[tokio::test]
async fn failed_upload_stops_before_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AuthorizationFailure"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = pipeline_for(&server).run(tulip_photo()).await.unwrap_err();
    match err {
        PipelineError::Upload { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "AuthorizationFailure");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn vision_failure_is_api_error() {
    let server = MockServer::start().await;
    mount_storage(&server, 201).await;
    mount_vision(&server, 429, json!({ "error": { "code": "429" } })).await;

    let err = pipeline_for(&server).run(tulip_photo()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Api { status: 429, .. }));
}

#[tokio::test]
async fn pipeline_can_run_again_after_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_storage(&server, 201).await;
    mount_vision(&server, 200, tulip_response()).await;

    let pipeline = pipeline_for(&server);
    assert!(pipeline.run(tulip_photo()).await.is_err());
    let outcome = pipeline.run(tulip_photo()).await.unwrap();
    assert_eq!(outcome.analysis.flowers.len(), 1);
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn each_stage_failure_is_logged_once() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let storage_down = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AuthorizationFailure"))
        .mount(&storage_down)
        .await;
    assert!(pipeline_for(&storage_down).run(tulip_photo()).await.is_err());

    let vision_down = MockServer::start().await;
    mount_storage(&vision_down, 201).await;
    mount_vision(&vision_down, 429, json!({ "message": "QuotaExhausted" })).await;
    assert!(pipeline_for(&vision_down).run(tulip_photo()).await.is_err());

    let logged = logs.contents();
    assert_eq!(logged.matches("AuthorizationFailure").count(), 1, "{logged}");
    assert_eq!(logged.matches("QuotaExhausted").count(), 1, "{logged}");
}
