#![allow(dead_code)]

use std::io::Cursor;

use floralbot::{Credentials, Pipeline, PipelineSettings, StorageEndpoint};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SAS_SIGNATURE: &str = "s3cr3tsig";

pub fn credentials(vision_endpoint: &str) -> Credentials {
    Credentials {
        storage_account: "floralstore".to_string(),
        storage_container: "uploads".to_string(),
        sas_token: format!("?sv=2022-11-02&sp=cw&sig={SAS_SIGNATURE}"),
        vision_endpoint: vision_endpoint.to_string(),
        vision_api_key: "vision-key".to_string(),
    }
}

/// Pipeline whose storage and vision calls both go to `server`.
pub fn pipeline_for(server: &MockServer) -> Pipeline {
    let settings = PipelineSettings {
        storage: StorageEndpoint::from_settings("", Some(server.uri().as_str())).unwrap(),
        deadline: None,
    };
    Pipeline::from_settings(credentials(&server.uri()), reqwest::Client::new(), &settings)
}

/// A noisy JPEG of roughly 10 KB.
pub fn jpeg_fixture() -> Vec<u8> {
    let img = RgbImage::from_fn(96, 96, |x, y| {
        Rgb([
            (x * 7 % 255) as u8,
            (y * 13 % 255) as u8,
            ((x ^ y) * 5 % 255) as u8,
        ])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(90))
        .unwrap();
    bytes
}

pub fn tulip_response() -> Value {
    json!({
        "tags": [{ "name": "tulip", "confidence": 0.82 }],
        "objects": [],
        "color": { "dominantColors": ["Yellow"] },
        "description": { "captions": [{ "text": "a field of tulips" }] }
    })
}

pub async fn mount_storage(server: &MockServer, status: u16) {
    Mock::given(method("PUT"))
        .and(path_regex(r"^/uploads/flower-\d+-.+$"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub async fn mount_vision(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path("/vision/v3.2/analyze"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
