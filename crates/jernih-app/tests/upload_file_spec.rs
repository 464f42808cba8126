use std::{fs, path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jernih_app::config::LexiconConfig;
use jernih_app::lexicon::Lexicon;
use jernih_app::pipeline::CleansePipeline;
use jernih_app::server::{build_api_router, build_app_router};
use jernih_app::services::{DefaultCleanseProvider, MemorySink, RecordKind};
use jernih_server::ServerConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "jernih-spec-boundary";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture_provider(sink: Arc<MemorySink>) -> Arc<DefaultCleanseProvider> {
    let lexicon = Lexicon::load(&LexiconConfig {
        slang_path: fixture("kamus.csv"),
        abusive_path: fixture("abusive.csv"),
        abusive_column: "ABUSIVE".to_string(),
    })
    .expect("fixture lexicon loads");
    Arc::new(DefaultCleanseProvider::new(
        Arc::new(CleansePipeline::new(lexicon)),
        sink,
        "Tweet",
    ))
}

enum Part<'a> {
    File { name: &'a str, bytes: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File { name, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: text/csv\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/upload-file")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builder must not fail")
}

async fn json_body(response: axum::response::Response) -> Value {
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("body must be collected")
        .to_bytes();
    let body_text = std::str::from_utf8(body_bytes.as_ref()).unwrap_or("<non-utf8>");
    serde_json::from_slice(body_bytes.as_ref())
        .unwrap_or_else(|err| panic!("invalid json: {err}; body={body_text}"))
}

#[tokio::test]
async fn cleanses_tweet_column_of_latin1_upload() {
    let raw = fs::read(fixture("tweets.csv")).expect("read tweets fixture");
    let sink = Arc::new(MemorySink::new());
    let body = multipart_body(&[Part::File {
        name: "tweets.csv",
        bytes: &raw,
    }]);

    let response = build_api_router(fixture_provider(sink.clone()))
        .oneshot(upload_request(body))
        .await
        .expect("handler should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let value = json_body(response).await;
    assert_eq!(
        value,
        json!({
            "status_code": 200,
            "description": "File processed",
            "cleansed_file": "Tweet,HS\nsaya  banget n,1\ncaf enak yang,0\n",
            "rows": 2,
            "persisted": true,
        })
    );

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, RecordKind::File);
    assert_eq!(records[0].input, raw, "raw upload bytes are recorded");
}

#[tokio::test]
async fn column_part_selects_target_field() {
    let body = multipart_body(&[
        Part::File {
            name: "posts.csv",
            bytes: b"id,Text\n1,Gw BGT\n2,\n",
        },
        Part::Text {
            name: "column",
            value: "Text",
        },
    ]);

    let response = build_api_router(fixture_provider(Arc::new(MemorySink::new())))
        .oneshot(upload_request(body))
        .await
        .expect("handler should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let value = json_body(response).await;
    assert_eq!(value["cleansed_file"], json!("id,Text\n1,saya banget\n2,\n"));
    assert_eq!(value["rows"], json!(2));
}

#[tokio::test]
async fn missing_target_column_is_rejected() {
    let body = multipart_body(&[Part::File {
        name: "posts.csv",
        bytes: b"Text\nhalo\n",
    }]);

    let response = build_api_router(fixture_provider(Arc::new(MemorySink::new())))
        .oneshot(upload_request(body))
        .await
        .expect("handler should respond");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let value = json_body(response).await;
    assert_eq!(value["error"], json!("invalid_parameter"));
    assert_eq!(value["field"], json!("column"));
}

#[tokio::test]
async fn non_csv_upload_is_rejected() {
    let body = multipart_body(&[Part::File {
        name: "tweets.xlsx",
        bytes: b"Tweet\nhalo\n",
    }]);

    let response = build_api_router(fixture_provider(Arc::new(MemorySink::new())))
        .oneshot(upload_request(body))
        .await
        .expect("handler should respond");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let value = json_body(response).await;
    assert_eq!(value["field"], json!("file"));
}

#[tokio::test]
async fn ragged_rows_are_rejected() {
    let sink = Arc::new(MemorySink::new());
    let body = multipart_body(&[Part::File {
        name: "tweets.csv",
        bytes: b"Tweet,HS\nhalo,1\nbabi\n",
    }]);

    let response = build_api_router(fixture_provider(sink.clone()))
        .oneshot(upload_request(body))
        .await
        .expect("handler should respond");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let value = json_body(response).await;
    assert_eq!(value["field"], json!("file"));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn oversized_upload_returns_413() {
    let config = ServerConfig {
        max_upload_bytes: 64,
        ..ServerConfig::default()
    };
    let mut csv = b"Tweet\n".to_vec();
    csv.extend(std::iter::repeat_n(b'a', 512));
    csv.push(b'\n');
    let body = multipart_body(&[Part::File {
        name: "big.csv",
        bytes: &csv,
    }]);

    let router = build_app_router(&config, fixture_provider(Arc::new(MemorySink::new())))
        .expect("router builds");
    let response = router
        .oneshot(upload_request(body))
        .await
        .expect("handler should respond");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let value = json_body(response).await;
    assert_eq!(value["error"], json!("payload_too_large"));
}
