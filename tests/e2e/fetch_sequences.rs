//! Synchronous tool runs.

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::{get, post_json, result_file, E2eApp};

#[tokio::test]
async fn test_get_returns_tool_stdout_as_text() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app
        .send(get(
            "/fetch-sequences/?genome=hg38&upstr_ext=50&header_format=ucsc&content-type=text/plain",
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "-genome hg38 -upstr_ext 50 -header_format ucsc\n");
}

#[tokio::test]
async fn test_post_inline_coordinates_are_staged() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app
        .send(post_json(
            "/fetch-sequences/",
            r#"{"genome": "mm10", "i_string": "chr1\t100\t200\n"}"#,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "completed");
    let output = json["output"].as_str().unwrap();
    let args: Vec<&str> = output.split_whitespace().collect();
    assert_eq!(&args[..3], ["-genome", "mm10", "-i"]);
    assert!(args[3].ends_with("/i_string.txt"));
    assert_eq!(
        std::fs::read_to_string(args[3]).unwrap(),
        "chr1\t100\t200\n"
    );

    // stdout is also kept in the result directory
    let result_url = json["result_url"].as_str().unwrap();
    assert!(result_url.ends_with("/fetch-sequences.fasta"));
    let saved = std::fs::read_to_string(result_file(&app, result_url)).unwrap();
    assert_eq!(saved, output);
}

#[tokio::test]
async fn test_inline_url_is_passed_through() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app
        .send(get(
            "/fetch-sequences/?genome=hg38&i_string=https://example.org/peaks.bed&i_string_type=url&content-type=text/plain",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "-genome hg38 -i https://example.org/peaks.bed\n");
}

#[tokio::test]
async fn test_result_directories_are_distinct() {
    let app = E2eApp::with_program("echo");
    let mut urls = Vec::new();
    for _ in 0..3 {
        let (status, body) = app.send(get("/fetch-sequences/?genome=hg38")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        urls.push(json["result_url"].as_str().unwrap().to_string());
    }
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 3);
}

#[tokio::test]
async fn test_failing_tool_is_bad_gateway() {
    let app = E2eApp::with_program("false");
    let (status, body) = app.send(get("/fetch-sequences/?genome=hg38")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "tool_failed");
}

#[tokio::test]
async fn test_missing_program_is_server_error() {
    let app = E2eApp::with_program("/nonexistent/rsat/fetch-sequences");
    let (status, body) = app.send(get("/fetch-sequences/?genome=hg38")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "spawn_failed");
}

#[tokio::test]
async fn test_missing_genome_is_rejected() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app.send(get("/fetch-sequences/?upstr_ext=10")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "missing_parameter");
}
