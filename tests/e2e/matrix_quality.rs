//! Background tool runs.

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::{post_json, result_file, wait_for_file, E2eApp};

#[tokio::test]
async fn test_background_run_writes_log() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app
        .send(post_json(
            "/matrix-quality/",
            r#"{
                "m_string": "A | 1 0\nC | 0 1\nG | 0 0\nT | 0 0\n",
                "seq_type": "sites",
                "seq_file_string": ">s1\nACGT\n",
                "perm": 2,
                "org": "Saccharomyces_cerevisiae",
                "markov_order": 1,
                "archive": true,
                "html": false
            }"#,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "submitted");
    let result_url = json["result_url"].as_str().unwrap();
    assert!(result_url.ends_with("/matrix-quality_synthesis.html"));

    let dir = result_file(&app, result_url)
        .parent()
        .unwrap()
        .to_path_buf();
    let log = wait_for_file(&dir.join("matrix-quality.log"), |c| c.ends_with('\n'))
        .await
        .expect("background run never wrote its log");

    let seq_file = dir.join("seq_file_string.txt");
    let matrix = dir.join("m_string.txt");
    let expected = format!(
        "-seq sites {} -perm sites 2 -bgfile /data/genomes/Saccharomyces_cerevisiae/oligo-frequencies/2nt_upstream-noorf_Saccharomyces_cerevisiae-ovlp-1str.freq.gz -archive -m {} -o {}\n",
        seq_file.display(),
        matrix.display(),
        dir.join("matrix-quality").display(),
    );
    assert_eq!(log, expected);
    assert_eq!(std::fs::read_to_string(seq_file).unwrap(), ">s1\nACGT\n");
}

#[tokio::test]
async fn test_org_with_uploaded_background_is_rejected() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app
        .send(post_json(
            "/matrix-quality/",
            r#"{"org": "Homo_sapiens", "bgfile_string": "a 0.25\n"}"#,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "invalid_parameter");
}

#[tokio::test]
async fn test_permutations_need_sequence_type() {
    let app = E2eApp::with_program("echo");
    let (status, _) = app
        .send(post_json("/matrix-quality/", r#"{"perm": 5}"#))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_negative_markov_order_is_rejected() {
    let app = E2eApp::with_program("echo");
    let (status, _) = app
        .send(post_json(
            "/matrix-quality/",
            r#"{"org": "Homo_sapiens", "markov_order": -1}"#,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
