//! End-to-end tests against a running server with real Demucs
//!
//! These tests require:
//! 1. The stem-splitter server running
//! 2. Demucs installed for the configured DEMUCS_PYTHON
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:8080)

mod helpers;

use std::time::{Duration, Instant};

use helpers::wav_bytes;
use serde_json::Value;

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

async fn upload(client: &reqwest::Client, base_url: &str, model: &str) -> Value {
    let file = reqwest::multipart::Part::bytes(wav_bytes(10, 44_100))
        .file_name("e2e_tone.wav")
        .mime_str("audio/wav")
        .expect("valid mime");
    let form = reqwest::multipart::Form::new()
        .part("file", file)
        .text("model", model.to_string());

    let response = client
        .post(format!("{}/api/upload", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Upload failed");
    assert!(
        response.status().is_success(),
        "Upload returned {}",
        response.status()
    );
    response.json().await.expect("Invalid upload response")
}

/// Poll status until completed or error, asserting progress never drops.
async fn poll_until_done(client: &reqwest::Client, base_url: &str, job_id: &str) -> Value {
    let deadline = Instant::now() + Duration::from_secs(600);
    let mut last_progress = 0;
    loop {
        let status: Value = client
            .get(format!("{}/api/status/{}", base_url, job_id))
            .send()
            .await
            .expect("Status request failed")
            .json()
            .await
            .expect("Invalid status response");

        let progress = status["progress"].as_u64().unwrap_or_default();
        assert!(progress >= last_progress, "Progress dropped to {progress}");
        last_progress = progress;
        println!("  {} {}%", status["status"], progress);

        match status["status"].as_str() {
            Some("completed") | Some("error") => return status,
            _ => {}
        }
        assert!(Instant::now() < deadline, "Job {job_id} timed out");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[tokio::test]
#[ignore] // Requires running server and Demucs
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );

    println!("✓ Health check passed");
}

#[tokio::test]
#[ignore] // Requires running server and Demucs
async fn test_e2e_four_stem_separation() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let submitted = upload(&client, &base_url, "htdemucs").await;
    assert_eq!(submitted["status"], "queued");
    let job_id = submitted["job_id"].as_str().expect("job_id").to_string();
    println!("Submitted job {job_id}");

    let status = poll_until_done(&client, &base_url, &job_id).await;
    assert_eq!(status["status"], "completed", "Job failed: {}", status["error"]);
    assert_eq!(status["progress"], 100);

    let stems = status["stems"].as_array().expect("stems");
    assert_eq!(stems.len(), 4);

    for stem in stems {
        let name = stem["name"].as_str().expect("stem name");
        let response = client
            .get(format!("{}/api/download/{}/{}", base_url, job_id, name))
            .send()
            .await
            .expect("Download failed");
        assert!(response.status().is_success());
        let bytes = response.bytes().await.expect("Stem body");
        assert!(bytes.starts_with(b"RIFF"), "{name} is not a WAV file");
        println!("✓ {name}: {} bytes", bytes.len());
    }
}

#[tokio::test]
#[ignore] // Requires running server and Demucs
async fn test_e2e_six_stem_separation() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let submitted = upload(&client, &base_url, "htdemucs_6s").await;
    let job_id = submitted["job_id"].as_str().expect("job_id").to_string();

    let status = poll_until_done(&client, &base_url, &job_id).await;
    assert_eq!(status["status"], "completed", "Job failed: {}", status["error"]);
    assert_eq!(status["stems"].as_array().expect("stems").len(), 6);
    println!("✓ Six stems produced");
}
