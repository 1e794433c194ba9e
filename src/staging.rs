//! Re-host episode audio on S3 before transcription.
//!
//! Some podcast CDNs reject or throttle the transcription service's fetches,
//! so audio can be downloaded, optionally sped up and recompressed with
//! `ffmpeg`, and uploaded to a bucket the service can read. Requests are
//! signed with AWS Signature Version 4 directly, no SDK.
//!
//! # Configuration
//!
//! ```toml
//! [staging]
//! bucket = "finsight-audio"
//! region = "us-east-1"
//! prefix = "episodes/"
//! transcode = true
//! tempo = 1.2
//! bitrate = "48k"
//! ```
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
//! optionally `AWS_SESSION_TOKEN`.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

use crate::config::StagingConfig;
use crate::error::{credential, Error, Result};
use crate::http::send_with_retry;

const SERVICE: &str = "s3";

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait AudioStager: Send + Sync {
    /// Copy the audio at `url` somewhere the transcriber can fetch it and
    /// return the new URL.
    async fn stage(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_key_id: credential("AWS_ACCESS_KEY_ID")?,
            secret_access_key: credential("AWS_SECRET_ACCESS_KEY")?,
            session_token: std::env::var("AWS_SESSION_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        })
    }
}

pub struct S3Stager {
    client: reqwest::Client,
    config: StagingConfig,
    max_retries: u32,
}

impl S3Stager {
    pub fn new(config: StagingConfig, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            client,
            config,
            max_retries,
        })
    }

    /// Fail early when staging is configured but AWS keys are missing.
    pub fn check_credentials() -> Result<()> {
        AwsCredentials::from_env().map(|_| ())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response =
            send_with_retry("audio", self.max_retries, || self.client.get(url).send()).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload(&self, creds: &AwsCredentials, key: &str, body: Vec<u8>) -> Result<String> {
        let host = s3_host(&self.config);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let url = format!("{}/{}", endpoint_base(&self.config), encoded_key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("content-type".to_string(), "audio/mpeg".to_string()),
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let authorization = authorization_header(
            creds,
            "PUT",
            &format!("/{}", encoded_key),
            &headers,
            &payload_hash,
            &self.config.region,
            &date_stamp,
            &amz_date,
        )?;

        send_with_retry(SERVICE, self.max_retries, || {
            let mut request = self
                .client
                .put(&url)
                .header("Authorization", &authorization)
                .header("Content-Type", "audio/mpeg")
                .header("x-amz-content-sha256", &payload_hash)
                .header("x-amz-date", &amz_date)
                .body(body.clone());
            if let Some(token) = &creds.session_token {
                request = request.header("x-amz-security-token", token);
            }
            request.send()
        })
        .await?;

        Ok(url)
    }
}

#[async_trait]
impl AudioStager for S3Stager {
    async fn stage(&self, url: &str) -> Result<String> {
        let creds = AwsCredentials::from_env()?;
        let audio = self.download(url).await?;
        let audio = if self.config.transcode {
            transcode(&audio, self.config.tempo, &self.config.bitrate).await?
        } else {
            audio
        };

        let key = object_key(&self.config.prefix, url);
        let staged = self.upload(&creds, &key, audio).await?;
        tracing::debug!(source = url, staged = %staged, "audio staged");
        Ok(staged)
    }
}

/// Speed up and recompress with `ffmpeg`, which must be on `PATH`.
async fn transcode(audio: &[u8], tempo: f32, bitrate: &str) -> Result<Vec<u8>> {
    let dir = std::env::temp_dir();
    let stem = format!("finsight-{}", uuid::Uuid::new_v4());
    let input = dir.join(format!("{}-in", stem));
    let output = dir.join(format!("{}-out.mp3", stem));

    tokio::fs::write(&input, audio).await?;
    let result = run_ffmpeg(&input, &output, tempo, bitrate).await;
    let bytes = match result {
        Ok(()) => tokio::fs::read(&output).await.map_err(Error::from),
        Err(e) => Err(e),
    };

    let _ = tokio::fs::remove_file(&input).await;
    let _ = tokio::fs::remove_file(&output).await;
    bytes
}

async fn run_ffmpeg(input: &Path, output: &Path, tempo: f32, bitrate: &str) -> Result<()> {
    let status = tokio::process::Command::new("ffmpeg")
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input)
        .arg("-filter:a")
        .arg(format!("atempo={}", tempo))
        .arg("-b:a")
        .arg(bitrate)
        .arg(output)
        .status()
        .await?;

    if !status.success() {
        return Err(Error::upstream("ffmpeg", format!("exited with {}", status)));
    }
    Ok(())
}

/// `<prefix><first 16 hex chars of sha256(url)>.mp3`
pub fn object_key(prefix: &str, url: &str) -> String {
    let digest = hex_sha256(url.as_bytes());
    format!("{}{}.mp3", prefix, &digest[..16])
}

// ============ AWS SigV4 ============

#[allow(clippy::too_many_arguments)]
fn authorization_header(
    creds: &AwsCredentials,
    method: &str,
    canonical_uri: &str,
    headers: &[(String, String)],
    payload_hash: &str,
    region: &str,
    date_stamp: &str,
    amz_date: &str,
) -> Result<String> {
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, date_stamp, region, "s3")?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    ))
}

/// Host header value: the custom endpoint's authority, or the virtual-hosted
/// bucket name.
fn s3_host(config: &StagingConfig) -> String {
    match &config.endpoint_url {
        Some(endpoint) => endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string(),
        None => format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
    }
}

fn endpoint_base(config: &StagingConfig) -> String {
    match &config.endpoint_url {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://{}", s3_host(config)),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::InvalidInput(format!("HMAC key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
