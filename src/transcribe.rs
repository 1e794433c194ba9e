//! Batch speech-to-text for podcast audio.
//!
//! One job is submitted per podcast source with every episode URL in it.
//! The job is polled on a fixed interval; the whole wait is bounded by
//! `timeout_per_file × files`. A job that fails or outlives its deadline is
//! a terminal error for that batch and is not resubmitted.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::TranscriptionConfig;
use crate::error::{credential, Error, Result};
use crate::http::send_with_retry;

const SERVICE: &str = "azure-speech";
const API_PATH: &str = "/speechtotext/v3.2/transcriptions";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe every URL in one batch. The map is keyed by audio URL;
    /// URLs the service produced nothing for are absent.
    async fn transcribe(&self, audio_urls: &[String]) -> Result<HashMap<String, String>>;
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(rename = "self")]
    self_url: String,
    status: String,
    #[serde(default)]
    links: Option<JobLinks>,
    #[serde(default)]
    properties: Value,
}

#[derive(Debug, Deserialize)]
struct JobLinks {
    files: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    values: Vec<ResultFile>,
    #[serde(rename = "@nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultFile {
    kind: String,
    links: FileLinks,
}

#[derive(Debug, Deserialize)]
struct FileLinks {
    #[serde(rename = "contentUrl")]
    content_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptFile {
    #[serde(default)]
    source: String,
    #[serde(rename = "combinedRecognizedPhrases", default)]
    combined: Vec<CombinedPhrase>,
}

#[derive(Debug, Deserialize)]
struct CombinedPhrase {
    #[serde(default)]
    lexical: String,
}

/// Azure Speech batch transcription (REST v3.2).
pub struct AzureBatchTranscriber {
    client: reqwest::Client,
    locale: String,
    region: Option<String>,
    endpoint_url: Option<String>,
    poll_interval: Duration,
    timeout_per_file: Duration,
    max_retries: u32,
}

impl AzureBatchTranscriber {
    pub fn new(config: &TranscriptionConfig, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            locale: config.locale.clone(),
            region: config.region.clone(),
            endpoint_url: config
                .endpoint_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout_per_file: Duration::from_secs(config.timeout_per_file_secs),
            max_retries,
        })
    }

    /// Override the polling cadence and per-file budget.
    pub fn with_timing(mut self, poll_interval: Duration, timeout_per_file: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout_per_file = timeout_per_file;
        self
    }

    fn endpoint(&self) -> Result<String> {
        if let Some(url) = &self.endpoint_url {
            return Ok(url.clone());
        }
        let region = match &self.region {
            Some(r) if !r.trim().is_empty() => r.clone(),
            _ => credential("AZURE_SPEECH_REGION")?,
        };
        Ok(format!("https://{}.api.cognitive.microsoft.com", region))
    }

    async fn create_job(&self, key: &str, audio_urls: &[String]) -> Result<Job> {
        let url = format!("{}{}", self.endpoint()?, API_PATH);
        let body = json!({
            "contentUrls": audio_urls,
            "locale": self.locale,
            "displayName": format!("finsight batch {}", chrono::Utc::now().format("%Y%m%dT%H%M%S")),
            "properties": {
                "wordLevelTimestampsEnabled": true,
                "punctuationMode": "Automatic",
            },
        });

        let response = send_with_retry(SERVICE, self.max_retries, || {
            self.client
                .post(&url)
                .header(KEY_HEADER, key)
                .json(&body)
                .send()
        })
        .await?;
        Ok(response.json().await?)
    }

    async fn job_status(&self, key: &str, job_url: &str) -> Result<Job> {
        let response = send_with_retry(SERVICE, self.max_retries, || {
            self.client.get(job_url).header(KEY_HEADER, key).send()
        })
        .await?;
        Ok(response.json().await?)
    }

    /// Poll until the job leaves `NotStarted`/`Running`.
    async fn wait_for(&self, key: &str, mut job: Job) -> Result<Job> {
        loop {
            match job.status.as_str() {
                "Succeeded" => return Ok(job),
                "Failed" => {
                    let message = job.properties["error"]["message"]
                        .as_str()
                        .unwrap_or("job failed")
                        .to_string();
                    return Err(Error::TranscriptionFailed {
                        job: job.self_url,
                        message,
                    });
                }
                status => {
                    tracing::debug!(job = %job.self_url, status, "transcription pending");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
            job = self.job_status(key, &job.self_url).await?;
        }
    }

    async fn collect_results(&self, key: &str, files_url: &str) -> Result<HashMap<String, String>> {
        let mut transcripts = HashMap::new();
        let mut next = Some(files_url.to_string());

        while let Some(url) = next.take() {
            let response = send_with_retry(SERVICE, self.max_retries, || {
                self.client.get(&url).header(KEY_HEADER, key).send()
            })
            .await?;
            let list: FileList = response.json().await?;

            for file in list.values.into_iter().filter(|f| f.kind == "Transcription") {
                // Content URLs are pre-signed; no subscription key.
                match self.fetch_transcript(&file.links.content_url).await {
                    Ok(Some((source, text))) => {
                        transcripts.insert(source, text);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(url = %file.links.content_url, error = %e, "transcript fetch failed");
                    }
                }
            }
            next = list.next_link;
        }

        Ok(transcripts)
    }

    async fn fetch_transcript(&self, content_url: &str) -> Result<Option<(String, String)>> {
        let response = send_with_retry(SERVICE, self.max_retries, || {
            self.client.get(content_url).send()
        })
        .await?;
        let file: TranscriptFile = response.json().await?;
        let text = file
            .combined
            .into_iter()
            .next()
            .map(|p| p.lexical)
            .unwrap_or_default();
        if file.source.is_empty() || text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some((file.source, text)))
    }
}

/// Overall wait for a batch, saturating rather than overflowing.
fn job_deadline(per_file: Duration, files: usize) -> Duration {
    u32::try_from(files)
        .ok()
        .and_then(|n| per_file.checked_mul(n))
        .unwrap_or(Duration::MAX)
}

#[async_trait]
impl Transcriber for AzureBatchTranscriber {
    async fn transcribe(&self, audio_urls: &[String]) -> Result<HashMap<String, String>> {
        if audio_urls.is_empty() {
            return Ok(HashMap::new());
        }
        let key = credential("AZURE_SPEECH_API_KEY")?;

        let job = self.create_job(&key, audio_urls).await?;
        let job_url = job.self_url.clone();
        tracing::info!(job = %job_url, files = audio_urls.len(), "transcription job created");

        let deadline = job_deadline(self.timeout_per_file, audio_urls.len());
        let job = match tokio::time::timeout(deadline, self.wait_for(&key, job)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::TranscriptionTimeout {
                    job: job_url,
                    secs: deadline.as_secs(),
                })
            }
        };

        let files_url = job
            .links
            .map(|l| l.files)
            .ok_or_else(|| Error::contract(SERVICE, "succeeded job has no files link"))?;
        let transcripts = self.collect_results(&key, &files_url).await?;
        tracing::info!(job = %job_url, transcribed = transcripts.len(), "transcription job finished");
        Ok(transcripts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcriber(server: &MockServer) -> AzureBatchTranscriber {
        std::env::set_var("AZURE_SPEECH_API_KEY", "speech-key");
        let config = TranscriptionConfig {
            endpoint_url: Some(server.uri()),
            ..TranscriptionConfig::default()
        };
        AzureBatchTranscriber::new(&config, 0)
            .unwrap()
            .with_timing(Duration::from_millis(20), Duration::from_millis(300))
    }

    fn job(server: &MockServer, status: &str) -> Value {
        json!({
            "self": format!("{}{}/job-1", server.uri(), API_PATH),
            "status": status,
            "links": { "files": format!("{}{}/job-1/files", server.uri(), API_PATH) },
            "properties": { "error": { "message": "audio unreadable" } }
        })
    }

    #[tokio::test]
    async fn polls_until_succeeded_and_maps_by_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .and(header(KEY_HEADER, "speech-key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(job(&server, "NotStarted")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/job-1", API_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(job(&server, "Running")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/job-1", API_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(job(&server, "Succeeded")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/job-1/files", API_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    { "kind": "TranscriptionReport", "links": { "contentUrl": format!("{}/report", server.uri()) } },
                    { "kind": "Transcription", "links": { "contentUrl": format!("{}/t1", server.uri()) } }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "source": "https://cdn/ep1.mp3",
                "combinedRecognizedPhrases": [{ "lexical": "the fed held rates" }]
            })))
            .mount(&server)
            .await;

        let t = transcriber(&server);
        let out = t
            .transcribe(&["https://cdn/ep1.mp3".to_string()])
            .await
            .unwrap();
        assert_eq!(out.get("https://cdn/ep1.mp3").unwrap(), "the fed held rates");
    }

    #[tokio::test]
    async fn failed_job_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(job(&server, "Failed")))
            .mount(&server)
            .await;

        let err = transcriber(&server)
            .transcribe(&["https://cdn/ep1.mp3".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TranscriptionFailed { ref message, .. } if message == "audio unreadable"));
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn stuck_job_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(job(&server, "Running")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/job-1", API_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(job(&server, "Running")))
            .mount(&server)
            .await;

        let err = transcriber(&server)
            .transcribe(&["https://cdn/ep1.mp3".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TranscriptionTimeout { .. }));
    }

    #[test]
    fn deadline_scales_and_saturates() {
        assert_eq!(job_deadline(Duration::from_secs(1200), 3), Duration::from_secs(3600));
        assert_eq!(
            job_deadline(Duration::from_secs(u64::MAX / 2), 3),
            Duration::MAX
        );
    }

    #[tokio::test]
    async fn huge_per_file_timeout_does_not_overflow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(job(&server, "Failed")))
            .mount(&server)
            .await;

        let urls: Vec<String> = (1..=3).map(|i| format!("https://cdn/ep{}.mp3", i)).collect();
        let err = transcriber(&server)
            .with_timing(Duration::from_millis(10), Duration::from_secs(u64::MAX / 2))
            .transcribe(&urls)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TranscriptionFailed { .. }));
    }

    #[tokio::test]
    async fn empty_batch_submits_nothing() {
        let server = MockServer::start().await;
        let out = transcriber(&server).transcribe(&[]).await.unwrap();
        assert!(out.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
