//! Export job submission and status polling.
//!
//! The media backend renders ePub, mobile, and animation exports
//! asynchronously. Submitting returns a task ID; status is polled until the
//! job completes, fails, or the caller's deadline passes. The job payload is
//! opaque to this crate.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::retry::Sleeper;
use super::transport::{Transport, get_json, send_json};
use crate::error::{Error, Result};

/// Kind of export rendered by the media backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Epub,
    Mobile,
    Animation,
}

impl ExportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportKind::Epub => "epub",
            ExportKind::Mobile => "mobile",
            ExportKind::Animation => "animation",
        }
    }

    fn submit_endpoint(self) -> String {
        format!("/export/{}", self.as_str())
    }

    fn status_endpoint(self, task_id: &str) -> String {
        format!("/export/{}/status/{task_id}", self.as_str())
    }

    fn download_endpoint(self, task_id: &str) -> String {
        format!("/export/{}/download/{task_id}", self.as_str())
    }
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "epub" => Ok(ExportKind::Epub),
            "mobile" => Ok(ExportKind::Mobile),
            "animation" => Ok(ExportKind::Animation),
            other => Err(Error::config(format!("unknown export kind: {other}"))),
        }
    }
}

/// Job lifecycle as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct JobTicket {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

/// Full status reply. Extra backend fields are kept in `details`.
#[derive(Deserialize, Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

/// Shortest wait between two status polls; smaller intervals are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polling cadence for [`JobClient::wait_for_completion`].
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            deadline: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct JobClient {
    transport: Arc<dyn Transport>,
    auth_token: Option<String>,
}

impl JobClient {
    pub fn new(transport: Arc<dyn Transport>, auth_token: Option<String>) -> Self {
        Self {
            transport,
            auth_token,
        }
    }

    pub async fn submit(&self, kind: ExportKind, payload: &Value) -> Result<JobTicket> {
        let ticket: JobTicket = send_json(
            self.transport.as_ref(),
            &kind.submit_endpoint(),
            payload,
            self.auth_token.as_deref(),
        )
        .await?;
        info!("Submitted {kind} export: task {}", ticket.task_id);
        Ok(ticket)
    }

    pub async fn poll_status(&self, kind: ExportKind, task_id: &str) -> Result<JobReport> {
        get_json(
            self.transport.as_ref(),
            &kind.status_endpoint(task_id),
            self.auth_token.as_deref(),
        )
        .await
    }

    /// Fetch the rendered artifact of a completed job.
    pub async fn download(&self, kind: ExportKind, task_id: &str) -> Result<Vec<u8>> {
        let bytes = self
            .transport
            .get_bytes(&kind.download_endpoint(task_id), self.auth_token.as_deref())
            .await?;
        info!("Downloaded {kind} export {task_id}: {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Poll until the job reaches a terminal status.
    ///
    /// A `failed` job is returned as a report, not an error; the caller
    /// decides what failure means. Exceeding the deadline or cancelling
    /// returns an error. The deadline counts wall-clock time, including time
    /// spent inside each poll, as well as every wait handed to `sleeper`.
    pub async fn wait_for_completion(
        &self,
        kind: ExportKind,
        task_id: &str,
        poll: &PollConfig,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
    ) -> Result<JobReport> {
        let interval = poll.interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        let mut waited = Duration::ZERO;
        loop {
            let report = self.poll_status(kind, task_id).await?;
            if report.status.is_terminal() {
                debug!("Export {task_id} finished as {:?}", report.status);
                return Ok(report);
            }
            if started.elapsed().max(waited) >= poll.deadline {
                return Err(Error::provider(format!(
                    "export {task_id} still processing after {:?}",
                    poll.deadline
                )));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleeper.sleep(interval) => {}
            }
            waited += interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RecordingSleeper;
    use crate::api::transport::{BytesFuture, TransportFuture};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies to GETs from a queue; echoes a fixed ticket for POSTs.
    struct ScriptedBackend {
        statuses: Mutex<VecDeque<Value>>,
        gets: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(statuses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into()),
                gets: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for ScriptedBackend {
        fn post<'a>(
            &'a self,
            _endpoint: &'a str,
            _payload: &'a Value,
            _auth_token: Option<&'a str>,
        ) -> TransportFuture<'a> {
            Box::pin(async { Ok(json!({"success": true, "task_id": "t-1", "status": "processing"})) })
        }

        fn get<'a>(&'a self, endpoint: &'a str, _auth_token: Option<&'a str>) -> TransportFuture<'a> {
            self.gets.lock().unwrap().push(endpoint.to_string());
            let next = self.statuses.lock().unwrap().pop_front();
            Box::pin(async move { next.ok_or_else(|| Error::Network("no more statuses".into())) })
        }

        fn get_bytes<'a>(&'a self, endpoint: &'a str, _auth_token: Option<&'a str>) -> BytesFuture<'a> {
            self.gets.lock().unwrap().push(endpoint.to_string());
            Box::pin(async { Ok(b"PK\x03\x04epub".to_vec()) })
        }
    }

    #[tokio::test]
    async fn submit_returns_ticket() {
        let backend = ScriptedBackend::new(vec![]);
        let client = JobClient::new(backend, None);
        let ticket = client.submit(ExportKind::Epub, &json!({"title": "x"})).await.unwrap();
        assert_eq!(ticket.task_id, "t-1");
        assert_eq!(ticket.status, Some(JobStatus::Processing));
    }

    #[tokio::test]
    async fn waits_until_completed() {
        let backend = ScriptedBackend::new(vec![
            json!({"status": "processing"}),
            json!({"status": "processing"}),
            json!({"status": "completed", "download_url": "/files/t-1.epub"}),
        ]);
        let client = JobClient::new(backend.clone(), None);
        let sleeper = RecordingSleeper::new();
        let poll = PollConfig {
            interval: Duration::from_millis(500),
            deadline: Duration::from_secs(10),
        };

        let report = client
            .wait_for_completion(ExportKind::Epub, "t-1", &poll, &sleeper, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.details["download_url"], "/files/t-1.epub");
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(500); 2]);
        assert_eq!(backend.gets.lock().unwrap()[0], "/export/epub/status/t-1");
    }

    #[tokio::test]
    async fn deadline_stops_polling() {
        let backend = ScriptedBackend::new(vec![json!({"status": "processing"}); 10]);
        let client = JobClient::new(backend, None);
        let sleeper = RecordingSleeper::new();
        let poll = PollConfig {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(2),
        };

        let err = client
            .wait_for_completion(ExportKind::Mobile, "t-1", &poll, &sleeper, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still processing"));
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn failed_job_is_reported_not_raised() {
        let backend = ScriptedBackend::new(vec![json!({"status": "failed", "error": "bad cover"})]);
        let client = JobClient::new(backend, None);
        let report = client
            .wait_for_completion(
                ExportKind::Animation,
                "t-1",
                &PollConfig::default(),
                &RecordingSleeper::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("bad cover"));
    }

    #[tokio::test]
    async fn zero_interval_still_honors_deadline() {
        let backend = ScriptedBackend::new(vec![json!({"status": "processing"}); 1000]);
        let client = JobClient::new(backend.clone(), None);
        let poll = PollConfig {
            interval: Duration::ZERO,
            deadline: Duration::from_millis(50),
        };

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            client.wait_for_completion(
                ExportKind::Epub,
                "t-1",
                &poll,
                &crate::api::retry::TokioSleeper,
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("deadline was not honored");

        assert!(result.unwrap_err().to_string().contains("still processing"));
        // 100ms minimum interval against a 50ms deadline: one wait, two polls.
        assert_eq!(backend.gets.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_interval_is_raised_to_minimum() {
        let backend = ScriptedBackend::new(vec![
            json!({"status": "processing"}),
            json!({"status": "completed"}),
        ]);
        let client = JobClient::new(backend, None);
        let sleeper = RecordingSleeper::new();
        let poll = PollConfig {
            interval: Duration::ZERO,
            deadline: Duration::from_secs(10),
        };
        client
            .wait_for_completion(ExportKind::Epub, "t-1", &poll, &sleeper, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sleeper.delays(), vec![MIN_POLL_INTERVAL]);
    }

    #[tokio::test]
    async fn download_fetches_artifact_bytes() {
        let backend = ScriptedBackend::new(vec![]);
        let client = JobClient::new(backend.clone(), None);
        let bytes = client.download(ExportKind::Epub, "t-9").await.unwrap();
        assert!(bytes.starts_with(b"PK"));
        assert_eq!(backend.gets.lock().unwrap()[0], "/export/epub/download/t-9");
    }
}
