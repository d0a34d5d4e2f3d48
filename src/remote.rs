use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;

use crate::db::Dataset;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("remote store returned HTTP {0}")]
    Http(u16),
    #[error("remote payload could not be decoded: {0}")]
    Decode(String),
}

/// The remote tier. Every call may fail; callers fall back to the local tier.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` means the remote has nothing stored for this key.
    async fn fetch_dataset(
        &self,
        class_id: &str,
        dataset: Dataset,
    ) -> Result<Option<serde_json::Value>, RemoteError>;

    async fn upsert_dataset(
        &self,
        class_id: &str,
        dataset: Dataset,
        payload: &serde_json::Value,
    ) -> Result<(), RemoteError>;

    fn describe(&self) -> String;
}

/// Used when no remote is configured; every call reports unavailability.
#[derive(Debug, Default, Clone)]
pub struct OfflineRemote;

#[async_trait]
impl RemoteStore for OfflineRemote {
    async fn fetch_dataset(
        &self,
        _class_id: &str,
        _dataset: Dataset,
    ) -> Result<Option<serde_json::Value>, RemoteError> {
        Err(RemoteError::Unavailable("no remote configured".to_string()))
    }

    async fn upsert_dataset(
        &self,
        _class_id: &str,
        _dataset: Dataset,
        _payload: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable("no remote configured".to_string()))
    }

    fn describe(&self) -> String {
        "offline".to_string()
    }
}

/// JSON documents at `{base}/classes/{class}/datasets/{dataset}`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("invalid remote url {base_url}: {e}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("remote url {base_url} cannot carry a path");
        }
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build remote HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn dataset_url(&self, class_id: &str, dataset: Dataset) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Unavailable(format!("bad base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(["classes", class_id, "datasets", dataset.key()]);
        Ok(url)
    }
}

fn map_transport(e: reqwest::Error, timeout_hint: Duration) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout(timeout_hint)
    } else {
        RemoteError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_dataset(
        &self,
        class_id: &str,
        dataset: Dataset,
    ) -> Result<Option<serde_json::Value>, RemoteError> {
        let url = self.dataset_url(class_id, dataset)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport(e, self.timeout))?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            s if !s.is_success() => return Err(RemoteError::Http(s.as_u16())),
            _ => {}
        }
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn upsert_dataset(
        &self,
        class_id: &str,
        dataset: Dataset,
        payload: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        let url = self.dataset_url(class_id, dataset)?;
        let resp = self
            .client
            .put(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport(e, self.timeout))?;
        if !resp.status().is_success() {
            return Err(RemoteError::Http(resp.status().as_u16()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers each request by the class segment of its path:
    /// `missing` 404, `empty` 204, `broken` 500, `nothing` a `null` body,
    /// `stalled` never answers, anything else a one-tag catalog.
    async fn canned_server() -> HttpRemote {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Some(head) = read_request(&mut socket).await else {
                        return;
                    };
                    let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    let (status, body) = if path.contains("/missing/") {
                        ("404 Not Found", "")
                    } else if path.contains("/empty/") {
                        ("204 No Content", "")
                    } else if path.contains("/broken/") {
                        ("500 Internal Server Error", "")
                    } else if path.contains("/nothing/") {
                        ("200 OK", "null")
                    } else if path.contains("/stalled/") {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        return;
                    } else {
                        ("200 OK", r#"["Music: Pulse"]"#)
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        // Built by hand so proxy variables in the environment never intercept loopback.
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_millis(300))
            .build()
            .expect("client");
        HttpRemote {
            client,
            base_url: Url::parse(&format!("http://{addr}/api")).expect("url"),
            timeout: Duration::from_millis(300),
        }
    }

    /// Reads the request head and any `content-length` body; returns the head.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let body_len = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return Some(head);
            }
        }
    }

    #[tokio::test]
    async fn http_fetch_maps_statuses() {
        let remote = canned_server().await;
        assert_eq!(
            remote.fetch_dataset("missing", Dataset::Lessons).await,
            Ok(None)
        );
        assert_eq!(remote.fetch_dataset("empty", Dataset::Lessons).await, Ok(None));
        assert_eq!(
            remote.fetch_dataset("nothing", Dataset::Lessons).await,
            Ok(None)
        );
        assert_eq!(
            remote.fetch_dataset("broken", Dataset::Lessons).await,
            Err(RemoteError::Http(500))
        );
        assert_eq!(
            remote.fetch_dataset("LKG", Dataset::CurriculumTags).await,
            Ok(Some(serde_json::json!(["Music: Pulse"])))
        );
        assert!(matches!(
            remote.fetch_dataset("stalled", Dataset::Lessons).await,
            Err(RemoteError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn http_upsert_reports_non_success_status() {
        let remote = canned_server().await;
        let payload = serde_json::json!(["Music: Timbre"]);
        assert_eq!(
            remote
                .upsert_dataset("LKG", Dataset::CurriculumTags, &payload)
                .await,
            Ok(())
        );
        assert_eq!(
            remote
                .upsert_dataset("broken", Dataset::CurriculumTags, &payload)
                .await,
            Err(RemoteError::Http(500))
        );
    }

    #[test]
    fn dataset_urls_escape_class_names() {
        let remote = HttpRemote::new("http://127.0.0.1:9/api/", Duration::from_millis(50))
            .expect("remote");
        let url = remote
            .dataset_url("Reception A", Dataset::CurriculumTags)
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/api/classes/Reception%20A/datasets/curriculum_tags"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpRemote::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpRemote::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn offline_remote_always_fails() {
        let remote = OfflineRemote;
        assert!(matches!(
            remote.fetch_dataset("LKG", Dataset::Lessons).await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(remote
            .upsert_dataset("LKG", Dataset::Lessons, &serde_json::json!({}))
            .await
            .is_err());
    }
}
