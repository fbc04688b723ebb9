//! HTTP client for the sandbox provider API.
//!
//! Endpoints used:
//! - `POST /sandboxes` create a sandbox
//! - `GET /sandboxes/{id}` look up a running sandbox
//! - `DELETE /sandboxes/{id}` kill it
//! - `POST /sandboxes/{id}/exec` run a script and wait for the result
//! - `POST /sandboxes/{id}/exec/stream` run a script, newline-delimited JSON
//!   frames as output arrives

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{
    CreateSandbox, ExecOutput, OutputLine, ProviderError, SandboxHandle, SandboxProvider,
};

/// Extra time granted to the HTTP request beyond the command timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(5);

/// Upper bound for create, connect and kill requests.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecRequest<'a> {
    script: &'a str,
    timeout_secs: u64,
}

/// A frame of the streaming exec endpoint.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamFrame {
    Stdout { line: String },
    Stderr { line: String },
    #[serde(rename_all = "camelCase")]
    Exit { exit_code: i32 },
}

/// HTTP client for the sandbox provider.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpProvider {
    /// Create with explicit configuration.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    /// Build a request with optional auth header.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = req.send().await.map_err(|e| map_transport(e, timeout))?;
        check_status(response).await
    }

    /// Handle response, converting HTTP errors to ProviderError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(e.to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound(body)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Unauthorized),
        StatusCode::SERVICE_UNAVAILABLE => Err(ProviderError::Unavailable(body)),
        _ => Err(ProviderError::Server(format!("{}: {}", status, body))),
    }
}

fn map_transport(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Http(error)
    }
}

#[async_trait]
impl SandboxProvider for HttpProvider {
    async fn create(&self, request: &CreateSandbox) -> Result<SandboxHandle, ProviderError> {
        if self.api_key.is_none() {
            return Err(ProviderError::Unauthorized);
        }
        let req = self
            .request(reqwest::Method::POST, "/sandboxes")
            .timeout(CONTROL_TIMEOUT)
            .json(request);
        let response = self.send(req, CONTROL_TIMEOUT).await?;
        self.handle_response(response).await
    }

    async fn connect(&self, id: &str) -> Result<SandboxHandle, ProviderError> {
        let req = self
            .request(reqwest::Method::GET, &format!("/sandboxes/{}", id))
            .timeout(CONTROL_TIMEOUT);
        let response = self.send(req, CONTROL_TIMEOUT).await?;
        self.handle_response(response).await
    }

    async fn kill(&self, handle: &SandboxHandle) -> Result<(), ProviderError> {
        let req = self
            .request(reqwest::Method::DELETE, &format!("/sandboxes/{}", handle.id))
            .timeout(CONTROL_TIMEOUT);
        self.send(req, CONTROL_TIMEOUT).await?;
        Ok(())
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        script: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, ProviderError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &format!("/sandboxes/{}/exec", handle.id),
            )
            .timeout(timeout + REQUEST_GRACE)
            .json(&ExecRequest {
                script,
                timeout_secs: timeout.as_secs(),
            });
        let response = self.send(req, timeout).await?;
        self.handle_response(response).await
    }

    async fn exec_streaming(
        &self,
        handle: &SandboxHandle,
        script: &str,
        timeout: Duration,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ExecOutput, ProviderError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &format!("/sandboxes/{}/exec/stream", handle.id),
            )
            .timeout(timeout + REQUEST_GRACE)
            .json(&ExecRequest {
                script,
                timeout_secs: timeout.as_secs(),
            });
        let response = self.send(req, timeout).await?;

        let mut body = response.bytes_stream();
        let mut buffer = FrameBuffer::default();
        let mut output = ExecOutput::default();
        let mut exit_code = None;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| map_transport(e, timeout))?;
            for frame in buffer.push(&chunk)? {
                match frame {
                    StreamFrame::Stdout { line } => {
                        output.stdout.push_str(&line);
                        output.stdout.push('\n');
                        let _ = lines.send(OutputLine::stdout(line));
                    }
                    StreamFrame::Stderr { line } => {
                        output.stderr.push_str(&line);
                        output.stderr.push('\n');
                        let _ = lines.send(OutputLine::stderr(line));
                    }
                    StreamFrame::Exit { exit_code: code } => exit_code = Some(code),
                }
            }
        }

        output.exit_code = exit_code.ok_or_else(|| {
            ProviderError::Protocol("exec stream closed without an exit frame".to_string())
        })?;
        Ok(output)
    }
}

/// Accumulates bytes until complete newline-terminated frames are available.
#[derive(Debug, Default)]
struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamFrame>, ProviderError> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame = serde_json::from_str(line)
                .map_err(|e| ProviderError::Protocol(format!("bad frame {:?}: {}", line, e)))?;
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_waits_for_newline() {
        let mut buffer = FrameBuffer::default();
        let first = buffer.push(br#"{"type":"stdout","li"#).unwrap();
        assert!(first.is_empty());

        let second = buffer.push(b"ne\":\"added 1 package\"}\n{\"type\":\"exit\",").unwrap();
        assert_eq!(
            second,
            vec![StreamFrame::Stdout {
                line: "added 1 package".to_string()
            }]
        );

        let third = buffer.push(b"\"exitCode\":0}\n").unwrap();
        assert_eq!(third, vec![StreamFrame::Exit { exit_code: 0 }]);
    }

    #[test]
    fn frame_buffer_rejects_garbage() {
        let mut buffer = FrameBuffer::default();
        assert!(matches!(
            buffer.push(b"not json\n"),
            Err(ProviderError::Protocol(_))
        ));
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let provider = HttpProvider::new("http://localhost:9000/v1/", None);
        assert_eq!(provider.base_url, "http://localhost:9000/v1");
    }

    #[tokio::test]
    async fn create_without_key_is_unauthorized() {
        let provider = HttpProvider::new("http://127.0.0.1:9", None);
        let result = provider
            .create(&CreateSandbox {
                template: "node".to_string(),
                timeout_secs: 60,
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Unauthorized)));
    }
}
