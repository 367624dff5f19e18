use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::BackendError;
use super::types::{AnalysisContext, BackendConfig};

/// Raw reply from the model backend. `content` should hold a JSON object
/// with `risk_score`, `classification`, `confidence`, `reasoning`,
/// `similar_examples` and `key_patterns`.
#[derive(Clone, Debug)]
pub struct BackendReply {
    pub content: String,
}

/// Contract the engine needs from a language-model backend
pub trait ScoringBackend: Send + Sync {
    fn score_risk(
        &self,
        prompt: &str,
        context: &AnalysisContext,
    ) -> Result<BackendReply, BackendError>;
}

/// Run a backend call on its own thread and give up after `timeout`.
///
/// The worker thread is detached on timeout; its late reply is dropped.
pub fn call_with_timeout(
    backend: &Arc<dyn ScoringBackend>,
    prompt: String,
    context: AnalysisContext,
    timeout: Duration,
) -> Result<BackendReply, BackendError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let backend = Arc::clone(backend);

    thread::Builder::new()
        .name("callguard-backend".to_string())
        .spawn(move || {
            let result = backend.score_risk(&prompt, &context);
            // Receiver is gone if the caller already timed out
            let _ = tx.send(result);
        })
        .map_err(|e| BackendError::Request(format!("failed to spawn backend worker: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
            log::warn!("Backend call exceeded {:?}, abandoning it", timeout);
            Err(BackendError::Timeout(timeout))
        }
        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(BackendError::Disconnected),
    }
}

/// Backend used when no endpoint is configured
pub struct OfflineBackend;

impl ScoringBackend for OfflineBackend {
    fn score_risk(
        &self,
        _prompt: &str,
        _context: &AnalysisContext,
    ) -> Result<BackendReply, BackendError> {
        Err(BackendError::Unavailable("no backend url configured".to_string()))
    }
}

/// HTTP client for a chat-style scoring endpoint
pub struct HttpBackend {
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    message: &'a str,
    context: &'a AnalysisContext,
}

#[derive(Deserialize)]
struct ScoreResponse {
    response: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            log::debug!("No backend API key found, calling {} unauthenticated", config.url);
        }

        Self {
            url: config.url.clone(),
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Pick the HTTP backend when a url is configured, otherwise offline
    pub fn from_config(config: &BackendConfig) -> Arc<dyn ScoringBackend> {
        if config.url.trim().is_empty() {
            log::info!("Model backend not configured, few-shot scoring disabled");
            Arc::new(OfflineBackend)
        } else {
            Arc::new(Self::new(config))
        }
    }
}

impl ScoringBackend for HttpBackend {
    fn score_risk(
        &self,
        prompt: &str,
        context: &AnalysisContext,
    ) -> Result<BackendReply, BackendError> {
        let body = serde_json::to_string(&ScoreRequest {
            message: prompt,
            context,
        })
        .map_err(|e| BackendError::Request(format!("failed to serialize request: {}", e)))?;

        log::debug!("Calling scoring backend at {}", self.url);

        let mut request = ureq::post(&self.url)
            .set("Content-Type", "application/json")
            .timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request.send_string(&body).map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                BackendError::Request(format!("backend returned HTTP {}", code))
            }
            ureq::Error::Transport(t) => BackendError::Request(t.to_string()),
        })?;

        let text = response
            .into_string()
            .map_err(|e| BackendError::Response(e.to_string()))?;
        let parsed: ScoreResponse =
            serde_json::from_str(&text).map_err(|e| BackendError::Response(e.to_string()))?;

        Ok(BackendReply {
            content: parsed.response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow(Duration);

    impl ScoringBackend for Slow {
        fn score_risk(&self, _: &str, _: &AnalysisContext) -> Result<BackendReply, BackendError> {
            thread::sleep(self.0);
            Ok(BackendReply {
                content: "{}".to_string(),
            })
        }
    }

    #[test]
    fn test_timeout_resolves_to_backend_error() {
        let backend: Arc<dyn ScoringBackend> = Arc::new(Slow(Duration::from_millis(500)));
        let result = call_with_timeout(
            &backend,
            "prompt".to_string(),
            AnalysisContext::new(),
            Duration::from_millis(20),
        );
        assert!(matches!(result, Err(BackendError::Timeout(_))));
    }

    #[test]
    fn test_fast_reply_passes_through() {
        let backend: Arc<dyn ScoringBackend> = Arc::new(Slow(Duration::from_millis(0)));
        let result = call_with_timeout(
            &backend,
            "prompt".to_string(),
            AnalysisContext::new(),
            Duration::from_secs(5),
        );
        assert_eq!(result.unwrap().content, "{}");
    }

    #[test]
    fn test_offline_backend_is_unavailable() {
        let backend = HttpBackend::from_config(&BackendConfig::default());
        let result = backend.score_risk("prompt", &AnalysisContext::new());
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }
}
