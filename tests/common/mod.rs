//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_textproc::{
    FinishReason, ModelClient, ModelClientError, ModelInvocation, ModelResponse, ProcessorConfig,
    TextProcessor, TokenUsage,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODEL: &str = "fake-model";

/// Route library logs to the test harness; `RUST_LOG=debug` shows retries.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Config with a 1 ms backoff so retry tests stay fast.
pub fn test_config() -> ProcessorConfig {
    ProcessorConfig::builder()
        .model(MODEL)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

pub fn reply(text: &str) -> Result<ModelResponse, ModelClientError> {
    reply_with(text, FinishReason::Stop)
}

pub fn reply_with(text: &str, finish_reason: FinishReason) -> Result<ModelResponse, ModelClientError> {
    Ok(ModelResponse {
        raw_text: text.to_string(),
        model: MODEL.to_string(),
        tokens: TokenUsage::new(20, 10),
        finish_reason,
    })
}

pub fn transport() -> Result<ModelResponse, ModelClientError> {
    Err(ModelClientError::Transport("connection refused".into()))
}

pub fn auth() -> Result<ModelResponse, ModelClientError> {
    Err(ModelClientError::Auth("401 invalid api key".into()))
}

/// Returns scripted responses in order; once the script runs out it keeps
/// answering with `fallback`.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<ModelResponse, ModelClientError>>>,
    fallback: String,
    calls: AtomicUsize,
    invocations: Mutex<Vec<ModelInvocation>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<ModelResponse, ModelClientError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: "ok".to_string(),
            calls: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn always(text: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: text.to_string(),
            calls: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<ModelInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelResponse, ModelClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(invocation.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| reply(&self.fallback))
    }

    fn model_id(&self) -> &str {
        MODEL
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

/// Routes on document content: text containing "FAIL" gets a transport
/// error, anything else "summary of <first line starting with doc->". Tracks the peak number
/// of concurrent calls.
pub struct RoutingClient {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl RoutingClient {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for RoutingClient {
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelResponse, ModelClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if invocation.user_content.contains("FAIL") {
            return transport();
        }
        let body = invocation
            .user_content
            .lines()
            .find(|l| l.starts_with("doc-"))
            .unwrap_or("summary");
        reply(&format!("summary of {body}"))
    }

    fn model_id(&self) -> &str {
        MODEL
    }

    fn backend_name(&self) -> &str {
        "routing"
    }
}

pub fn processor(client: Arc<dyn ModelClient>) -> TextProcessor {
    init_tracing();
    TextProcessor::new(test_config(), client)
}
