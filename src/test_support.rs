//! Shared test doubles: scripted adapters and a manual clock. HTTP
//! endpoints are mocked with `wiremock` in the adapter tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::adapter::{GenerateOptions, ModelAdapter, ModelResponse, QualityScore, RequestContext};
use crate::transport::Clock;
use crate::types::{Result, RouteError};

// =============================================================================
// Mock Adapter
// =============================================================================

/// One scripted reply
#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Content { text: String, score: Option<f64> },
    Transport(String),
    Provider(String),
    Hang,
}

impl MockReply {
    pub(crate) fn text(text: &str) -> Self {
        Self::Content {
            text: text.to_string(),
            score: None,
        }
    }

    pub(crate) fn scored(text: &str, score: f64) -> Self {
        Self::Content {
            text: text.to_string(),
            score: Some(score),
        }
    }
}

/// Adapter returning scripted replies; the last reply repeats once the
/// script runs out.
pub(crate) struct MockAdapter {
    name: String,
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    healthy: AtomicBool,
    init_ok: bool,
    cleanup_fails: bool,
    pub(crate) generate_calls: AtomicUsize,
    pub(crate) health_calls: AtomicUsize,
    pub(crate) init_calls: AtomicUsize,
    pub(crate) cleanup_calls: AtomicUsize,
}

impl MockAdapter {
    pub(crate) fn new(name: &str, reply: MockReply) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: reply,
            healthy: AtomicBool::new(true),
            init_ok: true,
            cleanup_fails: false,
            generate_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(name: &str) -> Self {
        Self::new(name, MockReply::Transport(format!("{} unreachable", name)))
    }

    pub(crate) fn with_script(self, replies: Vec<MockReply>) -> Self {
        *self.script.lock().unwrap() = replies.into();
        self
    }

    pub(crate) fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        Self {
            init_ok: false,
            ..self
        }
    }

    pub(crate) fn with_failing_cleanup(self) -> Self {
        Self {
            cleanup_fails: true,
            ..self
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ModelAdapter for MockAdapter {
    async fn initialize(&self) -> bool {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.init_ok
    }

    async fn generate(
        &self,
        _prompt: &str,
        _context: &RequestContext,
        _options: &GenerateOptions,
    ) -> Result<ModelResponse> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_reply() {
            MockReply::Content { text, score } => {
                let response = ModelResponse::new(text, &self.name, "mock-model");
                match score {
                    Some(s) => Ok(response.with_score(QualityScore::new(s)?)),
                    None => Ok(response),
                }
            }
            MockReply::Transport(message) => Err(RouteError::transport(&self.name, message)),
            MockReply::Provider(message) => Err(RouteError::provider(&self.name, message)),
            MockReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RouteError::transport(&self.name, "woke up"))
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        if self.cleanup_fails {
            Err(RouteError::transport(&self.name, "cleanup failed"))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
