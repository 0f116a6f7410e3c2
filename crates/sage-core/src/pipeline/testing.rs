//! Scripted completion backend for pipeline tests
//!
//! Replies are keyed by the system prompt, so each persona stage can be
//! scripted independently. Every call and every stream end is written to a
//! shared journal that tests can also append to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ai::{ApiKey, CompletionBackend, CompletionRequest, FinishReason, StreamPart};
use crate::error::UpstreamError;

#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Whole reply, streamed as one fragment
    Reply(String),
    /// Streamed fragment by fragment; blocking calls get the concatenation
    Fragments(Vec<String>),
    /// Streams the fragments, then a terminal error
    BreakAfter {
        fragments: Vec<String>,
        detail: String,
    },
    /// Streams the fragments, then closes without a finish
    Truncated(Vec<String>),
    /// Fails before any output
    Fail(UpstreamError),
    /// Never completes
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedCall {
    pub system: String,
    pub user: String,
    pub streaming: bool,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: HashMap<String, Script>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, system: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(system.into(), script);
        self
    }

    pub fn reply(self, system: impl Into<String>, text: impl Into<String>) -> Self {
        self.script(system, Script::Reply(text.into()))
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, system: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.system == system)
            .count()
    }

    pub fn journal(&self) -> Arc<Mutex<Vec<String>>> {
        self.journal.clone()
    }

    fn record(&self, request: &CompletionRequest, streaming: bool) -> Script {
        self.calls.lock().unwrap().push(RecordedCall {
            system: request.system.clone(),
            user: request.user.clone(),
            streaming,
        });
        self.journal
            .lock()
            .unwrap()
            .push(format!("call:{}", request.system));
        self.scripts
            .get(&request.system)
            .cloned()
            .unwrap_or_else(|| {
                Script::Fail(UpstreamError::Api {
                    status: 404,
                    message: format!("no script for system prompt {:?}", request.system),
                    retry_after: None,
                })
            })
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
        _credentials: &ApiKey,
    ) -> Result<String, UpstreamError> {
        let script = self.record(request, false);
        self.pause().await;
        match script {
            Script::Reply(text) => Ok(text),
            Script::Fragments(fragments) => Ok(fragments.concat()),
            Script::BreakAfter { detail, .. } => Err(UpstreamError::Stream(detail)),
            Script::Truncated(_) => Err(UpstreamError::Stream(
                "stream ended before completion".to_string(),
            )),
            Script::Fail(err) => Err(err),
            Script::Hang => std::future::pending().await,
        }
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        _credentials: &ApiKey,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, UpstreamError> {
        let script = self.record(request, true);
        self.pause().await;
        let (fragments, last) = match script {
            Script::Reply(text) => (vec![text], Some(finish())),
            Script::Fragments(fragments) => (fragments, Some(finish())),
            Script::BreakAfter { fragments, detail } => {
                (fragments, Some(StreamPart::Error { detail }))
            }
            Script::Truncated(fragments) => (fragments, None),
            Script::Fail(err) => return Err(err),
            Script::Hang => return std::future::pending().await,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let journal = self.journal.clone();
        let system = request.system.clone();
        tokio::spawn(async move {
            for delta in fragments {
                if tx.send(StreamPart::TextDelta { delta }).is_err() {
                    return;
                }
                tokio::task::yield_now().await;
            }
            if let Some(last) = last {
                let _ = tx.send(last);
            }
            journal.lock().unwrap().push(format!("stream-end:{}", system));
        });
        Ok(rx)
    }
}

fn finish() -> StreamPart {
    StreamPart::Finish {
        reason: FinishReason::Stop,
    }
}
