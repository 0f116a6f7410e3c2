//! Chain-of-thought orchestrator
//!
//! Runs stage 1 to completion, builds the stage-2 prompt from the full
//! reasoning chain, then runs stage 2. Each stage is bounded by the caller's
//! cancellation handle and the optional per-stage timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::cancellation::Cancellation;
use super::prompt::{build_stage1_prompt, build_stage2_prompt};
use super::state::{CotRun, CotState};
use super::Stage;
use crate::ai::{ApiKey, CompletionBackend, CompletionRequest, StreamPart};
use crate::constants;
use crate::error::{CotError, UpstreamError};
use crate::persona::{Persona, PersonaRegistry};

/// One generation: a question for one persona
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    /// Persona registry key
    pub persona: String,
    pub credentials: ApiKey,
}

impl GenerationRequest {
    pub fn new(
        question: impl Into<String>,
        persona: impl Into<String>,
        credentials: ApiKey,
    ) -> Self {
        Self {
            question: question.into(),
            persona: persona.into(),
            credentials,
        }
    }
}

/// Final text of both stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub reasoning_chain: String,
    pub advice: String,
}

/// Decoding and scheduling options shared by both stages
#[derive(Debug, Clone, PartialEq)]
pub struct CotOptions {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Applied to each stage separately. `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
    /// Personas evaluated at once in comparison runs
    pub max_parallel: usize,
}

impl Default for CotOptions {
    fn default() -> Self {
        Self {
            model: constants::ai::DEFAULT_MODEL.to_string(),
            max_tokens: constants::ai::MAX_OUTPUT_TOKENS,
            temperature: constants::ai::TEMPERATURE,
            stage_timeout: Some(constants::pipeline::STAGE_TIMEOUT),
            max_parallel: constants::pipeline::MAX_PARALLEL_PERSONAS,
        }
    }
}

/// Sequences the two stages over a completion backend
#[derive(Clone)]
pub struct CotOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    registry: Arc<PersonaRegistry>,
    options: CotOptions,
}

impl CotOrchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        registry: Arc<PersonaRegistry>,
        options: CotOptions,
    ) -> Self {
        Self {
            backend,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<PersonaRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &CotOptions {
        &self.options
    }

    /// Run both stages with incremental delivery.
    ///
    /// `on_stage1` receives every reasoning fragment, then `on_stage2` every
    /// advice fragment. No stage-2 fragment is delivered, and stage 2 is not
    /// started, before the stage-1 stream is exhausted.
    pub async fn run_streaming<F1, F2>(
        &self,
        request: &GenerationRequest,
        cancel: &Cancellation,
        mut on_stage1: F1,
        mut on_stage2: F2,
    ) -> Result<GenerationResult, CotError>
    where
        F1: FnMut(&str),
        F2: FnMut(&str),
    {
        let persona = self.prepare(request)?;
        let credentials = &request.credentials;
        let mut run = CotRun::new(&persona.key);
        let start = Instant::now();
        info!(persona = %persona.key, mode = "streaming", "CoT run start");

        run.advance(CotState::Stage1Running);
        let stage1 = self.stage_request(
            &persona.stage1_system,
            build_stage1_prompt(&request.question, &persona),
        );
        let reasoning_chain = match self
            .guarded(cancel, self.stream_stage(&stage1, credentials, &mut on_stage1))
            .await
        {
            Ok(text) => text,
            Err(source) => return Err(fail(&mut run, Stage::Reasoning, None, source)),
        };
        run.advance(CotState::Stage1Done);

        run.advance(CotState::Stage2Running);
        let stage2 = self.stage_request(
            &persona.stage2_system,
            build_stage2_prompt(&request.question, &reasoning_chain, &persona),
        );
        let advice = match self
            .guarded(cancel, self.stream_stage(&stage2, credentials, &mut on_stage2))
            .await
        {
            Ok(text) => text,
            Err(source) => {
                return Err(fail(&mut run, Stage::Advice, Some(reasoning_chain), source))
            }
        };
        run.advance(CotState::Stage2Done);

        info!(
            persona = %persona.key,
            reasoning_chars = reasoning_chain.len(),
            advice_chars = advice.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "CoT run complete"
        );
        Ok(GenerationResult {
            reasoning_chain,
            advice,
        })
    }

    /// Run both stages with whole-response calls
    pub async fn run_batch(
        &self,
        request: &GenerationRequest,
        cancel: &Cancellation,
    ) -> Result<GenerationResult, CotError> {
        let persona = self.prepare(request)?;
        let credentials = &request.credentials;
        let mut run = CotRun::new(&persona.key);
        let start = Instant::now();
        info!(persona = %persona.key, mode = "batch", "CoT run start");

        run.advance(CotState::Stage1Running);
        let stage1 = self.stage_request(
            &persona.stage1_system,
            build_stage1_prompt(&request.question, &persona),
        );
        let reasoning_chain = match self
            .guarded(cancel, self.backend.complete(&stage1, credentials))
            .await
        {
            Ok(text) => text,
            Err(source) => return Err(fail(&mut run, Stage::Reasoning, None, source)),
        };
        run.advance(CotState::Stage1Done);

        run.advance(CotState::Stage2Running);
        let stage2 = self.stage_request(
            &persona.stage2_system,
            build_stage2_prompt(&request.question, &reasoning_chain, &persona),
        );
        let advice = match self
            .guarded(cancel, self.backend.complete(&stage2, credentials))
            .await
        {
            Ok(text) => text,
            Err(source) => {
                return Err(fail(&mut run, Stage::Advice, Some(reasoning_chain), source))
            }
        };
        run.advance(CotState::Stage2Done);

        info!(
            persona = %persona.key,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "CoT run complete"
        );
        Ok(GenerationResult {
            reasoning_chain,
            advice,
        })
    }

    /// Run the same question for several personas concurrently.
    ///
    /// Results come back in the order of `keys`. Each persona runs its own
    /// batch generation under a child of `cancel`.
    pub async fn run_comparison(
        &self,
        question: &str,
        keys: &[String],
        credentials: &ApiKey,
        cancel: &Cancellation,
    ) -> Vec<(String, Result<GenerationResult, CotError>)> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        info!(
            count = keys.len(),
            concurrency = self.options.max_parallel,
            "CoT comparison start"
        );

        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            let sem = semaphore.clone();
            let orchestrator = self.clone();
            let child = cancel.child();
            let request = GenerationRequest::new(question, key.clone(), credentials.clone());

            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(persona = %request.persona, error = %e, "CoT: failed to acquire permit");
                        return Err(CotError::Aborted(format!("semaphore error: {}", e)));
                    }
                };
                debug!(persona = %request.persona, "CoT: got permit");
                orchestrator.run_batch(&request, &child).await
            });
            handles.push((key.clone(), handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(persona = %key, "CoT task panicked: {}", e);
                    Err(CotError::Aborted(e.to_string()))
                }
            };
            results.push((key, result));
        }

        info!(
            succeeded = results.iter().filter(|(_, r)| r.is_ok()).count(),
            total = results.len(),
            "CoT comparison complete"
        );
        results
    }

    /// Validate the request before any upstream call: question first, then
    /// persona key.
    fn prepare(&self, request: &GenerationRequest) -> Result<Arc<Persona>, CotError> {
        if request.question.trim().is_empty() {
            return Err(CotError::EmptyQuestion);
        }
        self.registry.lookup(&request.persona)
    }

    fn stage_request(&self, system: &str, user: String) -> CompletionRequest {
        CompletionRequest {
            model: self.options.model.clone(),
            system: system.to_string(),
            user,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        }
    }

    /// Bound a stage by cancellation and the stage timeout.
    ///
    /// Cancellation is checked first, so a cancelled handle never starts the
    /// stage.
    async fn guarded<T, Fut>(&self, cancel: &Cancellation, stage: Fut) -> Result<T, UpstreamError>
    where
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let bounded = async {
            match self.options.stage_timeout {
                Some(limit) => tokio::time::timeout(limit, stage)
                    .await
                    .unwrap_or(Err(UpstreamError::Timeout(limit))),
                None => stage.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            result = bounded => result,
        }
    }

    /// Drain one streaming completion, forwarding every fragment.
    async fn stream_stage<F>(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
        on_fragment: &mut F,
    ) -> Result<String, UpstreamError>
    where
        F: FnMut(&str),
    {
        let mut rx = self.backend.complete_streaming(request, credentials).await?;
        let mut text = String::new();
        let mut finished = false;
        while let Some(part) = rx.recv().await {
            match part {
                StreamPart::TextDelta { delta } => {
                    on_fragment(&delta);
                    text.push_str(&delta);
                }
                StreamPart::Finish { reason } => {
                    debug!("Stage stream finished: {}", reason);
                    finished = true;
                }
                StreamPart::Error { detail } => return Err(UpstreamError::Stream(detail)),
            }
        }
        if !finished {
            warn!("Stage stream closed after {} chars without finishing", text.len());
            return Err(UpstreamError::Stream(
                "stream ended before completion".to_string(),
            ));
        }
        Ok(text)
    }
}

fn fail(
    run: &mut CotRun,
    stage: Stage,
    reasoning_chain: Option<String>,
    source: UpstreamError,
) -> CotError {
    run.fail(stage, &source);
    warn!("CoT {} failed: {}", stage, source);
    CotError::Upstream {
        stage,
        reasoning_chain,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{Script, ScriptedBackend};
    use std::sync::Mutex;

    const LAOZI: &str = "老子式（道家）";
    const KONGZI: &str = "孔子式（儒家）";
    const GUANZHONG: &str = "管仲式（法家/務實）";
    const QUESTION: &str = "如何平衡工作與生活？";

    fn registry() -> Arc<PersonaRegistry> {
        Arc::new(PersonaRegistry::builtin().unwrap())
    }

    fn persona(key: &str) -> Arc<Persona> {
        registry().lookup(key).unwrap()
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> CotOrchestrator {
        CotOrchestrator::new(backend, registry(), CotOptions::default())
    }

    fn request(question: &str, key: &str) -> GenerationRequest {
        GenerationRequest::new(question, key, ApiKey::new("test-key"))
    }

    fn laozi_backend(stage1: Script, stage2: Script) -> ScriptedBackend {
        let laozi = persona(LAOZI);
        ScriptedBackend::new()
            .script(laozi.stage1_system.clone(), stage1)
            .script(laozi.stage2_system.clone(), stage2)
    }

    fn fragments(parts: &[&str]) -> Script {
        Script::Fragments(parts.iter().map(|p| p.to_string()).collect())
    }

    #[tokio::test]
    async fn test_batch_returns_both_stages() {
        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::Reply("A1".into()),
        ));
        let result = orchestrator(backend.clone())
            .run_batch(&request(QUESTION, LAOZI), &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(
            result,
            GenerationResult {
                reasoning_chain: "R1".into(),
                advice: "A1".into(),
            }
        );
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.streaming));
        assert!(calls[0].user.contains(QUESTION));
        assert!(calls[1].user.contains("R1"));
    }

    #[tokio::test]
    async fn test_streaming_matches_batch() {
        let make = || {
            Arc::new(laozi_backend(
                fragments(&["Step 1: ", "無為", "\nStep 2: 順勢"]),
                fragments(&["建議一", "、", "總結"]),
            ))
        };
        let batch = orchestrator(make())
            .run_batch(&request(QUESTION, LAOZI), &Cancellation::new())
            .await
            .unwrap();

        let mut seen1 = Vec::new();
        let mut seen2 = Vec::new();
        let streamed = orchestrator(make())
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                |f| seen1.push(f.to_string()),
                |f| seen2.push(f.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(streamed, batch);
        assert_eq!(seen1, vec!["Step 1: ", "無為", "\nStep 2: 順勢"]);
        assert_eq!(seen1.concat(), streamed.reasoning_chain);
        assert_eq!(seen2.concat(), streamed.advice);
    }

    #[tokio::test]
    async fn test_stage2_waits_for_stage1_exhaustion() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(
            fragments(&["a", "b", "c", "d"]),
            fragments(&["x", "y"]),
        ));
        let journal = backend.journal();
        let j1 = journal.clone();
        let j2 = journal.clone();

        orchestrator(backend.clone())
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                move |f| j1.lock().unwrap().push(format!("s1:{}", f)),
                move |f| j2.lock().unwrap().push(format!("s2:{}", f)),
            )
            .await
            .unwrap();

        let events = journal.lock().unwrap().clone();
        let position = |needle: &str| events.iter().position(|e| e == needle).unwrap();
        let stage1_end = position(&format!("stream-end:{}", laozi.stage1_system));
        let stage2_call = position(&format!("call:{}", laozi.stage2_system));
        assert!(position("s1:d") < stage2_call);
        assert!(stage1_end < stage2_call);
        assert!(stage2_call < position("s2:x"));
        assert!(events
            .iter()
            .take(stage2_call)
            .all(|e| !e.starts_with("s2:")));
    }

    #[tokio::test]
    async fn test_empty_question_makes_no_calls() {
        for question in ["", "   ", "\n\t "] {
            let backend = Arc::new(laozi_backend(
                Script::Reply("R1".into()),
                Script::Reply("A1".into()),
            ));
            let orch = orchestrator(backend.clone());
            let batch = orch
                .run_batch(&request(question, LAOZI), &Cancellation::new())
                .await;
            assert!(matches!(batch, Err(CotError::EmptyQuestion)));
            let streamed = orch
                .run_streaming(&request(question, LAOZI), &Cancellation::new(), |_| {}, |_| {})
                .await;
            assert!(matches!(streamed, Err(CotError::EmptyQuestion)));
            assert_eq!(backend.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_empty_question_checked_before_persona() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = orchestrator(backend)
            .run_batch(&request(" ", "X"), &Cancellation::new())
            .await;
        assert!(matches!(result, Err(CotError::EmptyQuestion)));
    }

    #[tokio::test]
    async fn test_unknown_persona_makes_no_calls() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = orchestrator(backend.clone())
            .run_batch(&request(QUESTION, "X"), &Cancellation::new())
            .await;
        match result {
            Err(CotError::UnknownPersona(key)) => assert_eq!(key, "X"),
            other => panic!("Expected UnknownPersona, got {:?}", other),
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stage1_failure_skips_stage2() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(
            Script::Fail(UpstreamError::Transport("connection refused".into())),
            Script::Reply("A1".into()),
        ));
        let err = orchestrator(backend.clone())
            .run_batch(&request(QUESTION, LAOZI), &Cancellation::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Reasoning));
        assert_eq!(err.reasoning_chain(), None);
        assert!(matches!(
            err.upstream(),
            Some(UpstreamError::Transport(_))
        ));
        assert_eq!(backend.calls_for(&laozi.stage1_system), 1);
        assert_eq!(backend.calls_for(&laozi.stage2_system), 0);
    }

    #[tokio::test]
    async fn test_streaming_stage1_failure_skips_stage2() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(
            Script::Fail(UpstreamError::Authentication("Invalid API Key".into())),
            Script::Reply("A1".into()),
        ));
        let mut stage2_fragments = 0;
        let err = orchestrator(backend.clone())
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                |_| {},
                |_| stage2_fragments += 1,
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Reasoning));
        assert_eq!(stage2_fragments, 0);
        assert_eq!(backend.calls_for(&laozi.stage2_system), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_error_fails_stage() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(
            Script::BreakAfter {
                fragments: vec!["Step 1".into()],
                detail: "connection reset".into(),
            },
            Script::Reply("A1".into()),
        ));
        let mut seen = String::new();
        let err = orchestrator(backend.clone())
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                |f| seen.push_str(f),
                |_| {},
            )
            .await
            .unwrap_err();

        assert_eq!(seen, "Step 1");
        assert_eq!(err.stage(), Some(Stage::Reasoning));
        assert_eq!(
            err.upstream(),
            Some(&UpstreamError::Stream("connection reset".into()))
        );
        assert_eq!(backend.calls_for(&laozi.stage2_system), 0);
    }

    #[tokio::test]
    async fn test_stream_closed_without_finish_fails_stage1() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(
            Script::Truncated(vec!["Step 1: 無為\nStep 2: 順".into()]),
            Script::Reply("A1".into()),
        ));
        let mut seen = String::new();
        let mut advice = String::new();
        let err = orchestrator(backend.clone())
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                |f| seen.push_str(f),
                |f| advice.push_str(f),
            )
            .await
            .unwrap_err();

        assert_eq!(seen, "Step 1: 無為\nStep 2: 順");
        assert!(advice.is_empty());
        assert_eq!(err.stage(), Some(Stage::Reasoning));
        assert_eq!(
            err.upstream(),
            Some(&UpstreamError::Stream("stream ended before completion".into()))
        );
        assert_eq!(backend.calls_for(&laozi.stage2_system), 0);
    }

    #[tokio::test]
    async fn test_stream_closed_without_finish_fails_stage2() {
        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::Truncated(vec!["建議".into()]),
        ));
        let err = orchestrator(backend)
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                |_| {},
                |_| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Advice));
        assert_eq!(err.reasoning_chain(), Some("R1"));
    }

    #[tokio::test]
    async fn test_stage2_failure_keeps_reasoning_chain() {
        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::BreakAfter {
                fragments: vec!["建議".into()],
                detail: "overloaded".into(),
            },
        ));
        let err = orchestrator(backend.clone())
            .run_streaming(&request(QUESTION, LAOZI), &Cancellation::new(), |_| {}, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Advice));
        assert_eq!(err.reasoning_chain(), Some("R1"));

        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::Fail(UpstreamError::Api {
                status: 500,
                message: "boom".into(),
                retry_after: None,
            }),
        ));
        let err = orchestrator(backend)
            .run_batch(&request(QUESTION, LAOZI), &Cancellation::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Advice));
        assert_eq!(err.reasoning_chain(), Some("R1"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::Reply("A1".into()),
        ));
        let cancel = Cancellation::new();
        cancel.cancel();
        let err = orchestrator(backend.clone())
            .run_batch(&request(QUESTION, LAOZI), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.upstream(), Some(&UpstreamError::Cancelled));
        assert_eq!(err.stage(), Some(Stage::Reasoning));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_stage1_prevents_stage2() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(Script::Hang, Script::Reply("A1".into())));
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = orchestrator(backend.clone())
            .run_streaming(&request(QUESTION, LAOZI), &cancel, |_| {}, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Reasoning));
        assert_eq!(err.upstream(), Some(&UpstreamError::Cancelled));
        assert_eq!(backend.calls_for(&laozi.stage1_system), 1);
        assert_eq!(backend.calls_for(&laozi.stage2_system), 0);
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::Hang,
        ));
        let options = CotOptions {
            stage_timeout: Some(Duration::from_millis(30)),
            ..CotOptions::default()
        };
        let err = CotOrchestrator::new(backend, registry(), options)
            .run_batch(&request(QUESTION, LAOZI), &Cancellation::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Advice));
        assert_eq!(err.reasoning_chain(), Some("R1"));
        assert_eq!(
            err.upstream(),
            Some(&UpstreamError::Timeout(Duration::from_millis(30)))
        );
    }

    #[tokio::test]
    async fn test_options_reach_requests() {
        let laozi = persona(LAOZI);
        let backend = Arc::new(laozi_backend(
            Script::Reply("R1".into()),
            Script::Reply("A1".into()),
        ));
        let options = CotOptions {
            model: "llama-3.1-8b-instant".into(),
            ..CotOptions::default()
        };
        CotOrchestrator::new(backend.clone(), registry(), options)
            .run_batch(&request(QUESTION, LAOZI), &Cancellation::new())
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].system, laozi.stage1_system);
        assert_eq!(calls[1].system, laozi.stage2_system);
        assert_eq!(calls[0].user, build_stage1_prompt(QUESTION, &laozi));
        assert_eq!(calls[1].user, build_stage2_prompt(QUESTION, "R1", &laozi));
    }

    #[tokio::test]
    async fn test_comparison_has_no_cross_contamination() {
        let registry = registry();
        let mut backend = ScriptedBackend::new().with_delay(Duration::from_millis(5));
        for (i, key) in [LAOZI, KONGZI, GUANZHONG].iter().enumerate() {
            let persona = registry.lookup(key).unwrap();
            backend = backend
                .reply(persona.stage1_system.clone(), format!("R{}", i))
                .reply(persona.stage2_system.clone(), format!("A{}", i));
        }
        let backend = Arc::new(backend);
        let orch = CotOrchestrator::new(backend.clone(), registry.clone(), CotOptions::default());
        let keys = registry.keys();

        let results = orch
            .run_comparison(QUESTION, &keys, &ApiKey::new("k"), &Cancellation::new())
            .await;

        assert_eq!(results.len(), 3);
        for (i, (key, result)) in results.iter().enumerate() {
            assert_eq!(key, &keys[i]);
            let result = result.as_ref().unwrap();
            assert_eq!(result.reasoning_chain, format!("R{}", i));
            assert_eq!(result.advice, format!("A{}", i));
        }

        // Each stage-2 prompt carries only its own persona's reasoning
        for (i, key) in keys.iter().enumerate() {
            let persona = registry.lookup(key).unwrap();
            let stage2: Vec<_> = backend
                .calls()
                .into_iter()
                .filter(|c| c.system == persona.stage2_system)
                .collect();
            assert_eq!(stage2.len(), 1);
            assert_eq!(
                stage2[0].user,
                build_stage2_prompt(QUESTION, &format!("R{}", i), &persona)
            );
        }
    }

    #[tokio::test]
    async fn test_comparison_isolates_failures() {
        let registry = registry();
        let laozi = registry.lookup(LAOZI).unwrap();
        let kongzi = registry.lookup(KONGZI).unwrap();
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply(laozi.stage1_system.clone(), "R-laozi")
                .reply(laozi.stage2_system.clone(), "A-laozi")
                .script(
                    kongzi.stage1_system.clone(),
                    Script::Fail(UpstreamError::Transport("reset".into())),
                ),
        );
        let orch = CotOrchestrator::new(backend.clone(), registry, CotOptions::default());
        let keys = vec![KONGZI.to_string(), LAOZI.to_string(), "X".to_string()];

        let results = orch
            .run_comparison(QUESTION, &keys, &ApiKey::new("k"), &Cancellation::new())
            .await;

        assert_eq!(results[0].0, KONGZI);
        assert_eq!(results[0].1.as_ref().unwrap_err().stage(), Some(Stage::Reasoning));
        assert_eq!(results[1].1.as_ref().unwrap().advice, "A-laozi");
        assert!(matches!(results[2].1, Err(CotError::UnknownPersona(_))));
        assert_eq!(backend.calls_for(&kongzi.stage2_system), 0);
    }

    #[tokio::test]
    async fn test_comparison_cancel_reaches_every_persona() {
        let registry = registry();
        let mut backend = ScriptedBackend::new();
        for persona in registry.all() {
            backend = backend.script(persona.stage1_system.clone(), Script::Hang);
        }
        let backend = Arc::new(backend);
        let orch = CotOrchestrator::new(backend.clone(), registry.clone(), CotOptions::default());
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let results = orch
            .run_comparison(QUESTION, &registry.keys(), &ApiKey::new("k"), &cancel)
            .await;

        assert_eq!(results.len(), 3);
        for (_, result) in &results {
            assert_eq!(
                result.as_ref().unwrap_err().upstream(),
                Some(&UpstreamError::Cancelled)
            );
        }
        for persona in registry.all() {
            assert_eq!(backend.calls_for(&persona.stage2_system), 0);
        }
    }

    #[tokio::test]
    async fn test_streaming_callbacks_see_growing_prefix() {
        let backend = Arc::new(laozi_backend(
            fragments(&["上善", "若水"]),
            Script::Reply("A".into()),
        ));
        let prefixes = Mutex::new(Vec::new());
        let mut acc = String::new();
        orchestrator(backend)
            .run_streaming(
                &request(QUESTION, LAOZI),
                &Cancellation::new(),
                |f| {
                    acc.push_str(f);
                    prefixes.lock().unwrap().push(acc.clone());
                },
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(
            prefixes.into_inner().unwrap(),
            vec!["上善".to_string(), "上善若水".to_string()]
        );
    }
}
