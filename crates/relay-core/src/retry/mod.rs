//! Self-correction retry engine.
//!
//! Wraps a fallible generation call. Each failed attempt feeds its error
//! message and partial output into the next attempt. When attempts run out
//! the engine fails with `RetryExhausted`; it never invents a fallback value.

use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GenerationError, RelayError};
use crate::telemetry::{LogContext, Telemetry};
use crate::trace::{StepRecord, TraceRecorder};

/// What a failed attempt tells the next one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorFeedback {
    pub attempt: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<String>,
}

impl ErrorFeedback {
    /// Instruction block appended to generation requests on retry.
    pub fn as_prompt(&self) -> String {
        let mut prompt = format!(
            "Attempt {} failed: {}\nCorrect the problem and answer again.",
            self.attempt, self.message
        );
        if let Some(partial) = &self.partial_output {
            prompt.push_str("\nPrevious output:\n");
            prompt.push_str(partial);
        }
        prompt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptContext {
    /// 1-based
    pub attempt: u32,
    pub max_attempts: u32,
    pub feedback: Option<ErrorFeedback>,
}

impl AttemptContext {
    pub fn first(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts,
            feedback: None,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub error: GenerationError,
    pub partial_output: Option<String>,
    pub retryable: bool,
}

impl AttemptFailure {
    pub fn new(error: GenerationError) -> Self {
        let retryable = error.is_retryable();
        Self {
            error,
            partial_output: None,
            retryable,
        }
    }

    pub fn with_partial(mut self, partial: impl Into<String>) -> Self {
        self.partial_output = Some(partial.into());
        self
    }

    /// Stop retrying after this failure regardless of the error kind.
    pub fn fatal(mut self) -> Self {
        self.retryable = false;
        self
    }
}

/// Result of one attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome<T> {
    Success(T),
    Failure(AttemptFailure),
}

impl<T> AttemptOutcome<T> {
    pub fn failure(error: GenerationError) -> Self {
        Self::Failure(AttemptFailure::new(error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl<T> From<GenerationError> for AttemptOutcome<T> {
    fn from(error: GenerationError) -> Self {
        Self::failure(error)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: None,
        }
    }
}

/// Who is retrying what, and where the attempts are traced.
#[derive(Debug, Clone, Copy)]
pub struct RetryTask<'a> {
    pub specialist: &'a str,
    pub description: &'a str,
    pub trace_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RetrySuccess<T> {
    pub value: T,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
}

pub struct RetryEngine {
    recorder: Arc<TraceRecorder>,
    telemetry: Telemetry,
}

impl RetryEngine {
    pub fn new(recorder: Arc<TraceRecorder>, telemetry: Telemetry) -> Self {
        Self {
            recorder,
            telemetry,
        }
    }

    /// Run `base_call` until it succeeds, fails non-retryably, or
    /// `policy.max_attempts` is reached.
    pub async fn run<T, F, Fut>(
        &self,
        task: RetryTask<'_>,
        policy: &RetryPolicy,
        mut base_call: F,
    ) -> Result<RetrySuccess<T>, RelayError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        if policy.max_attempts < 1 {
            return Err(RelayError::Configuration(format!(
                "max_attempts must be at least 1, got {}",
                policy.max_attempts
            )));
        }

        let mut ctx = AttemptContext::first(policy.max_attempts);
        loop {
            let started = Utc::now();
            let outcome = match policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, base_call(ctx.clone())).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        AttemptOutcome::failure(GenerationError::Timeout(limit.as_millis() as u64))
                    }
                },
                None => base_call(ctx.clone()).await,
            };

            let step = StepRecord::new(task.specialist, "generate")
                .started_at(started)
                .params(serde_json::json!({
                    "task": task.description,
                    "attempt": ctx.attempt,
                    "maxAttempts": ctx.max_attempts,
                    "feedback": ctx.feedback,
                }));

            match outcome {
                AttemptOutcome::Success(value) => {
                    self.trace(task, step.result(serde_json::json!({ "attempt": ctx.attempt })))
                        .await;
                    if ctx.is_retry() {
                        self.telemetry.logs.info(
                            format!(
                                "{} recovered on attempt {}/{}",
                                task.specialist, ctx.attempt, ctx.max_attempts
                            ),
                            LogContext::tool(task.specialist),
                        );
                    }
                    return Ok(RetrySuccess {
                        value,
                        attempts: ctx.attempt,
                    });
                }
                AttemptOutcome::Failure(failure) => {
                    let message = failure.error.to_string();
                    self.trace(task, step.error(message.clone())).await;
                    self.telemetry.logs.warn(
                        format!(
                            "{} attempt {}/{} failed",
                            task.specialist, ctx.attempt, ctx.max_attempts
                        ),
                        LogContext::tool(task.specialist).with_error(message.clone()),
                    );

                    if !failure.retryable || ctx.attempt >= ctx.max_attempts {
                        self.telemetry.logs.error(
                            format!(
                                "{} gave up on '{}' after {} attempt(s)",
                                task.specialist, task.description, ctx.attempt
                            ),
                            LogContext::tool(task.specialist).with_error(message.clone()),
                        );
                        return Err(RelayError::RetryExhausted {
                            specialist: task.specialist.to_string(),
                            task: task.description.to_string(),
                            attempts: ctx.attempt,
                            last_error: failure.error,
                        });
                    }

                    ctx = AttemptContext {
                        attempt: ctx.attempt + 1,
                        max_attempts: ctx.max_attempts,
                        feedback: Some(ErrorFeedback {
                            attempt: ctx.attempt,
                            message,
                            partial_output: failure.partial_output,
                        }),
                    };
                }
            }
        }
    }

    async fn trace(&self, task: RetryTask<'_>, step: StepRecord) {
        if let Some(trace_id) = task.trace_id {
            self.recorder.add_step(trace_id, step).await;
        } else {
            // Untraced runs still count towards the tool metrics.
            self.telemetry
                .metrics
                .record(&step.tool, step.error.is_none());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceContext;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    async fn engine_with_trace() -> (RetryEngine, Arc<TraceRecorder>) {
        let telemetry = Telemetry::in_memory().unwrap();
        let recorder = Arc::new(TraceRecorder::in_memory(telemetry.clone()));
        recorder.start_trace("t1", TraceContext::default()).await.unwrap();
        (RetryEngine::new(recorder.clone(), telemetry), recorder)
    }

    fn task() -> RetryTask<'static> {
        RetryTask {
            specialist: "design",
            description: "select hero imagery",
            trace_id: Some("t1"),
        }
    }

    #[tokio::test]
    async fn test_always_failing_call_is_invoked_exactly_max_attempts_times() {
        let (engine, recorder) = engine_with_trace().await;
        let calls = AtomicU32::new(0);

        let err = engine
            .run(task(), &RetryPolicy::default(), |_ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { AttemptOutcome::<()>::failure(GenerationError::InvalidOutput("no assets".into())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            RelayError::RetryExhausted {
                specialist,
                task,
                attempts,
                last_error,
            } => {
                assert_eq!(specialist, "design");
                assert_eq!(task, "select hero imagery");
                assert_eq!(attempts, 5);
                assert_eq!(last_error, GenerationError::InvalidOutput("no assets".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let trace = recorder.get("t1").await.unwrap();
        assert_eq!(trace.steps.len(), 5);
        assert!(trace.steps.iter().all(|s| s.is_failure()));
    }

    #[tokio::test]
    async fn test_success_on_third_attempt() {
        let (engine, recorder) = engine_with_trace().await;
        let calls = AtomicU32::new(0);

        let ok = engine
            .run(task(), &RetryPolicy::default(), |ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if ctx.attempt < 3 {
                        AttemptOutcome::failure(GenerationError::InvalidOutput("too short".into()))
                    } else {
                        AttemptOutcome::Success("hero.jpg")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(ok.value, "hero.jpg");
        assert_eq!(ok.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let trace = recorder.get("t1").await.unwrap();
        let failed = trace.steps.iter().filter(|s| s.is_failure()).count();
        assert_eq!((failed, trace.steps.len() - failed), (2, 1));
        assert!(!trace.steps.last().unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_feedback_carries_previous_error_and_partial_output() {
        let (engine, _) = engine_with_trace().await;
        let seen = Mutex::new(Vec::new());

        engine
            .run(task(), &RetryPolicy::default(), |ctx| {
                seen.lock().unwrap().push(ctx.feedback.clone());
                async move {
                    if ctx.attempt == 1 {
                        AttemptOutcome::Failure(
                            AttemptFailure::new(GenerationError::InvalidOutput("missing alt".into()))
                                .with_partial("{\"assets\": []}"),
                        )
                    } else {
                        AttemptOutcome::Success(())
                    }
                }
            })
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen[0], None);
        let feedback = seen[1].as_ref().unwrap();
        assert_eq!(feedback.attempt, 1);
        assert!(feedback.message.contains("missing alt"));
        assert_eq!(feedback.partial_output.as_deref(), Some("{\"assets\": []}"));
        assert!(feedback.as_prompt().contains("Previous output"));
    }

    #[tokio::test]
    async fn test_zero_attempts_is_configuration_error() {
        let (engine, _) = engine_with_trace().await;
        let policy = RetryPolicy {
            max_attempts: 0,
            attempt_timeout: None,
        };
        let err = engine
            .run(task(), &policy, |_| async { AttemptOutcome::Success(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_stops_early() {
        let (engine, _) = engine_with_trace().await;
        let calls = AtomicU32::new(0);
        let err = engine
            .run(task(), &RetryPolicy::default(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { AttemptOutcome::<()>::failure(GenerationError::from_status(401, "bad key")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err,
            RelayError::RetryExhausted {
                attempts: 1,
                last_error: GenerationError::Unauthorized(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let (engine, recorder) = engine_with_trace().await;
        let policy = RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Some(Duration::from_millis(20)),
        };
        let ok = engine
            .run(task(), &policy, |ctx| async move {
                if ctx.attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                AttemptOutcome::Success(ctx.attempt)
            })
            .await
            .unwrap();
        assert_eq!(ok.value, 2);

        let trace = recorder.get("t1").await.unwrap();
        assert!(trace.steps[0].error.as_deref().unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_untraced_run_still_counts_metrics() {
        let telemetry = Telemetry::in_memory().unwrap();
        let recorder = Arc::new(TraceRecorder::in_memory(telemetry.clone()));
        let engine = RetryEngine::new(recorder, telemetry.clone());
        let untraced = RetryTask {
            trace_id: None,
            ..task()
        };
        engine
            .run(untraced, &RetryPolicy::default(), |_| async { AttemptOutcome::Success(()) })
            .await
            .unwrap();
        assert_eq!(telemetry.metrics.snapshot().success("design"), 1);
    }
}
