//! `SessionDurableActor`: one task per live session, serializing every turn
//! through a single mpsc channel so concurrent callers never race on the
//! same `Session`. Commands are processed strictly in arrival order; a
//! `CancellationToken` lets the owner stop the actor between turns without
//! losing whatever was already committed to the store.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::domain::config::AssessmentConfig;
use crate::domain::SessionId;
use crate::engine::{ConversationalAssessmentEngine, TurnOutcome};
use crate::error::{CacError, Result, StoreError};
use crate::grade::GradePayload;
use crate::store::SessionStore;

/// Bounded retry budget for a version conflict on save, per spec §7: "the
/// Actor treats Conflict internally with a bounded retry (≤ 3) before
/// surfacing."
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// Runs `op` against a cloned `session`, saves the clone, and commits it back
/// to `session` on success. On a version conflict, reloads the authoritative
/// row from the store and retries the whole op up to `MAX_SAVE_ATTEMPTS`
/// times before surfacing the conflict to the caller.
async fn apply_with_retry<T, F, Fut>(
    session: &mut crate::domain::Session,
    store: &Arc<dyn SessionStore>,
    mut op: F,
) -> Result<T>
where
    F: FnMut(crate::domain::Session) -> Fut,
    Fut: std::future::Future<Output = Result<(crate::domain::Session, T)>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let expected_version = session.version;
        let (mutated, value) = op(session.clone()).await?;
        match store.save(&mutated, expected_version).await {
            Ok(()) => {
                *session = mutated;
                return Ok(value);
            }
            Err(CacError::Store(StoreError::VersionConflict { .. })) if attempt < MAX_SAVE_ATTEMPTS => {
                *session = store.load(session.id).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

enum Command {
    ProcessResponse {
        student_text: String,
        response_time_ms: Option<u64>,
        reply: oneshot::Sender<Result<TurnOutcome>>,
    },
    RetryLastAi {
        reply: oneshot::Sender<Result<()>>,
    },
    CalculateFinalGrade {
        reply: oneshot::Sender<Result<GradePayload>>,
    },
}

/// Handle to a running actor. Cloning shares the same underlying task; every
/// clone's commands still serialize through the one channel.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub async fn process_response(&self, student_text: String, response_time_ms: Option<u64>) -> Result<TurnOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ProcessResponse { student_text, response_time_ms, reply })
            .await
            .map_err(|_| CacError::Other(anyhow::anyhow!("session actor has shut down")))?;
        rx.await.map_err(|_| CacError::Other(anyhow::anyhow!("session actor dropped the reply")))?
    }

    pub async fn retry_last_ai(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RetryLastAi { reply })
            .await
            .map_err(|_| CacError::Other(anyhow::anyhow!("session actor has shut down")))?;
        rx.await.map_err(|_| CacError::Other(anyhow::anyhow!("session actor dropped the reply")))?
    }

    pub async fn calculate_final_grade(&self) -> Result<GradePayload> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::CalculateFinalGrade { reply })
            .await
            .map_err(|_| CacError::Other(anyhow::anyhow!("session actor has shut down")))?;
        rx.await.map_err(|_| CacError::Other(anyhow::anyhow!("session actor dropped the reply")))?
    }

    /// Stops the actor after its current turn finishes; in-flight
    /// work already past its await points is not interrupted mid-turn.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub struct SessionDurableActor;

impl SessionDurableActor {
    /// Spawns the actor's task and returns a handle. The task owns the
    /// session exclusively: it loads once at startup and persists after
    /// every command via an optimistic-concurrency save, reloading and
    /// re-running the command up to [`MAX_SAVE_ATTEMPTS`] times on a version
    /// conflict before giving up.
    #[must_use]
    pub fn spawn(
        session_id: SessionId,
        config: AssessmentConfig,
        engine: Arc<ConversationalAssessmentEngine>,
        store: Arc<dyn SessionStore>,
    ) -> SessionHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut session = match store.load(session_id).await {
                Ok(s) => s,
                Err(_) => return,
            };

            loop {
                let command = tokio::select! {
                    () = task_cancel.cancelled() => break,
                    cmd = rx.recv() => cmd,
                };
                let Some(command) = command else { break };

                match command {
                    Command::ProcessResponse { student_text, response_time_ms, reply } => {
                        let now = Utc::now();
                        let result = apply_with_retry(&mut session, &store, |mut candidate| {
                            let engine = engine.clone();
                            let config = config.clone();
                            let student_text = student_text.clone();
                            async move {
                                let outcome = engine
                                    .process_response(&mut candidate, &config, &student_text, response_time_ms, now)
                                    .await?;
                                Ok((candidate, outcome))
                            }
                        })
                        .await;
                        let _ = reply.send(result);
                    }
                    Command::RetryLastAi { reply } => {
                        let now = Utc::now();
                        let result = apply_with_retry(&mut session, &store, |mut candidate| {
                            let engine = engine.clone();
                            async move {
                                engine.retry_last_ai(&mut candidate, now).await?;
                                Ok((candidate, ()))
                            }
                        })
                        .await;
                        let _ = reply.send(result);
                    }
                    Command::CalculateFinalGrade { reply } => {
                        let now = Utc::now();
                        let result = engine.calculate_final_grade(&session, &config, now).await;
                        let _ = reply.send(result);
                    }
                }
            }
        });

        SessionHandle { tx, cancel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::fixtures::config;
    use crate::domain::Session;
    use crate::grade::LoggingPassbackClient;
    use crate::integrity::IntegrityThresholds;
    use crate::integrity::IntegrityEvaluator;
    use crate::llm::{LlmClient, ScriptedLlmClient};
    use crate::prompt::PromptBuilder;
    use crate::store::SqliteSessionStore;

    async fn seeded_store(session: &Session) -> Arc<dyn SessionStore> {
        let store = SqliteSessionStore::connect("sqlite::memory:").await.unwrap();
        store.insert(session).await.unwrap();
        Arc::new(store)
    }

    fn engine_with_script(script: Vec<&str>) -> Arc<ConversationalAssessmentEngine> {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(script));
        let prompts = Arc::new(PromptBuilder::new().unwrap());
        let integrity = Arc::new(IntegrityEvaluator::new(IntegrityThresholds::default(), 10_000, 10_000));
        let passback = Arc::new(LoggingPassbackClient);
        Arc::new(ConversationalAssessmentEngine::new(llm, prompts, integrity, passback))
    }

    #[tokio::test]
    async fn process_response_round_trips_through_the_actor() {
        let cfg = config(&["A"], 0.75, 5);
        let mut session = Session::new(&cfg, "s".into(), "c".into(), "tok".into(), Utc::now());
        session.status = crate::domain::SessionStatus::Active;
        let store = seeded_store(&session).await;
        let engine = engine_with_script(vec![
            r#"{"understanding":{"level":"good","confidence":0.9,"concepts_understood":[],"misconceptions":[]},"mastery":{"progress":0.1,"achieved":false},"engagement":{"level":"medium","struggling_signals":[]},"next_question":{"type":"comprehension","target_concept":"A","difficulty_hint":0.5}}"#,
            "next question text",
        ]);

        let handle = SessionDurableActor::spawn(session.id, cfg, engine, store);
        let outcome = handle.process_response("my answer".into(), Some(6000)).await.unwrap();
        assert!(outcome.ai_message.is_some());
    }

    /// A store whose `save` reports a stale-version conflict on its first
    /// `conflicts_remaining` calls, then behaves normally — simulating
    /// another writer racing the actor.
    struct FlakySaveStore {
        inner: SqliteSessionStore,
        conflicts_remaining: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl SessionStore for FlakySaveStore {
        async fn insert(&self, session: &Session) -> Result<()> {
            self.inner.insert(session).await
        }

        async fn load(&self, session_id: SessionId) -> Result<Session> {
            self.inner.load(session_id).await
        }

        async fn save(&self, session: &Session, expected_version: i64) -> Result<()> {
            if self
                .conflicts_remaining
                .fetch_update(std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst, |n| {
                    (n > 0).then_some(n - 1)
                })
                .is_ok()
            {
                return Err(CacError::Store(StoreError::VersionConflict {
                    expected: expected_version,
                    found: expected_version + 1,
                }));
            }
            self.inner.save(session, expected_version).await
        }

        async fn append_audit(&self, session_id: SessionId, entry: crate::store::AuditEntry) -> Result<()> {
            self.inner.append_audit(session_id, entry).await
        }

        async fn delete(&self, session_id: SessionId, actor: &str) -> Result<()> {
            self.inner.delete(session_id, actor).await
        }
    }

    #[tokio::test]
    async fn process_response_survives_a_transient_save_conflict() {
        let cfg = config(&["A"], 0.75, 5);
        let mut session = Session::new(&cfg, "s".into(), "c".into(), "tok".into(), Utc::now());
        session.status = crate::domain::SessionStatus::Active;

        let inner = SqliteSessionStore::connect("sqlite::memory:").await.unwrap();
        inner.insert(&session).await.unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(FlakySaveStore {
            inner,
            conflicts_remaining: std::sync::atomic::AtomicU32::new(2),
        });

        let engine = engine_with_script(vec![
            r#"{"understanding":{"level":"good","confidence":0.9,"concepts_understood":[],"misconceptions":[]},"mastery":{"progress":0.1,"achieved":false},"engagement":{"level":"medium","struggling_signals":[]},"next_question":{"type":"comprehension","target_concept":"A","difficulty_hint":0.5}}"#,
            "next question text",
        ]);

        let handle = SessionDurableActor::spawn(session.id, cfg, engine, store);
        let outcome = handle.process_response("my answer".into(), Some(6000)).await.unwrap();
        assert!(outcome.ai_message.is_some());
    }

    #[tokio::test]
    async fn process_response_surfaces_conflict_once_the_retry_budget_is_exhausted() {
        let cfg = config(&["A"], 0.75, 5);
        let mut session = Session::new(&cfg, "s".into(), "c".into(), "tok".into(), Utc::now());
        session.status = crate::domain::SessionStatus::Active;

        let inner = SqliteSessionStore::connect("sqlite::memory:").await.unwrap();
        inner.insert(&session).await.unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(FlakySaveStore {
            inner,
            conflicts_remaining: std::sync::atomic::AtomicU32::new(u32::MAX),
        });

        let engine = engine_with_script(vec![
            r#"{"understanding":{"level":"good","confidence":0.9,"concepts_understood":[],"misconceptions":[]},"mastery":{"progress":0.1,"achieved":false},"engagement":{"level":"medium","struggling_signals":[]},"next_question":{"type":"comprehension","target_concept":"A","difficulty_hint":0.5}}"#,
            "next question text",
        ]);

        let handle = SessionDurableActor::spawn(session.id, cfg, engine, store);
        let result = handle.process_response("my answer".into(), Some(6000)).await;
        assert!(matches!(result, Err(CacError::Store(StoreError::VersionConflict { .. }))));
    }

    #[tokio::test]
    async fn commands_sent_after_shutdown_eventually_fail() {
        let cfg = config(&["A"], 0.75, 5);
        let session = Session::new(&cfg, "s".into(), "c".into(), "tok".into(), Utc::now());
        let store = seeded_store(&session).await;
        let engine = engine_with_script(vec!["x"]);
        let handle = SessionDurableActor::spawn(session.id, cfg, engine, store);
        handle.shutdown();
        // Give the task a chance to observe cancellation and exit its loop.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let result = handle.process_response("late".into(), None).await;
        assert!(result.is_err());
    }
}
