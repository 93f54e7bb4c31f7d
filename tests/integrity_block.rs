//! A response that reads as AI-generated boilerplate is blocked before any
//! reply is generated: the turn errors, the session flips to `error`, and
//! the integrity log carries a failing `response_authenticity` check.

mod support;

use cac_engine::domain::session::{IntegrityCheckType, IntegrityVerdict};
use cac_engine::domain::SessionStatus;
use cac_engine::error::CacError;
use chrono::Utc;

#[tokio::test]
async fn ai_boilerplate_response_is_blocked() {
    let cfg = support::config(&["A"], 0.75, 5);
    let engine = support::engine_with_script(vec!["Welcome! Let's begin."]);

    let now = Utc::now();
    let mut session = engine
        .initialize(&cfg, "student-1".into(), "course-1".into(), "tok-1".into(), now)
        .await
        .unwrap();
    let initial_len = session.conversation.len();

    let filler = "restating the definition in slightly different words. ".repeat(60);
    let suspect_answer = format!("As an AI language model, I don't have personal experiences, but {filler}");
    assert!(suspect_answer.len() > 3000);

    let result = engine
        .process_response(&mut session, &cfg, &suspect_answer, Some(500), Utc::now())
        .await;

    assert!(matches!(result, Err(CacError::IntegrityBlocked(_))));
    assert_eq!(session.status, SessionStatus::Error);

    assert_eq!(session.conversation.len(), initial_len + 1);
    assert_eq!(session.conversation.last().unwrap().role, cac_engine::domain::MessageRole::Student);

    assert!(session.security.checks.iter().any(|c| c.check_type == IntegrityCheckType::ResponseAuthenticity
        && matches!(c.verdict, IntegrityVerdict::Warn | IntegrityVerdict::Fail)));
}
