//! A response submitted before the deadline is processed normally; one
//! submitted after the deadline is rejected and the session flips to
//! `timeout` without appending anything new to the conversation.

mod support;

use cac_engine::domain::SessionStatus;
use cac_engine::error::CacError;
use chrono::Utc;

#[tokio::test]
async fn response_past_the_deadline_is_rejected_and_session_times_out() {
    let mut cfg = support::config(&["A"], 0.75, 5);
    cfg.settings.time_limit_minutes = Some(1);

    let engine = support::engine_with_script(vec![
        "Welcome! Let's begin.",
        &support::understood_turn("A", "A"),
        "Keep going.",
    ]);

    let start = Utc::now();
    let mut session = engine
        .initialize(&cfg, "student-1".into(), "course-1".into(), "tok-1".into(), start)
        .await
        .unwrap();
    let initial_len = session.conversation.len();

    let within_deadline = start + chrono::Duration::seconds(30);
    let outcome = engine
        .process_response(&mut session, &cfg, "one half", Some(8000), within_deadline)
        .await
        .unwrap();
    assert!(!outcome.status.is_terminal());
    assert!(session.conversation.len() > initial_len);
    let len_before_timeout = session.conversation.len();

    let past_deadline = start + chrono::Duration::seconds(90);
    let result = engine
        .process_response(&mut session, &cfg, "one third", Some(8000), past_deadline)
        .await;

    assert!(matches!(result, Err(CacError::InvalidStatus(_))));
    assert_eq!(session.status, SessionStatus::Timeout);
    assert_eq!(session.conversation.len(), len_before_timeout);
}
