//! Full worker lifecycle against a mock sandbox.

use tokio::sync::mpsc;

use foreman::protocol::StreamEvent;
use foreman::worker::{AgentEvent, AgentStatus, WorkerAgent};
use foreman::Error;

use crate::fixtures::{standard_records, worker_config, MockSandbox};

fn channel() -> (mpsc::Sender<AgentEvent>, mpsc::Receiver<AgentEvent>) {
    mpsc::channel(256)
}

#[tokio::test]
async fn test_full_lifecycle_records_protocol_events_in_order() {
    let mock = MockSandbox::emitting(&standard_records());
    let (tx, mut rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    let code = agent.wait().await.unwrap();

    assert_eq!(code, 0);
    assert_eq!(agent.status(), AgentStatus::Completed);

    let events = agent.events();
    assert_eq!(events.len(), 5);
    assert!(matches!(events[0], StreamEvent::Init { .. }));
    assert!(matches!(events[1], StreamEvent::ToolUse { .. }));
    assert!(matches!(events[2], StreamEvent::ToolResult { .. }));
    assert!(matches!(events[3], StreamEvent::Message { .. }));
    assert!(events[4].is_result());
    assert_eq!(
        agent.result_text(),
        Some("Fixed the bug in src/lib.rs".to_string())
    );

    // The channel saw every stream event, then the completion.
    let mut stream_count = 0;
    loop {
        match rx.recv().await {
            Some(AgentEvent::Stream { agent_id, .. }) => {
                assert_eq!(agent_id, agent.id());
                stream_count += 1;
            }
            Some(AgentEvent::Completed { exit_code, .. }) => {
                assert_eq!(exit_code, 0);
                break;
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
    assert_eq!(stream_count, 5);
}

#[tokio::test]
async fn test_record_split_across_writes_is_reassembled() {
    // The record arrives in two chunks with a pause between them; the
    // parser must buffer the partial line until the newline lands.
    let mock = MockSandbox::new(concat!(
        "printf '{\"type\":\"mess'\n",
        "sleep 0.2\n",
        "printf 'age\",\"role\":\"assistant\",\"content\":\"hello\"}\\n'"
    ));
    let (tx, _rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    agent.wait().await.unwrap();

    let events = agent.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text(), Some("hello".to_string()));
}

#[tokio::test]
async fn test_garbage_lines_are_tolerated() {
    let mock = MockSandbox::emitting(&[
        "warning: container cold start",
        r#"{"type":"message","role":"assistant","content":"ok"}"#,
        "",
        r#"{"type":"result","result":"done"}"#,
    ]);
    let (tx, _rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    agent.wait().await.unwrap();

    // Non-JSON and blank lines dropped; both records survived.
    assert_eq!(agent.event_count(), 2);
    assert_eq!(agent.status(), AgentStatus::Completed);
}

#[tokio::test]
async fn test_unterminated_final_record_flushed_at_exit() {
    // No trailing newline on the final record; EOF flushes it.
    let mock = MockSandbox::new(
        "printf '{\"type\":\"result\",\"result\":\"flushed\"}'",
    );
    let (tx, _rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    agent.wait().await.unwrap();

    assert_eq!(agent.result_text(), Some("flushed".to_string()));
}

#[tokio::test]
async fn test_failure_surfaces_exit_code() {
    let mock = MockSandbox::failing(7);
    let (tx, mut rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    match agent.wait().await {
        Err(Error::WorkerExit { exit_code }) => assert_eq!(exit_code, 7),
        other => panic!("Expected WorkerExit, got {:?}", other),
    }
    assert_eq!(agent.status(), AgentStatus::Failed);

    match rx.recv().await {
        Some(AgentEvent::Failed { error, .. }) => assert!(error.contains("7")),
        other => panic!("Expected Failed event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_terminates_gracefully() {
    let mock = MockSandbox::blocking();
    let (tx, _rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    assert_eq!(agent.status(), AgentStatus::Running);

    // Idempotent: the second request is absorbed by the stopping state.
    agent.stop();
    agent.stop();
    let code = agent.wait().await.unwrap();

    assert_eq!(code, -1);
    assert_eq!(agent.status(), AgentStatus::Completed);
}

#[tokio::test]
async fn test_stop_escalates_to_kill_for_stubborn_process() {
    let mock = MockSandbox::stubborn();
    let (tx, _rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&mock.runtime(), &worker_config()).await.unwrap();
    agent.stop();

    // TERM is ignored; the grace period lapses and KILL lands.
    let code = agent.wait().await.unwrap();
    assert_eq!(code, -1);
    assert_eq!(agent.status(), AgentStatus::Completed);
}

#[tokio::test]
async fn test_registry_drains_as_workers_exit() {
    let mock = MockSandbox::emitting(&standard_records());
    let runtime = mock.runtime();
    let (tx, _rx) = channel();
    let agent = WorkerAgent::new(tx);

    agent.start(&runtime, &worker_config()).await.unwrap();
    agent.wait().await.unwrap();

    assert!(runtime.registry().is_empty().await);
}
