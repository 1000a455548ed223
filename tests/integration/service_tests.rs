use std::sync::Arc;

use tokio::sync::mpsc;

use catalyst_remote::models::session::IdeaStatus;
use catalyst_remote::service::AgentService;
use catalyst_remote::store::{MemorySessionStore, SessionStore};
use catalyst_remote::supervisor::JobSupervisor;
use catalyst_remote::transport::{ControlSignal, ExecEvent};
use catalyst_remote::AppError;

use super::test_helpers::{
    fast_jobs, next_session, next_signal, runner_over_mock, seeded_store, test_agent_config,
    ExecSession, MockTransport,
};

struct Harness {
    service: AgentService,
    store: Arc<MemorySessionStore>,
    sessions: mpsc::UnboundedReceiver<ExecSession>,
    /// Keeps the mock transport's session sender alive so `sessions`
    /// stays open even after the service (and its pool) is dropped.
    _transport: Arc<MockTransport>,
}

async fn harness(token: Option<&str>) -> Harness {
    let (runner, sessions, transport) = runner_over_mock(3);
    let store = seeded_store("idea-1", "demo", token).await;
    let supervisor = Arc::new(JobSupervisor::new(
        runner.clone(),
        Arc::clone(&store) as Arc<dyn SessionStore>,
        fast_jobs(),
    ));
    let service = AgentService::new(
        supervisor,
        runner,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        test_agent_config(),
    );
    Harness {
        service,
        store,
        sessions,
        _transport: transport,
    }
}

async fn idea_status(store: &MemorySessionStore, id: &str) -> IdeaStatus {
    store.get(id).await.expect("get").expect("exists").status
}

#[tokio::test]
async fn chat_runs_the_agent_with_the_read_only_allowlist() {
    let mut h = harness(None).await;
    let (tx, _rx) = mpsc::channel(16);

    h.service
        .chat("idea-1", "what is this?", tx)
        .await
        .expect("chat starts");

    let session = next_session(&mut h.sessions).await;
    assert_eq!(
        session.command,
        "claude -p $'what is this?' --output-format stream-json --allowedTools $'Read,Grep,Glob'"
    );
    assert_eq!(idea_status(&h.store, "idea-1").await, IdeaStatus::Chatting);
}

#[tokio::test]
async fn chat_resumes_a_known_session_token() {
    let mut h = harness(Some("sess-42")).await;
    let (tx, _rx) = mpsc::channel(16);

    h.service.chat("idea-1", "continue", tx).await.expect("chat starts");

    let session = next_session(&mut h.sessions).await;
    assert!(
        session.command.contains("--resume sess-42"),
        "got {}",
        session.command
    );
}

#[tokio::test]
async fn chat_for_missing_idea_is_not_found() {
    let h = harness(None).await;
    let (tx, _rx) = mpsc::channel(16);

    let err = h
        .service
        .chat("idea-9", "hello", tx)
        .await
        .expect_err("unknown idea rejected");
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn concurrent_chat_on_one_idea_is_rejected() {
    let mut h = harness(None).await;
    let (tx, _rx) = mpsc::channel(16);

    h.service
        .chat("idea-1", "first", tx.clone())
        .await
        .expect("first chat");
    let _session = next_session(&mut h.sessions).await;

    let err = h
        .service
        .chat("idea-1", "second", tx)
        .await
        .expect_err("second chat rejected");
    assert!(matches!(err, AppError::AlreadyRunning(_)), "got {err:?}");
}

#[tokio::test]
async fn build_runs_mkdir_then_the_agent_in_the_project_dir() {
    let Harness {
        service,
        store,
        mut sessions,
        _transport,
    } = harness(Some("sess-42")).await;
    let (tx, _rx) = mpsc::channel(16);

    let build = tokio::spawn(async move { service.build("idea-1", "make it so", tx).await });

    let mkdir = next_session(&mut sessions).await;
    assert_eq!(mkdir.command, "mkdir -p $'/srv/ideas/demo/project'");
    mkdir
        .events
        .send(ExecEvent::Exited(0))
        .await
        .expect("mkdir succeeds");

    let agent = next_session(&mut sessions).await;
    assert_eq!(
        agent.command,
        "claude -p $'make it so' --output-format stream-json \
         --resume sess-42 --project-dir /srv/ideas/demo/project"
    );

    build.await.expect("join").expect("build starts");
    assert_eq!(idea_status(&store, "idea-1").await, IdeaStatus::Building);
}

#[tokio::test]
async fn failed_mkdir_aborts_the_build() {
    let Harness {
        service,
        store,
        mut sessions,
        _transport,
    } = harness(None).await;
    let (tx, _rx) = mpsc::channel(16);

    let build = tokio::spawn(async move { service.build("idea-1", "make it so", tx).await });

    let mkdir = next_session(&mut sessions).await;
    mkdir
        .events
        .send(ExecEvent::Stderr(b"read-only file system".to_vec()))
        .await
        .expect("send stderr");
    mkdir
        .events
        .send(ExecEvent::Exited(1))
        .await
        .expect("send exit");

    let err = build.await.expect("join").expect_err("build aborted");
    assert!(matches!(err, AppError::CommandFailed { .. }), "got {err:?}");

    // No agent invocation was attempted and the status did not advance.
    assert_eq!(idea_status(&store, "idea-1").await, IdeaStatus::Captured);
    match tokio::time::timeout(std::time::Duration::from_millis(100), sessions.recv()).await {
        Err(_) => {}
        Ok(session) => panic!("unexpected second exec: {:?}", session.map(|s| s.command)),
    }
}

#[tokio::test]
async fn cancel_interrupts_the_running_chat() {
    let mut h = harness(None).await;
    let (tx, _rx) = mpsc::channel(16);

    h.service.chat("idea-1", "hello", tx).await.expect("chat starts");
    let mut session = next_session(&mut h.sessions).await;

    h.service.cancel("idea-1").await;

    assert_eq!(
        next_signal(&mut session.signals).await,
        ControlSignal::Interrupt
    );
}
