mod common;

use common::{fast_poll, file_ref, FakeRemote};
use kb_sync::error::FileError;
use kb_sync::models::{KnowledgeBaseHandle, ProcessingStatus, TaskState};
use kb_sync::pipeline::{ingest, ingest_all};

use TaskState::*;

fn setup() -> (FakeRemote, KnowledgeBaseHandle) {
    let remote = FakeRemote::new();
    let id = remote.add_kb("manuals", &[]);
    let kb = KnowledgeBaseHandle {
        name: "manuals".to_string(),
        remote_id: id,
    };
    (remote, kb)
}

#[tokio::test]
async fn test_success_records_full_history() {
    let (remote, kb) = setup();

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(5)).await;

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.history, vec![Pending, Uploading, Processing, Attached]);
    assert!(outcome.file_id.is_some());
    assert!(remote.attached(&kb.remote_id).contains("guide.pdf"));
}

#[tokio::test]
async fn test_polls_until_completed() {
    let (remote, kb) = setup();
    remote.script_status(
        "guide.pdf",
        &[
            ProcessingStatus::Processing,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
        ],
    );

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(10)).await;

    assert!(outcome.is_attached());
    assert_eq!(remote.polls("guide.pdf"), 3);
}

#[tokio::test]
async fn test_processing_failed_is_never_attached() {
    let (remote, kb) = setup();
    remote.script_status("guide.pdf", &[ProcessingStatus::Failed]);

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(5)).await;

    assert!(matches!(
        outcome.error(),
        Some(FileError::ProcessingFailed { .. })
    ));
    assert_eq!(outcome.history, vec![Pending, Uploading, Processing, Failed]);
    assert_eq!(remote.count("attach:"), 0);
    assert!(remote.attached(&kb.remote_id).is_empty());
}

#[tokio::test]
async fn test_timeout_after_exactly_max_polls() {
    let (remote, kb) = setup();
    remote.script_status("guide.pdf", &[ProcessingStatus::Processing]);

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(4)).await;

    match outcome.error() {
        Some(FileError::ProcessingTimeout { attempts, .. }) => assert_eq!(*attempts, 4),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(remote.polls("guide.pdf"), 4);
    assert_eq!(outcome.final_state(), Failed);
    assert_eq!(remote.count("attach:"), 0);
}

#[tokio::test]
async fn test_status_errors_use_up_attempts() {
    let (remote, kb) = setup();
    remote.fail_status("guide.pdf");

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(3)).await;

    assert!(matches!(
        outcome.error(),
        Some(FileError::ProcessingTimeout { attempts: 3, .. })
    ));
    assert_eq!(remote.polls("guide.pdf"), 3);
}

#[tokio::test]
async fn test_upload_failure_stops_before_processing() {
    let (remote, kb) = setup();
    remote.fail_upload("guide.pdf");

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(5)).await;

    assert!(matches!(outcome.error(), Some(FileError::Upload(_))));
    assert_eq!(outcome.history, vec![Pending, Uploading, Failed]);
    assert!(outcome.file_id.is_none());
    assert_eq!(remote.count("status:"), 0);
    assert_eq!(remote.count("attach:"), 0);
}

#[tokio::test]
async fn test_attach_failure_keeps_file_id() {
    let (remote, kb) = setup();
    remote.fail_attach("guide.pdf");

    let outcome = ingest(&remote, &kb, file_ref("guide.pdf"), fast_poll(5)).await;

    assert!(matches!(outcome.error(), Some(FileError::Attach { .. })));
    assert_eq!(outcome.history, vec![Pending, Uploading, Processing, Failed]);
    assert!(outcome.file_id.is_some());
    assert_eq!(outcome.error().unwrap().kind(), "attach_error");
}

#[tokio::test]
async fn test_failure_does_not_affect_siblings() {
    let (remote, kb) = setup();
    remote.fail_upload("b.md");
    remote.script_status("c.md", &[ProcessingStatus::Failed]);

    let files = vec![file_ref("a.md"), file_ref("b.md"), file_ref("c.md"), file_ref("d.md")];
    let outcomes = ingest_all(&remote, &kb, files, fast_poll(5), 2).await;

    assert_eq!(outcomes.len(), 4);
    let state_of = |name: &str| {
        outcomes
            .iter()
            .find(|o| o.file.name == name)
            .map(|o| o.final_state())
            .unwrap()
    };
    assert_eq!(state_of("a.md"), Attached);
    assert_eq!(state_of("b.md"), Failed);
    assert_eq!(state_of("c.md"), Failed);
    assert_eq!(state_of("d.md"), Attached);

    let attached: Vec<_> = remote.attached(&kb.remote_id).into_iter().collect();
    assert_eq!(attached, vec!["a.md", "d.md"]);
}

#[tokio::test]
async fn test_empty_plan_makes_no_calls() {
    let (remote, kb) = setup();
    let outcomes = ingest_all(&remote, &kb, vec![], fast_poll(5), 4).await;
    assert!(outcomes.is_empty());
    assert!(remote.calls().is_empty());
}
