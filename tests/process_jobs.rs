//! Raw process launches: clean exits, abnormal exits, readiness, and
//! out-of-band termination.

#![cfg(unix)]

use offload::{Engine, Error, ExitCallback, ProcessExit};
use pretty_assertions::assert_eq;

// ─── Clean exits ────────────────────────────────────────────────────────────

#[tokio::test]
async fn echo_exits_cleanly() {
    let future = Engine::new()
        .launch_process("x", "echo", ["hello"], None)
        .await
        .unwrap();

    let exit = future.get().await.unwrap();
    assert_eq!(exit.label, "x");
    assert!(exit.status.success());
    assert!(exit.id.is_some());
}

#[tokio::test]
async fn process_callback_receives_exit_record() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let callback: ExitCallback<ProcessExit> = Box::new(move |outcome| {
        let _ = tx.send(outcome);
    });

    let _future = Engine::new()
        .launch_process("echoer", "echo", ["done"], Some(callback))
        .await
        .unwrap();

    let exit = rx.await.unwrap().unwrap();
    assert_eq!(exit.label, "echoer");
    assert!(exit.status.success());
}

// ─── Abnormal exits ─────────────────────────────────────────────────────────

#[tokio::test]
async fn nonzero_exit_reports_the_code() {
    let future = Engine::new()
        .launch_process("x", "sh", ["-c", "exit 7"], None)
        .await
        .unwrap();

    match future.get().await {
        Err(Error::ProcessFailed { label, code }) => {
            assert_eq!(label, "x");
            assert_eq!(code, Some(7));
            let err = Error::ProcessFailed { label, code };
            assert!(err.to_string().contains("exit code 7"));
        },
        other => panic!("expected process failure, got {other:?}"),
    }
}

#[tokio::test]
async fn signal_death_reports_no_code() {
    let future = Engine::new()
        .launch_process("doomed", "sh", ["-c", "kill -9 $$"], None)
        .await
        .unwrap();

    match future.get().await {
        Err(Error::ProcessFailed { code, .. }) => assert_eq!(code, None),
        other => panic!("expected process failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_program_fails_at_spawn() {
    let err = Engine::new()
        .launch_process(
            "ghost",
            "/nonexistent/program/for/offload",
            std::iter::empty::<&str>(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
}

// ─── Readiness and waiting ──────────────────────────────────────────────────

#[tokio::test]
async fn ready_never_blocks_and_flips_after_exit() {
    let mut future = Engine::new()
        .launch_process("sleeper", "sh", ["-c", "sleep 0.3"], None)
        .await
        .unwrap();

    assert!(!future.ready());

    future.wait().await;
    assert!(future.ready());
    assert!(future.get().await.unwrap().status.success());
}

#[tokio::test]
async fn caller_can_race_a_timeout_against_wait() {
    let mut future = Engine::new()
        .launch_process("slow", "sh", ["-c", "sleep 30"], None)
        .await
        .unwrap();

    let timed_out =
        tokio::time::timeout(std::time::Duration::from_millis(100), future.wait())
            .await
            .is_err();
    assert!(timed_out);
    assert!(!future.ready());

    // Out-of-band kill: the engine has no native cancellation.
    let id = future.id().unwrap();
    let _ = Engine::new()
        .launch_process("killer", "kill", ["-9", &id.to_string()], None)
        .await
        .unwrap()
        .get()
        .await;

    match future.get().await {
        Err(Error::ProcessFailed { code, .. }) => assert_eq!(code, None),
        other => panic!("expected kill to surface as process failure, got {other:?}"),
    }
}
