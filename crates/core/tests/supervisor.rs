#![cfg(unix)]

use std::time::{Duration, Instant};

use llama_launcher_core::config::SupervisorConfig;
use llama_launcher_core::{LaunchCommand, LaunchError, OutputSource, RunState, Supervisor};

fn sh(script: &str) -> LaunchCommand {
    LaunchCommand::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

fn supervisor(grace: Duration) -> Supervisor {
    let config = SupervisorConfig {
        grace_period_secs: 5,
        output_buffer: 16,
    };
    Supervisor::new(&config).with_grace_period(grace)
}

async fn within<T>(limit: Duration, fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(limit, fut)
        .await
        .expect("operation did not finish in time")
}

#[tokio::test]
async fn test_streams_lines_in_order() {
    let supervisor = supervisor(Duration::from_secs(1));
    let mut run = supervisor
        .start(&sh("for i in 1 2 3; do echo line$i; done"))
        .await
        .unwrap();

    let mut lines = Vec::new();
    while let Some(line) = within(Duration::from_secs(5), run.output.next()).await {
        assert_eq!(line.source, OutputSource::Stdout);
        lines.push(line.text);
    }

    assert_eq!(lines, ["line1", "line2", "line3"]);
    assert_eq!(run.control.wait().await, RunState::Completed);
    assert_eq!(supervisor.status().await, RunState::Completed);
}

#[tokio::test]
async fn test_non_zero_exit_is_observed() {
    let supervisor = supervisor(Duration::from_secs(1));
    let mut run = supervisor.start(&sh("echo oops >&2; exit 3")).await.unwrap();

    let line = within(Duration::from_secs(5), run.output.next()).await.unwrap();
    assert_eq!(line.source, OutputSource::Stderr);
    assert_eq!(line.text, "oops");

    assert_eq!(
        within(Duration::from_secs(5), run.control.wait()).await,
        RunState::Failed {
            code: Some(3),
            stopped: false
        }
    );
}

#[tokio::test]
async fn test_second_start_is_busy() {
    let supervisor = supervisor(Duration::from_secs(1));
    let run = supervisor.start(&sh("exec sleep 30")).await.unwrap();

    let second = supervisor.start(&sh("echo never")).await;
    assert!(matches!(second, Err(LaunchError::Busy)));
    assert_eq!(run.control.state(), RunState::Running);
    assert_eq!(supervisor.status().await, RunState::Running);

    run.control.stop().await;
}

#[tokio::test]
async fn test_start_after_previous_run_finished() {
    let supervisor = supervisor(Duration::from_secs(1));
    let first = supervisor.start(&sh("true")).await.unwrap();
    within(Duration::from_secs(5), first.control.wait()).await;

    let second = supervisor.start(&sh("exit 0")).await.unwrap();
    assert_eq!(
        within(Duration::from_secs(5), second.control.wait()).await,
        RunState::Completed
    );
}

#[tokio::test]
async fn test_stop_terminates_gracefully() {
    let supervisor = supervisor(Duration::from_secs(10));
    let run = supervisor.start(&sh("exec sleep 30")).await.unwrap();

    let started = Instant::now();
    let state = within(Duration::from_secs(5), run.control.stop()).await;

    assert_eq!(
        state,
        RunState::Failed {
            code: None,
            stopped: true
        }
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_kills_child_ignoring_sigterm() {
    let grace = Duration::from_millis(300);
    let supervisor = supervisor(grace);
    let mut run = supervisor
        .start(&sh("trap '' TERM; echo ready; exec sleep 30"))
        .await
        .unwrap();

    // The trap is installed once the child has printed.
    let ready = within(Duration::from_secs(5), run.output.next()).await.unwrap();
    assert_eq!(ready.text, "ready");

    let started = Instant::now();
    let state = within(Duration::from_secs(5), supervisor.stop()).await;

    assert_eq!(
        state,
        Some(RunState::Failed {
            code: None,
            stopped: true
        })
    );
    assert!(started.elapsed() >= grace);
}

#[tokio::test]
async fn test_stopping_state_is_visible() {
    let supervisor = supervisor(Duration::from_millis(500));
    let mut run = supervisor
        .start(&sh("trap '' TERM; echo ready; exec sleep 30"))
        .await
        .unwrap();
    within(Duration::from_secs(5), run.output.next()).await;

    let mut states = run.control.subscribe();
    run.control.request_stop();

    within(
        Duration::from_secs(5),
        states.wait_for(|state| *state == RunState::Stopping),
    )
    .await
    .unwrap();
    assert!(matches!(
        supervisor.start(&sh("true")).await,
        Err(LaunchError::Busy)
    ));

    assert!(within(Duration::from_secs(5), run.control.wait())
        .await
        .is_terminal());
}

#[tokio::test]
async fn test_output_stream_ends_after_stop() {
    let supervisor = supervisor(Duration::from_secs(1));
    let mut run = supervisor
        .start(&sh("echo first; exec sleep 30"))
        .await
        .unwrap();

    let first = within(Duration::from_secs(5), run.output.next()).await.unwrap();
    assert_eq!(first.text, "first");

    run.control.request_stop();
    assert_eq!(within(Duration::from_secs(5), run.output.next()).await, None);
}

#[tokio::test]
async fn test_spawn_failure_is_reported() {
    let supervisor = supervisor(Duration::from_secs(1));
    let missing = LaunchCommand::new("/nonexistent/llama-cli", vec![]);

    let result = supervisor.start(&missing).await;
    assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    assert_eq!(
        supervisor.status().await,
        RunState::Failed {
            code: None,
            stopped: false
        }
    );

    // A failed spawn does not block the next start.
    let run = supervisor.start(&sh("true")).await.unwrap();
    within(Duration::from_secs(5), run.control.wait()).await;
}

#[tokio::test]
async fn test_dropped_output_does_not_block_child() {
    let config = SupervisorConfig {
        grace_period_secs: 1,
        output_buffer: 1,
    };
    let supervisor = Supervisor::new(&config);
    let (control, output) = supervisor
        .start(&sh(
            "i=0; while [ $i -lt 5000 ]; do echo 'some fairly long line of output text'; i=$((i+1)); done",
        ))
        .await
        .unwrap()
        .into_parts();
    drop(output);

    assert_eq!(
        within(Duration::from_secs(10), control.wait()).await,
        RunState::Completed
    );
}
