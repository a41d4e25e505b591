//! Worker handle stream handling with the test acting as the worker.
//!
//! Covers frame reassembly across reads, noise tolerance, unsolicited
//! frames, malformed bytes, and stream closure while a task is pending.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::mpsc;

use agent_pool::models::agent::AgentName;
use agent_pool::models::worker::WorkerState;
use agent_pool::worker::{WorkerEvent, WorkerHandle, WorkerIo};
use agent_pool::AppError;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    handle: Arc<WorkerHandle>,
    worker_in: Lines<BufReader<DuplexStream>>,
    worker_out: DuplexStream,
    events: mpsc::Receiver<WorkerEvent>,
}

fn attach(worker_id: u64) -> Harness {
    let (pool_stdin, worker_stdin) = tokio::io::duplex(64 * 1024);
    let (worker_stdout, pool_stdout) = tokio::io::duplex(64 * 1024);
    let (event_tx, events) = mpsc::channel(8);

    let handle = WorkerHandle::attach(
        &AgentName::parse("tester").unwrap(),
        worker_id,
        WorkerIo::from_streams(pool_stdin, pool_stdout),
        event_tx,
        Duration::from_millis(100),
    );

    Harness {
        handle,
        worker_in: BufReader::new(worker_stdin).lines(),
        worker_out: worker_stdout,
        events,
    }
}

async fn next_content(lines: &mut Lines<BufReader<DuplexStream>>) -> String {
    let line = lines.next_line().await.unwrap().expect("worker input line");
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["type"], "user");
    assert_eq!(value["message"]["role"], "user");
    value["message"]["content"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn frame_split_across_writes_is_reassembled() {
    let mut h = attach(1);
    let handle = Arc::clone(&h.handle);
    let task = tokio::spawn(async move { handle.run_task("split", TIMEOUT).await });

    assert_eq!(next_content(&mut h.worker_in).await, "split");
    h.worker_out
        .write_all(br#"{"type":"result","res"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.worker_out
        .write_all(b"ult\":\"joined\"}\n")
        .await
        .unwrap();

    assert_eq!(task.await.unwrap().unwrap(), "joined");
    assert_eq!(next_content(&mut h.worker_in).await, "/clear");
}

#[tokio::test]
async fn non_string_result_is_rendered_as_json() {
    let mut h = attach(1);
    let handle = Arc::clone(&h.handle);
    let task = tokio::spawn(async move { handle.run_task("structured", TIMEOUT).await });

    next_content(&mut h.worker_in).await;
    h.worker_out
        .write_all(b"{\"type\":\"result\",\"result\":{\"ok\":true}}\n")
        .await
        .unwrap();

    assert_eq!(task.await.unwrap().unwrap(), r#"{"ok":true}"#);
}

#[tokio::test]
async fn unsolicited_result_before_a_task_is_discarded() {
    let mut h = attach(1);
    h.worker_out
        .write_all(b"{\"type\":\"result\",\"result\":\"stray\"}\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let handle = Arc::clone(&h.handle);
    let task = tokio::spawn(async move { handle.run_task("real", TIMEOUT).await });
    assert_eq!(next_content(&mut h.worker_in).await, "real");
    h.worker_out
        .write_all(b"{\"type\":\"result\",\"result\":\"mine\"}\n")
        .await
        .unwrap();

    assert_eq!(task.await.unwrap().unwrap(), "mine");
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped() {
    let mut h = attach(1);
    h.worker_out.write_all(&[0xff, 0xfe, b'\n']).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let handle = Arc::clone(&h.handle);
    let task = tokio::spawn(async move { handle.run_task("after noise", TIMEOUT).await });
    next_content(&mut h.worker_in).await;
    h.worker_out
        .write_all(b"{\"type\":\"result\",\"result\":\"still here\"}\n")
        .await
        .unwrap();

    assert_eq!(task.await.unwrap().unwrap(), "still here");
    assert!(h.handle.is_live().await);
}

#[tokio::test]
async fn closed_output_rejects_pending_task_and_retires_worker() {
    let mut h = attach(7);
    let handle = Arc::clone(&h.handle);
    let task = tokio::spawn(async move { handle.run_task("doomed", TIMEOUT).await });

    next_content(&mut h.worker_in).await;
    drop(h.worker_out);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, AppError::WorkerClosed(_)), "{err:?}");
    assert_eq!(h.handle.state().await, WorkerState::Dead);

    let event = tokio::time::timeout(TIMEOUT, h.events.recv())
        .await
        .unwrap()
        .expect("retirement event");
    let WorkerEvent::Retired {
        agent, worker_id, ..
    } = event;
    assert_eq!(agent, "tester");
    assert_eq!(worker_id, 7);
}

#[tokio::test]
async fn tasks_on_one_worker_are_serialized() {
    let mut h = attach(1);
    let first = {
        let handle = Arc::clone(&h.handle);
        tokio::spawn(async move { handle.run_task("one", TIMEOUT).await })
    };
    assert_eq!(next_content(&mut h.worker_in).await, "one");

    let second = {
        let handle = Arc::clone(&h.handle);
        tokio::spawn(async move { handle.run_task("two", TIMEOUT).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.handle.state().await, WorkerState::Busy);

    h.worker_out
        .write_all(b"{\"type\":\"result\",\"result\":\"r1\"}\n")
        .await
        .unwrap();
    assert_eq!(next_content(&mut h.worker_in).await, "/clear");
    assert_eq!(next_content(&mut h.worker_in).await, "two");
    h.worker_out
        .write_all(b"{\"type\":\"result\",\"result\":\"r2\"}\n")
        .await
        .unwrap();

    assert_eq!(first.await.unwrap().unwrap(), "r1");
    assert_eq!(second.await.unwrap().unwrap(), "r2");
}

#[tokio::test]
async fn terminate_rejects_new_tasks() {
    let h = attach(1);
    h.handle.terminate().await;

    assert!(h.handle.is_terminating());
    assert_eq!(h.handle.state().await, WorkerState::Terminating);
    let err = h.handle.run_task("late", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, AppError::WorkerClosed(_)), "{err:?}");
}
