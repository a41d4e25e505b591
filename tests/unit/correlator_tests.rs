//! Task correlation without a worker process.

use std::time::Duration;

use tokio::time::Instant;

use agent_pool::models::worker::WorkerState;
use agent_pool::worker::correlator::{Correlator, FrameDisposition};
use agent_pool::worker::frame::InboundFrame;
use agent_pool::AppError;

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

fn result(text: &str) -> InboundFrame {
    InboundFrame::Result {
        text: text.into(),
        is_error: false,
    }
}

#[tokio::test]
async fn completion_resolves_the_pending_task() {
    let mut correlator = Correlator::new("coder");
    let dispatch = correlator.begin(deadline()).unwrap();
    assert_eq!(correlator.state(), WorkerState::Busy);

    let FrameDisposition::Completed(completion) = correlator.on_frame(result("done")) else {
        panic!("expected completion");
    };
    assert_eq!(completion.task_id, dispatch.task_id);
    assert_eq!(correlator.state(), WorkerState::Ready);
    assert!(!correlator.has_pending());

    completion.deliver();
    assert_eq!(dispatch.receiver.await.unwrap().unwrap(), "done");
}

#[test]
fn second_completion_cannot_resolve_twice() {
    let mut correlator = Correlator::new("coder");
    let _dispatch = correlator.begin(deadline()).unwrap();

    assert!(matches!(
        correlator.on_frame(result("one")),
        FrameDisposition::Completed(_)
    ));
    assert!(matches!(
        correlator.on_frame(result("two")),
        FrameDisposition::Unsolicited
    ));
}

#[test]
fn progress_is_ignored() {
    let mut correlator = Correlator::new("coder");
    let _dispatch = correlator.begin(deadline()).unwrap();

    let progress = InboundFrame::Progress {
        kind: "assistant".into(),
    };
    assert!(matches!(
        correlator.on_frame(progress),
        FrameDisposition::Ignored
    ));
    assert!(matches!(
        correlator.on_frame(InboundFrame::Unknown),
        FrameDisposition::Ignored
    ));
    assert!(correlator.has_pending());
}

#[test]
fn begin_while_busy_is_refused() {
    let mut correlator = Correlator::new("coder");
    let _dispatch = correlator.begin(deadline()).unwrap();

    let err = correlator.begin(deadline()).unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)), "{err:?}");
}

#[test]
fn task_ids_increase() {
    let mut correlator = Correlator::new("coder");
    let first = correlator.begin(deadline()).unwrap();
    correlator.on_frame(result("a"));
    let second = correlator.begin(deadline()).unwrap();
    assert!(second.task_id > first.task_id);
}

#[test]
fn expiry_owes_one_late_frame_and_frees_the_worker() {
    let mut correlator = Correlator::new("coder");
    let timed_out = correlator.begin(deadline()).unwrap();

    assert!(correlator.expire(timed_out.task_id));
    assert_eq!(correlator.state(), WorkerState::Ready);
    assert_eq!(correlator.late_frames(), 1);

    let next = correlator.begin(deadline()).unwrap();
    assert!(matches!(
        correlator.on_frame(result("late")),
        FrameDisposition::LateDiscarded
    ));
    assert_eq!(correlator.late_frames(), 0);

    let FrameDisposition::Completed(completion) = correlator.on_frame(result("fresh")) else {
        panic!("expected completion");
    };
    assert_eq!(completion.task_id, next.task_id);
}

#[test]
fn expiry_after_completion_is_a_no_op() {
    let mut correlator = Correlator::new("coder");
    let dispatch = correlator.begin(deadline()).unwrap();
    let FrameDisposition::Completed(completion) = correlator.on_frame(result("won")) else {
        panic!("expected completion");
    };

    assert!(!correlator.expire(dispatch.task_id));
    assert_eq!(correlator.late_frames(), 0);
    completion.deliver();
}

#[tokio::test]
async fn terminate_rejects_pending_task() {
    let mut correlator = Correlator::new("coder");
    let dispatch = correlator.begin(deadline()).unwrap();

    correlator.terminate();
    assert_eq!(correlator.state(), WorkerState::Terminating);

    let err = dispatch.receiver.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        AppError::WorkerClosed("agent coder: worker evicted".into())
    );
    assert!(matches!(
        correlator.begin(deadline()).unwrap_err(),
        AppError::WorkerClosed(_)
    ));
}

#[tokio::test]
async fn close_rejects_pending_task_and_kills_the_worker() {
    let mut correlator = Correlator::new("coder");
    let dispatch = correlator.begin(deadline()).unwrap();

    assert!(correlator.close("process closed"));
    assert_eq!(correlator.state(), WorkerState::Dead);
    assert!(!correlator.close("again"), "nothing left to reject");

    let err = dispatch.receiver.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        AppError::WorkerClosed("agent coder: process closed".into())
    );
}

#[test]
fn abandon_frees_the_worker_without_owing_a_frame() {
    let mut correlator = Correlator::new("coder");
    let dispatch = correlator.begin(deadline()).unwrap();

    correlator.abandon(dispatch.task_id);
    assert_eq!(correlator.state(), WorkerState::Ready);
    assert_eq!(correlator.late_frames(), 0);
    assert!(!correlator.has_pending());
}

#[test]
fn debt_is_cleared_when_a_task_that_absorbed_a_frame_times_out() {
    let mut correlator = Correlator::new("coder");

    let dropped = correlator.begin(deadline()).unwrap();
    assert!(correlator.expire(dropped.task_id));
    assert_eq!(correlator.late_frames(), 1);

    let misattributed = correlator.begin(deadline()).unwrap();
    assert!(matches!(
        correlator.on_frame(result("its own answer")),
        FrameDisposition::LateDiscarded
    ));
    assert!(correlator.expire(misattributed.task_id));
    assert_eq!(correlator.late_frames(), 0, "debt must not carry forward");

    let next = correlator.begin(deadline()).unwrap();
    let FrameDisposition::Completed(completion) = correlator.on_frame(result("fresh")) else {
        panic!("expected completion");
    };
    assert_eq!(completion.task_id, next.task_id);
}

#[test]
fn silent_timeouts_accumulate_debt() {
    let mut correlator = Correlator::new("coder");

    for _ in 0..2 {
        let dispatch = correlator.begin(deadline()).unwrap();
        assert!(correlator.expire(dispatch.task_id));
    }
    assert_eq!(correlator.late_frames(), 2);
}
