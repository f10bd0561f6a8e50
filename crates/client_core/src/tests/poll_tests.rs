use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::*;
use crate::{
    animation::AnimationController,
    store::StateStore,
    test_support::{driver, path, two_node_snapshot},
};
use tokio::time::Instant;

#[derive(Default)]
struct CountingTarget {
    polls: AtomicUsize,
}

#[async_trait]
impl PollTarget for CountingTarget {
    async fn poll_once(&self) {
        self.polls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn runs_the_whole_budget_at_fixed_cadence() {
    let target = CountingTarget::default();
    let started = Instant::now();

    let summary = PollLoop::new(Duration::from_millis(500), 6)
        .run(&target)
        .await;

    assert_eq!(
        summary,
        PollSummary {
            iterations: 6,
            stopped_early: false,
        }
    );
    assert_eq!(target.polls.load(Ordering::SeqCst), 6);
    assert!(started.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn stops_once_the_accompanied_run_is_cancelled() {
    let store = Arc::new(StateStore::with_snapshot(two_node_snapshot()));
    let animations = Arc::new(AnimationController::new(
        Arc::clone(&store),
        Duration::from_millis(300),
    ));
    let run = animations
        .start(driver("d1"), path(&["B"]))
        .await
        .expect("start");
    let target = Arc::new(CountingTarget::default());

    let poll = {
        let target = Arc::clone(&target);
        let watch = run.watch();
        tokio::spawn(async move {
            PollLoop::new(Duration::from_millis(500), 10)
                .until_finished(watch)
                .run(target.as_ref())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(1200)).await;
    animations.cancel(&driver("d1")).await;

    let summary = poll.await.expect("join");
    assert!(summary.stopped_early);
    assert_eq!(summary.iterations, 2);
    assert_eq!(target.polls.load(Ordering::SeqCst), 2);
    drop(run);
}

#[tokio::test(start_paused = true)]
async fn finished_run_stops_the_loop_before_first_poll() {
    let store = Arc::new(StateStore::with_snapshot(two_node_snapshot()));
    let animations = AnimationController::new(Arc::clone(&store), Duration::from_millis(300));
    let run = animations
        .start(driver("d1"), path(&["B"]))
        .await
        .expect("start");
    let watch = run.watch();
    animations.cancel(&driver("d1")).await;

    let target = CountingTarget::default();
    let summary = PollLoop::new(Duration::from_millis(500), 6)
        .until_finished(watch)
        .run(&target)
        .await;

    assert_eq!(summary.iterations, 0);
    assert!(summary.stopped_early);
}
