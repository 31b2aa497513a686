//! Reaper tests. Ticks are single-stepped against a manual clock.

mod common;

use common::{FlakyStore, LEASE, engine_over, holder, item, q, test_engine};
use leaseq::engine::{Reaper, TickReport};
use leaseq::error::Error;
use leaseq::model::Summary;
use std::sync::Arc;
use std::time::Duration;

fn reaper_for(engine: &leaseq::engine::Engine) -> Reaper {
    Reaper::new(engine.clone(), Duration::from_secs(5))
}

/// An expired lease goes back to queued and is redelivered to a new holder.
#[tokio::test]
async fn expired_lease_is_reclaimed_and_redelivered() {
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("b")).await.unwrap();

    assert_eq!(engine.next(&jobs, &holder("h1")).await.unwrap(), Some(item("b")));

    clock.advance(LEASE + Duration::from_secs(1));
    let report = reaper.tick().await;
    assert_eq!(report.reclaimed, 1);
    assert_eq!(engine.list_queued(&jobs).await.unwrap(), vec![item("b")]);
    assert!(engine.list_pending(&jobs).await.unwrap().is_empty());

    assert_eq!(engine.next(&jobs, &holder("h2")).await.unwrap(), Some(item("b")));
    let lease = engine.lease(&jobs, &item("b")).await.unwrap().unwrap();
    assert_eq!(lease.holder, holder("h2"));
    assert_eq!(engine.ttl(&jobs, &item("b")).await.unwrap(), LEASE);
}

#[tokio::test]
async fn active_lease_is_left_alone() {
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("a")).await.unwrap();
    engine.next(&jobs, &holder("h1")).await.unwrap();

    clock.advance(LEASE - Duration::from_secs(1));
    let report = reaper.tick().await;
    assert_eq!(
        report,
        TickReport {
            queues: 1,
            scanned: 1,
            reclaimed: 0,
            failures: 0
        }
    );
    assert_eq!(engine.summary(&jobs).await.unwrap(), Summary::new(0, 1, 0));

    // Expiry is inclusive: at exactly the lease duration the item is fair game.
    clock.advance(Duration::from_secs(1));
    assert_eq!(reaper.tick().await.reclaimed, 1);
}

#[tokio::test]
async fn forced_expire_is_reclaimed_on_the_next_tick() {
    let (engine, _) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("a")).await.unwrap();
    engine.enqueue(&jobs, &item("b")).await.unwrap();
    engine.next(&jobs, &holder("h1")).await.unwrap();
    engine.next(&jobs, &holder("h1")).await.unwrap();

    engine.expire(&jobs, &item("a")).await.unwrap();
    let report = reaper.tick().await;

    assert_eq!(report.reclaimed, 1);
    assert_eq!(engine.list_queued(&jobs).await.unwrap(), vec![item("a")]);
    assert_eq!(engine.list_pending(&jobs).await.unwrap(), vec![item("b")]);
}

#[tokio::test]
async fn completed_item_is_not_reclaimed() {
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    let h1 = holder("h1");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("a")).await.unwrap();
    engine.next(&jobs, &h1).await.unwrap();

    clock.advance(LEASE * 2);
    // Late completion still wins if it lands before the reaper.
    engine.done(&jobs, &item("a"), &h1).await.unwrap();

    assert_eq!(reaper.tick().await.reclaimed, 0);
    assert_eq!(engine.summary(&jobs).await.unwrap(), Summary::new(0, 0, 1));
}

#[tokio::test]
async fn reclaimed_item_can_no_longer_be_completed() {
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    let h1 = holder("h1");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("a")).await.unwrap();
    engine.next(&jobs, &h1).await.unwrap();

    clock.advance(LEASE);
    reaper.tick().await;

    let err = engine.done(&jobs, &item("a"), &h1).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    assert_eq!(engine.summary(&jobs).await.unwrap(), Summary::new(1, 0, 0));
}

#[tokio::test]
async fn extended_lease_survives_past_original_expiry() {
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    let h1 = holder("h1");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("a")).await.unwrap();
    engine.next(&jobs, &h1).await.unwrap();

    clock.advance(Duration::from_secs(200));
    engine.extend(&jobs, &item("a"), &h1).await.unwrap();
    clock.advance(Duration::from_secs(200));

    assert_eq!(reaper.tick().await.reclaimed, 0);
    assert_eq!(engine.list_pending(&jobs).await.unwrap(), vec![item("a")]);
}

#[tokio::test]
async fn duplicate_pending_items_are_each_reclaimed_once() {
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    let h1 = holder("h1");
    engine.create(&jobs).await.unwrap();
    for name in ["a", "a", "b"] {
        engine.enqueue(&jobs, &item(name)).await.unwrap();
        engine.next(&jobs, &h1).await.unwrap();
    }

    clock.advance(LEASE);
    let report = reaper.tick().await;

    assert_eq!(report.scanned, 3);
    assert_eq!(report.reclaimed, 3);
    assert_eq!(engine.summary(&jobs).await.unwrap(), Summary::new(3, 0, 0));
}

#[tokio::test]
async fn broken_queue_does_not_block_the_others() {
    let (engine, clock) = engine_over(Arc::new(FlakyStore::default()));
    let reaper = reaper_for(&engine);
    let h1 = holder("h1");

    for name in ["alpha", "broken", "omega"] {
        let queue = q(name);
        engine.create(&queue).await.unwrap();
        engine.enqueue(&queue, &item("a")).await.unwrap();
        engine.next(&queue, &h1).await.unwrap();
    }
    clock.advance(LEASE);

    let report = reaper.tick().await;
    assert_eq!(report.queues, 3);
    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(engine.list_queued(&q("alpha")).await.unwrap(), vec![item("a")]);
    assert_eq!(engine.list_queued(&q("omega")).await.unwrap(), vec![item("a")]);
}

#[tokio::test]
async fn failed_lease_lookup_skips_only_that_item() {
    let (engine, clock) = engine_over(Arc::new(FlakyStore::default()));
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    let h1 = holder("h1");
    engine.create(&jobs).await.unwrap();
    for name in ["poison", "fine"] {
        engine.enqueue(&jobs, &item(name)).await.unwrap();
        engine.next(&jobs, &h1).await.unwrap();
    }
    clock.advance(LEASE);

    let report = reaper.tick().await;
    assert_eq!(report.failures, 1);
    assert_eq!(report.reclaimed, 1);
    assert_eq!(engine.list_queued(&jobs).await.unwrap(), vec![item("fine")]);
    assert_eq!(engine.list_pending(&jobs).await.unwrap(), vec![item("poison")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_done_and_reclaim_never_both_succeed() {
    const N: usize = 100;
    let (engine, clock) = test_engine();
    let reaper = reaper_for(&engine);
    let jobs = q("jobs");
    let h1 = holder("h1");
    engine.create(&jobs).await.unwrap();
    for n in 0..N {
        engine.enqueue(&jobs, &item(&format!("job-{n}"))).await.unwrap();
        engine.next(&jobs, &h1).await.unwrap();
    }
    clock.advance(LEASE);

    let completer = {
        let engine = engine.clone();
        let jobs = jobs.clone();
        tokio::spawn(async move {
            let mut completed = 0usize;
            for n in 0..N {
                let it = item(&format!("job-{n}"));
                if engine.done(&jobs, &it, &holder("h1")).await.is_ok() {
                    completed += 1;
                }
            }
            completed
        })
    };
    let report = reaper.tick().await;
    let completed = completer.await.unwrap();

    assert_eq!(completed + report.reclaimed, N);
    assert_eq!(
        engine.summary(&jobs).await.unwrap(),
        Summary::new(report.reclaimed as u64, 0, completed as u64)
    );
}

#[tokio::test]
async fn spawned_reaper_reclaims_until_stopped() {
    let (engine, clock) = test_engine();
    let jobs = q("jobs");
    engine.create(&jobs).await.unwrap();
    engine.enqueue(&jobs, &item("a")).await.unwrap();
    engine.next(&jobs, &holder("h1")).await.unwrap();
    clock.advance(LEASE);

    let handle = Reaper::new(engine.clone(), Duration::from_millis(10)).spawn();

    let mut reclaimed = false;
    for _ in 0..200 {
        if !engine.list_queued(&jobs).await.unwrap().is_empty() {
            reclaimed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reclaimed, "reaper never reclaimed the expired item");

    handle.stop().await;

    // Nothing reclaims once stopped.
    engine.next(&jobs, &holder("h2")).await.unwrap();
    clock.advance(LEASE);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.summary(&jobs).await.unwrap(), Summary::new(0, 1, 0));
}
