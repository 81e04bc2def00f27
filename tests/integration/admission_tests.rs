use std::sync::{Arc, Barrier};
use std::thread;

use ipdb_integration_tests::controller;
use ipdb_rate_limit::{Admission, AdmissionConfig, AdmissionController};
use tokio::time::{self, Duration, Instant};

#[test]
fn test_burst_then_deny_for_any_capacity() {
    for burst in [1, 2, 3, 7, 50] {
        let limiter = controller(1.0, burst);
        let now = Instant::now();

        for _ in 0..burst {
            assert!(limiter.check_at("client", now).is_allowed());
        }
        assert!(!limiter.check_at("client", now).is_allowed());
    }
}

#[test]
fn test_one_more_after_refill_period() {
    let limiter = controller(4.0, 2);
    let start = Instant::now();

    assert!(limiter.check_at("client", start).is_allowed());
    assert!(limiter.check_at("client", start).is_allowed());
    assert!(!limiter.check_at("client", start).is_allowed());

    let later = start + Duration::from_millis(250);
    assert!(limiter.check_at("client", later).is_allowed());
    assert!(!limiter.check_at("client", later).is_allowed());
}

#[test]
fn test_different_keys() {
    let limiter = controller(10.0, 2);
    let now = Instant::now();

    assert!(limiter.check_at("client-a", now).is_allowed());
    assert!(limiter.check_at("client-a", now).is_allowed());
    assert!(!limiter.check_at("client-a", now).is_allowed());

    // Different client should have its own bucket
    assert!(limiter.check_at("client-b", now).is_allowed());
    assert!(limiter.check_at("client-b", now).is_allowed());
    assert!(!limiter.check_at("client-b", now).is_allowed());
}

#[test]
fn test_idle_client_evicted_active_client_kept() {
    let limiter = controller(2.0, 4);
    let base = Instant::now();

    limiter.check_at("idle", base);
    limiter.check_at("active", base);
    limiter.check_at("active", base + Duration::from_secs(170));

    let evicted = limiter.sweep_at(base + Duration::from_secs(181));

    assert_eq!(evicted, 1);
    assert!(!limiter.registry().contains("idle"));
    assert!(limiter.registry().contains("active"));
    assert!(limiter.registry().is_consistent());
}

#[test]
fn test_evicted_client_starts_with_fresh_bucket() {
    let limiter = controller(0.001, 1);
    let base = Instant::now();

    assert!(limiter.check_at("client", base).is_allowed());
    assert!(!limiter.check_at("client", base).is_allowed());

    let later = base + Duration::from_secs(200);
    limiter.sweep_at(later);
    assert!(limiter.registry().is_empty());

    assert!(limiter.check_at("client", later).is_allowed());
}

#[test]
fn test_concurrent_first_requests_create_one_record() {
    const THREADS: usize = 32;
    let limiter = controller(1.0, THREADS as u32 / 2);
    let barrier = Arc::new(Barrier::new(THREADS));
    let now = Instant::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = limiter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                limiter.check_at("10.0.0.1", now)
            })
        })
        .collect();

    let allowed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Admission::is_allowed)
        .count();

    // One shared bucket: exactly `burst` of the simultaneous first requests pass.
    assert_eq!(allowed, THREADS / 2);
    assert_eq!(limiter.registry().len(), 1);
    assert!(limiter.registry().is_consistent());
}

#[test]
fn test_concurrent_many_clients_stay_consistent() {
    const THREADS: usize = 8;
    let limiter = controller(5.0, 3);
    let base = Instant::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                for i in 0..200u64 {
                    let id = format!("10.0.{}.{}", t, i % 25);
                    limiter.check_at(&id, base + Duration::from_millis(i));
                    if i % 50 == 0 {
                        limiter.sweep_at(base + Duration::from_secs(1));
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(limiter.registry().len(), THREADS * 25);
    assert!(limiter.registry().is_consistent());

    assert_eq!(limiter.sweep_at(base + Duration::from_secs(600)), THREADS * 25);
    assert!(limiter.registry().is_empty());
}

/// rps=2, burst=4 against client "10.0.0.1" with a live reaper.
#[tokio::test(start_paused = true)]
async fn test_rate_limit_and_reclaim_scenario() {
    let limiter = AdmissionController::new(AdmissionConfig {
        enabled: true,
        rps: 2.0,
        burst: 4,
        idle_threshold: Duration::from_secs(180),
        sweep_interval: Duration::from_secs(60),
    })
    .unwrap();
    limiter.start().unwrap();

    for _ in 0..4 {
        assert_eq!(limiter.check("10.0.0.1"), Admission::Allowed);
    }
    assert!(!limiter.check("10.0.0.1").is_allowed());

    time::sleep(Duration::from_millis(500)).await;
    assert!(limiter.check("10.0.0.1").is_allowed());
    assert!(limiter.registry().contains("10.0.0.1"));

    time::sleep(Duration::from_secs(4 * 60)).await;
    assert!(!limiter.registry().contains("10.0.0.1"));
    assert_eq!(limiter.stats().evicted_clients, 1);

    limiter.stop().await;
    assert!(!limiter.is_running());
}
