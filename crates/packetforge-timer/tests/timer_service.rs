//! Integration tests for timers.
//!
//! Uses a paused tokio clock: sleeps resolve as soon as the runtime is
//! idle, so the tests run instantly and deterministically.

use std::time::Duration;

use packetforge_dispatch::{DispatchQueue, Packet, Routing};
use packetforge_timer::{
    standard_period, TimerConfig, TimerPolicy, TimerScheduler, TimerService, TIMER_100_MSEC,
    TIMER_10_SEC, TIMER_1_SEC,
};
use tokio::time::Instant;

// =========================================================================
// Configuration
// =========================================================================

#[test]
fn test_standard_periods() {
    assert_eq!(standard_period(TIMER_100_MSEC), Some(Duration::from_millis(100)));
    assert_eq!(standard_period(TIMER_1_SEC), Some(Duration::from_secs(1)));
    assert_eq!(standard_period(TIMER_10_SEC), Some(Duration::from_secs(10)));
    assert_eq!(standard_period(100), None);
}

#[test]
fn test_standard_set_has_seven_timers() {
    let set = TimerConfig::standard_set();
    let ids: Vec<_> = set.iter().map(|t| t.timer_id).collect();
    assert_eq!(ids, [1, 2, 3, 4, 5, 6, 7]);
    assert!(set.windows(2).all(|w| w[0].period < w[1].period));
}

#[test]
fn test_zero_period_is_clamped() {
    let cfg = TimerConfig::every(9, Duration::ZERO).validated();
    assert_eq!(cfg.period, TimerConfig::MIN_PERIOD);
}

// =========================================================================
// Scheduler
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduler_fires_on_period() {
    let start = Instant::now();
    let mut s = TimerScheduler::new(TimerConfig::every(3, Duration::from_millis(50)));
    for expected in 1..=4 {
        let fire = s.wait().await;
        assert_eq!(fire.count, expected);
        assert_eq!(fire.timer_id, 3);
        assert!(!fire.overrun);
    }
    assert_eq!(start.elapsed(), Duration::from_millis(200));
    assert_eq!(s.metrics().total_fires, 4);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_only_delays_first_fire() {
    let start = Instant::now();
    let cfg = TimerConfig::every(1, Duration::from_millis(100)).with_jitter(Duration::from_millis(20));
    let mut s = TimerScheduler::new(cfg);
    s.wait().await;
    let first = start.elapsed();
    assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(121));
}

#[tokio::test(start_paused = true)]
async fn test_sub_microsecond_jitter_is_accepted() {
    let start = Instant::now();
    let cfg = TimerConfig::every(1, Duration::from_millis(10)).with_jitter(Duration::from_nanos(500));
    let mut s = TimerScheduler::new(cfg);
    assert_eq!(s.wait().await.count, 1);
    let first = start.elapsed();
    assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(11));
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_drops_missed_periods() {
    let mut s = TimerScheduler::new(TimerConfig::every(1, Duration::from_millis(10)));
    tokio::time::advance(Duration::from_millis(55)).await;
    let fire = s.wait().await;
    assert!(fire.overrun);
    assert_eq!(fire.skipped, 4);

    // Next fire is a full period after the late one.
    let before = Instant::now();
    s.wait().await;
    assert_eq!(before.elapsed(), Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn test_catch_up_policy_fires_back_to_back() {
    let cfg = TimerConfig::every(1, Duration::from_millis(10))
        .with_policy(TimerPolicy::CatchUp { max_catchup: 8 });
    let mut s = TimerScheduler::new(cfg);
    tokio::time::advance(Duration::from_millis(40)).await;

    let before = Instant::now();
    for _ in 0..4 {
        s.wait().await;
    }
    // The first four deadlines (10, 20, 30, 40 ms) had all passed.
    assert_eq!(before.elapsed(), Duration::ZERO);
    assert_eq!(s.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_the_grid() {
    let start = Instant::now();
    let cfg = TimerConfig::every(1, Duration::from_millis(10)).with_policy(TimerPolicy::Drop);
    let mut s = TimerScheduler::new(cfg);
    tokio::time::advance(Duration::from_millis(35)).await;

    // Due at 10ms, fired at 35ms: the 20ms and 30ms deadlines are gone.
    let fire = s.wait().await;
    assert!(fire.overrun);
    assert_eq!(fire.skipped, 2);

    s.wait().await;
    assert_eq!(start.elapsed(), Duration::from_millis(40));
    assert_eq!(s.metrics().total_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_survives_very_long_stalls() {
    let cfg = TimerConfig::every(1, Duration::from_millis(1)).with_policy(TimerPolicy::Drop);
    let mut s = TimerScheduler::new(cfg);
    // More missed periods than fit in a u32.
    tokio::time::advance(Duration::from_secs(50 * 24 * 3600)).await;

    let fire = s.wait().await;
    assert_eq!(fire.skipped, 50 * 24 * 3600 * 1000 - 1);

    let before = Instant::now();
    s.wait().await;
    assert_eq!(before.elapsed(), Duration::from_millis(1));
}

// =========================================================================
// Service
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_service_pushes_timer_packets() {
    let (queue, mut rx) = DispatchQueue::new(1, Routing::ByConnection);
    let service = TimerService::spawn(
        queue.clone(),
        [TimerConfig::every(42, Duration::from_millis(100))],
    );
    assert_eq!(service.timer_ids(), [42]);

    let start = Instant::now();
    for _ in 0..3 {
        let packet = rx[0].pop().await.unwrap();
        assert!(matches!(packet, Packet::Timer { timer_id: 42 }));
    }
    assert_eq!(start.elapsed(), Duration::from_millis(300));
    service.stop();
}

#[tokio::test(start_paused = true)]
async fn test_faster_timer_fires_more_often() {
    let (queue, mut rx) = DispatchQueue::new(1, Routing::ByConnection);
    let _service = TimerService::spawn(
        queue.clone(),
        [
            TimerConfig::every(1, Duration::from_millis(100)),
            TimerConfig::every(2, Duration::from_millis(250)),
        ],
    );

    tokio::time::sleep(Duration::from_millis(520)).await;
    let mut counts = [0u32; 2];
    while let Some(packet) = rx[0].try_pop() {
        if let Packet::Timer { timer_id } = packet {
            counts[timer_id as usize - 1] += 1;
        }
    }
    assert_eq!(counts, [5, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_fires() {
    let (queue, mut rx) = DispatchQueue::new(1, Routing::ByConnection);
    let service = TimerService::spawn(queue.clone(), [TimerConfig::every(1, Duration::from_millis(10))]);
    rx[0].pop().await.unwrap();
    service.stop();
    tokio::task::yield_now().await;
    while rx[0].try_pop().is_some() {}

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx[0].try_pop().is_none());
    assert_eq!(service.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_closed_queue_ends_timer_task() {
    let (queue, _rx) = DispatchQueue::new(1, Routing::ByConnection);
    let service = TimerService::spawn(queue.clone(), [TimerConfig::every(1, Duration::from_millis(10))]);
    queue.shutdown().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::task::yield_now().await;
    assert_eq!(service.active(), 0);
}
