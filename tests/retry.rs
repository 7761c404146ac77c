mod common;

use std::time::Duration;

use ble_escpos::encoder::startup_sequence;
use ble_escpos::{ConnectionState, RadioEvent, RetryScheduler};
use common::{session, FakeRadio, Script, BACKOFF, PRINTER, STRANGER};
use tokio::time::{sleep, Instant};

#[tokio::test(start_paused = true)]
async fn test_retries_after_timeout_with_backoff() {
    let radio = FakeRadio::new(Script {
        advertise: vec![STRANGER.to_string()],
        ..Default::default()
    });
    let session = session(&radio);
    let scheduler = RetryScheduler::new(session.clone(), BACKOFF);
    let token = scheduler.token();
    let handle = scheduler.spawn();

    // first attempt times out at 20s, the next one starts 10s later
    sleep(Duration::from_secs(29)).await;
    assert_eq!(radio.count("subscribe"), 1);
    assert_eq!(session.connector().state(), ConnectionState::Failed);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(radio.count("subscribe"), 2);

    // never gives up
    sleep(Duration::from_secs(300)).await;
    assert!(radio.count("subscribe") >= 10);
    assert!(!session.status().connected);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_prints_startup_message_once_per_connection() {
    let radio = FakeRadio::new(Script::default());
    let session = session(&radio);
    let handle = RetryScheduler::new(session.clone(), BACKOFF).spawn();

    let mut state = session.connector().watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Ready)
        .await
        .unwrap();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(radio.writes(), vec![startup_sequence().to_bytes()]);
    assert_eq!(radio.count("subscribe"), 1);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_link_loss() {
    let radio = FakeRadio::new(Script::default());
    let session = session(&radio);
    let scheduler = RetryScheduler::new(session.clone(), BACKOFF);
    let token = scheduler.token();
    let handle = scheduler.spawn();

    let mut state = session.connector().watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Ready)
        .await
        .unwrap();

    let lost_at = Instant::now();
    radio.emit(RadioEvent::Disconnected {
        address: PRINTER.to_string(),
    });
    state
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert!(!session.status().connected);

    state
        .wait_for(|s| *s == ConnectionState::Ready)
        .await
        .unwrap();
    assert!(lost_at.elapsed() >= BACKOFF);
    assert_eq!(radio.count("subscribe"), 2);

    // give the scheduler a turn to print the banner again
    sleep(Duration::from_millis(1)).await;
    assert_eq!(radio.writes().len(), 2);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_backoff_wait() {
    let radio = FakeRadio::new(Script {
        advertise: vec![],
        ..Default::default()
    });
    let session = session(&radio);
    let scheduler = RetryScheduler::new(session.clone(), Duration::from_secs(3600));
    let token = scheduler.token();
    let handle = scheduler.spawn();

    // inside the hour-long backoff after the first timeout
    sleep(Duration::from_secs(25)).await;
    token.cancel();

    let started = Instant::now();
    handle.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(radio.count("subscribe"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_scanning_releases_the_scan() {
    let radio = FakeRadio::new(Script {
        advertise: vec![],
        ..Default::default()
    });
    let session = session(&radio);
    let scheduler = RetryScheduler::new(session.clone(), BACKOFF);
    let token = scheduler.token();
    let handle = scheduler.spawn();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(session.connector().state(), ConnectionState::Scanning);

    token.cancel();
    handle.await.unwrap();

    assert_eq!(session.connector().state(), ConnectionState::Disconnected);
    assert_eq!(radio.count("stop_scan"), 1);
    assert_eq!(radio.live_subscribers(), 0);
}
