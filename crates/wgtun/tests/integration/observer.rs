//! Status observation against the fake monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_stream::StreamExt;
use wgtun::observer::AdapterStatusObserver;
use wgtun::{ConnectionStatus, InterfaceId, OperStatus, Result};

use crate::common::FakeMonitor;

const A: InterfaceId = InterfaceId::new(1);
const B: InterfaceId = InterfaceId::new(2);
const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_start_is_idempotent() -> Result<()> {
    let monitor = FakeMonitor::new();
    let observer = AdapterStatusObserver::new(monitor.clone());

    observer.start_observing(A).await?;
    observer.start_observing(A).await?;

    assert_eq!(observer.monitored_count(), 1);
    assert_eq!(monitor.subscribe_count(), 1);
    assert_eq!(monitor.active_subscriptions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_single_subscription_for_many_adapters() -> Result<()> {
    let monitor = FakeMonitor::new();
    let observer = AdapterStatusObserver::new(monitor.clone());

    observer.start_observing(A).await?;
    observer.start_observing(B).await?;
    assert_eq!(monitor.subscribe_count(), 1);

    observer.stop_observing(A).await;
    assert!(observer.is_subscribed());
    assert_eq!(monitor.active_subscriptions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_last_stop_tears_down_once() -> Result<()> {
    let monitor = FakeMonitor::new();
    let observer = AdapterStatusObserver::new(monitor.clone());

    observer.start_observing(A).await?;
    observer.stop_observing(A).await;

    assert!(!observer.is_subscribed());
    assert!(!observer.is_monitoring(A));
    assert_eq!(monitor.active_subscriptions(), 0);

    // Second stop is a no-op.
    observer.stop_observing(A).await;
    assert_eq!(monitor.subscribe_count(), 1);

    // Watching again establishes a fresh subscription.
    observer.start_observing(A).await?;
    assert_eq!(monitor.subscribe_count(), 2);
    assert_eq!(monitor.active_subscriptions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_start_publishes_current_status() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Dormant);
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen();

    observer.start_observing(A).await?;

    let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event.luid, A);
    assert_eq!(event.status, ConnectionStatus::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_unreadable_status_is_unknown() -> Result<()> {
    let monitor = FakeMonitor::new();
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen();

    observer.start_observing(A).await?;

    let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event.status, ConnectionStatus::Unknown);
    Ok(())
}

#[tokio::test]
async fn test_changes_are_filtered_to_monitored_set() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen();

    observer.start_observing(A).await?;
    let initial = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(initial.status, ConnectionStatus::Connected);

    monitor.notify(B, Some(OperStatus::Up));
    monitor.notify(A, Some(OperStatus::LowerLayerDown));

    let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event.luid, A);
    assert_eq!(event.status, ConnectionStatus::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_change_without_status_reads_it() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Down);
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen();

    observer.start_observing(A).await?;
    timeout(WAIT, events.next()).await.unwrap().unwrap();

    monitor.set_status(A, OperStatus::Up);
    monitor.notify(A, None);

    let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event.status, ConnectionStatus::Connected);
    Ok(())
}

#[tokio::test]
async fn test_subscribe_failure_leaves_nothing_behind() {
    let monitor = FakeMonitor::new();
    monitor.fail_subscribe(true);
    let observer = AdapterStatusObserver::new(monitor.clone());

    assert!(observer.start_observing(A).await.is_err());
    assert!(!observer.is_monitoring(A));
    assert!(!observer.is_subscribed());

    monitor.fail_subscribe(false);
    observer.start_observing(A).await.unwrap();
    assert!(observer.is_subscribed());
    assert_eq!(monitor.subscribe_count(), 2);
}

#[tokio::test]
async fn test_no_events_after_stop() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen().into_inner();

    observer.start_observing(A).await?;
    observer.stop_observing(A).await;
    while events.try_recv().is_ok() {}

    monitor.notify(A, Some(OperStatus::Down));
    tokio::task::yield_now().await;
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_all_during_notifications_does_not_deadlock() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    monitor.set_status(B, OperStatus::Down);
    monitor.set_read_delay(Duration::from_millis(1));

    let observer = Arc::new(AdapterStatusObserver::new(monitor.clone()));
    let _events = observer.listen();

    for _ in 0..20 {
        observer.start_observing(A).await?;
        observer.start_observing(B).await?;

        let notifier = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    let id = if i % 2 == 0 { A } else { B };
                    monitor.notify(id, None);
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        timeout(WAIT, observer.stop_all_observing())
            .await
            .expect("stop_all_observing deadlocked");
        notifier.await.unwrap();

        assert!(!observer.is_subscribed());
        assert_eq!(observer.monitored_count(), 0);
        assert_eq!(monitor.active_subscriptions(), 0);
    }

    assert_eq!(monitor.subscribe_count(), 20);
    Ok(())
}

#[tokio::test]
async fn test_drop_releases_subscription() -> Result<()> {
    let monitor = FakeMonitor::new();
    {
        let observer = AdapterStatusObserver::new(monitor.clone());
        observer.start_observing(A).await?;
        assert_eq!(monitor.active_subscriptions(), 1);
    }

    // Abort is asynchronous; give the runtime a turn to drop the task.
    for _ in 0..10 {
        if monitor.active_subscriptions() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(monitor.active_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stopped_adapter_not_published_by_slow_read() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    monitor.set_status(B, OperStatus::Up);
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen().into_inner();

    observer.start_observing(A).await?;
    observer.start_observing(B).await?;
    while events.try_recv().is_ok() {}

    // The consumer passes the membership check, then blocks on the read.
    monitor.set_read_delay(Duration::from_millis(200));
    monitor.notify(A, None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    observer.stop_observing(A).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut late = Vec::new();
    while let Ok(event) = events.try_recv() {
        late.push(event);
    }
    assert!(late.iter().all(|e| e.luid != A), "published after stop: {:?}", late);
    assert!(observer.is_subscribed());
    Ok(())
}

#[tokio::test]
async fn test_ended_source_is_resubscribed() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    let observer = AdapterStatusObserver::new(monitor.clone());
    let mut events = observer.listen();

    observer.start_observing(A).await?;
    timeout(WAIT, events.next()).await.unwrap().unwrap();

    monitor.set_status(A, OperStatus::Down);
    monitor.end_subscriptions();

    // The resync after subscribing again reports the current status.
    let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event.luid, A);
    assert_eq!(event.status, ConnectionStatus::Disconnected);
    assert_eq!(monitor.subscribe_count(), 2);
    assert_eq!(monitor.active_subscriptions(), 1);
    assert!(observer.is_subscribed());

    monitor.notify(A, Some(OperStatus::Up));
    let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(event.status, ConnectionStatus::Connected);
    Ok(())
}

#[tokio::test]
async fn test_dead_consumer_is_replaced_on_start() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    monitor.set_status(B, OperStatus::Up);
    let observer = AdapterStatusObserver::new(monitor.clone());

    observer.start_observing(A).await?;
    monitor.fail_subscribe(true);
    monitor.end_subscriptions();

    let gone = async {
        while observer.is_subscribed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(WAIT, gone).await.expect("consumer kept running");
    assert!(observer.is_monitoring(A));

    monitor.fail_subscribe(false);
    observer.start_observing(B).await?;
    assert!(observer.is_subscribed());
    assert_eq!(monitor.subscribe_count(), 3);
    assert_eq!(monitor.active_subscriptions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_restart_of_watched_adapter_resubscribes() -> Result<()> {
    let monitor = FakeMonitor::new();
    monitor.set_status(A, OperStatus::Up);
    let observer = AdapterStatusObserver::new(monitor.clone());

    observer.start_observing(A).await?;
    monitor.fail_subscribe(true);
    monitor.end_subscriptions();
    while observer.is_subscribed() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    monitor.fail_subscribe(false);
    observer.start_observing(A).await?;
    assert!(observer.is_subscribed());
    assert_eq!(observer.monitored_count(), 1);
    assert_eq!(monitor.active_subscriptions(), 1);
    Ok(())
}
