mod support;

use std::time::Duration;

use uuid::Uuid;

use delivery::location_publisher::{
    LocationPublisher, MarkDeliveredOutcome, PublisherHandle, StartDeliveryOutcome,
};
use delivery::position::GeoFix;
use ordering::config::TrackingConfig;
use ordering::entities::driver_location::DeliveryStatus;
use ordering::entities::order::{Order, OrderStatus};
use ordering::testkit::{order_fixture, MemoryStore};
use support::{MemoryChannel, MemoryPositionSource};

const SHOP: GeoFix = GeoFix {
    latitude: 29.3759,
    longitude: 47.9774,
};
const EN_ROUTE: GeoFix = GeoFix {
    latitude: 29.3330,
    longitude: 48.0200,
};

fn order_on_delivery(id: Uuid) -> Order {
    let mut order = order_fixture(id, OrderStatus::OnDelivery);
    order.tracking_code = Some("SR-ABC123".to_owned());
    order.driver_code = Some("DRV-AB12".to_owned());
    order.driver_pin = Some("1234".to_owned());
    order
}

fn publisher(
    store: &MemoryStore,
    channel: &MemoryChannel,
    position: &MemoryPositionSource,
) -> LocationPublisher<MemoryStore, MemoryChannel, MemoryPositionSource> {
    LocationPublisher::new(
        store.clone(),
        channel.clone(),
        position.clone(),
        TrackingConfig::default(),
    )
}

async fn start(
    publisher: &LocationPublisher<MemoryStore, MemoryChannel, MemoryPositionSource>,
    order_id: Uuid,
) -> PublisherHandle {
    match publisher.start_delivery(order_id).await.unwrap() {
        StartDeliveryOutcome::Started(handle) => handle,
        other => panic!("expected publishing to start, got {other:?}"),
    }
}

/// Lets spawned publisher tasks run without advancing the paused clock.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn starting_persists_and_publishes_an_immediate_fix() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));

    let _handle = start(&publisher(&store, &channel, &position), id).await;

    let row = store.location(id).unwrap();
    assert_eq!(row.latitude, Some(SHOP.latitude));
    assert_eq!(row.longitude, Some(SHOP.longitude));
    assert_eq!(row.status, DeliveryStatus::OutForDelivery);
    assert_eq!(channel.location_events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn starting_promotes_an_order_that_is_not_yet_on_delivery() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    let mut order = order_on_delivery(id);
    order.order_status = OrderStatus::Preparing;
    store.insert_order(order);

    let _handle = start(&publisher(&store, &channel, &position), id).await;

    assert_eq!(store.order(id).unwrap().order_status, OrderStatus::OnDelivery);
    assert_eq!(channel.order_events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn permission_denial_starts_nothing() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    position.deny();
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));

    let outcome = publisher(&store, &channel, &position)
        .start_delivery(id)
        .await
        .unwrap();
    assert!(matches!(outcome, StartDeliveryOutcome::PermissionDenied));
    assert!(store.location(id).is_none());
    assert!(channel.location_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fresh_fixes_reach_the_screen_but_only_ticks_reach_the_database() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));

    let handle = start(&publisher(&store, &channel, &position), id).await;
    settle().await;

    position.move_to(EN_ROUTE);
    settle().await;
    // The driver's own map is current...
    assert_eq!(handle.latest_fix(), Some(EN_ROUTE));
    // ...but the row still holds the start fix until the next tick.
    assert_eq!(store.location(id).unwrap().latitude, Some(SHOP.latitude));

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    let row = store.location(id).unwrap();
    assert_eq!(row.latitude, Some(EN_ROUTE.latitude));
    assert_eq!(row.longitude, Some(EN_ROUTE.longitude));
    assert_eq!(channel.location_events().len(), 2);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(channel.location_events().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn a_failed_fix_skips_that_tick_only() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));

    let _handle = start(&publisher(&store, &channel, &position), id).await;
    settle().await;

    position.deny();
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(channel.location_events().len(), 1);

    position.allow();
    position.move_to(EN_ROUTE);
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(channel.location_events().len(), 2);
    assert_eq!(store.location(id).unwrap().latitude, Some(EN_ROUTE.latitude));
}

#[tokio::test(start_paused = true)]
async fn stopping_halts_persistence() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));

    let mut handle = start(&publisher(&store, &channel, &position), id).await;
    settle().await;
    handle.stop();
    settle().await;

    position.move_to(EN_ROUTE);
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(channel.location_events().len(), 1);
    assert_eq!(store.location(id).unwrap().latitude, Some(SHOP.latitude));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_halts_persistence() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));

    let handle = start(&publisher(&store, &channel, &position), id).await;
    settle().await;
    drop(handle);
    settle().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(channel.location_events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn mark_delivered_finalizes_the_row_and_writes_nothing_more() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let id = Uuid::new_v4();
    store.insert_order(order_on_delivery(id));
    let publisher = publisher(&store, &channel, &position);

    let handle = start(&publisher, id).await;
    settle().await;

    let outcome = publisher.mark_delivered(handle).await.unwrap();
    let MarkDeliveredOutcome::Delivered(order) = outcome else {
        panic!("expected delivery to close, got {outcome:?}");
    };
    assert_eq!(order.order_status, OrderStatus::Delivered);
    assert!(order.delivered_at.is_some());

    // The row flips to delivered but keeps its last coordinates.
    let row = store.location(id).unwrap();
    assert_eq!(row.status, DeliveryStatus::Delivered);
    assert_eq!(row.latitude, Some(SHOP.latitude));

    // start fix + final status flip, then silence.
    let events_after_close = channel.location_events().len();
    assert_eq!(events_after_close, 2);
    position.move_to(EN_ROUTE);
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(channel.location_events().len(), events_after_close);
    assert_eq!(store.location(id).unwrap().latitude, Some(SHOP.latitude));
}
