mod support;

use kanau::processor::Processor;
use uuid::Uuid;

use admin::services::order_management::{
    OrderManagementService, RegenerateOutcome, RegenerateTrackingCodes,
};
use delivery::tracking_subscriber::{
    OpenTrackingOutcome, OpenTrackingSession, TrackingDisplay, TrackingSubscriberService,
};
use ordering::config::TrackingConfig;
use ordering::entities::order::{Order, OrderStatus, TimelineStep};
use ordering::testkit::{order_fixture, MemoryStore};
use support::MemoryChannel;

fn order_with_codes(id: Uuid, status: OrderStatus) -> Order {
    let mut order = order_fixture(id, status);
    order.tracking_code = Some("SR-ABC123".to_owned());
    order.driver_code = Some("DRV-AB12".to_owned());
    order.driver_pin = Some("1234".to_owned());
    order
}

async fn open(
    tracking: &TrackingSubscriberService<MemoryStore, MemoryChannel>,
    code: &str,
) -> OpenTrackingOutcome {
    tracking
        .open(OpenTrackingSession {
            tracking_code: code.to_owned(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn unknown_codes_resolve_to_nothing() {
    let store = MemoryStore::new();
    let tracking = TrackingSubscriberService::new(store, MemoryChannel::new());
    assert!(matches!(
        open(&tracking, "SR-NOSUCH").await,
        OpenTrackingOutcome::NotFound
    ));
}

#[tokio::test]
async fn codes_are_matched_case_insensitively() {
    let store = MemoryStore::new();
    store.insert_order(order_with_codes(Uuid::new_v4(), OrderStatus::OnDelivery));
    let tracking = TrackingSubscriberService::new(store, MemoryChannel::new());

    let outcome = open(&tracking, "  sr-abc123 ").await;
    let OpenTrackingOutcome::Open(session) = outcome else {
        panic!("normalized code should resolve");
    };
    assert_eq!(session.display(), TrackingDisplay::WaitingForDriver);
}

#[tokio::test]
async fn early_orders_show_the_collapsed_timeline() {
    let store = MemoryStore::new();
    store.insert_order(order_with_codes(Uuid::new_v4(), OrderStatus::Preparing));
    let tracking = TrackingSubscriberService::new(store, MemoryChannel::new());

    let OpenTrackingOutcome::Open(session) = open(&tracking, "SR-ABC123").await else {
        panic!("code should resolve");
    };
    assert_eq!(
        session.display(),
        TrackingDisplay::Progress(TimelineStep::Preparing)
    );
}

#[tokio::test]
async fn regeneration_kills_the_old_code() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let id = Uuid::new_v4();
    store.insert_order(order_with_codes(id, OrderStatus::OnDelivery));
    let tracking = TrackingSubscriberService::new(store.clone(), channel.clone());
    let back_office =
        OrderManagementService::new(store.clone(), channel.clone(), TrackingConfig::default());

    let outcome = back_office
        .process(RegenerateTrackingCodes {
            order_id: id,
            confirmed: true,
        })
        .await
        .unwrap();
    let RegenerateOutcome::Regenerated(order) = outcome else {
        panic!("expected regeneration, got {outcome:?}");
    };

    // The old link is dead; the new one works.
    assert!(matches!(
        open(&tracking, "SR-ABC123").await,
        OpenTrackingOutcome::NotFound
    ));
    let new_code = order.tracking_code.unwrap();
    assert!(matches!(
        open(&tracking, &new_code).await,
        OpenTrackingOutcome::Open(_)
    ));
}
