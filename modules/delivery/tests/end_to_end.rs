//! The whole delivery story in one sitting: back office advances the order,
//! the driver signs in, registers and drives, the customer watches live,
//! and everything goes quiet once the parcel is handed over.

mod support;

use std::time::Duration;

use kanau::processor::Processor;
use uuid::Uuid;

use admin::services::order_management::{
    AdvanceOrderStatus, AdvanceOutcome, OrderManagementService,
};
use delivery::driver_session::{
    CompleteDriverRegistration, DriverLogin, DriverLoginOutcome, DriverSessionService,
    RegistrationOutcome,
};
use delivery::location_publisher::{LocationPublisher, MarkDeliveredOutcome, StartDeliveryOutcome};
use delivery::photo::{DeliveryPhotoService, UploadDeliveryPhoto, UploadPhotoOutcome};
use delivery::position::GeoFix;
use delivery::tracking_subscriber::{
    OpenTrackingOutcome, OpenTrackingSession, TrackingDisplay, TrackingSubscriberService,
};
use ordering::config::TrackingConfig;
use ordering::entities::order::OrderStatus;
use ordering::testkit::{order_fixture, MemoryStore};
use support::{MemoryChannel, MemoryPhotoStorage, MemoryPositionSource};

const SHOP: GeoFix = GeoFix {
    latitude: 29.3759,
    longitude: 47.9774,
};

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn a_delivery_from_order_to_doorstep() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let position = MemoryPositionSource::new(SHOP);
    let storage = MemoryPhotoStorage::new();
    let config = TrackingConfig::default();

    let back_office =
        OrderManagementService::new(store.clone(), channel.clone(), config.clone());
    let sessions = DriverSessionService::new(store.clone());
    let publisher = LocationPublisher::new(
        store.clone(),
        channel.clone(),
        position.clone(),
        config.clone(),
    );
    let photos = DeliveryPhotoService::new(
        store.clone(),
        channel.clone(),
        storage.clone(),
        config.photo.clone(),
    );
    let tracking = TrackingSubscriberService::new(store.clone(), channel.clone());

    let order_id = Uuid::new_v4();
    store.insert_order(order_fixture(order_id, OrderStatus::Pending));

    // Back office: pending -> accepted -> preparing -> on_delivery.
    for _ in 0..3 {
        let outcome = back_office
            .process(AdvanceOrderStatus { order_id })
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Advanced(_)));
    }
    let order = store.order(order_id).unwrap();
    assert_eq!(order.order_status, OrderStatus::OnDelivery);
    let tracking_code = order.tracking_code.clone().unwrap();
    let driver_code = order.driver_code.clone().unwrap();
    let driver_pin = order.driver_pin.clone().unwrap();

    // Customer opens the tracking page: on the road, no position yet.
    let opened = tracking
        .open(OpenTrackingSession {
            tracking_code: tracking_code.clone(),
        })
        .await
        .unwrap();
    let OpenTrackingOutcome::Open(mut session) = opened else {
        panic!("tracking code should resolve");
    };
    assert_eq!(session.display(), TrackingDisplay::WaitingForDriver);

    // Driver signs in for the first time and has to register.
    let login = sessions
        .process(DriverLogin {
            driver_code: driver_code.clone(),
            pin: driver_pin.clone(),
        })
        .await
        .unwrap();
    assert!(matches!(login, DriverLoginOutcome::RegistrationRequired(_)));
    let registered = sessions
        .process(CompleteDriverRegistration {
            order_id,
            driver_name: "Ahmad".to_owned(),
            driver_phone: "+96512345678".to_owned(),
            location_consented: true,
            photo_consented: true,
        })
        .await
        .unwrap();
    assert!(matches!(registered, RegistrationOutcome::Registered(_)));

    // Driver hits the road; the customer's map comes alive.
    let outcome = publisher.start_delivery(order_id).await.unwrap();
    let StartDeliveryOutcome::Started(handle) = outcome else {
        panic!("publishing should start, got {outcome:?}");
    };
    settle().await;
    let display = session.next_update().await.unwrap();
    assert!(matches!(
        display,
        TrackingDisplay::LiveMap { latitude, .. } if latitude == SHOP.latitude
    ));

    // Proof photo at the doorstep.
    let uploaded = photos
        .process(UploadDeliveryPhoto {
            order_id,
            file_name: "doorstep.jpg".to_owned(),
            content_type: "image/jpeg".to_owned(),
            bytes: vec![0u8; 128 * 1024],
        })
        .await
        .unwrap();
    assert!(matches!(uploaded, UploadPhotoOutcome::Stored(_)));
    // Still on the road from the customer's point of view.
    assert!(matches!(
        session.next_update().await.unwrap(),
        TrackingDisplay::LiveMap { .. }
    ));

    // Handover.
    let closed = publisher.mark_delivered(handle).await.unwrap();
    let MarkDeliveredOutcome::Delivered(order) = closed else {
        panic!("delivery should close, got {closed:?}");
    };
    assert!(order.delivered_at.is_some());

    // Two updates arrive: the final location flip, then the closed order.
    session.next_update().await.unwrap();
    let display = session.next_update().await.unwrap();
    let TrackingDisplay::Delivered {
        delivered_at,
        photo_url,
    } = display
    else {
        panic!("expected the delivered page, got {display:?}");
    };
    assert!(delivered_at.is_some());
    assert!(photo_url.is_some());

    // Silence afterwards: no location writes, no more events.
    let location_events = channel.location_events().len();
    let last_row = store.location(order_id).unwrap();
    position.move_to(GeoFix {
        latitude: 0.0,
        longitude: 0.0,
    });
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(channel.location_events().len(), location_events);
    assert_eq!(store.location(order_id), Some(last_row));

    // The customer was emailed on every transition.
    let emails = channel.emails();
    assert_eq!(emails.len(), 4);
    assert!(emails
        .iter()
        .all(|e| e.customer_email == "customer@example.com"));
}
