#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use delivery::position::{GeoFix, PositionError, PositionSource};
use ordering::channel::{TrackingChannel, TrackingEvent, TrackingFeed};
use ordering::events::delivery::DriverLocationChangedEvent;
use ordering::events::email::OrderEmailSendCall;
use ordering::events::order::OrderStatusChangedEvent;

/// In-process tracking channel: records everything and routes events to
/// subscribers by tracking code.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    inner: Arc<Mutex<ChannelState>>,
    fail_emails: Arc<AtomicBool>,
}

#[derive(Default)]
struct ChannelState {
    order_events: Vec<OrderStatusChangedEvent>,
    location_events: Vec<DriverLocationChangedEvent>,
    emails: Vec<OrderEmailSendCall>,
    subscribers: HashMap<String, Vec<mpsc::Sender<TrackingEvent>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_emails(&self, fail: bool) {
        self.fail_emails.store(fail, Ordering::SeqCst);
    }

    pub fn order_events(&self) -> Vec<OrderStatusChangedEvent> {
        self.inner.lock().unwrap().order_events.clone()
    }

    pub fn location_events(&self) -> Vec<DriverLocationChangedEvent> {
        self.inner.lock().unwrap().location_events.clone()
    }

    pub fn emails(&self) -> Vec<OrderEmailSendCall> {
        self.inner.lock().unwrap().emails.clone()
    }

    fn route(state: &mut ChannelState, tracking_code: &str, event: TrackingEvent) {
        if let Some(subscribers) = state.subscribers.get_mut(tracking_code) {
            subscribers.retain(|tx| tx.try_send(event.clone()).is_ok());
        }
    }
}

impl TrackingChannel for MemoryChannel {
    async fn publish_order_changed(
        &self,
        event: OrderStatusChangedEvent,
    ) -> Result<(), framework::Error> {
        let mut state = self.inner.lock().unwrap();
        let code = event.order.tracking_code.clone();
        Self::route(&mut state, &code, TrackingEvent::Order(event.order.clone()));
        state.order_events.push(event);
        Ok(())
    }

    async fn publish_location_changed(
        &self,
        event: DriverLocationChangedEvent,
    ) -> Result<(), framework::Error> {
        let mut state = self.inner.lock().unwrap();
        let code = event.location.tracking_code.clone();
        Self::route(
            &mut state,
            &code,
            TrackingEvent::Location(event.location.clone()),
        );
        state.location_events.push(event);
        Ok(())
    }

    async fn send_order_email(&self, call: OrderEmailSendCall) -> Result<(), framework::Error> {
        if self.fail_emails.load(Ordering::SeqCst) {
            return Err(framework::Error::BusinessPanic(anyhow::anyhow!(
                "email relay down"
            )));
        }
        self.inner.lock().unwrap().emails.push(call);
        Ok(())
    }

    async fn subscribe(&self, tracking_code: &str) -> Result<TrackingFeed, framework::Error> {
        let (tx, rx) = mpsc::channel(64);
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .entry(tracking_code.to_owned())
            .or_default()
            .push(tx);
        Ok(TrackingFeed::new(rx))
    }
}

/// Scriptable device positioning.
#[derive(Clone)]
pub struct MemoryPositionSource {
    inner: Arc<PositionState>,
}

struct PositionState {
    current: Mutex<GeoFix>,
    denied: AtomicBool,
    watchers: Mutex<Vec<mpsc::Sender<GeoFix>>>,
}

impl MemoryPositionSource {
    pub fn new(fix: GeoFix) -> Self {
        Self {
            inner: Arc::new(PositionState {
                current: Mutex::new(fix),
                denied: AtomicBool::new(false),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn deny(&self) {
        self.inner.denied.store(true, Ordering::SeqCst);
    }

    pub fn allow(&self) {
        self.inner.denied.store(false, Ordering::SeqCst);
    }

    /// New fix from the device: updates the snapshot and feeds every
    /// open observation.
    pub fn move_to(&self, fix: GeoFix) {
        *self.inner.current.lock().unwrap() = fix;
        self.inner
            .watchers
            .lock()
            .unwrap()
            .retain(|tx| tx.try_send(fix).is_ok());
    }
}

impl PositionSource for MemoryPositionSource {
    async fn current_fix(&self) -> Result<GeoFix, PositionError> {
        if self.inner.denied.load(Ordering::SeqCst) {
            return Err(PositionError::PermissionDenied);
        }
        Ok(*self.inner.current.lock().unwrap())
    }

    async fn watch(&self) -> Result<ReceiverStream<GeoFix>, PositionError> {
        if self.inner.denied.load(Ordering::SeqCst) {
            return Err(PositionError::PermissionDenied);
        }
        let (tx, rx) = mpsc::channel(64);
        self.inner.watchers.lock().unwrap().push(tx);
        Ok(ReceiverStream::new(rx))
    }
}

/// Records uploads and hands back a deterministic URL.
#[derive(Clone, Default)]
pub struct MemoryPhotoStorage {
    stored: Arc<Mutex<Vec<StoredPhoto>>>,
}

#[derive(Clone)]
pub struct StoredPhoto {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

impl MemoryPhotoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<StoredPhoto> {
        self.stored.lock().unwrap().clone()
    }
}

impl delivery::photo::PhotoStorage for MemoryPhotoStorage {
    async fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, framework::Error> {
        self.stored.lock().unwrap().push(StoredPhoto {
            key: key.to_owned(),
            content_type: content_type.to_owned(),
            size: bytes.len(),
        });
        Ok(format!("https://cdn.example.com/delivery/{key}"))
    }
}
