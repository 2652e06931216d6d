use tracing::instrument;

use ordering::channel::{TrackingChannel, TrackingEvent, TrackingFeed};
use ordering::entities::driver_location::{DeliveryStatus, FindDriverLocationByTrackingCode};
use ordering::entities::order::{FindOrderByTrackingCode, OrderStatus, TimelineStep};
use ordering::events::delivery::LocationSnapshot;
use ordering::events::order::OrderSnapshot;
use ordering::store::TrackingStore;

/// Customer-facing live tracking: resolve a tracking code into a session
/// that holds the current snapshot and applies pushed updates to it.
#[derive(Debug, Clone)]
pub struct TrackingSubscriberService<S, C> {
    store: S,
    channel: C,
}

pub enum OpenTrackingOutcome {
    /// Unknown or regenerated-away code. The two are indistinguishable on
    /// purpose.
    NotFound,
    Open(TrackingSession),
}

#[derive(Debug, Clone)]
pub struct OpenTrackingSession {
    pub tracking_code: String,
}

impl<S: TrackingStore, C: TrackingChannel> TrackingSubscriberService<S, C> {
    pub fn new(store: S, channel: C) -> Self {
        Self { store, channel }
    }

    #[instrument(skip_all, name = "TrackingSubscriber:Open", err)]
    pub async fn open(
        &self,
        input: OpenTrackingSession,
    ) -> Result<OpenTrackingOutcome, framework::Error> {
        let tracking_code = input.tracking_code.trim().to_ascii_uppercase();
        let Some(order) = self
            .store
            .process(FindOrderByTrackingCode {
                tracking_code: tracking_code.clone(),
            })
            .await?
        else {
            return Ok(OpenTrackingOutcome::NotFound);
        };
        let location = self
            .store
            .process(FindDriverLocationByTrackingCode {
                tracking_code: tracking_code.clone(),
            })
            .await?;

        let Some(order) = OrderSnapshot::of_order(&order) else {
            return Ok(OpenTrackingOutcome::NotFound);
        };
        // Subscribe before returning the snapshot: an update racing the
        // open lands in the feed rather than being lost.
        let feed = self.channel.subscribe(&tracking_code).await?;
        Ok(OpenTrackingOutcome::Open(TrackingSession {
            view: TrackingView {
                order,
                location: location.as_ref().map(LocationSnapshot::from),
            },
            feed,
        }))
    }
}

/// One customer's live view of one order.
pub struct TrackingSession {
    view: TrackingView,
    feed: TrackingFeed,
}

impl TrackingSession {
    pub fn view(&self) -> &TrackingView {
        &self.view
    }

    pub fn display(&self) -> TrackingDisplay {
        self.view.display()
    }

    /// Waits for the next pushed update, folds it into the view and returns
    /// the refreshed display. `None` when the feed has closed.
    pub async fn next_update(&mut self) -> Option<TrackingDisplay> {
        let event = self.feed.next_event().await?;
        self.view.apply(event);
        Some(self.view.display())
    }
}

/// Snapshot state of a tracking session. Updates replace each half
/// wholesale: whichever event arrived last wins, no merging.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingView {
    pub order: OrderSnapshot,
    pub location: Option<LocationSnapshot>,
}

impl TrackingView {
    pub fn apply(&mut self, event: TrackingEvent) {
        match event {
            TrackingEvent::Order(order) => {
                if order.order_id == self.order.order_id {
                    self.order = order;
                }
            }
            TrackingEvent::Location(location) => {
                if location.order_id == self.order.order_id {
                    self.location = Some(location);
                }
            }
        }
    }

    /// Pure derivation from the snapshots; holds no state of its own.
    pub fn display(&self) -> TrackingDisplay {
        match self.order.order_status {
            OrderStatus::Cancelled => TrackingDisplay::Cancelled,
            // Once delivered, the view never goes back to a live map even
            // if a stale location event straggles in.
            OrderStatus::Delivered => TrackingDisplay::Delivered {
                delivered_at: self.order.delivered_at,
                photo_url: self.order.delivery_photo_url.clone(),
            },
            OrderStatus::OnDelivery => {
                let live = self
                    .location
                    .as_ref()
                    .filter(|l| l.status == DeliveryStatus::OutForDelivery)
                    .and_then(LocationSnapshot::coordinates);
                match live {
                    Some((latitude, longitude)) => TrackingDisplay::LiveMap {
                        latitude,
                        longitude,
                        driver_name: self.order.driver_name.clone(),
                    },
                    None => TrackingDisplay::WaitingForDriver,
                }
            }
            status => match status.timeline_step() {
                Some(step) => TrackingDisplay::Progress(step),
                None => TrackingDisplay::Cancelled,
            },
        }
    }
}

/// What the tracking page shows, derived fresh after every update.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingDisplay {
    Progress(TimelineStep),
    /// On delivery, but no usable driver position yet.
    WaitingForDriver,
    LiveMap {
        latitude: f64,
        longitude: f64,
        driver_name: Option<String>,
    },
    Delivered {
        delivered_at: Option<i64>,
        photo_url: Option<String>,
    },
    Cancelled,
}
