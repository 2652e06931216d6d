use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{instrument, warn};
use uuid::Uuid;

use kanau::processor::Processor;
use ordering::channel::TrackingChannel;
use ordering::config::TrackingConfig;
use ordering::entities::driver_location::{
    DeliveryStatus, DriverLocation, SetDriverLocationStatus, UpsertDriverLocation,
};
use ordering::entities::order as order_db;
use ordering::entities::order::{Order, OrderStatus};
use ordering::events::delivery::{DriverLocationChangedEvent, LocationSnapshot};
use ordering::events::email::{OrderEmailKind, OrderEmailSendCall};
use ordering::events::order::{OrderSnapshot, OrderStatusChangedEvent};
use ordering::store::TrackingStore;

use crate::position::{GeoFix, PositionError, PositionSource};

/// Drives the live-location pipeline for one order at a time.
///
/// Starting a delivery takes an immediate fix and persists it, then runs
/// two loops until told to stop: a continuous observation that only feeds
/// the driver's own screen, and an interval loop that persists and
/// publishes the freshest fix. Device fixes can arrive every second;
/// the interval bounds the write volume.
#[derive(Debug, Clone)]
pub struct LocationPublisher<S, C, P> {
    store: S,
    channel: C,
    position: P,
    config: TrackingConfig,
}

#[derive(Debug)]
pub enum StartDeliveryOutcome {
    NotFound,
    /// Delivered or cancelled orders cannot go back on the road.
    AlreadyClosed,
    /// The driver declined location access; nothing was started.
    PermissionDenied,
    /// Positioning failed for another reason; the driver may retry.
    PositionUnavailable,
    Started(PublisherHandle),
}

#[derive(Debug, Clone)]
pub enum MarkDeliveredOutcome {
    /// Someone else closed the order first; publishing is stopped anyway.
    AlreadyClosed,
    Delivered(Order),
}

impl<S: TrackingStore, C: TrackingChannel, P: PositionSource> LocationPublisher<S, C, P> {
    pub fn new(store: S, channel: C, position: P, config: TrackingConfig) -> Self {
        Self {
            store,
            channel,
            position,
            config,
        }
    }

    /// Puts the order on the road and starts publishing. Safe to call on an
    /// order that is already `on_delivery` (dashboard reopened): publishing
    /// resumes without another status transition.
    #[instrument(skip_all, name = "LocationPublisher:StartDelivery", fields(order_id = %order_id))]
    pub async fn start_delivery(
        &self,
        order_id: Uuid,
    ) -> Result<StartDeliveryOutcome, framework::Error> {
        let promoted = self
            .store
            .process(order_db::PromoteOrderToDelivery { id: order_id })
            .await?;
        let order = match promoted {
            Some(order) => {
                self.fire_status_email(&order);
                self.publish_order(&order).await?;
                order
            }
            None => {
                let Some(order) = self
                    .store
                    .process(order_db::FindOrderById { id: order_id })
                    .await?
                else {
                    return Ok(StartDeliveryOutcome::NotFound);
                };
                if order.order_status != OrderStatus::OnDelivery {
                    return Ok(StartDeliveryOutcome::AlreadyClosed);
                }
                order
            }
        };
        let Some(tracking_code) = order.tracking_code.clone() else {
            // Codes are minted on the preparing -> on_delivery transition,
            // so an on-delivery order without them is a broken row.
            return Err(framework::Error::BusinessPanic(anyhow::anyhow!(
                "order {order_id} is on delivery without tracking codes"
            )));
        };

        let first_fix = match self.position.current_fix().await {
            Ok(fix) => fix,
            Err(PositionError::PermissionDenied) => {
                return Ok(StartDeliveryOutcome::PermissionDenied);
            }
            Err(PositionError::Unavailable) => {
                return Ok(StartDeliveryOutcome::PositionUnavailable);
            }
        };
        self.persist_and_publish(order_id, &tracking_code, first_fix)
            .await?;

        let (latest_tx, latest_rx) = watch::channel(Some(first_fix));

        let watch_task = {
            let position = self.position.clone();
            tokio::spawn(async move {
                let mut fixes = match position.watch().await {
                    Ok(fixes) => fixes,
                    Err(e) => {
                        warn!("continuous observation unavailable: {e}");
                        return;
                    }
                };
                while let Some(fix) = fixes.next().await {
                    if latest_tx.send(Some(fix)).is_err() {
                        break;
                    }
                }
            })
        };

        let persist_task = {
            let publisher = self.clone();
            let tracking_code = tracking_code.clone();
            let period = persist_period(&self.config);
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut ticks = tokio::time::interval_at(start, period);
                loop {
                    ticks.tick().await;
                    // Each tick takes its own fresh fix and swallows its own
                    // failure; a bad tick skips the write, nothing more.
                    let fix = match publisher.position.current_fix().await {
                        Ok(fix) => fix,
                        Err(e) => {
                            warn!("position fix unavailable, skipping write: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = publisher
                        .persist_and_publish(order_id, &tracking_code, fix)
                        .await
                    {
                        warn!("location persist failed: {e}");
                    }
                }
            })
        };

        Ok(StartDeliveryOutcome::Started(PublisherHandle {
            order_id,
            tracking_code,
            latest: latest_rx,
            tasks: Some([watch_task, persist_task]),
        }))
    }

    /// Stops publishing, flips the location row to its final state and
    /// closes the order. The row keeps its last coordinates; nothing
    /// writes to it afterwards.
    #[instrument(skip_all, name = "LocationPublisher:MarkDelivered", err)]
    pub async fn mark_delivered(
        &self,
        mut handle: PublisherHandle,
    ) -> Result<MarkDeliveredOutcome, framework::Error> {
        handle.stop();

        if let Some(row) = self
            .store
            .process(SetDriverLocationStatus {
                order_id: handle.order_id,
                status: DeliveryStatus::Delivered,
            })
            .await?
        {
            self.publish_location(&row).await?;
        }

        let Some(order) = self
            .store
            .process(order_db::MarkOrderDelivered {
                id: handle.order_id,
            })
            .await?
        else {
            return Ok(MarkDeliveredOutcome::AlreadyClosed);
        };
        self.fire_status_email(&order);
        self.publish_order(&order).await?;
        Ok(MarkDeliveredOutcome::Delivered(order))
    }

    async fn persist_and_publish(
        &self,
        order_id: Uuid,
        tracking_code: &str,
        fix: GeoFix,
    ) -> Result<(), framework::Error> {
        let row = self
            .store
            .process(UpsertDriverLocation {
                order_id,
                tracking_code: tracking_code.to_owned(),
                latitude: fix.latitude,
                longitude: fix.longitude,
                status: DeliveryStatus::OutForDelivery,
            })
            .await?;
        self.publish_location(&row).await
    }

    async fn publish_location(&self, row: &DriverLocation) -> Result<(), framework::Error> {
        self.channel
            .publish_location_changed(DriverLocationChangedEvent {
                location: LocationSnapshot::from(row),
            })
            .await
    }

    async fn publish_order(&self, order: &Order) -> Result<(), framework::Error> {
        let Some(snapshot) = OrderSnapshot::of_order(order) else {
            return Ok(());
        };
        self.channel
            .publish_order_changed(OrderStatusChangedEvent {
                order: snapshot,
                changed_at: framework::now_timestamp(),
            })
            .await
    }

    fn fire_status_email(&self, order: &Order) {
        let Some(customer_email) = order.email.clone() else {
            return;
        };
        let call = OrderEmailSendCall {
            order_id: order.id,
            customer_email,
            customer_name: order.full_name.clone(),
            kind: OrderEmailKind::StatusChanged(order.order_status),
            tracking_url: order
                .tracking_code
                .as_deref()
                .map(|code| self.config.tracking_url(code)),
            sent_at: framework::now_timestamp(),
        };
        let channel = self.channel.clone();
        tokio::spawn(async move {
            if let Err(e) = channel.send_order_email(call).await {
                warn!("order email send failed: {e}");
            }
        });
    }
}

fn persist_period(config: &TrackingConfig) -> std::time::Duration {
    std::time::Duration::try_from(config.publish.persist_interval)
        .unwrap_or(std::time::Duration::from_secs(10))
}

/// Live publishing for one order. Dropping the handle stops both loops;
/// `stop` does the same explicitly and is idempotent.
#[derive(Debug)]
pub struct PublisherHandle {
    order_id: Uuid,
    tracking_code: String,
    latest: watch::Receiver<Option<GeoFix>>,
    tasks: Option<[JoinHandle<()>; 2]>,
}

impl PublisherHandle {
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn tracking_code(&self) -> &str {
        &self.tracking_code
    }

    /// The freshest fix, for the driver's own map.
    pub fn latest_fix(&self) -> Option<GeoFix> {
        *self.latest.borrow()
    }

    pub fn stop(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            for task in tasks {
                task.abort();
            }
        }
    }
}

impl Drop for PublisherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
