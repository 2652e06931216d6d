use kanau::processor::Processor;
use tracing::{error, instrument};
use uuid::Uuid;

use ordering::channel::TrackingChannel;
use ordering::codes::CodeIssuer;
use ordering::config::TrackingConfig;
use ordering::entities::order as order_db;
use ordering::entities::order::{Order, OrderStatus};
use ordering::events::email::{OrderEmailKind, OrderEmailSendCall};
use ordering::events::order::{OrderSnapshot, OrderStatusChangedEvent};
use ordering::store::TrackingStore;

use crate::utils::config_provider::find_config_from_redis;

/// How many fresh code triples to try when the unique index rejects one.
const CODE_ISSUE_ATTEMPTS: usize = 3;

/// Back-office order lifecycle operations: advance, cancel, regenerate
/// codes, re-send the tracking link. Status writes go through
/// compare-and-set commands, so two operators clicking at once cannot
/// double-advance an order.
#[derive(Debug, Clone)]
pub struct OrderManagementService<S, C> {
    store: S,
    channel: C,
    config: TrackingConfig,
    issuer: CodeIssuer,
}

impl<S: TrackingStore, C: TrackingChannel> OrderManagementService<S, C> {
    pub fn new(store: S, channel: C, config: TrackingConfig) -> Self {
        let issuer = CodeIssuer::new(config.prefixes.clone());
        Self {
            store,
            channel,
            config,
            issuer,
        }
    }

    pub async fn from_config_store(
        store: S,
        channel: C,
        redis: &mut framework::redis::RedisConnection,
    ) -> Result<Self, framework::Error> {
        let config = find_config_from_redis::<TrackingConfig>(redis).await?;
        Ok(Self::new(store, channel, config))
    }

    /// Email sending must never block or fail a lifecycle operation.
    fn fire_email(&self, order: &Order, kind: OrderEmailKind) {
        let Some(customer_email) = order.email.clone() else {
            return;
        };
        let call = OrderEmailSendCall {
            order_id: order.id,
            customer_email,
            customer_name: order.full_name.clone(),
            kind,
            tracking_url: order
                .tracking_code
                .as_deref()
                .map(|code| self.config.tracking_url(code)),
            sent_at: framework::now_timestamp(),
        };
        let channel = self.channel.clone();
        tokio::spawn(async move {
            if let Err(e) = channel.send_order_email(call).await {
                error!("order email send failed: {e}");
            }
        });
    }

    /// The push channel is keyed by tracking code, so orders without one
    /// have no subscribers yet and nothing is published.
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

    async fn begin_delivery(&self, id: Uuid, from: OrderStatus) -> Result<AdvanceOutcome, framework::Error> {
        for _ in 0..CODE_ISSUE_ATTEMPTS {
            let codes = self.issuer.issue();
            match self
                .store
                .process(order_db::BeginDeliveryWithCodes { id, from, codes })
                .await
            {
                Ok(Some(order)) => return Ok(AdvanceOutcome::Advanced(order)),
                Ok(None) => return Ok(AdvanceOutcome::Conflict),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(framework::Error::BusinessPanic(anyhow::anyhow!(
            "no unique code triple after {CODE_ISSUE_ATTEMPTS} attempts"
        )))
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db| db.is_unique_violation())
}

/// Advance one order to its next lifecycle status.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceOrderStatus {
    pub order_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    NotFound,
    /// Delivered and cancelled orders have no next status.
    AlreadyTerminal,
    /// Another operator moved the order first; nothing was written.
    Conflict,
    Advanced(Order),
}

impl<S: TrackingStore, C: TrackingChannel> Processor<AdvanceOrderStatus>
    for OrderManagementService<S, C>
{
    type Output = AdvanceOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "OrderManagement:AdvanceOrderStatus", err)]
    async fn process(&self, input: AdvanceOrderStatus) -> Result<AdvanceOutcome, framework::Error> {
        let Some(order) = self
            .store
            .process(order_db::FindOrderById { id: input.order_id })
            .await?
        else {
            return Ok(AdvanceOutcome::NotFound);
        };
        let from = order.order_status;
        let Some(to) = from.next() else {
            return Ok(AdvanceOutcome::AlreadyTerminal);
        };

        let outcome = match to {
            // Codes are minted exactly when delivery begins, unless an
            // earlier regeneration already installed some.
            OrderStatus::OnDelivery if !order.has_codes() => {
                self.begin_delivery(order.id, from).await?
            }
            OrderStatus::Delivered => {
                match self
                    .store
                    .process(order_db::MarkOrderDelivered { id: order.id })
                    .await?
                {
                    Some(order) => AdvanceOutcome::Advanced(order),
                    None => AdvanceOutcome::Conflict,
                }
            }
            to => {
                match self
                    .store
                    .process(order_db::UpdateOrderStatus {
                        id: order.id,
                        from,
                        to,
                    })
                    .await?
                {
                    Some(order) => AdvanceOutcome::Advanced(order),
                    None => AdvanceOutcome::Conflict,
                }
            }
        };

        if let AdvanceOutcome::Advanced(order) = &outcome {
            self.fire_email(order, OrderEmailKind::StatusChanged(order.order_status));
            self.publish_order(order).await?;
        }
        Ok(outcome)
    }
}

/// Cancel an order from any non-terminal status.
#[derive(Debug, Clone, Copy)]
pub struct CancelOrder {
    pub order_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    NotFound,
    AlreadyTerminal,
    Cancelled(Order),
}

impl<S: TrackingStore, C: TrackingChannel> Processor<CancelOrder>
    for OrderManagementService<S, C>
{
    type Output = CancelOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "OrderManagement:CancelOrder", err)]
    async fn process(&self, input: CancelOrder) -> Result<CancelOutcome, framework::Error> {
        let Some(order) = self
            .store
            .process(order_db::FindOrderById { id: input.order_id })
            .await?
        else {
            return Ok(CancelOutcome::NotFound);
        };
        match self
            .store
            .process(order_db::CancelOrder { id: order.id })
            .await?
        {
            Some(order) => {
                self.fire_email(&order, OrderEmailKind::StatusChanged(order.order_status));
                self.publish_order(&order).await?;
                Ok(CancelOutcome::Cancelled(order))
            }
            None => Ok(CancelOutcome::AlreadyTerminal),
        }
    }
}

/// Destructive reissue of the whole credential triple. Requires an explicit
/// confirmation flag: the operation unregisters the driver and deletes the
/// live location row.
#[derive(Debug, Clone, Copy)]
pub struct RegenerateTrackingCodes {
    pub order_id: Uuid,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub enum RegenerateOutcome {
    /// Caller did not confirm; nothing was touched.
    Refused,
    NotFound,
    Regenerated(Order),
}

impl<S: TrackingStore, C: TrackingChannel> Processor<RegenerateTrackingCodes>
    for OrderManagementService<S, C>
{
    type Output = RegenerateOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "OrderManagement:RegenerateTrackingCodes", err)]
    async fn process(
        &self,
        input: RegenerateTrackingCodes,
    ) -> Result<RegenerateOutcome, framework::Error> {
        if !input.confirmed {
            return Ok(RegenerateOutcome::Refused);
        }
        for _ in 0..CODE_ISSUE_ATTEMPTS {
            let codes = self.issuer.issue();
            match self
                .store
                .process(order_db::RegenerateOrderCodes {
                    id: input.order_id,
                    codes,
                })
                .await
            {
                Ok(Some(order)) => {
                    // The old tracking code is dead from here on; whoever
                    // still holds it sees nothing further.
                    self.publish_order(&order).await?;
                    return Ok(RegenerateOutcome::Regenerated(order));
                }
                Ok(None) => return Ok(RegenerateOutcome::NotFound),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(framework::Error::BusinessPanic(anyhow::anyhow!(
            "no unique code triple after {CODE_ISSUE_ATTEMPTS} attempts"
        )))
    }
}

/// Re-send the customer their tracking link.
#[derive(Debug, Clone, Copy)]
pub struct SendTrackingLink {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTrackingLinkOutcome {
    NotFound,
    /// Delivery has not begun; there is no link to send yet.
    NoCodesYet,
    NoEmailOnFile,
    Sent,
}

impl<S: TrackingStore, C: TrackingChannel> Processor<SendTrackingLink>
    for OrderManagementService<S, C>
{
    type Output = SendTrackingLinkOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "OrderManagement:SendTrackingLink", err)]
    async fn process(
        &self,
        input: SendTrackingLink,
    ) -> Result<SendTrackingLinkOutcome, framework::Error> {
        let Some(order) = self
            .store
            .process(order_db::FindOrderById { id: input.order_id })
            .await?
        else {
            return Ok(SendTrackingLinkOutcome::NotFound);
        };
        if !order.has_codes() {
            return Ok(SendTrackingLinkOutcome::NoCodesYet);
        }
        if order.email.is_none() {
            return Ok(SendTrackingLinkOutcome::NoEmailOnFile);
        }
        self.fire_email(&order, OrderEmailKind::TrackingLink);
        Ok(SendTrackingLinkOutcome::Sent)
    }
}
