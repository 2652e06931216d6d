use framework::sqlx::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::PrimitiveDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::codes::TrackingCodes;

/// The aggregate root for delivery tracking.
///
/// `tracking_code`, `driver_code` and `driver_pin` are generated together
/// when delivery begins: either all three are present or none is.
/// `driver_name`/`driver_phone` stay NULL until the driver registers once.
#[derive(Clone, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub governorate: String,
    pub total_amount: Decimal,
    pub created_at: PrimitiveDateTime,
    pub order_status: OrderStatus,

    pub tracking_code: Option<String>,
    pub driver_code: Option<String>,
    pub driver_pin: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,

    pub delivered_at: Option<PrimitiveDateTime>,
    pub delivery_photo_url: Option<String>,
}

impl Order {
    pub fn has_codes(&self) -> bool {
        self.tracking_code.is_some()
    }

    pub fn driver_registered(&self) -> bool {
        self.driver_name.is_some()
    }
}

impl core::fmt::Debug for Order {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Order")
            .field("id", &self.id)
            .field("order_status", &self.order_status)
            .field("tracking_code", &self.tracking_code)
            .field("driver_code", &self.driver_code)
            .field(
                "driver_pin",
                match &self.driver_pin {
                    Some(_) => &"Some([REDACTED])",
                    None => &"None",
                },
            )
            .field("driver_name", &self.driver_name)
            .field("delivered_at", &self.delivered_at)
            .finish_non_exhaustive()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    sqlx::Type,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[sqlx(type_name = "shop.order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    OnDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The linear progression used by the back-office "advance" action.
    /// Terminal states have no successor; `Cancelled` is reached only by
    /// the explicit cancel operation.
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Accepted),
            OrderStatus::Accepted => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::OnDelivery),
            OrderStatus::OnDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// The customer-facing timeline step. `Accepted` and `Preparing`
    /// collapse into the same step; `Cancelled` has no step at all.
    pub fn timeline_step(self) -> Option<TimelineStep> {
        match self {
            OrderStatus::Pending => Some(TimelineStep::Placed),
            OrderStatus::Accepted | OrderStatus::Preparing => Some(TimelineStep::Preparing),
            OrderStatus::OnDelivery => Some(TimelineStep::OutForDelivery),
            OrderStatus::Delivered => Some(TimelineStep::Delivered),
            OrderStatus::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimelineStep {
    Placed,
    Preparing,
    OutForDelivery,
    Delivered,
}

const ORDER_COLUMNS: &str = "id, full_name, email, phone, address, city, governorate, \
     total_amount, created_at, order_status, tracking_code, driver_code, driver_pin, \
     driver_name, driver_phone, delivered_at, delivery_photo_url";

#[derive(Debug, Clone, Copy)]
pub struct FindOrderById {
    pub id: Uuid,
}

impl Processor<FindOrderById> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindOrderById", err)]
    async fn process(&self, input: FindOrderById) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1");
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .fetch_optional(self.db())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct FindOrderByTrackingCode {
    pub tracking_code: String,
}

impl Processor<FindOrderByTrackingCode> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindOrderByTrackingCode", err)]
    async fn process(&self, input: FindOrderByTrackingCode) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM shop.orders WHERE tracking_code = $1");
        sqlx::query_as::<_, Order>(&sql)
            .bind(&input.tracking_code)
            .fetch_optional(self.db())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct FindOrderByDriverCode {
    pub driver_code: String,
}

impl Processor<FindOrderByDriverCode> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindOrderByDriverCode", err)]
    async fn process(&self, input: FindOrderByDriverCode) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM shop.orders WHERE driver_code = $1");
        sqlx::query_as::<_, Order>(&sql)
            .bind(&input.driver_code)
            .fetch_optional(self.db())
            .await
    }
}

/// Compare-and-set status write. Returns `None` when the order moved away
/// from `from` in the meantime (or does not exist).
#[derive(Debug, Clone, Copy)]
pub struct UpdateOrderStatus {
    pub id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl Processor<UpdateOrderStatus> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:UpdateOrderStatus", err)]
    async fn process(&self, input: UpdateOrderStatus) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders SET order_status = $3 \
             WHERE id = $1 AND order_status = $2 \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(input.from)
            .bind(input.to)
            .fetch_optional(self.db())
            .await
    }
}

/// The `preparing -> on_delivery` transition that also persists a freshly
/// generated code triple, atomically with the status write. Guarded on
/// `tracking_code IS NULL`: codes are never overwritten by this path.
#[derive(Debug, Clone)]
pub struct BeginDeliveryWithCodes {
    pub id: Uuid,
    pub from: OrderStatus,
    pub codes: TrackingCodes,
}

impl Processor<BeginDeliveryWithCodes> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:BeginDeliveryWithCodes", err)]
    async fn process(&self, input: BeginDeliveryWithCodes) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders \
             SET order_status = $3, tracking_code = $4, driver_code = $5, driver_pin = $6 \
             WHERE id = $1 AND order_status = $2 AND tracking_code IS NULL \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(input.from)
            .bind(OrderStatus::OnDelivery)
            .bind(&input.codes.tracking_code)
            .bind(&input.codes.driver_code)
            .bind(&input.codes.driver_pin)
            .fetch_optional(self.db())
            .await
    }
}

/// `on_delivery -> delivered`; stamps `delivered_at` exactly once.
#[derive(Debug, Clone, Copy)]
pub struct MarkOrderDelivered {
    pub id: Uuid,
}

impl Processor<MarkOrderDelivered> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:MarkOrderDelivered", err)]
    async fn process(&self, input: MarkOrderDelivered) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders SET order_status = $2, delivered_at = NOW() \
             WHERE id = $1 AND order_status = $3 \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(OrderStatus::Delivered)
            .bind(OrderStatus::OnDelivery)
            .fetch_optional(self.db())
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CancelOrder {
    pub id: Uuid,
}

impl Processor<CancelOrder> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:CancelOrder", err)]
    async fn process(&self, input: CancelOrder) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders SET order_status = $2 \
             WHERE id = $1 AND order_status <> $2 AND order_status <> $3 \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(OrderStatus::Cancelled)
            .bind(OrderStatus::Delivered)
            .fetch_optional(self.db())
            .await
    }
}

/// Driver-side "start delivery": force the order onto `on_delivery` from
/// whatever non-terminal state it is in. `None` when the order is already
/// on delivery, terminal, or missing.
#[derive(Debug, Clone, Copy)]
pub struct PromoteOrderToDelivery {
    pub id: Uuid,
}

impl Processor<PromoteOrderToDelivery> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:PromoteOrderToDelivery", err)]
    async fn process(&self, input: PromoteOrderToDelivery) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders SET order_status = $2 \
             WHERE id = $1 AND order_status <> $2 AND order_status <> $3 AND order_status <> $4 \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(OrderStatus::OnDelivery)
            .bind(OrderStatus::Delivered)
            .bind(OrderStatus::Cancelled)
            .fetch_optional(self.db())
            .await
    }
}

/// One-time driver registration. The `driver_name IS NULL` guard makes the
/// fields immutable through this path; only code regeneration clears them.
#[derive(Debug, Clone)]
pub struct RegisterDriver {
    pub id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
}

impl Processor<RegisterDriver> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:RegisterDriver", err)]
    async fn process(&self, input: RegisterDriver) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders SET driver_name = $2, driver_phone = $3 \
             WHERE id = $1 AND driver_name IS NULL \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(&input.driver_name)
            .bind(&input.driver_phone)
            .fetch_optional(self.db())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct SetDeliveryPhotoUrl {
    pub id: Uuid,
    pub url: String,
}

impl Processor<SetDeliveryPhotoUrl> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:SetDeliveryPhotoUrl", err)]
    async fn process(&self, input: SetDeliveryPhotoUrl) -> Result<Option<Order>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.orders SET delivery_photo_url = $2 \
             WHERE id = $1 AND order_status <> $3 AND order_status <> $4 \
             RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(&input.url)
            .bind(OrderStatus::Delivered)
            .bind(OrderStatus::Cancelled)
            .fetch_optional(self.db())
            .await
    }
}

/// Destructive code regeneration: overwrite the triple, clear the driver
/// identity and drop the location row, in one transaction. Leaves
/// `order_status` untouched.
#[derive(Debug, Clone)]
pub struct RegenerateOrderCodes {
    pub id: Uuid,
    pub codes: TrackingCodes,
}

impl Processor<RegenerateOrderCodes> for DatabaseProcessor {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:RegenerateOrderCodes", err)]
    async fn process(&self, input: RegenerateOrderCodes) -> Result<Option<Order>, sqlx::Error> {
        let mut tx = self.db().begin().await?;
        let sql = format!(
            "UPDATE shop.orders \
             SET tracking_code = $2, driver_code = $3, driver_pin = $4, \
                 driver_name = NULL, driver_phone = NULL \
             WHERE id = $1 \
             RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(input.id)
            .bind(&input.codes.tracking_code)
            .bind(&input.codes.driver_code)
            .bind(&input.codes.driver_pin)
            .fetch_optional(&mut *tx)
            .await?;
        if order.is_some() {
            sqlx::query("DELETE FROM shop.driver_locations WHERE order_id = $1")
                .bind(input.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(order)
    }
}
