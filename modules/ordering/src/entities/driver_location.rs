use framework::sqlx::DatabaseProcessor;
use kanau::processor::Processor;
use time::PrimitiveDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Last-known driver position for one order. At most one row per order:
/// every push is a full-row upsert, never a history append. The row outlives
/// delivery completion (kept as the last-known-position record) and is only
/// deleted when codes are regenerated.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DriverLocation {
    pub id: i64,
    pub order_id: Uuid,
    pub tracking_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: DeliveryStatus,
    pub updated_at: PrimitiveDateTime,
}

/// Informational mirror of the delivery state on the location row.
/// `Order::order_status` stays authoritative.
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
#[sqlx(type_name = "shop.delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    OutForDelivery,
    Delivered,
}

const LOCATION_COLUMNS: &str =
    "id, order_id, tracking_code, latitude, longitude, status, updated_at";

/// Full-row last-write-wins upsert. The driver's continuous observation and
/// the interval persist loop both funnel through this, so whichever write
/// lands last determines the row wholesale.
#[derive(Debug, Clone)]
pub struct UpsertDriverLocation {
    pub order_id: Uuid,
    pub tracking_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: DeliveryStatus,
}

impl Processor<UpsertDriverLocation> for DatabaseProcessor {
    type Output = DriverLocation;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:UpsertDriverLocation", err)]
    async fn process(&self, input: UpsertDriverLocation) -> Result<DriverLocation, sqlx::Error> {
        let sql = format!(
            "INSERT INTO shop.driver_locations \
                 (order_id, tracking_code, latitude, longitude, status) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (order_id) DO UPDATE \
             SET latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude, \
                 status = EXCLUDED.status, updated_at = NOW() \
             RETURNING {LOCATION_COLUMNS}"
        );
        sqlx::query_as::<_, DriverLocation>(&sql)
            .bind(input.order_id)
            .bind(&input.tracking_code)
            .bind(input.latitude)
            .bind(input.longitude)
            .bind(input.status)
            .fetch_one(self.db())
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FindDriverLocationByOrder {
    pub order_id: Uuid,
}

impl Processor<FindDriverLocationByOrder> for DatabaseProcessor {
    type Output = Option<DriverLocation>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindDriverLocationByOrder", err)]
    async fn process(
        &self,
        input: FindDriverLocationByOrder,
    ) -> Result<Option<DriverLocation>, sqlx::Error> {
        let sql = format!("SELECT {LOCATION_COLUMNS} FROM shop.driver_locations WHERE order_id = $1");
        sqlx::query_as::<_, DriverLocation>(&sql)
            .bind(input.order_id)
            .fetch_optional(self.db())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct FindDriverLocationByTrackingCode {
    pub tracking_code: String,
}

impl Processor<FindDriverLocationByTrackingCode> for DatabaseProcessor {
    type Output = Option<DriverLocation>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:FindDriverLocationByTrackingCode", err)]
    async fn process(
        &self,
        input: FindDriverLocationByTrackingCode,
    ) -> Result<Option<DriverLocation>, sqlx::Error> {
        let sql =
            format!("SELECT {LOCATION_COLUMNS} FROM shop.driver_locations WHERE tracking_code = $1");
        sqlx::query_as::<_, DriverLocation>(&sql)
            .bind(&input.tracking_code)
            .fetch_optional(self.db())
            .await
    }
}

/// Final write on "mark delivered": flips the status mirror but keeps the
/// last coordinates in place.
#[derive(Debug, Clone, Copy)]
pub struct SetDriverLocationStatus {
    pub order_id: Uuid,
    pub status: DeliveryStatus,
}

impl Processor<SetDriverLocationStatus> for DatabaseProcessor {
    type Output = Option<DriverLocation>;
    type Error = sqlx::Error;
    #[instrument(skip_all, name = "SQL:SetDriverLocationStatus", err)]
    async fn process(
        &self,
        input: SetDriverLocationStatus,
    ) -> Result<Option<DriverLocation>, sqlx::Error> {
        let sql = format!(
            "UPDATE shop.driver_locations SET status = $2, updated_at = NOW() \
             WHERE order_id = $1 \
             RETURNING {LOCATION_COLUMNS}"
        );
        sqlx::query_as::<_, DriverLocation>(&sql)
            .bind(input.order_id)
            .bind(input.status)
            .fetch_optional(self.db())
            .await
    }
}
