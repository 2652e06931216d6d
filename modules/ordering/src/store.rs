use kanau::processor::Processor;

use crate::entities::driver_location::{
    DriverLocation, FindDriverLocationByOrder, FindDriverLocationByTrackingCode,
    SetDriverLocationStatus, UpsertDriverLocation,
};
use crate::entities::order::{
    BeginDeliveryWithCodes, CancelOrder, FindOrderByDriverCode, FindOrderById,
    FindOrderByTrackingCode, MarkOrderDelivered, Order, PromoteOrderToDelivery,
    RegenerateOrderCodes, RegisterDriver, SetDeliveryPhotoUrl, UpdateOrderStatus,
};

/// Everything the tracking services need from persistence, as one bound.
///
/// `DatabaseProcessor` is the production store; the `testkit` feature ships
/// an in-memory one. Services stay generic over this alias instead of
/// spelling out a dozen `Processor` bounds each.
pub trait TrackingStore:
    Clone
    + Send
    + Sync
    + 'static
    + Processor<FindOrderById, Output = Option<Order>, Error = sqlx::Error>
    + Processor<FindOrderByTrackingCode, Output = Option<Order>, Error = sqlx::Error>
    + Processor<FindOrderByDriverCode, Output = Option<Order>, Error = sqlx::Error>
    + Processor<UpdateOrderStatus, Output = Option<Order>, Error = sqlx::Error>
    + Processor<BeginDeliveryWithCodes, Output = Option<Order>, Error = sqlx::Error>
    + Processor<MarkOrderDelivered, Output = Option<Order>, Error = sqlx::Error>
    + Processor<CancelOrder, Output = Option<Order>, Error = sqlx::Error>
    + Processor<PromoteOrderToDelivery, Output = Option<Order>, Error = sqlx::Error>
    + Processor<RegisterDriver, Output = Option<Order>, Error = sqlx::Error>
    + Processor<SetDeliveryPhotoUrl, Output = Option<Order>, Error = sqlx::Error>
    + Processor<RegenerateOrderCodes, Output = Option<Order>, Error = sqlx::Error>
    + Processor<UpsertDriverLocation, Output = DriverLocation, Error = sqlx::Error>
    + Processor<FindDriverLocationByOrder, Output = Option<DriverLocation>, Error = sqlx::Error>
    + Processor<
        FindDriverLocationByTrackingCode,
        Output = Option<DriverLocation>,
        Error = sqlx::Error,
    >
    + Processor<SetDriverLocationStatus, Output = Option<DriverLocation>, Error = sqlx::Error>
{
}

impl<S> TrackingStore for S where
    S: Clone
        + Send
        + Sync
        + 'static
        + Processor<FindOrderById, Output = Option<Order>, Error = sqlx::Error>
        + Processor<FindOrderByTrackingCode, Output = Option<Order>, Error = sqlx::Error>
        + Processor<FindOrderByDriverCode, Output = Option<Order>, Error = sqlx::Error>
        + Processor<UpdateOrderStatus, Output = Option<Order>, Error = sqlx::Error>
        + Processor<BeginDeliveryWithCodes, Output = Option<Order>, Error = sqlx::Error>
        + Processor<MarkOrderDelivered, Output = Option<Order>, Error = sqlx::Error>
        + Processor<CancelOrder, Output = Option<Order>, Error = sqlx::Error>
        + Processor<PromoteOrderToDelivery, Output = Option<Order>, Error = sqlx::Error>
        + Processor<RegisterDriver, Output = Option<Order>, Error = sqlx::Error>
        + Processor<SetDeliveryPhotoUrl, Output = Option<Order>, Error = sqlx::Error>
        + Processor<RegenerateOrderCodes, Output = Option<Order>, Error = sqlx::Error>
        + Processor<UpsertDriverLocation, Output = DriverLocation, Error = sqlx::Error>
        + Processor<FindDriverLocationByOrder, Output = Option<DriverLocation>, Error = sqlx::Error>
        + Processor<
            FindDriverLocationByTrackingCode,
            Output = Option<DriverLocation>,
            Error = sqlx::Error,
        >
        + Processor<SetDriverLocationStatus, Output = Option<DriverLocation>, Error = sqlx::Error>
{
}
