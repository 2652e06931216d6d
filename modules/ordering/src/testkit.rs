//! In-memory stand-ins for the persistence layer, used by service tests.
//! Mirrors each SQL command's guard semantics over plain maps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::driver_location::{
    DriverLocation, FindDriverLocationByOrder, FindDriverLocationByTrackingCode,
    SetDriverLocationStatus, UpsertDriverLocation,
};
use crate::entities::order::{
    BeginDeliveryWithCodes, CancelOrder, FindOrderByDriverCode, FindOrderById,
    FindOrderByTrackingCode, MarkOrderDelivered, Order, OrderStatus, PromoteOrderToDelivery,
    RegenerateOrderCodes, RegisterDriver, SetDeliveryPhotoUrl, UpdateOrderStatus,
};

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    locations: HashMap<Uuid, DriverLocation>,
    next_location_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_order(&self, order: Order) {
        self.lock().orders.insert(order.id, order);
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn location(&self, order_id: Uuid) -> Option<DriverLocation> {
        self.lock().locations.get(&order_id).cloned()
    }
}

/// A plausible order row for tests. Codes and driver identity start empty.
pub fn order_fixture(id: Uuid, status: OrderStatus) -> Order {
    Order {
        id,
        full_name: "Test Customer".to_owned(),
        email: Some("customer@example.com".to_owned()),
        phone: "+96500000000".to_owned(),
        address: "Block 1, Street 2".to_owned(),
        city: "Salmiya".to_owned(),
        governorate: "Hawalli".to_owned(),
        total_amount: Decimal::new(12_500, 3),
        created_at: framework::now_time(),
        order_status: status,
        tracking_code: None,
        driver_code: None,
        driver_pin: None,
        driver_name: None,
        driver_phone: None,
        delivered_at: None,
        delivery_photo_url: None,
    }
}

impl Processor<FindOrderById> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: FindOrderById) -> Result<Option<Order>, sqlx::Error> {
        Ok(self.lock().orders.get(&input.id).cloned())
    }
}

impl Processor<FindOrderByTrackingCode> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: FindOrderByTrackingCode) -> Result<Option<Order>, sqlx::Error> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|o| o.tracking_code.as_deref() == Some(input.tracking_code.as_str()))
            .cloned())
    }
}

impl Processor<FindOrderByDriverCode> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: FindOrderByDriverCode) -> Result<Option<Order>, sqlx::Error> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|o| o.driver_code.as_deref() == Some(input.driver_code.as_str()))
            .cloned())
    }
}

impl Processor<UpdateOrderStatus> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: UpdateOrderStatus) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.order_status != input.from {
            return Ok(None);
        }
        order.order_status = input.to;
        Ok(Some(order.clone()))
    }
}

impl Processor<BeginDeliveryWithCodes> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: BeginDeliveryWithCodes) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.order_status != input.from || order.tracking_code.is_some() {
            return Ok(None);
        }
        order.order_status = OrderStatus::OnDelivery;
        order.tracking_code = Some(input.codes.tracking_code.clone());
        order.driver_code = Some(input.codes.driver_code.clone());
        order.driver_pin = Some(input.codes.driver_pin.clone());
        Ok(Some(order.clone()))
    }
}

impl Processor<MarkOrderDelivered> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: MarkOrderDelivered) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.order_status != OrderStatus::OnDelivery {
            return Ok(None);
        }
        order.order_status = OrderStatus::Delivered;
        order.delivered_at = Some(framework::now_time());
        Ok(Some(order.clone()))
    }
}

impl Processor<CancelOrder> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: CancelOrder) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.order_status.is_terminal() {
            return Ok(None);
        }
        order.order_status = OrderStatus::Cancelled;
        Ok(Some(order.clone()))
    }
}

impl Processor<PromoteOrderToDelivery> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: PromoteOrderToDelivery) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.order_status == OrderStatus::OnDelivery || order.order_status.is_terminal() {
            return Ok(None);
        }
        order.order_status = OrderStatus::OnDelivery;
        Ok(Some(order.clone()))
    }
}

impl Processor<RegisterDriver> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: RegisterDriver) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.driver_name.is_some() {
            return Ok(None);
        }
        order.driver_name = Some(input.driver_name);
        order.driver_phone = Some(input.driver_phone);
        Ok(Some(order.clone()))
    }
}

impl Processor<SetDeliveryPhotoUrl> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: SetDeliveryPhotoUrl) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        if order.order_status.is_terminal() {
            return Ok(None);
        }
        order.delivery_photo_url = Some(input.url);
        Ok(Some(order.clone()))
    }
}

impl Processor<RegenerateOrderCodes> for MemoryStore {
    type Output = Option<Order>;
    type Error = sqlx::Error;
    async fn process(&self, input: RegenerateOrderCodes) -> Result<Option<Order>, sqlx::Error> {
        let mut state = self.lock();
        let Some(order) = state.orders.get_mut(&input.id) else {
            return Ok(None);
        };
        order.tracking_code = Some(input.codes.tracking_code.clone());
        order.driver_code = Some(input.codes.driver_code.clone());
        order.driver_pin = Some(input.codes.driver_pin.clone());
        order.driver_name = None;
        order.driver_phone = None;
        let order = order.clone();
        state.locations.remove(&input.id);
        Ok(Some(order))
    }
}

impl Processor<UpsertDriverLocation> for MemoryStore {
    type Output = DriverLocation;
    type Error = sqlx::Error;
    async fn process(&self, input: UpsertDriverLocation) -> Result<DriverLocation, sqlx::Error> {
        let mut state = self.lock();
        match state.locations.get_mut(&input.order_id) {
            Some(row) => {
                row.latitude = Some(input.latitude);
                row.longitude = Some(input.longitude);
                row.status = input.status;
                row.updated_at = framework::now_time();
                Ok(row.clone())
            }
            None => {
                state.next_location_id += 1;
                let row = DriverLocation {
                    id: state.next_location_id,
                    order_id: input.order_id,
                    tracking_code: input.tracking_code,
                    latitude: Some(input.latitude),
                    longitude: Some(input.longitude),
                    status: input.status,
                    updated_at: framework::now_time(),
                };
                state.locations.insert(input.order_id, row.clone());
                Ok(row)
            }
        }
    }
}

impl Processor<FindDriverLocationByOrder> for MemoryStore {
    type Output = Option<DriverLocation>;
    type Error = sqlx::Error;
    async fn process(
        &self,
        input: FindDriverLocationByOrder,
    ) -> Result<Option<DriverLocation>, sqlx::Error> {
        Ok(self.lock().locations.get(&input.order_id).cloned())
    }
}

impl Processor<FindDriverLocationByTrackingCode> for MemoryStore {
    type Output = Option<DriverLocation>;
    type Error = sqlx::Error;
    async fn process(
        &self,
        input: FindDriverLocationByTrackingCode,
    ) -> Result<Option<DriverLocation>, sqlx::Error> {
        Ok(self
            .lock()
            .locations
            .values()
            .find(|l| l.tracking_code == input.tracking_code)
            .cloned())
    }
}

impl Processor<SetDriverLocationStatus> for MemoryStore {
    type Output = Option<DriverLocation>;
    type Error = sqlx::Error;
    async fn process(
        &self,
        input: SetDriverLocationStatus,
    ) -> Result<Option<DriverLocation>, sqlx::Error> {
        let mut state = self.lock();
        let Some(row) = state.locations.get_mut(&input.order_id) else {
            return Ok(None);
        };
        row.status = input.status;
        row.updated_at = framework::now_time();
        Ok(Some(row.clone()))
    }
}
