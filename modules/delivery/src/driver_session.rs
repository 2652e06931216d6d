use kanau::processor::Processor;
use tracing::instrument;
use uuid::Uuid;

use ordering::entities::order as order_db;
use ordering::entities::order::{Order, OrderStatus};
use ordering::store::TrackingStore;

/// Driver code + PIN login and the one-time registration that follows.
///
/// There are no driver accounts: the credential pair printed on the
/// delivery slip is the whole identity, scoped to a single order.
#[derive(Debug, Clone)]
pub struct DriverSessionService<S> {
    store: S,
}

impl<S: TrackingStore> DriverSessionService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

/// Codes are typed from a printed slip, so whitespace and case are
/// forgiven. The PIN is digits only; trimming is enough.
fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[derive(Clone)]
pub struct DriverLogin {
    pub driver_code: String,
    pub pin: String,
}

impl core::fmt::Debug for DriverLogin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverLogin")
            .field("driver_code", &self.driver_code)
            .field("pin", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum DriverLoginOutcome {
    UnknownCode,
    /// The code matched an order but the PIN did not.
    WrongPin,
    /// Delivered orders refuse driver login outright.
    AlreadyDelivered,
    /// First login on this order: the driver must register before the
    /// dashboard opens.
    RegistrationRequired(Order),
    Active(Order),
}

impl<S: TrackingStore> Processor<DriverLogin> for DriverSessionService<S> {
    type Output = DriverLoginOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "DriverSession:Login", err)]
    async fn process(&self, input: DriverLogin) -> Result<DriverLoginOutcome, framework::Error> {
        let driver_code = normalize_code(&input.driver_code);
        let pin = input.pin.trim();

        let Some(order) = self
            .store
            .process(order_db::FindOrderByDriverCode { driver_code })
            .await?
        else {
            return Ok(DriverLoginOutcome::UnknownCode);
        };
        if order.driver_pin.as_deref() != Some(pin) {
            return Ok(DriverLoginOutcome::WrongPin);
        }
        if order.order_status == OrderStatus::Delivered {
            return Ok(DriverLoginOutcome::AlreadyDelivered);
        }
        if !order.driver_registered() {
            return Ok(DriverLoginOutcome::RegistrationRequired(order));
        }
        Ok(DriverLoginOutcome::Active(order))
    }
}

/// One-time registration after the first login. Location consent is the
/// hard gate; the dashboard cannot work without positioning. Photo consent
/// is recorded but optional.
#[derive(Debug, Clone)]
pub struct CompleteDriverRegistration {
    pub order_id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
    pub location_consented: bool,
    pub photo_consented: bool,
}

#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    NotFound,
    /// Refused: no location consent, no registration.
    ConsentRequired,
    /// Name and phone were empty after trimming.
    MissingDetails,
    Registered(Order),
}

impl<S: TrackingStore> Processor<CompleteDriverRegistration> for DriverSessionService<S> {
    type Output = RegistrationOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "DriverSession:Register", err)]
    async fn process(
        &self,
        input: CompleteDriverRegistration,
    ) -> Result<RegistrationOutcome, framework::Error> {
        if !input.location_consented {
            return Ok(RegistrationOutcome::ConsentRequired);
        }
        let driver_name = input.driver_name.trim().to_owned();
        let driver_phone = input.driver_phone.trim().to_owned();
        if driver_name.is_empty() || driver_phone.is_empty() {
            return Ok(RegistrationOutcome::MissingDetails);
        }

        let written = self
            .store
            .process(order_db::RegisterDriver {
                id: input.order_id,
                driver_name,
                driver_phone,
            })
            .await?;
        if let Some(order) = written {
            return Ok(RegistrationOutcome::Registered(order));
        }

        // The guarded write is a no-op when a driver is already on file.
        // Re-submitting the form after a reload is not an error.
        match self
            .store
            .process(order_db::FindOrderById { id: input.order_id })
            .await?
        {
            Some(order) if order.driver_registered() => Ok(RegistrationOutcome::Registered(order)),
            Some(_) | None => Ok(RegistrationOutcome::NotFound),
        }
    }
}
