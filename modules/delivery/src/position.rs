use tokio_stream::wrappers::ReceiverStream;

/// One GPS fix from the driver's device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    /// The driver declined location access. Registration and publishing are
    /// both gated on this.
    #[error("location permission denied")]
    PermissionDenied,
    /// Hardware or platform failure; distinct from a denial so callers can
    /// tell the driver to retry instead of re-consenting.
    #[error("position unavailable")]
    Unavailable,
}

/// Device positioning as the publisher sees it: one immediate fix, plus a
/// continuous observation that keeps yielding until the source is dropped.
pub trait PositionSource: Clone + Send + Sync + 'static {
    fn current_fix(&self) -> impl Future<Output = Result<GeoFix, PositionError>> + Send;

    /// Continuous fixes. The stream ending means the device stopped
    /// observing, not that delivery completed.
    fn watch(&self) -> impl Future<Output = Result<ReceiverStream<GeoFix>, PositionError>> + Send;
}
