use kanau::processor::Processor;
use tracing::instrument;
use uuid::Uuid;

use ordering::channel::TrackingChannel;
use ordering::config::DeliveryPhotoConfig;
use ordering::entities::order as order_db;
use ordering::entities::order::Order;
use ordering::events::order::{OrderSnapshot, OrderStatusChangedEvent};
use ordering::store::TrackingStore;

/// Where accepted photos end up. The URL it returns is what customers see
/// on the delivered page.
pub trait PhotoStorage: Clone + Send + Sync + 'static {
    fn store(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<String, framework::Error>> + Send;
}

/// Proof-of-delivery photo upload. Both checks run before any byte leaves
/// the process: a rejected file must cause no storage write and no
/// database write.
#[derive(Debug, Clone)]
pub struct DeliveryPhotoService<S, C, St> {
    store: S,
    channel: C,
    storage: St,
    config: DeliveryPhotoConfig,
}

#[derive(Debug, Clone)]
pub struct UploadDeliveryPhoto {
    pub order_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum UploadPhotoOutcome {
    NotAnImage,
    TooLarge { max_bytes: u64 },
    NotFound,
    /// The order reached a terminal status first; the stored file is
    /// orphaned but no order row was touched.
    OrderClosed,
    Stored(Order),
}

impl<S, C, St> DeliveryPhotoService<S, C, St> {
    pub fn new(store: S, channel: C, storage: St, config: DeliveryPhotoConfig) -> Self {
        Self {
            store,
            channel,
            storage,
            config,
        }
    }
}

impl<S: TrackingStore, C: TrackingChannel, St: PhotoStorage> Processor<UploadDeliveryPhoto>
    for DeliveryPhotoService<S, C, St>
{
    type Output = UploadPhotoOutcome;
    type Error = framework::Error;

    #[instrument(skip_all, name = "DeliveryPhoto:Upload", err)]
    async fn process(
        &self,
        input: UploadDeliveryPhoto,
    ) -> Result<UploadPhotoOutcome, framework::Error> {
        if !input.content_type.starts_with("image/") {
            return Ok(UploadPhotoOutcome::NotAnImage);
        }
        if input.bytes.len() as u64 > self.config.max_bytes {
            return Ok(UploadPhotoOutcome::TooLarge {
                max_bytes: self.config.max_bytes,
            });
        }

        let key = photo_key(input.order_id, &input.file_name, &input.content_type);
        let url = self
            .storage
            .store(&key, &input.content_type, input.bytes)
            .await?;

        let written = self
            .store
            .process(order_db::SetDeliveryPhotoUrl {
                id: input.order_id,
                url,
            })
            .await?;
        let Some(order) = written else {
            return match self
                .store
                .process(order_db::FindOrderById { id: input.order_id })
                .await?
            {
                Some(_) => Ok(UploadPhotoOutcome::OrderClosed),
                None => Ok(UploadPhotoOutcome::NotFound),
            };
        };

        if let Some(snapshot) = OrderSnapshot::of_order(&order) {
            self.channel
                .publish_order_changed(OrderStatusChangedEvent {
                    order: snapshot,
                    changed_at: framework::now_timestamp(),
                })
                .await?;
        }
        Ok(UploadPhotoOutcome::Stored(order))
    }
}

/// `{order_id}-{timestamp}.{ext}`, extension from the file name with the
/// MIME subtype as fallback.
fn photo_key(order_id: Uuid, file_name: &str, content_type: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .or_else(|| content_type.strip_prefix("image/"))
        .unwrap_or("jpg")
        .to_ascii_lowercase();
    format!("{order_id}-{}.{ext}", framework::now_timestamp())
}
