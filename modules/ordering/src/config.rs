use compact_str::CompactString;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CodePrefixConfig {
    pub tracking_prefix: CompactString,
    pub driver_prefix: CompactString,
}

impl Default for CodePrefixConfig {
    fn default() -> Self {
        Self {
            tracking_prefix: CompactString::const_new("SR"),
            driver_prefix: CompactString::const_new("DRV"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LocationPublishConfig {
    /// How often the driver device persists a fresh fix. The continuous
    /// observation updates the UI on every fix regardless; this bounds the
    /// write volume.
    pub persist_interval: time::Duration,
}

impl Default for LocationPublishConfig {
    fn default() -> Self {
        Self {
            persist_interval: time::Duration::seconds(10),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeliveryPhotoConfig {
    pub max_bytes: u64,
}

impl Default for DeliveryPhotoConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackingConfig {
    pub prefixes: CodePrefixConfig,
    pub publish: LocationPublishConfig,
    pub photo: DeliveryPhotoConfig,

    /// Base of the customer tracking link; the tracking code is appended.
    #[serde(default = "default_tracking_url_base")]
    pub tracking_url_base: CompactString,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            prefixes: CodePrefixConfig::default(),
            publish: LocationPublishConfig::default(),
            photo: DeliveryPhotoConfig::default(),
            tracking_url_base: default_tracking_url_base(),
        }
    }
}

impl TrackingConfig {
    pub fn tracking_url(&self, tracking_code: &str) -> String {
        format!("{}/{tracking_code}", self.tracking_url_base)
    }
}

fn default_tracking_url_base() -> CompactString {
    CompactString::const_new("https://shop.example.com/track")
}
