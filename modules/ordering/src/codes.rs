use rand::Rng;

use crate::config::CodePrefixConfig;

const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TRACKING_CODE_LEN: usize = 6;
const DRIVER_CODE_LEN: usize = 4;

/// One freshly generated credential triple for an order.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackingCodes {
    pub tracking_code: String,
    pub driver_code: String,
    pub driver_pin: String,
}

impl core::fmt::Debug for TrackingCodes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrackingCodes")
            .field("tracking_code", &self.tracking_code)
            .field("driver_code", &self.driver_code)
            .field("driver_pin", &"[REDACTED]")
            .finish()
    }
}

/// Generates tracking/driver/PIN triples from configured prefixes.
///
/// Generation performs no existence check: uniqueness is enforced by the
/// unique indexes on `shop.orders` and retry-on-conflict at the call site.
#[derive(Debug, Clone)]
pub struct CodeIssuer {
    prefixes: CodePrefixConfig,
}

impl CodeIssuer {
    pub fn new(prefixes: CodePrefixConfig) -> Self {
        Self { prefixes }
    }

    /// A fresh independent triple. Regeneration calls this again; previous
    /// codes are never reused or incremented.
    pub fn issue(&self) -> TrackingCodes {
        TrackingCodes {
            tracking_code: format!(
                "{}-{}",
                self.prefixes.tracking_prefix,
                random_code_segment(TRACKING_CODE_LEN)
            ),
            driver_code: format!(
                "{}-{}",
                self.prefixes.driver_prefix,
                random_code_segment(DRIVER_CODE_LEN)
            ),
            driver_pin: generate_driver_pin(),
        }
    }
}

fn random_code_segment(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 4-digit PIN in [1000, 9999]. The lower bound rules out leading zeros on
/// purpose: the PIN is typed on a phone keypad and read out over calls.
fn generate_driver_pin() -> String {
    rand::rng().random_range(1000u16..=9999).to_string()
}
