//! Runtime-tunable workflow settings

use serde::{Deserialize, Serialize};

/// Settings editable by administrators at runtime.
///
/// A revision is auto-approved only when its absolute change is at most
/// `auto_approve_max_minor` AND its relative change is at most
/// `auto_approve_max_percent_bp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Absolute auto-approval threshold in USD cents
    #[serde(default = "default_auto_approve_max_minor")]
    pub auto_approve_max_minor: i64,

    /// Relative auto-approval threshold in basis points (100 = 1%)
    #[serde(default = "default_auto_approve_max_percent_bp")]
    pub auto_approve_max_percent_bp: u32,

    /// Edit lock time-to-live
    #[serde(default = "default_lock_ttl_minutes")]
    pub lock_ttl_minutes: u32,

    /// Largest accepted attachment upload
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_approve_max_minor: default_auto_approve_max_minor(),
            auto_approve_max_percent_bp: default_auto_approve_max_percent_bp(),
            lock_ttl_minutes: default_lock_ttl_minutes(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

impl Settings {
    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lock_ttl_minutes))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auto_approve_max_minor < 0 {
            return Err("auto_approve_max_minor must not be negative".to_string());
        }
        if self.lock_ttl_minutes == 0 {
            return Err("lock_ttl_minutes must be at least 1".to_string());
        }
        if self.max_attachment_bytes == 0 {
            return Err("max_attachment_bytes must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_auto_approve_max_minor() -> i64 {
    // 5,000.00 USD
    500_000
}

fn default_auto_approve_max_percent_bp() -> u32 {
    // 10%
    1_000
}

fn default_lock_ttl_minutes() -> u32 {
    30
}

fn default_max_attachment_bytes() -> u64 {
    25 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_thirty_minute_lock() {
        let settings = Settings::default();
        assert_eq!(settings.lock_ttl(), chrono::Duration::minutes(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "auto_approve_max_minor": 100 }"#).unwrap();
        assert_eq!(settings.auto_approve_max_minor, 100);
        assert_eq!(settings.lock_ttl_minutes, 30);
    }

    #[test]
    fn zero_ttl_is_invalid() {
        let settings = Settings {
            lock_ttl_minutes: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
