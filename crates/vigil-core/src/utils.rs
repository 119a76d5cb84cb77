//! Common utility functions

use uuid::Uuid;

/// Generate a new id as 32 lowercase hex characters (UUID v4 without dashes)
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Mask sensitive data for logging
pub fn mask_sensitive(data: &str) -> String {
    if data.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
