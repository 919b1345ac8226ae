//! Shipping destination snapshot.

use serde::{Deserialize, Serialize};

/// Where and to whom an order ships. Copied onto the order at creation and
/// never changed afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShippingInfo {
    /// Delivery address, one line.
    pub address: String,
    /// Phone or email to reach the recipient.
    pub contact: String,
    /// Recipient, when different from the account holder.
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    /// Delivery note.
    #[serde(default)]
    pub note: Option<String>,
}

impl ShippingInfo {
    pub fn new(address: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            contact: contact.into(),
            full_name: None,
            note: None,
        }
    }

    /// Check if the required fields are filled in.
    pub fn is_complete(&self) -> bool {
        !self.address.trim().is_empty() && !self.contact.trim().is_empty()
    }

    /// Format as a single line.
    pub fn one_line(&self) -> String {
        match &self.full_name {
            Some(name) => format!("{}, {} ({})", name, self.address, self.contact),
            None => format!("{} ({})", self.address, self.contact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipping_info_completeness() {
        assert!(ShippingInfo::new("12 Le Loi, District 1", "0901234567").is_complete());
        assert!(!ShippingInfo::new("   ", "0901234567").is_complete());
        assert!(!ShippingInfo::default().is_complete());
    }

    #[test]
    fn test_shipping_info_formatting() {
        let mut info = ShippingInfo::new("12 Le Loi", "0901234567");
        assert_eq!(info.one_line(), "12 Le Loi (0901234567)");
        info.full_name = Some("Lan Nguyen".into());
        assert_eq!(info.one_line(), "Lan Nguyen, 12 Le Loi (0901234567)");
    }
}
