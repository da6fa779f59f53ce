//! Request shapes for the subscription endpoints.
//!
//! Only outbound payloads are typed; responses are passed through as JSON.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a recurring subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Authorized,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Authorized => "authorized",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing period unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyType {
    Days,
    Months,
}

/// Recurring charge terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoRecurring {
    pub frequency: u32,
    pub frequency_type: FrequencyType,
    pub transaction_amount: f64,
    pub currency_id: String,
}

/// Payload for creating a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubscription {
    /// Plan description shown to the payer
    pub reason: String,
    pub payer_email: String,
    /// Where the payer returns after checkout
    pub back_url: String,
    pub auto_recurring: AutoRecurring,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(SubscriptionStatus::Cancelled).unwrap(), json!("cancelled"));
        assert_eq!(SubscriptionStatus::Authorized.to_string(), "authorized");
        let parsed: SubscriptionStatus = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(parsed, SubscriptionStatus::Paused);
    }

    #[test]
    fn test_new_subscription_omits_unset_fields() {
        let subscription = NewSubscription {
            reason: "Plan Vendedor Pro".to_string(),
            payer_email: "seller@example.com".to_string(),
            back_url: "https://example.com/billing/return".to_string(),
            auto_recurring: AutoRecurring {
                frequency: 1,
                frequency_type: FrequencyType::Months,
                transaction_amount: 4999.0,
                currency_id: "ARS".to_string(),
            },
            external_reference: None,
            status: None,
        };

        let value = serde_json::to_value(&subscription).unwrap();
        assert_eq!(value["auto_recurring"]["frequency_type"], "months");
        assert!(value.get("external_reference").is_none());
        assert!(value.get("status").is_none());
    }
}
