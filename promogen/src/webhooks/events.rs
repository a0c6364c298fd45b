//! Identity provider event payloads.
//!
//! Only the fields the service acts on are modelled; everything else in a delivery is ignored.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::types::UserId;

/// Envelope of every delivery
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

/// Events the service reacts to, decoded from an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityEvent {
    UserCreated(UserCreatedData),
    UserDeleted(UserDeletedData),
    PaymentAttemptUpdated(PaymentAttemptData),
    /// Acknowledged without side effects
    Other(String),
}

impl IdentityEvent {
    pub const USER_CREATED: &'static str = "user.created";
    pub const USER_DELETED: &'static str = "user.deleted";
    pub const PAYMENT_ATTEMPT_UPDATED: &'static str = "paymentAttempt.updated";

    pub fn from_envelope(envelope: WebhookEnvelope) -> Result<Self, serde_json::Error> {
        Ok(match envelope.event_type.as_str() {
            Self::USER_CREATED => Self::UserCreated(serde_json::from_value(envelope.data)?),
            Self::USER_DELETED => Self::UserDeleted(serde_json::from_value(envelope.data)?),
            Self::PAYMENT_ATTEMPT_UPDATED => Self::PaymentAttemptUpdated(serde_json::from_value(envelope.data)?),
            _ => Self::Other(envelope.event_type),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserCreatedData {
    pub id: UserId,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl UserCreatedData {
    pub fn primary_email(&self) -> String {
        self.email_addresses
            .first()
            .map(|email| email.email_address.clone())
            .unwrap_or_default()
    }

    /// `"{first} {last}"` with missing parts dropped
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserDeletedData {
    pub id: UserId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Payer {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Plan {
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub plan: Option<Plan>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentAttemptData {
    #[serde(default)]
    pub charge_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payer: Option<Payer>,
    #[serde(default)]
    pub subscription_items: Vec<SubscriptionItem>,
}

impl PaymentAttemptData {
    /// A settled first purchase or renewal; every other attempt update is informational
    pub fn is_paid_charge(&self) -> bool {
        matches!(self.charge_type.as_deref(), Some("recurring" | "checkout")) && self.status.as_deref() == Some("paid")
    }

    pub fn plan_slug(&self) -> Option<&str> {
        self.subscription_items.first()?.plan.as_ref().map(|plan| plan.slug.as_str())
    }

    pub fn payer_id(&self) -> Option<&UserId> {
        self.payer.as_ref().map(|payer| &payer.user_id)
    }
}
