//! Inbound identity provider webhooks.
//!
//! - [`signing`]: Standard Webhooks (Svix) signature verification
//! - [`events`]: Typed payloads for the events the service acts on
//!
//! [`apply_event`] turns a verified event into account changes: users are mirrored on
//! creation and deletion, and paid plan charges top up the payer's balance.

pub mod events;
pub mod signing;

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    config::CreditsConfig,
    db::{models::users::UserCreateDBRequest, store::Datastore},
    errors::{Error, Result},
};
use events::{IdentityEvent, PaymentAttemptData, UserCreatedData};

/// Apply one verified event
#[instrument(skip_all)]
pub async fn apply_event(store: &Arc<dyn Datastore>, credits: &CreditsConfig, event: IdentityEvent) -> Result<()> {
    match event {
        IdentityEvent::UserCreated(data) => user_created(store.as_ref(), credits, data).await,
        IdentityEvent::UserDeleted(data) => {
            if store.delete_user(&data.id).await? {
                info!(user_id = %data.id, "Deleted user and their projects");
            } else {
                debug!(user_id = %data.id, "Delete for unknown user ignored");
            }
            Ok(())
        }
        IdentityEvent::PaymentAttemptUpdated(data) => payment_attempt_updated(store.as_ref(), credits, data).await,
        IdentityEvent::Other(event_type) => {
            debug!(%event_type, "Ignoring webhook event type");
            Ok(())
        }
    }
}

async fn user_created(store: &dyn Datastore, credits: &CreditsConfig, data: UserCreatedData) -> Result<()> {
    let user = store
        .create_user(&UserCreateDBRequest {
            id: data.id.clone(),
            email: data.primary_email(),
            name: data.display_name(),
            image: data.image_url.clone().unwrap_or_default(),
            credits: credits.initial_balance,
        })
        .await?;
    info!(user_id = %user.id, credits = user.credits, "Registered user");
    Ok(())
}

async fn payment_attempt_updated(store: &dyn Datastore, credits: &CreditsConfig, data: PaymentAttemptData) -> Result<()> {
    if !data.is_paid_charge() {
        debug!(charge_type = ?data.charge_type, status = ?data.status, "Payment attempt not settled, ignoring");
        return Ok(());
    }

    let amount = data
        .plan_slug()
        .and_then(|slug| credits.plans.get(slug).copied())
        .ok_or_else(|| Error::BadRequest {
            message: "Invalid plan".to_string(),
        })?;

    let payer = data.payer_id().ok_or_else(|| Error::BadRequest {
        message: "Payment attempt has no payer".to_string(),
    })?;

    match store.credit_credits(payer, amount).await? {
        Some(balance) => {
            info!(user_id = %payer, plan = ?data.plan_slug(), amount, balance, "Granted plan credits");
            Ok(())
        }
        None => {
            warn!(user_id = %payer, "Payment for unknown user");
            Err(Error::NotFound {
                resource: "User".to_string(),
                id: payer.clone(),
            })
        }
    }
}
