//! Credit reservations held across a generation.

use crate::{
    db::store::Datastore,
    errors::{Error, Result},
    types::UserId,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Credits debited up front for an operation that may still fail.
///
/// Settle it with [`commit`](Self::commit) once the work has landed or
/// [`refund`](Self::refund) when it has not. A reservation dropped unsettled (early return,
/// panic, cancelled future) refunds itself on a background task, so the debit is returned
/// exactly once on every failure path.
#[must_use = "an unsettled reservation refunds itself when dropped"]
pub struct CreditReservation {
    store: Arc<dyn Datastore>,
    user_id: UserId,
    amount: i64,
    settled: bool,
}

impl CreditReservation {
    /// Debit `amount` credits, failing with `InsufficientCredits` and no mutation when the
    /// balance cannot cover it
    pub async fn acquire(store: Arc<dyn Datastore>, user_id: &UserId, amount: i64) -> Result<Self> {
        match store.debit_credits(user_id, amount).await? {
            Some(balance) => {
                debug!(user_id = %user_id, amount, balance, "Reserved credits");
                Ok(Self {
                    store,
                    user_id: user_id.clone(),
                    amount,
                    settled: false,
                })
            }
            None => Err(Error::InsufficientCredits { required: amount }),
        }
    }

    /// Keep the debit
    pub fn commit(mut self) {
        self.settled = true;
        debug!(user_id = %self.user_id, amount = self.amount, "Committed credit reservation");
    }

    /// Return the debit now
    pub async fn refund(mut self) {
        self.settled = true;
        return_credits(self.store.as_ref(), &self.user_id, self.amount).await;
    }
}

impl std::fmt::Debug for CreditReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditReservation")
            .field("user_id", &self.user_id)
            .field("amount", &self.amount)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for CreditReservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let store = self.store.clone();
        let user_id = std::mem::take(&mut self.user_id);
        let amount = self.amount;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(user_id = %user_id, amount, "Credit reservation dropped unsettled, refunding");
                handle.spawn(async move { return_credits(store.as_ref(), &user_id, amount).await });
            }
            Err(_) => {
                error!(user_id = %user_id, amount, "Credit reservation dropped outside a runtime, refund lost");
            }
        }
    }
}

async fn return_credits(store: &dyn Datastore, user_id: &UserId, amount: i64) {
    match store.credit_credits(user_id, amount).await {
        Ok(Some(balance)) => debug!(user_id = %user_id, amount, balance, "Refunded credits"),
        Ok(None) => warn!(user_id = %user_id, amount, "User vanished before refund"),
        Err(e) => error!(user_id = %user_id, amount, "Failed to refund credits: {e:#}"),
    }
}
