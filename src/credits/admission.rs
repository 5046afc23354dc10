//! Pricing and pre-flight admission for metered operations.

use std::sync::Arc;

use docscout_search::Provider;

use crate::config::CostSchedule;
use crate::error::{Result, ScoutError};

use super::ledger::{CreditError, CreditLedger, ReservationId};

impl From<CreditError> for ScoutError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientBalance {
                account,
                required,
                available,
            } => Self::InsufficientBalance {
                account,
                required,
                available,
            },
            other => Self::Credit(other.to_string()),
        }
    }
}

/// Computes costs and reserves them before work starts.
#[derive(Clone)]
pub struct AdmissionController {
    ledger: Arc<dyn CreditLedger>,
    costs: CostSchedule,
}

impl AdmissionController {
    pub fn new(ledger: Arc<dyn CreditLedger>, costs: CostSchedule) -> Self {
        Self { ledger, costs }
    }

    pub fn costs(&self) -> &CostSchedule {
        &self.costs
    }

    pub fn quote_cache_hit(&self) -> u64 {
        self.costs.cache_hit
    }

    /// Sum of unit costs for the providers that will be dispatched.
    pub fn quote_aggregation(&self, dispatched: &[Provider]) -> u64 {
        dispatched
            .iter()
            .map(|p| self.costs.provider_cost(*p))
            .sum()
    }

    /// Flat cost per mapping call.
    pub fn quote_discovery(&self, map_calls: usize) -> u64 {
        self.costs.discovery_map.saturating_mul(map_calls as u64)
    }

    /// Reserve `amount` for `account`.
    ///
    /// # Errors
    ///
    /// [`ScoutError::InsufficientBalance`] if the account cannot cover it.
    pub fn admit(&self, account: &str, amount: u64, reason: &str) -> Result<Admission> {
        let id = self.ledger.reserve(account, amount, reason)?;
        tracing::debug!(account, amount, reason, reservation = %id, "credit reserved");
        Ok(Admission {
            ledger: Arc::clone(&self.ledger),
            id: Some(id),
            amount,
        })
    }

    /// Balance minus outstanding holds.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error for an unknown account.
    pub fn available(&self, account: &str) -> Result<u64> {
        Ok(self.ledger.available(account)?)
    }
}

/// A live reservation. Dropping it without [`Admission::commit`] or
/// [`Admission::settle`] releases the held amount.
#[must_use = "dropping an admission releases its reservation"]
pub struct Admission {
    ledger: Arc<dyn CreditLedger>,
    id: Option<ReservationId>,
    amount: u64,
}

impl Admission {
    /// The reserved amount.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Debit the full reservation. Returns the amount charged.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error if the commit fails.
    pub fn commit(mut self) -> Result<u64> {
        match self.id.take() {
            Some(id) => {
                self.ledger.commit(id)?;
                Ok(self.amount)
            }
            None => Ok(0),
        }
    }

    /// Debit `min(amount, reserved)` and release the remainder.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error if the settlement fails.
    pub fn settle(mut self, amount: u64) -> Result<u64> {
        let charged = amount.min(self.amount);
        match self.id.take() {
            Some(id) => {
                self.ledger.settle(id, charged)?;
                Ok(charged)
            }
            None => Ok(0),
        }
    }

    /// Release without charging.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.ledger.release(id) {
                tracing::warn!(reservation = %id, error = %e, "failed to release credit reservation");
            }
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::credits::InMemoryLedger;

    fn controller(balance: u64) -> (Arc<InMemoryLedger>, AdmissionController) {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.deposit("acct", balance).expect("deposit");
        let admission = AdmissionController::new(ledger.clone(), CostSchedule::default());
        (ledger, admission)
    }

    #[test]
    fn quotes_follow_schedule() {
        let (_, admission) = controller(0);
        assert_eq!(admission.quote_cache_hit(), 1);
        assert_eq!(
            admission.quote_aggregation(&[Provider::Google, Provider::DuckDuckGo]),
            12
        );
        assert_eq!(admission.quote_discovery(3), 15);
        assert!(admission.quote_cache_hit() < admission.quote_aggregation(&[Provider::DuckDuckGo]));
    }

    #[test]
    fn dropped_admission_releases() {
        let (ledger, admission) = controller(20);
        {
            let _held = admission.admit("acct", 20, "search").expect("admit");
            assert_eq!(ledger.available("acct").unwrap(), 0);
        }
        assert_eq!(ledger.available("acct").unwrap(), 20);
        assert_eq!(ledger.outstanding_reservations().unwrap(), 0);
    }

    #[test]
    fn commit_charges_reserved_amount() {
        let (ledger, admission) = controller(20);
        let held = admission.admit("acct", 12, "search").expect("admit");
        assert_eq!(held.commit().expect("commit"), 12);
        assert_eq!(ledger.balance("acct").unwrap(), 8);
    }

    #[test]
    fn settle_caps_at_reserved_amount() {
        let (ledger, admission) = controller(20);
        let held = admission.admit("acct", 10, "discovery").expect("admit");
        assert_eq!(held.settle(15).expect("settle"), 10);
        assert_eq!(ledger.balance("acct").unwrap(), 10);
    }

    #[test]
    fn insufficient_balance_maps_to_scout_error() {
        let (_, admission) = controller(5);
        let err = admission.admit("acct", 10, "search").err().expect("rejected");
        assert!(matches!(
            err,
            ScoutError::InsufficientBalance {
                required: 10,
                available: 5,
                ..
            }
        ));
    }
}
