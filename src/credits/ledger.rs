//! Credit ledger: the account/balance collaborator.
//!
//! docscout never reads or writes balance storage directly. It asks a
//! [`CreditLedger`] to reserve an amount, then commits or releases the
//! reservation. [`InMemoryLedger`] is the reference implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle for a held amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(u64);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rsv-{}", self.0)
    }
}

/// One committed balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub account: String,
    /// Negative for debits.
    pub delta: i64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Errors from a credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditError {
    #[error("insufficient balance for {account}: {required} required, {available} available")]
    InsufficientBalance {
        account: String,
        required: u64,
        available: u64,
    },

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    #[error("cannot settle {requested} against a reservation of {held}")]
    Overdraw { requested: u64, held: u64 },

    #[error("ledger lock poisoned")]
    Lock,
}

/// Reserve/commit/release over account balances.
///
/// `reserve` must be an atomic conditional hold: two concurrent reserves
/// on one account can never jointly exceed its balance.
pub trait CreditLedger: Send + Sync {
    /// Hold `amount` against `account`.
    ///
    /// # Errors
    ///
    /// [`CreditError::InsufficientBalance`] when `balance - held < amount`.
    fn reserve(&self, account: &str, amount: u64, reason: &str)
    -> Result<ReservationId, CreditError>;

    /// Debit the full held amount.
    fn commit(&self, id: ReservationId) -> Result<(), CreditError>;

    /// Debit `amount` (at most the held amount) and release the rest.
    fn settle(&self, id: ReservationId, amount: u64) -> Result<(), CreditError>;

    /// Drop the hold without debiting.
    fn release(&self, id: ReservationId) -> Result<(), CreditError>;

    /// Balance minus outstanding holds.
    fn available(&self, account: &str) -> Result<u64, CreditError>;
}

#[derive(Debug, Default)]
struct Account {
    balance: u64,
    held: u64,
}

#[derive(Debug)]
struct Hold {
    account: String,
    amount: u64,
    reason: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    holds: HashMap<ReservationId, Hold>,
    entries: Vec<CreditLedgerEntry>,
    next_id: u64,
}

/// Process-local ledger. One mutex guards every account, so each
/// reserve is a single check-and-hold critical section.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    /// Balance given to accounts on first use; `None` rejects unknown accounts.
    auto_open: Option<u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that opens unknown accounts with `balance`.
    pub fn with_starting_balance(balance: u64) -> Self {
        Self {
            state: Mutex::default(),
            auto_open: Some(balance),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, CreditError> {
        self.state.lock().map_err(|_| CreditError::Lock)
    }

    /// Create or top up an account.
    pub fn deposit(&self, account: &str, amount: u64) -> Result<(), CreditError> {
        let mut state = self.lock()?;
        let balance = &mut state.accounts.entry(account.to_string()).or_default().balance;
        *balance = balance.saturating_add(amount);
        state.entries.push(CreditLedgerEntry {
            account: account.to_string(),
            delta: i64::try_from(amount).unwrap_or(i64::MAX),
            reason: "deposit".into(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Committed balance (holds not subtracted).
    pub fn balance(&self, account: &str) -> Result<u64, CreditError> {
        let state = self.lock()?;
        state
            .accounts
            .get(account)
            .map(|a| a.balance)
            .ok_or_else(|| CreditError::UnknownAccount(account.to_string()))
    }

    /// Every committed movement, oldest first.
    pub fn entries(&self) -> Result<Vec<CreditLedgerEntry>, CreditError> {
        Ok(self.lock()?.entries.clone())
    }

    pub fn outstanding_reservations(&self) -> Result<usize, CreditError> {
        Ok(self.lock()?.holds.len())
    }

    fn take_hold(state: &mut LedgerState, id: ReservationId) -> Result<Hold, CreditError> {
        let hold = state
            .holds
            .remove(&id)
            .ok_or(CreditError::UnknownReservation(id))?;
        if let Some(account) = state.accounts.get_mut(&hold.account) {
            account.held = account.held.saturating_sub(hold.amount);
        }
        Ok(hold)
    }
}

impl CreditLedger for InMemoryLedger {
    fn reserve(
        &self,
        account: &str,
        amount: u64,
        reason: &str,
    ) -> Result<ReservationId, CreditError> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(account) {
            match self.auto_open {
                Some(balance) => {
                    state.accounts.insert(
                        account.to_string(),
                        Account {
                            balance,
                            held: 0,
                        },
                    );
                }
                None => return Err(CreditError::UnknownAccount(account.to_string())),
            }
        }

        let entry = state
            .accounts
            .get_mut(account)
            .ok_or_else(|| CreditError::UnknownAccount(account.to_string()))?;
        let available = entry.balance.saturating_sub(entry.held);
        if available < amount {
            return Err(CreditError::InsufficientBalance {
                account: account.to_string(),
                required: amount,
                available,
            });
        }
        entry.held += amount;

        state.next_id += 1;
        let id = ReservationId(state.next_id);
        state.holds.insert(
            id,
            Hold {
                account: account.to_string(),
                amount,
                reason: reason.to_string(),
            },
        );
        Ok(id)
    }

    fn commit(&self, id: ReservationId) -> Result<(), CreditError> {
        let amount = {
            let state = self.lock()?;
            state
                .holds
                .get(&id)
                .map(|h| h.amount)
                .ok_or(CreditError::UnknownReservation(id))?
        };
        self.settle(id, amount)
    }

    fn settle(&self, id: ReservationId, amount: u64) -> Result<(), CreditError> {
        let mut state = self.lock()?;
        let held = state
            .holds
            .get(&id)
            .map(|h| h.amount)
            .ok_or(CreditError::UnknownReservation(id))?;
        if amount > held {
            return Err(CreditError::Overdraw {
                requested: amount,
                held,
            });
        }
        let hold = Self::take_hold(&mut state, id)?;
        if amount == 0 {
            return Ok(());
        }
        if let Some(account) = state.accounts.get_mut(&hold.account) {
            account.balance = account.balance.saturating_sub(amount);
        }
        state.entries.push(CreditLedgerEntry {
            account: hold.account,
            delta: -i64::try_from(amount).unwrap_or(i64::MAX),
            reason: hold.reason,
            at: Utc::now(),
        });
        Ok(())
    }

    fn release(&self, id: ReservationId) -> Result<(), CreditError> {
        let mut state = self.lock()?;
        Self::take_hold(&mut state, id).map(|_| ())
    }

    fn available(&self, account: &str) -> Result<u64, CreditError> {
        let state = self.lock()?;
        match state.accounts.get(account) {
            Some(a) => Ok(a.balance.saturating_sub(a.held)),
            None => self
                .auto_open
                .ok_or_else(|| CreditError::UnknownAccount(account.to_string())),
        }
    }
}
