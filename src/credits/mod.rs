//! Credit metering: costs, reservations and the ledger seam.
//!
//! Sub-modules:
//! - `ledger`: the [`CreditLedger`] trait and [`InMemoryLedger`].
//! - `admission`: [`AdmissionController`] quotes and [`Admission`] guards.

pub mod admission;
pub mod ledger;

pub use admission::{Admission, AdmissionController};
pub use ledger::{CreditError, CreditLedger, CreditLedgerEntry, InMemoryLedger, ReservationId};
