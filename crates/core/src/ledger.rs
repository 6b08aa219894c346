//! The balance ledger.
//!
//! [`BalanceLedger`] owns every mutation of a company balance together with
//! the ledger entry that records it:
//!
//! 1. Debit (`purchase`): resolve the card, check the balance, debit it and
//!    append the purchase.
//! 2. Credit (`recharge`): resolve the company, credit it and append the
//!    recharge.
//! 3. Compensation (`settlement`, `cancelation` + `refund`): validate the
//!    request against an original purchase and record the outcome. Rejected
//!    requests are written to the ledger with `amount = 0` and `error` set.
//!
//! One writer lock serializes every mutating operation, so the
//! read-validate-write span over both stores is never interleaved. When the
//! second write of a pair fails, the first store is restored from its
//! snapshot before the error is returned.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::config::LedgerConfig;
use crate::directory;
use crate::errors::{CompensationError, LedgerError, StorageError};
use crate::models::{CardMatch, Company, Transaction, TransactionType};
use crate::store::{CompanyStore, StoreHandles, TransactionStore};

/// Message returned for a missing, zero, negative or non-finite amount on
/// the debit and credit paths.
pub const INVALID_AMOUNT_MESSAGE: &str = "Valid amount (> 0) is required";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Policies applied by the ledger.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Absolute tolerance for compensation amount matching.
    pub amount_tolerance: f64,
    /// `userId` for recharges that name no operator.
    pub default_operator: String,
    /// Reject a repeated successful settlement or cancellation.
    pub reject_duplicate_compensation: bool,
    /// Reject company names whose slug collides with another company.
    pub enforce_unique_slugs: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for LedgerSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            amount_tolerance: config.amount_tolerance,
            default_operator: config.default_operator.clone(),
            reject_duplicate_compensation: config.reject_duplicate_compensation,
            enforce_unique_slugs: config.enforce_unique_slugs,
        }
    }
}

// ---------------------------------------------------------------------------
// Compensation outcome
// ---------------------------------------------------------------------------

/// Which compensation protocol a request follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    Settlement,
    Cancellation,
}

impl Compensation {
    /// Type of the ledger entry this compensation writes.
    pub fn kind(self) -> TransactionType {
        match self {
            Self::Settlement => TransactionType::Settlement,
            Self::Cancellation => TransactionType::Cancelation,
        }
    }

    fn duplicate_error(self) -> CompensationError {
        match self {
            Self::Settlement => CompensationError::AlreadySettled,
            Self::Cancellation => CompensationError::AlreadyCancelled,
        }
    }
}

/// Result of a settlement or cancellation that reached the ledger.
///
/// Both variants mean a record was persisted; only a storage failure is
/// returned as `Err`.
#[derive(Debug, Clone)]
pub enum CompensationOutcome {
    /// All validations passed. `refund` is set for cancellations.
    Accepted {
        record: Transaction,
        refund: Option<Transaction>,
    },
    /// Validation failed; `record` is the zero-amount entry carrying the
    /// error message.
    Rejected {
        record: Transaction,
        reason: CompensationError,
    },
}

impl CompensationOutcome {
    /// The settlement or cancelation entry written for this request.
    pub fn record(&self) -> &Transaction {
        match self {
            Self::Accepted { record, .. } | Self::Rejected { record, .. } => record,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// A failed validation together with the attribution written on its record.
struct Rejection {
    user_id: String,
    company_id: String,
    reason: CompensationError,
}

impl Rejection {
    fn anonymous(reason: CompensationError) -> Self {
        Self {
            user_id: String::new(),
            company_id: String::new(),
            reason,
        }
    }

    fn attributed(user_id: &str, company_id: &str, reason: CompensationError) -> Self {
        Self {
            user_id: user_id.to_string(),
            company_id: company_id.to_string(),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Validated balance mutations over a company store and a transaction store.
pub struct BalanceLedger {
    pub(crate) companies: Arc<dyn CompanyStore>,
    pub(crate) transactions: Arc<dyn TransactionStore>,
    pub(crate) settings: LedgerSettings,
    write_lock: Mutex<()>,
}

impl BalanceLedger {
    pub fn new(stores: StoreHandles, settings: LedgerSettings) -> Self {
        info!(
            tolerance = settings.amount_tolerance,
            reject_duplicates = settings.reject_duplicate_compensation,
            "initializing balance ledger"
        );
        Self {
            companies: stores.companies,
            transactions: stores.transactions,
            settings,
            write_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Acquire the writer lock. Every mutation restores its snapshot on
    /// failure, so a poisoned lock is safe to reuse.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| {
            warn!("ledger write lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // -- lookups -------------------------------------------------------------

    /// Resolve a card identifier.
    pub fn find_card(&self, identifier: &str) -> Result<Option<CardMatch>, StorageError> {
        let companies = self.companies.load_all()?;
        Ok(directory::find_by_identifier(&companies, identifier))
    }

    /// Resolve the card of the member with this email.
    pub fn find_by_email(&self, email: &str) -> Result<Option<CardMatch>, StorageError> {
        let companies = self.companies.load_all()?;
        Ok(directory::find_by_email(&companies, email))
    }

    /// Look up a single ledger entry.
    pub fn find_transaction(&self, id: &str) -> Result<Option<Transaction>, StorageError> {
        self.transactions.find_by_id(id)
    }

    // -- debit / credit ------------------------------------------------------

    /// Debit `amount` from the company behind `identifier` and record a
    /// `purchase` with the negated amount.
    ///
    /// Nothing is written unless every check passes.
    pub fn debit(&self, identifier: &str, amount: f64) -> Result<Transaction, LedgerError> {
        ensure_positive(amount)?;

        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let mut ledger = self.transactions.load_all()?;

        let (pos, member_index) = directory::locate_by_identifier(&companies, identifier)
            .ok_or_else(|| LedgerError::IdentifierNotFound(identifier.to_string()))?;

        let available = companies[pos].balance;
        if available < amount {
            debug!(identifier, available, amount, "debit refused");
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let snapshot = companies.clone();
        let company = &mut companies[pos];
        company.balance -= amount;
        let record = Transaction::new(
            TransactionType::Purchase,
            -amount,
            company.members[member_index].id.clone(),
            company.id.clone(),
        )
        .with_card(identifier);

        self.companies.save_all(&companies)?;
        ledger.push(record.clone());
        if let Err(e) = self.transactions.save_all(&ledger) {
            return Err(self.rollback(e, Some(snapshot.as_slice()), None).into());
        }

        info!(
            identifier,
            company_id = %record.company_id,
            amount,
            balance = companies[pos].balance,
            transaction_id = %record.id,
            "purchase recorded"
        );
        Ok(record)
    }

    /// Credit `amount` to a company and record a `recharge`. The acting user
    /// defaults to the configured operator.
    pub fn credit(
        &self,
        company_id: &str,
        amount: f64,
        user_id: Option<&str>,
    ) -> Result<(Company, Transaction), LedgerError> {
        ensure_positive(amount)?;

        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let mut ledger = self.transactions.load_all()?;

        let pos = directory::locate_company(&companies, company_id)
            .ok_or_else(|| LedgerError::CompanyNotFound(company_id.to_string()))?;

        let operator = user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.settings.default_operator.as_str())
            .to_string();

        let snapshot = companies.clone();
        companies[pos].balance += amount;
        let record = Transaction::new(TransactionType::Recharge, amount, operator, company_id);

        self.companies.save_all(&companies)?;
        ledger.push(record.clone());
        if let Err(e) = self.transactions.save_all(&ledger) {
            return Err(self.rollback(e, Some(snapshot.as_slice()), None).into());
        }

        let company = companies.swap_remove(pos);
        info!(
            company_id,
            amount,
            balance = company.balance,
            user_id = %record.user_id,
            "recharge recorded"
        );
        Ok((company, record))
    }

    // -- compensation --------------------------------------------------------

    /// Confirm capture of an earlier purchase. Never changes a balance.
    pub fn settle(
        &self,
        card_id: &str,
        original_id: &str,
        value: Option<f64>,
    ) -> Result<CompensationOutcome, StorageError> {
        let kind = Compensation::Settlement;
        let _guard = self.lock();
        let mut ledger = self.transactions.load_all()?;

        let value = match accepted_value(value) {
            Some(v) => v,
            None => {
                let rejection = Rejection::anonymous(CompensationError::InvalidAmount);
                return self.record_rejection(ledger, kind, card_id, original_id, rejection);
            }
        };

        let original = match self.check_original(&ledger, kind, card_id, original_id, value, ("", ""))
        {
            Ok(original) => original,
            Err(rejection) => {
                return self.record_rejection(ledger, kind, card_id, original_id, rejection)
            }
        };

        let record = Transaction::new(
            TransactionType::Settlement,
            value,
            original.user_id,
            original.company_id,
        )
        .with_card(card_id)
        .with_original(original_id);
        ledger.push(record.clone());
        self.transactions.save_all(&ledger)?;

        info!(card_id, original_id, value, settlement_id = %record.id, "settlement recorded");
        Ok(CompensationOutcome::Accepted {
            record,
            refund: None,
        })
    }

    /// Void an earlier purchase: record the cancelation, return the value to
    /// the company balance, then record the refund.
    pub fn cancel(
        &self,
        card_id: &str,
        original_id: &str,
        value: Option<f64>,
    ) -> Result<CompensationOutcome, StorageError> {
        let kind = Compensation::Cancellation;
        let _guard = self.lock();
        let mut ledger = self.transactions.load_all()?;

        let value = match accepted_value(value) {
            Some(v) => v,
            None => {
                let rejection = Rejection::anonymous(CompensationError::InvalidAmount);
                return self.record_rejection(ledger, kind, card_id, original_id, rejection);
            }
        };

        let companies = self.companies.load_all()?;
        let (pos, member_index) = match directory::locate_by_identifier(&companies, card_id) {
            Some(found) => found,
            None => {
                let rejection = Rejection::anonymous(CompensationError::GiftCardNotFound);
                return self.record_rejection(ledger, kind, card_id, original_id, rejection);
            }
        };

        let card_company = &companies[pos];
        let fallback = (
            card_company.members[member_index].id.as_str(),
            card_company.id.as_str(),
        );
        let original = match self.check_original(&ledger, kind, card_id, original_id, value, fallback)
        {
            Ok(original) => original,
            Err(rejection) => {
                return self.record_rejection(ledger, kind, card_id, original_id, rejection)
            }
        };

        // 1. cancelation record
        let ledger_snapshot = ledger.clone();
        let record = Transaction::new(
            TransactionType::Cancelation,
            value,
            original.user_id.clone(),
            original.company_id.clone(),
        )
        .with_card(card_id)
        .with_original(original_id);
        ledger.push(record.clone());
        self.transactions.save_all(&ledger)?;

        // 2. balance
        let companies_snapshot = companies.clone();
        let mut companies = companies;
        companies[pos].balance += value;
        if let Err(e) = self.companies.save_all(&companies) {
            return Err(self.rollback(e, None, Some(ledger_snapshot.as_slice())));
        }

        // 3. refund record, stamped with the cancelation time
        let refund = Transaction::new(
            TransactionType::Refund,
            value,
            original.user_id,
            companies[pos].id.clone(),
        )
        .with_card(card_id)
        .with_original(original_id)
        .with_date(record.date);
        ledger.push(refund.clone());
        if let Err(e) = self.transactions.save_all(&ledger) {
            return Err(self.rollback(
                e,
                Some(companies_snapshot.as_slice()),
                Some(ledger_snapshot.as_slice()),
            ));
        }

        info!(
            card_id,
            original_id,
            value,
            balance = companies[pos].balance,
            cancelation_id = %record.id,
            refund_id = %refund.id,
            "cancellation and refund recorded"
        );
        Ok(CompensationOutcome::Accepted {
            record,
            refund: Some(refund),
        })
    }

    /// Shared validation of a compensation request against its original
    /// transaction. `fallback` attributes the record when the original
    /// cannot be found.
    fn check_original(
        &self,
        ledger: &[Transaction],
        kind: Compensation,
        card_id: &str,
        original_id: &str,
        value: f64,
        fallback: (&str, &str),
    ) -> Result<Transaction, Rejection> {
        let original = ledger.iter().find(|t| t.id == original_id).ok_or_else(|| {
            Rejection::attributed(fallback.0, fallback.1, CompensationError::TransactionNotFound)
        })?;

        let reject = |reason| Rejection::attributed(&original.user_id, &original.company_id, reason);

        if original.card_id.as_deref() != Some(card_id) {
            return Err(reject(CompensationError::TransactionMismatch));
        }

        if kind == Compensation::Cancellation && original.kind != TransactionType::Purchase {
            return Err(reject(CompensationError::TransactionTypeInvalid));
        }

        let expected = original.amount.abs();
        if (value - expected).abs() > self.settings.amount_tolerance {
            return Err(reject(CompensationError::AmountMismatch {
                expected,
                received: value,
            }));
        }

        if self.settings.reject_duplicate_compensation {
            let compensated = |done: TransactionType| {
                ledger.iter().any(|t| {
                    t.kind == done
                        && t.is_success()
                        && t.original_transaction_id.as_deref() == Some(original_id)
                })
            };
            if compensated(kind.kind()) {
                return Err(reject(kind.duplicate_error()));
            }
            // A cancelled purchase is terminal; it can no longer be settled.
            if kind == Compensation::Settlement && compensated(TransactionType::Cancelation) {
                return Err(reject(CompensationError::AlreadyCancelled));
            }
        }

        Ok(original.clone())
    }

    /// Persist a zero-amount record of a rejected compensation.
    fn record_rejection(
        &self,
        mut ledger: Vec<Transaction>,
        kind: Compensation,
        card_id: &str,
        original_id: &str,
        rejection: Rejection,
    ) -> Result<CompensationOutcome, StorageError> {
        let Rejection {
            user_id,
            company_id,
            reason,
        } = rejection;

        let record = Transaction::new(kind.kind(), 0.0, user_id, company_id)
            .with_card(card_id)
            .with_original(original_id)
            .with_error(reason.to_string());
        ledger.push(record.clone());
        self.transactions.save_all(&ledger)?;

        warn!(
            card_id,
            original_id,
            kind = %kind.kind(),
            reason = %reason,
            "compensation rejected"
        );
        Ok(CompensationOutcome::Rejected { record, reason })
    }

    /// Restore the stores from their snapshots after `cause` interrupted a
    /// paired write. Returns `cause` when every restore succeeds.
    pub(crate) fn rollback(
        &self,
        cause: StorageError,
        companies: Option<&[Company]>,
        ledger: Option<&[Transaction]>,
    ) -> StorageError {
        let mut failures = Vec::new();
        if let Some(snapshot) = companies {
            if let Err(e) = self.companies.save_all(snapshot) {
                failures.push(format!("company store: {e}"));
            }
        }
        if let Some(snapshot) = ledger {
            if let Err(e) = self.transactions.save_all(snapshot) {
                failures.push(format!("transaction store: {e}"));
            }
        }

        if failures.is_empty() {
            warn!(error = %cause, "write failed, stores restored");
            cause
        } else {
            error!(error = %cause, restore = ?failures, "write failed and restore failed");
            StorageError::Diverged(format!("{cause}; restore failed: {}", failures.join("; ")))
        }
    }
}

fn ensure_positive(amount: f64) -> Result<(), LedgerError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(INVALID_AMOUNT_MESSAGE.to_string()))
    }
}

fn accepted_value(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}
