//! Domain model types used throughout giftledger.
//!
//! These types bridge the ledger, the stores, and the web API. Field names
//! serialize in camelCase to stay compatible with the JSON files and wire
//! payloads external callers already depend on.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier;

// ---------------------------------------------------------------------------
// Company / Member
// ---------------------------------------------------------------------------

/// A company holding a shared balance redeemable by its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    /// Zero-padded sequential id (`001`, `002`, ...).
    pub id: String,
    pub company_name: String,
    pub balance: f64,
    /// Order is significant: a member's position is the index embedded in
    /// its gift-card identifier.
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Company {
    /// Canonical slug used as the identifier prefix.
    pub fn slug(&self) -> String {
        identifier::slugify(&self.company_name)
    }

    /// Position of the member with this email, if enrolled.
    pub fn member_index(&self, email: &str) -> Option<usize> {
        self.members.iter().position(|m| m.id == email)
    }
}

/// A member enrolled in a company, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Email address.
    pub id: String,
    #[serde(default)]
    pub redemption_token: String,
    #[serde(default)]
    pub redemption_code: String,
}

/// A resolved gift card: a company and the position of one of its members.
#[derive(Debug, Clone, PartialEq)]
pub struct CardMatch {
    pub company: Company,
    pub member_index: usize,
}

impl CardMatch {
    /// The member this card belongs to.
    pub fn member(&self) -> &Member {
        &self.company.members[self.member_index]
    }

    /// The canonical identifier for this card.
    pub fn identifier(&self) -> String {
        identifier::build_identifier(&self.company.company_name, self.member_index)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Kind of a ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Recharge,
    Settlement,
    Cancelation,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Recharge => "recharge",
            Self::Settlement => "settlement",
            Self::Cancelation => "cancelation",
            Self::Refund => "refund",
        }
    }

    /// Parse a stored type string.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(Self::Purchase),
            "recharge" => Some(Self::Recharge),
            "settlement" => Some(Self::Settlement),
            "cancelation" => Some(Self::Cancelation),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable ledger entry.
///
/// Credits (`recharge`, `settlement`, `cancelation`, `refund`) carry a
/// non-negative amount; a `purchase` carries the negated debit. Rejected
/// compensation attempts are stored with `amount = 0` and `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(with = "iso_millis")]
    pub date: DateTime<Utc>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,
}

impl Transaction {
    /// Create a new entry stamped with a fresh id and the current time.
    pub fn new(
        kind: TransactionType,
        amount: f64,
        user_id: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_transaction_id(),
            // Stored dates carry millisecond precision.
            date: Utc::now().trunc_subsecs(3),
            amount,
            kind,
            user_id: user_id.into(),
            company_id: company_id.into(),
            card_id: None,
            error: None,
            original_transaction_id: None,
        }
    }

    pub fn with_card(mut self, card_id: impl Into<String>) -> Self {
        self.card_id = Some(card_id.into());
        self
    }

    pub fn with_original(mut self, original_transaction_id: impl Into<String>) -> Self {
        self.original_transaction_id = Some(original_transaction_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    /// `true` unless this entry records a rejected request.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The timestamp as it appears on the wire (`2025-01-01T00:00:00.000Z`).
    pub fn iso_date(&self) -> String {
        format_iso(&self.date)
    }
}

/// Generate a transaction id: a v4 UUID without hyphens.
pub fn new_transaction_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Format a timestamp with millisecond precision and a `Z` suffix.
pub fn format_iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate figures across every company.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_companies: usize,
    pub total_balance: f64,
    pub total_members: usize,
    pub companies: Vec<Company>,
}

impl LedgerStats {
    pub fn from_companies(companies: Vec<Company>) -> Self {
        Self {
            total_companies: companies.len(),
            total_balance: companies.iter().map(|c| c.balance).sum(),
            total_members: companies.iter().map(|c| c.members.len()).sum(),
            companies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_wire_format() {
        let tx = Transaction::new(TransactionType::Purchase, -300.0, "a@x.com", "001")
            .with_card("acmeco_0");
        let json = serde_json::to_value(&tx).unwrap();

        assert_eq!(json["type"], "purchase");
        assert_eq!(json["amount"], -300.0);
        assert_eq!(json["userId"], "a@x.com");
        assert_eq!(json["companyId"], "001");
        assert_eq!(json["cardId"], "acmeco_0");
        assert!(json.get("error").is_none());
        assert!(json.get("originalTransactionId").is_none());
        assert_eq!(tx.id.len(), 32);
        assert!(!tx.id.contains('-'));
        assert!(json["date"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_transaction_reads_legacy_record() {
        let raw = r#"{
            "id": "abc",
            "date": "2025-04-24T20:22:58.163Z",
            "amount": 150,
            "type": "recharge",
            "userId": "admin",
            "companyId": "002"
        }"#;
        let tx: Transaction = serde_json::from_str(raw).unwrap();
        assert_eq!(tx.kind, TransactionType::Recharge);
        assert_eq!(tx.amount, 150.0);
        assert!(tx.card_id.is_none());
        assert_eq!(tx.iso_date(), "2025-04-24T20:22:58.163Z");
    }

    #[test]
    fn test_company_defaults_missing_members() {
        let raw = r#"{"id": "001", "companyName": "Acme Co", "balance": 10}"#;
        let company: Company = serde_json::from_str(raw).unwrap();
        assert!(company.members.is_empty());
        assert_eq!(company.slug(), "acmeco");
    }

    #[test]
    fn test_stats_totals() {
        let companies = vec![
            Company {
                id: "001".into(),
                company_name: "A".into(),
                balance: 100.0,
                members: vec![Member {
                    id: "a@x.com".into(),
                    redemption_token: String::new(),
                    redemption_code: String::new(),
                }],
            },
            Company {
                id: "002".into(),
                company_name: "B".into(),
                balance: 50.5,
                members: Vec::new(),
            },
        ];
        let stats = LedgerStats::from_companies(companies);
        assert_eq!(stats.total_companies, 2);
        assert_eq!(stats.total_members, 1);
        assert!((stats.total_balance - 150.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_transaction_type_round_trip_strings() {
        for kind in [
            TransactionType::Purchase,
            TransactionType::Recharge,
            TransactionType::Settlement,
            TransactionType::Cancelation,
            TransactionType::Refund,
        ] {
            assert_eq!(TransactionType::from_str_val(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionType::from_str_val("cancellation"), None);
    }
}
