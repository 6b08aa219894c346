//! Store implementations and typed queries over the giftledger tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use super::Database;
use crate::errors::StorageError;
use crate::models::{format_iso, Company, Member, Transaction, TransactionType};
use crate::store::{CompanyStore, TransactionStore};

const TRANSACTION_COLUMNS: &str =
    "id, date, amount, kind, user_id, company_id, card_id, error, original_transaction_id";

/// A raw row from the `transactions` table, decoded after the statement
/// finishes so that malformed values surface as [`StorageError::Corrupt`].
struct TransactionRow {
    id: String,
    date: String,
    amount: f64,
    kind: String,
    user_id: String,
    company_id: String,
    card_id: Option<String>,
    error: Option<String>,
    original_transaction_id: Option<String>,
}

impl TransactionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            amount: row.get(2)?,
            kind: row.get(3)?,
            user_id: row.get(4)?,
            company_id: row.get(5)?,
            card_id: row.get(6)?,
            error: row.get(7)?,
            original_transaction_id: row.get(8)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction, StorageError> {
        let corrupt = |detail: String| StorageError::Corrupt {
            entity: "transaction".into(),
            id: self.id.clone(),
            detail,
        };
        let date = DateTime::parse_from_rfc3339(&self.date)
            .map_err(|e| corrupt(format!("bad date '{}': {}", self.date, e)))?
            .with_timezone(&Utc);
        let kind = TransactionType::from_str_val(&self.kind)
            .ok_or_else(|| corrupt(format!("unknown type '{}'", self.kind)))?;

        Ok(Transaction {
            id: self.id,
            date,
            amount: self.amount,
            kind,
            user_id: self.user_id,
            company_id: self.company_id,
            card_id: self.card_id,
            error: self.error,
            original_transaction_id: self.original_transaction_id,
        })
    }
}

fn query_transactions(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Transaction>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, TransactionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TransactionRow::into_transaction).collect()
}

impl CompanyStore for Database {
    fn load_all(&self) -> Result<Vec<Company>, StorageError> {
        let conn = self.conn();

        let mut members: HashMap<String, Vec<Member>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT company_id, email, redemption_token, redemption_code
                 FROM members ORDER BY company_id, position",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    Member {
                        id: row.get(1)?,
                        redemption_token: row.get(2)?,
                        redemption_code: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (company_id, member) = row?;
                members.entry(company_id).or_default().push(member);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, company_name, balance FROM companies ORDER BY position",
        )?;
        let companies = stmt
            .query_map([], |row| {
                Ok(Company {
                    id: row.get(0)?,
                    company_name: row.get(1)?,
                    balance: row.get(2)?,
                    members: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|mut company| {
                company.members = members.remove(&company.id).unwrap_or_default();
                company
            })
            .collect();

        Ok(companies)
    }

    fn save_all(&self, companies: &[Company]) -> Result<(), StorageError> {
        self.transaction(|conn| {
            conn.execute("DELETE FROM members", [])?;
            conn.execute("DELETE FROM companies", [])?;

            let mut insert_company = conn.prepare(
                "INSERT INTO companies (id, position, company_name, balance)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut insert_member = conn.prepare(
                "INSERT INTO members (company_id, position, email, redemption_token, redemption_code)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for (position, company) in companies.iter().enumerate() {
                insert_company.execute(params![
                    company.id,
                    position as i64,
                    company.company_name,
                    company.balance
                ])?;
                for (index, member) in company.members.iter().enumerate() {
                    insert_member.execute(params![
                        company.id,
                        index as i64,
                        member.id,
                        member.redemption_token,
                        member.redemption_code
                    ])?;
                }
            }
            Ok(())
        })?;
        debug!(count = companies.len(), "saved companies");
        Ok(())
    }
}

impl TransactionStore for Database {
    fn load_all(&self) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn();
        query_transactions(
            &conn,
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY seq"),
            [],
        )
    }

    fn save_all(&self, transactions: &[Transaction]) -> Result<(), StorageError> {
        self.transaction(|conn| {
            conn.execute("DELETE FROM transactions", [])?;
            let mut insert = conn.prepare(&format!(
                "INSERT INTO transactions ({TRANSACTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ))?;
            for tx in transactions {
                insert.execute(params![
                    tx.id,
                    format_iso(&tx.date),
                    tx.amount,
                    tx.kind.as_str(),
                    tx.user_id,
                    tx.company_id,
                    tx.card_id,
                    tx.error,
                    tx.original_transaction_id
                ])?;
            }
            Ok(())
        })?;
        debug!(count = transactions.len(), "saved transactions");
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Transaction>, StorageError> {
        let conn = self.conn();
        let mut found = query_transactions(
            &conn,
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1 LIMIT 1"),
            params![id],
        )?;
        Ok(found.pop())
    }

    fn list_by_company(&self, company_id: &str) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn();
        query_transactions(
            &conn,
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE company_id = ?1 ORDER BY date DESC, seq DESC"
            ),
            params![company_id],
        )
    }
}

impl Database {
    /// Number of ledger entries.
    pub fn count_transactions(&self) -> Result<i64, StorageError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }
}
