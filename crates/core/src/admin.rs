//! Company and member administration.
//!
//! These operations run under the ledger's writer lock so they never
//! interleave with a balance mutation. They edit the company store only;
//! setting a balance here writes no ledger entry.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::directory;
use crate::errors::{AdminError, StorageError};
use crate::identifier::slugify;
use crate::ledger::BalanceLedger;
use crate::models::{Company, LedgerStats, Member, Transaction};

/// Request to create a company.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    pub company_name: Option<String>,
    pub balance: Option<f64>,
    #[serde(default)]
    pub members: Vec<NewMember>,
}

/// Partial update of a company. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyUpdate {
    pub company_name: Option<String>,
    pub balance: Option<f64>,
}

/// Request to enroll a member. Token and code are generated when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    #[serde(alias = "id")]
    pub user_id: Option<String>,
    pub redemption_token: Option<String>,
    pub redemption_code: Option<String>,
}

/// Partial update of the member identified by `user_id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdate {
    pub user_id: Option<String>,
    pub new_user_id: Option<String>,
    pub redemption_token: Option<String>,
    pub redemption_code: Option<String>,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

/// Loose email shape check: `local@domain.tld` without whitespace.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Default redemption code: the first four letters of the company name in
/// upper case, the company id, `MBR` and the 1-based member number.
pub fn default_redemption_code(company: &Company, member_number: usize) -> String {
    let prefix: String = company.company_name.to_uppercase().chars().take(4).collect();
    format!("{prefix}{}MBR{member_number:02}", company.id)
}

fn default_redemption_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Next sequential company id: the largest numeric id plus one, padded to
/// three digits. Non-numeric ids are ignored.
fn next_company_id(companies: &[Company]) -> String {
    let max = companies
        .iter()
        .filter_map(|c| c.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{:03}", max + 1)
}

fn invalid(message: &str) -> AdminError {
    AdminError::InvalidInput(message.to_string())
}

impl BalanceLedger {
    // -- companies -----------------------------------------------------------

    pub fn list_companies(&self) -> Result<Vec<Company>, StorageError> {
        self.companies.load_all()
    }

    pub fn get_company(&self, id: &str) -> Result<Company, AdminError> {
        self.companies
            .load_all()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AdminError::CompanyNotFound(id.to_string()))
    }

    pub fn create_company(&self, request: NewCompany) -> Result<Company, AdminError> {
        let name = request
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("Company name is required"))?
            .to_string();
        let balance = request
            .balance
            .filter(|b| b.is_finite() && *b >= 0.0)
            .ok_or_else(|| invalid("Valid balance (>= 0) is required"))?;

        for member in &request.members {
            let email = member.user_id.as_deref().unwrap_or_default();
            if !is_valid_email(email) {
                return Err(AdminError::InvalidInput(format!(
                    "Invalid email for member: {email}"
                )));
            }
        }

        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        self.check_name_available(&companies, None, &name)?;

        let mut company = Company {
            id: next_company_id(&companies),
            company_name: name,
            balance,
            members: Vec::with_capacity(request.members.len()),
        };
        for member in request.members {
            let email = member.user_id.unwrap_or_default();
            if company.member_index(&email).is_some() {
                return Err(AdminError::MemberExists(email));
            }
            let code = member
                .redemption_code
                .unwrap_or_else(|| default_redemption_code(&company, company.members.len() + 1));
            company.members.push(Member {
                id: email,
                redemption_token: member.redemption_token.unwrap_or_else(default_redemption_token),
                redemption_code: code,
            });
        }

        companies.push(company.clone());
        self.companies.save_all(&companies)?;
        info!(
            company_id = %company.id,
            name = %company.company_name,
            balance,
            members = company.members.len(),
            "company created"
        );
        Ok(company)
    }

    pub fn update_company(&self, id: &str, update: CompanyUpdate) -> Result<Company, AdminError> {
        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let pos = directory::locate_company(&companies, id)
            .ok_or_else(|| AdminError::CompanyNotFound(id.to_string()))?;

        if let Some(name) = update.company_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("Invalid company name"));
            }
            if name != companies[pos].company_name {
                self.check_name_available(&companies, Some(id), name)?;
                let old_slug = companies[pos].slug();
                if slugify(name) != old_slug {
                    warn!(
                        company_id = id,
                        old_slug = %old_slug,
                        new_slug = %slugify(name),
                        "company renamed; card identifiers issued under the old slug stop resolving"
                    );
                }
                companies[pos].company_name = name.to_string();
            }
        }

        if let Some(balance) = update.balance {
            if !balance.is_finite() || balance < 0.0 {
                return Err(invalid("Invalid balance (must be >= 0)"));
            }
            companies[pos].balance = balance;
        }

        self.companies.save_all(&companies)?;
        info!(company_id = id, "company updated");
        Ok(companies.swap_remove(pos))
    }

    pub fn delete_company(&self, id: &str) -> Result<Company, AdminError> {
        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let pos = directory::locate_company(&companies, id)
            .ok_or_else(|| AdminError::CompanyNotFound(id.to_string()))?;

        let removed = companies.remove(pos);
        self.companies.save_all(&companies)?;
        warn!(
            company_id = id,
            name = %removed.company_name,
            balance = removed.balance,
            "company deleted"
        );
        Ok(removed)
    }

    /// Exact-name uniqueness, and slug uniqueness when enabled. `exclude`
    /// skips the company being renamed.
    fn check_name_available(
        &self,
        companies: &[Company],
        exclude: Option<&str>,
        name: &str,
    ) -> Result<(), AdminError> {
        let others = move || companies.iter().filter(move |c| Some(c.id.as_str()) != exclude);

        if others().any(|c| c.company_name == name) {
            return Err(AdminError::CompanyNameTaken(name.to_string()));
        }

        let slug = slugify(name);
        if slug.is_empty() {
            return Err(invalid("Invalid company name"));
        }
        if self.settings.enforce_unique_slugs {
            if let Some(existing) = others().find(|c| c.slug() == slug) {
                return Err(AdminError::SlugConflict {
                    slug,
                    existing: existing.company_name.clone(),
                });
            }
        }
        Ok(())
    }

    // -- members -------------------------------------------------------------

    pub fn list_members(&self, company_id: &str) -> Result<Vec<Member>, AdminError> {
        Ok(self.get_company(company_id)?.members)
    }

    pub fn add_member(&self, company_id: &str, request: NewMember) -> Result<Member, AdminError> {
        let email = request
            .user_id
            .filter(|e| is_valid_email(e))
            .ok_or_else(|| invalid("Valid email is required"))?;

        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let pos = directory::locate_company(&companies, company_id)
            .ok_or_else(|| AdminError::CompanyNotFound(company_id.to_string()))?;
        let company = &mut companies[pos];

        if company.member_index(&email).is_some() {
            return Err(AdminError::MemberExists(email));
        }

        let member = Member {
            id: email,
            redemption_token: request
                .redemption_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_redemption_token),
            redemption_code: request
                .redemption_code
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| default_redemption_code(company, company.members.len() + 1)),
        };
        let index = company.members.len();
        company.members.push(member.clone());

        self.companies.save_all(&companies)?;
        info!(
            company_id,
            email = %member.id,
            card = %crate::identifier::build_identifier(&companies[pos].company_name, index),
            "member added"
        );
        Ok(member)
    }

    pub fn update_member(&self, company_id: &str, update: MemberUpdate) -> Result<Member, AdminError> {
        let email = update
            .user_id
            .filter(|e| !e.is_empty())
            .ok_or_else(|| invalid("User ID (email) is required"))?;

        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let pos = directory::locate_company(&companies, company_id)
            .ok_or_else(|| AdminError::CompanyNotFound(company_id.to_string()))?;
        let company = &mut companies[pos];
        let index = company
            .member_index(&email)
            .ok_or_else(|| AdminError::MemberNotFound(email.clone()))?;

        if let Some(new_email) = update.new_user_id {
            if !is_valid_email(&new_email) {
                return Err(invalid("Invalid email format"));
            }
            if new_email != email && company.member_index(&new_email).is_some() {
                return Err(invalid("Email already exists in this company"));
            }
            company.members[index].id = new_email;
        }
        if let Some(token) = update.redemption_token {
            company.members[index].redemption_token = token;
        }
        if let Some(code) = update.redemption_code {
            company.members[index].redemption_code = code;
        }

        let member = company.members[index].clone();
        self.companies.save_all(&companies)?;
        info!(company_id, email = %email, "member updated");
        Ok(member)
    }

    /// Remove a member. Later members move up one position, so their card
    /// identifiers change.
    pub fn delete_member(&self, company_id: &str, email: &str) -> Result<Member, AdminError> {
        if email.is_empty() {
            return Err(invalid("User ID (email) is required as query parameter"));
        }

        let _guard = self.lock();
        let mut companies = self.companies.load_all()?;
        let pos = directory::locate_company(&companies, company_id)
            .ok_or_else(|| AdminError::CompanyNotFound(company_id.to_string()))?;
        let company = &mut companies[pos];
        let index = company
            .member_index(email)
            .ok_or_else(|| AdminError::MemberNotFound(email.to_string()))?;

        let removed = company.members.remove(index);
        let shifted = company.members.len() - index;
        self.companies.save_all(&companies)?;
        warn!(
            company_id,
            email,
            index,
            shifted,
            "member deleted; identifiers of later members shift down by one"
        );
        Ok(removed)
    }

    // -- reporting -----------------------------------------------------------

    /// Ledger entries of a company, newest first.
    pub fn company_transactions(&self, company_id: &str) -> Result<Vec<Transaction>, StorageError> {
        self.transactions.list_by_company(company_id)
    }

    pub fn stats(&self) -> Result<LedgerStats, StorageError> {
        Ok(LedgerStats::from_companies(self.companies.load_all()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::ledger::LedgerSettings;
    use crate::store::StoreHandles;

    fn ledger() -> BalanceLedger {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        BalanceLedger::new(StoreHandles::shared(db), LedgerSettings::default())
    }

    fn new_company(name: &str, balance: f64) -> NewCompany {
        NewCompany {
            company_name: Some(name.into()),
            balance: Some(balance),
            members: Vec::new(),
        }
    }

    fn new_member(email: &str) -> NewMember {
        NewMember {
            user_id: Some(email.into()),
            ..NewMember::default()
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let ledger = ledger();
        let first = ledger.create_company(new_company("  Acme Co ", 100.0)).unwrap();
        let second = ledger.create_company(new_company("Globex", 0.0)).unwrap();

        assert_eq!(first.id, "001");
        assert_eq!(first.company_name, "Acme Co");
        assert_eq!(second.id, "002");

        ledger.delete_company("001").unwrap();
        let third = ledger.create_company(new_company("Initech", 5.0)).unwrap();
        assert_eq!(third.id, "003");
    }

    #[test]
    fn test_create_validation() {
        let ledger = ledger();
        let err = ledger.create_company(new_company("   ", 1.0)).unwrap_err();
        assert_eq!(err.to_string(), "Company name is required");

        let err = ledger.create_company(new_company("Acme", -1.0)).unwrap_err();
        assert_eq!(err.to_string(), "Valid balance (>= 0) is required");

        let mut request = new_company("Acme", 1.0);
        request.members.push(new_member("not-an-email"));
        let err = ledger.create_company(request).unwrap_err();
        assert_eq!(err.to_string(), "Invalid email for member: not-an-email");

        assert!(ledger.list_companies().unwrap().is_empty());
    }

    #[test]
    fn test_create_generates_member_credentials() {
        let ledger = ledger();
        let mut request = new_company("Acme Co", 1.0);
        request.members = vec![new_member("a@x.com"), new_member("b@x.com")];
        let company = ledger.create_company(request).unwrap();

        assert_eq!(company.members[0].redemption_code, "ACME001MBR01");
        assert_eq!(company.members[1].redemption_code, "ACME001MBR02");
        assert_eq!(company.members[0].redemption_token.len(), 32);
    }

    #[test]
    fn test_duplicate_names_and_slugs_rejected() {
        let ledger = ledger();
        ledger.create_company(new_company("Acme Co", 1.0)).unwrap();

        let err = ledger.create_company(new_company("Acme Co", 1.0)).unwrap_err();
        assert_eq!(err.to_string(), "Company name already exists");

        let err = ledger.create_company(new_company("acme-co", 1.0)).unwrap_err();
        assert!(matches!(err, AdminError::SlugConflict { ref slug, .. } if slug == "acmeco"));
    }

    #[test]
    fn test_slug_collisions_allowed_when_disabled() {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        let settings = LedgerSettings {
            enforce_unique_slugs: false,
            ..LedgerSettings::default()
        };
        let ledger = BalanceLedger::new(StoreHandles::shared(db), settings);
        ledger.create_company(new_company("Acme Co", 1.0)).unwrap();
        assert!(ledger.create_company(new_company("acme-co", 1.0)).is_ok());
    }

    #[test]
    fn test_update_company() {
        let ledger = ledger();
        ledger.create_company(new_company("Acme Co", 1.0)).unwrap();
        ledger.create_company(new_company("Globex", 1.0)).unwrap();

        let updated = ledger
            .update_company(
                "001",
                CompanyUpdate {
                    company_name: Some("Acme Corp".into()),
                    balance: Some(42.0),
                },
            )
            .unwrap();
        assert_eq!(updated.company_name, "Acme Corp");
        assert_eq!(updated.balance, 42.0);

        // Keeping the same name is not a conflict with itself.
        assert!(ledger
            .update_company(
                "001",
                CompanyUpdate {
                    company_name: Some("Acme Corp".into()),
                    balance: None,
                },
            )
            .is_ok());

        let err = ledger
            .update_company(
                "001",
                CompanyUpdate {
                    company_name: Some("Globex".into()),
                    balance: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AdminError::CompanyNameTaken(_)));

        let err = ledger
            .update_company(
                "001",
                CompanyUpdate {
                    company_name: None,
                    balance: Some(-3.0),
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid balance (must be >= 0)");

        assert!(matches!(
            ledger.update_company("404", CompanyUpdate::default()),
            Err(AdminError::CompanyNotFound(_))
        ));
    }

    #[test]
    fn test_member_lifecycle() {
        let ledger = ledger();
        ledger.create_company(new_company("Acme Co", 10.0)).unwrap();

        let a = ledger.add_member("001", new_member("a@x.com")).unwrap();
        assert_eq!(a.redemption_code, "ACME001MBR01");
        ledger.add_member("001", new_member("b@x.com")).unwrap();

        let err = ledger.add_member("001", new_member("a@x.com")).unwrap_err();
        assert_eq!(err.to_string(), "User already exists in this company");
        let err = ledger.add_member("001", new_member("bad")).unwrap_err();
        assert_eq!(err.to_string(), "Valid email is required");
        assert!(matches!(
            ledger.add_member("404", new_member("c@x.com")),
            Err(AdminError::CompanyNotFound(_))
        ));

        let updated = ledger
            .update_member(
                "001",
                MemberUpdate {
                    user_id: Some("a@x.com".into()),
                    new_user_id: Some("alice@x.com".into()),
                    redemption_token: Some("tok".into()),
                    redemption_code: None,
                },
            )
            .unwrap();
        assert_eq!(updated.id, "alice@x.com");
        assert_eq!(updated.redemption_token, "tok");
        assert_eq!(updated.redemption_code, "ACME001MBR01");

        let err = ledger
            .update_member(
                "001",
                MemberUpdate {
                    user_id: Some("alice@x.com".into()),
                    new_user_id: Some("b@x.com".into()),
                    ..MemberUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already exists in this company");

        // Deleting the first member moves b@x.com to index 0.
        ledger.delete_member("001", "alice@x.com").unwrap();
        let card = ledger.find_card("acmeco_0").unwrap().unwrap();
        assert_eq!(card.member().id, "b@x.com");
        assert!(matches!(
            ledger.delete_member("001", "alice@x.com"),
            Err(AdminError::MemberNotFound(_))
        ));
        assert_eq!(ledger.list_members("001").unwrap().len(), 1);
    }

    #[test]
    fn test_stats_and_company_transactions() {
        let ledger = ledger();
        let mut request = new_company("Acme Co", 100.0);
        request.members = vec![new_member("a@x.com")];
        ledger.create_company(request).unwrap();
        ledger.create_company(new_company("Globex", 50.0)).unwrap();

        let (_, recharge) = ledger.credit("001", 25.0, None).unwrap();
        let purchase = ledger.debit("acmeco_0", 5.0).unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.total_companies, 2);
        assert_eq!(stats.total_members, 1);
        assert_eq!(stats.total_balance, 170.0);

        let history = ledger.company_transactions("001").unwrap();
        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&recharge.id.as_str()));
        assert!(ids.contains(&purchase.id.as_str()));
        assert!(history[0].date >= history[1].date);
        assert!(ledger.company_transactions("002").unwrap().is_empty());
    }
}
