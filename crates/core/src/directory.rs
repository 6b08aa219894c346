//! Directory lookup: resolve a gift-card identifier or an email to a
//! company and member position.
//!
//! Lookups scan companies and members in storage order and return the first
//! match. Two companies may normalize to the same slug; the first one with
//! enough members to satisfy the index wins.

use tracing::debug;

use crate::identifier::parse_identifier;
use crate::models::{CardMatch, Company};

/// Locate the first member with this email. Returns
/// `(company position, member index)`.
pub fn locate_by_email(companies: &[Company], email: &str) -> Option<(usize, usize)> {
    companies
        .iter()
        .enumerate()
        .find_map(|(pos, company)| company.member_index(email).map(|idx| (pos, idx)))
}

/// Locate the company and member referenced by a card identifier. Returns
/// `(company position, member index)`.
///
/// A slug match whose member list is too short is skipped rather than
/// treated as a partial match.
pub fn locate_by_identifier(companies: &[Company], identifier: &str) -> Option<(usize, usize)> {
    let parsed = match parse_identifier(identifier) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(identifier, error = %e, "unparseable card identifier");
            return None;
        }
    };

    companies
        .iter()
        .position(|c| c.slug() == parsed.slug && parsed.index < c.members.len())
        .map(|pos| (pos, parsed.index))
}

/// Find a company by its id.
pub fn locate_company(companies: &[Company], company_id: &str) -> Option<usize> {
    companies.iter().position(|c| c.id == company_id)
}

/// Resolve an email to an owned [`CardMatch`].
pub fn find_by_email(companies: &[Company], email: &str) -> Option<CardMatch> {
    locate_by_email(companies, email).map(|(pos, member_index)| CardMatch {
        company: companies[pos].clone(),
        member_index,
    })
}

/// Resolve a card identifier to an owned [`CardMatch`].
pub fn find_by_identifier(companies: &[Company], identifier: &str) -> Option<CardMatch> {
    locate_by_identifier(companies, identifier).map(|(pos, member_index)| CardMatch {
        company: companies[pos].clone(),
        member_index,
    })
}
