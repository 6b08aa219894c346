//! Gift-card identifier codec.
//!
//! A card identifier has the wire format `<slug>_<index>`, where `slug` is
//! the company name with spaces, hyphens and underscores removed and
//! lower-cased, and `index` is the member's position in the company. The
//! format is consumed by external card-lookup callers and must not change.
//!
//! Slugs are not reversible: `"Acme Co"` and `"acme-co"` both map to
//! `acmeco`.

use std::fmt;

use crate::errors::IdentifierError;

/// Characters stripped from a company name when building its slug.
const STRIPPED: [char; 3] = [' ', '-', '_'];

/// Normalize a company name into its canonical slug.
pub fn slugify(company_name: &str) -> String {
    company_name
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .collect::<String>()
        .to_lowercase()
}

/// Build the identifier for the member at `member_index` of `company_name`.
pub fn build_identifier(company_name: &str, member_index: usize) -> String {
    format!("{}_{}", slugify(company_name), member_index)
}

/// A successfully parsed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub slug: String,
    pub index: usize,
}

impl fmt::Display for ParsedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.slug, self.index)
    }
}

/// Split an identifier into its slug and member index.
///
/// Exactly one `_` must be present and the suffix must be a non-negative
/// base-10 integer. Slugs never contain `_` because [`slugify`] strips it.
pub fn parse_identifier(identifier: &str) -> Result<ParsedIdentifier, IdentifierError> {
    let mut parts = identifier.split('_');
    let (slug, index) = match (parts.next(), parts.next(), parts.next()) {
        (Some(slug), Some(index), None) => (slug, index),
        _ => return Err(IdentifierError::Malformed(identifier.to_string())),
    };

    let parsed = index
        .parse::<usize>()
        .map_err(|_| IdentifierError::InvalidIndex {
            identifier: identifier.to_string(),
            index: index.to_string(),
        })?;

    Ok(ParsedIdentifier {
        slug: slug.to_string(),
        index: parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_strips_separators_and_lowercases() {
        assert_eq!(slugify("Acme Co"), "acmeco");
        assert_eq!(slugify("Big-Box_Retail Inc"), "bigboxretailinc");
        assert_eq!(slugify("arroyave"), "arroyave");
        // Only literal spaces are stripped, not other whitespace.
        assert_eq!(slugify("Tab\tCo"), "tab\tco");
    }

    #[test]
    fn test_build_identifier() {
        assert_eq!(build_identifier("Acme Co", 0), "acmeco_0");
        assert_eq!(build_identifier("company-2", 11), "company2_11");
    }

    #[test]
    fn test_parse_round_trips_built_identifiers() {
        for name in ["Acme Co", "a_b_c", "X-Y", "  spaced  out ", "Ñandú Ltda"] {
            for index in [0usize, 1, 7, 1234] {
                let parsed = parse_identifier(&build_identifier(name, index)).unwrap();
                assert_eq!(parsed.slug, slugify(name));
                assert_eq!(parsed.index, index);
            }
        }
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        assert!(matches!(
            parse_identifier("acmeco"),
            Err(IdentifierError::Malformed(_))
        ));
        assert!(matches!(
            parse_identifier("acme_co_1"),
            Err(IdentifierError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_integer_index() {
        for bad in ["acmeco_x", "acmeco_", "acmeco_-1", "acmeco_1.5"] {
            assert!(
                matches!(parse_identifier(bad), Err(IdentifierError::InvalidIndex { .. })),
                "expected invalid index for {bad}"
            );
        }
    }

    #[test]
    fn test_parsed_identifier_display() {
        let parsed = parse_identifier("acmeco_3").unwrap();
        assert_eq!(parsed.to_string(), "acmeco_3");
    }
}
