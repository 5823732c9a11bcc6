use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RegistryError;

pub const EXTERNAL_ID_LEN: usize = 32;

/// An external account id is exactly 32 ASCII alphanumeric characters
pub fn is_valid_id(candidate: &str) -> bool {
    candidate.len() == EXTERNAL_ID_LEN && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Lowercased, trimmed form used to match batch rows against the registry
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A validated external game account id, stored with its original casing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalAccountId(String);

impl ExternalAccountId {
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        if is_valid_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(RegistryError::InvalidId)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn normalized(&self) -> String {
        normalize_id(&self.0)
    }
}

impl fmt::Display for ExternalAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub local_user_id: String,
    pub external_account_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("0123456789abcdefABCDEF0123456789"));
        assert!(is_valid_id(&"a".repeat(32)));
        assert!(is_valid_id(&"Z9".repeat(16)));
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id(&"a".repeat(31)));
        assert!(!is_valid_id(&"a".repeat(33)));
        assert!(!is_valid_id(&format!("{}-", "a".repeat(31))));
        assert!(!is_valid_id(&format!("{} ", "a".repeat(31))));
        // 32 chars but multi-byte alphanumerics are not accepted
        assert!(!is_valid_id(&format!("{}é", "a".repeat(31))));
    }

    #[test]
    fn test_every_alphanumeric_char_accepted() {
        let alphabet: Vec<char> = ('a'..='z').chain('A'..='Z').chain('0'..='9').collect();
        for c in alphabet {
            let id: String = std::iter::repeat(c).take(EXTERNAL_ID_LEN).collect();
            assert!(is_valid_id(&id), "{} should be valid", id);
        }
        for c in ['_', '.', '/', '+', '\n'] {
            let id = format!("{}{}", "a".repeat(EXTERNAL_ID_LEN - 1), c);
            assert!(!is_valid_id(&id));
        }
    }

    #[test]
    fn test_parse_keeps_case_normalized_lowers() {
        let id = ExternalAccountId::parse("ABCDEFabcdef0123456789ABCDEFabcd").unwrap();
        assert_eq!(id.as_str(), "ABCDEFabcdef0123456789ABCDEFabcd");
        assert_eq!(id.normalized(), "abcdefabcdef0123456789abcdefabcd");
        assert!(ExternalAccountId::parse("short").is_err());
    }

    #[test]
    fn test_normalize_trims() {
        assert_eq!(normalize_id("  AbC \t"), "abc");
    }
}
