use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::UserError;

// ============================================================================
// User Value Objects
// ============================================================================

/// Trimmed, lower-cased e-mail address with a local part and a dotted domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, UserError> {
        let normalized = raw.trim().to_lowercase();

        let valid = match normalized.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !normalized.contains(char::is_whitespace)
            }
            None => false,
        };

        if valid {
            Ok(Self(normalized))
        } else {
            Err(UserError::InvalidEmail(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let email = EmailAddress::parse("  Jane.Doe@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "jane.doe@example.com");
    }

    #[test]
    fn test_email_rejected() {
        for raw in ["", "jane", "@example.com", "jane@", "jane@example", "jane@@example.com", "ja ne@example.com", "jane@.com"] {
            assert!(EmailAddress::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }
}
