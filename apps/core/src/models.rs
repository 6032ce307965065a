use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::ValidationError;

/// Stable identity of a conversation. Also used as the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phone number, non-empty and decimal digits only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phone(String);

impl Phone {
    pub fn parse(input: &str) -> Result<Phone, ValidationError> {
        let digits = input.trim();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::NonDigitPhone);
        }
        Ok(Phone(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: ConversationId,
    pub name: String,
    pub phone: Phone,
}

/// A confirmed appointment. `starts_at` is always a slot instant in business time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub user: ConversationId,
    pub starts_at: DateTime<Utc>,
}

/// Trimmed display name; blank input is rejected.
pub fn parse_name(input: &str) -> Result<String, ValidationError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_accepts_digits() {
        assert_eq!(Phone::parse("5551234").unwrap().as_str(), "5551234");
    }

    #[test]
    fn test_phone_trims_whitespace() {
        assert_eq!(Phone::parse(" 89001234567\n").unwrap().as_str(), "89001234567");
    }

    #[test]
    fn test_phone_rejects_plus_and_dashes() {
        assert_eq!(Phone::parse("+79001234567"), Err(ValidationError::NonDigitPhone));
        assert_eq!(Phone::parse("555-12-34"), Err(ValidationError::NonDigitPhone));
    }

    #[test]
    fn test_phone_rejects_empty() {
        assert_eq!(Phone::parse("   "), Err(ValidationError::NonDigitPhone));
    }

    #[test]
    fn test_phone_rejects_non_ascii_digits() {
        assert_eq!(Phone::parse("٥٥٥"), Err(ValidationError::NonDigitPhone));
    }

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(parse_name("  Anna ").unwrap(), "Anna");
        assert_eq!(parse_name(""), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_user_profile_serializes_phone_as_string() {
        let profile = UserProfile {
            id: ConversationId(7),
            name: "Anna".into(),
            phone: Phone::parse("5551234").unwrap(),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["phone"], "5551234");
        assert_eq!(json["id"], 7);
    }
}
