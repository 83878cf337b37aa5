//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use emporium_core::{Email, UserId, UserRole};

/// Maximum number of saved addresses per account.
pub const MAX_ADDRESSES: usize = 10;

/// A shop account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub addresses: Vec<Address>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The authenticated caller, as carried in the access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
}

impl CurrentUser {
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// A postal address, embedded in users and orders.
///
/// Missing fields deserialize as empty strings so that anonymized order
/// addresses (country and state only) still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub label: Option<String>,
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 code.
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
}

impl Address {
    /// Check that every required field is present and the country is a
    /// two-letter code.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("address {field} is required"));
            }
        }
        if self.country.trim().len() != 2 || !self.country.trim().chars().all(|c| c.is_ascii_alphabetic()) {
            return Err("address country must be a two-letter code".to_string());
        }
        Ok(())
    }

    /// Trim whitespace and upper-case the country code.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.full_name = self.full_name.trim().to_string();
        self.line1 = self.line1.trim().to_string();
        self.city = self.city.trim().to_string();
        self.state = self.state.trim().to_string();
        self.postal_code = self.postal_code.trim().to_string();
        self.country = self.country.trim().to_ascii_uppercase();
        self
    }
}

/// Validate and normalize a replacement address book.
///
/// At most one address may be the default; if none is marked, the first
/// one becomes the default.
///
/// # Errors
///
/// Returns a message describing the first problem found.
pub fn normalize_address_book(addresses: Vec<Address>) -> Result<Vec<Address>, String> {
    if addresses.len() > MAX_ADDRESSES {
        return Err(format!("at most {MAX_ADDRESSES} addresses can be saved"));
    }
    if addresses.iter().filter(|a| a.is_default).count() > 1 {
        return Err("only one address can be the default".to_string());
    }

    let mut book = addresses
        .into_iter()
        .map(|a| a.validate().map(|()| a.normalized()))
        .collect::<Result<Vec<_>, _>>()?;

    if !book.iter().any(|a| a.is_default)
        && let Some(first) = book.first_mut()
    {
        first.is_default = true;
    }

    Ok(book)
}

/// Profile fields a user may change about themselves.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {
    /// # Errors
    ///
    /// Returns a message if a field is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name
            && name.chars().count() > 100
        {
            return Err("name must be at most 100 characters".to_string());
        }
        if let Some(phone) = &self.phone
            && phone.chars().count() > 32
        {
            return Err("phone must be at most 32 characters".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            full_name: "Ada Lovelace".into(),
            line1: "12 St James's Square".into(),
            city: "London".into(),
            postal_code: "SW1Y 4JH".into(),
            country: "gb".into(),
            ..Address::default()
        }
    }

    #[test]
    fn test_address_validation() {
        assert!(address().validate().is_ok());

        let missing_city = Address {
            city: "  ".into(),
            ..address()
        };
        assert_eq!(missing_city.validate().unwrap_err(), "address city is required");

        let bad_country = Address {
            country: "GBR".into(),
            ..address()
        };
        assert!(bad_country.validate().is_err());
    }

    #[test]
    fn test_address_book_defaults_first() {
        let book = normalize_address_book(vec![address(), address()]).unwrap();
        assert!(book[0].is_default);
        assert!(!book[1].is_default);
        assert_eq!(book[0].country, "GB");
    }

    #[test]
    fn test_address_book_rejects_two_defaults() {
        let default = Address {
            is_default: true,
            ..address()
        };
        assert!(normalize_address_book(vec![default.clone(), default]).is_err());
    }

    #[test]
    fn test_address_book_limit() {
        let too_many = vec![address(); MAX_ADDRESSES + 1];
        assert!(normalize_address_book(too_many).is_err());
    }

    #[test]
    fn test_partial_address_deserializes() {
        let anonymized: Address = serde_json::from_str(r#"{"country":"US","state":"OR"}"#).unwrap();
        assert_eq!(anonymized.country, "US");
        assert!(anonymized.full_name.is_empty());
    }
}
