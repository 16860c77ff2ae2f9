use serde::{Deserialize, Serialize};

/// The acting user, as handed to us by the identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Customer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self.last_name = Some(last_name.to_string());
        self
    }

    /// First name, or "Guest" when the identity store has none.
    pub fn given_name(&self) -> &str {
        match self.first_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "Guest",
        }
    }

    /// Last name, or "User" when the identity store has none.
    pub fn family_name(&self) -> &str {
        match self.last_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "User",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_fallbacks() {
        let anonymous = Customer::new("user-1");
        assert_eq!(anonymous.given_name(), "Guest");
        assert_eq!(anonymous.family_name(), "User");

        let named = Customer::new("user-2").with_name("Ada", "");
        assert_eq!(named.given_name(), "Ada");
        assert_eq!(named.family_name(), "User");
    }
}
