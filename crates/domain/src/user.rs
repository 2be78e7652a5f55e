use common::UserId;
use serde::{Deserialize, Serialize};

/// A registered user, owned by the user-management collaborator.
///
/// Checkout only needs it to check existence and to pass customer
/// details to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl User {
    pub fn new(
        id: UserId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Returns "first last", trimmed when either part is empty.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let user = User::new(UserId::new(), "Ada", "Lovelace", "ada@example.com");
        assert_eq!(user.full_name(), "Ada Lovelace");

        let user = User::new(UserId::new(), "Ada", "", "ada@example.com");
        assert_eq!(user.full_name(), "Ada");
    }
}
