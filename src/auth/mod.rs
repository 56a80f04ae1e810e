// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Account Capabilities
//!
//! Behaviour every login account offers, kept apart from how the account
//! row is stored:
//!
//! | Capability | Provided by |
//! |------------|-------------|
//! | login identifier (`email`) | [`Authenticatable::username`] |
//! | display names | [`Authenticatable::full_name`], [`Authenticatable::short_name`] |
//! | password handling | [`Authenticatable::set_password`] and friends, Argon2id PHC strings |
//! | privileges | [`Role`], derived from `is_staff` / `is_superuser` |
//!
//! Sending mail to an account is not provided.

pub mod password;
pub mod roles;

pub use password::{hash_password, verify_password, PasswordError, UNUSABLE_PASSWORD};
pub use roles::Role;

use crate::storage::{DbError, DbResult, Stored, User, UserRepository};

/// An account that can log in.
pub trait Authenticatable {
    /// Name of the field used as login identifier.
    fn username_field() -> &'static str
    where
        Self: Sized;

    /// Fields that must be supplied besides the identifier and password.
    fn required_fields() -> &'static [&'static str]
    where
        Self: Sized;

    fn username(&self) -> &str;
    fn is_active(&self) -> bool;
    fn full_name(&self) -> String;
    fn short_name(&self) -> &str;

    /// The stored password value (PHC string or unusable marker).
    fn password_hash(&self) -> &str;
    fn replace_password_hash(&mut self, hash: String);

    fn set_password(&mut self, raw: &str) -> Result<(), PasswordError> {
        let hash = hash_password(raw)?;
        self.replace_password_hash(hash);
        Ok(())
    }

    fn check_password(&self, raw: &str) -> bool {
        verify_password(raw, self.password_hash())
    }

    fn set_unusable_password(&mut self) {
        self.replace_password_hash(UNUSABLE_PASSWORD.to_string());
    }

    fn has_usable_password(&self) -> bool {
        password::is_usable(self.password_hash())
    }
}

impl Authenticatable for User {
    fn username_field() -> &'static str {
        "email"
    }

    fn required_fields() -> &'static [&'static str] {
        &["first_name", "last_name"]
    }

    fn username(&self) -> &str {
        &self.email
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    fn short_name(&self) -> &str {
        &self.first_name
    }

    fn password_hash(&self) -> &str {
        &self.password
    }

    fn replace_password_hash(&mut self, hash: String) {
        self.password = hash;
    }
}

/// Resolve login credentials to an active account and stamp its login time.
///
/// Unknown emails, inactive accounts and wrong passwords all yield `None`.
pub fn authenticate(
    users: &UserRepository<'_>,
    email: &str,
    password: &str,
) -> DbResult<Option<Stored<User>>> {
    let user = match users.get_by_email(email) {
        Ok(user) => user,
        Err(DbError::NotFound { .. }) | Err(DbError::Validation(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    if !user.is_active || !user.check_password(password) {
        tracing::debug!(user_id = %user.id, "Login rejected");
        return Ok(None);
    }
    users.record_login(user.id).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_db;

    #[test]
    fn names_are_derived_from_profile() {
        let mut user = User::new("jane@example.com", "Jane", "Doe");
        assert_eq!(user.full_name(), "Jane Doe");
        assert_eq!(user.short_name(), "Jane");
        assert_eq!(user.username(), "jane@example.com");
        assert_eq!(User::username_field(), "email");

        user.last_name = String::new();
        assert_eq!(user.full_name(), "Jane");
    }

    #[test]
    fn password_lifecycle() {
        let mut user = User::new("jane@example.com", "Jane", "Doe");
        assert!(!user.has_usable_password());

        user.set_password("s3cret!").unwrap();
        assert!(user.has_usable_password());
        assert!(user.check_password("s3cret!"));
        assert!(!user.check_password("guess"));

        user.set_unusable_password();
        assert!(!user.has_usable_password());
        assert!(!user.check_password("s3cret!"));
    }

    #[test]
    fn authenticate_checks_password_and_activity() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let created = users
            .create_user("jane@example.com", "Jane", "Doe", Some("s3cret!"))
            .unwrap();

        assert!(authenticate(&users, "jane@example.com", "nope")
            .unwrap()
            .is_none());
        assert!(authenticate(&users, "nobody@example.com", "s3cret!")
            .unwrap()
            .is_none());

        let logged_in = authenticate(&users, "jane@EXAMPLE.com", "s3cret!")
            .unwrap()
            .unwrap();
        assert_eq!(logged_in.id, created.id);
        assert!(logged_in.last_login.is_some());

        let mut inactive = logged_in;
        inactive.is_active = false;
        users.update(&inactive).unwrap();
        assert!(authenticate(&users, "jane@example.com", "s3cret!")
            .unwrap()
            .is_none());
    }
}
