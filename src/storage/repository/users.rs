// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User account repository.
//!
//! A user holds the seller fiscal entity it invoices as, owns its
//! registries, and carries the encrypted personal datastore. The
//! `datastore`/`crc` pair is written only through
//! [`crate::datastore::DatastoreCodec`]; [`UserRepository::update`] leaves
//! it untouched.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::super::database::{
    insert, load, replace, DbError, DbResult, Id, InvoiceDatabase, Record, Stored, USERS,
    USER_EMAILS,
};
use super::super::integrity::{
    delete_cascading, ensure_not_invoice_party, ensure_one_to_one, require, DeletionRoot,
    DeletionSummary,
};
use super::FiscalEntity;
use crate::auth::{Authenticatable, UNUSABLE_PASSWORD};
use crate::models::{
    limit_text, require_text, ValidationError, ValidationResult, CRC_TEXT, SHORT_TEXT,
};

/// Checksum stored before the datastore is first written.
pub const EMPTY_CRC: &str = "0x0";

const MAX_EMAIL: usize = 254;

fn default_crc() -> String {
    EMPTY_CRC.to_string()
}

/// Normalise an email address for storage and lookup.
///
/// Applies NFKC and lowercases the domain; the local part keeps its case.
pub fn normalize_email(raw: &str) -> ValidationResult<String> {
    let invalid = || ValidationError::InvalidEmail(raw.to_string());

    let email: String = raw.trim().nfkc().collect();
    let (local, domain) = email.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || email.chars().any(char::is_whitespace)
        || email.chars().count() > MAX_EMAIL
    {
        return Err(invalid());
    }
    Ok(format!("{local}@{}", domain.to_lowercase()))
}

/// User account row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Service provider this account invoices as
    pub seller: Option<Id<FiscalEntity>>,
    pub first_name: String,
    pub last_name: String,
    /// Login identifier, unique across accounts
    pub email: String,
    /// Argon2 PHC string, or an unusable marker
    pub password: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    /// Encrypted datastore token (empty until first written)
    #[serde(default)]
    pub datastore: String,
    /// CRC32 of the datastore plaintext, `0x`-prefixed hex
    #[serde(default = "default_crc")]
    pub crc: String,
}

impl User {
    /// A fresh active account with an unusable password.
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            seller: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: UNUSABLE_PASSWORD.to_string(),
            is_staff: false,
            is_active: true,
            is_superuser: false,
            last_login: None,
            date_joined: Utc::now(),
            datastore: String::new(),
            crc: default_crc(),
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_text("first_name", &self.first_name, SHORT_TEXT)?;
        require_text("last_name", &self.last_name, SHORT_TEXT)?;
        require_text("email", &self.email, MAX_EMAIL)?;
        require_text("crc", &self.crc, CRC_TEXT)?;
        limit_text("password", &self.password, usize::MAX)?;
        Ok(())
    }
}

impl Record for User {
    const TABLE: redb::TableDefinition<'static, u64, &'static [u8]> = USERS;
    const TABLE_NAME: &'static str = "users";
    const KIND: &'static str = "user";
}

fn claim_email(txn: &WriteTransaction, email: &str, owner: Option<Id<User>>) -> DbResult<()> {
    let emails = txn.open_table(USER_EMAILS)?;
    let holder = emails.get(email)?.map(|v| v.value());
    match holder {
        Some(id) if Some(Id::new(id)) != owner => Err(DbError::UniqueViolation(format!(
            "email {email} is already registered"
        ))),
        _ => Ok(()),
    }
}

fn check_seller(txn: &WriteTransaction, user: &User, current: Option<Id<User>>) -> DbResult<()> {
    if let Some(seller) = user.seller {
        require(txn, User::KIND, "seller", seller)?;
        ensure_one_to_one::<User, FiscalEntity>(txn, "seller", seller, current, |u| u.seller)?;
        ensure_not_invoice_party(txn, User::KIND, "seller", seller)?;
    }
    Ok(())
}

/// Repository for user accounts.
pub struct UserRepository<'a> {
    db: &'a InvoiceDatabase,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a InvoiceDatabase) -> Self {
        Self { db }
    }

    /// Insert a new account. The email is normalised before it is stored.
    pub fn create(&self, mut user: User) -> DbResult<Stored<User>> {
        user.email = normalize_email(&user.email)?;
        user.validate()?;

        let write_txn = self.db.begin_write()?;
        check_seller(&write_txn, &user, None)?;
        claim_email(&write_txn, &user.email, None)?;
        let stored = insert(&write_txn, user)?;
        {
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            emails.insert(stored.email.as_str(), stored.id.get())?;
        }
        write_txn.commit()?;

        tracing::info!(user_id = %stored.id, "User created");
        Ok(stored)
    }

    /// Create a regular account. Without a password the account cannot log
    /// in until one is set.
    pub fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: Option<&str>,
    ) -> DbResult<Stored<User>> {
        let mut user = User::new(email, first_name, last_name);
        if let Some(password) = password {
            user.set_password(password)?;
        }
        self.create(user)
    }

    /// Create an account with staff and superuser flags set.
    pub fn create_superuser(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> DbResult<Stored<User>> {
        let mut user = User::new(email, first_name, last_name);
        user.is_staff = true;
        user.is_superuser = true;
        user.set_password(password)?;
        self.create(user)
    }

    pub fn get(&self, id: Id<User>) -> DbResult<Stored<User>> {
        self.db.get_row(id)
    }

    pub fn find(&self, id: Id<User>) -> DbResult<Option<Stored<User>>> {
        self.db.find_row(id)
    }

    /// Look up an account by email (normalised before the lookup).
    pub fn get_by_email(&self, email: &str) -> DbResult<Stored<User>> {
        let email = normalize_email(email)?;
        let id = {
            let read_txn = self.db.begin_read()?;
            let emails = read_txn.open_table(USER_EMAILS)?;
            let found = emails.get(email.as_str())?.map(|v| v.value());
            found.ok_or_else(|| DbError::not_found(User::KIND, &email))?
        };
        self.db.get_row(Id::new(id))
    }

    pub fn list(&self) -> DbResult<Vec<Stored<User>>> {
        self.db.list_rows()
    }

    /// Overwrite an account's profile fields.
    ///
    /// The stored `datastore` and `crc` are kept as they are.
    pub fn update(&self, user: &Stored<User>) -> DbResult<()> {
        let mut row = user.clone();
        row.email = normalize_email(&row.email)?;
        row.validate()?;

        let write_txn = self.db.begin_write()?;
        let current = load(&write_txn, row.id)?;
        row.datastore = current.datastore.clone();
        row.crc = current.crc.clone();

        check_seller(&write_txn, &row, Some(row.id))?;
        if row.email != current.email {
            claim_email(&write_txn, &row.email, Some(row.id))?;
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            emails.remove(current.email.as_str())?;
            emails.insert(row.email.as_str(), row.id.get())?;
        }
        replace(&write_txn, &row)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Point the account at its seller fiscal entity (or clear it).
    pub fn set_seller(
        &self,
        id: Id<User>,
        seller: Option<Id<FiscalEntity>>,
    ) -> DbResult<Stored<User>> {
        let write_txn = self.db.begin_write()?;
        let mut user = load(&write_txn, id)?;
        user.seller = seller;
        check_seller(&write_txn, &user, Some(id))?;
        replace(&write_txn, &user)?;
        write_txn.commit()?;
        Ok(user)
    }

    /// Stamp `last_login` with the current time.
    pub fn record_login(&self, id: Id<User>) -> DbResult<Stored<User>> {
        let write_txn = self.db.begin_write()?;
        let mut user = load(&write_txn, id)?;
        user.last_login = Some(Utc::now());
        replace(&write_txn, &user)?;
        write_txn.commit()?;
        Ok(user)
    }

    /// Persist a freshly sealed datastore token and its checksum.
    pub(crate) fn store_datastore(&self, id: Id<User>, datastore: &str, crc: &str) -> DbResult<()> {
        require_text("crc", crc, CRC_TEXT)?;

        let write_txn = self.db.begin_write()?;
        let mut user = load(&write_txn, id)?;
        user.datastore = datastore.to_string();
        user.crc = crc.to_string();
        replace(&write_txn, &user)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Delete an account together with its registries, contracts and invoices.
    pub fn delete(&self, id: Id<User>) -> DbResult<DeletionSummary> {
        let write_txn = self.db.begin_write()?;
        let summary = delete_cascading(&write_txn, DeletionRoot::User(id))?;
        write_txn.commit()?;

        tracing::info!(user_id = %id, removed = summary.total(), "User deleted");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{fiscal_entity, temp_db};
    use crate::storage::FiscalEntityRepository;

    #[test]
    fn normalize_email_lowercases_domain_only() {
        assert_eq!(
            normalize_email("  Jane.Doe@Example.COM ").unwrap(),
            "Jane.Doe@example.com"
        );
        // Fullwidth characters fold under NFKC
        assert_eq!(
            normalize_email("ｊａｎｅ@example.com").unwrap(),
            "jane@example.com"
        );
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("jane@").is_err());
        assert!(normalize_email("ja ne@example.com").is_err());
    }

    #[test]
    fn new_user_defaults() {
        let user = User::new("jane@example.com", "Jane", "Doe");
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
        assert_eq!(user.datastore, "");
        assert_eq!(user.crc, EMPTY_CRC);
        assert_eq!(user.password, UNUSABLE_PASSWORD);
    }

    #[test]
    fn create_and_lookup_by_email() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let created = repo
            .create(User::new("Jane@Example.com", "Jane", "Doe"))
            .unwrap();
        assert_eq!(created.email, "Jane@example.com");

        let by_email = repo.get_by_email("Jane@EXAMPLE.com").unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[test]
    fn email_is_unique() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        repo.create(User::new("jane@example.com", "Jane", "Doe"))
            .unwrap();
        let err = repo
            .create(User::new("jane@EXAMPLE.com", "Other", "Jane"))
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation(_)));
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn update_moves_email_index() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let mut user = repo
            .create(User::new("jane@example.com", "Jane", "Doe"))
            .unwrap();
        user.email = "jane.doe@example.com".to_string();
        repo.update(&user).unwrap();

        assert!(matches!(
            repo.get_by_email("jane@example.com"),
            Err(DbError::NotFound { .. })
        ));
        assert_eq!(repo.get_by_email("jane.doe@example.com").unwrap().id, user.id);

        // The old address is free again
        repo.create(User::new("jane@example.com", "Another", "Jane"))
            .unwrap();
    }

    #[test]
    fn update_cannot_touch_datastore() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let mut user = repo
            .create(User::new("jane@example.com", "Jane", "Doe"))
            .unwrap();
        user.first_name = "Janet".to_string();
        user.datastore = "forged".to_string();
        user.crc = "0xdead".to_string();
        repo.update(&user).unwrap();

        let loaded = repo.get(user.id).unwrap();
        assert_eq!(loaded.first_name, "Janet");
        assert_eq!(loaded.datastore, "");
        assert_eq!(loaded.crc, EMPTY_CRC);
    }

    #[test]
    fn seller_is_one_to_one() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let entities = FiscalEntityRepository::new(&db);

        let seller = entities.create(fiscal_entity("Jane PFA")).unwrap();
        let jane = users
            .create(User::new("jane@example.com", "Jane", "Doe"))
            .unwrap();
        let john = users
            .create(User::new("john@example.com", "John", "Doe"))
            .unwrap();

        users.set_seller(jane.id, Some(seller.id)).unwrap();
        let err = users.set_seller(john.id, Some(seller.id)).unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation(_)));

        // Re-assigning the same seller to its owner is fine
        users.set_seller(jane.id, Some(seller.id)).unwrap();
    }

    #[test]
    fn seller_must_exist() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);

        let mut user = User::new("jane@example.com", "Jane", "Doe");
        user.seller = Some(Id::new(404));
        let err = users.create(user).unwrap_err();
        assert!(matches!(
            err,
            DbError::ForeignKey {
                field: "seller",
                id: 404,
                ..
            }
        ));
    }

    #[test]
    fn deleting_seller_entity_cascades_to_user() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let entities = FiscalEntityRepository::new(&db);

        let seller = entities.create(fiscal_entity("Jane PFA")).unwrap();
        let mut user = User::new("jane@example.com", "Jane", "Doe");
        user.seller = Some(seller.id);
        let user = users.create(user).unwrap();

        let summary = entities.delete(seller.id).unwrap();
        assert_eq!(summary.users, 1);
        assert!(users.find(user.id).unwrap().is_none());
        assert!(users.get_by_email("jane@example.com").is_err());
    }

    #[test]
    fn create_user_and_superuser() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let plain = repo
            .create_user("jane@example.com", "Jane", "Doe", None)
            .unwrap();
        assert!(!plain.has_usable_password());
        assert!(!plain.is_staff);

        let admin = repo
            .create_superuser("root@example.com", "Root", "Admin", "hunter22")
            .unwrap();
        assert!(admin.is_staff && admin.is_superuser);
        assert!(admin.check_password("hunter22"));

        let err = repo
            .create_superuser("other@example.com", "Other", "Admin", "")
            .unwrap_err();
        assert!(matches!(err, DbError::Password(_)));
    }

    #[test]
    fn record_login_sets_timestamp() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let user = repo
            .create(User::new("jane@example.com", "Jane", "Doe"))
            .unwrap();
        assert!(user.last_login.is_none());

        let logged_in = repo.record_login(user.id).unwrap();
        assert!(logged_in.last_login.is_some());
    }

    #[test]
    fn store_datastore_rejects_oversized_checksum() {
        let (db, _dir) = temp_db();
        let repo = UserRepository::new(&db);

        let user = repo
            .create(User::new("jane@example.com", "Jane", "Doe"))
            .unwrap();
        let err = repo
            .store_datastore(user.id, "token", "0x123456789")
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}
