// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Datastore
//!
//! Each user row carries a private payload encrypted at rest:
//!
//! - `datastore`: token from [`CryptoEngine::encrypt`] over the payload's
//!   canonical JSON
//! - `crc`: [`crc32_hex`] of that same JSON
//!
//! ## Read Policy
//!
//! Reading never fails because of the stored bytes:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | token does not decrypt (wrong key, tampering, never written) | warning, [`DatastorePayload::corrupted_storage`] |
//! | decrypted text does not match `crc` | warning, decrypted payload |
//! | decrypted text is not a valid payload | [`DatastoreError::Serialization`] |
//!
//! The checksum of the sentinel is compared like any other plaintext, so a
//! corrupted row usually logs both warnings.

pub mod checksum;
pub mod engine;

pub use checksum::crc32_hex;
pub use engine::{CryptoEngine, CryptoError, KEY_LEN};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::storage::{DbError, Id, Stored, User, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("datastore serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("datastore encryption failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// A structure that can live in a user's datastore.
pub trait DatastorePayload: Serialize + DeserializeOwned {
    /// The empty value handed out when the stored token cannot be decrypted.
    fn corrupted_storage() -> Self;
}

impl DatastorePayload for serde_json::Value {
    fn corrupted_storage() -> Self {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

/// Working data kept beside the relational tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Set on the sentinel returned for an unreadable datastore
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub corrupted: bool,
}

impl DatastorePayload for Workspace {
    fn corrupted_storage() -> Self {
        Workspace {
            corrupted: true,
            ..Workspace::default()
        }
    }
}

/// Reads and writes the encrypted datastore of user rows.
#[derive(Debug)]
pub struct DatastoreCodec {
    engine: CryptoEngine,
}

impl DatastoreCodec {
    pub fn new(engine: CryptoEngine) -> Self {
        Self { engine }
    }

    /// Encode `payload` into the row's `datastore` and `crc` fields.
    pub fn seal<T: DatastorePayload>(&self, user: &mut User, payload: &T) -> Result<(), DatastoreError> {
        let plaintext = serde_json::to_string(payload)?;
        user.crc = crc32_hex(&plaintext);
        user.datastore = self.engine.encrypt(plaintext.as_bytes())?;
        Ok(())
    }

    /// Decode the row's datastore following the read policy.
    pub fn open<T: DatastorePayload>(&self, user: &Stored<User>) -> Result<T, DatastoreError> {
        let plaintext = match self.decrypt_text(&user.datastore) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "Cannot decrypt user datastore, using corrupted-storage placeholder"
                );
                serde_json::to_string(&T::corrupted_storage())?
            }
        };

        let computed = crc32_hex(&plaintext);
        if computed != user.crc {
            tracing::warn!(
                user_id = %user.id,
                computed = %computed,
                stored = %user.crc,
                "Datastore checksum mismatch"
            );
        }

        Ok(serde_json::from_str(&plaintext)?)
    }

    /// Seal `payload` and persist the row's datastore fields.
    ///
    /// `user` is updated only once the row has been stored.
    pub fn write<T: DatastorePayload>(
        &self,
        users: &UserRepository<'_>,
        user: &mut Stored<User>,
        payload: &T,
    ) -> Result<(), DatastoreError> {
        let mut sealed = user.fields.clone();
        self.seal(&mut sealed, payload)?;
        users.store_datastore(user.id, &sealed.datastore, &sealed.crc)?;

        user.datastore = sealed.datastore;
        user.crc = sealed.crc;
        tracing::debug!(user_id = %user.id, crc = %user.crc, "User datastore written");
        Ok(())
    }

    /// Load a user and open its datastore.
    pub fn read<T: DatastorePayload>(
        &self,
        users: &UserRepository<'_>,
        id: Id<User>,
    ) -> Result<T, DatastoreError> {
        let user = users.get(id)?;
        self.open(&user)
    }

    fn decrypt_text(&self, token: &str) -> Result<String, CryptoError> {
        let bytes = self.engine.decrypt(token)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::test_support::{member, temp_db};
    use crate::storage::EMPTY_CRC;

    fn codec() -> DatastoreCodec {
        let key = CryptoEngine::generate_key().unwrap();
        DatastoreCodec::new(CryptoEngine::from_base64(&key).unwrap())
    }

    fn detached_user() -> Stored<User> {
        Stored {
            id: Id::new(1),
            fields: User::new("jane@example.com", "Jane", "Doe"),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let codec = codec();
        let mut user = member(&db, "jane@example.com");

        let payload = json!({"clients": ["Acme"]});
        codec.write(&users, &mut user, &payload).unwrap();

        let stored = users.get(user.id).unwrap();
        assert_eq!(stored.crc, crc32_hex(r#"{"clients":["Acme"]}"#));
        assert_ne!(stored.datastore, "");

        let back: serde_json::Value = codec.read(&users, user.id).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn workspace_round_trips_with_canonical_text() {
        let codec = codec();
        let mut user = detached_user();
        let workspace = Workspace {
            clients: vec!["Acme".to_string()],
            ..Workspace::default()
        };

        codec.seal(&mut user.fields, &workspace).unwrap();
        assert_eq!(user.crc, crc32_hex(r#"{"clients":["Acme"]}"#));

        let back: Workspace = codec.open(&user).unwrap();
        assert_eq!(back, workspace);
        assert!(!back.corrupted);
    }

    #[test]
    fn never_written_datastore_reads_as_corrupted() {
        let codec = codec();
        let user = detached_user();
        assert_eq!(user.crc, EMPTY_CRC);

        let value: serde_json::Value = codec.open(&user).unwrap();
        assert_eq!(value, json!({}));

        let workspace: Workspace = codec.open(&user).unwrap();
        assert_eq!(workspace, Workspace::corrupted_storage());
    }

    #[test]
    fn undecryptable_datastore_falls_back() {
        let mut user = detached_user();
        codec()
            .seal(&mut user.fields, &json!({"clients": ["Acme"]}))
            .unwrap();

        // Another key cannot read it
        let value: serde_json::Value = codec().open(&user).unwrap();
        assert_eq!(value, json!({}));

        user.datastore = "garbage".to_string();
        let workspace: Workspace = codec().open(&user).unwrap();
        assert!(workspace.corrupted);
        assert!(workspace.clients.is_empty());
    }

    #[test]
    fn checksum_mismatch_still_returns_payload() {
        let codec = codec();
        let mut user = detached_user();
        let payload = json!({"clients": ["Acme"], "notes": "pay in 30 days"});
        codec.seal(&mut user.fields, &payload).unwrap();

        user.crc = "0xdeadbeef".to_string();
        let back: serde_json::Value = codec.open(&user).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        let codec = codec();
        let mut user = detached_user();
        codec.seal(&mut user.fields, &json!(["not", "a", "workspace"])).unwrap();

        let err = codec.open::<Workspace>(&user).unwrap_err();
        assert!(matches!(err, DatastoreError::Serialization(_)));
    }

    #[test]
    fn profile_updates_keep_the_datastore() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let codec = codec();
        let mut user = member(&db, "jane@example.com");
        codec
            .write(&users, &mut user, &json!({"clients": ["Acme"]}))
            .unwrap();

        let mut stale = users.get(user.id).unwrap();
        stale.first_name = "Janet".to_string();
        stale.datastore = String::new();
        users.update(&stale).unwrap();

        let back: serde_json::Value = codec.read(&users, user.id).unwrap();
        assert_eq!(back, json!({"clients": ["Acme"]}));
    }

    #[test]
    fn failed_write_leaves_the_row_untouched() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let mut user = Stored {
            id: Id::new(404),
            fields: User::new("ghost@example.com", "Ghost", "User"),
        };

        let err = codec()
            .write(&users, &mut user, &json!({"clients": ["Acme"]}))
            .unwrap_err();
        assert!(matches!(err, DatastoreError::Storage(DbError::NotFound { .. })));
        assert_eq!(user.datastore, "");
        assert_eq!(user.crc, EMPTY_CRC);
    }

    #[test]
    fn successful_write_updates_the_caller_row() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);
        let mut user = member(&db, "jane@example.com");

        codec()
            .write(&users, &mut user, &json!({"clients": ["Acme"]}))
            .unwrap();
        let stored = users.get(user.id).unwrap();
        assert_eq!(user.datastore, stored.datastore);
        assert_eq!(user.crc, stored.crc);
    }

    #[test]
    fn read_of_missing_user_is_an_error() {
        let (db, _dir) = temp_db();
        let users = UserRepository::new(&db);

        let err = codec()
            .read::<serde_json::Value>(&users, Id::new(404))
            .unwrap_err();
        assert!(matches!(err, DatastoreError::Storage(DbError::NotFound { .. })));
    }
}
