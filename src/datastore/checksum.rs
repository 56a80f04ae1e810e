// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CRC32 checksum of datastore plaintext.

/// CRC32 (IEEE) of `text`, as `0x`-prefixed lowercase hex without padding.
///
/// At most ten characters, so it always fits the user's `crc` column.
pub fn crc32_hex(text: &str) -> String {
    format!("{:#x}", crc32fast::hash(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(crc32_hex(""), "0x0");
        assert_eq!(crc32_hex("123456789"), "0xcbf43926");
    }

    #[test]
    fn deterministic() {
        let text = r#"{"clients":["Acme"]}"#;
        assert_eq!(crc32_hex(text), crc32_hex(text));
        assert_ne!(crc32_hex(text), crc32_hex(r#"{"clients":["Acme "]}"#));
    }

    #[test]
    fn fits_the_crc_column() {
        let longest = format!("{:#x}", u32::MAX);
        assert_eq!(longest.len(), crate::models::CRC_TEXT);
    }
}
