//! Tests for index key layouts
//!
//! These tests verify:
//! - The exact set of index keys derived from an event
//! - Tag value tokens (hex prefix vs SHA-256 prefix)
//! - Selector validation never panics on odd input
//! - Serial and timestamp extraction from keys

use eventkv::store::keys::{self, IndexFamily};
use eventkv::StoreError;

use crate::common::{make_event, pubkey};

// =============================================================================
// Derived Key Tests
// =============================================================================

#[test]
fn test_derive_keys_for_text_note() {
    let author = pubkey(1);
    let referenced = pubkey(9);
    let event = make_event(
        &author,
        1_700_000_000,
        1,
        &[
            &["e", &referenced],
            &["t", "news"],
            &["x"],              // no value: not indexed
            &["long", "ignored"], // multi-char name: not indexed
        ],
        "hello",
    );

    let keys = keys::derive_index_keys(&event, 7).unwrap();

    // id, created_at, kind, pubkey, pubkey+kind, #e, #t
    assert_eq!(keys.len(), 7);
    for key in &keys {
        assert_eq!(keys::index_serial(key), Some(7));
        assert!(keys::INDEX_PREFIXES.contains(&key[0]));
    }

    let families: Vec<u8> = keys.iter().map(|k| k[0]).collect();
    assert_eq!(
        families,
        vec![
            keys::CREATED_AT_PREFIX,
            keys::ID_PREFIX,
            keys::KIND_PREFIX,
            keys::PUBKEY_PREFIX,
            keys::PUBKEY_KIND_PREFIX,
            keys::TAG_PREFIX,
            keys::TAG_PREFIX,
        ]
    );

    let mut kind_key = keys::kind_prefix(1);
    kind_key.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    kind_key.extend_from_slice(&7u32.to_be_bytes());
    assert!(keys.contains(&kind_key));

    let mut e_key = keys::tag_prefix(b'e', &referenced);
    e_key.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    e_key.extend_from_slice(&7u32.to_be_bytes());
    assert!(keys.contains(&e_key));
}

#[test]
fn test_derive_keys_for_addressable_event() {
    let author = pubkey(2);
    let event = make_event(&author, 500, 30023, &[&["d", "my-article"]], "body");

    let keys = keys::derive_index_keys(&event, 3).unwrap();

    // id, created_at, kind, pubkey, pubkey+kind, #d, address
    assert_eq!(keys.len(), 7);

    let mut address = keys::address_prefix(30023, &author, "my-article").unwrap();
    address.extend_from_slice(&500u32.to_be_bytes());
    address.extend_from_slice(&3u32.to_be_bytes());
    assert!(keys.contains(&address));
}

#[test]
fn test_derive_keys_is_deterministic() {
    let event = make_event(&pubkey(3), 10, 7, &[&["p", &pubkey(4)]], "+");
    assert_eq!(
        keys::derive_index_keys(&event, 1).unwrap(),
        keys::derive_index_keys(&event, 1).unwrap()
    );
}

#[test]
fn test_derive_keys_rejects_bad_hex() {
    let mut event = make_event(&pubkey(3), 10, 1, &[], "x");
    event.pubkey = "not-hex".to_string();

    assert!(matches!(
        keys::derive_index_keys(&event, 1),
        Err(StoreError::InvalidEvent(_))
    ));
}

// =============================================================================
// Token Tests
// =============================================================================

#[test]
fn test_tag_token_hex_values_use_decoded_prefix() {
    let value = format!("{}{}", "0123456789abcdef", "f".repeat(48));
    assert_eq!(
        keys::tag_token(&value),
        [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]
    );
}

#[test]
fn test_tag_token_distinguishes_short_values() {
    assert_ne!(keys::tag_token("new"), keys::tag_token("news"));
    assert_ne!(keys::tag_token(""), keys::tag_token("a"));
    assert_eq!(keys::tag_token("news"), keys::tag_token("news"));
}

#[test]
fn test_tag_token_non_ascii_does_not_panic() {
    // 64 bytes, but not hex and with a multi-byte char near the middle
    let value = format!("{}é{}", "a".repeat(15), "b".repeat(47));
    assert_eq!(value.len(), 64);
    let _ = keys::tag_token(&value);
}

// =============================================================================
// Selector Tests
// =============================================================================

#[test]
fn test_hex_selector() {
    let selector = keys::hex_selector(&pubkey(0xab)).unwrap();
    assert_eq!(selector, [0xab; 8]);

    assert!(matches!(keys::hex_selector("abcd"), Err(StoreError::InvalidFilter(_))));
    assert!(matches!(
        keys::hex_selector(&"z".repeat(64)),
        Err(StoreError::InvalidFilter(_))
    ));

    let non_ascii = format!("{}é{}", "a".repeat(15), "b".repeat(47));
    assert!(keys::hex_selector(&non_ascii).is_err());
}

#[test]
fn test_tag_name_byte() {
    assert_eq!(keys::tag_name_byte("e"), Some(b'e'));
    assert_eq!(keys::tag_name_byte("ab"), None);
    assert_eq!(keys::tag_name_byte(""), None);
    assert_eq!(keys::tag_name_byte("é"), None);
}

// =============================================================================
// Key Accessor Tests
// =============================================================================

#[test]
fn test_raw_key_round_trip() {
    let key = keys::raw_key(0x01020304);
    assert_eq!(key, vec![keys::RAW_PREFIX, 1, 2, 3, 4]);
    assert_eq!(keys::raw_serial(&key), Some(0x01020304));
    assert_eq!(keys::raw_serial(&[keys::RAW_PREFIX, 1]), None);
    assert_eq!(keys::raw_serial(&[keys::KIND_PREFIX, 0, 0, 0, 1]), None);
}

#[test]
fn test_index_tail_accessors() {
    let mut key = keys::pubkey_prefix(&pubkey(5)).unwrap();
    key.extend_from_slice(&1234u32.to_be_bytes());
    key.extend_from_slice(&99u32.to_be_bytes());

    assert_eq!(keys::index_created_at(&key), Some(1234));
    assert_eq!(keys::index_serial(&key), Some(99));
    assert_eq!(keys::index_serial(&[1, 2]), None);
}

#[test]
fn test_family_prefix_bytes() {
    assert_eq!(IndexFamily::Id.prefix_byte(), keys::ID_PREFIX);
    assert_eq!(IndexFamily::TagAddress.prefix_byte(), keys::TAG_ADDRESS_PREFIX);
    assert!(!IndexFamily::Id.has_timestamp());
    assert!(IndexFamily::Kind.has_timestamp());
}
