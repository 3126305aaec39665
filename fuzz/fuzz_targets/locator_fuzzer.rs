//! Fuzz target for locator parsing
//!
//! Locators arrive as untrusted request strings and are spliced into
//! backend object names, so parsing is the traversal barrier for the
//! whole vault.
//!
//! # Strategy
//!
//! - Random strings: completely arbitrary input (general malformation)
//! - Random bytes: lossily decoded, exercising invalid UTF-8 shapes
//! - Steered input: locator-alphabet bases wrapped in the real prefix
//!   and suffix, covering the accepting path
//!
//! # Invariants
//!
//! - Parsing NEVER panics
//! - Accepted locators render back to the identical string (round-trip)
//! - Derived object names stay inside the storage namespace: correct
//!   suffix, no path separators, no dot segments, bounded length

#![no_main]

use std::str::FromStr;

use arbitrary::Arbitrary;
use casevault_store::{CIPHERTEXT_SUFFIX, LOCATOR_PREFIX, Locator, METADATA_SUFFIX};
use libfuzzer_sys::fuzz_target;

const BASE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789.-";

#[derive(Debug, Clone, Arbitrary)]
enum LocatorAttack {
    RandomString { input: String },
    RandomBytes { bytes: Vec<u8> },
    SteeredBase { base: Vec<u8> },
}

fuzz_target!(|attack: LocatorAttack| {
    let input = match attack {
        LocatorAttack::RandomString { input } => input,
        LocatorAttack::RandomBytes { bytes } => String::from_utf8_lossy(&bytes).into_owned(),
        LocatorAttack::SteeredBase { base } => {
            let base: String = base
                .iter()
                .map(|b| BASE_ALPHABET[(*b as usize) % BASE_ALPHABET.len()] as char)
                .collect();
            format!("{LOCATOR_PREFIX}{base}{CIPHERTEXT_SUFFIX}")
        }
    };

    let Ok(locator) = Locator::from_str(&input) else {
        return;
    };

    let rendered = locator.to_string();
    assert_eq!(rendered, input, "accepted locator must render back unchanged");
    assert_eq!(Locator::from_str(&rendered).unwrap(), locator);

    let object = locator.object_name();
    let sidecar = locator.metadata_name();
    assert!(object.ends_with(CIPHERTEXT_SUFFIX));
    assert!(sidecar.ends_with(METADATA_SUFFIX));
    assert_eq!(object.strip_suffix(CIPHERTEXT_SUFFIX), Some(locator.download_name()));

    for name in [&object, &sidecar] {
        assert!(!name.contains('/'), "object name {name} escapes the namespace");
        assert!(!name.contains('\\'), "object name {name} escapes the namespace");
        assert!(!name.contains(".."), "object name {name} contains a dot segment");
        assert!(!name.starts_with('.'), "object name {name} is hidden");
        assert!(name.len() <= 200 + METADATA_SUFFIX.len());
    }
});
