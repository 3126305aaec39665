//! Fuzz target for the streaming opener
//!
//! The opener consumes ciphertext straight from disk, which an attacker
//! with storage access can rewrite at will. Every mutation of a sealed
//! stream must be rejected without panicking and without emitting bytes
//! that were never sealed.
//!
//! # Strategy
//!
//! - Seal arbitrary content (optionally padded past segment boundaries),
//!   then open a mutated replay: bit flips, truncation, extension,
//!   recorded-tag corruption, full garbage streams
//! - Arbitrary chunk sizes on both the seal and the open side
//!
//! # Invariants
//!
//! - Seal and open NEVER panic, whatever the input
//! - An unmodified stream opens to exactly the sealed content
//! - Any modified stream fails to open; identity mutations still open
//! - Plaintext released before an error is a prefix of the sealed
//!   content, never fabricated bytes

#![no_main]

use arbitrary::Arbitrary;
use casevault_crypto::{
    AuthTag, NONCE_LEN, SEGMENT_LEN, SealError, StreamOpener, StreamSealer, VaultKey,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct OpenScenario {
    key: [u8; 32],
    content: Vec<u8>,
    /// 0, 1 or 2 extra full segments in front of `content`
    stretch: u8,
    seal_chunk: u16,
    open_chunk: u16,
    mutation: Mutation,
}

#[derive(Debug, Clone, Arbitrary)]
enum Mutation {
    None,
    FlipBit { position: u32, bit: u8 },
    Truncate { keep: u32 },
    Extend { extra: Vec<u8> },
    CorruptTag { mask: [u8; 16] },
    GarbageStream { bytes: Vec<u8> },
}

fuzz_target!(|scenario: OpenScenario| {
    let key = VaultKey::from_bytes(scenario.key);

    let mut content = vec![0x5A; (scenario.stretch as usize % 3) * SEGMENT_LEN];
    content.extend_from_slice(&scenario.content);

    let mut sealer = StreamSealer::new(&key);
    let nonce = sealer.nonce();
    let mut ciphertext = Vec::new();
    for chunk in content.chunks((scenario.seal_chunk as usize).max(1)) {
        ciphertext.extend_from_slice(&sealer.update(chunk).expect("sealing must not fail"));
    }
    let tail = sealer.finish().expect("sealing must not fail");
    ciphertext.extend_from_slice(&tail.ciphertext);
    let tag = tail.tag;

    let open_chunk = (scenario.open_chunk as usize).max(1);

    match scenario.mutation {
        Mutation::None => {
            let (plaintext, result) = open_collecting(&key, nonce, tag, &ciphertext, open_chunk);
            result.expect("pristine stream must open");
            assert_eq!(plaintext, content);
        }

        Mutation::FlipBit { position, bit } => {
            let mut mutated = ciphertext.clone();
            let index = position as usize % mutated.len();
            mutated[index] ^= 1 << (bit % 8);

            let (released, result) = open_collecting(&key, nonce, tag, &mutated, open_chunk);
            assert!(result.is_err(), "flipped bit at {index} must be rejected");
            assert!(content.starts_with(&released));
        }

        Mutation::Truncate { keep } => {
            let keep = keep as usize % ciphertext.len();
            let (released, result) =
                open_collecting(&key, nonce, tag, &ciphertext[..keep], open_chunk);
            assert!(result.is_err(), "truncation to {keep} bytes must be rejected");
            assert!(content.starts_with(&released));
        }

        Mutation::Extend { extra } => {
            if extra.is_empty() {
                return;
            }
            let mut mutated = ciphertext.clone();
            mutated.extend_from_slice(&extra);

            let (released, result) = open_collecting(&key, nonce, tag, &mutated, open_chunk);
            assert!(result.is_err(), "extended stream must be rejected");
            assert!(content.starts_with(&released));
        }

        Mutation::CorruptTag { mask } => {
            if mask.iter().all(|&b| b == 0) {
                return;
            }
            let mut corrupted = *tag.as_bytes();
            for (byte, m) in corrupted.iter_mut().zip(mask) {
                *byte ^= m;
            }

            let (released, result) = open_collecting(
                &key,
                nonce,
                AuthTag::from_bytes(corrupted),
                &ciphertext,
                open_chunk,
            );
            assert!(result.is_err(), "corrupted recorded tag must be rejected");
            assert!(content.starts_with(&released));
        }

        Mutation::GarbageStream { bytes } => {
            if bytes == ciphertext {
                return;
            }
            let (released, result) = open_collecting(&key, nonce, tag, &bytes, open_chunk);
            assert!(result.is_err(), "garbage stream must be rejected");
            assert!(content.starts_with(&released));
        }
    }
});

/// Open `ciphertext` in `chunk`-sized pieces, keeping whatever plaintext
/// was released before any error.
fn open_collecting(
    key: &VaultKey,
    nonce: [u8; NONCE_LEN],
    tag: AuthTag,
    ciphertext: &[u8],
    chunk: usize,
) -> (Vec<u8>, Result<(), SealError>) {
    let mut opener = StreamOpener::new(key, nonce, tag);
    let mut plaintext = Vec::new();

    for piece in ciphertext.chunks(chunk) {
        match opener.update(piece) {
            Ok(out) => plaintext.extend_from_slice(&out),
            Err(e) => return (plaintext, Err(e)),
        }
    }
    match opener.finish() {
        Ok(out) => {
            plaintext.extend_from_slice(&out);
            (plaintext, Ok(()))
        }
        Err(e) => (plaintext, Err(e)),
    }
}
