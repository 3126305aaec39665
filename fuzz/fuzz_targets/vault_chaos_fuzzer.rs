//! Fuzz target for the evidence store under storage failures
//!
//! Drives the full store pipeline (seal, commit, replicate, publish)
//! over backends that inject I/O errors at arbitrary rates, mixed with
//! retrievals under arbitrary role sets.
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%), deterministic per seed
//! - Interleaved store / list / retrieve / verify operations
//! - Authorized, unauthorized, and empty role sets
//! - Arbitrary submitted filenames and foreign locator strings
//!
//! # Invariants
//!
//! - The vault NEVER panics on storage errors
//! - Chaos produces storage errors only, never bogus integrity verdicts
//! - A successful retrieval returns exactly the stored content
//! - Role denials hold under chaos
//! - Afterwards, a clean view of the same objects lists exactly the
//!   successfully stored locators, each retrievable bit for bit
//!   (publication is atomic or nothing)

#![no_main]

use arbitrary::Arbitrary;
use casevault_crypto::VaultKey;
use casevault_store::{
    AccessGate, ChaosBackend, EvidenceSource, EvidenceStore, Locator, MemoryBackend, Role,
    VaultError,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    key: [u8; 32],
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<VaultOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum VaultOperation {
    Store { content: Vec<u8>, name: String },
    List,
    Retrieve { pick: u8, roles_mask: u8 },
    Verify { pick: u8 },
    RetrieveForeign { locator: String },
}

fn roles_from_mask(mask: u8) -> Vec<Role> {
    let mut roles = Vec::new();
    if mask & 0b001 != 0 {
        roles.push(Role::Citizen);
    }
    if mask & 0b010 != 0 {
        roles.push(Role::Dispatcher);
    }
    if mask & 0b100 != 0 {
        roles.push(Role::Responder);
    }
    roles
}

fuzz_target!(|scenario: ChaosScenario| {
    let runtime =
        tokio::runtime::Builder::new_current_thread().build().expect("runtime must build");
    runtime.block_on(run(scenario));
});

async fn run(scenario: ChaosScenario) {
    let ChaosScenario { key, chaos_seed, failure_rate_tenth, operations } = scenario;
    let failure_rate = f64::from(failure_rate_tenth % 10) / 10.0;

    let primary_objects = MemoryBackend::new();
    let backup_objects = MemoryBackend::new();
    let primary = ChaosBackend::with_seed(primary_objects.clone(), failure_rate, chaos_seed);
    let backup =
        ChaosBackend::with_seed(backup_objects.clone(), failure_rate, chaos_seed ^ 0xD1CE);
    let vault =
        EvidenceStore::new(primary, backup, VaultKey::from_bytes(key), AccessGate::default());

    let mut stored: Vec<(Locator, Vec<u8>)> = Vec::new();

    for op in operations {
        match op {
            VaultOperation::Store { content, name } => {
                match vault.store(EvidenceSource::from_bytes(content.clone()), &name).await {
                    Ok(receipt) => {
                        assert_eq!(receipt.size, content.len() as u64);
                        stored.push((receipt.locator, content));
                    }
                    Err(e) => {
                        // Failure injection surfaces as storage errors only
                        assert!(matches!(e, VaultError::Storage(_)), "unexpected {e:?}");
                    }
                }
            }

            VaultOperation::List => {
                if let Ok(listed) = vault.list().await {
                    let mut expected: Vec<Locator> =
                        stored.iter().map(|(locator, _)| locator.clone()).collect();
                    expected.sort();
                    assert_eq!(listed, expected, "list must show exactly the published evidence");
                }
            }

            VaultOperation::Retrieve { pick, roles_mask } => {
                if stored.is_empty() {
                    continue;
                }
                let (locator, content) = &stored[pick as usize % stored.len()];
                let roles = roles_from_mask(roles_mask);
                let permitted =
                    roles.contains(&Role::Dispatcher) || roles.contains(&Role::Responder);

                match vault.retrieve(&locator.to_string(), &roles).await {
                    Ok(mut reader) => {
                        assert!(permitted, "gate must hold under chaos");
                        let plaintext =
                            reader.read_all().await.expect("verified reader must drain");
                        assert_eq!(&plaintext, content);
                    }
                    Err(VaultError::Authorization { .. }) => {
                        assert!(!permitted, "permitted roles must not be denied");
                    }
                    Err(e) => {
                        assert!(permitted, "denial must be an authorization error");
                        assert!(matches!(e, VaultError::Storage(_)), "unexpected {e:?}");
                    }
                }
            }

            VaultOperation::Verify { pick } => {
                if stored.is_empty() {
                    continue;
                }
                let (locator, _) = &stored[pick as usize % stored.len()];
                if let Err(e) = vault.verify(&locator.to_string()).await {
                    // Chaos injects errors but never corrupts bytes, so an
                    // integrity or divergence verdict here would be a bug.
                    assert!(matches!(e, VaultError::Storage(_)), "unexpected {e:?}");
                }
            }

            VaultOperation::RetrieveForeign { locator } => {
                let _ = vault.retrieve(&locator, &[Role::Responder]).await;
            }
        }
    }

    // Clean view over the same object maps: publication must have been
    // atomic regardless of where failures were injected.
    let clean_vault = EvidenceStore::new(
        primary_objects,
        backup_objects,
        VaultKey::from_bytes(key),
        AccessGate::default(),
    );

    let mut expected: Vec<Locator> = stored.iter().map(|(locator, _)| locator.clone()).collect();
    expected.sort();
    let listed = clean_vault.list().await.expect("clean list must succeed");
    assert_eq!(listed, expected, "exactly the successful stores are published");

    for (locator, content) in &stored {
        let mut reader = clean_vault
            .retrieve(&locator.to_string(), &[Role::Dispatcher])
            .await
            .expect("published evidence must be retrievable");
        let plaintext = reader.read_all().await.expect("verified reader must drain");
        assert_eq!(&plaintext, content, "retrieved plaintext must match stored content");

        clean_vault.verify(&locator.to_string()).await.expect("clean audit must pass");
    }
}
