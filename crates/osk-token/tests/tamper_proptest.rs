//! Property tests for token tampering and agent derivation.

use std::sync::LazyLock;

use osk_token::{KeyPair, TokenBuilder, TokenParams, TrustConfig, ValidationOutcome, validate_at};
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;
const BASE64URL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const HEX: &[u8] = b"0123456789abcdefABCDEF";

struct Issued {
    master: KeyPair,
    trust: TrustConfig,
    token: String,
}

static ISSUED: LazyLock<Issued> = LazyLock::new(|| {
    let master = KeyPair::generate().expect("keypair");
    let me = master.address().clone();
    let trust = TrustConfig::new(me.clone(), None);
    let token = TokenBuilder::new(master.clone())
        .build(
            TokenParams::new(me.clone(), me, 7)
                .issued_at(NOW)
                .expires_at(Some(NOW + 3600))
                .label(Some("proptest".to_string())),
        )
        .expect("token");
    Issued {
        master,
        trust,
        token,
    }
});

/// Segment boundaries of the issued token: (payload start, payload end, signature start).
fn segments(token: &str) -> (usize, usize, usize) {
    let first = token.find('.').expect("first dot");
    let second = token.rfind('.').expect("second dot");
    (first + 1, second, second + 1)
}

/// Replace the character at `at` with a different one from `alphabet`.
fn flip(token: &str, at: usize, alphabet: &[u8], pick: usize) -> String {
    let mut bytes = token.as_bytes().to_vec();
    let original = bytes[at];
    let choices: Vec<u8> = alphabet.iter().copied().filter(|c| *c != original).collect();
    bytes[at] = choices[pick % choices.len()];
    String::from_utf8(bytes).expect("ascii")
}

#[test]
fn untampered_token_is_valid() {
    assert_eq!(
        validate_at(&ISSUED.token, &ISSUED.trust, NOW),
        ValidationOutcome::Valid {
            issuer: ISSUED.master.address().clone()
        }
    );
}

proptest! {
    /// Any single-character change in the payload segment is rejected.
    #[test]
    fn payload_flip_is_invalid(offset in any::<usize>(), pick in any::<usize>()) {
        let (start, end, _) = segments(&ISSUED.token);
        let at = start + offset % (end - start);
        let tampered = flip(&ISSUED.token, at, BASE64URL, pick);

        let outcome = validate_at(&tampered, &ISSUED.trust, NOW);
        prop_assert!(
            matches!(outcome, ValidationOutcome::Invalid(_)),
            "tampered payload produced {:?}",
            outcome
        );
    }

    /// Any single hex-digit change in the signature, case flips included, never
    /// validates as the signer.
    #[test]
    fn signature_flip_never_validates(offset in any::<usize>(), pick in any::<usize>()) {
        let (_, _, start) = segments(&ISSUED.token);
        let at = start + offset % (ISSUED.token.len() - start);
        let tampered = flip(&ISSUED.token, at, HEX, pick);

        let outcome = validate_at(&tampered, &ISSUED.trust, NOW);
        prop_assert!(!outcome.is_valid(), "tampered signature produced {:?}", outcome);
    }

    /// Arbitrary input never panics and is never valid.
    #[test]
    fn arbitrary_input_is_rejected(raw in ".{0,200}") {
        prop_assert!(!validate_at(&raw, &ISSUED.trust, NOW).is_valid());
    }

    /// Arbitrary three-segment input with the right tag is rejected.
    #[test]
    fn arbitrary_tagged_input_is_rejected(payload in "[A-Za-z0-9_-]{0,120}", signature in "[0-9a-f]{0,140}") {
        let raw = format!("osk-v1.{payload}.{signature}");
        prop_assert!(!validate_at(&raw, &ISSUED.trust, NOW).is_valid());
    }

    /// Agent derivation is a pure function of master key and index.
    #[test]
    fn agent_derivation_is_deterministic(index in any::<u32>()) {
        let a = ISSUED.master.derive_agent(index).expect("derive");
        let b = ISSUED.master.derive_agent(index).expect("derive");
        prop_assert_eq!(a.private_key_hex(), b.private_key_hex());
        prop_assert_eq!(a.address(), b.address());
        prop_assert_ne!(a.address(), ISSUED.master.address());
    }

    /// Tokens round-trip for arbitrary counters and labels.
    #[test]
    fn build_then_validate_is_valid(cnt in any::<u64>(), label in proptest::option::of("[ -~]{0,40}")) {
        let me = ISSUED.master.address().clone();
        let token = TokenBuilder::new(ISSUED.master.clone())
            .build(TokenParams::new(me.clone(), me.clone(), cnt).issued_at(NOW).label(label))
            .expect("token");
        prop_assert_eq!(
            validate_at(&token, &ISSUED.trust, NOW),
            ValidationOutcome::Valid { issuer: me }
        );
    }
}
