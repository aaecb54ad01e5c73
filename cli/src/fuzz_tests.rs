//! Property-based tests for commitments, proofs and fees
//!
//! Properties tested:
//! - Derivation is deterministic given the secret
//! - Distinct secrets give distinct commitments and nullifiers
//! - The opening verifier accepts honest proofs and rejects redirected ones
//! - Fee law: output is input * 0.99 truncated to six places, and input = output + fee
//! - Decimal parsing and formatting agree at six places

#[cfg(test)]
mod property_tests {
    use std::ops::Range;

    use proptest::prelude::*;
    use zk_ledger::{Address, Amount, Hash32, OpeningVerifier, Verifier, WithdrawalInputs};

    use crate::crypto::{derive, Secret};
    use crate::fee::{format_units, parse_units, FeeCalculator, FeeError};

    const UNIT: u128 = 1_000_000_000_000_000_000;
    const STEP: Amount = Amount::from_limbs([1_000_000_000_000, 0, 0, 0]);

    fn amount_in(range: Range<u128>) -> impl Strategy<Value = Amount> {
        range.prop_map(|n| Amount::from(n))
    }

    /// Any non-zero 256-bit amount
    fn any_amount() -> impl Strategy<Value = Amount> {
        prop::array::uniform32(any::<u8>())
            .prop_map(|bytes: [u8; 32]| Amount::from_be_bytes(bytes))
            .prop_filter("non-zero amount", |amount| !amount.is_zero())
    }

    fn arbitrary_secret() -> impl Strategy<Value = [u8; 32]> {
        prop::array::uniform32(any::<u8>())
    }

    fn nonzero_address() -> impl Strategy<Value = Address> {
        prop::array::uniform20(any::<u8>())
            .prop_filter("non-zero address", |bytes| bytes.iter().any(|&b| b != 0))
            .prop_map(Address::new)
    }

    fn distinct_secrets() -> impl Strategy<Value = ([u8; 32], [u8; 32])> {
        (arbitrary_secret(), arbitrary_secret()).prop_filter("distinct secrets", |(a, b)| a != b)
    }

    proptest! {
        #[test]
        fn prop_derivation_is_deterministic(
            secret in arbitrary_secret(),
            amount in any_amount(),
            recipient in nonzero_address(),
        ) {
            let a = derive(Secret::from_bytes(secret), amount, &recipient).unwrap();
            let b = derive(Secret::from_bytes(secret), amount, &recipient).unwrap();
            prop_assert_eq!(a.commitment, b.commitment);
            prop_assert_eq!(a.nullifier_hash, b.nullifier_hash);
            prop_assert_eq!(a.proof, b.proof);
        }

        #[test]
        fn prop_distinct_secrets_distinct_commitments(
            (first, second) in distinct_secrets(),
            amount in amount_in(1..1_000_000 * UNIT),
            recipient in nonzero_address(),
        ) {
            let a = derive(Secret::from_bytes(first), amount, &recipient).unwrap();
            let b = derive(Secret::from_bytes(second), amount, &recipient).unwrap();
            prop_assert_ne!(a.commitment, b.commitment);
            prop_assert_ne!(a.nullifier_hash, b.nullifier_hash);
        }

        #[test]
        fn prop_nullifier_ignores_amount(
            secret in arbitrary_secret(),
            first in amount_in(1..UNIT),
            second in amount_in(1..UNIT),
            recipient in nonzero_address(),
        ) {
            prop_assume!(first != second);
            let a = derive(Secret::from_bytes(secret), first, &recipient).unwrap();
            let b = derive(Secret::from_bytes(secret), second, &recipient).unwrap();
            prop_assert_eq!(a.nullifier_hash, b.nullifier_hash);
            prop_assert_ne!(a.commitment, b.commitment);
        }

        #[test]
        fn prop_opening_verifier_binds_recipient(
            secret in arbitrary_secret(),
            amount in amount_in(1..1_000 * UNIT),
            recipient in nonzero_address(),
            other in nonzero_address(),
        ) {
            let note = derive(Secret::from_bytes(secret), amount, &recipient).unwrap();
            let verifier = OpeningVerifier::new(Address::new([0x78; 20]));

            let honest = WithdrawalInputs {
                amount: amount - amount / Amount::from(100),
                recipient,
                nullifier_hash: note.nullifier_hash,
            };
            prop_assert!(verifier.verify(&honest, note.proof.as_bytes()));

            let inflated = WithdrawalInputs { amount: amount + Amount::from(1), ..honest };
            prop_assert!(!verifier.verify(&inflated, note.proof.as_bytes()));

            let forged = WithdrawalInputs { nullifier_hash: Hash32::new(secret), ..honest };
            prop_assume!(forged.nullifier_hash != note.nullifier_hash);
            prop_assert!(!verifier.verify(&forged, note.proof.as_bytes()));

            if other != recipient {
                let redirected = WithdrawalInputs { recipient: other, ..honest };
                prop_assert!(!verifier.verify(&redirected, note.proof.as_bytes()));
            }
        }

        #[test]
        fn prop_fee_law(input in amount_in(1..1_000_000_000 * UNIT)) {
            let exact = input * Amount::from(99) / Amount::from(100);
            match FeeCalculator::default().quote(input, 18) {
                Ok(quote) => {
                    prop_assert_eq!(quote.output, exact - exact % STEP);
                    prop_assert_eq!(quote.input, quote.output + quote.fee);
                    prop_assert!(!quote.output.is_zero());
                    prop_assert!(quote.fee >= input / Amount::from(100));
                }
                Err(e) => {
                    prop_assert_eq!(e, FeeError::NonPositiveOutput { input });
                    prop_assert!(exact < STEP);
                }
            }
        }

        #[test]
        fn prop_six_place_amounts_roundtrip(whole in 0u64..1_000_000, frac in 0u32..1_000_000) {
            let text = format!("{}.{:06}", whole, frac);
            let amount = parse_units(&text, 18).unwrap();
            prop_assert_eq!(format_units(amount, 18, 6), text);
        }
    }
}
