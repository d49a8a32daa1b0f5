//! Property-based tests for hashing, payouts and Merkle trees

use chrono::{DateTime, Utc};
use hashed_ledger::data::{LUnit, LedgerData, LuminosityData, PhysicalData};
use hashed_ledger::transaction::HashedTransaction;
use hashed_ledger::*;
use proptest::prelude::*;
use secp256k1::SecretKey;

fn hasher_strategy() -> impl Strategy<Value = Hashers> {
    prop::sample::select(Hashers::ALL.to_vec())
}

fn leaves(seeds: &[Vec<u8>]) -> Vec<Hash> {
    seeds.iter().map(|s| Hashers::Sha256.apply_hash(s)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_append_matches_rebuild(seeds in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..40), hasher in hasher_strategy()) {
        let leaves = leaves(&seeds);
        let mut incremental = MerkleTreeImpl::new(hasher);
        for leaf in &leaves {
            incremental.append(leaf);
        }
        let rebuilt = MerkleTreeImpl::from_items(hasher, &leaves);
        prop_assert_eq!(incremental.root(), rebuilt.root());
        prop_assert_eq!(incremental.collapsed_tree(), rebuilt.collapsed_tree());
        prop_assert_eq!(incremental.level_index(), rebuilt.level_index());
    }

    #[test]
    fn prop_storage_aware_root_matches_plain(seeds in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..8), 1..25)) {
        let leaves = leaves(&seeds);
        let mut aware = StorageAwareMerkleTree::new(MerkleTreeImpl::new(Hashers::Sha256));
        for leaf in &leaves {
            aware.append(leaf);
        }
        prop_assert_eq!(aware.root(), MerkleTreeImpl::from_items(Hashers::Sha256, &leaves).root());
    }

    #[test]
    fn prop_hashing_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 0..256), hasher in hasher_strategy()) {
        let a = hasher.apply_hash(&bytes);
        prop_assert_eq!(&a, &hasher.apply_hash(&bytes));
        prop_assert_eq!(a.len(), hasher.digest_len());
    }
}

fn signed(ledger: &Ledger, participant: u8, secs: i64, lum: u16) -> HashedTransaction {
    let data = PhysicalData::new(
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        LedgerData::Luminosity(LuminosityData { lum: Measurement::from(i64::from(lum)), unit: LUnit::Lux }),
        DataConstant::one(),
    );
    ledger.sign_transaction(&SecretKey::from_slice(&[participant; 32]).unwrap(), data).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_payout_is_conserved(events in prop::collection::vec((1u8..4, 1u16..1000), 1..12)) {
        let ledger = Ledger::new("prop", LedgerConfig::new(Hashers::Sha256, Encoders::Cbor)).unwrap();
        let mut coinbase = ledger.new_coinbase(Difficulty::one(), 1);
        let mut latest: [Option<HashedTransaction>; 4] = Default::default();

        for (step, (participant, lum)) in events.iter().enumerate() {
            let tx = signed(&ledger, *participant, step as i64 * 5, *lum);
            let slot = usize::from(*participant);
            coinbase.add_to_input(&tx, latest[slot].as_ref(), None).unwrap();
            latest[slot] = Some(tx);
            prop_assert_eq!(coinbase.payout(), &coinbase.outputs_total());
        }

        let contributors = latest.iter().filter(|t| t.is_some()).count();
        prop_assert_eq!(coinbase.output_count(), contributors);
        let links: usize = coinbase.outputs().map(|o| o.history().len()).sum();
        prop_assert_eq!(links, events.len());
    }

    #[test]
    fn prop_coinbase_hash_is_reproducible(lums in prop::collection::vec(1u16..500, 1..6)) {
        let ledger = Ledger::new("prop", LedgerConfig::new(Hashers::Sha3_256, Encoders::Json)).unwrap();
        let build = || {
            let mut coinbase = ledger.new_coinbase(Difficulty::one(), 4);
            let mut latest: Option<HashedTransaction> = None;
            for (i, lum) in lums.iter().enumerate() {
                let tx = signed(&ledger, 1, i as i64, *lum);
                coinbase.add_to_input(&tx, latest.as_ref(), None).unwrap();
                latest = Some(tx);
            }
            coinbase
        };
        let (a, b) = (build(), build());
        prop_assert_eq!(a.hash().unwrap(), b.hash().unwrap());

        let decoded = HashedCoinbase::decode(&a.encode().unwrap(), Hashers::Sha3_256, Encoders::Json).unwrap();
        prop_assert_eq!(decoded.hash().unwrap(), a.hash().unwrap());
    }
}
