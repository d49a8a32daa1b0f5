//! Tests for error paths and edge cases

use chrono::{DateTime, Utc};
use hashed_ledger::data::{LUnit, LedgerData, LuminosityData, PhysicalData};
use hashed_ledger::storage::{DataResult, LuminosityStorageAdapter, SchemaProvider, StorageAdapter, StorageValue};
use hashed_ledger::transaction::HashedTransaction;
use hashed_ledger::*;
use secp256k1::SecretKey;

fn reading(secs: i64, lum: i64) -> PhysicalData {
    PhysicalData::new(
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        LedgerData::Luminosity(LuminosityData { lum: Measurement::from(lum), unit: LUnit::Lumens }),
        DataConstant::one(),
    )
}

fn ledger() -> Ledger {
    Ledger::new("errors", LedgerConfig::new(Hashers::Sha256, Encoders::Json)).unwrap()
}

#[test]
fn test_invalid_configurations() {
    let config = LedgerConfig::new(Hashers::Sha256, Encoders::Cbor);

    let mut params = CoinbaseParams::default();
    params.dividing_threshold = 0;
    assert!(matches!(config.clone().with_coinbase_params(params), Err(LedgerError::InvalidConfig(_))));

    let mut params = CoinbaseParams::default();
    params.time_base_millis = 0;
    assert!(matches!(config.clone().with_coinbase_params(params), Err(LedgerError::InvalidConfig(_))));

    let foreign = LedgerParams::for_hasher(Hashers::Sha3_512);
    assert!(matches!(config.clone().with_ledger_params(foreign), Err(LedgerError::InvalidConfig(_))));

    let mut unknown = LedgerParams::for_hasher(Hashers::Sha256);
    unknown.crypter = Hash::new(vec![0xab; 64]);
    assert!(matches!(config.with_ledger_params(unknown), Err(LedgerError::UnknownHasher(_))));

    assert!(LedgerConfig::from_json("{ \"hasher\": \"md5\", \"encoder\": \"cbor\" }").is_err());
}

#[test]
fn test_zero_baseline_is_reported() {
    let ledger = ledger();
    let key = SecretKey::from_slice(&[5u8; 32]).unwrap();
    let mut coinbase = ledger.new_coinbase(Difficulty::one(), 1);
    let dark = ledger.sign_transaction(&key, reading(0, 0)).unwrap();
    let lit = ledger.sign_transaction(&key, reading(1, 10)).unwrap();
    coinbase.add_to_input(&dark, None, None).unwrap();
    assert!(matches!(
        coinbase.add_to_input(&lit, Some(&dark), None),
        Err(LedgerError::ZeroBaseline(_))
    ));
    assert_eq!(coinbase.payout(), &coinbase.outputs_total());
}

#[test]
#[should_panic(expected = "another participant")]
fn test_foreign_latest_known_panics() {
    let ledger = ledger();
    let mut coinbase = ledger.new_coinbase(Difficulty::one(), 1);
    let mine = ledger.sign_transaction(&SecretKey::from_slice(&[1u8; 32]).unwrap(), reading(0, 1)).unwrap();
    let theirs = ledger.sign_transaction(&SecretKey::from_slice(&[2u8; 32]).unwrap(), reading(0, 1)).unwrap();
    let _ = coinbase.add_to_input(&mine, Some(&theirs), None);
}

#[test]
fn test_stale_transaction_hash_is_rejected() {
    let ledger = ledger();
    let tx = ledger.sign_transaction(&SecretKey::from_slice(&[3u8; 32]).unwrap(), reading(0, 7)).unwrap();
    let mut json: serde_json::Value = serde_json::from_slice(&tx.encode(Encoders::Json).unwrap()).unwrap();
    json["hash"] = serde_json::Value::String(Hashers::Sha256.apply_hash(b"stale").to_hex());
    let bytes = serde_json::to_vec(&json).unwrap();
    assert!(matches!(
        HashedTransaction::decode(&bytes, Hashers::Sha256, Encoders::Json),
        Err(LedgerError::HashMismatch { .. })
    ));
}

#[test]
fn test_unknown_formula_digest_is_rejected() {
    let ledger = ledger();
    let coinbase = ledger.new_coinbase(Difficulty::one(), 3);
    let mut json: serde_json::Value = serde_json::from_slice(&coinbase.encode().unwrap()).unwrap();
    json["coinbase"]["formula"] = serde_json::Value::String(Hashers::Sha3_512.apply_hash(b"Other").to_hex());
    let bytes = serde_json::to_vec(&json).unwrap();
    assert!(HashedCoinbase::decode(&bytes, Hashers::Sha256, Encoders::Json).is_err());
}

#[test]
fn test_storage_load_reports_instead_of_failing() {
    let adapter = LuminosityStorageAdapter;
    let element = adapter.element(vec![
        ("lum", StorageValue::Decimal(bigdecimal::BigDecimal::from(10))),
        ("unit", StorageValue::Integer(-1)),
    ]);
    assert!(matches!(adapter.load(&element), DataResult::UnrecognizedUnit(_)));
    assert!(!adapter.load(&element).is_success());
}

#[test]
fn test_empty_merkle_tree() {
    let tree = ledger().new_merkle_tree();
    assert_eq!(tree.root(), Hash::empty());
    assert!(tree.proof_for(&Hash::empty()).is_none());
    assert!(tree.verify_block_transactions::<HashedTransaction>(&[]));
}
