//! A coinbase shared between threads behind a lock

use std::sync::{Arc, RwLock};
use std::thread;

use chrono::{DateTime, Utc};
use hashed_ledger::data::{LUnit, LedgerData, LuminosityData, PhysicalData};
use hashed_ledger::*;
use secp256k1::SecretKey;

#[test]
fn test_shared_coinbase_writers_and_readers() {
    let ledger = Arc::new(Ledger::new("shared", LedgerConfig::new(Hashers::Sha256, Encoders::Cbor)).unwrap());
    let coinbase: SharedCoinbase = Arc::new(RwLock::new(ledger.new_coinbase(Difficulty::one(), 1)));

    let writers: Vec<_> = (1u8..=4)
        .map(|participant| {
            let ledger = Arc::clone(&ledger);
            let coinbase = Arc::clone(&coinbase);
            thread::spawn(move || {
                let key = SecretKey::from_slice(&[participant; 32]).unwrap();
                let mut latest = None;
                for step in 0..5i64 {
                    let data = PhysicalData::new(
                        DateTime::<Utc>::from_timestamp(step * 10, 0).unwrap(),
                        LedgerData::Luminosity(LuminosityData {
                            lum: Measurement::from(100 + step * i64::from(participant)),
                            unit: LUnit::Lux,
                        }),
                        DataConstant::one(),
                    );
                    let tx = ledger.sign_transaction(&key, data).unwrap();
                    coinbase.write().unwrap().add_to_input(&tx, latest.as_ref(), None).unwrap();
                    latest = Some(tx);
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let coinbase = Arc::clone(&coinbase);
            thread::spawn(move || {
                for _ in 0..20 {
                    let guard = coinbase.read().unwrap();
                    // A reader sees either the state before or after an ingestion
                    assert_eq!(guard.payout(), &guard.outputs_total());
                    let first = guard.hash().unwrap();
                    assert_eq!(guard.hash().unwrap(), first);
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let guard = coinbase.read().unwrap();
    assert_eq!(guard.output_count(), 4);
    assert!(guard.outputs().all(|o| o.history().len() == 5));
    assert_eq!(guard.payout(), &guard.outputs_total());
}
