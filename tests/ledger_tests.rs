use buenarda::ledger::{Claim, DedupKey, DedupLedger};

#[test]
fn record_then_seen_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DedupLedger::open(dir.path()).unwrap();
    let key = DedupKey::new(Some("DIGEST1"), "https://example.ar/");
    assert!(!ledger.seen(&key).unwrap());
    assert_eq!(ledger.record(&key, "shard-a").unwrap(), Claim::Recorded);
    assert!(ledger.seen(&key).unwrap());
    assert_eq!(ledger.entries().unwrap(), 1);
}

#[test]
fn second_claim_for_same_key_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DedupLedger::open(dir.path()).unwrap();
    let key = DedupKey::new(None, "https://example.ar/page");
    assert_eq!(ledger.record(&key, "shard-a").unwrap(), Claim::Recorded);
    assert_eq!(ledger.record(&key, "shard-b").unwrap(), Claim::Conflict);
    assert_eq!(ledger.entries().unwrap(), 1);
}

#[test]
fn exactly_one_of_many_concurrent_claims_wins() {
    let dir = tempfile::tempdir().unwrap();
    let key = DedupKey::new(Some("RACEDIGEST"), "https://example.ar/");
    let recorded: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let path = dir.path().to_path_buf();
                let key = key.clone();
                scope.spawn(move || {
                    let ledger = DedupLedger::open(path).unwrap();
                    matches!(
                        ledger.record(&key, &format!("shard-{i}")).unwrap(),
                        Claim::Recorded
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count()
    });
    assert_eq!(recorded, 1);
    let ledger = DedupLedger::open(dir.path()).unwrap();
    assert_eq!(ledger.entries().unwrap(), 1);
}

#[test]
fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = DedupKey::new(Some("PERSIST"), "https://example.ar/");
    {
        let ledger = DedupLedger::open(dir.path()).unwrap();
        ledger.record(&key, "shard-a").unwrap();
    }
    let reopened = DedupLedger::open(dir.path()).unwrap();
    assert!(reopened.seen(&key).unwrap());
    assert_eq!(reopened.record(&key, "shard-b").unwrap(), Claim::Conflict);
}

#[test]
fn distinct_keys_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = DedupLedger::open(dir.path()).unwrap();
    let a = DedupKey::new(Some("AAA"), "https://a.ar/");
    let b = DedupKey::new(Some("BBB"), "https://a.ar/");
    let c = DedupKey::new(None, "https://a.ar/");
    for key in [&a, &b, &c] {
        assert_eq!(ledger.record(key, "shard-a").unwrap(), Claim::Recorded);
    }
    assert_eq!(ledger.entries().unwrap(), 3);
}
