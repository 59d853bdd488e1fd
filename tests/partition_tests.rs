use buenarda::commoncrawl::{CdxEntry, CdxMetadata};
use buenarda::locale::LocaleFilter;
use buenarda::shard::{Shard, ShardPlanner};

fn entry(url: &str, offset: u64) -> CdxEntry {
    CdxEntry {
        surt_url: url.to_string(),
        timestamp: "20240722120756".to_string(),
        metadata: CdxMetadata {
            url: url.to_string(),
            status: 200,
            length: 100,
            offset,
            filename: "crawl-data/segments/test.warc.gz".to_string(),
            digest: None,
            languages: None,
        },
    }
}

fn plan(entries: &[CdxEntry], pattern: &str, size: usize) -> Vec<Shard> {
    let filter = LocaleFilter::new(pattern);
    let mut planner = ShardPlanner::new("CC-MAIN-2024-30", size);
    let mut shards = Vec::new();
    for e in entries {
        if filter.matches_record(e) {
            if let Some(shard) = planner.push(e.clone()) {
                shards.push(shard);
            }
        }
    }
    shards.extend(planner.finish());
    shards
}

fn ten_records_four_argentinian() -> Vec<CdxEntry> {
    (0..10)
        .map(|i| {
            let url = if i % 3 == 0 {
                format!("https://site{i}.com.ar/page")
            } else {
                format!("https://site{i}.example.com/page")
            };
            entry(&url, i * 1000)
        })
        .collect()
}

#[test]
fn example_scenario_four_matches_shard_size_two() {
    let shards = plan(&ten_records_four_argentinian(), "*.ar", 2);
    assert_eq!(shards.len(), 2);
    assert!(shards.iter().all(|s| s.records.len() == 2));
}

#[test]
fn every_filtered_record_lands_in_exactly_one_shard() {
    let records = ten_records_four_argentinian();
    let shards = plan(&records, "*.ar", 3);
    let placed: Vec<&str> = shards
        .iter()
        .flat_map(|s| s.records.iter().map(|r| r.metadata.url.as_str()))
        .collect();
    let expected: Vec<&str> = records
        .iter()
        .filter(|r| r.metadata.url.contains(".com.ar"))
        .map(|r| r.metadata.url.as_str())
        .collect();
    // Completeness and disjointness in scan order.
    assert_eq!(placed, expected);
}

#[test]
fn partitioning_is_deterministic_across_runs() {
    let records = ten_records_four_argentinian();
    let first = plan(&records, "*.ar", 2);
    let second = plan(&records, "*.ar", 2);
    let boundaries = |shards: &[Shard]| -> Vec<(String, Vec<String>)> {
        shards
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    s.records.iter().map(|r| r.metadata.url.clone()).collect(),
                )
            })
            .collect()
    };
    assert_eq!(boundaries(&first), boundaries(&second));
}

#[test]
fn final_short_shard_is_flushed() {
    let records: Vec<_> = (0..5)
        .map(|i| entry(&format!("https://s{i}.com.ar/"), i))
        .collect();
    let shards = plan(&records, "*.ar", 2);
    assert_eq!(shards.len(), 3);
    assert_eq!(shards[2].records.len(), 1);
}

#[test]
fn shard_ids_are_stable_and_job_name_safe() {
    let shards = plan(&ten_records_four_argentinian(), "*.ar", 2);
    assert_eq!(shards[0].id, "cc-main-2024-30-00000");
    assert_eq!(shards[1].id, "cc-main-2024-30-00001");
}
