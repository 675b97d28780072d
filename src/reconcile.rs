//! Merge, sort and re-paginate stored result sets.
//!
//! Listings shift between fetch sessions as new results are published, so
//! page numbers are never trusted as identity: every reconciliation
//! flattens its inputs to plain (query, URL) keys, re-sorts by the numeric
//! ID at the end of each URL, and rebuilds pages from scratch. Running the
//! pipeline over its own output yields the same structure again.

use std::path::Path;

use anyhow::Result;
use indexmap::IndexMap;

use crate::error::ScrapeError;
use crate::snapshot::{self, Record, Snapshot};

/// Fixed capacity of a stored page.
pub const PAGE_CAPACITY: usize = 25;

/// Query → record URL → fields, with the page dimension flattened away.
pub type Merged = IndexMap<String, IndexMap<String, Record>>;

/// Either side of a reconciliation: an in-memory snapshot or the path of
/// a stored one. A missing file resolves to the empty snapshot.
#[derive(Debug, Clone, Copy)]
pub enum SnapshotSource<'a> {
    Memory(&'a Snapshot),
    Stored(&'a Path),
}

impl SnapshotSource<'_> {
    fn resolve(self) -> Result<Snapshot> {
        match self {
            SnapshotSource::Memory(snapshot) => Ok(snapshot.clone()),
            SnapshotSource::Stored(path) => snapshot::load(path),
        }
    }
}

/// Flatten any number of snapshots into one record set per query. On a key
/// collision the later source wins, so source order decides precedence.
pub fn merge(sources: &[&Snapshot]) -> Merged {
    let mut merged = Merged::new();
    for source in sources {
        for (query, pages) in &source.0 {
            let records = merged.entry(query.clone()).or_default();
            for page in pages.values() {
                for (url, fields) in page {
                    records.insert(url.clone(), fields.clone());
                }
            }
        }
    }
    merged
}

/// Order every query's records by the trailing integer of the URL key,
/// highest first. Fails on the first key without a numeric tail.
pub fn sort(merged: Merged) -> Result<Merged, ScrapeError> {
    let mut sorted = Merged::with_capacity(merged.len());
    for (query, records) in merged {
        let mut entries = records
            .into_iter()
            .map(|(url, fields)| {
                let id = record_id(&url)?;
                Ok((id, url, fields))
            })
            .collect::<Result<Vec<_>, ScrapeError>>()?;
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        sorted.insert(
            query,
            entries.into_iter().map(|(_, url, fields)| (url, fields)).collect(),
        );
    }
    Ok(sorted)
}

/// Rebuild the page structure from a sorted record set: pages of 25,
/// numbered from 1, counter reset per query, no gaps.
pub fn paginate(sorted: Merged) -> Snapshot {
    let mut snapshot = Snapshot::default();
    for (query, records) in sorted {
        let pages = snapshot.0.entry(query).or_default();
        let mut page_number = 0u32;
        for (count, (url, fields)) in records.into_iter().enumerate() {
            if count % PAGE_CAPACITY == 0 {
                page_number += 1;
            }
            pages.entry(page_number).or_default().insert(url, fields);
        }
    }
    snapshot
}

/// Merge a fresh fetch into an existing dataset and re-paginate.
///
/// Sources are applied new-then-old: on a key collision the stored
/// record survives, not the freshly fetched copy.
pub fn reconcile_two(new: SnapshotSource<'_>, old: SnapshotSource<'_>) -> Result<Snapshot> {
    let new = new.resolve()?;
    let old = old.resolve()?;
    let merged = merge(&[&new, &old]);
    Ok(paginate(sort(merged)?))
}

/// Number of distinct pages across all queries of a snapshot, the local
/// half of the "how many pages are we behind" estimate.
pub fn total_page_count(snapshot: &Snapshot) -> usize {
    snapshot.0.values().map(|pages| pages.len()).sum()
}

/// `total_page_count` for a stored snapshot; a missing file counts as 0.
pub fn stored_page_count(path: &Path) -> Result<usize> {
    Ok(total_page_count(&snapshot::load(path)?))
}

fn record_id(url: &str) -> Result<u64, ScrapeError> {
    url.rsplit('/')
        .next()
        .and_then(|segment| segment.parse::<u64>().ok())
        .ok_or_else(|| ScrapeError::MalformedKey(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::cpu_record;

    /// Snapshot with one query holding the given IDs, one record per
    /// insertion order, bucketed naively into pages of 25.
    fn snapshot_of(query: &str, ids: &[u64]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let pages = snapshot.0.entry(query.to_string()).or_default();
        for (i, id) in ids.iter().enumerate() {
            let (url, record) = cpu_record(*id);
            pages
                .entry(i as u32 / PAGE_CAPACITY as u32 + 1)
                .or_default()
                .insert(url, record);
        }
        snapshot
    }

    fn sorted_ids(merged: &Merged, query: &str) -> Vec<u64> {
        merged[query]
            .keys()
            .map(|url| record_id(url).unwrap())
            .collect()
    }

    #[test]
    fn pagination_is_idempotent() {
        let ids: Vec<u64> = (1..=60).collect();
        let first = paginate(sort(merge(&[&snapshot_of("q", &ids)])).unwrap());
        let second = paginate(sort(merge(&[&first])).unwrap());
        // Compare serialized form so ordering differences would show up.
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn merging_a_subset_adds_nothing() {
        let a = snapshot_of("q", &(1..=30).collect::<Vec<_>>());
        let b = snapshot_of("q", &[3, 7, 21]);
        let merged = merge(&[&a, &b]);
        assert_eq!(merged["q"].len(), 30);
    }

    #[test]
    fn sort_orders_by_descending_trailing_id() {
        let merged = sort(merge(&[&snapshot_of("q", &[5, 900, 17, 430, 2])])).unwrap();
        let ids = sorted_ids(&merged, "q");
        assert_eq!(ids, vec![900, 430, 17, 5, 2]);
        assert!(ids.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn twenty_six_records_split_25_plus_1() {
        let ids: Vec<u64> = (1..=26).collect();
        let result = paginate(sort(merge(&[&snapshot_of("q", &ids)])).unwrap());
        let pages = &result.0["q"];
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&1].len(), 25);
        assert_eq!(pages[&2].len(), 1);
        // Page 1 holds the 25 highest IDs; the single lowest lands on page 2.
        assert!(pages[&1].keys().all(|url| record_id(url).unwrap() >= 2));
        assert_eq!(record_id(pages[&2].keys().next().unwrap()).unwrap(), 1);
    }

    #[test]
    fn page_counters_reset_per_query() {
        let mut combined = snapshot_of("first", &(1..=26).collect::<Vec<_>>());
        let other = snapshot_of("second", &[101, 102, 103]);
        combined.0.extend(other.0);

        let result = paginate(sort(merge(&[&combined])).unwrap());
        assert_eq!(result.0["first"].len(), 2);
        let second = &result.0["second"];
        assert_eq!(second.len(), 1);
        assert_eq!(second[&1].len(), 3);
    }

    #[test]
    fn stored_record_wins_over_fresh_copy() {
        let (url, record) = cpu_record(100);
        let mut fresh_copy = record.clone();
        if let Record::Cpu(ref mut cpu) = fresh_copy {
            cpu.system.device_name = "renamed upstream".to_string();
        }

        let mut old = snapshot_of("q", &[99]);
        old.0
            .get_mut("q")
            .unwrap()
            .get_mut(&1)
            .unwrap()
            .insert(url.clone(), record.clone());

        let mut new = Snapshot::default();
        new.0
            .entry("q".to_string())
            .or_default()
            .entry(1)
            .or_default()
            .insert(url.clone(), fresh_copy);

        let result =
            reconcile_two(SnapshotSource::Memory(&new), SnapshotSource::Memory(&old)).unwrap();
        let pages = &result.0["q"];
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[&1].len(), 2);
        assert_eq!(pages[&1][&url], record);
        let ids: Vec<u64> = pages[&1].keys().map(|u| record_id(u).unwrap()).collect();
        assert_eq!(ids, vec![100, 99]);
    }

    #[test]
    fn malformed_key_fails_the_sort() {
        let mut snapshot = snapshot_of("q", &[10]);
        let (_, record) = cpu_record(10);
        snapshot.0.get_mut("q").unwrap().get_mut(&1).unwrap().insert(
            "https://browser.geekbench.com/v6/cpu/not-a-number".to_string(),
            record,
        );
        let err = sort(merge(&[&snapshot])).unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedKey(ref key) if key.ends_with("not-a-number")));
    }

    #[test]
    fn total_page_count_sums_queries() {
        let mut combined = snapshot_of("a", &(1..=60).collect::<Vec<_>>());
        combined.0.extend(snapshot_of("b", &[1, 2]).0);
        assert_eq!(total_page_count(&combined), 4);
        assert_eq!(total_page_count(&Snapshot::default()), 0);
    }

    #[test]
    fn missing_file_counts_zero_pages() {
        let path = std::env::temp_dir().join("gb_scraper_missing_count.json");
        assert_eq!(stored_page_count(&path).unwrap(), 0);
    }
}
