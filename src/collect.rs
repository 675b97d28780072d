//! Drives the fetch loops and hands their output to the reconciler.
//!
//! Two entry paths share the same page loop: a fresh collection sorts and
//! paginates the run's own records and replaces the stored file, while a
//! top-up first asks how many pages the local dataset is behind, fetches
//! only those, and merges into the stored snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::category::SearchCategory;
use crate::client::{self, SearchPager};
use crate::error::ScrapeError;
use crate::extract;
use crate::reconcile::{self, SnapshotSource};
use crate::snapshot::{self, Record, Snapshot};

/// Upper bound on query groups fetching at the same time.
pub const MAX_CONCURRENT_GROUPS: usize = 5;

/// Records gathered by one fetch run, keyed by (query, page) in fetch
/// order. Lives only until the run's reconciliation; cleared per query.
#[derive(Debug, Default)]
pub struct RunAccumulator {
    data: Snapshot,
}

impl RunAccumulator {
    /// Store one page's records. Within a page the first occurrence of a
    /// URL wins; reconciliation handles cross-page duplicates later.
    pub fn store(&mut self, query: &str, page: u32, records: Vec<(String, Record)>) {
        let page_map = self
            .data
            .0
            .entry(query.to_string())
            .or_default()
            .entry(page)
            .or_default();
        for (url, record) in records {
            page_map.entry(url).or_insert(record);
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.0.clear();
    }
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub category: SearchCategory,
    pub start_page: u32,
    pub last_page: u32,
    pub default_pages: u32,
    pub min_delay: f64,
    pub max_delay: f64,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub category: SearchCategory,
    pub start_page: u32,
    pub default_pages: u32,
    pub min_delay: f64,
    pub max_delay: f64,
    pub add_pages: u32,
    pub data_dir: PathBuf,
}

/// Collect each query from scratch and replace its stored snapshot.
pub async fn collect_new(queries: &[String], opts: &CollectOptions) -> Result<()> {
    let mut accumulator = RunAccumulator::default();
    for query in queries {
        let remote_total =
            client::fetch_page_count(opts.category, query, opts.default_pages, None).await?;
        let last_page = opts.last_page.min(remote_total);
        info!(%query, remote_total, last_page, "starting fresh collection");

        run_query_loop(
            &mut accumulator,
            query,
            opts.category,
            opts.start_page,
            last_page,
            opts.min_delay,
            opts.max_delay,
        )
        .await?;

        // Fresh run: no stored data to merge, but the collected pages
        // still go through the same sort + re-pagination.
        let merged = reconcile::merge(&[accumulator.snapshot()]);
        let result = reconcile::paginate(reconcile::sort(merged)?);
        let path = snapshot::snapshot_path(&opts.data_dir, query);
        snapshot::save(&path, &result)?;
        info!(records = result.record_count(), "wrote {}", path.display());
        accumulator.clear();
    }
    Ok(())
}

/// Top up each query's stored snapshot with pages published since the
/// last run, then merge and re-paginate into the same file.
pub async fn collect_merge(queries: &[String], opts: &MergeOptions) -> Result<()> {
    let mut accumulator = RunAccumulator::default();
    for query in queries {
        let path = snapshot::snapshot_path(&opts.data_dir, query);
        let remote_total =
            client::fetch_page_count(opts.category, query, opts.default_pages, Some(opts.add_pages))
                .await?;
        let local_pages = reconcile::stored_page_count(&path)?;
        let last_page = pages_to_fetch(remote_total, local_pages);
        info!(%query, remote_total, local_pages, last_page, "topping up stored snapshot");

        // With nothing to fetch the loop body never runs; the merge and
        // rewrite below still do, same as any other run.
        run_query_loop(
            &mut accumulator,
            query,
            opts.category,
            opts.start_page,
            last_page,
            opts.min_delay,
            opts.max_delay,
        )
        .await?;

        let result = reconcile::reconcile_two(
            SnapshotSource::Memory(accumulator.snapshot()),
            SnapshotSource::Stored(&path),
        )?;
        snapshot::save(&path, &result)?;
        info!(records = result.record_count(), "merged into {}", path.display());
        accumulator.clear();
    }
    Ok(())
}

/// Run `collect_new` for several query groups at once, queries sequential
/// within each group. Rejects more than five groups before any request.
pub async fn collect_concurrent(groups: Vec<Vec<String>>, opts: &CollectOptions) -> Result<()> {
    validate_group_count(&groups)?;
    let mut handles = Vec::with_capacity(groups.len());
    for group in groups {
        let opts = opts.clone();
        handles.push(tokio::spawn(async move { collect_new(&group, &opts).await }));
    }
    for handle in handles {
        handle.await.context("query group task panicked")??;
    }
    Ok(())
}

fn validate_group_count(groups: &[Vec<String>]) -> Result<(), ScrapeError> {
    if groups.len() > MAX_CONCURRENT_GROUPS {
        return Err(ScrapeError::TooManyGroups(groups.len()));
    }
    Ok(())
}

/// Pages a top-up run must fetch: the margin-padded remote count minus
/// what the local snapshot already covers, floored at zero.
fn pages_to_fetch(remote_total: u32, local_pages: usize) -> u32 {
    (i64::from(remote_total) - local_pages as i64).max(0) as u32
}

async fn run_query_loop(
    accumulator: &mut RunAccumulator,
    query: &str,
    category: SearchCategory,
    start_page: u32,
    last_page: u32,
    min_delay: f64,
    max_delay: f64,
) -> Result<()> {
    let mut pager = SearchPager::new(category, query, start_page, last_page, min_delay, max_delay)?;

    let planned = if last_page >= start_page { last_page - start_page + 1 } else { 0 };
    let pb = ProgressBar::new(u64::from(planned));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (eta {eta}) {msg}")?
            .progress_chars("#>-"),
    );

    while let Some(yielded) = pager.next_page().await? {
        match yielded.body.as_deref() {
            Some(body) => {
                // Extractor failures mean the page layout changed under
                // us; no point continuing this query.
                let records = extract::extract_results(category, body)?;
                accumulator.store(query, yielded.page, records);
            }
            None => warn!(%query, page = yielded.page, "no content for page, treated as empty"),
        }

        let remote = yielded
            .remote_last_page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        pb.set_message(format!(
            "{query} · delay {:.2}s · remote last page {remote}",
            yielded.delay.as_secs_f64()
        ));
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::cpu_record;

    #[test]
    fn accumulator_keeps_first_record_per_url() {
        let (url, first) = cpu_record(100);
        let mut second = first.clone();
        if let Record::Cpu(ref mut cpu) = second {
            cpu.core_scores.single = 1;
        }

        let mut accumulator = RunAccumulator::default();
        accumulator.store("q", 1, vec![(url.clone(), first.clone())]);
        accumulator.store("q", 1, vec![(url.clone(), second)]);

        assert_eq!(accumulator.snapshot().0["q"][&1][&url], first);
        assert_eq!(accumulator.snapshot().record_count(), 1);
    }

    #[test]
    fn accumulator_separates_pages_and_clears() {
        let mut accumulator = RunAccumulator::default();
        accumulator.store("q", 1, vec![cpu_record(2)]);
        accumulator.store("q", 2, vec![cpu_record(1)]);
        assert_eq!(accumulator.snapshot().0["q"].len(), 2);

        accumulator.clear();
        assert!(accumulator.snapshot().is_empty());
    }

    #[test]
    fn up_to_date_snapshot_needs_no_pages() {
        // Local already covers the padded remote count.
        assert_eq!(pages_to_fetch(10, 10), 0);
        assert_eq!(pages_to_fetch(10, 12), 0);
        assert_eq!(pages_to_fetch(12, 4), 8);
        assert_eq!(pages_to_fetch(0, 0), 0);
    }

    #[test]
    fn six_groups_rejected_five_accepted() {
        let group = |name: &str| vec![name.to_string()];
        let six: Vec<_> = (0..6).map(|i| group(&format!("q{i}"))).collect();
        let err = validate_group_count(&six).unwrap_err();
        assert!(matches!(err, ScrapeError::TooManyGroups(6)));

        let five: Vec<_> = (0..5).map(|i| group(&format!("q{i}"))).collect();
        assert!(validate_group_count(&five).is_ok());
    }
}
