use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Records of one stored page, keyed by result URL, in descending-ID order.
pub type PageMap = IndexMap<String, Record>;

/// Pages of one query, keyed by 1-based page number. Serialized with string
/// keys, matching the stored file format.
pub type QueryPages = BTreeMap<u32, PageMap>;

/// The full on-disk dataset shape: query → page → result URL → fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(pub IndexMap<String, QueryPages>);

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of records across all queries and pages.
    pub fn record_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|pages| pages.values())
            .map(|page| page.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub device_name: String,
    pub cpu_model: String,
}

/// Upload date as shown on the listing, plus its decomposed components.
/// All components are null when the source text carries no parseable date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDate {
    pub default: String,
    pub parsed: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuScores {
    pub single: i64,
    pub multi: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuScores {
    pub api_name: String,
    pub api_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiScores {
    pub single_precision: i64,
    pub half_precision: i64,
    pub quantized: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuRecord {
    pub system: SystemInfo,
    pub upload_date: UploadDate,
    pub platform: String,
    pub core_scores: CpuScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuRecord {
    pub system: SystemInfo,
    pub upload_date: UploadDate,
    pub platform: String,
    pub core_scores: GpuScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecord {
    pub system: SystemInfo,
    pub framework_name: String,
    pub core_scores: AiScores,
}

/// One benchmark result. The three listing categories store different
/// score shapes; the untagged representation keeps the JSON identical to
/// what each category's extractor produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Cpu(CpuRecord),
    Gpu(GpuRecord),
    Ai(AiRecord),
}

/// Storage location for one query's dataset.
pub fn snapshot_path(data_dir: &Path, query: &str) -> PathBuf {
    data_dir.join(format!("{query}_1.json"))
}

/// Load a stored snapshot. A missing file reads as the empty snapshot so
/// first runs and top-up runs share one code path.
pub fn load(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))
}

/// Write a snapshot as pretty-printed UTF-8 JSON, replacing the whole file.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, text)
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}

/// Test fixture shared across modules: a plausible CPU record keyed by ID.
#[cfg(test)]
pub(crate) fn cpu_record(id: u64) -> (String, Record) {
    let url = format!("https://browser.geekbench.com/v6/cpu/{id}");
    let record = Record::Cpu(CpuRecord {
        system: SystemInfo {
            device_name: "Samsung SM-S928N".to_string(),
            cpu_model: "Samsung Exynos 2400".to_string(),
        },
        upload_date: UploadDate {
            default: "Feb 17, 2025".to_string(),
            parsed: Some("2025-02-17".to_string()),
            year: Some(2025),
            month: Some(2),
            day: Some(17),
        },
        platform: "Android".to_string(),
        core_scores: CpuScores { single: 2193, multi: 6881 },
    });
    (url, record)
}
