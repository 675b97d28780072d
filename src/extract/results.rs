use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::category::SearchCategory;
use crate::snapshot::{
    AiRecord, AiScores, CpuRecord, CpuScores, GpuRecord, GpuScores, Record, SystemInfo,
};

use super::dates;

const RESULT_URL_BASE: &str = "https://browser.geekbench.com";

// CPU and GPU listings share one row layout: a device column followed by
// text/score columns. AI results render as a table instead.
static LISTING_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.col-12.col-lg-9 > div:nth-child(2) > div").unwrap());
static DEVICE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.col-12.col-lg-4 > a").unwrap());
static DEVICE_MODEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.list-col-model").unwrap());
static UPLOAD_DATE_COL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div:nth-child(2) > span.list-col-text").unwrap());
static PLATFORM_COL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div:nth-child(3) > span.list-col-text").unwrap());
static API_NAME_COL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div:nth-child(4) > span.list-col-text").unwrap());
static SCORE_COL_4: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div:nth-child(4) > span.list-col-text-score").unwrap());
static SCORE_COL_5: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div:nth-child(5) > span.list-col-text-score").unwrap());

static TABLE_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.banff table > tbody > tr").unwrap());
static TABLE_DEVICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.device > a").unwrap());
static TABLE_FRAMEWORK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.framework").unwrap());
static TABLE_SINGLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td:nth-child(3)").unwrap());
static TABLE_HALF: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td:nth-child(4)").unwrap());
static TABLE_QUANT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td:nth-child(5)").unwrap());

// AI device cells carry "device name\n\nprocessor model" in one link.
static DEVICE_AND_MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.+?)\n\n(.+)$").unwrap());

/// Pull every result row out of a search page. Selector or shape
/// mismatches are errors; callers decide what a failed page aborts.
pub fn extract_results(category: SearchCategory, body: &str) -> Result<Vec<(String, Record)>> {
    let document = Html::parse_document(body);
    match category {
        SearchCategory::Cpu | SearchCategory::Gpu => extract_listing(&document, category),
        SearchCategory::Ai => extract_table(&document),
    }
}

fn extract_listing(document: &Html, category: SearchCategory) -> Result<Vec<(String, Record)>> {
    let mut results = Vec::new();
    for row in document.select(&LISTING_ROW) {
        let link = row
            .select(&DEVICE_LINK)
            .next()
            .context("result row has no device link")?;
        let href = link.value().attr("href").context("device link has no href")?;
        let url = format!("{RESULT_URL_BASE}{href}");

        let system = SystemInfo {
            device_name: text_of(link).trim().to_string(),
            cpu_model: select_text(row, &DEVICE_MODEL, "processor model")?
                .replace('\n', " ")
                .trim()
                .to_string(),
        };
        let upload_date = dates::upload_date(&select_text(row, &UPLOAD_DATE_COL, "upload date")?);
        let platform = select_text(row, &PLATFORM_COL, "platform")?.trim().to_string();

        let record = if category == SearchCategory::Gpu {
            Record::Gpu(GpuRecord {
                system,
                upload_date,
                platform,
                core_scores: GpuScores {
                    api_name: select_text(row, &API_NAME_COL, "api name")?.trim().to_string(),
                    api_score: select_score(row, &SCORE_COL_5, "api score")?,
                },
            })
        } else {
            Record::Cpu(CpuRecord {
                system,
                upload_date,
                platform,
                core_scores: CpuScores {
                    single: select_score(row, &SCORE_COL_4, "single-core score")?,
                    multi: select_score(row, &SCORE_COL_5, "multi-core score")?,
                },
            })
        };
        results.push((url, record));
    }
    Ok(results)
}

fn extract_table(document: &Html) -> Result<Vec<(String, Record)>> {
    let mut results = Vec::new();
    for row in document.select(&TABLE_ROW) {
        let link = row
            .select(&TABLE_DEVICE)
            .next()
            .context("result row has no device cell")?;
        let href = link.value().attr("href").context("device link has no href")?;
        let url = format!("{RESULT_URL_BASE}{href}");

        let (device_name, cpu_model) = split_device_and_model(&text_of(link))?;
        let record = Record::Ai(AiRecord {
            system: SystemInfo { device_name, cpu_model },
            framework_name: select_text(row, &TABLE_FRAMEWORK, "framework")?.trim().to_string(),
            core_scores: AiScores {
                single_precision: select_score(row, &TABLE_SINGLE, "single precision score")?,
                half_precision: select_score(row, &TABLE_HALF, "half precision score")?,
                quantized: select_score(row, &TABLE_QUANT, "quantized score")?,
            },
        });
        results.push((url, record));
    }
    Ok(results)
}

fn split_device_and_model(text: &str) -> Result<(String, String)> {
    let caps = DEVICE_AND_MODEL_RE
        .captures(text.trim())
        .with_context(|| format!("device cell not in name/model form: {text:?}"))?;
    Ok((caps[1].trim().to_string(), caps[2].trim().to_string()))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn select_text(row: ElementRef<'_>, selector: &Selector, field: &str) -> Result<String> {
    let element = row
        .select(selector)
        .next()
        .with_context(|| format!("result row has no {field}"))?;
    Ok(text_of(element))
}

fn select_score(row: ElementRef<'_>, selector: &Selector, field: &str) -> Result<i64> {
    let text = select_text(row, selector, field)?;
    text.trim()
        .parse::<i64>()
        .with_context(|| format!("non-numeric {field}: {text:?}"))
}
