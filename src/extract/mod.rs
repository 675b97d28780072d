//! Page-layout glue: turning one search page's HTML into keyed records and
//! the two signals the fetch loop steers by (end of results, reported page
//! count). Everything here is tied to the remote site's markup.

pub mod dates;
mod results;

pub use results::extract_results;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static NO_RESULTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Your search did not match any .* results\.").unwrap());
static PAGE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.page-item a.page-link").unwrap());

/// Past the final page the search interface renders a "did not match"
/// notice instead of an empty list; that notice is the stop signal.
pub fn is_final_page(body: &str) -> bool {
    let document = Html::parse_document(body);
    let text: String = document.root_element().text().collect();
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    NO_RESULTS_RE.is_match(&flattened)
}

/// Largest numeric page link in the pagination widget, if the page has one.
pub fn parse_last_page(body: &str) -> Option<u32> {
    let document = Html::parse_document(body);
    document
        .select(&PAGE_LINK)
        .filter_map(|link| link.text().collect::<String>().trim().parse::<u32>().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_page_notice_detected() {
        let body = r#"<html><body><div class="col-12">
            Your search did not match any
            Geekbench 6 CPU results.
        </div></body></html>"#;
        assert!(is_final_page(body));
    }

    #[test]
    fn ordinary_page_is_not_final() {
        assert!(!is_final_page("<html><body><div>1,234 results</div></body></html>"));
    }

    #[test]
    fn widget_reports_largest_page() {
        let body = r#"<html><body><ul class="pagination">
            <li class="page-item"><a class="page-link" href="?page=1">1</a></li>
            <li class="page-item"><a class="page-link" href="?page=2">2</a></li>
            <li class="page-item"><a class="page-link" href="?page=120">120</a></li>
            <li class="page-item"><a class="page-link" href="?page=2">Next</a></li>
        </ul></body></html>"#;
        assert_eq!(parse_last_page(body), Some(120));
    }

    #[test]
    fn missing_widget_is_none() {
        assert_eq!(parse_last_page("<html><body><p>no pager</p></body></html>"), None);
    }
}
