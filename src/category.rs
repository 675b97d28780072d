use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::ScrapeError;

/// Which benchmark listing a query runs against. Maps to the `k`
/// query-string parameter of the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchCategory {
    Cpu,
    Gpu,
    Ai,
}

impl SearchCategory {
    pub fn search_key(self) -> &'static str {
        match self {
            SearchCategory::Cpu => "v6_cpu",
            SearchCategory::Gpu => "v6_compute",
            SearchCategory::Ai => "ai",
        }
    }
}

impl fmt::Display for SearchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchCategory::Cpu => "cpu",
            SearchCategory::Gpu => "gpu",
            SearchCategory::Ai => "ai",
        };
        f.write_str(name)
    }
}

impl FromStr for SearchCategory {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(SearchCategory::Cpu),
            "gpu" => Ok(SearchCategory::Gpu),
            "ai" => Ok(SearchCategory::Ai),
            other => Err(ScrapeError::UnknownCategory(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_keys() {
        assert_eq!(SearchCategory::Cpu.search_key(), "v6_cpu");
        assert_eq!(SearchCategory::Gpu.search_key(), "v6_compute");
        assert_eq!(SearchCategory::Ai.search_key(), "ai");
    }

    #[test]
    fn parse_known() {
        assert_eq!("cpu".parse::<SearchCategory>().unwrap(), SearchCategory::Cpu);
        assert_eq!("ai".parse::<SearchCategory>().unwrap(), SearchCategory::Ai);
    }

    #[test]
    fn parse_unknown_fails() {
        let err = "npu".parse::<SearchCategory>().unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownCategory(ref s) if s == "npu"));
    }
}
