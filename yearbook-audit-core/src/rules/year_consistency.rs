// R1: the yearbook must name its own year correctly and keep its historical
// series running up to the base year.
use crate::config::LocaleConfig;
use crate::error::RuleError;
use crate::types::*;
use anyhow::{Context, Result};
use regex::Regex;
use std::cmp::Reverse;
use std::sync::LazyLock;

use super::engine::{snippet_around, AuditRule};

static YEAR_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4}\b").unwrap());

/// Series years outside this window are treated as other numbers
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

pub struct YearConsistencyRule {
    keyword_regex: Regex,
    range_regex: Regex,
}

impl YearConsistencyRule {
    pub fn new(locale: &LocaleConfig) -> Result<Self> {
        let keywords = longest_first(&locale.yearbook_keywords)
            .iter()
            .map(|keyword| {
                keyword
                    .split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect::<Vec<_>>()
            .join("|");
        let keyword_regex = Regex::new(&format!(r"(?i)\b(?:{keywords})\s+(\d+)\b"))
            .context("invalid yearbook keyword pattern")?;

        let connectors = longest_first(&locale.range_connectors)
            .iter()
            .map(|connector| {
                if connector.chars().all(char::is_alphabetic) {
                    format!(r"\s+{}\s+", regex::escape(connector))
                } else {
                    format!(r"\s*{}\s*", regex::escape(connector))
                }
            })
            .collect::<Vec<_>>()
            .join("|");
        let range_regex = Regex::new(&format!(r"(?i)\b(\d{{4}})(?:{connectors})(\d{{4}})\b"))
            .context("invalid range connector pattern")?;

        Ok(Self {
            keyword_regex,
            range_regex,
        })
    }

    fn check_yearbook_mentions(&self, text: &str, ctx: &ReviewContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        for cap in self.keyword_regex.captures_iter(text) {
            let (Some(whole), Some(token)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let snippet = snippet_around(text, whole.start(), whole.end());

            let finding = if token.as_str().len() != 4 {
                Finding::new(
                    RuleId::R1,
                    "malformed_year",
                    Severity::Fail,
                    format!(
                        "Malformed year '{}' in '{}'; expected a 4-digit year",
                        token.as_str(),
                        whole.as_str()
                    ),
                )
            } else {
                match token.as_str().parse::<i32>() {
                    Ok(year) if year == ctx.report_year => continue,
                    _ => Finding::new(
                        RuleId::R1,
                        "wrong_year",
                        Severity::Fail,
                        format!(
                            "'{}' does not match the report year {}",
                            whole.as_str(),
                            ctx.report_year
                        ),
                    ),
                }
            };

            findings.push(
                finding
                    .with_evidence("snippet", snippet)
                    .with_evidence("location", "text")
                    .with_evidence("offset", whole.start())
                    .with_evidence("found", token.as_str())
                    .with_evidence("expected", ctx.report_year),
            );
        }
        findings
    }

    fn check_series_ranges(&self, text: &str, ctx: &ReviewContext) -> Vec<Finding> {
        let mut findings = Vec::new();
        for cap in self.range_regex.captures_iter(text) {
            let (Some(whole), Some(start), Some(end)) = (cap.get(0), cap.get(1), cap.get(2)) else {
                continue;
            };
            let (Ok(start_year), Ok(end_year)) =
                (start.as_str().parse::<i32>(), end.as_str().parse::<i32>())
            else {
                continue;
            };
            if !PLAUSIBLE_YEARS.contains(&start_year)
                || !PLAUSIBLE_YEARS.contains(&end_year)
                || start_year > end_year
                || end_year >= ctx.base_year
            {
                continue;
            }

            findings.push(
                Finding::new(
                    RuleId::R1,
                    "truncated_series",
                    Severity::Fail,
                    format!(
                        "Series '{}' stops before the base year {}; expected {} to {}",
                        whole.as_str(),
                        ctx.base_year,
                        start_year,
                        ctx.base_year
                    ),
                )
                .with_evidence("snippet", snippet_around(text, whole.start(), whole.end()))
                .with_evidence("location", "text")
                .with_evidence("offset", whole.start())
                .with_evidence("found", whole.as_str())
                .with_evidence("suggestion", format!("{start_year} to {}", ctx.base_year)),
            );
        }
        findings
    }

    /// One warning at most: the previous year is cited but the base year never is
    fn check_stale_reference(&self, text: &str, ctx: &ReviewContext) -> Option<Finding> {
        let base = ctx.base_year.to_string();
        if YEAR_TOKEN_REGEX.find_iter(text).any(|token| token.as_str() == base) {
            return None;
        }
        let previous = (ctx.base_year - 1).to_string();
        let hit = YEAR_TOKEN_REGEX
            .find_iter(text)
            .find(|token| token.as_str() == previous)?;

        Some(
            Finding::new(
                RuleId::R1,
                "stale_reference",
                Severity::Warn,
                format!(
                    "Text cites {previous} but never the base year {base}; the data may not have been updated"
                ),
            )
            .with_evidence("snippet", snippet_around(text, hit.start(), hit.end()))
            .with_evidence("location", "text")
            .with_evidence("offset", hit.start())
            .with_evidence("found", previous.as_str())
            .with_evidence("expected", ctx.base_year),
        )
    }
}

fn longest_first(phrases: &[String]) -> Vec<&str> {
    let mut phrases: Vec<&str> = phrases
        .iter()
        .map(|phrase| phrase.trim())
        .filter(|phrase| !phrase.is_empty())
        .collect();
    phrases.sort_by_key(|phrase| Reverse(phrase.chars().count()));
    phrases
}

impl AuditRule for YearConsistencyRule {
    fn id(&self) -> RuleId {
        RuleId::R1
    }

    fn check_text(&self, text: &str, ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        let mut findings = self.check_yearbook_mentions(text, ctx);
        findings.extend(self.check_series_ranges(text, ctx));
        findings.extend(self.check_stale_reference(text, ctx));
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> Vec<Finding> {
        let rule = YearConsistencyRule::new(&LocaleConfig::default()).unwrap();
        rule.check_text(text, &ReviewContext::new(2024, 2023)).unwrap()
    }

    fn checks(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.check.as_str()).collect()
    }

    #[test]
    fn matching_year_is_silent() {
        assert!(check("Statistical Yearbook 2024 - data for 2023").is_empty());
    }

    #[test]
    fn wrong_year_fails_once_per_mention() {
        let findings = check("Statistical Yearbook 2023, base year 2023. See also the Yearbook 2022.");
        assert_eq!(checks(&findings), vec!["wrong_year", "wrong_year"]);
        assert_eq!(findings[0].evidence_str("found"), Some("2023"));
        assert!(findings[0].evidence_str("snippet").unwrap().contains("Statistical Yearbook 2023"));
    }

    #[test]
    fn five_digit_year_is_malformed_regardless_of_report_year() {
        let findings = check("Anuário Estatístico 20234 com dados de 2023");
        assert_eq!(checks(&findings), vec!["malformed_year"]);
        assert_eq!(findings[0].severity, Severity::Fail);
        assert_eq!(findings[0].evidence_str("found"), Some("20234"));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let findings = check("ANUÁRIO ESTATÍSTICO 2021 (2023)");
        assert_eq!(checks(&findings), vec!["wrong_year"]);
    }

    #[test]
    fn truncated_series_suggests_extension_to_base_year() {
        let findings = check("Série histórica 2019 a 2022, atualizada em 2023.");
        assert_eq!(checks(&findings), vec!["truncated_series"]);
        assert_eq!(findings[0].evidence_str("suggestion"), Some("2019 to 2023"));
        assert!(findings[0].message.contains("2019 to 2023"));
    }

    #[test]
    fn all_range_connectors_are_recognized() {
        for text in [
            "from 2015 to 2020 (2023)",
            "de 2015 até 2020 (2023)",
            "2015-2020 (2023)",
            "2015–2020 (2023)",
        ] {
            assert_eq!(checks(&check(text)), vec!["truncated_series"], "{text}");
        }
    }

    #[test]
    fn complete_and_reversed_ranges_are_ignored() {
        assert!(check("Series 2019 to 2023").is_empty());
        assert!(check("Reversed 2023 to 2019, base 2023").is_empty());
    }

    #[test]
    fn stale_reference_warns_at_most_once() {
        let findings = check("Enrollment in 2022 grew. In 2022 the campus opened.");
        assert_eq!(checks(&findings), vec!["stale_reference"]);
        assert_eq!(findings[0].severity, Severity::Warn);
    }

    #[test]
    fn base_year_anywhere_suppresses_stale_warning() {
        assert!(check("Values for 2022 and 2023").is_empty());
    }

    #[test]
    fn base_year_inside_a_longer_number_does_not_count() {
        let findings = check("Anuário 20234, dados de 2022");
        let found = checks(&findings);
        assert!(found.contains(&"malformed_year"));
        assert!(found.contains(&"stale_reference"), "{found:?}");
    }
}
