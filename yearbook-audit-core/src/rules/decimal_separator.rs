// R2: decimals must use a comma. A dot followed by one or two digits is a
// decimal written in the wrong convention, unless the token is a valid
// thousands grouping.
use crate::error::RuleError;
use crate::locale::parse_locale_number;
use crate::types::*;
use regex::Regex;
use std::sync::LazyLock;

use super::engine::{snippet_around, AuditRule};

static NUMERIC_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[.,]\d+)+\b").unwrap());

#[derive(Debug, Default)]
pub struct DecimalSeparatorRule;

impl DecimalSeparatorRule {
    pub fn new() -> Self {
        Self
    }
}

/// `15.84` is flagged; `1.769.277` and `15.08.2024` are not
pub fn is_dot_decimal(token: &str) -> bool {
    let integer = token.split(',').next().unwrap_or(token);
    let Some((_, last_group)) = integer.rsplit_once('.') else {
        return false;
    };
    (1..=2).contains(&last_group.len()) && parse_locale_number(token).is_err()
}

fn swap_separators(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '.' => ',',
            ',' => '.',
            other => other,
        })
        .collect()
}

impl AuditRule for DecimalSeparatorRule {
    fn id(&self) -> RuleId {
        RuleId::R2
    }

    fn check_text(&self, text: &str, _ctx: &ReviewContext) -> Result<Vec<Finding>, RuleError> {
        let findings = NUMERIC_TOKEN_REGEX
            .find_iter(text)
            .filter(|token| is_dot_decimal(token.as_str()))
            .map(|token| {
                let suggestion = swap_separators(token.as_str());
                Finding::new(
                    RuleId::R2,
                    "dot_decimal",
                    Severity::Warn,
                    format!(
                        "Number '{}' uses a dot as decimal separator; expected '{}'",
                        token.as_str(),
                        suggestion
                    ),
                )
                .with_evidence("snippet", snippet_around(text, token.start(), token.end()))
                .with_evidence("location", "text")
                .with_evidence("offset", token.start())
                .with_evidence("token", token.as_str())
                .with_evidence("suggestion", suggestion)
            })
            .collect();
        Ok(findings)
    }
}
