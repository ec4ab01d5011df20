//! Rule engine properties over hand-built sections.
//!
//! Each rule gets a positive and a negative case; the engine-level groups
//! cover ordering, determinism, failure isolation and config loading.

use yearbook_audit_core::*;

// ============================================================================
// Helpers
// ============================================================================

fn evaluate(section: &ExtractedSection, ctx: ReviewContext) -> Vec<Finding> {
    RuleEngine::with_defaults().unwrap().evaluate(section, &ctx)
}

fn of_rule(findings: &[Finding], rule: RuleId) -> Vec<&Finding> {
    findings.iter().filter(|f| f.rule == rule).collect()
}

fn count(findings: &[Finding], rule: RuleId, severity: Severity) -> usize {
    findings
        .iter()
        .filter(|f| f.rule == rule && f.severity == severity)
        .count()
}

fn totals_table(rows: &[(&str, &str)]) -> ExtractedTable {
    let mut all = vec![vec!["Campus".to_string(), "Students".to_string()]];
    all.extend(
        rows.iter()
            .map(|(label, value)| vec![label.to_string(), value.to_string()]),
    );
    ExtractedTable::from_rows(all)
        .with_caption("Students by campus")
        .with_notes("Source: DPO/UnB")
}

fn ctx() -> ReviewContext {
    ReviewContext::new(2024, 2023)
}

// ============================================================================
// Per-rule behavior
// ============================================================================

mod rules {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn r1_flags_the_previous_edition_year() {
        let section = ExtractedSection::new("Statistical Yearbook 2024, covering 2024.");
        let wrong = evaluate(&section, ReviewContext::new(2025, 2024));
        assert!(count(&wrong, RuleId::R1, Severity::Fail) >= 1);

        let section = ExtractedSection::new("Statistical Yearbook 2025, covering 2024.");
        let right = evaluate(&section, ReviewContext::new(2025, 2024));
        assert_eq!(count(&right, RuleId::R1, Severity::Fail), 0);
    }

    #[test]
    fn r1_flags_malformed_year_regardless_of_report_year() {
        for report_year in [2023, 2024, 20234] {
            let findings = evaluate(
                &ExtractedSection::new("Yearbook 20234"),
                ReviewContext::new(report_year, 2023),
            );
            assert!(findings
                .iter()
                .any(|f| f.check == "malformed_year" && f.severity == Severity::Fail));
        }
    }

    #[test]
    fn r2_tells_decimals_from_thousands() {
        let dot_decimal = evaluate(&ExtractedSection::new("Average of 15.84 students"), ctx());
        assert_eq!(count(&dot_decimal, RuleId::R2, Severity::Warn), 1);

        let grouping = evaluate(&ExtractedSection::new("Population of 1.769.277"), ctx());
        assert_eq!(count(&grouping, RuleId::R2, Severity::Warn), 0);
    }

    #[test]
    fn r3_source_note_clears_the_failure() {
        let table = ExtractedTable::from_rows([["Campus", "Students"], ["A", "10"]])
            .with_caption("Enrollment by Campus");
        let section = ExtractedSection::new("").with_table(table.clone());
        assert_eq!(count(&evaluate(&section, ctx()), RuleId::R3, Severity::Fail), 1);

        let section = ExtractedSection::new("").with_table(table.with_notes("Source: DPO/UnB"));
        assert_eq!(count(&evaluate(&section, ctx()), RuleId::R3, Severity::Fail), 0);
    }

    #[test]
    fn r4_total_within_tolerance_passes() {
        let section = ExtractedSection::new("")
            .with_table(totals_table(&[("A", "40"), ("B", "59"), ("Total", "100")]));
        let findings = evaluate(&section, ctx());
        assert_eq!(count(&findings, RuleId::R4, Severity::Fail), 0);
    }

    #[test]
    fn r4_total_outside_tolerance_fails_once() {
        let section = ExtractedSection::new("")
            .with_table(totals_table(&[("A", "40"), ("B", "30"), ("Total", "100")]));
        let findings = evaluate(&section, ctx());
        let r4 = of_rule(&findings, RuleId::R4);
        assert_eq!(r4.len(), 1);
        assert_eq!(r4[0].severity, Severity::Fail);
        assert_eq!(r4[0].evidence_str("location"), Some("table[0] row 3"));
        assert!(r4[0].message.contains("Total row"));
        assert!(r4[0].evidence_str("snippet").unwrap().starts_with("Total"));
    }

    #[test]
    fn r5_empty_cells_and_markers() {
        let empty = ExtractedSection::new("")
            .with_table(totals_table(&[("A", "40"), ("B", "")]));
        let findings = evaluate(&empty, ctx());
        assert_eq!(count(&findings, RuleId::R5, Severity::Warn), 1);

        let marker = totals_table(&[("A", "40"), ("B", "ND")]);
        let findings = evaluate(&ExtractedSection::new("").with_table(marker.clone()), ctx());
        assert!(findings.iter().any(|f| f.check == "unexplained_marker"));

        let explained = marker.with_notes("Source: DPO/UnB. ND = data not available");
        let findings = evaluate(&ExtractedSection::new("").with_table(explained), ctx());
        assert!(!findings.iter().any(|f| f.check == "unexplained_marker"));
    }

    #[test]
    fn r6_plain_total_row_warns_and_strong_does_not() {
        let markup = |total_row: &str| {
            format!(
                "<table><tr><th>Campus</th><th>Students</th></tr>\
                 <tr><td>A</td><td>40</td></tr>{total_row}</table>"
            )
        };
        let plain = ExtractedTable::from_html(markup("<tr><td>Total</td><td>40</td></tr>"));
        let findings = evaluate(&ExtractedSection::new("").with_table(plain), ctx());
        assert_eq!(count(&findings, RuleId::R6, Severity::Warn), 1);

        let strong = ExtractedTable::from_html(markup(
            "<tr><td><strong>Total</strong></td><td><strong>40</strong></td></tr>",
        ));
        let findings = evaluate(&ExtractedSection::new("").with_table(strong), ctx());
        assert_eq!(count(&findings, RuleId::R6, Severity::Warn), 0);
    }
}

// ============================================================================
// Engine-level guarantees
// ============================================================================

mod engine {
    use super::*;
    use pretty_assertions::assert_eq;

    fn busy_section() -> ExtractedSection {
        ExtractedSection::new("Statistical Yearbook 2023 shows 15.84 and a series from 2015 to 2021.")
            .with_table(totals_table(&[("A", "40"), ("B", "30"), ("Total", "100")]))
            .with_table(ExtractedTable::from_rows([["Unit", "Value"], ["A", "ND"]]))
            .with_source("https://yearbook.test/students.html", None)
    }

    #[test]
    fn evaluation_is_deterministic() {
        let engine = RuleEngine::with_defaults().unwrap();
        let section = busy_section();
        let first = engine.evaluate(&section, &ctx());
        let second = engine.evaluate(&section, &ctx());
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn findings_are_grouped_by_rule_in_order() {
        let findings = evaluate(&busy_section(), ctx());
        let rules: Vec<RuleId> = findings.iter().map(|f| f.rule).collect();
        let mut sorted = rules.clone();
        sorted.sort();
        assert_eq!(rules, sorted);
        for rule in RuleId::ALL {
            assert!(rules.contains(&rule), "{rule} produced nothing");
        }
    }

    #[test]
    fn every_rule_passes_an_empty_section_once() {
        let findings = evaluate(&ExtractedSection::default(), ctx());
        assert_eq!(findings.len(), RuleId::ALL.len());
        assert!(findings.iter().all(|f| f.severity == Severity::Pass && f.check == "pass"));
    }

    #[test]
    fn malformed_table_does_not_hide_other_tables() {
        let ragged = ExtractedTable::from_rows(vec![
            vec!["a", "b", "c", "d", "e"],
            vec!["a"],
            vec!["a", "b", "c", "d", "e", "f", "g", "h"],
            vec!["a", "b"],
        ])
        .with_notes("Source: registry");
        let section = ExtractedSection::new("")
            .with_table(ragged)
            .with_table(totals_table(&[("A", "40"), ("B", "30"), ("Total", "100")]));
        let findings = evaluate(&section, ctx());

        let on_ragged: Vec<&Finding> = findings
            .iter()
            .filter(|f| matches!(f.rule, RuleId::R4 | RuleId::R5))
            .filter(|f| f.evidence_str("location").is_some_and(|l| l.starts_with("table[0]")))
            .collect();
        assert_eq!(on_ragged.len(), 1);
        assert_eq!(on_ragged[0].check, "malformed_table");
        assert_eq!(on_ragged[0].severity, Severity::Fail);

        let r4 = of_rule(&findings, RuleId::R4);
        assert_eq!(r4.len(), 1);
        assert_eq!(r4[0].evidence_str("location"), Some("table[1] row 3"));
    }

    #[test]
    fn yaml_config_tunes_rules_and_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.yaml");
        std::fs::write(
            &path,
            "tolerance:\n  relative: 0.0\n  absolute: 0.0\npipeline:\n  rules:\n    - name: table_totals\n",
        )
        .unwrap();

        let config = AuditConfig::load_from_file(&path).unwrap();
        let engine = RuleEngine::new(&config).unwrap();
        assert_eq!(engine.rule_ids(), vec![RuleId::R4]);

        let section = ExtractedSection::new("")
            .with_table(totals_table(&[("A", "40"), ("B", "59"), ("Total", "100")]));
        let findings = engine.evaluate(&section, &ctx());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, "total_mismatch");
    }

    #[test]
    fn invalid_yaml_config_is_rejected_and_fallback_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.yaml");
        std::fs::write(&path, "pipeline:\n  rules:\n    - name: R9\n").unwrap();

        assert!(AuditConfig::load_from_file(&path).is_err());
        let (config, origin) = AuditConfig::load_with_fallback(path.to_str());
        assert_eq!(config, AuditConfig::default());
        assert_eq!(origin, ConfigOrigin::Fallback);

        let (_, origin) = AuditConfig::load_with_fallback(None);
        assert_eq!(origin, ConfigOrigin::Defaults);
    }
}
