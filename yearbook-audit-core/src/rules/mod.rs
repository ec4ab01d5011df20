// Main rules module - the engine coordinates the six audit rules:
// - engine.rs: RuleEngine, the AuditRule trait and failure isolation
// - table_grid.rs: table normalization shared by the table rules
// - year_consistency.rs (R1), decimal_separator.rs (R2), table_source.rs (R3),
//   table_totals.rs (R4), table_completeness.rs (R5), total_emphasis.rs (R6)

pub mod engine;
pub mod table_grid;

pub mod decimal_separator;
pub mod table_completeness;
pub mod table_source;
pub mod table_totals;
pub mod total_emphasis;
pub mod year_consistency;

pub use engine::*;
pub use table_grid::{GridCell, TableGrid};
