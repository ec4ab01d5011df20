// All audit functionality is in yearbook-audit-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod logging;

// Re-export core types for convenience
pub use yearbook_audit_core::*;
