//! Page extraction
//!
//! Turns yearbook pages into the plain text and tables the rule engine reads.
//!
//! ## Architecture
//!
//! ```text
//! URL (http(s), file:// or local path)
//!     ↓
//! [PageSource]         fetch raw HTML
//!     ↓
//! [TocExtractor]       start page → list of sections
//! [SectionExtractor]   page + optional anchor → ExtractedSection
//!     ↓
//! RuleEngine
//! ```
//!
//! All HTML handling goes through `markup`, a regex-driven scanner tolerant of
//! the unclosed rows and cells common in hand-edited pages.

pub mod markup;
pub mod section;
pub mod source;
pub mod toc;

pub use section::SectionExtractor;
pub use source::{DefaultPageSource, FilePageSource, HttpPageSource, MemoryPageSource, PageSource};
pub use toc::TocExtractor;
