// Section extraction: isolates the block of a page an anchor points at and
// reads its text and tables.
use crate::config::ExtractionConfig;
use crate::types::{ExtractedSection, ExtractedTable};
use anyhow::Result;

use super::markup::{self, TagEvent};
use super::source::PageSource;

const HEADINGS: &[&str] = &["h1", "h2", "h3"];
const NOTE_BOUNDARIES: &[&str] = &["h1", "h2", "h3", "table"];
/// Elements stripped from the section text
const CHROME: &[&str] = &["nav"];

/// Result of walking the siblings that follow an element
struct Siblings {
    /// Offset where the walk stopped
    end: usize,
    texts: Vec<String>,
}

pub struct SectionExtractor {
    max_note_siblings: usize,
}

impl SectionExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            max_note_siblings: config.max_note_siblings,
        }
    }

    /// Fetches `url` and extracts the anchored block, or the page body.
    /// Returns the raw page too, for content hashing.
    pub fn fetch_and_extract(
        &self,
        source: &dyn PageSource,
        url: &str,
        anchor: Option<&str>,
    ) -> Result<(ExtractedSection, String)> {
        let html = source.fetch(url)?;
        let section = self.extract(&html, anchor).with_source(url, anchor);
        Ok((section, html))
    }

    pub fn extract(&self, html: &str, anchor: Option<&str>) -> ExtractedSection {
        let html = markup::without_comments(html);
        let (start, end) = self.locate_block(&html, anchor);
        let block = &html[start..end];

        let tables: Vec<ExtractedTable> = markup::outermost(markup::find_elements(block, "table"))
            .iter()
            .map(|element| {
                let raw = element.outer(block);
                let notes = scan_siblings(block, element.end, NOTE_BOUNDARIES, self.max_note_siblings)
                    .texts
                    .join(" ");
                ExtractedTable {
                    caption: markup::table_caption(raw),
                    rows: table_rows(raw),
                    notes: Some(notes).filter(|notes| !notes.is_empty()),
                    raw_html: raw.to_string(),
                }
            })
            .collect();

        let text = markup::strip_tags(&without_chrome(block));
        tracing::debug!(
            anchor = anchor.unwrap_or("-"),
            chars = text.len(),
            tables = tables.len(),
            "extracted section"
        );

        ExtractedSection {
            text,
            tables,
            source: None,
        }
    }

    /// Byte range of the section block. Anchored blocks run from the target
    /// element through its siblings up to the next h1-h3.
    fn locate_block(&self, html: &str, anchor: Option<&str>) -> (usize, usize) {
        if let Some(anchor) = anchor.filter(|anchor| !anchor.is_empty()) {
            match markup::find_by_id(html, anchor) {
                Some(target) => {
                    let siblings = scan_siblings(html, target.end, HEADINGS, usize::MAX);
                    return (target.start, siblings.end);
                }
                None => tracing::warn!(anchor, "anchor not found, falling back to page body"),
            }
        }

        match markup::find_elements(html, "body").first() {
            Some(body) => (body.open_end, body.close_start),
            None => (0, html.len()),
        }
    }
}

/// Cell texts per row with colspan expanded into blank filler cells
fn table_rows(table_html: &str) -> Vec<Vec<String>> {
    markup::parse_table_rows(table_html)
        .into_iter()
        .map(|row| {
            row.cells
                .into_iter()
                .flat_map(|cell| {
                    std::iter::once(cell.text).chain(std::iter::repeat(String::new()).take(cell.colspan - 1))
                })
                .collect()
        })
        .collect()
}

fn without_chrome(block: &str) -> String {
    let mut cleaned = block.to_string();
    let mut chrome: Vec<_> = CHROME
        .iter()
        .flat_map(|name| markup::outermost(markup::find_elements(block, name)))
        .collect();
    // Remove from the back so earlier offsets stay valid
    chrome.sort_by_key(|element| std::cmp::Reverse(element.start));
    for element in chrome {
        cleaned.replace_range(element.start..element.end, " ");
    }
    cleaned
}

/// Walks the siblings after `from` until a boundary element opens, the parent
/// closes, or `max_elements` elements were read. `<p>` closes implicitly.
fn scan_siblings(html: &str, from: usize, boundaries: &[&str], max_elements: usize) -> Siblings {
    let mut texts = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut element_start: Option<usize> = None;
    let mut cursor = from;
    let mut count = 0usize;

    let events: Vec<TagEvent> = markup::tag_events(html)
        .into_iter()
        .filter(|event| event.start >= from)
        .collect();

    for event in events {
        if open.is_empty() {
            push_text(&mut texts, &html[cursor..event.start]);
        }
        cursor = event.end;

        // An open paragraph ends where the next block starts
        if !event.closing
            && open.len() == 1
            && open[0] == "p"
            && (event.name == "p" || boundaries.contains(&event.name.as_str()) || is_block(&event.name))
        {
            open.clear();
            if let Some(start) = element_start.take() {
                texts.push(markup::strip_tags(&html[start..event.start]));
                count += 1;
                if count >= max_elements {
                    return Siblings { end: event.start, texts };
                }
            }
        }

        if event.closing {
            if open.is_empty() {
                // Parent closed
                return Siblings { end: event.start, texts };
            }
            if let Some(position) = open.iter().rposition(|name| *name == event.name) {
                open.truncate(position);
            }
            if open.is_empty() {
                if let Some(start) = element_start.take() {
                    texts.push(markup::strip_tags(&html[start..event.end]));
                    count += 1;
                    if count >= max_elements {
                        return Siblings { end: event.end, texts };
                    }
                }
            }
        } else if event.is_void() {
            if open.is_empty() {
                count += 1;
                if count >= max_elements {
                    return Siblings { end: event.end, texts };
                }
            }
        } else {
            if open.is_empty() {
                if boundaries.contains(&event.name.as_str()) {
                    return Siblings { end: event.start, texts };
                }
                element_start = Some(event.start);
            }
            open.push(event.name.clone());
        }
    }

    match element_start {
        Some(start) => texts.push(markup::strip_tags(&html[start..])),
        None => push_text(&mut texts, &html[cursor..]),
    }
    Siblings { end: html.len(), texts }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "div" | "ul" | "ol" | "table" | "section" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "figure"
    )
}

fn push_text(texts: &mut Vec<String>, fragment: &str) {
    let text = markup::strip_tags(fragment);
    if !text.is_empty() {
        texts.push(text);
    }
}
