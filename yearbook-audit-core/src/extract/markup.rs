//! Lightweight HTML scanning
//!
//! Yearbook pages are hand-edited HTML, frequently with unclosed cells and
//! rows, so nothing here builds a DOM. Instead a single tag regex produces a
//! flat stream of open/close events and the helpers below pair them up:
//! - `find_elements` matches open and close tags of one name, honoring nesting
//! - `find_by_id` locates an anchor target
//! - `parse_table_rows` reads rows and cells with implicit closing
//! - `strip_tags` / `decode_entities` produce plain text
//!
//! Offsets are byte offsets into the string the caller passed in. Call
//! `without_comments` first so commented-out markup is never matched; it keeps
//! every offset stable.

use regex::Regex;
use std::sync::LazyLock;

// Pre-compiled regexes for markup scanning
static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").unwrap());

static COMMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static SCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>")
        .unwrap()
});

static ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

static ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]*);").unwrap());

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Formatting tags that do not separate words when stripped
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "em", "font", "i", "small", "span", "strong", "sub", "sup", "u",
];

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("ndash", "–"),
    ("mdash", "—"),
    ("minus", "\u{2212}"),
    ("ordf", "ª"),
    ("ordm", "º"),
    ("deg", "°"),
    ("sup1", "¹"),
    ("sup2", "²"),
    ("sup3", "³"),
    ("aacute", "á"),
    ("Aacute", "Á"),
    ("agrave", "à"),
    ("Agrave", "À"),
    ("acirc", "â"),
    ("Acirc", "Â"),
    ("atilde", "ã"),
    ("Atilde", "Ã"),
    ("ccedil", "ç"),
    ("Ccedil", "Ç"),
    ("eacute", "é"),
    ("Eacute", "É"),
    ("ecirc", "ê"),
    ("Ecirc", "Ê"),
    ("iacute", "í"),
    ("Iacute", "Í"),
    ("oacute", "ó"),
    ("Oacute", "Ó"),
    ("ocirc", "ô"),
    ("Ocirc", "Ô"),
    ("otilde", "õ"),
    ("Otilde", "Õ"),
    ("uacute", "ú"),
    ("Uacute", "Ú"),
    ("uuml", "ü"),
];

/// One open or close tag in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEvent<'a> {
    pub start: usize,
    pub end: usize,
    /// Lowercased tag name
    pub name: String,
    pub attrs: &'a str,
    pub closing: bool,
    pub self_closing: bool,
}

impl TagEvent<'_> {
    pub fn is_void(&self) -> bool {
        self.self_closing || VOID_ELEMENTS.contains(&self.name.as_str())
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.name.as_str(), "h1" | "h2" | "h3")
    }
}

/// A matched element. `close_start == end` when the element had no close tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: String,
    pub start: usize,
    pub open_end: usize,
    pub close_start: usize,
    pub end: usize,
}

impl Element {
    pub fn outer<'a>(&self, html: &'a str) -> &'a str {
        &html[self.start..self.end]
    }

    pub fn inner<'a>(&self, html: &'a str) -> &'a str {
        &html[self.open_end..self.close_start]
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start < offset && offset < self.end
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        attr_value(&self.attrs, name)
    }
}

/// Blanks out comments with spaces, keeping byte offsets unchanged
pub fn without_comments(html: &str) -> String {
    let mut cleaned = html.to_string();
    for comment in COMMENT_REGEX.find_iter(html) {
        cleaned.replace_range(comment.range(), &" ".repeat(comment.len()));
    }
    cleaned
}

pub fn tag_events(html: &str) -> Vec<TagEvent<'_>> {
    TAG_REGEX
        .captures_iter(html)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let attrs = cap.get(3).map_or("", |m| m.as_str());
            Some(TagEvent {
                start: whole.start(),
                end: whole.end(),
                name: cap[2].to_ascii_lowercase(),
                attrs,
                closing: &cap[1] == "/",
                self_closing: attrs.trim_end().ends_with('/'),
            })
        })
        .collect()
}

/// All elements named `name`, nested ones included, ordered by start offset.
/// Unclosed elements are dropped.
pub fn find_elements(html: &str, name: &str) -> Vec<Element> {
    let name = name.to_ascii_lowercase();
    let mut open: Vec<TagEvent> = Vec::new();
    let mut found = Vec::new();

    for event in tag_events(html).into_iter().filter(|e| e.name == name) {
        if event.closing {
            if let Some(opening) = open.pop() {
                found.push(Element {
                    name: name.clone(),
                    attrs: opening.attrs.to_string(),
                    start: opening.start,
                    open_end: opening.end,
                    close_start: event.start,
                    end: event.end,
                });
            }
        } else if event.is_void() {
            found.push(void_element(&event));
        } else {
            open.push(event);
        }
    }

    found.sort_by_key(|element| element.start);
    found
}

/// Drops elements nested inside another element of the list
pub fn outermost(elements: Vec<Element>) -> Vec<Element> {
    let mut kept: Vec<Element> = Vec::new();
    for element in elements {
        if kept.last().map_or(true, |last| element.start >= last.end) {
            kept.push(element);
        }
    }
    kept
}

/// Locates the element carrying `id` (or a legacy `name` anchor)
pub fn find_by_id(html: &str, id: &str) -> Option<Element> {
    let target = tag_events(html).into_iter().find(|event| {
        !event.closing
            && (attr_value(event.attrs, "id").as_deref() == Some(id)
                || (event.name == "a" && attr_value(event.attrs, "name").as_deref() == Some(id)))
    })?;

    if target.is_void() {
        return Some(void_element(&target));
    }

    let matched = find_elements(html, &target.name)
        .into_iter()
        .find(|element| element.start == target.start);
    Some(matched.unwrap_or_else(|| void_element(&target)))
}

fn void_element(event: &TagEvent) -> Element {
    Element {
        name: event.name.clone(),
        attrs: event.attrs.to_string(),
        start: event.start,
        open_end: event.end,
        close_start: event.end,
        end: event.end,
    }
}

/// First offset at or after `from` where an h1-h3 opens
pub fn next_heading(html: &str, from: usize) -> Option<usize> {
    tag_events(html)
        .into_iter()
        .find(|event| event.start >= from && !event.closing && event.is_heading())
        .map(|event| event.start)
}

pub fn attr_value(attrs: &str, name: &str) -> Option<String> {
    ATTR_REGEX.captures_iter(attrs).find_map(|cap| {
        if !cap[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let value = cap
            .get(2)
            .or_else(|| cap.get(3))
            .or_else(|| cap.get(4))
            .map_or("", |m| m.as_str());
        Some(decode_entities(value))
    })
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |cap: &regex::Captures| {
            let entity = &cap[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from)
            } else if let Some(decimal) = entity.strip_prefix('#') {
                decimal.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else {
                NAMED_ENTITIES
                    .iter()
                    .find(|(name, _)| *name == entity)
                    .map(|(_, value)| value.to_string())
            };
            decoded.unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

/// Plain text of a fragment: scripts dropped, tags removed, entities decoded,
/// whitespace collapsed
pub fn strip_tags(html: &str) -> String {
    let without_scripts = SCRIPT_REGEX.replace_all(html, " ");
    let without_comments = COMMENT_REGEX.replace_all(&without_scripts, " ");
    let text = TAG_REGEX.replace_all(&without_comments, |cap: &regex::Captures| {
        let name = cap[2].to_ascii_lowercase();
        if INLINE_ELEMENTS.contains(&name.as_str()) {
            ""
        } else {
            " "
        }
    });
    collapse_whitespace(&decode_entities(&text))
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text, " ").trim().to_string()
}

// ===== TABLES =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupCell {
    pub text: String,
    pub is_header: bool,
    pub colspan: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupRow {
    pub cells: Vec<MarkupCell>,
    /// Markup of the row, from its `<tr>` (or first cell) to where it closed
    pub raw: String,
}

impl MarkupRow {
    pub fn first_text(&self) -> Option<&str> {
        self.cells.first().map(|cell| cell.text.as_str())
    }
}

const MAX_COLSPAN: usize = 64;

/// Builds rows while walking tag events; cells and rows close implicitly.
struct RowBuilder<'a> {
    html: &'a str,
    rows: Vec<MarkupRow>,
    row_start: Option<usize>,
    cells: Vec<MarkupCell>,
    // content start, header flag, colspan
    cell: Option<(usize, bool, usize)>,
}

impl<'a> RowBuilder<'a> {
    fn new(html: &'a str) -> Self {
        Self {
            html,
            rows: Vec::new(),
            row_start: None,
            cells: Vec::new(),
            cell: None,
        }
    }

    fn finish_cell(&mut self, at: usize) {
        if let Some((content_start, is_header, colspan)) = self.cell.take() {
            let content = self.html.get(content_start..at.max(content_start)).unwrap_or("");
            self.cells.push(MarkupCell {
                text: strip_tags(content),
                is_header,
                colspan,
            });
        }
    }

    fn finish_row(&mut self, at: usize) {
        self.finish_cell(at);
        if let Some(start) = self.row_start.take() {
            let cells = std::mem::take(&mut self.cells);
            if !cells.is_empty() {
                self.rows.push(MarkupRow {
                    cells,
                    raw: self.html.get(start..at.max(start)).unwrap_or("").to_string(),
                });
            }
        }
    }

    fn open_cell(&mut self, event: &TagEvent) {
        self.finish_cell(event.start);
        if self.row_start.is_none() {
            self.row_start = Some(event.start);
        }
        let colspan = attr_value(event.attrs, "colspan")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_COLSPAN);
        self.cell = Some((event.end, event.name == "th", colspan));
    }
}

/// Rows of the first table level in `table_html`. Nested tables stay inside
/// the cell that holds them. Rows without cells are skipped.
pub fn parse_table_rows(table_html: &str) -> Vec<MarkupRow> {
    let html = without_comments(table_html);
    let mut builder = RowBuilder::new(&html);
    let mut depth = 0usize;

    for event in tag_events(&html) {
        if event.name == "table" {
            if event.closing {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    builder.finish_row(event.start);
                }
            } else {
                depth += 1;
            }
            continue;
        }
        if depth > 1 {
            continue;
        }
        match (event.name.as_str(), event.closing) {
            ("tr", false) => {
                builder.finish_row(event.start);
                builder.row_start = Some(event.start);
            }
            ("tr", true) => builder.finish_row(event.end),
            ("td" | "th", false) => builder.open_cell(&event),
            ("td" | "th", true) => builder.finish_cell(event.start),
            ("thead" | "tbody" | "tfoot", _) => builder.finish_row(event.start),
            _ => {}
        }
    }
    builder.finish_row(html.len());
    builder.rows
}

pub fn table_caption(table_html: &str) -> Option<String> {
    find_elements(table_html, "caption")
        .first()
        .map(|caption| strip_tags(caption.inner(table_html)))
        .filter(|caption| !caption.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let html = "<p>Anu&aacute;rio <b>Estat</b>&iacute;stico&nbsp;2024</p><script>var x = 1;</script><p>Fonte: UnB</p>";
        assert_eq!(strip_tags(html), "Anuário Estatístico 2024 Fonte: UnB");
    }

    #[test]
    fn decodes_numeric_entities_and_keeps_unknown_ones() {
        assert_eq!(decode_entities("&#65;&#x42;&bogus;"), "AB&bogus;");
    }

    #[test]
    fn finds_nested_elements_in_order() {
        let html = "<div id=\"a\"><div id=\"b\">x</div></div><div>y</div>";
        let divs = find_elements(html, "div");
        assert_eq!(divs.len(), 3);
        assert_eq!(divs[0].attr("id").as_deref(), Some("a"));
        assert_eq!(divs[1].inner(html), "x");
        assert_eq!(outermost(divs).len(), 2);
    }

    #[test]
    fn finds_anchor_targets_by_id_and_name() {
        let html = "<h2 id='pop'>Population</h2><p>text</p><a name=\"old\"></a>";
        let heading = find_by_id(html, "pop").unwrap();
        assert_eq!(heading.name, "h2");
        assert_eq!(heading.inner(html), "Population");
        assert_eq!(find_by_id(html, "old").unwrap().name, "a");
        assert!(find_by_id(html, "missing").is_none());
    }

    #[test]
    fn comments_are_blanked_without_shifting_offsets() {
        let html = "<p>a</p><!-- <table> --><p>b</p>";
        let cleaned = without_comments(html);
        assert_eq!(cleaned.len(), html.len());
        assert!(find_elements(&cleaned, "table").is_empty());
    }

    #[test]
    fn parses_rows_with_implicit_closing_and_colspan() {
        let html = r#"<table>
            <tr><th colspan="2">Campus</th><th>Students</th>
            <tr><td>A<td>B</td><td>1.200</td></tr>
            <tbody><tr><td>Total<td></td><td><b>1.200</b></td></tr></tbody>
        </table>"#;
        let rows = parse_table_rows(html);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cells[0].colspan, 2);
        assert!(rows[0].cells[0].is_header);
        assert_eq!(rows[1].cells.len(), 3);
        assert_eq!(rows[1].cells[2].text, "1.200");
        assert_eq!(rows[2].first_text(), Some("Total"));
        assert!(rows[2].raw.contains("<b>1.200</b>"));
    }

    #[test]
    fn nested_tables_stay_inside_their_cell() {
        let html = "<table><tr><td><table><tr><td>inner</td></tr></table></td><td>2</td></tr></table>";
        let rows = parse_table_rows(html);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[0].cells[0].text, "inner");
    }

    #[test]
    fn reads_caption() {
        let html = "<table><caption>Table 1 - Students</caption><tr><td>1</td></tr></table>";
        assert_eq!(table_caption(html).as_deref(), Some("Table 1 - Students"));
    }
}
