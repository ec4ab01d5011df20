// Table-of-contents discovery: finds the navigation block of the start page
// and turns its links into the list of sections to audit.
use crate::types::TocEntry;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use super::markup::{self, Element};

static LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap());

/// Class fragments that mark a div as navigation
const CONTAINER_CLASS_HINTS: &[&str] = &["toc", "menu", "sidebar", "nav", "index"];

/// Unlabeled divs need at least this many internal links to count as a TOC
const MIN_FALLBACK_LINKS: usize = 5;

pub struct TocExtractor {
    start: Url,
}

impl TocExtractor {
    pub fn new(start_url: &str) -> Result<Self> {
        let start = Url::parse(start_url).with_context(|| format!("invalid start URL {start_url}"))?;
        Ok(Self { start })
    }

    pub fn extract(&self, html: &str) -> Vec<TocEntry> {
        let html = markup::without_comments(html);
        let (start, end) = self.find_container(&html);
        let container = &html[start..end];

        let mut lists: Vec<Element> = markup::find_elements(container, "ul");
        lists.extend(markup::find_elements(container, "ol"));

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for cap in LINK_REGEX.captures_iter(container) {
            let Some(whole) = cap.get(0) else { continue };
            let Some(href) = markup::attr_value(&cap[1], "href") else {
                continue;
            };
            let title = markup::strip_tags(&cap[2]);
            if title.is_empty() {
                continue;
            }
            let Some((url, anchor)) = self.normalize(&href) else {
                continue;
            };
            if !self.is_internal(&url) || !seen.insert(url.to_string()) {
                continue;
            }

            let depth = lists.iter().filter(|list| list.contains(whole.start())).count();
            entries.push(TocEntry {
                title,
                url: url.to_string(),
                anchor,
                level: depth.max(1) as u32,
            });
        }

        tracing::info!(start_url = %self.start, sections = entries.len(), "extracted table of contents");
        entries
    }

    /// Absolute URL without fragment, plus the fragment. Fragment-only links
    /// point back into the start page and are ignored.
    fn normalize(&self, href: &str) -> Option<(Url, Option<String>)> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let mut url = self.start.join(href).ok()?;
        let anchor = url
            .fragment()
            .filter(|fragment| !fragment.is_empty())
            .map(str::to_string);
        url.set_fragment(None);
        Some((url, anchor))
    }

    fn is_internal(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https" | "file") && url.host_str() == self.start.host_str()
    }

    fn count_internal_links(&self, fragment: &str) -> usize {
        LINK_REGEX
            .captures_iter(fragment)
            .filter_map(|cap| markup::attr_value(&cap[1], "href"))
            .filter_map(|href| self.normalize(&href))
            .filter(|(url, _)| self.is_internal(url))
            .count()
    }

    fn candidate(&self, html: &str, element: &Element, min_links: usize) -> Option<(usize, usize, usize)> {
        let links = self.count_internal_links(element.outer(html));
        (links >= min_links).then_some((element.start, element.end, links))
    }

    /// The navigation candidate with the most internal links, or the whole page
    fn find_container(&self, html: &str) -> (usize, usize) {
        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
        for name in ["nav", "aside"] {
            for element in markup::find_elements(html, name) {
                candidates.extend(self.candidate(html, &element, 1));
            }
        }
        let divs = markup::find_elements(html, "div");
        for div in &divs {
            let class = div.attr("class").unwrap_or_default().to_lowercase();
            if CONTAINER_CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
                candidates.extend(self.candidate(html, div, 1));
            }
        }
        if candidates.is_empty() {
            candidates.extend(
                divs.iter()
                    .filter_map(|div| self.candidate(html, div, MIN_FALLBACK_LINKS)),
            );
        }

        // First candidate wins ties
        let mut best: Option<(usize, usize, usize)> = None;
        for candidate in candidates {
            if best.map_or(true, |(_, _, links)| candidate.2 > links) {
                best = Some(candidate);
            }
        }
        match best {
            Some((start, end, _)) => (start, end),
            None => (0, html.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const START: &str = "https://yearbook.example.org/2024/index.html";

    fn extract(html: &str) -> Vec<TocEntry> {
        TocExtractor::new(START).unwrap().extract(html)
    }

    #[test]
    fn reads_nested_lists_from_the_navigation_block() {
        let html = r#"<body>
<div class="header"><a href="/about.html">About</a></div>
<nav class="toc"><ul>
  <li><a href="students.html">Students</a>
    <ul><li><a href="enrollment.html#by-campus">Enrollment</a></li></ul>
  </li>
  <li><a href="https://yearbook.example.org/2024/staff.html">Staff</a></li>
</ul></nav>
</body>"#;
        let entries = extract(html);
        assert_eq!(
            entries,
            vec![
                TocEntry {
                    title: "Students".to_string(),
                    url: "https://yearbook.example.org/2024/students.html".to_string(),
                    anchor: None,
                    level: 1,
                },
                TocEntry {
                    title: "Enrollment".to_string(),
                    url: "https://yearbook.example.org/2024/enrollment.html".to_string(),
                    anchor: Some("by-campus".to_string()),
                    level: 2,
                },
                TocEntry {
                    title: "Staff".to_string(),
                    url: "https://yearbook.example.org/2024/staff.html".to_string(),
                    anchor: None,
                    level: 1,
                },
            ]
        );
    }

    #[test]
    fn drops_fragment_only_offsite_untitled_and_duplicate_links() {
        let html = r##"<nav>
<a href="#top">Top</a>
<a href="https://other.example.com/x.html">Elsewhere</a>
<a href="a.html"><img src="icon.png"></a>
<a href="b.html#one">B one</a>
<a href="b.html#two">B two</a>
</nav>"##;
        let entries = extract(html);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "B one");
        assert_eq!(entries[0].anchor.as_deref(), Some("one"));
    }

    #[test]
    fn falls_back_to_the_div_with_most_links() {
        let links: String = (1..=6).map(|i| format!("<a href=\"p{i}.html\">Page {i}</a>")).collect();
        let html = format!("<div><a href=\"x.html\">X</a></div><div id=\"list\">{links}</div>");
        let entries = extract(&html);
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].title, "Page 1");
    }

    #[test]
    fn whole_page_is_used_without_any_candidate() {
        let entries = extract("<p><a href=\"only.html\">Only</a></p>");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, 1);
    }
}
