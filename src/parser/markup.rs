use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::text::clean_text;

/// Elements dropped with all of their descendants.
static STRIP_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script, style, meta, link, head, title, nav, noscript, iframe, button, input, img",
    )
    .unwrap()
});
static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static DIV_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static ANY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());

/// Text found in EDGAR filing-index navigation tables.
const NAV_TABLE_MARKERS: &[&str] = &["Document Format Files", "Filing Detail", "tableFile", "Navigation"];

/// Case-sensitive id/class fragments of EDGAR page chrome.
const LAYOUT_TOKENS: &[&str] = &[
    "header",
    "footer",
    "breadCrumb",
    "breadcrumb",
    "formDiv",
    "form-wrapper",
    "mailer",
];

/// Elements whose boundaries start a new line when the tree is flattened.
const BLOCK_TAGS: &[&str] = &[
    "html", "body", "address", "article", "aside", "blockquote", "br", "center", "dd", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "li", "main", "ol", "p", "pre", "section", "table", "tbody", "td",
    "tfoot", "th", "thead", "tr", "ul",
];

/// Elements kept by the empty-element sweep even though they carry no text.
const LINE_BREAK_TAGS: &[&str] = &["br", "hr"];

const EMPTY_SWEEPS: usize = 2;

/// Turn a raw 8-K markup document into clean prose.
///
/// Parsing is tolerant: malformed markup never fails, it only yields less
/// text. Documents made entirely of boilerplate come back as "".
///
/// Entities are decoded, so escaped tags (`&lt;b&gt;`) come out as literal
/// markup and a second pass would strip them.
pub fn extract(raw_markup: &str) -> String {
    if raw_markup.trim().is_empty() {
        return String::new();
    }

    let mut document = Html::parse_document(raw_markup);
    prune(&mut document);

    let mut flat = String::with_capacity(raw_markup.len() / 2);
    flatten_into(document.root_element(), &mut flat);
    clean_text(&flat)
}

/// Remove non-content elements, navigation tables, page chrome and, finally,
/// any element left without text.
fn prune(document: &mut Html) {
    let detach_all = |document: &mut Html, ids: Vec<_>| {
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    };

    let stripped: Vec<_> = document.select(&STRIP_SELECTOR).map(|el| el.id()).collect();
    detach_all(document, stripped);

    let nav_tables: Vec<_> = document
        .select(&TABLE_SELECTOR)
        .filter(|table| {
            let text: String = table.text().collect();
            NAV_TABLE_MARKERS.iter().any(|marker| text.contains(marker))
        })
        .map(|table| table.id())
        .collect();
    detach_all(document, nav_tables);

    let chrome: Vec<_> = document
        .select(&DIV_SELECTOR)
        .filter(|div| is_layout_chrome(div))
        .map(|div| div.id())
        .collect();
    detach_all(document, chrome);

    // An emptied child can leave its parent empty; a second sweep catches it.
    for _ in 0..EMPTY_SWEEPS {
        let root = document.root_element().id();
        let empty: Vec<_> = document
            .select(&ANY_SELECTOR)
            .filter(|el| el.id() != root)
            .filter(|el| !LINE_BREAK_TAGS.contains(&el.value().name()))
            .filter(|el| el.text().all(|t| t.trim().is_empty()))
            .map(|el| el.id())
            .collect();
        if empty.is_empty() {
            break;
        }
        detach_all(document, empty);
    }
}

fn is_layout_chrome(div: &ElementRef<'_>) -> bool {
    let id = div.value().id().unwrap_or("");
    let classes: Vec<&str> = div.value().classes().collect();
    let haystack = format!("{} {}", id, classes.join(" "));
    LAYOUT_TOKENS.iter().any(|token| haystack.contains(token))
}

/// Depth-first text collection with a newline around every block element.
fn flatten_into(element: ElementRef<'_>, out: &mut String) {
    let is_block = BLOCK_TAGS.contains(&element.value().name());
    if is_block {
        out.push('\n');
    }
    // Adjacent inline elements (`<span>a</span><span>b</span>`) need a gap.
    let mut after_inline_element = false;
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let inline = !BLOCK_TAGS.contains(&child_el.value().name());
            if inline && after_inline_element && !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
            flatten_into(child_el, out);
            after_inline_element = inline;
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            after_inline_element = false;
        }
    }
    if is_block {
        out.push('\n');
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_paragraph_text_and_drops_header_div() {
        let html = r#"<html><body><p>Apple Inc. announced quarterly earnings results for Q4 2024. Revenue increased by 10% compared to last quarter.</p><div id="header">SEC.gov</div></body></html>"#;
        let text = extract(html);
        assert!(text.contains("Apple Inc. announced quarterly earnings results"));
        assert!(text.contains("Revenue increased by 10%"));
        assert!(!text.contains("SEC.gov"));
    }

    #[test]
    fn strips_script_style_and_head() {
        let html = r#"<html><head><title>Form 8-K document title</title><style>p { color: red; }</style></head>
<body><script>console.log('tracking pixel loaded');</script>
<p>The board approved a share repurchase program.</p>
<noscript>Please enable JavaScript to continue</noscript>
<button>Download the complete filing</button></body></html>"#;
        let text = extract(html);
        assert_eq!(text, "The board approved a share repurchase program.");
    }

    #[test]
    fn drops_navigation_tables() {
        let html = r#"<body>
<table><tr><td>Document Format Files</td></tr><tr><td>d259993d8k.htm primary document</td></tr></table>
<table><tr><td>Item 2.02 Results of Operations and Financial Condition</td></tr></table>
</body>"#;
        let text = extract(html);
        assert!(!text.contains("d259993d8k.htm"));
        assert!(text.contains("Results of Operations and Financial Condition"));
    }

    #[test]
    fn layout_tokens_are_case_sensitive_substrings() {
        let html = r#"<body>
<div class="page-footer-links">Privacy policy and site map links</div>
<div id="PageHeader">Registrant announced a new credit facility.</div>
</body>"#;
        let text = extract(html);
        assert!(!text.contains("Privacy policy"));
        // "Header" does not contain "header"
        assert!(text.contains("Registrant announced a new credit facility."));
    }

    #[test]
    fn inline_markup_stays_on_one_line() {
        let html = "<p>Tesla <b>appointed</b> a new <i>Chief Financial Officer</i> effective today.</p>";
        assert_eq!(
            extract(html),
            "Tesla appointed a new Chief Financial Officer effective today."
        );
    }

    #[test]
    fn adjacent_inline_elements_are_separated() {
        let html = "<div><span>Apple Inc.</span><span>announced results for Q4</span></div>";
        assert_eq!(extract(html), "Apple Inc. announced results for Q4");

        let html = "<p>The <i>Chief Operating Officer</i>, Jeff Williams, will retire.</p>";
        assert_eq!(extract(html), "The Chief Operating Officer, Jeff Williams, will retire.");

        let html = "<div><span>Revenue grew </span><span>by 10% year over year</span></div>";
        assert_eq!(extract(html), "Revenue grew by 10% year over year");
    }

    #[test]
    fn line_breaks_split_lines() {
        let html = "<p>The merger agreement was signed.<br>Closing is expected in Q3 2025.</p>";
        assert_eq!(
            extract(html),
            "The merger agreement was signed.\nClosing is expected in Q3 2025."
        );
    }

    #[test]
    fn empty_and_noise_only_documents() {
        assert_eq!(extract(""), "");
        assert_eq!(extract("   "), "");
        assert_eq!(
            extract("<html><body><p>SEC.gov | EDGAR Filing Detail</p><p>☐ ☐ ☐ ☐ ☐ ☐ ☐ ☐</p></body></html>"),
            ""
        );
    }

    #[test]
    fn malformed_markup_does_not_fail() {
        let text = extract("<div><p>Unclosed paragraph about a supply agreement<table><tr><td>");
        assert_eq!(text, "Unclosed paragraph about a supply agreement");
    }

    #[test]
    fn no_short_lines_in_output() {
        let html = "<div>Item 1.01</div><div>OK</div><p>Entry into a Material Definitive Agreement with Foxconn.</p>";
        let text = extract(html);
        assert!(text.lines().all(|l| l.chars().count() >= 10));
        assert!(text.contains("Material Definitive Agreement"));
    }

    /// Holds for output free of markup characters. Escaped tags are decoded on
    /// the first pass and parsed as tags on the second, see below.
    #[test]
    fn cleaning_is_a_projection() {
        let html = std::fs::read_to_string("tests/fixtures/sample_8k.html").unwrap();
        let once = extract(&html);
        assert!(!once.is_empty());
        assert_eq!(extract(&once), once);
    }

    #[test]
    fn escaped_markup_is_decoded_once() {
        let html = "<p>Revenue was &lt;b&gt;flat&lt;/b&gt; compared with the prior year.</p>";
        let once = extract(html);
        assert_eq!(once, "Revenue was <b>flat</b> compared with the prior year.");
        assert_eq!(extract(&once), "Revenue was flat compared with the prior year.");
    }

    #[test]
    fn fixture_noise_excluded() {
        let html = std::fs::read_to_string("tests/fixtures/sample_8k.html").unwrap();
        let text = extract(&html);
        for phrase in ["SEC.gov", "EDGAR", "Washington, D.C. 20549", "☐", "Commission File Number"] {
            assert!(!text.contains(phrase), "{} leaked into: {}", phrase, text);
        }
        assert!(text.contains("Apple Inc. announced"));
        assert!(text.contains("Chief Operating Officer"));
    }
}
