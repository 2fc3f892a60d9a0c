//! Plain-text to HTML rendering for outbound mail
//!
//! Line-oriented and deterministic: blank lines separate blocks, `#`/`##`
//! prefixes become headings, `-`/`*` prefixes become list items grouped
//! into one `<ul>` per contiguous block, everything else is a paragraph.
//! Every text segment is HTML-escaped.

use std::fmt::Write as _;

/// Render a plain-text email body as HTML.
pub fn render_html(text: &str) -> String {
    let mut html = String::new();
    let mut in_list = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            close_list(&mut html, &mut in_list);
            continue;
        }
        if let Some(rest) = line.strip_prefix("##") {
            close_list(&mut html, &mut in_list);
            let _ = writeln!(html, "<h3>{}</h3>", escape(rest.trim_start()));
        } else if let Some(rest) = line.strip_prefix('#') {
            close_list(&mut html, &mut in_list);
            let _ = writeln!(html, "<h2>{}</h2>", escape(rest.trim_start()));
        } else if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            let _ = writeln!(html, "<li>{}</li>", escape(rest));
        } else {
            close_list(&mut html, &mut in_list);
            let _ = writeln!(html, "<p>{}</p>", escape(line));
        }
    }
    // A list running to end-of-input still gets closed.
    close_list(&mut html, &mut in_list);
    html
}

fn close_list(html: &mut String, in_list: &mut bool) {
    if *in_list {
        html.push_str("</ul>\n");
        *in_list = false;
    }
}

fn escape(segment: &str) -> String {
    html_escape::encode_safe(segment).into_owned()
}
