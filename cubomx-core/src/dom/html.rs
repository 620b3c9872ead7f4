//! HTML fragment parsing and serialization.
//!
//! A forgiving tokenizer, not a complete HTML5 parser. It understands
//! what server-rendered fragments contain: start/end tags, quoted and bare
//! attributes, void elements, comments, doctypes, raw-text elements and
//! `<template>` content. Unmatched end tags are ignored; unclosed elements
//! are closed at the end of input.

use super::{NodeId, NodeKind, Tree};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Parse `html` and append the resulting nodes to `parent`.
pub(crate) fn parse_into(tree: &mut Tree, parent: NodeId, html: &str) {
    // Each entry is (insertion point, tag that opened it).
    let mut stack: Vec<(NodeId, String)> = vec![(parent, String::new())];
    let bytes = html.as_bytes();
    let mut pos = 0;

    while pos < html.len() {
        let current = stack.last().map(|(id, _)| *id).unwrap_or(parent);
        let rest = &html[pos..];

        if rest.starts_with("<!--") {
            let (body, end) = match rest[4..].find("-->") {
                Some(i) => (&rest[4..4 + i], 4 + i + 3),
                None => (&rest[4..], rest.len()),
            };
            let comment = tree.alloc(NodeKind::Comment(body.to_string()));
            tree.attach(current, comment, None);
            pos += end;
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
        } else if rest.starts_with("</") {
            let (name, end) = match rest.find('>') {
                Some(i) => (&rest[2..i], i + 1),
                None => (&rest[2..], rest.len()),
            };
            let name = name.trim().to_ascii_lowercase();
            if let Some(depth) = stack.iter().rposition(|(_, tag)| *tag == name) {
                if depth > 0 {
                    stack.truncate(depth);
                }
            }
            pos += end;
        } else if rest.starts_with('<')
            && bytes
                .get(pos + 1)
                .map(|b| b.is_ascii_alphabetic())
                .unwrap_or(false)
        {
            let (tag, attrs, self_closing, consumed) = parse_start_tag(rest);
            pos += consumed;
            let element = tree.alloc_element(&tag);
            if let Some(el) = tree.element_mut(element) {
                for (name, value) in attrs {
                    el.attrs.entry(name).or_insert(value);
                }
            }
            tree.attach(current, element, None);

            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let tail = &html[pos..];
                let close = find_ascii_case_insensitive(tail, &format!("</{tag}"));
                let raw = &tail[..close.unwrap_or(tail.len())];
                if !raw.is_empty() {
                    let text = if tag == "textarea" || tag == "title" {
                        decode_entities(raw)
                    } else {
                        raw.to_string()
                    };
                    let node = tree.alloc(NodeKind::Text(text));
                    tree.attach(element, node, None);
                }
                pos += raw.len();
                if close.is_some() {
                    let tail = &html[pos..];
                    pos += tail.find('>').map(|i| i + 1).unwrap_or(tail.len());
                }
            } else if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
                let insertion = tree
                    .element(element)
                    .and_then(|e| e.content)
                    .unwrap_or(element);
                stack.push((insertion, tag));
            }
        } else {
            let end = rest
                .char_indices()
                .skip(1)
                .find(|(_, c)| *c == '<')
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let text = decode_entities(&rest[..end]);
            let node = tree.alloc(NodeKind::Text(text));
            tree.attach(current, node, None);
            pos += end;
        }
    }
}

/// Returns (tag, attributes, self-closing, bytes consumed).
fn parse_start_tag(input: &str) -> (String, Vec<(String, String)>, bool, usize) {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 1;
    let mut tag = String::new();
    while i < chars.len() {
        let c = chars[i].1;
        if c.is_whitespace() || c == '>' || c == '/' {
            break;
        }
        tag.push(c.to_ascii_lowercase());
        i += 1;
    }

    let mut attrs = Vec::new();
    let mut self_closing = false;
    loop {
        while i < chars.len() && chars[i].1.is_whitespace() {
            i += 1;
        }
        let Some(&(_, c)) = chars.get(i) else {
            break;
        };
        if c == '>' {
            i += 1;
            break;
        }
        if c == '/' {
            self_closing = matches!(chars.get(i + 1), Some((_, '>')));
            i += 1;
            continue;
        }

        let mut name = String::new();
        while i < chars.len() {
            let c = chars[i].1;
            if c.is_whitespace() || c == '=' || c == '>' || (c == '/' && !name.is_empty()) {
                break;
            }
            name.push(c.to_ascii_lowercase());
            i += 1;
        }
        while i < chars.len() && chars[i].1.is_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if matches!(chars.get(i), Some((_, '='))) {
            i += 1;
            while i < chars.len() && chars[i].1.is_whitespace() {
                i += 1;
            }
            match chars.get(i).map(|(_, c)| *c) {
                Some(quote @ ('"' | '\'')) => {
                    i += 1;
                    let mut raw = String::new();
                    while i < chars.len() && chars[i].1 != quote {
                        raw.push(chars[i].1);
                        i += 1;
                    }
                    i += 1;
                    value = decode_entities(&raw);
                }
                _ => {
                    let mut raw = String::new();
                    while i < chars.len() && !chars[i].1.is_whitespace() && chars[i].1 != '>' {
                        raw.push(chars[i].1);
                        i += 1;
                    }
                    value = decode_entities(&raw);
                }
            }
        }
        if !name.is_empty() {
            attrs.push((name, value));
        }
    }

    let consumed = chars.get(i).map(|(b, _)| *b).unwrap_or(input.len());
    (tag, attrs, self_closing, consumed)
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';').filter(|e| *e <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
            }
            _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

/// Append the markup of `node` (including the node itself) to `out`.
pub(crate) fn serialize(tree: &Tree, node: NodeId, out: &mut String) {
    let Some(data) = tree.get(node) else {
        return;
    };
    match &data.kind {
        NodeKind::Text(text) => {
            let raw_parent = data
                .parent
                .and_then(|p| tree.element(p))
                .map(|e| e.tag == "script" || e.tag == "style")
                .unwrap_or(false);
            if raw_parent {
                out.push_str(text);
            } else {
                out.push_str(&escape(text, false));
            }
        }
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Document | NodeKind::Fragment => {
            for child in &data.children {
                serialize(tree, *child, out);
            }
        }
        NodeKind::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                return;
            }
            let source = el.content.unwrap_or(node);
            for child in tree.children(source) {
                serialize(tree, *child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Document;

    #[test]
    fn parses_directive_attributes() {
        let doc = Document::parse(
            r#"<button @click.prevent="count++" mx-on:keyup='go()' :text=n disabled>x</button>"#,
        );
        let button = doc.query_selector(doc.root(), "button").unwrap();
        let attrs = doc.attributes(button);
        assert_eq!(
            attrs,
            vec![
                ("@click.prevent".to_string(), "count++".to_string()),
                ("mx-on:keyup".to_string(), "go()".to_string()),
                (":text".to_string(), "n".to_string()),
                ("disabled".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn void_and_self_closing_elements_do_not_nest() {
        let doc = Document::parse(r#"<div><input value="1"><br/><span>a</span></div>"#);
        let div = doc.query_selector(doc.root(), "div").unwrap();
        assert_eq!(doc.element_children(div).len(), 3);
    }

    #[test]
    fn decodes_and_reescapes_entities() {
        let doc = Document::parse(r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp;&amp; 3 &#62; 2</p>"#);
        let p = doc.query_selector(doc.root(), "p").unwrap();
        assert_eq!(doc.text_content(p), "1 < 2 && 3 > 2");
        assert_eq!(doc.attribute(p, "title").as_deref(), Some("a \"b\""));
        assert_eq!(
            doc.outer_html(p),
            r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp;&amp; 3 &gt; 2</p>"#
        );
    }

    #[test]
    fn raw_text_is_not_parsed() {
        let doc = Document::parse("<script>if (a < b) { x = '<p>'; }</script><p>after</p>");
        let script = doc.query_selector(doc.root(), "script").unwrap();
        assert_eq!(doc.text_content(script), "if (a < b) { x = '<p>'; }");
        assert_eq!(doc.query_selector_all(doc.root(), "p").len(), 1);
    }

    #[test]
    fn stray_end_tags_are_ignored() {
        let doc = Document::parse("<div></span><p>x</p></div>");
        let div = doc.query_selector(doc.root(), "div").unwrap();
        assert_eq!(doc.inner_html(div), "<p>x</p>");
    }

    #[test]
    fn unterminated_markup_with_multibyte_text() {
        let doc = Document::parse("<p>x</é");
        let p = doc.query_selector(doc.root(), "p").unwrap();
        assert_eq!(doc.text_content(p), "x");

        let doc = Document::parse("<p>x</p><!--éé");
        assert_eq!(doc.children(doc.root()).len(), 2);
        assert_eq!(doc.inner_html(doc.root()), "<p>x</p><!--éé-->");

        let doc = Document::parse("<!--ü--><b>ß</b>");
        let b = doc.query_selector(doc.root(), "b").unwrap();
        assert_eq!(doc.text_content(b), "ß");
    }
}
