//! Reduction of arbitrary HTML to the subset understood by Telegram.
use lazy_regex::regex;
use std::borrow::Cow;

/// Inline tags that survive the sanitization, in their canonical form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InlineTag {
    Bold,
    Italic,
    Underline,
    Strike,
    Link,
    Code,
    Pre,
}

impl InlineTag {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "b" | "strong" => Self::Bold,
            "i" | "em" => Self::Italic,
            "u" | "ins" => Self::Underline,
            "s" | "strike" | "del" => Self::Strike,
            "a" => Self::Link,
            "code" => Self::Code,
            "pre" => Self::Pre,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Bold => "b",
            Self::Italic => "i",
            Self::Underline => "u",
            Self::Strike => "s",
            Self::Link => "a",
            Self::Code => "code",
            Self::Pre => "pre",
        }
    }
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "li"
            | "td"
            | "th"
            | "br"
            | "hr"
            | "blockquote"
            | "ul"
            | "ol"
            | "table"
            | "tr"
            | "section"
            | "article"
            | "header"
            | "footer"
    )
}

/// Strips every tag except the inline allow-list, turns block tags into
/// newlines, drops `script` and `style` with their content, normalizes the
/// entities in the text, balances the remaining tags and collapses the
/// whitespace.
///
/// The output of this function is a fixed point of it, so it may be used
/// again to rebalance the tags after the text was cut into pieces.
pub(crate) fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut open: Vec<InlineTag> = vec![];
    let mut skipping: Option<String> = None;
    let mut last_end = 0;

    let tag_re = regex!(r"(?s)<!--.*?-->|<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^<>]*)>");

    for caps in tag_re.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        if skipping.is_none() {
            push_text(&mut out, &input[last_end..whole.start()]);
        }
        last_end = whole.end();

        // Comment
        let Some(name) = caps.get(2) else {
            continue;
        };

        let name = name.as_str().to_ascii_lowercase();
        let closing = !caps[1].is_empty();
        let attrs = caps.get(3).map(|attrs| attrs.as_str()).unwrap_or_default();
        let self_closing = attrs.trim_end().ends_with('/');

        if let Some(skipped) = &skipping {
            if closing && *skipped == name {
                skipping = None;
            }
            continue;
        }

        if matches!(name.as_str(), "script" | "style") {
            if !closing && !self_closing {
                skipping = Some(name);
            }
            continue;
        }

        if is_block_tag(&name) {
            match (name.as_str(), closing) {
                ("li", false) => out.push_str("\n• "),
                // The next item starts on its own line anyway
                ("li", true) => {}
                _ => out.push('\n'),
            }
            continue;
        }

        let Some(tag) = InlineTag::from_name(&name) else {
            continue;
        };

        if closing {
            close_tag(&mut out, &mut open, tag);
            continue;
        }

        if self_closing {
            continue;
        }

        if tag == InlineTag::Link {
            // Links without a target don't carry any meaning
            let Some(href) = extract_href(attrs) else {
                continue;
            };
            out.push_str("<a href=\"");
            out.push_str(&escape_attr(&href));
            out.push_str("\">");
        } else {
            out.push('<');
            out.push_str(tag.name());
            out.push('>');
        }

        open.push(tag);
    }

    if skipping.is_none() {
        push_text(&mut out, &input[last_end..]);
    }

    while let Some(tag) = open.pop() {
        push_closing(&mut out, tag);
    }

    collapse_whitespace(&out)
}

/// Closes `tag` along with the tags opened inside of it. Closing tags
/// that don't match any open tag are dropped.
fn close_tag(out: &mut String, open: &mut Vec<InlineTag>, tag: InlineTag) {
    let Some(position) = open.iter().rposition(|&open| open == tag) else {
        return;
    };
    for tag in open.drain(position..).rev() {
        push_closing(out, tag);
    }
}

fn push_closing(out: &mut String, tag: InlineTag) {
    out.push_str("</");
    out.push_str(tag.name());
    out.push('>');
}

fn push_text(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str(&escape_text(&decode_entities(text)));
}

fn extract_href(attrs: &str) -> Option<String> {
    let caps = regex!(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).captures(attrs)?;
    let href = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    let href = decode_entities(href.as_str().trim());
    (!href.is_empty()).then(|| href.into_owned())
}

/// Decodes every entity separately, so a stray ampersand in the text
/// doesn't make the whole text undecodable.
pub(crate) fn decode_entities(text: &str) -> Cow<'_, str> {
    regex!(r"&#?[a-zA-Z0-9]+;").replace_all(text, |caps: &lazy_regex::Captures<'_>| {
        let entity = &caps[0];
        htmlescape::decode_html(entity).unwrap_or_else(|_| entity.to_owned())
    })
}

pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for char in text.chars() {
        match char {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(char),
        }
    }
    out
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

fn collapse_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace(['\r', '\t'], " ");
    let text = regex!(r" {2,}").replace_all(&text, " ");
    let text = regex!(r" *\n *").replace_all(&text, "\n");
    let text = regex!(r"\n{3,}").replace_all(&text, "\n\n");
    text.trim().to_owned()
}

/// Removes all tags leaving only the (still escaped) text
pub(crate) fn strip_tags(html: &str) -> String {
    regex!(r"</?[a-z]+[^<>]*>").replace_all(html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{expect, Expect};

    #[track_caller]
    fn check(input: &str, expected: Expect) {
        let actual = sanitize(input);
        expected.assert_eq(&actual);
        assert_eq!(sanitize(&actual), actual, "sanitize must be idempotent");
    }

    #[test]
    fn block_tags_become_newlines() {
        check("<div><p>Hello <b>World</b></p></div>", expect!["Hello <b>World</b>"]);
        check(
            "<h1>Title</h1><p>First</p><p>Second<br/>line</p>",
            expect![[r#"
                Title

                First

                Second
                line"#]],
        );
    }

    #[test]
    fn list_items_are_bullets() {
        check(
            "<ul><li>One</li><li><strong>Two</strong></li></ul>",
            expect![[r#"
                • One
                • <b>Two</b>"#]],
        );
    }

    #[test]
    fn unsupported_markup_is_stripped() {
        check(
            r#"<span style="color:red">Red</span> <em>it</em> <del>old</del> <img src="x.png">"#,
            expect!["Red <i>it</i> <s>old</s>"],
        );
    }

    #[test]
    fn scripts_and_styles_are_dropped_with_content() {
        check(
            "<style>p { color: red }</style>Before<script>alert('<b>x</b>')</script> after",
            expect!["Before after"],
        );
    }

    #[test]
    fn links_keep_only_href() {
        check(
            r#"<a class="x" href="https://example.com/?a=1&amp;b=2" target="_blank">link</a> <a>no href</a>"#,
            expect![[r#"<a href="https://example.com/?a=1&amp;b=2">link</a> no href"#]],
        );
    }

    #[test]
    fn entities_are_normalized() {
        check(
            "Tom &amp; Jerry &lt;3 &quot;AT&T&quot; 5 > 3 &bogus;",
            expect![[r#"Tom &amp; Jerry &lt;3 "AT&amp;T" 5 &gt; 3 &amp;bogus;"#]],
        );
    }

    #[test]
    fn tags_are_balanced() {
        check("</b>stray <b>open <i>nested</b> tail", expect!["stray <b>open <i>nested</i></b> tail"]);
        check("<b>never closed", expect!["<b>never closed</b>"]);
        check("<code>x < y</code>", expect!["<code>x &lt; y</code>"]);
    }

    #[test]
    fn whitespace_is_collapsed() {
        check(
            "  a    b \n\n\n\n\n c\t\td  ",
            expect![[r#"
                a b

                c d"#]],
        );
    }

    #[test]
    fn comments_are_dropped() {
        check("a<!-- <b>hidden</b> -->b", expect!["ab"]);
    }

    #[test]
    fn strip_tags_keeps_escaped_text() {
        assert_eq!(strip_tags(r#"<b>x &lt; y</b> <a href="u">z</a>"#), "x &lt; y z");
    }
}
