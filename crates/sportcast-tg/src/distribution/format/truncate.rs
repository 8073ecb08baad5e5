//! Cutting of sanitized HTML without breaking its tags or entities.
use super::html::strip_tags;
use crate::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Cut {
    /// Byte offset, the text before it is kept
    offset: usize,

    /// Number of UTF-16 code units kept
    units: usize,
}

#[derive(Debug, Default)]
struct Cuts {
    newline: Option<Cut>,
    sentence: Option<Cut>,
    word: Option<Cut>,
    any: Option<Cut>,
}

/// Finds the last positions not farther than `budget` UTF-16 code units
/// where no tag is
/// open and no entity is being spelled out. The text must be the output of
/// [`super::html::sanitize`].
fn scan(text: &str, budget: usize, min_offset: usize) -> Cuts {
    let mut cuts = Cuts::default();
    let mut depth = 0_usize;
    let mut tag_start: Option<usize> = None;
    let mut in_entity = false;
    let mut last_visible = None;
    let mut units = 0;

    for (offset, char) in text.char_indices() {
        if units > budget {
            break;
        }
        let kept = units;
        units += char.len_utf16();

        if depth == 0 && tag_start.is_none() && !in_entity && offset > min_offset {
            let cut = Some(Cut { offset, units: kept });
            cuts.any = cut;
            if char == '\n' {
                cuts.newline = cut;
            }
            if char.is_whitespace() {
                cuts.word = cut;
                if matches!(last_visible, Some('.' | '!' | '?' | '…')) {
                    cuts.sentence = cut;
                }
            }
        }

        match char {
            '<' => tag_start = Some(offset),
            '>' => {
                if let Some(start) = tag_start.take() {
                    if text[start..].starts_with("</") {
                        depth = depth.saturating_sub(1);
                    } else {
                        depth += 1;
                    }
                }
            }
            '&' => in_entity = true,
            ';' if in_entity => {
                in_entity = false;
                last_visible = Some(';');
            }
            _ if tag_start.is_none() && !in_entity => last_visible = Some(char),
            _ => {}
        }
    }

    cuts
}

/// Picks the best cut, preferring the ones that keep at least a half of the
/// budget: a newline, then a sentence end, then a word boundary.
fn pick_cut(text: &str, budget: usize, min_offset: usize) -> Option<usize> {
    let cuts = scan(text, budget, min_offset);
    let long_enough = |cut: Option<Cut>| cut.filter(|cut| cut.units * 2 >= budget);

    long_enough(cuts.newline)
        .or_else(|| long_enough(cuts.sentence))
        .or_else(|| long_enough(cuts.word))
        .or(cuts.newline)
        .or(cuts.sentence)
        .or(cuts.word)
        .or(cuts.any)
        .map(|cut| cut.offset)
}

/// Cuts `text` so that the kept part followed by the `tail` fits into
/// `max_len` UTF-16 code units. The first `min_keep` bytes (e.g. the emoji prefix) alone
/// are never considered a meaningful result. If no cut keeps the tags
/// balanced, the text is truncated as plain text.
pub(crate) fn truncate_html(text: &str, max_len: usize, tail: &str, min_keep: usize) -> String {
    let budget = max_len.saturating_sub(tail.tg_len());

    if text.tg_len() <= budget {
        return format!("{text}{tail}");
    }

    if let Some(offset) = pick_cut(text, budget, min_keep) {
        return format!("{}{tail}", text[..offset].trim_end());
    }

    debug!("No markup-safe cut found, falling back to plain text");

    let plain = strip_tags(text);
    if plain.tg_len() <= budget {
        return format!("{}{tail}", plain.trim_end());
    }

    match pick_cut(&plain, budget, min_keep) {
        Some(offset) => format!("{}{tail}", plain[..offset].trim_end()),
        None => {
            let tail = tail.trim();
            tail[..tail.tg_boundary(max_len)].to_owned()
        }
    }
}

/// Splits `text` into chunks of at most `limit` UTF-16 code units each, cutting only
/// where no tag is open.
pub(crate) fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = vec![];
    let mut rest = text.trim();

    while !rest.is_empty() {
        if rest.tg_len() <= limit {
            chunks.push(rest.to_owned());
            break;
        }

        let Some(offset) = pick_cut(rest, limit, 0) else {
            // A single tag spans over the limit
            let plain = strip_tags(rest);
            chunks.extend(split_message(&plain, limit));
            break;
        };

        chunks.push(rest[..offset].trim_end().to_owned());
        rest = rest[offset..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn balanced(text: &str) -> bool {
        ["b", "i", "u", "s", "a", "code", "pre"].iter().all(|tag| {
            let opened = text.matches(&format!("<{tag}>")).count()
                + text.matches(&format!("<{tag} ")).count();
            let closed = text.matches(&format!("</{tag}>")).count();
            opened == closed
        })
    }

    #[test]
    fn text_within_budget_is_kept_whole() {
        assert_eq!(truncate_html("<b>hi</b>", 12, "...", 0), "<b>hi</b>...");
    }

    #[test]
    fn prefers_newline() {
        let text = "First line is here\nSecond line. Is long enough";
        let actual = truncate_html(text, 30, "…", 0);
        expect!["First line is here…"].assert_eq(&actual);
    }

    #[test]
    fn prefers_sentence_over_word() {
        let text = "One two three. Four five six seven eight";
        let actual = truncate_html(text, 25, "…", 0);
        expect!["One two three.…"].assert_eq(&actual);
    }

    #[test]
    fn never_cuts_inside_a_tag() {
        let text = "Intro <b>bold words that go on and on</b> outro";
        let actual = truncate_html(text, 30, "…", 0);
        expect!["Intro…"].assert_eq(&actual);
        assert!(balanced(&actual));
    }

    #[test]
    fn never_cuts_inside_an_entity() {
        let text = "Tom &amp;&amp;&amp;&amp;&amp;&amp; Jerry";
        let actual = truncate_html(text, 12, "", 0);
        expect!["Tom"].assert_eq(&actual);
    }

    #[test]
    fn falls_back_to_plain_text() {
        let text = "<b>everything is bold and nothing can be cut safely</b>";
        let actual = truncate_html(text, 20, "…", 0);
        expect!["everything is bold…"].assert_eq(&actual);
        assert!(actual.tg_len() <= 20);
    }

    #[test]
    fn result_fits_the_limit() {
        let text = "word ".repeat(500);
        for max_len in [10, 57, 100, 1000] {
            let actual = truncate_html(&text, max_len, "\n\n… continue reading", 0);
            assert!(actual.tg_len() <= max_len, "{max_len}: {actual}");
        }
    }

    #[test]
    fn astral_emojis_count_twice() {
        // 12 chars, but 20 UTF-16 code units
        let text = "🏆🏆🏆🏆🏆🏆🏆🏆 win";
        let actual = truncate_html(text, 12, "…", 0);
        assert!(actual.tg_len() <= 12, "{actual}");
        expect!["🏆🏆🏆🏆🏆…"].assert_eq(&actual);

        let chunks = split_message(&"🏆 ".repeat(10), 8);
        assert!(chunks.iter().all(|chunk| chunk.tg_len() <= 8), "{chunks:?}");
        assert_eq!(chunks.concat().matches('🏆').count(), 10);
    }

    #[test]
    fn split_keeps_tags_balanced() {
        let text = "<b>Para one</b> text\n\n<i>Para two is longer</i>\n\nPara three";
        let chunks = split_message(text, 25);
        expect![[r#"
            [
                "<b>Para one</b> text",
                "<i>Para two is longer</i>",
                "Para three",
            ]
        "#]]
        .assert_debug_eq(&chunks);
        assert!(chunks.iter().all(|chunk| balanced(chunk) && chunk.tg_len() <= 25));
    }

    #[test]
    fn split_plain_fallback() {
        let chunks = split_message("<b>aaaa bbbb cccc</b>", 10);
        expect![[r#"
            [
                "aaaa bbbb",
                "cccc",
            ]
        "#]]
        .assert_debug_eq(&chunks);
    }
}
