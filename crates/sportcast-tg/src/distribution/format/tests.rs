use super::*;
use crate::content::{ContentItem, PollSpec};
use crate::distribution::testing::envelope;
use expect_test::expect;
use strum::IntoEnumIterator;

fn balanced(text: &str) -> bool {
    ["b", "i", "u", "s", "a", "code", "pre"].iter().all(|tag| {
        let opened =
            text.matches(&format!("<{tag}>")).count() + text.matches(&format!("<{tag} ")).count();
        opened == text.matches(&format!("</{tag}>")).count()
    })
}

#[test]
fn betting_keeps_header_and_top_predictions() {
    let envelope = envelope(
        ContentKind::Betting,
        "<p>Premier League tips</p><p>Some intro text here</p><ul>\
        <li>Arsenal vs Chelsea: over 2.5 @ 1.85</li>\
        <li>Liverpool vs Everton: home win</li>\
        <li>Spurs vs Leeds: BTTS</li>\
        <li>City vs United: draw</li>\
        <li>Brighton vs Wolves: away</li>\
        <li>Villa vs Newcastle: over 1.5</li>\
        </ul>",
    );

    expect![[r#"
        🎯 Premier League tips
        • Arsenal vs Chelsea: over 2.5 @ 1.85
        • Liverpool vs Everton: home win
        • Spurs vs Leeds: BTTS
        • City vs United: draw
        • Brighton vs Wolves: away

        18+ Gamble responsibly."#]]
    .assert_eq(&format(&envelope, Language::En, false));
}

#[test]
fn live_keeps_match_events() {
    let envelope = envelope(
        ContentKind::Live,
        "Kick-off at Anfield\n\
        Weather is sunny\n\
        23' GOAL! Salah scores, 1-0\n\
        Fans are singing\n\
        45+2' 🟨 Yellow card for Rice\n\
        HT: 1-0",
    );

    expect![[r#"
        ⚽ Kick-off at Anfield
        23' GOAL! Salah scores, 1-0
        45+2' 🟨 Yellow card for Rice
        HT: 1-0"#]]
    .assert_eq(&format(&envelope, Language::En, false));
}

#[test]
fn summary_keeps_header_and_highlights() {
    let envelope = envelope(
        ContentKind::DailySummary,
        "<b>Daily wrap</b>\nAll matches of the day\n\n\
        Weather report for tomorrow\n\n\
        🏆 Results: Arsenal 2-1 Chelsea\n\n\
        Stadium renovation news\n\n\
        🔥 Top scorer: Haaland",
    );

    expect![[r#"
        📅 <b>Daily wrap</b>
        All matches of the day

        🏆 Results: Arsenal 2-1 Chelsea

        🔥 Top scorer: Haaland"#]]
    .assert_eq(&format(&envelope, Language::En, true));
}

#[test]
fn memes_keep_first_lines() {
    let envelope = envelope(ContentKind::Memes, "Line 1\nLine 2\n\nLine 3\nLine 4");

    expect![[r#"
        😂 Line 1
        Line 2

        Line 3"#]]
    .assert_eq(&format(&envelope, Language::En, true));
}

fn paragraphs(count: usize) -> String {
    (1..=count)
        .map(|i| format!("<p>Paragraph {i}: {}</p>", "lorem ipsum dolor sit amet ".repeat(5)))
        .collect()
}

#[test]
fn news_keeps_first_lines() {
    let formatted = format(&envelope(ContentKind::News, &paragraphs(15)), Language::En, false);

    assert!(formatted.starts_with("📰 Paragraph 1: lorem"));
    assert!(formatted.contains("Paragraph 12:"));
    assert!(!formatted.contains("Paragraph 13:"));
}

#[test]
fn news_caption_is_truncated() {
    let formatted = format(&envelope(ContentKind::News, &paragraphs(15)), Language::Fr, true);

    assert!(formatted.tg_len() <= ContentKind::News.config().max_caption_len);
    assert!(formatted.ends_with("\n\n… lire la suite"), "{formatted}");
    assert!(formatted.contains("Paragraph 5:"));
}

#[test]
fn caption_cap_is_measured_in_utf16_units() {
    // Fits into the cap in chars, but not in UTF-16 code units
    let body = "🏆 Final! ".repeat(105);
    assert!(body.chars().count() < 1000);

    let formatted = format(&envelope(ContentKind::News, &body), Language::En, true);

    assert!(formatted.tg_len() <= ContentKind::News.config().max_caption_len);
    assert!(formatted.ends_with("\n\n… continue reading"), "{formatted}");
}

#[test]
fn betting_disclaimer_survives_truncation() {
    let body = format!(
        "Tips\n{}",
        (1..=5)
            .map(|i| format!("• Match {i} vs Other: {}", "long reasoning ".repeat(20)))
            .join("\n")
    );
    let formatted = format(&envelope(ContentKind::Betting, &body), Language::Es, true);

    assert!(formatted.tg_len() <= ContentKind::Betting.config().max_caption_len);
    assert!(
        formatted.ends_with("… seguir leyendo\n\n18+ Juega con responsabilidad."),
        "{formatted}"
    );
}

#[test]
fn analysis_is_never_truncated() {
    let body = paragraphs(40);
    let formatted = format(&envelope(ContentKind::Analysis, &body), Language::En, true);

    assert!(formatted.tg_len() > crate::content::MESSAGE_LIMIT);
    assert_eq!(formatted, format!("📊 {}", sanitize(&body)));
}

#[test]
fn every_kind_fits_its_cap() {
    let body = format!(
        "<b>Bold start</b> {}\n<i>{}</i>",
        "Sentence number one. ".repeat(200),
        "tail ".repeat(100)
    );

    for kind in ContentKind::iter().filter(|&kind| kind != ContentKind::Analysis) {
        for has_image in [true, false] {
            let formatted = format(&envelope(kind, &body), Language::Pt, has_image);
            let max_len = kind.config().max_len(has_image);
            assert!(
                formatted.tg_len() <= max_len,
                "{kind} (image: {has_image}): {} > {max_len}",
                formatted.tg_len()
            );
            assert!(balanced(&formatted), "{kind}: {formatted}");
        }
    }
}

#[test]
fn title_is_bold() {
    let mut envelope = envelope(ContentKind::Coupons, "Code: WIN50");
    envelope.items[0].title = Some("Weekend coupon".to_owned());

    expect![[r#"
        🎫 <b>Weekend coupon</b>
        Code: WIN50"#]]
    .assert_eq(&format(&envelope, Language::En, false));
}

#[test]
fn emoji_is_not_duplicated() {
    let envelope = envelope(ContentKind::Live, "⚽ 12' Goal, 1-0");
    expect!["⚽ 12' Goal, 1-0"].assert_eq(&format(&envelope, Language::En, false));
}

#[test]
fn empty_content_is_a_placeholder() {
    let mut envelope = envelope(ContentKind::News, "   ");
    envelope.items.push(ContentItem::default());

    expect!["No hay contenido disponible por ahora."]
        .assert_eq(&format(&envelope, Language::Es, false));
}

#[test]
fn poll_without_items_uses_the_question() {
    let mut envelope = envelope(ContentKind::Polls, "");
    envelope.items.clear();
    envelope.poll = Some(PollSpec {
        question: "Who wins?".to_owned(),
        options: vec!["A & B".to_owned(), "C".to_owned(), " ".to_owned()],
        is_anonymous: true,
        allows_multiple_answers: false,
    });

    expect![[r#"
        📋 <b>Who wins?</b>
        • A &amp; B
        • C"#]]
    .assert_eq(&format(&envelope, Language::En, false));
}
