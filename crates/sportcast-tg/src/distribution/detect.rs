//! Cheap guess of the language of the generated text. The result is advisory,
//! it is only used to spot the content generated in a wrong language.
use crate::content::Language;
use crate::distribution::format::strip_tags;
use lazy_regex::{regex, regex_is_match};
use std::collections::HashMap;
use strum::IntoEnumIterator;

/// Minimum number of stop words required to make a guess
const MIN_HITS: usize = 3;

fn stop_words(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => &[
            "the", "and", "is", "of", "to", "in", "with", "for", "this", "will", "match", "win",
        ],
        Language::Es => &[
            "el", "la", "los", "las", "y", "en", "con", "para", "del", "que", "partido", "es",
        ],
        Language::Fr => &[
            "le", "la", "les", "des", "et", "est", "pour", "avec", "du", "une", "match", "sur",
        ],
        Language::Pt => &[
            "o", "os", "as", "e", "em", "com", "para", "do", "da", "não", "uma", "jogo",
        ],
        Language::Sw => &[
            "na", "ya", "wa", "kwa", "ni", "katika", "za", "mechi", "timu", "leo", "hii",
        ],
        // Detected by the script
        Language::Am => &[],
    }
}

/// Returns `None` if the text is too short or ambiguous
pub(crate) fn detect(html: &str) -> Option<Language> {
    let text = strip_tags(html).to_lowercase();

    if regex_is_match!(r"\p{Ethiopic}{3}", &text) {
        return Some(Language::Am);
    }

    let mut hits: HashMap<Language, usize> = HashMap::new();

    for word in regex!(r"\p{L}+").find_iter(&text) {
        for language in Language::iter() {
            if stop_words(language).contains(&word.as_str()) {
                *hits.entry(language).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<_> = hits.into_iter().collect();
    ranked.sort_by(|(lhs_lang, lhs), (rhs_lang, rhs)| rhs.cmp(lhs).then(lhs_lang.cmp(rhs_lang)));

    match ranked.as_slice() {
        [(language, hits), rest @ ..] if *hits >= MIN_HITS => {
            // A tie means we can't tell
            let runner_up = rest.first().map(|(_, hits)| *hits).unwrap_or(0);
            (*hits > runner_up).then_some(*language)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_languages() {
        let cases = [
            ("The match will start in the evening and the fans are ready", Some(Language::En)),
            ("El partido de hoy es para los aficionados del Real Madrid", Some(Language::Es)),
            ("Le match est prévu pour ce soir avec les supporters", Some(Language::Fr)),
            ("O jogo de hoje é para os torcedores do Flamengo com uma vitória", Some(Language::Pt)),
            ("Mechi ya leo ni kati ya timu mbili kwa ajili ya ubingwa", Some(Language::Sw)),
            ("<b>ዛሬ</b> ጨዋታ አለ", Some(Language::Am)),
            ("Goal!", None),
        ];

        for (text, expected) in cases {
            assert_eq!(detect(text), expected, "{text}");
        }
    }
}
