//! Localized boilerplate strings visible to the channel subscribers.
use crate::content::Language;

/// Keys of the localized strings. The English table covers every key, so
/// the subscribers never see a raw key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Label {
    PlaceBet,
    GetCoupon,
    CopyCode,
    Share,
    FullAnalysis,
    JoinChannel,
    ContinueReading,
    NoContent,
    GamblingDisclaimer,
}

impl Label {
    pub fn localize(self, language: Language) -> &'static str {
        let translated = match language {
            Language::En => None,
            Language::Es => es(self),
            Language::Fr => fr(self),
            Language::Pt => pt(self),
            Language::Am => am(self),
            Language::Sw => sw(self),
        };
        translated.unwrap_or_else(|| en(self))
    }
}

/// Resolves the label of a custom button, that is either a key of the label
/// table or a literal text.
pub fn localize_custom(label: &str, language: Language) -> String {
    match label.parse::<Label>() {
        Ok(key) => key.localize(language).to_owned(),
        Err(_) => label.to_owned(),
    }
}

fn en(label: Label) -> &'static str {
    match label {
        Label::PlaceBet => "🎯 Place bet",
        Label::GetCoupon => "🎫 Get coupon",
        Label::CopyCode => "📋 Copy code",
        Label::Share => "📤 Share",
        Label::FullAnalysis => "📊 Full analysis",
        Label::JoinChannel => "📢 Join channel",
        Label::ContinueReading => "… continue reading",
        Label::NoContent => "No content available at the moment.",
        Label::GamblingDisclaimer => "18+ Gamble responsibly.",
    }
}

fn es(label: Label) -> Option<&'static str> {
    Some(match label {
        Label::PlaceBet => "🎯 Apostar",
        Label::GetCoupon => "🎫 Obtener cupón",
        Label::CopyCode => "📋 Copiar código",
        Label::Share => "📤 Compartir",
        Label::FullAnalysis => "📊 Análisis completo",
        Label::JoinChannel => "📢 Unirse al canal",
        Label::ContinueReading => "… seguir leyendo",
        Label::NoContent => "No hay contenido disponible por ahora.",
        Label::GamblingDisclaimer => "18+ Juega con responsabilidad.",
    })
}

fn fr(label: Label) -> Option<&'static str> {
    Some(match label {
        Label::PlaceBet => "🎯 Parier",
        Label::GetCoupon => "🎫 Obtenir le coupon",
        Label::CopyCode => "📋 Copier le code",
        Label::Share => "📤 Partager",
        Label::FullAnalysis => "📊 Analyse complète",
        Label::JoinChannel => "📢 Rejoindre la chaîne",
        Label::ContinueReading => "… lire la suite",
        Label::NoContent => "Aucun contenu disponible pour le moment.",
        Label::GamblingDisclaimer => "18+ Jouez de manière responsable.",
    })
}

fn pt(label: Label) -> Option<&'static str> {
    Some(match label {
        Label::PlaceBet => "🎯 Apostar",
        Label::GetCoupon => "🎫 Obter cupom",
        Label::CopyCode => "📋 Copiar código",
        Label::Share => "📤 Compartilhar",
        Label::FullAnalysis => "📊 Análise completa",
        Label::ContinueReading => "… continuar lendo",
        Label::GamblingDisclaimer => "18+ Jogue com responsabilidade.",
        Label::JoinChannel | Label::NoContent => return None,
    })
}

fn am(label: Label) -> Option<&'static str> {
    Some(match label {
        Label::PlaceBet => "🎯 ውርርድ ያስቀምጡ",
        Label::Share => "📤 ያጋሩ",
        Label::ContinueReading => "… ማንበብ ይቀጥሉ",
        Label::GetCoupon
        | Label::CopyCode
        | Label::FullAnalysis
        | Label::JoinChannel
        | Label::NoContent
        | Label::GamblingDisclaimer => return None,
    })
}

fn sw(label: Label) -> Option<&'static str> {
    Some(match label {
        Label::PlaceBet => "🎯 Weka dau",
        Label::GetCoupon => "🎫 Pata kuponi",
        Label::Share => "📤 Shiriki",
        Label::FullAnalysis => "📊 Uchambuzi kamili",
        Label::ContinueReading => "… endelea kusoma",
        Label::GamblingDisclaimer => "18+ Cheza kwa uwajibikaji.",
        Label::CopyCode | Label::JoinChannel | Label::NoContent => return None,
    })
}
