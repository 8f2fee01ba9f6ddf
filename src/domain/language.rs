use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    English,
    Hindi,
    Marathi,
    Gujarati,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Marathi => "mr",
            Language::Gujarati => "gu",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::English
    }
}

const MARATHI_MARKERS: &[&str] = &["आहे", "मला", "दाखवा", "आजचे", "माझे", "चे "];

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

fn is_gujarati(c: char) -> bool {
    ('\u{0A80}'..='\u{0AFF}').contains(&c)
}

/// Script-based guess of the language a message was written in.
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(is_gujarati) {
        return Language::Gujarati;
    }
    if text.chars().any(is_devanagari) {
        if MARATHI_MARKERS.iter().any(|m| text.contains(m)) {
            return Language::Marathi;
        }
        return Language::Hindi;
    }
    Language::English
}
