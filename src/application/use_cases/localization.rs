//! User-facing message text in the supported languages.

use crate::domain::language::Language;
use crate::domain::query::QueryResult;

/// Rows beyond this are summarized rather than listed.
pub const MAX_FORMATTED_ROWS: usize = 20;

pub fn no_data_message(lang: Language) -> &'static str {
    match lang {
        Language::English => "No data found for your request.",
        Language::Hindi => "आपके अनुरोध के लिए कोई डेटा नहीं मिला।",
        Language::Marathi => "तुमच्या विनंतीसाठी कोणताही डेटा सापडला नाही.",
        Language::Gujarati => "તમારી વિનંતી માટે કોઈ ડેટા મળ્યો નથી.",
    }
}

pub fn failure_message(lang: Language) -> &'static str {
    match lang {
        Language::English => "Sorry, I can't answer that request safely. Please rephrase it.",
        Language::Hindi => "क्षमा करें, मैं इस अनुरोध का सुरक्षित उत्तर नहीं दे सकता। कृपया दोबारा लिखें।",
        Language::Marathi => "क्षमस्व, मी या विनंतीचे सुरक्षित उत्तर देऊ शकत नाही. कृपया पुन्हा लिहा.",
        Language::Gujarati => "માફ કરશો, હું આ વિનંતીનો સુરક્ષિત જવાબ આપી શકતો નથી. કૃપા કરીને ફરીથી લખો.",
    }
}

pub fn error_message(lang: Language) -> &'static str {
    match lang {
        Language::English => "Something went wrong while fetching your data. Please try again later.",
        Language::Hindi => "आपका डेटा लाते समय कुछ गलत हो गया। कृपया बाद में पुनः प्रयास करें।",
        Language::Marathi => "तुमचा डेटा आणताना काहीतरी चूक झाली. कृपया नंतर पुन्हा प्रयत्न करा.",
        Language::Gujarati => "તમારો ડેટા લાવતી વખતે કંઈક ખોટું થયું. કૃપા કરીને પછીથી ફરી પ્રયાસ કરો.",
    }
}

pub fn rate_limited_message(lang: Language, retry_after_seconds: i64) -> String {
    match lang {
        Language::English => format!(
            "Too many requests. Please try again in {} seconds.",
            retry_after_seconds
        ),
        Language::Hindi => format!(
            "बहुत अधिक अनुरोध। कृपया {} सेकंड बाद पुनः प्रयास करें।",
            retry_after_seconds
        ),
        Language::Marathi => format!(
            "खूप जास्त विनंत्या. कृपया {} सेकंदांनी पुन्हा प्रयत्न करा.",
            retry_after_seconds
        ),
        Language::Gujarati => format!(
            "ઘણી બધી વિનંતીઓ. કૃપા કરીને {} સેકન્ડ પછી ફરી પ્રયાસ કરો.",
            retry_after_seconds
        ),
    }
}

fn results_header(lang: Language, count: usize) -> String {
    match lang {
        Language::English => format!("Found {} result(s):", count),
        Language::Hindi => format!("{} परिणाम मिले:", count),
        Language::Marathi => format!("{} निकाल सापडले:", count),
        Language::Gujarati => format!("{} પરિણામ મળ્યા:", count),
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Renders rows as chat text: a header, then one `col: value, ...` line per row.
pub fn format_result(result: &QueryResult, lang: Language) -> String {
    if result.is_empty() {
        return no_data_message(lang).to_string();
    }

    let mut lines = vec![results_header(lang, result.rows.len())];
    for row in result.rows.iter().take(MAX_FORMATTED_ROWS) {
        let line = result
            .columns
            .iter()
            .map(|col| {
                let value = row.get(col).map(render_value).unwrap_or_else(|| "-".into());
                format!("{}: {}", col, value)
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(line);
    }
    if result.rows.len() > MAX_FORMATTED_ROWS {
        lines.push(format!("… (+{})", result.rows.len() - MAX_FORMATTED_ROWS));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn result(rows: usize) -> QueryResult {
        let rows: Vec<HashMap<String, serde_json::Value>> = (0..rows)
            .map(|i| {
                HashMap::from([
                    ("id".to_string(), serde_json::json!(i)),
                    ("title".to_string(), serde_json::json!(format!("item {}", i))),
                    ("sku".to_string(), serde_json::Value::Null),
                ])
            })
            .collect();
        QueryResult {
            columns: vec!["id".into(), "title".into(), "sku".into()],
            row_count: rows.len(),
            rows,
        }
    }

    #[test]
    fn test_empty_result_is_no_data() {
        assert_eq!(
            format_result(&QueryResult::default(), Language::Marathi),
            no_data_message(Language::Marathi)
        );
    }

    #[test]
    fn test_rows_render_in_column_order() {
        let text = format_result(&result(2), Language::English);
        assert_eq!(
            text,
            "Found 2 result(s):\nid: 0, title: item 0, sku: -\nid: 1, title: item 1, sku: -"
        );
    }

    #[test]
    fn test_long_results_are_truncated() {
        let text = format_result(&result(25), Language::English);
        assert_eq!(text.lines().count(), 1 + MAX_FORMATTED_ROWS + 1);
        assert!(text.ends_with("… (+5)"));
    }

    #[test]
    fn test_rate_limited_message_mentions_wait() {
        assert!(rate_limited_message(Language::Hindi, 30).contains("30"));
    }
}
