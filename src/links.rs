use once_cell::sync::Lazy;
use regex::Regex;

const OKX_LINKS: &str = "\n\n\
💼 OKX для новых трейдеров:\n\
• Регистрация: https://www.okx.com/join/your_ref\n\
• Приложение iOS: https://apps.apple.com/app/okx/id1327268470\n\
• Приложение Android: https://play.google.com/store/apps/details?id=com.okinc.okex.gp\n";

const BINANCE_LINKS: &str = "\n\n\
💼 Binance — топовая ликвидность:\n\
• Регистрация: https://accounts.binance.com/register?ref=YOURCODE\n\
• Платформа Web: https://www.binance.com\n\
• Мобильное приложение: https://www.binance.com/en/download\n";

struct Exchange {
    name: &'static str,
    patterns: Vec<Regex>,
    links: &'static str,
}

/// Keyword patterns are matched against the lowercased text, so only
/// lowercase spellings are listed. Order defines first-match priority.
static EXCHANGES: Lazy<Vec<Exchange>> = Lazy::new(|| {
    vec![
        Exchange {
            name: "okx",
            patterns: compile(&[r"\bokx\b", r"\bокх\b"]),
            links: OKX_LINKS,
        },
        Exchange {
            name: "binance",
            patterns: compile(&[r"\bbinance\b", r"\bбинанс\b"]),
            links: BINANCE_LINKS,
        },
    ]
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static keyword pattern"))
        .collect()
}

fn matching_exchange(text: &str) -> Option<&'static Exchange> {
    let normalized = text.to_lowercase();
    EXCHANGES.iter().find(|exchange| {
        exchange
            .patterns
            .iter()
            .any(|pattern| pattern.is_match(&normalized))
    })
}

/// Name of the first exchange whose keywords appear in the text, if any.
pub fn detect_exchange(text: &str) -> Option<&'static str> {
    matching_exchange(text).map(|exchange| exchange.name)
}

/// Append the promo block for the detected exchange; at most one block,
/// unmatched text passes through unchanged.
pub fn append_links(text: &str) -> String {
    match matching_exchange(text) {
        Some(exchange) => format!("{}{}", text.trim_end(), exchange.links),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_latin_keyword_case_insensitively() {
        assert_eq!(detect_exchange("Новый листинг на OKX сегодня"), Some("okx"));
    }

    #[test]
    fn test_detects_cyrillic_keyword() {
        assert_eq!(detect_exchange("торгуем на бинанс"), Some("binance"));
    }

    #[test]
    fn test_keyword_inside_word_does_not_match() {
        assert_eq!(detect_exchange("словокхвост"), None);
        assert_eq!(detect_exchange("rebinanced"), None);
    }

    #[test]
    fn test_first_exchange_wins() {
        assert_eq!(detect_exchange("OKX против Binance"), Some("okx"));
    }

    #[test]
    fn test_no_keyword_passes_through() {
        let text = "просто пост без бирж";
        assert_eq!(append_links(text), text);
    }

    #[test]
    fn test_appends_single_block_after_trimmed_text() {
        let enriched = append_links("Пост про binance\n\n");
        assert!(enriched.starts_with("Пост про binance\n\n💼 Binance"));
        assert!(enriched.contains("accounts.binance.com/register"));
        assert_eq!(enriched.matches("💼").count(), 1);
    }
}
