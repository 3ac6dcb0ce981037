//! Plain-text and markdown rendering for quotes, indices and LLM output.
//!
//! Stock answers are built as markdown and then flattened with
//! [`strip_markdown`] before they reach the chat clients, which render
//! plain text only.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::{IndexQuote, StockSnapshot};

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#{1,6}\s*([^\n]+)").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static STRIP_BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[*\-+•]\s+").unwrap());
static CLEAN_BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[*\-+]\s+").unwrap());
static NUMBERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\s+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static TRAILING_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());

/// Formats with thousands separators, e.g. `1234567.891` → `1,234,567.89`.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// Shortest decimal form with thousands separators and at least one
/// fraction digit: `22000.0` → `22,000.0`, `5123.45` → `5,123.45`.
pub fn group_shortest(value: f64) -> String {
    let formatted = format!("{}", value.abs());
    let decimals = formatted.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0).max(1);
    group_thousands(value, decimals)
}

/// Like [`group_thousands`] but always carries a sign (`+1,000.00`).
pub fn signed_thousands(value: f64, decimals: usize) -> String {
    let body = group_thousands(value, decimals);
    if body.starts_with('-') {
        body
    } else {
        format!("+{}", body)
    }
}

fn currency_or_na(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("₹{}", group_thousands(v, 2)),
        None => "N/A".to_string(),
    }
}

pub fn format_market_cap(market_cap: f64) -> String {
    if market_cap > 1e12 {
        format!("₹{:.2}T", market_cap / 1e12)
    } else if market_cap > 1e9 {
        format!("₹{:.2}B", market_cap / 1e9)
    } else if market_cap > 1e6 {
        format!("₹{:.2}M", market_cap / 1e6)
    } else {
        format!("₹{}", group_thousands(market_cap, 0))
    }
}

/// Stock card used for direct stock-price answers.
pub fn format_stock_response(data: &StockSnapshot) -> String {
    let (trend_emoji, change_emoji) = if data.change >= 0.0 { ("📈", "🟢") } else { ("📉", "🔴") };
    let volume = data
        .volume
        .map(|v| group_thousands(v as f64, 0))
        .unwrap_or_else(|| "N/A".to_string());

    let response = format!(
        "## 📊 Stock Information for {symbol}\n\n\
         **Current Price:** 💰 ₹{price}\n\
         **Change:** {change_emoji} ₹{change} ({pct:+.2}%) {trend_emoji}\n\n\
         ### 📈 Key Metrics\n\
         • **Previous Close:** {prev}\n\
         • **Open:** {open}\n\
         • **High:** {high}\n\
         • **Low:** {low}\n\
         • **Volume:** {volume}\n\
         • **Market Cap:** {cap}\n\n\
         *Last Updated: {updated}*\n",
        symbol = data.symbol,
        price = group_thousands(data.current_price, 2),
        change = signed_thousands(data.change, 2),
        pct = data.change_percent,
        prev = currency_or_na(Some(data.previous_close)),
        open = currency_or_na(data.open),
        high = currency_or_na(data.high),
        low = currency_or_na(data.low),
        cap = currency_or_na(data.market_cap),
        updated = data.last_updated.format("%Y-%m-%d %H:%M:%S"),
    );

    clean_markdown(&response)
}

/// Markdown stock card with exchange and market-cap detail, used for crypto answers.
pub fn format_stock_markdown(data: &StockSnapshot) -> String {
    let (trend_emoji, change_emoji, change_sign) = if data.change > 0.0 {
        ("📈", "🟢", "+")
    } else if data.change < 0.0 {
        ("📉", "🔴", "")
    } else {
        ("➡️", "⚪", "")
    };

    let mut response = format!("## 📊 Stock Information for {}\n\n", data.symbol);
    response.push_str(&format!(
        "**Current Price:** 💰 ₹{}\n",
        group_thousands(data.current_price, 2)
    ));
    response.push_str(&format!(
        "**Change:** {} {}₹{} ({}{:.2}%) {}\n\n",
        change_emoji,
        change_sign,
        group_thousands(data.change, 2),
        change_sign,
        data.change_percent,
        trend_emoji
    ));

    response.push_str("### 📈 Key Metrics\n");
    if data.is_indian_listing() {
        if let Some(exchange) = &data.exchange {
            response.push_str(&format!("• **Exchange:** {}\n", exchange));
        }
    }
    response.push_str(&format!(
        "• **Previous Close:** ₹{}\n",
        group_thousands(data.previous_close, 2)
    ));

    let metrics = [("Open", data.open), ("High", data.high), ("Low", data.low)];
    for (label, value) in metrics {
        if let Some(v) = value.filter(|v| *v != 0.0) {
            response.push_str(&format!("• **{}:** ₹{}\n", label, group_thousands(v, 2)));
        }
    }
    if let Some(volume) = data.volume.filter(|v| *v > 0) {
        response.push_str(&format!("• **Volume:** {}\n", group_thousands(volume as f64, 0)));
    }
    if let Some(cap) = data.market_cap.filter(|c| *c > 0.0) {
        response.push_str(&format!("• **Market Cap:** {}\n", format_market_cap(cap)));
    }

    response.push_str(&format!(
        "\n*Last Updated: {}*\n\n",
        data.last_updated.format("%Y-%m-%d %H:%M:%S")
    ));
    response.push_str("---\n");
    response.push_str("*Real-time data powered by WealthLens AI* 🚀");
    response
}

pub fn format_market_indices(indices: &[IndexQuote], now: NaiveDateTime) -> String {
    let mut response = String::from("## 📊 Major Market Indices\n\n");

    for index in indices {
        let data = &index.snapshot;
        if data.current_price == 0.0 {
            continue;
        }
        let price = group_shortest(data.current_price);
        let line = if data.change > 0.0 {
            format!("**{}:** 🟢 {} (+{:.2}%)\n", index.name, price, data.change_percent)
        } else if data.change < 0.0 {
            format!("**{}:** 🔴 {} ({:.2}%)\n", index.name, price, data.change_percent)
        } else {
            format!("**{}:** ⚪ {} ({:.2}%)\n", index.name, price, data.change_percent)
        };
        response.push_str(&line);
    }

    response.push_str(&format!("\n**Last Updated:** {}", now.format("%Y-%m-%d %H:%M:%S")));
    response
}

/// Removes markdown syntax, leaving plain text with `-` bullets.
pub fn strip_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = HEADER_RE.replace_all(text, "$1");
    let text = BOLD_RE.replace_all(&text, "$1");
    let text = ITALIC_RE.replace_all(&text, "$1");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = STRIP_BULLET_RE.replace_all(&text, "- ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    let text = TRAILING_WS_RE.replace_all(&text, "\n");

    text.trim().to_string()
}

/// Normalizes LLM markdown: single-space headers, `•` bullets, collapsed
/// blank lines, repaired double-encoded UTF-8.
pub fn clean_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = HEADER_RE.replace_all(text, |caps: &Captures| {
        let level = caps[0]
            .split_whitespace()
            .next()
            .map(|token| token.chars().count())
            .unwrap_or(1)
            .min(6);
        format!("{} {}", "#".repeat(level), caps[1].trim())
    });
    let text = CLEAN_BULLET_RE.replace_all(&text, "• ");
    let text = NUMBERED_RE.replace_all(&text, |caps: &Captures| format!("{} ", caps[0].trim()));
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    let text = TRAILING_WS_RE.replace_all(&text, "\n");

    repair_mojibake(&text).trim().to_string()
}

/// Undoes UTF-8 text that was decoded as Latin-1 somewhere upstream
/// (`â¹` → `₹`, `ð` → `📈`). Text that is not mojibake is returned as-is.
pub fn repair_mojibake(text: &str) -> String {
    let suspicious = text.contains('â') || text.contains('ð') || text.contains('Ã');
    if !suspicious || text.chars().any(|c| (c as u32) > 0xFF) {
        return text.to_string();
    }

    let bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

/// Cuts `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Summary without an LLM: whole sentences up to the length budget.
pub fn fallback_summarize(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return clean_markdown(text);
    }

    let budget = max_length.saturating_sub(3);
    let mut summary = String::new();
    for sentence in text.split(". ") {
        let candidate_len = summary.chars().count() + sentence.chars().count() + 2;
        if candidate_len > budget {
            break;
        }
        summary.push_str(sentence);
        summary.push_str(". ");
    }

    if summary.is_empty() {
        summary = truncate_with_ellipsis(text, max_length);
    }

    clean_markdown(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(change: f64) -> StockSnapshot {
        StockSnapshot {
            symbol: "AAPL".into(),
            company_name: Some("Apple Inc.".into()),
            exchange: None,
            current_price: 16_000.0,
            previous_close: 16_000.0 - change,
            change,
            change_percent: change / (16_000.0 - change) * 100.0,
            open: Some(15_500.0),
            high: Some(16_100.25),
            low: None,
            volume: Some(52_345_678),
            market_cap: Some(2.5e12),
            currency: "INR".into(),
            original_currency: Some("USD".into()),
            exchange_rate: Some(83.0),
            latest_trading_day: None,
            source: "Yahoo Finance".into(),
            last_updated: NaiveDate::from_ymd_opt(2024, 5, 10)
                .unwrap()
                .and_hms_opt(15, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(1_234_567.891, 2), "1,234,567.89");
        assert_eq!(group_thousands(999.0, 2), "999.00");
        assert_eq!(group_thousands(-1_500.5, 2), "-1,500.50");
        assert_eq!(group_thousands(52_345_678.0, 0), "52,345,678");
        assert_eq!(group_thousands(-0.001, 2), "0.00");
        assert_eq!(signed_thousands(800.0, 2), "+800.00");
        assert_eq!(signed_thousands(-2.5, 2), "-2.50");
    }

    #[test]
    fn market_cap_is_scaled() {
        assert_eq!(format_market_cap(2.5e12), "₹2.50T");
        assert_eq!(format_market_cap(3.2e9), "₹3.20B");
        assert_eq!(format_market_cap(4.5e6), "₹4.50M");
        assert_eq!(format_market_cap(12_345.0), "₹12,345");
    }

    #[test]
    fn stock_response_strips_to_plain_text() {
        let text = strip_markdown(&format_stock_response(&snapshot(800.0)));

        assert!(text.starts_with("📊 Stock Information for AAPL"));
        assert!(text.contains("Current Price: 💰 ₹16,000.00"));
        assert!(text.contains("Change: 🟢 ₹+800.00 (+5.26%) 📈"));
        assert!(text.contains("- Low: N/A"));
        assert!(text.contains("- Volume: 52,345,678"));
        assert!(text.contains("Last Updated: 2024-05-10 15:30:00"));
        assert!(!text.contains("**"));
    }

    #[test]
    fn negative_change_uses_red_markers() {
        let text = format_stock_response(&snapshot(-160.0));
        assert!(text.contains("🔴 ₹-160.00"));
        assert!(text.contains("📉"));
    }

    #[test]
    fn stock_markdown_lists_available_metrics() {
        let text = format_stock_markdown(&snapshot(0.0));

        assert!(text.contains("**Change:** ⚪ ₹0.00 (0.00%) ➡️"));
        assert!(text.contains("• **Open:** ₹15,500.00"));
        assert!(!text.contains("**Low:**"));
        assert!(!text.contains("**Exchange:**"));
        assert!(text.contains("• **Market Cap:** ₹2.50T"));
        assert!(text.ends_with("*Real-time data powered by WealthLens AI* 🚀"));
    }

    #[test]
    fn stock_markdown_shows_indian_exchange() {
        let mut data = snapshot(10.0);
        data.exchange = Some("NSE".into());
        let text = format_stock_markdown(&data);
        assert!(text.contains("• **Exchange:** NSE"));
        assert!(text.contains("🟢 +₹10.00"));
    }

    #[test]
    fn shortest_grouping_keeps_one_fraction_digit() {
        assert_eq!(group_shortest(22000.0), "22,000.0");
        assert_eq!(group_shortest(5123.45), "5,123.45");
        assert_eq!(group_shortest(38000.5), "38,000.5");
        assert_eq!(group_shortest(-1234.1), "-1,234.1");
    }

    #[test]
    fn indices_list_uses_direction_markers() {
        let mut up = snapshot(10.0);
        up.current_price = 22_000.0;
        up.change_percent = 0.45;
        let mut down = snapshot(-5.0);
        down.current_price = 5_000.0;
        down.change_percent = -0.1;
        let indices = vec![
            IndexQuote { name: "NIFTY 50".into(), snapshot: up },
            IndexQuote { name: "S&P 500".into(), snapshot: down },
        ];
        let now = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 15, 0).unwrap();

        let text = format_market_indices(&indices, now);

        assert!(text.starts_with("## 📊 Major Market Indices\n\n"));
        assert!(text.contains("**NIFTY 50:** 🟢 22,000.0 (+0.45%)"));
        assert!(text.contains("**S&P 500:** 🔴 5,000.0 (-0.10%)"));
        assert!(text.ends_with("**Last Updated:** 2024-01-02 09:15:00"));
    }

    #[test]
    fn strip_markdown_removes_syntax() {
        let md = "## Title\n\n**Bold** and *italic* with [a link](https://example.com)\n* item one\n+ item two\n\n\n\nend   \n";
        assert_eq!(
            strip_markdown(md),
            "Title\n\nBold and italic with a link\n- item one\n- item two\n\nend"
        );
    }

    #[test]
    fn clean_markdown_normalizes_lists_and_headers() {
        let md = "###   Analysis\n- point\n   2.   second\n\n\n\nTail  \n";
        assert_eq!(clean_markdown(md), "### Analysis\n• point\n2. second\n\nTail");
    }

    #[test]
    fn repairs_double_encoded_rupee() {
        let garbled: String = "₹100".bytes().map(|b| b as char).collect();
        assert_eq!(repair_mojibake(&garbled), "₹100");
        assert_eq!(repair_mojibake("plain text"), "plain text");
        assert_eq!(repair_mojibake("café ₹"), "café ₹");
    }

    #[test]
    fn fallback_summary_breaks_on_sentences() {
        let text = "First sentence here. Second sentence is longer. Third one never fits in budget.";
        assert_eq!(fallback_summarize(text, 51), "First sentence here. Second sentence is longer.");
        assert_eq!(fallback_summarize(text, 50), "First sentence here.");
        assert_eq!(fallback_summarize("short", 50), "short");
    }

    #[test]
    fn fallback_summary_truncates_single_long_sentence() {
        let text = "a".repeat(100);
        let summary = fallback_summarize(&text, 20);
        assert_eq!(summary.chars().count(), 20);
        assert!(summary.ends_with("..."));
    }
}
