//! Keyword heuristics that decide whether a query can be answered straight
//! from market data, before any LLM is involved.

const STOCK_KEYWORDS: [&str; 6] = [
    "stock price",
    "stock price of",
    "price of",
    "share price",
    "current price",
    "market price",
];

const INDEX_KEYWORDS: [&str; 4] = ["sensex", "nifty", "market index", "market indices"];

const CRYPTO_KEYWORDS: [&str; 4] = ["bitcoin", "ethereum", "crypto", "cryptocurrency"];

const CRYPTO_SYMBOLS: [(&str, &str); 4] = [
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("btc", "BTC"),
    ("eth", "ETH"),
];

/// Company names users type, in lookup priority order.
const COMPANY_TICKERS: [(&str, &str); 26] = [
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("meta", "META"),
    ("facebook", "META"),
    ("nvidia", "NVDA"),
    ("netflix", "NFLX"),
    ("uber", "UBER"),
    ("spotify", "SPOT"),
    ("reliance", "RELIANCE"),
    ("tcs", "TCS"),
    ("infosys", "INFY"),
    ("hdfc", "HDFC"),
    ("icici", "ICICI"),
    ("sbi", "SBI"),
    ("tata", "TATAMOTORS"),
    ("tatamotors", "TATAMOTORS"),
    ("tata motors", "TATAMOTORS"),
    ("mahindra", "M&M"),
    ("bajaj", "BAJFINANCE"),
    ("wipro", "WIPRO"),
    ("bharti", "BHARTIARTL"),
    ("itc", "ITC"),
];

const INDIAN_SYMBOLS: [&str; 10] = [
    "RELIANCE",
    "TCS",
    "INFY",
    "HDFC",
    "ICICI",
    "SBI",
    "TATAMOTORS",
    "WIPRO",
    "BHARTIARTL",
    "ITC",
];

/// Words that follow "of"/"for" without naming a ticker.
const FILLER_WORDS: [&str; 6] = ["THE", "CURRENT", "STOCK", "SHARE", "PRICE", "AND"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinancialIntent {
    StockPrice(String),
    /// Stock wording without a recognisable symbol
    StockPriceUnresolved,
    MarketIndices,
    Crypto(String),
    /// Crypto wording without a known coin
    CryptoUnresolved,
    None,
}

fn trim_punctuation(word: &str) -> &str {
    word.trim_matches(|c| matches!(c, '.' | ',' | '!' | '?'))
}

pub fn is_stock_query(query_lower: &str) -> bool {
    STOCK_KEYWORDS.iter().any(|k| query_lower.contains(k))
}

pub fn is_index_query(query_lower: &str) -> bool {
    INDEX_KEYWORDS.iter().any(|k| query_lower.contains(k))
}

pub fn is_crypto_query(query_lower: &str) -> bool {
    CRYPTO_KEYWORDS.iter().any(|k| query_lower.contains(k))
}

/// Pulls a ticker out of a stock question.
///
/// Company names win over raw tickers: first any name contained in the
/// query, then any single word equal to a name, then the word following
/// "of"/"for".
pub fn extract_symbol(query: &str) -> Option<String> {
    let query_lower = query.to_lowercase();
    let query_clean = trim_punctuation(query_lower.trim());

    if let Some((_, ticker)) = COMPANY_TICKERS
        .iter()
        .find(|(name, _)| query_clean.contains(name))
    {
        return Some(ticker.to_string());
    }

    let words: Vec<&str> = query.split_whitespace().collect();

    for word in &words {
        let word_clean = trim_punctuation(word).to_lowercase();
        if let Some((_, ticker)) = COMPANY_TICKERS.iter().find(|(name, _)| *name == word_clean) {
            return Some(ticker.to_string());
        }
    }

    for pair in words.windows(2) {
        let preposition = pair[0].to_lowercase();
        if preposition != "of" && preposition != "for" {
            continue;
        }
        let next = pair[1].to_uppercase();
        let next = trim_punctuation(&next);
        if !FILLER_WORDS.contains(&next) {
            return Some(next.to_string());
        }
    }

    None
}

/// True for NSE/BSE names, matched as substrings (`HDFCBANK` counts).
pub fn is_indian_symbol(symbol: &str) -> bool {
    let upper = symbol.to_uppercase();
    INDIAN_SYMBOLS.iter().any(|s| upper.contains(s))
}

pub fn extract_crypto_symbol(query: &str) -> Option<&'static str> {
    query.split_whitespace().find_map(|word| {
        let word = word.to_lowercase();
        CRYPTO_SYMBOLS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, symbol)| *symbol)
    })
}

/// Stock checks run first; a stock question with no symbol still gets a
/// chance to match the index and crypto checks.
pub fn classify(query: &str) -> FinancialIntent {
    let query_lower = query.to_lowercase();

    let mut intent = FinancialIntent::None;
    if is_stock_query(&query_lower) {
        match extract_symbol(query) {
            Some(symbol) => return FinancialIntent::StockPrice(symbol),
            None => intent = FinancialIntent::StockPriceUnresolved,
        }
    }

    if is_index_query(&query_lower) {
        return FinancialIntent::MarketIndices;
    }

    if is_crypto_query(&query_lower) {
        return match extract_crypto_symbol(query) {
            Some(symbol) => FinancialIntent::Crypto(symbol.to_string()),
            None => FinancialIntent::CryptoUnresolved,
        };
    }

    intent
}
