//! Query → market symbols.
//!
//! Two mappings: chart symbols in `EXCHANGE:SYMBOL` form, grouped one group
//! per chart, and a comma-joined ticker list for the news-sentiment feed.
//! Well-known group aliases ("mag7", "faang", "crypto") resolve without a
//! model call. Model output is always sanitized before it leaves here.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::SymbolsConfig;
use crate::error::Result;
use crate::llm::{structured, JsonRequest, LlmClient};

const ALIASES: &[(&[&str], &str)] = &[
    (&["mag7"], "AAPL,MSFT,AMZN,GOOGL,META,NVDA,TSLA"),
    (&["mag", "7"], "AAPL,MSFT,AMZN,GOOGL,META,NVDA,TSLA"),
    (&["magnificent", "seven"], "AAPL,MSFT,AMZN,GOOGL,META,NVDA,TSLA"),
    (&["magnificent", "7"], "AAPL,MSFT,AMZN,GOOGL,META,NVDA,TSLA"),
    (&["fang"], "META,AMZN,AAPL,NFLX,GOOGL"),
    (&["faang"], "META,AMZN,AAPL,NFLX,GOOGL"),
    (&["crypto"], "CRYPTO:BTC,CRYPTO:ETH,COIN"),
];

const US_EXCHANGES: &[&str] = &["NASDAQ", "NYSE", "AMEX", "NYSEARCA", "BATS", "OTC"];
const CRYPTO_EXCHANGES: &[&str] = &["BINANCE", "COINBASE", "KRAKEN", "BITSTAMP", "CRYPTO"];
const FX_EXCHANGES: &[&str] = &["FX", "FX_IDC", "OANDA", "FOREX"];
const QUOTE_SUFFIXES: &[&str] = &["USDT", "USDC", "BUSD", "USD"];

#[derive(Debug, Deserialize)]
struct ChartSymbols {
    #[serde(rename = "stockSymbols")]
    stock_symbols: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SentimentTickers {
    tickers: String,
}

pub struct SymbolResolver {
    llm: Arc<dyn LlmClient>,
    config: SymbolsConfig,
}

impl SymbolResolver {
    pub fn new(llm: Arc<dyn LlmClient>, config: SymbolsConfig) -> Self {
        Self { llm, config }
    }

    fn default_group(&self) -> Vec<Vec<String>> {
        vec![vec![self.config.default_chart_symbol.clone()]]
    }

    /// Chart symbols for a query.
    ///
    /// Falls back to the configured default symbol when nothing valid comes
    /// back; returns no groups at all when the model is unreachable.
    pub async fn resolve_chart_symbols(&self, query: &str) -> Result<Vec<Vec<String>>> {
        if query.trim().is_empty() {
            return Ok(self.default_group());
        }

        let request = JsonRequest::new("chart_symbols", chart_prompt(query), chart_schema())
            .model(self.config.model.clone())
            .temperature(0.2);

        match structured::<ChartSymbols>(self.llm.as_ref(), request).await {
            Ok(resp) => {
                let groups = sanitize_chart_groups(resp.stock_symbols);
                if groups.is_empty() {
                    Ok(self.default_group())
                } else {
                    Ok(groups)
                }
            }
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "chart symbol resolution failed");
                Ok(Vec::new())
            }
        }
    }

    /// Sentiment-feed tickers for a query, comma-joined without spaces.
    ///
    /// Empty when the query is only about non-US markets or resolution fails.
    pub async fn resolve_sentiment_tickers(&self, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Ok(String::new());
        }
        if let Some(tickers) = match_aliases(query) {
            tracing::debug!(%tickers, "resolved tickers from alias");
            return Ok(tickers);
        }

        let request = JsonRequest::new("sentiment_tickers", tickers_prompt(query), tickers_schema())
            .model(self.config.model.clone())
            .temperature(0.2);

        match structured::<SentimentTickers>(self.llm.as_ref(), request).await {
            Ok(resp) => Ok(sanitize_tickers(&resp.tickers)),
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "sentiment ticker resolution failed");
                Ok(String::new())
            }
        }
    }
}

fn words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Union of every alias the query mentions, or `None`.
pub fn match_aliases(query: &str) -> Option<String> {
    let tokens = words(query);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (phrase, tickers) in ALIASES {
        let hit = tokens
            .windows(phrase.len())
            .any(|w| w.iter().zip(phrase.iter()).all(|(a, b)| a == b));
        if hit {
            for t in tickers.split(',') {
                if seen.insert(t) {
                    out.push(t);
                }
            }
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out.join(","))
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_' | '!')
}

/// `EXCHANGE:SYMBOL` with both halves non-empty and upper case.
pub fn is_chart_symbol(s: &str) -> bool {
    match s.split_once(':') {
        Some((exchange, symbol)) => {
            !exchange.is_empty()
                && !symbol.is_empty()
                && exchange
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
                && symbol.chars().all(is_symbol_char)
        }
        None => false,
    }
}

fn sanitize_chart_groups(groups: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| is_chart_symbol(s))
                .filter(|s| seen.insert(s.clone()))
                .collect::<Vec<_>>()
        })
        .filter(|g| !g.is_empty())
        .collect()
}

fn is_sentiment_ticker(t: &str) -> bool {
    if let Some(rest) = t.strip_prefix("CRYPTO:") {
        return (2..=10).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_alphanumeric());
    }
    if let Some(rest) = t.strip_prefix("FOREX:") {
        return rest.len() == 3 && rest.chars().all(|c| c.is_ascii_uppercase());
    }
    (1..=6).contains(&t.len())
        && t.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && t.chars().all(|c| c.is_ascii_uppercase() || c == '.')
}

/// Trim, upper-case, drop invalid and repeated tickers.
pub fn sanitize_tickers(raw: &str) -> String {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| is_sentiment_ticker(t))
        .filter(|t| seen.insert(t.clone()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Convert a chart symbol to its sentiment-feed ticker.
///
/// `None` for exchanges outside the feed's coverage.
///
/// ```rust
/// use finsight::symbols::chart_to_sentiment_ticker;
///
/// assert_eq!(chart_to_sentiment_ticker("NASDAQ:AAPL").as_deref(), Some("AAPL"));
/// assert_eq!(chart_to_sentiment_ticker("BINANCE:BTCUSDT").as_deref(), Some("CRYPTO:BTC"));
/// assert_eq!(chart_to_sentiment_ticker("SSE:600519"), None);
/// ```
pub fn chart_to_sentiment_ticker(symbol: &str) -> Option<String> {
    let normalized = symbol.trim().to_uppercase();
    let (exchange, code) = normalized.split_once(':')?;
    if code.is_empty() {
        return None;
    }

    if US_EXCHANGES.contains(&exchange) {
        return Some(code.to_string());
    }
    if CRYPTO_EXCHANGES.contains(&exchange) {
        let base = QUOTE_SUFFIXES
            .iter()
            .find_map(|q| code.strip_suffix(q).filter(|b| !b.is_empty()))
            .unwrap_or(code);
        return Some(format!("CRYPTO:{}", base));
    }
    if FX_EXCHANGES.contains(&exchange) {
        let base = code.get(..3)?;
        if base.chars().all(|c| c.is_ascii_uppercase()) {
            return Some(format!("FOREX:{}", base));
        }
    }
    None
}

fn chart_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "stockSymbols": {
                "type": "array",
                "items": { "type": "array", "items": { "type": "string" } }
            }
        },
        "required": ["stockSymbols"],
        "additionalProperties": false,
    })
}

fn tickers_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "tickers": { "type": "string" } },
        "required": ["tickers"],
        "additionalProperties": false,
    })
}

fn chart_prompt(query: &str) -> String {
    format!(
        r#"Resolve the query below to stock chart symbols.

Each symbol is EXCHANGE:SYMBOL as used by TradingView, for example NASDAQ:AAPL, NYSE:DELL, BINANCE:ETH, SSE:600519, SZSE:002594. Use BINANCE for crypto assets. Put each symbol in its own group and return 2 or 3 relevant symbols when possible.

Examples:
"latest news about Apple" -> [["NASDAQ:AAPL"]]
"what is happening in crypto" -> [["BINANCE:BTC"],["BINANCE:ETH"],["NASDAQ:COIN"]]
"electric vehicles" -> [["NASDAQ:TSLA"],["NYSE:NIO"],["SZSE:002594"]]
"US medicine industry" -> [["NYSE:PFE"],["NYSE:JNJ"],["NYSE:ABBV"]]

Query: {query}"#
    )
}

fn tickers_prompt(query: &str) -> String {
    format!(
        r#"Resolve the query below to tickers for a US news-sentiment feed.

Rules:
1. US-listed equities as bare tickers, e.g. AAPL.
2. Crypto assets prefixed with CRYPTO:, e.g. CRYPTO:BTC.
3. Currencies prefixed with FOREX:, e.g. FOREX:USD.
4. Join with commas and no spaces.
5. Return 2 or 3 highly relevant tickers, or every member of a well-known group.
6. If the query is only about non-US markets, return an empty string.

Examples:
"latest news about Apple" -> AAPL
"Bitcoin and the US dollar" -> CRYPTO:BTC,FOREX:USD,COIN
"car industry" -> F,GM,TSLA
"medicine industry" -> PFE,JNJ,ABBV

Query: {query}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::llm::TextRequest;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        reply: Option<Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete_json(&self, _request: JsonRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| Error::upstream("stub", "down"))
        }

        async fn complete_text(&self, _request: TextRequest) -> Result<String> {
            Ok(String::new())
        }
    }

    fn resolver(reply: Option<Value>) -> (SymbolResolver, Arc<StubLlm>) {
        let llm = Arc::new(StubLlm {
            reply,
            calls: AtomicUsize::new(0),
        });
        (
            SymbolResolver::new(llm.clone(), SymbolsConfig::default()),
            llm,
        )
    }

    #[tokio::test]
    async fn aliases_skip_the_model() {
        let (r, llm) = resolver(Some(json!({ "tickers": "XXX" })));
        assert_eq!(
            r.resolve_sentiment_tickers("latest on the Magnificent Seven")
                .await
                .unwrap(),
            "AAPL,MSFT,AMZN,GOOGL,META,NVDA,TSLA"
        );
        assert_eq!(
            r.resolve_sentiment_tickers("crypto news").await.unwrap(),
            "CRYPTO:BTC,CRYPTO:ETH,COIN"
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn alias_needs_word_boundary() {
        assert!(match_aliases("cryptocurrency regulation").is_none());
        assert_eq!(
            match_aliases("FAANG and mag 7").as_deref(),
            Some("AAPL,MSFT,AMZN,GOOGL,META,NVDA,TSLA,NFLX")
        );
    }

    #[tokio::test]
    async fn model_tickers_are_sanitized() {
        let (r, _) = resolver(Some(json!({ "tickers": " aapl, MSFT ,not a ticker,AAPL,crypto:btc" })));
        assert_eq!(
            r.resolve_sentiment_tickers("big tech").await.unwrap(),
            "AAPL,MSFT,CRYPTO:BTC"
        );
    }

    #[tokio::test]
    async fn non_us_query_yields_empty() {
        let (r, _) = resolver(Some(json!({ "tickers": "" })));
        assert_eq!(r.resolve_sentiment_tickers("Kweichow Moutai").await.unwrap(), "");
    }

    #[tokio::test]
    async fn chart_symbols_drop_malformed_entries() {
        let (r, _) = resolver(Some(json!({
            "stockSymbols": [["nasdaq:tsla"], ["NIO"], ["SZSE:002594", "NASDAQ:TSLA"], []]
        })));
        let groups = r.resolve_chart_symbols("electric vehicles").await.unwrap();
        assert_eq!(
            groups,
            vec![vec!["NASDAQ:TSLA".to_string()], vec!["SZSE:002594".to_string()]]
        );
    }

    #[tokio::test]
    async fn chart_symbols_fall_back_to_default() {
        let (r, _) = resolver(Some(json!({ "stockSymbols": [["garbage"]] })));
        assert_eq!(
            r.resolve_chart_symbols("?").await.unwrap(),
            vec![vec!["NASDAQ:AAPL".to_string()]]
        );

        let (r, _) = resolver(None);
        assert!(r.resolve_chart_symbols("apple").await.unwrap().is_empty());
    }

    #[test]
    fn converts_chart_symbols() {
        assert_eq!(chart_to_sentiment_ticker("nyse:ko").as_deref(), Some("KO"));
        assert_eq!(
            chart_to_sentiment_ticker("BINANCE:ETH").as_deref(),
            Some("CRYPTO:ETH")
        );
        assert_eq!(
            chart_to_sentiment_ticker("FX:EURUSD").as_deref(),
            Some("FOREX:EUR")
        );
        assert_eq!(chart_to_sentiment_ticker("AAPL"), None);
    }

    #[test]
    fn non_ascii_fx_codes_do_not_convert() {
        assert_eq!(chart_to_sentiment_ticker("FX:éé"), None);
        assert_eq!(chart_to_sentiment_ticker("FX_IDC:ÉÉUSD"), None);
        assert_eq!(chart_to_sentiment_ticker("OANDA:EÉUSD"), None);
        assert_eq!(chart_to_sentiment_ticker("FX:EU"), None);
    }
}
