use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, info};

use super::{DataError, PriceTable, StatisticsProvider};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = concat!("evoalloc/", env!("CARGO_PKG_VERSION"));

/// Daily closing prices from the Yahoo Finance chart endpoint.
///
/// Every ticker is requested concurrently. Adjusted closes are used when the
/// response carries them, plain closes otherwise.
#[derive(Debug, Clone)]
pub struct YahooChartProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new() -> Result<Self, DataError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(YahooChartProvider {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_series(
        &self,
        ticker: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, DataError> {
        let period_start = start_date
            .and_hms_opt(0, 0, 0)
            .map(|start| start.and_utc().timestamp())
            .unwrap_or_default();
        let period_end = Utc::now().timestamp();
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);

        debug!(ticker, url = %url, "requesting chart");
        let response: ChartResponse = self
            .client
            .get(&url)
            .query(&[
                ("period1", period_start.to_string()),
                ("period2", period_end.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_chart(ticker, response)
    }
}

impl StatisticsProvider for YahooChartProvider {
    async fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
    ) -> Result<PriceTable, DataError> {
        info!(assets = tickers.len(), %start_date, "fetching prices from Yahoo Finance");
        let series = try_join_all(
            tickers
                .iter()
                .map(|ticker| self.fetch_series(ticker, start_date)),
        )
        .await?;
        PriceTable::from_series(tickers, series)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

fn parse_chart(ticker: &str, response: ChartResponse) -> Result<Vec<(NaiveDate, f64)>, DataError> {
    if let Some(error) = response.chart.error {
        return Err(DataError::Source {
            ticker: ticker.to_string(),
            message: format!("{}: {}", error.code, error.description),
        });
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| DataError::MissingTicker(ticker.to_string()))?;
    let timestamps = result.timestamp.unwrap_or_default();

    // prefer adjusted closes, fall back to raw closes
    let closes = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .and_then(|adjusted| adjusted.adjclose)
        .or_else(|| {
            result
                .indicators
                .quote
                .into_iter()
                .next()
                .and_then(|quote| quote.close)
        })
        .ok_or_else(|| DataError::MissingTicker(ticker.to_string()))?;

    let series = timestamps
        .iter()
        .zip(closes)
        .filter_map(|(&timestamp, close)| {
            let date = DateTime::from_timestamp(timestamp, 0)?.date_naive();
            close.map(|price| (date, price))
        })
        .collect::<Vec<_>>();

    if series.is_empty() {
        return Err(DataError::MissingTicker(ticker.to_string()));
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(ticker: &str, body: &str) -> Result<Vec<(NaiveDate, f64)>, DataError> {
        parse_chart(ticker, serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_parse_chart_prefers_adjusted_close() {
        let body = r#"{"chart":{"result":[{
            "timestamp":[1672704000,1672790400,1672876800],
            "indicators":{
                "quote":[{"close":[10.0,11.0,12.0]}],
                "adjclose":[{"adjclose":[9.5,null,11.5]}]
            }}],"error":null}}"#;

        let series = parse("AAA", body).unwrap();
        assert_eq!(series.len(), 2, "null closes are dropped");
        assert_eq!(series[0], (NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), 9.5));
        assert_eq!(series[1].1, 11.5);
    }

    #[test]
    fn test_parse_chart_falls_back_to_close() {
        let body = r#"{"chart":{"result":[{
            "timestamp":[1672704000],
            "indicators":{"quote":[{"close":[10.0]}]}}],"error":null}}"#;

        let series = parse("AAA", body).unwrap();
        assert_eq!(series, vec![(NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), 10.0)]);
    }

    #[test]
    fn test_parse_chart_surfaces_source_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(parse("NOPE", body), Err(DataError::Source { .. })));

        let empty = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(matches!(parse("NOPE", empty), Err(DataError::MissingTicker(_))));
    }
}
