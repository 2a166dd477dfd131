//! Daily bars from the Yahoo Finance v8 chart endpoint, including dividend
//! and split events.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use strata_domain::errors::PipelineError;
use strata_domain::repositories::instrument_fetcher::InstrumentFetcher;
use strata_domain::value_objects::price_bar::PriceBar;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    #[serde(default)]
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Clone)]
pub struct YahooSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_base: Duration,
}

impl Default for YahooSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

pub struct YahooChartFetcher {
    client: reqwest::blocking::Client,
    settings: YahooSettings,
}

impl YahooChartFetcher {
    pub fn new(settings: YahooSettings) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) strata/0.1")
            .build()
            .map_err(|err| PipelineError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client, settings })
    }

    /// `end` is inclusive; the request window ends at the following midnight.
    fn chart_url(&self, instrument_id: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        let period2 = (end + ChronoDuration::days(1))
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(period1);
        format!(
            "{}/v8/finance/chart/{instrument_id}?period1={period1}&period2={period2}\
             &interval=1d&events=div%2Csplits&includeAdjustedClose=false",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn fetch_with_retry(&self, instrument_id: &str, url: &str) -> Result<ChartResponse, PipelineError> {
        let mut last_error = None;
        for attempt in 0..=self.settings.retries {
            if attempt > 0 {
                let delay = self.settings.backoff_base * 2u32.saturating_pow(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying chart request");
                std::thread::sleep(delay);
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(PipelineError::NotFound(format!(
                            "unknown instrument {instrument_id}"
                        )));
                    }
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        metrics::counter!("strata.infra.yahoo.retryable_status_total").increment(1);
                        last_error = Some(format!("HTTP {status} for {instrument_id}"));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(PipelineError::Transient(format!(
                            "HTTP {status} for {instrument_id}"
                        )));
                    }
                    return resp.json::<ChartResponse>().map_err(|err| {
                        PipelineError::DataQuality(format!(
                            "failed to parse chart response for {instrument_id}: {err}"
                        ))
                    });
                }
                Err(err) if err.is_connect() || err.is_timeout() => {
                    last_error = Some(err.to_string());
                }
                Err(err) => return Err(PipelineError::Transient(err.to_string())),
            }
        }
        Err(PipelineError::Transient(format!(
            "chart request for {instrument_id} failed after {} attempts: {}",
            self.settings.retries + 1,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

fn local_date(ts: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts + gmtoffset, 0).map(|dt| dt.naive_utc().date())
}

fn parse_response(instrument_id: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, PipelineError> {
    let Some(result) = resp.chart.result else {
        return match resp.chart.error {
            Some(err) if err.code == "Not Found" => Err(PipelineError::NotFound(format!(
                "{instrument_id}: {}",
                err.description
            ))),
            Some(err) => Err(PipelineError::DataQuality(format!(
                "{instrument_id}: {}: {}",
                err.code, err.description
            ))),
            None => Err(PipelineError::DataQuality(format!(
                "{instrument_id}: empty result with no error"
            ))),
        };
    };
    let Some(data) = result.into_iter().next() else {
        return Ok(Vec::new());
    };
    // no timestamps means no sessions in the window
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };
    let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let events = data.events.unwrap_or_default();

    let mut dividends: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for event in events.dividends.values() {
        if let Some(day) = local_date(event.date, offset) {
            *dividends.entry(day).or_insert(0.0) += event.amount;
        }
    }
    let mut splits: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for event in events.splits.values() {
        if event.denominator != 0.0 {
            if let Some(day) = local_date(event.date, offset) {
                splits.insert(day, event.numerator / event.denominator);
            }
        }
    }

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = local_date(ts, offset).ok_or_else(|| {
            PipelineError::DataQuality(format!("{instrument_id}: invalid timestamp {ts}"))
        })?;
        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none() {
            continue;
        }
        bars.push(PriceBar {
            date,
            open: open.unwrap_or(f64::NAN),
            high: high.unwrap_or(f64::NAN),
            low: low.unwrap_or(f64::NAN),
            close: close.unwrap_or(f64::NAN),
            volume: volume.unwrap_or(0),
            dividends: dividends.get(&date).copied().unwrap_or(0.0),
            split_ratio: splits.get(&date).copied().unwrap_or(0.0),
        });
    }
    Ok(bars)
}

impl InstrumentFetcher for YahooChartFetcher {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PipelineError> {
        let started = Instant::now();
        let span = tracing::info_span!("infra.yahoo.fetch", instrument_id, %start, %end);
        let _enter = span.enter();

        let url = self.chart_url(instrument_id, start, end);
        let outcome = self
            .fetch_with_retry(instrument_id, &url)
            .and_then(|resp| parse_response(instrument_id, resp));

        let result = if outcome.is_ok() { "ok" } else { "err" };
        metrics::counter!("strata.infra.yahoo.fetch.calls_total", "result" => result).increment(1);
        metrics::histogram!("strata.infra.yahoo.fetch_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if let Ok(bars) = &outcome {
            tracing::debug!(bars = bars.len(), "fetched");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_response, ChartResponse, YahooChartFetcher, YahooSettings};
    use chrono::NaiveDate;
    use strata_domain::errors::PipelineError;

    fn parse(json: &str) -> Result<Vec<strata_domain::value_objects::price_bar::PriceBar>, PipelineError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        parse_response("AAPL", resp)
    }

    #[test]
    fn parses_bars_with_events_on_local_dates() {
        // 2024-02-09 14:30 UTC session open, exchange offset -5h
        let json = r#"{
          "chart": {
            "result": [{
              "meta": {"gmtoffset": -18000},
              "timestamp": [1707489000],
              "events": {
                "dividends": {"1707489000": {"amount": 0.24, "date": 1707489000}},
                "splits": {"1707489000": {"date": 1707489000, "numerator": 4.0, "denominator": 1.0, "splitRatio": "4:1"}}
              },
              "indicators": {"quote": [{
                "open": [188.65], "high": [189.99], "low": [188.0],
                "close": [188.85], "volume": [45155200]
              }]}
            }],
            "error": null
          }
        }"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 2, 9).unwrap());
        assert_eq!(bars[0].volume, 45_155_200);
        assert!((bars[0].dividends - 0.24).abs() < 1e-9);
        assert!((bars[0].split_ratio - 4.0).abs() < 1e-9);
    }

    #[test]
    fn missing_timestamps_mean_no_data() {
        let json = r#"{"chart": {"result": [{"meta": {}, "indicators": {"quote": [{}]}}], "error": null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn all_null_rows_are_skipped() {
        let json = r#"{"chart": {"result": [{
            "timestamp": [1707489000],
            "indicators": {"quote": [{"open": [null], "high": [null], "low": [null], "close": [null], "volume": [null]}]}
        }], "error": null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn not_found_error_maps_to_not_found() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        assert!(matches!(parse(json), Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn chart_url_covers_inclusive_end_day() {
        let fetcher = YahooChartFetcher::new(YahooSettings {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..YahooSettings::default()
        })
        .unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let url = fetcher.chart_url("MSFT", day, day);
        assert!(url.starts_with("http://127.0.0.1:9/v8/finance/chart/MSFT?"));
        assert!(url.contains("period1=1707091200"));
        assert!(url.contains("period2=1707177600"));
        assert!(url.contains("interval=1d"));
    }
}
