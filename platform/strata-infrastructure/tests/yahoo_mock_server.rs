use chrono::NaiveDate;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strata_domain::errors::PipelineError;
use strata_domain::repositories::instrument_fetcher::InstrumentFetcher;
use strata_infrastructure::market_data::{YahooChartFetcher, YahooSettings};

struct MockChartServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockChartServer {
    fn start(status_line: &'static str, body: String) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{}", addr);
        let stop = Arc::new(AtomicBool::new(false));
        let hits = Arc::new(AtomicUsize::new(0));
        let stop_clone = stop.clone();
        let hits_clone = hits.clone();

        let handle = thread::spawn(move || {
            listener.set_nonblocking(true).expect("nonblocking");
            while !stop_clone.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        hits_clone.fetch_add(1, Ordering::SeqCst);
                        let _ = handle_connection(&mut stream, status_line, &body);
                    }
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            }
        });

        Self {
            base_url,
            hits,
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for MockChartServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(stream: &mut TcpStream, status_line: &str, body: &str) -> Result<(), String> {
    stream.set_nonblocking(false).map_err(|e| e.to_string())?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .map_err(|e| e.to_string())?;

    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() > 8192 {
            break;
        }
    }

    let header = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream
        .write_all(header.as_bytes())
        .map_err(|e| e.to_string())?;
    stream.write_all(body.as_bytes()).map_err(|e| e.to_string())?;
    Ok(())
}

fn settings(base_url: &str, retries: u32) -> YahooSettings {
    YahooSettings {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        retries,
        backoff_base: Duration::from_millis(1),
    }
}

#[test]
fn fetches_daily_bar_from_chart_endpoint() {
    let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":-18000},"timestamp":[1707143400],
        "indicators":{"quote":[{"open":[188.15],"high":[189.25],"low":[185.84],"close":[187.68],"volume":[69668800]}]}}],
        "error":null}}"#
        .to_string();
    let server = MockChartServer::start("200 OK", body);
    let fetcher = YahooChartFetcher::new(settings(&server.base_url, 0)).unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let bars = fetcher.fetch("AAPL", day, day).unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].date, day);
    assert_eq!(bars[0].volume, 69_668_800);
    assert_eq!(bars[0].split_ratio, 0.0);
}

#[test]
fn server_errors_are_retried_then_reported_transient() {
    let server = MockChartServer::start("503 Service Unavailable", "{}".to_string());
    let fetcher = YahooChartFetcher::new(settings(&server.base_url, 2)).unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let err = fetcher.fetch("AAPL", day, day).unwrap_err();
    assert!(matches!(err, PipelineError::Transient(_)));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[test]
fn http_not_found_is_not_retried() {
    let server = MockChartServer::start("404 Not Found", "{}".to_string());
    let fetcher = YahooChartFetcher::new(settings(&server.base_url, 3)).unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let err = fetcher.fetch("NOPE", day, day).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}
