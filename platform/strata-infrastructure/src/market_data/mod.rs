pub mod yahoo;

pub use yahoo::{YahooChartFetcher, YahooSettings};
