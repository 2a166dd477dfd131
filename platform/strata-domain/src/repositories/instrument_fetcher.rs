use crate::errors::PipelineError;
use crate::value_objects::price_bar::PriceBar;
use chrono::NaiveDate;

/// Market-data provider boundary. An empty vector means "no data".
pub trait InstrumentFetcher {
    fn name(&self) -> &str;

    fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PipelineError>;
}
