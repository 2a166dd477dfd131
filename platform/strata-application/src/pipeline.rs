use crate::cancel::CancelToken;
use crate::convert::{ColumnarConverter, ConvertSummary};
use crate::ingest::{IngestDriver, IngestSummary};
use crate::load::{LoadSummary, PartitionedLoader};
use chrono::NaiveDate;
use serde::Serialize;
use strata_domain::errors::PipelineError;
use strata_domain::value_objects::day_state::DayState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub ingest: IngestSummary,
    pub convert: ConvertSummary,
    pub load: LoadSummary,
    /// Final state of every walked day once all three stages ran.
    #[serde(skip)]
    pub day_states: Vec<(NaiveDate, DayState)>,
}

/// The three stages chained in order: ingest, convert, load.
pub struct Pipeline {
    pub ingest: IngestDriver,
    pub converter: ColumnarConverter,
    pub loader: PartitionedLoader,
}

impl Pipeline {
    pub fn run_full(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        instruments: &[String],
        cancel: &CancelToken,
    ) -> Result<PipelineSummary, PipelineError> {
        let ingest = self.ingest.run(from, to, instruments, cancel)?;
        cancel.check()?;
        let convert = self.converter.run(cancel)?;
        cancel.check()?;
        let load = self.loader.run(cancel)?;
        let day_states = settle_days(&ingest, &convert, &load);
        Ok(PipelineSummary {
            ingest,
            convert,
            load,
            day_states,
        })
    }
}

/// Advances each queued day through `Converted` and `Loaded` according to
/// what the later stages report. Entries redelivered from earlier runs may
/// name days outside the walked range; those are ignored.
fn settle_days(
    ingest: &IngestSummary,
    convert: &ConvertSummary,
    load: &LoadSummary,
) -> Vec<(NaiveDate, DayState)> {
    ingest
        .day_states
        .iter()
        .map(|&(day, state)| {
            let mut state = state;
            for (done, next) in [
                (convert.converted_days.contains(&day), DayState::Converted),
                (load.loaded_days.contains(&day), DayState::Loaded),
            ] {
                if !done {
                    break;
                }
                match state.advance(next) {
                    Ok(advanced) => state = advanced,
                    Err(_) => break,
                }
            }
            (day, state)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::settle_days;
    use crate::convert::ConvertSummary;
    use crate::ingest::IngestSummary;
    use crate::load::LoadSummary;
    use chrono::NaiveDate;
    use strata_domain::value_objects::day_state::DayState;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn queued_days_follow_convert_and_load_outcomes() {
        let ingest = IngestSummary {
            day_states: vec![
                (day(4), DayState::Skipped),
                (day(5), DayState::Queued),
                (day(6), DayState::Queued),
                (day(7), DayState::Queued),
                (day(8), DayState::NoData),
            ],
            ..IngestSummary::default()
        };
        let convert = ConvertSummary {
            converted_days: vec![day(5), day(6), day(1)],
            ..ConvertSummary::default()
        };
        let load = LoadSummary {
            loaded_days: vec![day(5), day(8)],
            ..LoadSummary::default()
        };

        assert_eq!(
            settle_days(&ingest, &convert, &load),
            vec![
                (day(4), DayState::Skipped),
                (day(5), DayState::Loaded),
                (day(6), DayState::Converted),
                (day(7), DayState::Queued),
                (day(8), DayState::NoData),
            ]
        );
    }
}
