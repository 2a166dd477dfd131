/// Lifecycle of one calendar day through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Pending,
    Skipped,
    Fetching,
    Assembled,
    NoData,
    FetchFailed,
    /// Snapshot could not be written or enqueued.
    WriteFailed,
    Written,
    Queued,
    Converted,
    Loaded,
}

impl DayState {
    pub fn can_transition(self, next: DayState) -> bool {
        use DayState::*;
        matches!(
            (self, next),
            (Pending, Skipped)
                | (Pending, Fetching)
                | (Fetching, Assembled)
                | (Fetching, NoData)
                | (Fetching, FetchFailed)
                | (Assembled, Written)
                | (Assembled, WriteFailed)
                | (Written, WriteFailed)
                | (Written, Queued)
                | (Queued, Converted)
                | (Converted, Loaded)
        )
    }

    pub fn advance(self, next: DayState) -> Result<DayState, String> {
        if self.can_transition(next) {
            Ok(next)
        } else {
            Err(format!("illegal day transition {self:?} -> {next:?}"))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DayState::Skipped
                | DayState::NoData
                | DayState::FetchFailed
                | DayState::WriteFailed
                | DayState::Loaded
        )
    }
}
