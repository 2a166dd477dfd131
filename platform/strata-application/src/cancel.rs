use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_domain::errors::PipelineError;

/// Cooperative cancellation flag, checked between days and between queue
/// entries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;
    use strata_domain::errors::PipelineError;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let watcher = token.clone();
        assert!(token.check().is_ok());
        watcher.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(PipelineError::Cancelled));
    }
}
