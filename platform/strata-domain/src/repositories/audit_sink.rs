use crate::errors::PipelineError;
use crate::value_objects::audit::AuditRecord;

pub trait AuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), PipelineError>;
}
