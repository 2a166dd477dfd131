use crate::errors::PipelineError;
use crate::value_objects::raw_frame::RawFrame;
use std::path::Path;

pub trait ColumnarCodec {
    fn source_extension(&self) -> &str;

    fn target_extension(&self) -> &str;

    fn compression(&self) -> &str;

    /// Converts a row-oriented source file into a columnar file, returning the
    /// number of rows written.
    fn convert(&self, source: &Path, destination: &Path) -> Result<u64, PipelineError>;
}

pub trait ColumnarReader {
    fn read_frame(&self, path: &Path) -> Result<RawFrame, PipelineError>;
}
