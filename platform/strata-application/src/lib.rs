pub mod assembler;
pub mod audit;
pub mod cancel;
pub mod config;
pub mod convert;
pub mod ingest;
pub mod load;
pub mod pipeline;
pub mod writer;
