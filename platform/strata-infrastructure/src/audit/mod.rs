pub mod jsonl;

pub use jsonl::JsonlAuditSink;
