pub mod external;

pub use external::ExternalToolBulkLoader;
