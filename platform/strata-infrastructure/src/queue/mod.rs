pub mod file_queue;

pub use file_queue::FileWorkQueue;
