pub mod calendar;
pub mod layout;
pub mod nyse;
pub mod schema;
