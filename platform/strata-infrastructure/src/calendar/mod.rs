pub mod holiday_file;

pub use holiday_file::FileHolidaySource;
