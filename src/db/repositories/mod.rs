pub mod appointments;
pub mod cache_entries;
