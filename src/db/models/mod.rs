pub mod appointment;
pub mod cached_asset;

pub use appointment::{AppointmentStatus, PendingAppointment, StatusCounts};
pub use cached_asset::CachedAsset;
