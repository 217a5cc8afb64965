pub mod period;
pub mod providers;
