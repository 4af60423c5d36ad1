pub mod readiness;

pub use readiness::require_store_ready;
