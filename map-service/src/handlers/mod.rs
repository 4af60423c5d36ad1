pub mod health;
pub mod map_data;

pub use health::{health_check, metrics_endpoint, readiness_check, test_connection};
pub use map_data::{clear_map_data, get_map_data, save_map_data};
