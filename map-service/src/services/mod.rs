pub mod collection;
pub mod connector;
pub mod diagnostics;
pub mod metrics;
pub mod store;

pub use collection::MapCollection;
pub use connector::{ConnectionState, ConnectorSettings, StoreConnector};
pub use metrics::{get_metrics, init_metrics};
pub use store::{MapStore, MemoryDriver, MongoDriver, StoreDriver};
