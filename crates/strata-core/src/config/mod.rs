pub mod processor;
pub mod runtime;
pub mod store;
pub mod sweep;

pub use processor::ProcessorConfig;
pub use runtime::RuntimeConfig;
pub use store::{StoreBackend, StoreConfig};
pub use sweep::SweepConfig;
