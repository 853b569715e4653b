// hfdl-conductor: library entry point.
// Exposes modules for integration testing and for the `hfdl-conductord` binary.

pub mod aggregator;
pub mod allocation;
pub mod allocator;
pub mod bus;
pub mod clock;
pub mod conductor;
pub mod config;
pub mod process;
pub mod proxy;
pub mod refresh;
pub mod station;

pub use aggregator::Aggregator;
pub use allocation::Allocation;
pub use allocator::Allocator;
pub use bus::{BusEvent, EventBus, ReceiverAction};
pub use conductor::Conductor;
pub use proxy::ReceiverProxy;
pub use station::{Station, StationId, StationTable};
