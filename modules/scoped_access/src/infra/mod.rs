pub mod events;
pub mod memory;

pub use events::BroadcastPublisher;
pub use memory::MemoryBackend;
