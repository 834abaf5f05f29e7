// === PUBLIC CONTRACT ===
// Views and other modules consume the layer through the contract only
pub mod contract;

// Re-export the public contract components
pub use contract::{client, error, model};

// === LAYER ENTRY POINT ===
pub mod layer;
pub use layer::AccessLayer;

// === INTERNAL MODULES ===
// WARNING: These modules are internal implementation details!
// They are exposed only for comprehensive testing and should NOT be used by external consumers.
// Only use the `contract` module for stable public APIs.
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod gateways;
#[doc(hidden)]
pub mod infra;
