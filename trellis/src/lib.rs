//! Trellis aggregate crate that re-exports the main components for downstream users.

pub use trellis_broker as broker;
pub use trellis_config as config;
pub use trellis_core as core;
pub use trellis_scanners as scanners;
pub use trellis_session as session;
pub use trellis_sim as sim;

/// Convenience prelude to pull commonly used items into scope.
pub mod prelude {
    pub use trellis_broker::*;
    pub use trellis_config::*;
    pub use trellis_core::*;
    pub use trellis_scanners::*;
    pub use trellis_session::*;
    pub use trellis_sim::*;
}
