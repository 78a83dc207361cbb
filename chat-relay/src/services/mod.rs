pub mod backends;
pub mod metrics;
pub mod relay;

pub use relay::{RelayError, RelayService};
