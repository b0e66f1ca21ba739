//! Parametrized animation pool controller.
//!
//! A fixed-size pool of scene nodes follows a tracked transform, each through
//! its own delay and exponential smoothing derived from its pool index. The
//! pool can be rebuilt wholesale (one cycle at a time) or retuned live from
//! gestures. The host scene graph, resource catalog and signal system are
//! abstracted behind the traits in [`host`]; [`sandbox`] provides an
//! in-memory implementation.

pub mod binder;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod gate;
pub mod gesture;
pub mod host;
pub mod params;
pub mod pool;
pub mod sandbox;
pub mod signal;

pub use binder::*;
pub use config::*;
pub use constants::*;
pub use controller::*;
pub use error::*;
pub use gate::*;
pub use gesture::*;
pub use host::*;
pub use params::*;
pub use pool::*;
pub use signal::*;
