#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core stage-controller logic (hardware-agnostic).
//!
//! All device traffic goes through `mcm_traits::Transport`; this crate owns
//! the framing, the unit model and the move bookkeeping.
//!
//! ## Architecture
//!
//! - **Catalog**: stage model name -> scale and travel limit (`catalog`)
//! - **Codec**: request frames and position-report decoding (`codec`)
//! - **Units**: counts <-> micrometers with optional axis reversal (`units`)
//! - **Channels**: fixed per-channel config plus mutable runtime (`channel`)
//! - **Controller**: exchanges, limit checks, move coalescing and
//!   completion waits (`controller`)
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use mcm_core::ControllerBuilder;
//! use mcm_hardware::SimulatedMcm3000;
//!
//! # fn main() -> mcm_core::error::Result<()> {
//! let mut stage = ControllerBuilder::new()
//!     .with_transport(SimulatedMcm3000::new())
//!     .with_channel(2, "ZFM2030", true)
//!     .build()?;
//! let commanded = stage.move_um(2, 10.0, false, Some(Duration::from_secs(5)))?;
//! assert!((stage.position_um(2)? - commanded).abs() < 1e-9);
//! stage.close()?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod catalog;
pub mod channel;
pub mod codec;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod status;
pub mod units;

pub use builder::{ControllerBuilder, Missing};
pub use catalog::{BUILTIN_STAGES, StageCatalog, StageSpec};
pub use channel::{ChannelConfig, ChannelRuntime};
pub use codec::Command;
pub use config::MotionCfg;
pub use controller::StageController;
pub use error::{BuildError, Desync, StageError};
pub use status::MoveOutcome;
pub use units::UnitConverter;
