//! Build `noarch: python` conda packages from projects that use the `whey`
//! build backend.
//!
//! The project's wheel is built and installed into a scratch directory, its
//! `.dist-info` is rewritten to look like a conda installation, and the result
//! is packed into a `.tar.bz2` together with `about.json` and `index.json`
//! generated from `pyproject.toml`.

pub mod archive;
pub mod build;
pub mod channels;
pub mod config;
pub mod console_utils;
pub mod installer;
pub mod pyproject;
pub mod requirements;
pub mod system_tools;
pub mod wheel_builder;

pub use build::{CondaBuildError, CondaBuilder};
pub use channels::{ChannelValidator, RepodataValidator, StaticChannelIndex};
pub use config::{CondaConfig, CondaExtras, ConfigError};
pub use installer::{PipInstaller, WheelInstaller};
pub use pyproject::{ProjectConfig, PyProject};
pub use wheel_builder::{WheelBuilder, WheyWheelBuilder};
