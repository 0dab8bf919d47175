//! BioLogic electrochemical workstation technique engine
//!
//! The device-specific half of the instrument controller:
//! - Typed technique settings (OCV, PEIS, SPEIS, GEIS, SGEIS) that build
//!   the device's flat ECC parameter lists
//! - A technique state machine driving load, start, polling, data
//!   retrieval and teardown with cooperative cancellation
//! - Decoders turning the packed 32-bit sample stream into named,
//!   unit-annotated columns
//! - A [`BioLogicAdapter`] plugging all of it into `cellbench-queue`
//!
//! The vendor shared library sits behind the [`BioLogicPort`] trait; this
//! crate contains no FFI.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod adapter;
pub mod constants;
pub mod data;
pub mod error;
pub mod params;
pub mod port;
pub mod technique;

pub use adapter::{
    BioLogicAdapter, BlCommand, BlCommandKind, BlResponse, SettleDelays, TechniqueRequest,
    TechniqueResult,
};
pub use data::{convert, convert_known, Column, ConvertedData, RawBuffer};
pub use error::{BlError, BlResult};
pub use params::{
    CurrentRange, EccParam, GeisSettings, KeyParams, OcvSettings, ParamValue, PeisSettings,
    SgeisSettings, SpeisSettings, TechniqueKind, TechniqueSettings, VoltageRange,
};
pub use port::{BioLogicPort, BoardType, ChannelInfo, ChannelState, CurrentValues, DataInfo};
pub use technique::{
    CancelFlag, DataCallback, ProgressCallback, TechniqueContext, TechniqueData,
    TechniqueProgress, TechniqueState,
};
