//! Vendor library seam
//!
//! [`BioLogicPort`] is the capability set the technique engine drives a
//! workstation through. The production implementation wraps the vendor's
//! shared library; tests script one in memory. Everything above this trait
//! is pure Rust.

use crate::error::BlResult;
use crate::params::EccParam;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Channel run state as the device reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Stop,
    Run,
    Pause,
}

/// Channel board family; affects available ranges, not sample layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardType {
    Vmp3,
    Sp300,
}

/// Snapshot returned by the device's current-values poll
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentValues {
    pub state: ChannelState,
    /// Bytes of pending sample data device-side; progress indicator
    pub memory_filled: u32,
    /// Seconds since the channel started
    pub elapsed_s: f64,
    /// Working-electrode potential
    pub ewe_v: f64,
    /// Cell current
    pub i_a: f64,
    /// Device timer tick in seconds; needed to decode packed time words
    pub timebase_s: f64,
    /// Hardware option error; 0 when none
    pub opt_err: i32,
    /// Position the option error refers to
    pub opt_pos: i32,
}

/// Static channel description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel: u8,
    pub board: BoardType,
    pub firmware_version: u32,
    /// Device-side sample memory size in bytes
    pub memory_size: u32,
}

/// Header of one retrieved sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub rows: usize,
    pub cols: usize,
    /// Technique id the device stamped on the buffer
    pub technique_id: u16,
    /// Sub-stream: impedance techniques emit a time series (0) and an
    /// impedance table (1)
    pub process_index: u8,
    pub loop_index: u32,
    /// Buffer start time in seconds since channel start
    pub start_time_s: f64,
}

/// Capability set of one BioLogic device
///
/// The wire (and the vendor library) is single-threaded per device; the
/// scheduler's worker is the only caller, so implementations need no
/// internal locking.
#[async_trait]
pub trait BioLogicPort: Send {
    async fn connect(&mut self) -> BlResult<()>;

    async fn disconnect(&mut self);

    /// Cheap round trip verifying the link is alive
    async fn test_connection(&mut self) -> BlResult<()>;

    fn is_connected(&self) -> bool;

    /// Force-stop a channel; idle channels tolerate this
    async fn stop_channel(&mut self, channel: u8) -> BlResult<()>;

    /// Load an ECC technique with its flat parameter list
    async fn load_technique(
        &mut self,
        channel: u8,
        ecc_path: &str,
        params: &[EccParam],
        first: bool,
        last: bool,
    ) -> BlResult<()>;

    /// Start the loaded technique
    async fn start_channel(&mut self, channel: u8) -> BlResult<()>;

    /// Poll state, memory fill and live measurement values
    async fn current_values(&mut self, channel: u8) -> BlResult<CurrentValues>;

    /// Static channel description (board, firmware, memory)
    async fn channel_info(&mut self, channel: u8) -> BlResult<ChannelInfo>;

    /// Pull the next pending sample buffer as packed 32-bit words
    async fn retrieve_data(&mut self, channel: u8) -> BlResult<(DataInfo, Vec<u32>)>;
}
