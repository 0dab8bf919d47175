//! Technique lifecycle state machine
//!
//! A [`TechniqueContext`] drives one measurement on one channel from
//! parameter load through polling to data retrieval. The executor steps it
//! with [`update`](TechniqueContext::update) until a terminal state is
//! reached; cancellation is cooperative through a [`CancelFlag`] the
//! executor polls every tick.

use crate::constants::{CHANNEL_STOP_SETTLE, DATA_RETRIEVAL_ATTEMPTS, RECOVERY_SETTLE};
use crate::data::{convert_known, ConvertedData, RawBuffer};
use crate::error::{BlError, BlResult};
use crate::params::{EccParam, KeyParams, TechniqueKind, TechniqueSettings};
use crate::port::{BioLogicPort, ChannelState, CurrentValues};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TechniqueState {
    /// Context created, nothing loaded yet
    Idle,
    /// Technique loaded, waiting for the channel to report RUN
    Loading,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TechniqueState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TechniqueState::Completed | TechniqueState::Error | TechniqueState::Cancelled
        )
    }
}

impl fmt::Display for TechniqueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TechniqueState::Idle => "idle",
            TechniqueState::Loading => "loading",
            TechniqueState::Running => "running",
            TechniqueState::Completed => "completed",
            TechniqueState::Error => "error",
            TechniqueState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation handle
///
/// Clone freely; setting it cancels the run at the next update tick
/// (ticks are at most 100 ms apart while a technique is active).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Snapshot handed to the progress callback each running tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechniqueProgress {
    /// Seconds since the channel started
    pub elapsed_s: f64,
    /// Device-side pending sample bytes
    pub memory_filled: u32,
}

/// Invoked on every running tick with live progress
pub type ProgressCallback = Box<dyn FnMut(TechniqueProgress) + Send>;

/// Invoked once with the captured buffer before the run completes
pub type DataCallback = Box<dyn FnMut(&RawBuffer) + Send>;

/// Owned bundle returned by [`TechniqueContext::take_data`]
#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueData {
    pub raw: RawBuffer,
    pub converted: Option<ConvertedData>,
}

/// One measurement in flight on one channel
pub struct TechniqueContext {
    channel: u8,
    kind: TechniqueKind,
    state: TechniqueState,
    /// Descriptor snapshot; outlives the caller's settings
    params: Vec<EccParam>,
    key_params: KeyParams,
    ecc_path: &'static str,
    raw: Option<RawBuffer>,
    converted: Option<ConvertedData>,
    process_data: bool,
    last_status: Option<CurrentValues>,
    /// Memory fill when the channel first reported RUN
    start_memory_filled: u32,
    started_wall: DateTime<Utc>,
    started: Instant,
    last_update: Option<Instant>,
    update_count: u64,
    last_error: Option<BlError>,
    progress_cb: Option<ProgressCallback>,
    data_cb: Option<DataCallback>,
}

impl TechniqueContext {
    /// Load and start a technique on the channel
    ///
    /// Stops the channel first (an unplugged channel is tolerated), waits
    /// for the stop to settle, loads the ECC as both first and last
    /// technique and starts the channel. Any failure is returned and
    /// nothing is left running.
    pub async fn start<P: BioLogicPort>(
        port: &mut P,
        channel: u8,
        settings: &TechniqueSettings,
        process_data: bool,
        progress_cb: Option<ProgressCallback>,
        data_cb: Option<DataCallback>,
    ) -> BlResult<Self> {
        settings.validate()?;
        let kind = settings.kind();
        let params = settings.to_params();
        let ecc_path = kind.ecc_path();

        let mut ctx = Self {
            channel,
            kind,
            state: TechniqueState::Idle,
            params,
            key_params: settings.key_params(),
            ecc_path,
            raw: None,
            converted: None,
            process_data,
            last_status: None,
            start_memory_filled: 0,
            started_wall: Utc::now(),
            started: Instant::now(),
            last_update: None,
            update_count: 0,
            last_error: None,
            progress_cb,
            data_cb,
        };

        match port.stop_channel(channel).await {
            Ok(()) => {}
            Err(BlError::ChannelNotPlugged) => {
                debug!(channel, "stop before load: channel reports not plugged");
            }
            Err(error) => {
                ctx.fail(error.clone());
                return Err(error);
            }
        }
        tokio::time::sleep(CHANNEL_STOP_SETTLE).await;

        ctx.state = TechniqueState::Loading;
        if let Err(error) = port
            .load_technique(channel, ecc_path, &ctx.params, true, true)
            .await
        {
            ctx.fail(error.clone());
            return Err(error);
        }
        if let Err(error) = port.start_channel(channel).await {
            ctx.fail(error.clone());
            return Err(error);
        }
        info!(channel, technique = %kind, "technique loaded and started");
        Ok(ctx)
    }

    fn fail(&mut self, error: BlError) {
        warn!(channel = self.channel, technique = %self.kind, %error, "technique failed");
        self.state = TechniqueState::Error;
        self.last_error = Some(error);
    }

    fn note_status(&mut self, values: CurrentValues) {
        self.last_status = Some(values);
        self.last_update = Some(Instant::now());
        self.update_count += 1;
    }

    /// One polling step; terminal states are a no-op
    pub async fn update<P: BioLogicPort>(&mut self, port: &mut P) -> BlResult<()> {
        match self.state {
            TechniqueState::Idle | TechniqueState::Loading => self.update_loading(port).await,
            TechniqueState::Running => self.update_running(port).await,
            _ => Ok(()),
        }
    }

    async fn update_loading<P: BioLogicPort>(&mut self, port: &mut P) -> BlResult<()> {
        let values = match port.current_values(self.channel).await {
            Ok(values) => values,
            Err(error) => {
                self.fail(error.clone());
                return Err(error);
            }
        };
        self.note_status(values);
        if values.state == ChannelState::Run {
            self.start_memory_filled = values.memory_filled;
            self.state = TechniqueState::Running;
            debug!(channel = self.channel, technique = %self.kind, "channel running");
        }
        Ok(())
    }

    async fn update_running<P: BioLogicPort>(&mut self, port: &mut P) -> BlResult<()> {
        let values = match port.current_values(self.channel).await {
            Ok(values) => values,
            Err(error) => {
                self.fail(error.clone());
                return Err(error);
            }
        };
        self.note_status(values);

        if values.opt_err != 0 {
            // hardware option errors do not stop the run
            warn!(
                channel = self.channel,
                code = values.opt_err,
                position = values.opt_pos,
                "hardware option error"
            );
        }
        if let Some(progress) = &mut self.progress_cb {
            progress(TechniqueProgress {
                elapsed_s: values.elapsed_s,
                memory_filled: values.memory_filled,
            });
        }
        if values.state == ChannelState::Stop {
            self.finish(port, values).await;
        }
        Ok(())
    }

    /// The channel stopped: retrieve data, convert, deliver, settle state
    async fn finish<P: BioLogicPort>(&mut self, port: &mut P, last: CurrentValues) {
        let expected = self.kind.expected_process_index();
        let mut last_error: Option<BlError> = None;

        for attempt in 1..=DATA_RETRIEVAL_ATTEMPTS {
            match port.retrieve_data(self.channel).await {
                Ok((info, words)) => {
                    if expected != 0 && info.process_index != expected {
                        debug!(
                            channel = self.channel,
                            got = info.process_index,
                            expected,
                            "skipping buffer from other process"
                        );
                        last_error = Some(BlError::WrongProcessIndex {
                            expected,
                            actual: info.process_index,
                        });
                        continue;
                    }
                    match RawBuffer::new(
                        words,
                        info.rows,
                        info.cols,
                        info.technique_id,
                        info.process_index,
                    ) {
                        Ok(buffer) => {
                            self.raw = Some(buffer);
                        }
                        Err(error) => {
                            last_error = Some(error);
                        }
                    }
                    break;
                }
                Err(error) if error.is_transient() && attempt < DATA_RETRIEVAL_ATTEMPTS => {
                    warn!(channel = self.channel, %error, attempt, "data retrieval failed, retrying");
                    last_error = Some(error);
                    tokio::time::sleep(RECOVERY_SETTLE).await;
                }
                Err(error) => {
                    warn!(channel = self.channel, %error, attempt, "data retrieval failed");
                    last_error = Some(error);
                    break;
                }
            }
        }

        if self.process_data {
            if let Some(raw) = &self.raw {
                // board type is informational; layout only depends on the
                // technique and the row width
                match port.channel_info(self.channel).await {
                    Ok(info) => debug!(channel = self.channel, board = ?info.board, "converting data"),
                    Err(error) => debug!(channel = self.channel, %error, "channel info unavailable"),
                }
                match convert_known(self.kind, raw, last.timebase_s) {
                    Ok(converted) => self.converted = Some(converted),
                    Err(error) => {
                        warn!(channel = self.channel, %error, "conversion failed, keeping raw data");
                    }
                }
            }
        }

        if let (Some(callback), Some(raw)) = (&mut self.data_cb, &self.raw) {
            callback(raw);
        }

        if self.raw.is_some() {
            self.state = TechniqueState::Completed;
            if last.opt_err != 0 {
                // data survived a hardware fault; callers see a warning
                self.last_error = Some(BlError::Vendor(last.opt_err));
            }
            info!(
                channel = self.channel,
                technique = %self.kind,
                rows = self.raw.as_ref().map(|r| r.rows()).unwrap_or(0),
                "technique completed"
            );
        } else {
            let error = if last.opt_err != 0 {
                BlError::Vendor(last.opt_err)
            } else {
                last_error.unwrap_or(BlError::NoData)
            };
            self.fail(error);
        }
    }

    /// Force-stop the channel; an active run becomes `Cancelled`
    ///
    /// Data captured before the stop stays reachable.
    pub async fn stop<P: BioLogicPort>(&mut self, port: &mut P) -> BlResult<()> {
        let result = port.stop_channel(self.channel).await;
        if let Err(error) = &result {
            warn!(channel = self.channel, %error, "force stop failed");
        }
        if matches!(self.state, TechniqueState::Loading | TechniqueState::Running) {
            self.state = TechniqueState::Cancelled;
            info!(channel = self.channel, technique = %self.kind, "technique cancelled");
        }
        result
    }

    /// Hand out an owned bundle: a deep raw copy plus the converted data
    ///
    /// The converted data transfers out; a second call returns the raw
    /// copy with `converted: None`.
    pub fn take_data(&mut self) -> Option<TechniqueData> {
        let raw = self.raw.clone()?;
        Some(TechniqueData {
            raw,
            converted: self.converted.take(),
        })
    }

    /// Raw buffer while the context still owns it
    pub fn raw(&self) -> Option<&RawBuffer> {
        self.raw.as_ref()
    }

    pub fn state(&self) -> TechniqueState {
        self.state
    }

    pub fn kind(&self) -> TechniqueKind {
        self.kind
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn ecc_path(&self) -> &'static str {
        self.ecc_path
    }

    pub fn key_params(&self) -> &KeyParams {
        &self.key_params
    }

    pub fn last_status(&self) -> Option<&CurrentValues> {
        self.last_status.as_ref()
    }

    pub fn last_error(&self) -> Option<&BlError> {
        self.last_error.as_ref()
    }

    /// Memory fill when the channel first reported RUN
    pub fn start_memory_filled(&self) -> u32 {
        self.start_memory_filled
    }

    pub fn started_wall(&self) -> DateTime<Utc> {
        self.started_wall
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}
