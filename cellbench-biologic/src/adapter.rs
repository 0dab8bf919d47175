//! Scheduler adapter for BioLogic workstations
//!
//! Plugs the technique engine into `cellbench-queue`. A technique run is a
//! single queue command: the executor steps the state machine to completion
//! (or cancellation) inside `execute` and hands the caller one
//! [`TechniqueResult`]. Status reads and channel stops are ordinary quick
//! commands.

use crate::constants::{
    AFTER_CONFIG_SETTLE, AFTER_CONNECT_SETTLE, AFTER_TECHNIQUE_SETTLE, DEFAULT_UPDATE_TICK,
    RECOVERY_SETTLE,
};
use crate::data::{ConvertedData, RawBuffer};
use crate::error::BlError;
use crate::params::TechniqueSettings;
use crate::port::{BioLogicPort, ChannelInfo, CurrentValues};
use crate::technique::{
    CancelFlag, DataCallback, ProgressCallback, TechniqueContext, TechniqueState,
};
use async_trait::async_trait;
use cellbench_queue::{DeviceAdapter, QueueError, QueueResult};
use std::time::Duration;
use tracing::warn;

/// One technique run request
pub struct TechniqueRequest {
    pub channel: u8,
    pub settings: TechniqueSettings,
    /// Convert the raw buffer into named columns after capture
    pub process_data: bool,
    /// Polling period; also bounds cancel latency
    pub update_tick: Duration,
    pub cancel: CancelFlag,
    pub progress: Option<ProgressCallback>,
    pub on_data: Option<DataCallback>,
}

impl TechniqueRequest {
    pub fn new(channel: u8, settings: TechniqueSettings) -> Self {
        Self {
            channel,
            settings,
            process_data: true,
            update_tick: DEFAULT_UPDATE_TICK,
            cancel: CancelFlag::new(),
            progress: None,
            on_data: None,
        }
    }
}

/// Outcome of one technique run
#[derive(Debug)]
pub struct TechniqueResult {
    /// Terminal state the run ended in
    pub state: TechniqueState,
    pub raw: Option<RawBuffer>,
    pub converted: Option<ConvertedData>,
    /// `Some(PartialData)` when the run hit a device error but still
    /// produced usable data
    pub warning: Option<BlError>,
}

/// Commands the scheduler can run on a BioLogic device
pub enum BlCommand {
    /// Round-trip link check
    TestConnection,
    /// Static channel description
    ChannelInfo { channel: u8 },
    /// Live state, memory fill and measurement values
    CurrentValues { channel: u8 },
    /// Force-stop a channel
    StopChannel { channel: u8 },
    /// Run a technique to completion
    RunTechnique(Box<TechniqueRequest>),
}

/// Command discriminants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlCommandKind {
    TestConnection,
    ChannelInfo,
    CurrentValues,
    StopChannel,
    RunTechnique,
}

/// Kind-discriminated responses
#[derive(Debug)]
pub enum BlResponse {
    Done,
    ChannelInfo(ChannelInfo),
    CurrentValues(CurrentValues),
    Technique(TechniqueResult),
}

/// Post-execution settle delays; defaults match the shipped controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub after_connect: Duration,
    pub after_technique: Duration,
    pub after_config: Duration,
    pub recovery: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            after_connect: AFTER_CONNECT_SETTLE,
            after_technique: AFTER_TECHNIQUE_SETTLE,
            after_config: AFTER_CONFIG_SETTLE,
            recovery: RECOVERY_SETTLE,
        }
    }
}

/// [`DeviceAdapter`] implementation wrapping one BioLogic port
pub struct BioLogicAdapter<P: BioLogicPort> {
    port: P,
    settle: SettleDelays,
}

impl<P: BioLogicPort> BioLogicAdapter<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            settle: SettleDelays::default(),
        }
    }

    /// Override the settle delays (tests, fast bench bring-up)
    pub fn with_settle(port: P, settle: SettleDelays) -> Self {
        Self { port, settle }
    }

    async fn run_technique(&mut self, request: TechniqueRequest) -> QueueResult<BlResponse> {
        let TechniqueRequest {
            channel,
            settings,
            process_data,
            update_tick,
            cancel,
            progress,
            on_data,
        } = request;

        let mut ctx = TechniqueContext::start(
            &mut self.port,
            channel,
            &settings,
            process_data,
            progress,
            on_data,
        )
        .await
        .map_err(QueueError::from)?;

        while !ctx.state().is_terminal() {
            if cancel.is_cancelled() {
                let _ = ctx.stop(&mut self.port).await;
                break;
            }
            tokio::time::sleep(update_tick).await;
            if let Err(error) = ctx.update(&mut self.port).await {
                // update folded the failure into the context state; the
                // loop exits through the terminal check
                warn!(channel, %error, "technique update failed");
            }
        }

        let state = ctx.state();
        let had_error = ctx.last_error().cloned();
        let data = ctx.take_data();
        let (raw, converted) = match data {
            Some(bundle) => (Some(bundle.raw), bundle.converted),
            None => (None, None),
        };

        match state {
            TechniqueState::Completed => Ok(BlResponse::Technique(TechniqueResult {
                state,
                raw,
                converted,
                warning: had_error.map(|_| BlError::PartialData),
            })),
            TechniqueState::Cancelled => Ok(BlResponse::Technique(TechniqueResult {
                state,
                raw,
                converted,
                warning: None,
            })),
            TechniqueState::Error if raw.is_some() => {
                Ok(BlResponse::Technique(TechniqueResult {
                    state,
                    raw,
                    converted,
                    warning: Some(BlError::PartialData),
                }))
            }
            _ => Err(QueueError::from(had_error.unwrap_or(BlError::NoData))),
        }
    }
}

#[async_trait]
impl<P: BioLogicPort + 'static> DeviceAdapter for BioLogicAdapter<P> {
    type Kind = BlCommandKind;
    type Command = BlCommand;
    type Response = BlResponse;

    async fn connect(&mut self) -> QueueResult<()> {
        if self.port.is_connected() {
            return Ok(());
        }
        self.port.connect().await.map_err(QueueError::from)?;
        tokio::time::sleep(self.settle.after_connect).await;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.port.disconnect().await;
    }

    async fn test_connection(&mut self) -> QueueResult<()> {
        self.port.test_connection().await.map_err(QueueError::from)
    }

    fn is_connected(&self) -> bool {
        self.port.is_connected()
    }

    async fn execute(
        &mut self,
        _kind: BlCommandKind,
        command: BlCommand,
    ) -> QueueResult<BlResponse> {
        match command {
            BlCommand::TestConnection => {
                self.port.test_connection().await.map_err(QueueError::from)?;
                Ok(BlResponse::Done)
            }
            BlCommand::ChannelInfo { channel } => {
                let info = self
                    .port
                    .channel_info(channel)
                    .await
                    .map_err(QueueError::from)?;
                Ok(BlResponse::ChannelInfo(info))
            }
            BlCommand::CurrentValues { channel } => {
                let values = self
                    .port
                    .current_values(channel)
                    .await
                    .map_err(QueueError::from)?;
                Ok(BlResponse::CurrentValues(values))
            }
            BlCommand::StopChannel { channel } => {
                self.port
                    .stop_channel(channel)
                    .await
                    .map_err(QueueError::from)?;
                Ok(BlResponse::Done)
            }
            BlCommand::RunTechnique(request) => self.run_technique(*request).await,
        }
    }

    fn kind_of(command: &BlCommand) -> BlCommandKind {
        match command {
            BlCommand::TestConnection => BlCommandKind::TestConnection,
            BlCommand::ChannelInfo { .. } => BlCommandKind::ChannelInfo,
            BlCommand::CurrentValues { .. } => BlCommandKind::CurrentValues,
            BlCommand::StopChannel { .. } => BlCommandKind::StopChannel,
            BlCommand::RunTechnique(_) => BlCommandKind::RunTechnique,
        }
    }

    fn command_name(kind: BlCommandKind) -> &'static str {
        match kind {
            BlCommandKind::TestConnection => "test-connection",
            BlCommandKind::ChannelInfo => "channel-info",
            BlCommandKind::CurrentValues => "current-values",
            BlCommandKind::StopChannel => "stop-channel",
            BlCommandKind::RunTechnique => "run-technique",
        }
    }

    fn post_delay(&self, kind: BlCommandKind) -> Duration {
        match kind {
            BlCommandKind::RunTechnique => self.settle.after_technique,
            BlCommandKind::StopChannel => self.settle.after_config,
            BlCommandKind::TestConnection
            | BlCommandKind::ChannelInfo
            | BlCommandKind::CurrentValues => self.settle.recovery,
        }
    }
}
