#![allow(dead_code)]

//! Scripted in-memory BioLogic port for technique tests

use async_trait::async_trait;
use cellbench_biologic::{
    BlError, BlResult, BioLogicPort, BoardType, ChannelInfo, ChannelState, CurrentValues,
    DataInfo, EccParam, SettleDelays, TechniqueKind,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Per-run script: how long the channel "runs", what retrievals return
pub struct PortScript {
    /// How long current-values reports RUN after a start
    pub run_for: Duration,
    /// Buffers served by successive retrievals
    pub buffers: Vec<(DataInfo, Vec<u32>)>,
    /// Leading retrievals that fail with a transient comm error
    pub retrieval_failures: u32,
    /// Hardware option error reported while running and at stop
    pub opt_err: i32,
    /// First stop call reports an unplugged channel
    pub stop_unplugged_once: bool,
    pub timebase_s: f64,
}

impl Default for PortScript {
    fn default() -> Self {
        Self {
            run_for: Duration::from_millis(40),
            buffers: Vec::new(),
            retrieval_failures: 0,
            opt_err: 0,
            stop_unplugged_once: false,
            timebase_s: 2e-5,
        }
    }
}

/// Calls the engine made, for assertions
#[derive(Debug, Default)]
pub struct PortLog {
    pub stops: Mutex<u32>,
    /// (channel, ecc path, parameter count, first, last)
    pub loads: Mutex<Vec<(u8, String, usize, bool, bool)>>,
    pub starts: Mutex<u32>,
}

pub struct MockPort {
    connected: bool,
    script: PortScript,
    started_at: Option<Instant>,
    forced_stop: bool,
    unplugged_reported: bool,
    cursor: usize,
    pub log: Arc<PortLog>,
}

/// Route engine tracing through the test harness when RUST_LOG asks for it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockPort {
    pub fn new(script: PortScript) -> (Self, Arc<PortLog>) {
        init_tracing();
        let log = Arc::new(PortLog::default());
        (
            Self {
                connected: false,
                script,
                started_at: None,
                forced_stop: false,
                unplugged_reported: false,
                cursor: 0,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn channel_state(&self) -> (ChannelState, f64) {
        match self.started_at {
            Some(started) if !self.forced_stop => {
                let elapsed = started.elapsed();
                if elapsed < self.script.run_for {
                    (ChannelState::Run, elapsed.as_secs_f64())
                } else {
                    (ChannelState::Stop, self.script.run_for.as_secs_f64())
                }
            }
            Some(started) => (ChannelState::Stop, started.elapsed().as_secs_f64()),
            None => (ChannelState::Stop, 0.0),
        }
    }
}

#[async_trait]
impl BioLogicPort for MockPort {
    async fn connect(&mut self) -> BlResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn test_connection(&mut self) -> BlResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(BlError::Comm("not connected".into()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn stop_channel(&mut self, _channel: u8) -> BlResult<()> {
        if self.script.stop_unplugged_once && !self.unplugged_reported {
            self.unplugged_reported = true;
            return Err(BlError::ChannelNotPlugged);
        }
        *self.log.stops.lock().unwrap() += 1;
        if self.started_at.is_some() {
            self.forced_stop = true;
        }
        Ok(())
    }

    async fn load_technique(
        &mut self,
        channel: u8,
        ecc_path: &str,
        params: &[EccParam],
        first: bool,
        last: bool,
    ) -> BlResult<()> {
        self.log
            .loads
            .lock()
            .unwrap()
            .push((channel, ecc_path.to_owned(), params.len(), first, last));
        Ok(())
    }

    async fn start_channel(&mut self, _channel: u8) -> BlResult<()> {
        *self.log.starts.lock().unwrap() += 1;
        self.started_at = Some(Instant::now());
        self.forced_stop = false;
        Ok(())
    }

    async fn current_values(&mut self, _channel: u8) -> BlResult<CurrentValues> {
        let (state, elapsed_s) = self.channel_state();
        Ok(CurrentValues {
            state,
            memory_filled: (elapsed_s * 1000.0) as u32,
            elapsed_s,
            ewe_v: 3.7,
            i_a: 0.05,
            timebase_s: self.script.timebase_s,
            opt_err: self.script.opt_err,
            opt_pos: 0,
        })
    }

    async fn channel_info(&mut self, channel: u8) -> BlResult<ChannelInfo> {
        Ok(ChannelInfo {
            channel,
            board: BoardType::Vmp3,
            firmware_version: 1150,
            memory_size: 8 << 20,
        })
    }

    async fn retrieve_data(&mut self, _channel: u8) -> BlResult<(DataInfo, Vec<u32>)> {
        if self.script.retrieval_failures > 0 {
            self.script.retrieval_failures -= 1;
            return Err(BlError::Comm("scripted retrieval failure".into()));
        }
        match self.script.buffers.get(self.cursor) {
            Some((info, words)) => {
                self.cursor += 1;
                Ok((*info, words.clone()))
            }
            None => Err(BlError::NoData),
        }
    }
}

/// OCV process-0 buffer: rows of (time-high, time-low, Ewe, Ece)
pub fn ocv_buffer(rows: usize, timebase_s: f64) -> (DataInfo, Vec<u32>) {
    let mut words = Vec::with_capacity(rows * 4);
    for r in 0..rows {
        let ticks = ((r as f64 * 0.5) / timebase_s) as u64;
        words.push((ticks >> 32) as u32);
        words.push(ticks as u32);
        words.push((3.7f32 - r as f32 * 0.01).to_bits());
        words.push(0.0f32.to_bits());
    }
    (
        DataInfo {
            rows,
            cols: 4,
            technique_id: TechniqueKind::Ocv.device_id(),
            process_index: 0,
            loop_index: 0,
            start_time_s: 0.0,
        },
        words,
    )
}

/// Impedance process-1 buffer with one row per frequency point
pub fn impedance_buffer(kind: TechniqueKind, points: usize) -> (DataInfo, Vec<u32>) {
    let cols = 14;
    let mut words = vec![0u32; points * cols];
    for p in 0..points {
        let row = &mut words[p * cols..(p + 1) * cols];
        row[0] = (1000.0f32 / (p as f32 + 1.0)).to_bits();
        row[1] = 0.01f32.to_bits();
        row[2] = 0.002f32.to_bits();
        row[3] = (-25.0f32).to_bits();
        row[4] = 3.6f32.to_bits();
        row[5] = 0.1f32.to_bits();
        row[13] = (p as f32 * 1.5).to_bits();
    }
    (
        DataInfo {
            rows: points,
            cols,
            technique_id: kind.device_id(),
            process_index: 1,
            loop_index: 0,
            start_time_s: 0.0,
        },
        words,
    )
}

/// Process-0 time series buffer for an impedance technique
pub fn series_buffer(kind: TechniqueKind, rows: usize, timebase_s: f64) -> (DataInfo, Vec<u32>) {
    let mut words = Vec::with_capacity(rows * 4);
    for r in 0..rows {
        let ticks = ((r as f64 * 0.1) / timebase_s) as u64;
        words.push((ticks >> 32) as u32);
        words.push(ticks as u32);
        words.push(3.6f32.to_bits());
        words.push(0.1f32.to_bits());
    }
    (
        DataInfo {
            rows,
            cols: 4,
            technique_id: kind.device_id(),
            process_index: 0,
            loop_index: 0,
            start_time_s: 0.0,
        },
        words,
    )
}

/// Millisecond-scale settle delays so suites stay fast
pub fn fast_settle() -> SettleDelays {
    SettleDelays {
        after_connect: Duration::from_millis(1),
        after_technique: Duration::from_millis(1),
        after_config: Duration::from_millis(1),
        recovery: Duration::from_millis(1),
    }
}
