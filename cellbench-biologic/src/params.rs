//! Technique parameter schemas and descriptor builders
//!
//! Each technique's settings struct converts into the flat [`EccParam`]
//! list the device expects. Labels and ordering are wire-level contracts;
//! changing either breaks the loaded ECC file's parameter binding.

use crate::error::{BlError, BlResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The techniques this engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TechniqueKind {
    /// Open-circuit voltage
    Ocv,
    /// Potentiostatic impedance spectroscopy
    Peis,
    /// Staircase potentiostatic impedance spectroscopy
    Speis,
    /// Galvanostatic impedance spectroscopy
    Geis,
    /// Staircase galvanostatic impedance spectroscopy
    Sgeis,
}

impl TechniqueKind {
    /// Relative path of the technique's ECC descriptor
    pub fn ecc_path(self) -> &'static str {
        match self {
            TechniqueKind::Ocv => "lib/ocv.ecc",
            TechniqueKind::Peis => "lib/peis.ecc",
            TechniqueKind::Speis => "lib/seisp.ecc",
            TechniqueKind::Geis => "lib/geis.ecc",
            TechniqueKind::Sgeis => "lib/seisg.ecc",
        }
    }

    /// Sub-stream that carries the technique's primary result table
    ///
    /// Impedance techniques emit the impedance table on process 1; plain
    /// time-series techniques emit everything on process 0.
    pub fn expected_process_index(self) -> u8 {
        if self.is_impedance() {
            1
        } else {
            0
        }
    }

    pub fn is_impedance(self) -> bool {
        matches!(
            self,
            TechniqueKind::Peis | TechniqueKind::Speis | TechniqueKind::Geis | TechniqueKind::Sgeis
        )
    }

    /// Whether the technique steps through a staircase (emits a Step column)
    pub fn is_staircase(self) -> bool {
        matches!(self, TechniqueKind::Speis | TechniqueKind::Sgeis)
    }

    /// Technique id the device stamps on sample buffers
    pub fn device_id(self) -> u16 {
        match self {
            TechniqueKind::Ocv => 100,
            TechniqueKind::Peis => 107,
            TechniqueKind::Geis => 110,
            TechniqueKind::Speis => 113,
            TechniqueKind::Sgeis => 114,
        }
    }

    /// Reverse of [`device_id`](Self::device_id)
    pub fn from_device_id(id: u16) -> Option<Self> {
        match id {
            100 => Some(TechniqueKind::Ocv),
            107 => Some(TechniqueKind::Peis),
            110 => Some(TechniqueKind::Geis),
            113 => Some(TechniqueKind::Speis),
            114 => Some(TechniqueKind::Sgeis),
            _ => None,
        }
    }
}

impl fmt::Display for TechniqueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TechniqueKind::Ocv => "OCV",
            TechniqueKind::Peis => "PEIS",
            TechniqueKind::Speis => "SPEIS",
            TechniqueKind::Geis => "GEIS",
            TechniqueKind::Sgeis => "SGEIS",
        };
        f.write_str(name)
    }
}

/// A single flat technique parameter
#[derive(Debug, Clone, PartialEq)]
pub struct EccParam {
    /// Wire-level parameter label
    pub label: &'static str,
    pub value: ParamValue,
    /// Multi-step parameter slot; 0 for scalar parameters
    pub index: i32,
}

/// Typed parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Single(f32),
}

fn bool_param(label: &'static str, value: bool) -> EccParam {
    EccParam {
        label,
        value: ParamValue::Bool(value),
        index: 0,
    }
}

fn int_param(label: &'static str, value: i32) -> EccParam {
    EccParam {
        label,
        value: ParamValue::Int(value),
        index: 0,
    }
}

fn single_param(label: &'static str, value: f32) -> EccParam {
    EccParam {
        label,
        value: ParamValue::Single(value),
        index: 0,
    }
}

/// Working-electrode voltage range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoltageRange {
    Range2v5,
    Range5v,
    Range10v,
    #[default]
    Auto,
}

impl VoltageRange {
    pub fn code(self) -> i32 {
        match self {
            VoltageRange::Range2v5 => 0,
            VoltageRange::Range5v => 1,
            VoltageRange::Range10v => 2,
            VoltageRange::Auto => 3,
        }
    }
}

/// Cell current range; galvanostatic techniques must pick a fixed one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentRange {
    NanoAmp100,
    MicroAmp1,
    MicroAmp10,
    MicroAmp100,
    MilliAmp1,
    MilliAmp10,
    MilliAmp100,
    Amp1,
    Auto,
}

impl CurrentRange {
    pub fn code(self) -> i32 {
        match self {
            CurrentRange::NanoAmp100 => 0,
            CurrentRange::MicroAmp1 => 1,
            CurrentRange::MicroAmp10 => 2,
            CurrentRange::MicroAmp100 => 3,
            CurrentRange::MilliAmp1 => 4,
            CurrentRange::MilliAmp10 => 5,
            CurrentRange::MilliAmp100 => 6,
            CurrentRange::Amp1 => 7,
            CurrentRange::Auto => 8,
        }
    }
}

/// Highest step index a staircase technique accepts
pub const MAX_STEP_NUMBER: u32 = 98;

/// Key parameters the state machine reads during a run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyParams {
    /// Expected run duration when the technique has a fixed one
    pub duration_s: Option<f64>,
    /// Sampling interval of the time series
    pub sample_interval_s: Option<f64>,
    pub initial_frequency_hz: Option<f64>,
    pub final_frequency_hz: Option<f64>,
    /// Points per frequency sweep
    pub frequency_count: Option<u32>,
    /// Staircase step count
    pub step_count: Option<u32>,
}

/// Open-circuit voltage settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OcvSettings {
    /// Rest duration in seconds
    pub rest_time_s: f32,
    /// Record when the potential drifts this many millivolts
    pub record_every_de_mv: f32,
    /// Record at least every this many seconds
    pub record_every_dt_s: f32,
    pub voltage_range: VoltageRange,
}

impl OcvSettings {
    pub fn validate(&self) -> BlResult<()> {
        if self.rest_time_s <= 0.0 {
            return Err(BlError::InvalidSettings(
                "rest time must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn to_params(&self) -> Vec<EccParam> {
        vec![
            single_param("Rest_time_T", self.rest_time_s),
            single_param("Record_every_dE", self.record_every_de_mv),
            single_param("Record_every_dT", self.record_every_dt_s),
            int_param("E_Range", self.voltage_range.code()),
        ]
    }

    pub fn key_params(&self) -> KeyParams {
        KeyParams {
            duration_s: Some(f64::from(self.rest_time_s)),
            sample_interval_s: Some(f64::from(self.record_every_dt_s)),
            ..KeyParams::default()
        }
    }
}

/// Potentiostatic impedance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeisSettings {
    /// Voltage step is relative to the previous value rather than absolute
    pub vs_initial: bool,
    pub initial_voltage_v: f32,
    /// Hold at the step before sweeping, in seconds
    pub duration_step_s: f32,
    pub record_every_dt_s: f32,
    pub record_every_di_a: f32,
    pub final_frequency_hz: f32,
    pub initial_frequency_hz: f32,
    /// Linear frequency spacing instead of logarithmic
    pub sweep_linear: bool,
    pub amplitude_v: f32,
    pub frequency_count: u32,
    pub average_n_times: u32,
    /// Apply non-stationary correction
    pub correction: bool,
    /// Fraction of a period to wait for steady state
    pub wait_for_steady: f32,
}

impl PeisSettings {
    pub fn validate(&self) -> BlResult<()> {
        validate_frequencies(self.initial_frequency_hz, self.final_frequency_hz)
    }

    pub fn to_params(&self) -> Vec<EccParam> {
        vec![
            bool_param("vs_initial", self.vs_initial),
            single_param("Initial_Voltage_step", self.initial_voltage_v),
            single_param("Duration_step", self.duration_step_s),
            single_param("Record_every_dT", self.record_every_dt_s),
            single_param("Record_every_dI", self.record_every_di_a),
            single_param("Final_frequency", self.final_frequency_hz),
            single_param("Initial_frequency", self.initial_frequency_hz),
            bool_param("sweep", self.sweep_linear),
            single_param("Amplitude_Voltage", self.amplitude_v),
            int_param("Frequency_number", self.frequency_count as i32),
            int_param("Average_N_times", self.average_n_times as i32),
            bool_param("Correction", self.correction),
            single_param("Wait_for_steady", self.wait_for_steady),
        ]
    }

    pub fn key_params(&self) -> KeyParams {
        KeyParams {
            duration_s: None,
            sample_interval_s: Some(f64::from(self.record_every_dt_s)),
            initial_frequency_hz: Some(f64::from(self.initial_frequency_hz)),
            final_frequency_hz: Some(f64::from(self.final_frequency_hz)),
            frequency_count: Some(self.frequency_count),
            step_count: None,
        }
    }
}

/// Staircase potentiostatic impedance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeisSettings {
    pub vs_initial: bool,
    pub vs_final: bool,
    pub initial_voltage_v: f32,
    pub final_voltage_v: f32,
    pub duration_step_s: f32,
    /// Number of staircase steps, 0..=98
    pub step_count: u32,
    pub record_every_dt_s: f32,
    pub record_every_di_a: f32,
    pub final_frequency_hz: f32,
    pub initial_frequency_hz: f32,
    pub sweep_linear: bool,
    pub amplitude_v: f32,
    pub frequency_count: u32,
    pub average_n_times: u32,
    pub correction: bool,
    pub wait_for_steady: f32,
}

impl SpeisSettings {
    pub fn validate(&self) -> BlResult<()> {
        if self.step_count > MAX_STEP_NUMBER {
            return Err(BlError::InvalidSettings(format!(
                "step count {} exceeds {MAX_STEP_NUMBER}",
                self.step_count
            )));
        }
        validate_frequencies(self.initial_frequency_hz, self.final_frequency_hz)
    }

    pub fn to_params(&self) -> Vec<EccParam> {
        vec![
            bool_param("vs_initial", self.vs_initial),
            bool_param("vs_final", self.vs_final),
            single_param("Initial_Voltage_step", self.initial_voltage_v),
            single_param("Final_Voltage_step", self.final_voltage_v),
            single_param("Duration_step", self.duration_step_s),
            int_param("Step_number", self.step_count as i32),
            single_param("Record_every_dT", self.record_every_dt_s),
            single_param("Record_every_dI", self.record_every_di_a),
            single_param("Final_frequency", self.final_frequency_hz),
            single_param("Initial_frequency", self.initial_frequency_hz),
            bool_param("sweep", self.sweep_linear),
            single_param("Amplitude_Voltage", self.amplitude_v),
            int_param("Frequency_number", self.frequency_count as i32),
            int_param("Average_N_times", self.average_n_times as i32),
            bool_param("Correction", self.correction),
            single_param("Wait_for_steady", self.wait_for_steady),
        ]
    }

    pub fn key_params(&self) -> KeyParams {
        KeyParams {
            duration_s: None,
            sample_interval_s: Some(f64::from(self.record_every_dt_s)),
            initial_frequency_hz: Some(f64::from(self.initial_frequency_hz)),
            final_frequency_hz: Some(f64::from(self.final_frequency_hz)),
            frequency_count: Some(self.frequency_count),
            step_count: Some(self.step_count),
        }
    }
}

/// Galvanostatic impedance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeisSettings {
    /// Current step is relative to the previous value rather than absolute
    pub vs_initial: bool,
    pub initial_current_a: f32,
    pub duration_step_s: f32,
    pub record_every_dt_s: f32,
    pub record_every_de_v: f32,
    pub final_frequency_hz: f32,
    pub initial_frequency_hz: f32,
    pub sweep_linear: bool,
    pub amplitude_a: f32,
    pub frequency_count: u32,
    pub average_n_times: u32,
    pub correction: bool,
    pub wait_for_steady: f32,
    /// Fixed current range; `Auto` is rejected
    pub current_range: CurrentRange,
}

impl GeisSettings {
    pub fn validate(&self) -> BlResult<()> {
        if self.current_range == CurrentRange::Auto {
            return Err(BlError::InvalidSettings(
                "galvanostatic techniques need a fixed current range".into(),
            ));
        }
        validate_frequencies(self.initial_frequency_hz, self.final_frequency_hz)
    }

    pub fn to_params(&self) -> Vec<EccParam> {
        vec![
            bool_param("vs_initial", self.vs_initial),
            single_param("Initial_Current_step", self.initial_current_a),
            single_param("Duration_step", self.duration_step_s),
            single_param("Record_every_dT", self.record_every_dt_s),
            single_param("Record_every_dE", self.record_every_de_v),
            single_param("Final_frequency", self.final_frequency_hz),
            single_param("Initial_frequency", self.initial_frequency_hz),
            bool_param("sweep", self.sweep_linear),
            single_param("Amplitude_Current", self.amplitude_a),
            int_param("Frequency_number", self.frequency_count as i32),
            int_param("Average_N_times", self.average_n_times as i32),
            bool_param("Correction", self.correction),
            single_param("Wait_for_steady", self.wait_for_steady),
            int_param("I_Range", self.current_range.code()),
        ]
    }

    pub fn key_params(&self) -> KeyParams {
        KeyParams {
            duration_s: None,
            sample_interval_s: Some(f64::from(self.record_every_dt_s)),
            initial_frequency_hz: Some(f64::from(self.initial_frequency_hz)),
            final_frequency_hz: Some(f64::from(self.final_frequency_hz)),
            frequency_count: Some(self.frequency_count),
            step_count: None,
        }
    }
}

/// Staircase galvanostatic impedance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgeisSettings {
    pub vs_initial: bool,
    pub vs_final: bool,
    pub initial_current_a: f32,
    pub final_current_a: f32,
    pub duration_step_s: f32,
    /// Number of staircase steps, 0..=98
    pub step_count: u32,
    pub record_every_dt_s: f32,
    pub record_every_de_v: f32,
    pub final_frequency_hz: f32,
    pub initial_frequency_hz: f32,
    pub sweep_linear: bool,
    pub amplitude_a: f32,
    pub frequency_count: u32,
    pub average_n_times: u32,
    pub correction: bool,
    pub wait_for_steady: f32,
    /// Fixed current range; `Auto` is rejected
    pub current_range: CurrentRange,
}

impl SgeisSettings {
    pub fn validate(&self) -> BlResult<()> {
        if self.current_range == CurrentRange::Auto {
            return Err(BlError::InvalidSettings(
                "galvanostatic techniques need a fixed current range".into(),
            ));
        }
        if self.step_count > MAX_STEP_NUMBER {
            return Err(BlError::InvalidSettings(format!(
                "step count {} exceeds {MAX_STEP_NUMBER}",
                self.step_count
            )));
        }
        validate_frequencies(self.initial_frequency_hz, self.final_frequency_hz)
    }

    pub fn to_params(&self) -> Vec<EccParam> {
        vec![
            bool_param("vs_initial", self.vs_initial),
            bool_param("vs_final", self.vs_final),
            single_param("Initial_Current_step", self.initial_current_a),
            single_param("Final_Current_step", self.final_current_a),
            single_param("Duration_step", self.duration_step_s),
            int_param("Step_number", self.step_count as i32),
            single_param("Record_every_dT", self.record_every_dt_s),
            single_param("Record_every_dE", self.record_every_de_v),
            single_param("Final_frequency", self.final_frequency_hz),
            single_param("Initial_frequency", self.initial_frequency_hz),
            bool_param("sweep", self.sweep_linear),
            single_param("Amplitude_Current", self.amplitude_a),
            int_param("Frequency_number", self.frequency_count as i32),
            int_param("Average_N_times", self.average_n_times as i32),
            bool_param("Correction", self.correction),
            single_param("Wait_for_steady", self.wait_for_steady),
            int_param("I_Range", self.current_range.code()),
        ]
    }

    pub fn key_params(&self) -> KeyParams {
        KeyParams {
            duration_s: None,
            sample_interval_s: Some(f64::from(self.record_every_dt_s)),
            initial_frequency_hz: Some(f64::from(self.initial_frequency_hz)),
            final_frequency_hz: Some(f64::from(self.final_frequency_hz)),
            frequency_count: Some(self.frequency_count),
            step_count: Some(self.step_count),
        }
    }
}

fn validate_frequencies(initial_hz: f32, final_hz: f32) -> BlResult<()> {
    if initial_hz <= 0.0 || final_hz <= 0.0 {
        return Err(BlError::InvalidSettings(
            "frequencies must be positive".into(),
        ));
    }
    Ok(())
}

/// Settings for any supported technique
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TechniqueSettings {
    Ocv(OcvSettings),
    Peis(PeisSettings),
    Speis(SpeisSettings),
    Geis(GeisSettings),
    Sgeis(SgeisSettings),
}

impl TechniqueSettings {
    pub fn kind(&self) -> TechniqueKind {
        match self {
            TechniqueSettings::Ocv(_) => TechniqueKind::Ocv,
            TechniqueSettings::Peis(_) => TechniqueKind::Peis,
            TechniqueSettings::Speis(_) => TechniqueKind::Speis,
            TechniqueSettings::Geis(_) => TechniqueKind::Geis,
            TechniqueSettings::Sgeis(_) => TechniqueKind::Sgeis,
        }
    }

    pub fn validate(&self) -> BlResult<()> {
        match self {
            TechniqueSettings::Ocv(s) => s.validate(),
            TechniqueSettings::Peis(s) => s.validate(),
            TechniqueSettings::Speis(s) => s.validate(),
            TechniqueSettings::Geis(s) => s.validate(),
            TechniqueSettings::Sgeis(s) => s.validate(),
        }
    }

    /// Flat descriptor list in the device's expected order
    pub fn to_params(&self) -> Vec<EccParam> {
        match self {
            TechniqueSettings::Ocv(s) => s.to_params(),
            TechniqueSettings::Peis(s) => s.to_params(),
            TechniqueSettings::Speis(s) => s.to_params(),
            TechniqueSettings::Geis(s) => s.to_params(),
            TechniqueSettings::Sgeis(s) => s.to_params(),
        }
    }

    pub fn key_params(&self) -> KeyParams {
        match self {
            TechniqueSettings::Ocv(s) => s.key_params(),
            TechniqueSettings::Peis(s) => s.key_params(),
            TechniqueSettings::Speis(s) => s.key_params(),
            TechniqueSettings::Geis(s) => s.key_params(),
            TechniqueSettings::Sgeis(s) => s.key_params(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn peis() -> PeisSettings {
        PeisSettings {
            vs_initial: false,
            initial_voltage_v: 0.0,
            duration_step_s: 10.0,
            record_every_dt_s: 0.1,
            record_every_di_a: 0.001,
            final_frequency_hz: 0.1,
            initial_frequency_hz: 100_000.0,
            sweep_linear: false,
            amplitude_v: 0.01,
            frequency_count: 51,
            average_n_times: 2,
            correction: false,
            wait_for_steady: 0.1,
        }
    }

    fn geis() -> GeisSettings {
        GeisSettings {
            vs_initial: false,
            initial_current_a: 0.0,
            duration_step_s: 10.0,
            record_every_dt_s: 0.1,
            record_every_de_v: 0.01,
            final_frequency_hz: 0.1,
            initial_frequency_hz: 10_000.0,
            sweep_linear: false,
            amplitude_a: 0.005,
            frequency_count: 41,
            average_n_times: 1,
            correction: false,
            wait_for_steady: 0.1,
            current_range: CurrentRange::MilliAmp100,
        }
    }

    #[test]
    fn ocv_builds_four_params_in_order() {
        let params = OcvSettings {
            rest_time_s: 30.0,
            record_every_de_mv: 1.0,
            record_every_dt_s: 0.5,
            voltage_range: VoltageRange::Range5v,
        }
        .to_params();
        let labels: Vec<&str> = params.iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec!["Rest_time_T", "Record_every_dE", "Record_every_dT", "E_Range"]
        );
        assert_eq!(params[3].value, ParamValue::Int(1));
    }

    #[test]
    fn peis_builds_thirteen_params_in_order() {
        let params = peis().to_params();
        assert_eq!(params.len(), 13);
        let labels: Vec<&str> = params.iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec![
                "vs_initial",
                "Initial_Voltage_step",
                "Duration_step",
                "Record_every_dT",
                "Record_every_dI",
                "Final_frequency",
                "Initial_frequency",
                "sweep",
                "Amplitude_Voltage",
                "Frequency_number",
                "Average_N_times",
                "Correction",
                "Wait_for_steady",
            ]
        );
    }

    #[test]
    fn speis_inserts_final_step_fields_and_step_number() {
        let params = SpeisSettings {
            vs_initial: false,
            vs_final: true,
            initial_voltage_v: 3.0,
            final_voltage_v: 4.2,
            duration_step_s: 5.0,
            step_count: 12,
            record_every_dt_s: 0.1,
            record_every_di_a: 0.001,
            final_frequency_hz: 1.0,
            initial_frequency_hz: 10_000.0,
            sweep_linear: false,
            amplitude_v: 0.01,
            frequency_count: 21,
            average_n_times: 1,
            correction: false,
            wait_for_steady: 0.1,
        }
        .to_params();
        assert_eq!(params.len(), 16);
        assert_eq!(params[0].label, "vs_initial");
        assert_eq!(params[1].label, "vs_final");
        assert_eq!(params[3].label, "Final_Voltage_step");
        assert_eq!(params[5].label, "Step_number");
        assert_eq!(params[5].value, ParamValue::Int(12));
        assert_eq!(params[15].label, "Wait_for_steady");
    }

    #[test]
    fn geis_builds_fourteen_params_with_trailing_range() {
        let params = geis().to_params();
        assert_eq!(params.len(), 14);
        assert_eq!(params[1].label, "Initial_Current_step");
        assert_eq!(params[4].label, "Record_every_dE");
        assert_eq!(params[8].label, "Amplitude_Current");
        assert_eq!(params[13].label, "I_Range");
        assert_eq!(
            params[13].value,
            ParamValue::Int(CurrentRange::MilliAmp100.code())
        );
    }

    #[test]
    fn sgeis_builds_seventeen_params() {
        let params = SgeisSettings {
            vs_initial: false,
            vs_final: false,
            initial_current_a: 0.0,
            final_current_a: 0.1,
            duration_step_s: 5.0,
            step_count: 4,
            record_every_dt_s: 0.1,
            record_every_de_v: 0.01,
            final_frequency_hz: 1.0,
            initial_frequency_hz: 1000.0,
            sweep_linear: true,
            amplitude_a: 0.005,
            frequency_count: 11,
            average_n_times: 1,
            correction: false,
            wait_for_steady: 0.1,
            current_range: CurrentRange::MilliAmp10,
        }
        .to_params();
        assert_eq!(params.len(), 17);
        assert_eq!(params[3].label, "Final_Current_step");
        assert_eq!(params[5].label, "Step_number");
        assert_eq!(params[16].label, "I_Range");
    }

    #[test]
    fn auto_current_range_rejected_for_galvanostatic() {
        let mut settings = geis();
        settings.current_range = CurrentRange::Auto;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn step_count_bounded() {
        let speis = SpeisSettings {
            vs_initial: false,
            vs_final: false,
            initial_voltage_v: 0.0,
            final_voltage_v: 1.0,
            duration_step_s: 1.0,
            step_count: 99,
            record_every_dt_s: 0.1,
            record_every_di_a: 0.001,
            final_frequency_hz: 1.0,
            initial_frequency_hz: 100.0,
            sweep_linear: false,
            amplitude_v: 0.01,
            frequency_count: 5,
            average_n_times: 1,
            correction: false,
            wait_for_steady: 0.1,
        };
        assert!(speis.validate().is_err());
    }

    #[test]
    fn ecc_paths_match_shipped_library() {
        assert_eq!(TechniqueKind::Ocv.ecc_path(), "lib/ocv.ecc");
        assert_eq!(TechniqueKind::Peis.ecc_path(), "lib/peis.ecc");
        assert_eq!(TechniqueKind::Speis.ecc_path(), "lib/seisp.ecc");
        assert_eq!(TechniqueKind::Geis.ecc_path(), "lib/geis.ecc");
        assert_eq!(TechniqueKind::Sgeis.ecc_path(), "lib/seisg.ecc");
    }

    #[test]
    fn impedance_results_live_on_process_one() {
        assert_eq!(TechniqueKind::Ocv.expected_process_index(), 0);
        for kind in [
            TechniqueKind::Peis,
            TechniqueKind::Speis,
            TechniqueKind::Geis,
            TechniqueKind::Sgeis,
        ] {
            assert_eq!(kind.expected_process_index(), 1);
        }
    }

    #[test]
    fn device_id_round_trip() {
        for kind in [
            TechniqueKind::Ocv,
            TechniqueKind::Peis,
            TechniqueKind::Speis,
            TechniqueKind::Geis,
            TechniqueKind::Sgeis,
        ] {
            assert_eq!(TechniqueKind::from_device_id(kind.device_id()), Some(kind));
        }
        assert_eq!(TechniqueKind::from_device_id(9999), None);
    }
}
