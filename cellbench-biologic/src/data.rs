//! Raw sample buffers and the raw-to-columnar decoders
//!
//! The device streams samples as packed 32-bit words, row-major. Within a
//! row the positions are fixed per technique and process index. Scalar
//! positions reinterpret the word as an IEEE single; the time series'
//! two-word timestamps multiply a 64-bit tick count by the channel
//! timebase.

use crate::error::{BlError, BlResult};
use crate::params::TechniqueKind;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One retrieved sample matrix
///
/// `Clone` deep-copies the word array; handing a clone out transfers a
/// fully independent buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBuffer {
    words: Vec<u32>,
    rows: usize,
    cols: usize,
    technique_id: u16,
    process_index: u8,
}

impl RawBuffer {
    /// Build a buffer, enforcing `rows × cols == words.len()`
    pub fn new(
        words: Vec<u32>,
        rows: usize,
        cols: usize,
        technique_id: u16,
        process_index: u8,
    ) -> BlResult<Self> {
        if rows.checked_mul(cols) != Some(words.len()) {
            return Err(BlError::InvalidVariableCount {
                expected: rows.saturating_mul(cols),
                actual: words.len(),
            });
        }
        Ok(Self {
            words,
            rows,
            cols,
            technique_id,
            process_index,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn technique_id(&self) -> u16 {
        self.technique_id
    }

    pub fn process_index(&self) -> u8 {
        self.process_index
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Word at (row, col); rows and cols are bounds-checked by the layout
    fn word(&self, row: usize, col: usize) -> u32 {
        self.words[row * self.cols + col]
    }
}

/// One named, unit-annotated output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub unit: String,
    pub values: Vec<f64>,
}

impl Column {
    fn new(name: &str, unit: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_owned(),
            unit: unit.to_owned(),
            values,
        }
    }
}

/// Decoded columnar data; destroyed as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedData {
    pub rows: usize,
    pub columns: Vec<Column>,
}

/// Reinterpret a packed word as the device's IEEE single
fn single(word: u32) -> f64 {
    f64::from(f32::from_bits(word))
}

/// Decode a two-word timestamp (high, low) into seconds
fn time_words(high: u32, low: u32, timebase_s: f64) -> f64 {
    let ticks = (u64::from(high) << 32) | u64::from(low);
    ticks as f64 * timebase_s
}

/// Decode a buffer into named columns
///
/// Dispatches on the technique id the device stamped on the buffer. An
/// unknown id degrades to a column-count-preserving pass-through with
/// empty names and units, leaving interpretation to the caller.
pub fn convert(raw: &RawBuffer, timebase_s: f64) -> BlResult<ConvertedData> {
    match TechniqueKind::from_device_id(raw.technique_id) {
        Some(kind) => convert_known(kind, raw, timebase_s),
        None => Ok(opaque(raw)),
    }
}

/// Decode a buffer whose technique is already known
pub fn convert_known(
    kind: TechniqueKind,
    raw: &RawBuffer,
    timebase_s: f64,
) -> BlResult<ConvertedData> {
    match (kind, raw.process_index) {
        (TechniqueKind::Ocv, 0) => ocv_process0(raw, timebase_s),
        (TechniqueKind::Peis | TechniqueKind::Geis, 0) => time_series_process0(raw, timebase_s),
        (TechniqueKind::Peis | TechniqueKind::Geis, 1) => impedance_process1(raw, false),
        (TechniqueKind::Speis | TechniqueKind::Sgeis, 0) => stepped_series_process0(raw, timebase_s),
        (TechniqueKind::Speis | TechniqueKind::Sgeis, 1) => impedance_process1(raw, true),
        (kind, actual) => Err(BlError::WrongProcessIndex {
            expected: kind.expected_process_index(),
            actual,
        }),
    }
}

fn require_cols(raw: &RawBuffer, at_least: usize) -> BlResult<()> {
    if raw.cols < at_least {
        return Err(BlError::InvalidVariableCount {
            expected: at_least,
            actual: raw.cols,
        });
    }
    Ok(())
}

/// OCV process 0: Time, Ewe, Ece
fn ocv_process0(raw: &RawBuffer, timebase_s: f64) -> BlResult<ConvertedData> {
    require_cols(raw, 4)?;
    let mut time = Vec::with_capacity(raw.rows);
    let mut ewe = Vec::with_capacity(raw.rows);
    let mut ece = Vec::with_capacity(raw.rows);
    for r in 0..raw.rows {
        time.push(time_words(raw.word(r, 0), raw.word(r, 1), timebase_s));
        ewe.push(single(raw.word(r, 2)));
        ece.push(single(raw.word(r, 3)));
    }
    Ok(ConvertedData {
        rows: raw.rows,
        columns: vec![
            Column::new("Time", "s", time),
            Column::new("Ewe", "V", ewe),
            Column::new("Ece", "V", ece),
        ],
    })
}

/// PEIS/GEIS process 0: Time, Ewe, I
fn time_series_process0(raw: &RawBuffer, timebase_s: f64) -> BlResult<ConvertedData> {
    require_cols(raw, 4)?;
    let mut time = Vec::with_capacity(raw.rows);
    let mut ewe = Vec::with_capacity(raw.rows);
    let mut current = Vec::with_capacity(raw.rows);
    for r in 0..raw.rows {
        time.push(time_words(raw.word(r, 0), raw.word(r, 1), timebase_s));
        ewe.push(single(raw.word(r, 2)));
        current.push(single(raw.word(r, 3)));
    }
    Ok(ConvertedData {
        rows: raw.rows,
        columns: vec![
            Column::new("Time", "s", time),
            Column::new("Ewe", "V", ewe),
            Column::new("I", "A", current),
        ],
    })
}

/// SPEIS/SGEIS process 0: Time, Ewe, I, Step
fn stepped_series_process0(raw: &RawBuffer, timebase_s: f64) -> BlResult<ConvertedData> {
    require_cols(raw, 5)?;
    let mut data = time_series_process0(raw, timebase_s)?;
    let step = (0..raw.rows).map(|r| f64::from(raw.word(r, 4))).collect();
    data.columns.push(Column::new("Step", "", step));
    Ok(data)
}

/// Impedance table layout shared by the four EIS variants
///
/// The time value sits at position 13 regardless of row width; the source
/// format has never shipped a narrower impedance row. Staircase variants
/// append a verbatim Step integer at 15 (wide rows) or 14.
fn impedance_process1(raw: &RawBuffer, with_step: bool) -> BlResult<ConvertedData> {
    let step_col = if raw.cols > 15 { 15 } else { 14 };
    let min_cols = if with_step { step_col + 1 } else { 14 };
    require_cols(raw, min_cols)?;

    let rows = raw.rows;
    let mut freq = Vec::with_capacity(rows);
    let mut abs_ewe = Vec::with_capacity(rows);
    let mut abs_i = Vec::with_capacity(rows);
    let mut phase = Vec::with_capacity(rows);
    let mut re = Vec::with_capacity(rows);
    let mut im = Vec::with_capacity(rows);
    let mut ewe = Vec::with_capacity(rows);
    let mut current = Vec::with_capacity(rows);
    let mut abs_ece = Vec::with_capacity(rows);
    let mut abs_ice = Vec::with_capacity(rows);
    let mut time = Vec::with_capacity(rows);
    let mut step = Vec::with_capacity(rows);

    for r in 0..rows {
        let magnitude_ewe = single(raw.word(r, 1));
        let magnitude_i = single(raw.word(r, 2));
        let phase_deg = single(raw.word(r, 3));
        let magnitude_z = magnitude_ewe / magnitude_i;
        let phase_rad = phase_deg * PI / 180.0;

        freq.push(single(raw.word(r, 0)));
        abs_ewe.push(magnitude_ewe);
        abs_i.push(magnitude_i);
        phase.push(phase_deg);
        re.push(magnitude_z * phase_rad.cos());
        im.push(magnitude_z * phase_rad.sin());
        ewe.push(single(raw.word(r, 4)));
        current.push(single(raw.word(r, 5)));
        abs_ece.push(single(raw.word(r, 7)));
        abs_ice.push(single(raw.word(r, 8)));
        time.push(single(raw.word(r, 13)));
        if with_step {
            step.push(f64::from(raw.word(r, step_col)));
        }
    }

    let mut columns = vec![
        Column::new("Frequency", "Hz", freq),
        Column::new("|Ewe|", "V", abs_ewe),
        Column::new("|I|", "A", abs_i),
        Column::new("Phase_Zwe", "deg", phase),
        Column::new("Re(Zwe)", "Ohm", re),
        Column::new("Im(Zwe)", "Ohm", im),
        Column::new("Ewe", "V", ewe),
        Column::new("I", "A", current),
        Column::new("|Ece|", "V", abs_ece),
        Column::new("|Ice|", "A", abs_ice),
        Column::new("Time", "s", time),
    ];
    if with_step {
        columns.push(Column::new("Step", "", step));
    }
    Ok(ConvertedData { rows, columns })
}

/// Unknown technique: pass every raw column through verbatim, nameless
fn opaque(raw: &RawBuffer) -> ConvertedData {
    let columns = (0..raw.cols)
        .map(|c| Column {
            name: String::new(),
            unit: String::new(),
            values: (0..raw.rows).map(|r| f64::from(raw.word(r, c))).collect(),
        })
        .collect();
    ConvertedData {
        rows: raw.rows,
        columns,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ticks(seconds: f64, timebase_s: f64) -> (u32, u32) {
        let ticks = (seconds / timebase_s) as u64;
        ((ticks >> 32) as u32, ticks as u32)
    }

    fn f(value: f32) -> u32 {
        value.to_bits()
    }

    #[test]
    fn raw_buffer_rejects_shape_mismatch() {
        let err = RawBuffer::new(vec![0; 7], 2, 4, 100, 0);
        assert_eq!(
            err,
            Err(BlError::InvalidVariableCount {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn clone_is_a_deep_word_copy() {
        let buf = RawBuffer::new(vec![1, 2, 3, 4], 1, 4, 100, 0).unwrap();
        let copy = buf.clone();
        assert_eq!(copy, buf);
        assert_eq!(copy.words(), buf.words());
    }

    #[test]
    fn ocv_rows_decode_time_and_voltages() {
        let timebase = 2e-5;
        let (h0, l0) = ticks(0.0, timebase);
        let (h1, l1) = ticks(0.5, timebase);
        let words = vec![
            h0, l0, f(3.71), f(0.02), //
            h1, l1, f(3.70), f(0.03),
        ];
        let raw = RawBuffer::new(words, 2, 4, TechniqueKind::Ocv.device_id(), 0).unwrap();
        let data = convert(&raw, timebase).unwrap();

        assert_eq!(data.rows, 2);
        let names: Vec<&str> = data.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Time", "Ewe", "Ece"]);
        assert_eq!(data.columns[0].unit, "s");
        assert!((data.columns[0].values[1] - 0.5).abs() < 1e-9);
        assert!((data.columns[1].values[0] - 3.71).abs() < 1e-6);
        assert!((data.columns[2].values[1] - 0.03).abs() < 1e-6);
    }

    fn impedance_row(freq: f32, abs_ewe: f32, abs_i: f32, phase_deg: f32, cols: usize, step: u32) -> Vec<u32> {
        let mut row = vec![0u32; cols];
        row[0] = f(freq);
        row[1] = f(abs_ewe);
        row[2] = f(abs_i);
        row[3] = f(phase_deg);
        row[4] = f(3.6);
        row[5] = f(0.1);
        row[7] = f(0.0);
        row[8] = f(0.0);
        row[13] = f(12.5);
        let step_col = if cols > 15 { 15 } else { 14 };
        if cols > step_col {
            row[step_col] = step;
        }
        row
    }

    #[test]
    fn peis_impedance_computes_re_and_im() {
        let row = impedance_row(1000.0, 0.01, 0.002, -30.0, 14, 0);
        let raw = RawBuffer::new(row, 1, 14, TechniqueKind::Peis.device_id(), 1).unwrap();
        let data = convert(&raw, 2e-5).unwrap();

        assert_eq!(data.columns.len(), 11);
        let magnitude = 0.01f64 / 0.002f64;
        let phase_rad = -30.0f64.to_radians();
        let re = data.columns[4].values[0];
        let im = data.columns[5].values[0];
        assert!((re - magnitude * phase_rad.cos()).abs() < 1e-6);
        assert!((im - magnitude * phase_rad.sin()).abs() < 1e-6);
        assert!(im < 0.0);
        assert!(((re * re + im * im).sqrt() - magnitude).abs() < 1e-6);
        assert!((data.columns[10].values[0] - 12.5).abs() < 1e-6);
    }

    #[test]
    fn speis_reads_step_at_fourteen_on_narrow_rows() {
        let row = impedance_row(100.0, 0.01, 0.001, 10.0, 15, 7);
        let raw = RawBuffer::new(row, 1, 15, TechniqueKind::Speis.device_id(), 1).unwrap();
        let data = convert(&raw, 2e-5).unwrap();
        assert_eq!(data.columns.len(), 12);
        assert_eq!(data.columns[11].name, "Step");
        assert_eq!(data.columns[11].values[0], 7.0);
    }

    #[test]
    fn sgeis_reads_step_at_fifteen_on_wide_rows() {
        let row = impedance_row(100.0, 0.01, 0.001, 10.0, 17, 42);
        let raw = RawBuffer::new(row, 1, 17, TechniqueKind::Sgeis.device_id(), 1).unwrap();
        let data = convert(&raw, 2e-5).unwrap();
        assert_eq!(data.columns[11].values[0], 42.0);
    }

    #[test]
    fn stepped_time_series_has_four_columns() {
        let timebase = 1e-5;
        let (h, l) = ticks(1.0, timebase);
        let words = vec![h, l, f(3.9), f(0.25), 3];
        let raw = RawBuffer::new(words, 1, 5, TechniqueKind::Speis.device_id(), 0).unwrap();
        let data = convert(&raw, timebase).unwrap();
        let names: Vec<&str> = data.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Time", "Ewe", "I", "Step"]);
        assert_eq!(data.columns[3].values[0], 3.0);
    }

    #[test]
    fn unknown_technique_passes_columns_through() {
        let raw = RawBuffer::new(vec![1, 2, 3, 4, 5, 6], 2, 3, 9001, 0).unwrap();
        let data = convert(&raw, 2e-5).unwrap();
        assert_eq!(data.columns.len(), 3);
        assert!(data.columns.iter().all(|c| c.name.is_empty() && c.unit.is_empty()));
        assert_eq!(data.columns[0].values, vec![1.0, 4.0]);
    }

    #[test]
    fn wrong_process_index_is_rejected_for_known_techniques() {
        let raw = RawBuffer::new(vec![0; 14], 1, 14, TechniqueKind::Peis.device_id(), 3).unwrap();
        assert_eq!(
            convert(&raw, 2e-5),
            Err(BlError::WrongProcessIndex {
                expected: 1,
                actual: 3
            })
        );
    }

    #[test]
    fn narrow_impedance_rows_are_rejected() {
        let raw = RawBuffer::new(vec![0; 10], 1, 10, TechniqueKind::Geis.device_id(), 1).unwrap();
        assert!(matches!(
            convert(&raw, 2e-5),
            Err(BlError::InvalidVariableCount { .. })
        ));
    }
}
