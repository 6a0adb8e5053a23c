//! Settle-time lookup for the EXG front-end.
//!
//! After the continuous-read command is issued, the modulator needs a number
//! of device clock cycles before the first conversion is valid; enabling the
//! data-ready trigger earlier would hand garbage frames to the pipeline. The
//! table maps each data-rate code to its settle cycles in high-resolution and
//! low-power modes, and the conversion to microseconds keeps the device
//! datasheet's integer arithmetic, rounding up.

use crate::error::{BfpError, BfpResult};

/// Device clock period used by the settle conversion.
const TCLK_PS: u32 = 488;

struct SettleRow {
    hr_cycles: u32,
    lp_cycles: u32,
}

/// Settle cycles per data-rate code. Rows are indexed by code; the rate
/// labels are the high-resolution ones (low-power mode halves them).
const SETTLE_TABLE: [SettleRow; 7] = [
    // 32 kSPS
    SettleRow {
        hr_cycles: 296,
        lp_cycles: 584,
    },
    // 16 kSPS
    SettleRow {
        hr_cycles: 584,
        lp_cycles: 1160,
    },
    // 8 kSPS
    SettleRow {
        hr_cycles: 1160,
        lp_cycles: 2312,
    },
    // 4 kSPS
    SettleRow {
        hr_cycles: 2312,
        lp_cycles: 4616,
    },
    // 2 kSPS
    SettleRow {
        hr_cycles: 4616,
        lp_cycles: 9224,
    },
    // 1 kSPS
    SettleRow {
        hr_cycles: 9224,
        lp_cycles: 18440,
    },
    // 500 SPS
    SettleRow {
        hr_cycles: 18440,
        lp_cycles: 36872,
    },
];

/// Output data rate of the front-end, named by the high-resolution rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataRate {
    /// 32 kSPS high-resolution, 16 kSPS low-power.
    Sps32k,
    /// 16 kSPS high-resolution, 8 kSPS low-power.
    Sps16k,
    /// 8 kSPS high-resolution, 4 kSPS low-power.
    Sps8k,
    /// 4 kSPS high-resolution, 2 kSPS low-power.
    Sps4k,
    /// 2 kSPS high-resolution, 1 kSPS low-power.
    Sps2k,
    /// 1 kSPS high-resolution, 500 SPS low-power.
    Sps1k,
    /// 500 SPS high-resolution, 250 SPS low-power.
    Sps500,
}

impl DataRate {
    /// Device data-rate code for this rate.
    pub fn code(self) -> u8 {
        match self {
            DataRate::Sps32k => 0,
            DataRate::Sps16k => 1,
            DataRate::Sps8k => 2,
            DataRate::Sps4k => 3,
            DataRate::Sps2k => 4,
            DataRate::Sps1k => 5,
            DataRate::Sps500 => 6,
        }
    }

    /// Maps a device data-rate code back to a rate. Codes outside the table
    /// are a configuration error, never treated as a zero settle time.
    pub fn from_code(code: u8) -> BfpResult<Self> {
        match code {
            0 => Ok(DataRate::Sps32k),
            1 => Ok(DataRate::Sps16k),
            2 => Ok(DataRate::Sps8k),
            3 => Ok(DataRate::Sps4k),
            4 => Ok(DataRate::Sps2k),
            5 => Ok(DataRate::Sps1k),
            6 => Ok(DataRate::Sps500),
            other => Err(BfpError::Configuration(format!(
                "data rate code {other} outside settle table"
            ))),
        }
    }

    /// Maps a configured samples-per-second value (high-resolution terms) to
    /// a rate.
    pub fn from_sps(sps: u32) -> BfpResult<Self> {
        match sps {
            32_000 => Ok(DataRate::Sps32k),
            16_000 => Ok(DataRate::Sps16k),
            8_000 => Ok(DataRate::Sps8k),
            4_000 => Ok(DataRate::Sps4k),
            2_000 => Ok(DataRate::Sps2k),
            1_000 => Ok(DataRate::Sps1k),
            500 => Ok(DataRate::Sps500),
            other => Err(BfpError::Configuration(format!(
                "unsupported sample rate: {other} sps"
            ))),
        }
    }
}

/// Settle delay in microseconds for a rate and resolution mode.
pub fn settle_time_us(rate: DataRate, high_resolution: bool) -> u32 {
    let row = &SETTLE_TABLE[usize::from(rate.code())];
    let cycles = if high_resolution {
        row.hr_cycles
    } else {
        row.lp_cycles
    };
    cycles * TCLK_PS / 1_000_000 + 1
}
