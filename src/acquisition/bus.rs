//! Transport seam to the EXG front-end.
//!
//! The controller drives the device exclusively through [`SampleBus`]; the
//! real SPI transport, register map, and GPIO wiring live behind it. The
//! command opcodes are the device's system command set and are part of the
//! wire contract, so they are defined here rather than in any driver.

use async_trait::async_trait;

use crate::error::BfpResult;

/// System commands the front-end accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Leave standby.
    Wakeup,
    /// Enter standby.
    Standby,
    /// Reset the device.
    Reset,
    /// Start conversions (command form of the hardware start line).
    Start,
    /// Stop conversions.
    Stop,
    /// Enter continuous data output mode.
    ReadContinuous,
    /// Leave continuous data output mode so registers are readable.
    StopReadContinuous,
    /// Read one frame by command.
    ReadData,
}

impl DeviceCommand {
    /// Wire opcode for this command.
    pub fn opcode(self) -> u8 {
        match self {
            DeviceCommand::Wakeup => 0x02,
            DeviceCommand::Standby => 0x04,
            DeviceCommand::Reset => 0x06,
            DeviceCommand::Start => 0x08,
            DeviceCommand::Stop => 0x0A,
            DeviceCommand::ReadContinuous => 0x10,
            DeviceCommand::StopReadContinuous => 0x11,
            DeviceCommand::ReadData => 0x12,
        }
    }
}

/// Async transport to the EXG front-end.
///
/// Implementations perform real bus transactions; the controller never
/// touches registers directly. All methods return
/// [`BfpError::DeviceNotReady`](crate::error::BfpError::DeviceNotReady) for
/// probe and initialization failures and
/// [`BfpError::Bus`](crate::error::BfpError::Bus) for failed transactions.
#[async_trait]
pub trait SampleBus: Send {
    /// Resets the device, probes it, and applies the base register
    /// configuration. Called once per arm.
    async fn initialize(&mut self) -> BfpResult<()>;

    /// Issues a system command.
    async fn send_command(&mut self, command: DeviceCommand) -> BfpResult<()>;

    /// Drives the hardware conversion line.
    async fn set_conversion(&mut self, enabled: bool) -> BfpResult<()>;

    /// Reads one sample frame into `frame`, returning the number of bytes
    /// the device produced.
    async fn read_frame(&mut self, frame: &mut [u8]) -> BfpResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_match_the_device_command_set() {
        let expected = [
            (DeviceCommand::Wakeup, 0x02),
            (DeviceCommand::Standby, 0x04),
            (DeviceCommand::Reset, 0x06),
            (DeviceCommand::Start, 0x08),
            (DeviceCommand::Stop, 0x0A),
            (DeviceCommand::ReadContinuous, 0x10),
            (DeviceCommand::StopReadContinuous, 0x11),
            (DeviceCommand::ReadData, 0x12),
        ];
        for (command, opcode) in expected {
            assert_eq!(command.opcode(), opcode);
        }
    }
}
