//! Driver for the DRV8323S three-phase brushless motor gate driver on the Brushless Clicks.
//!
//! Every SPI transaction is one 16-bit word: bit 15 selects a read, bits 14:11 the register
//! address and bits 10:0 the data. The device answers with the register content in the low 11
//! bits of the same word. The EN pin wakes the device; registers are lost while it is low.

use hal::blocking::delay::DelayMs;
use hal::blocking::spi::{Transfer, Write};
use hal::digital::v2::OutputPin;

use crate::error::Error;
use crate::interface::spi::{ErrorOf, SpiDevice};

pub mod registers {
    pub const FAULT_STATUS_1: u8 = 0x00;
    pub const FAULT_STATUS_2: u8 = 0x01;
    pub const DRIVER_CONTROL: u8 = 0x02;
    pub const GATE_DRIVE_HS: u8 = 0x03;
    pub const GATE_DRIVE_LS: u8 = 0x04;
    pub const OCP_CONTROL: u8 = 0x05;
    pub const CSA_CONTROL: u8 = 0x06;

    pub const LAST: u8 = CSA_CONTROL;

    pub const GATE_DRIVE_HS_RESET: u16 = 0x3FF;
    pub const GATE_DRIVE_LS_RESET: u16 = 0x7FF;
    pub const OCP_CONTROL_RESET: u16 = 0x159;
    pub const CSA_CONTROL_RESET: u16 = 0x283;

    pub mod driver_control {
        pub const PWM_MODE_SHIFT: u16 = 5;
        pub const PWM_MODE_MASK: u16 = 0b11 << PWM_MODE_SHIFT;
        pub const COAST: u16 = 1 << 2;
        pub const BRAKE: u16 = 1 << 1;
        pub const CLR_FLT: u16 = 1 << 0;
    }

    pub mod gate_drive_hs {
        pub const LOCK_SHIFT: u16 = 8;
        pub const LOCK_MASK: u16 = 0b111 << LOCK_SHIFT;
        pub const LOCK: u16 = 0b011;
        pub const UNLOCK: u16 = 0b110;
    }

    pub mod ocp_control {
        pub const DEAD_TIME_SHIFT: u16 = 8;
        pub const DEAD_TIME_MASK: u16 = 0b11 << DEAD_TIME_SHIFT;
        pub const OCP_MODE_SHIFT: u16 = 6;
        pub const OCP_MODE_MASK: u16 = 0b11 << OCP_MODE_SHIFT;
    }

    pub mod csa_control {
        pub const GAIN_SHIFT: u16 = 6;
        pub const GAIN_MASK: u16 = 0b11 << GAIN_SHIFT;
    }
}

use self::registers as reg;

const READ: u16 = 1 << 15;
const ADDRESS_SHIFT: u16 = 11;
const DATA_MASK: u16 = 0x7FF;
const WAKE_MS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmMode {
    SixInputs = 0b00,
    ThreeInputs = 0b01,
    OneInput = 0b10,
    Independent = 0b11,
}

/// Current sense amplifier gain in V/V.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CsaGain {
    X5 = 0b00,
    X10 = 0b01,
    X20 = 0b10,
    X40 = 0b11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeadTime {
    Ns50 = 0b00,
    Ns100 = 0b01,
    Ns200 = 0b10,
    Ns400 = 0b11,
}

/// Reaction to a VDS overcurrent event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OcpMode {
    LatchedShutdown = 0b00,
    AutomaticRetry = 0b01,
    ReportOnly = 0b10,
    Disabled = 0b11,
}

/// The two fault status registers, decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Faults {
    /// Logic OR of every fault, mirrors nFAULT.
    pub fault: bool,
    pub vds_overcurrent: bool,
    pub gate_drive: bool,
    pub undervoltage: bool,
    pub overtemperature_shutdown: bool,
    pub overtemperature_warning: bool,
    pub charge_pump_undervoltage: bool,
    /// VDS overcurrent per MOSFET, bit 5 = high side A down to bit 0 = low side C.
    pub vds: u8,
    /// VGS gate drive fault per MOSFET, same order as `vds`.
    pub vgs: u8,
    /// Sense amplifier overcurrent, bit 2 = phase A, bit 1 = B, bit 0 = C.
    pub sense_overcurrent: u8,
}

impl Faults {
    pub fn from_registers(status1: u16, status2: u16) -> Self {
        Self {
            fault: status1 & (1 << 10) != 0,
            vds_overcurrent: status1 & (1 << 9) != 0,
            gate_drive: status1 & (1 << 8) != 0,
            undervoltage: status1 & (1 << 7) != 0,
            overtemperature_shutdown: status1 & (1 << 6) != 0,
            vds: (status1 & 0x3F) as u8,
            sense_overcurrent: ((status2 >> 8) & 0x07) as u8,
            overtemperature_warning: status2 & (1 << 7) != 0,
            charge_pump_undervoltage: status2 & (1 << 6) != 0,
            vgs: (status2 & 0x3F) as u8,
        }
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateError<SE, PE> {
    Spi(SE),
    Enable(PE),
}

pub type ErrorFor<SPI, CS, EN> = Error<GateError<ErrorOf<SPI, CS>, <EN as OutputPin>::Error>>;

pub struct BldcGate<SPI, CS, EN> {
    dev: SpiDevice<SPI, CS>,
    en: EN,
}

impl<SPI, CS, EN> BldcGate<SPI, CS, EN>
where
    SPI: Write<u8> + Transfer<u8>,
    CS: OutputPin,
    EN: OutputPin,
{
    pub fn new(spi: SPI, cs: CS, en: EN) -> Self {
        Self {
            dev: SpiDevice::new(spi, cs),
            en,
        }
    }

    pub fn release(self) -> (SPI, CS, EN) {
        let (spi, cs) = self.dev.release();
        (spi, cs, self.en)
    }

    /// Drive EN high and wait for the device to come out of sleep.
    pub fn enable<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.en
            .set_high()
            .map_err(|e| Error::Bus(GateError::Enable(e)))?;
        delay.delay_ms(WAKE_MS);
        Ok(())
    }

    /// Put the device to sleep. Every register returns to its reset value.
    pub fn disable(&mut self) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.en
            .set_low()
            .map_err(|e| Error::Bus(GateError::Enable(e)))
    }

    fn exchange(&mut self, word: u16) -> Result<u16, ErrorFor<SPI, CS, EN>> {
        let mut frame = word.to_be_bytes();
        self.dev
            .transfer(&mut frame)
            .map_err(|e| Error::Bus(GateError::Spi(e)))?;
        Ok(u16::from_be_bytes(frame) & DATA_MASK)
    }

    fn check_address(addr: u8) -> Result<u16, ErrorFor<SPI, CS, EN>> {
        if addr > reg::LAST {
            return Err(Error::InvalidArgument);
        }
        Ok(u16::from(addr) << ADDRESS_SHIFT)
    }

    pub fn read_register(&mut self, addr: u8) -> Result<u16, ErrorFor<SPI, CS, EN>> {
        let word = READ | Self::check_address(addr)?;
        self.exchange(word)
    }

    /// Write the low 11 bits of `data` to `addr`.
    pub fn write_register(&mut self, addr: u8, data: u16) -> Result<(), ErrorFor<SPI, CS, EN>> {
        let word = Self::check_address(addr)? | (data & DATA_MASK);
        self.exchange(word).map(|_| ())
    }

    fn modify_register<F>(&mut self, addr: u8, f: F) -> Result<(), ErrorFor<SPI, CS, EN>>
    where
        F: FnOnce(u16) -> u16,
    {
        let value = self.read_register(addr)?;
        self.write_register(addr, f(value))
    }

    fn write_field(
        &mut self,
        addr: u8,
        mask: u16,
        shift: u16,
        value: u16,
    ) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.modify_register(addr, |v| (v & !mask) | ((value << shift) & mask))
    }

    /// 3x PWM mode, 20 V/V sense gain, 100 ns dead time.
    pub fn default_cfg(&mut self) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.set_pwm_mode(PwmMode::ThreeInputs)?;
        self.set_csa_gain(CsaGain::X20)?;
        self.set_dead_time(DeadTime::Ns100)
    }

    pub fn read_faults(&mut self) -> Result<Faults, ErrorFor<SPI, CS, EN>> {
        let status1 = self.read_register(reg::FAULT_STATUS_1)?;
        let status2 = self.read_register(reg::FAULT_STATUS_2)?;
        let faults = Faults::from_registers(status1, status2);
        if faults.any() {
            log::warn!("drv8323: faults {:#05x} {:#05x}", status1, status2);
        }
        Ok(faults)
    }

    /// Clear latched faults. The device resets the bit itself.
    pub fn clear_faults(&mut self) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.modify_register(reg::DRIVER_CONTROL, |v| v | reg::driver_control::CLR_FLT)
    }

    pub fn set_pwm_mode(&mut self, mode: PwmMode) -> Result<(), ErrorFor<SPI, CS, EN>> {
        use self::reg::driver_control::*;
        self.write_field(reg::DRIVER_CONTROL, PWM_MODE_MASK, PWM_MODE_SHIFT, mode as u16)
    }

    /// Turn every MOSFET off so the motor coasts.
    pub fn coast(&mut self, enable: bool) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.set_control_flag(reg::driver_control::COAST, enable)
    }

    /// Turn every low-side MOSFET on.
    pub fn brake(&mut self, enable: bool) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.set_control_flag(reg::driver_control::BRAKE, enable)
    }

    fn set_control_flag(&mut self, flag: u16, enable: bool) -> Result<(), ErrorFor<SPI, CS, EN>> {
        self.modify_register(reg::DRIVER_CONTROL, |v| if enable { v | flag } else { v & !flag })
    }

    /// Lock every register but this one against writes.
    pub fn lock(&mut self) -> Result<(), ErrorFor<SPI, CS, EN>> {
        use self::reg::gate_drive_hs::*;
        self.write_field(reg::GATE_DRIVE_HS, LOCK_MASK, LOCK_SHIFT, LOCK)
    }

    pub fn unlock(&mut self) -> Result<(), ErrorFor<SPI, CS, EN>> {
        use self::reg::gate_drive_hs::*;
        self.write_field(reg::GATE_DRIVE_HS, LOCK_MASK, LOCK_SHIFT, UNLOCK)
    }

    pub fn set_csa_gain(&mut self, gain: CsaGain) -> Result<(), ErrorFor<SPI, CS, EN>> {
        use self::reg::csa_control::*;
        self.write_field(reg::CSA_CONTROL, GAIN_MASK, GAIN_SHIFT, gain as u16)
    }

    pub fn set_dead_time(&mut self, dead_time: DeadTime) -> Result<(), ErrorFor<SPI, CS, EN>> {
        use self::reg::ocp_control::*;
        self.write_field(reg::OCP_CONTROL, DEAD_TIME_MASK, DEAD_TIME_SHIFT, dead_time as u16)
    }

    pub fn set_ocp_mode(&mut self, mode: OcpMode) -> Result<(), ErrorFor<SPI, CS, EN>> {
        use self::reg::ocp_control::*;
        self.write_field(reg::OCP_CONTROL, OCP_MODE_MASK, OCP_MODE_SHIFT, mode as u16)
    }
}
