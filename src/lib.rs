//! AD9833 programmable waveform generator SPI driver
//!
//! The AD9833 is a 25 MHz DDS with a 28 bit phase accumulator and a 10 bit
//! DAC that can output sine, triangle, or square waves. All registers are
//! write-only and are programmed with 16 bit words, MSB first, in SPI mode 2.
//!
//! The driver keeps a shadow of the control register. Every modification is
//! written to the device immediately and the shadow is only updated once the
//! write succeeded.
#![no_std]

use arbitrary_int::{u12, u14, u28, Number};
use bitbybit::{bitenum, bitfield};
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus, SpiDevice};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use num_traits::float::FloatCore;
use serde::{Deserialize, Serialize};

mod settings;
pub use settings::Settings;

/// Default master clock frequency in Hertz.
pub const MCLK: f64 = 25e6;

/// SPI mode required by the device (CPOL = 1, CPHA = 0).
pub const MODE: spi::Mode = spi::MODE_2;

/// SPI clock frequency in Hertz the driver has been characterized with.
/// The device supports up to 40 MHz.
pub const SCK_FREQUENCY: u32 = 2_000_000;

/// Register address tag in the two MSBs of every word.
#[bitenum(u2, exhaustive = true)]
#[derive(PartialEq, Debug)]
pub enum Addr {
    Control = 0,
    Freq0 = 1,
    Freq1 = 2,
    Phase = 3,
}

/// Frequency/phase register bank selection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Select {
    #[default]
    Zero,
    One,
}

impl From<Select> for bool {
    fn from(value: Select) -> Self {
        value == Select::One
    }
}

#[bitfield(u16, default = 0x0000)]
#[derive(Debug, PartialEq)]
pub struct Control {
    /// Sleep: DAC powered down
    #[bit(6, rw)]
    pub sleep12: bool,
    /// Sleep: internal MCLK disabled
    #[bit(7, rw)]
    pub sleep1: bool,
    /// Triangle instead of sine from the DAC (when `opbiten` is clear)
    #[bit(1, rw)]
    pub mode: bool,
    /// With `opbiten`: full frequency MSB, otherwise MSB/2
    #[bit(3, rw)]
    pub div2: bool,
    /// DAC MSB (square wave) on VOUT
    #[bit(5, rw)]
    pub opbiten: bool,
    #[bit(8, rw)]
    pub reset: bool,
    #[bit(10, rw)]
    pub pselect: bool,
    #[bit(11, rw)]
    pub fselect: bool,
    /// MSB (true) or LSB half of a frequency register when `b28` is clear
    #[bit(12, rw)]
    pub hlb: bool,
    /// Two consecutive frequency writes load all 28 bits
    #[bit(13, rw)]
    pub b28: bool,
    #[bits(14..=15, r)]
    pub addr: Addr,
}

/// Tagged 14 bit half of a frequency register.
#[bitfield(u16, default = 0x0000)]
#[derive(Debug, PartialEq)]
pub struct FrequencyWord {
    #[bits(0..=13, rw)]
    pub data: u14,
    #[bits(14..=15, rw)]
    pub addr: Addr,
}

/// PHASE0/PHASE1 register write.
#[bitfield(u16, default = 0xc000)]
#[derive(Debug, PartialEq)]
pub struct PhaseWord {
    #[bits(0..=11, rw)]
    pub data: u12,
    #[bit(13, rw)]
    pub phase1: bool,
    #[bits(14..=15, r)]
    pub addr: Addr,
}

/// Output waveform.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    /// DAC MSB at the programmed frequency
    Square,
    /// DAC MSB divided by two
    HalfSquare,
}

impl Waveform {
    /// Apply the waveform bits to a control word. Other bits are kept.
    pub fn apply(&self, control: Control) -> Control {
        match self {
            Self::Sine => control.with_opbiten(false).with_mode(false),
            Self::Triangle => control.with_opbiten(false).with_mode(true),
            Self::Square => control
                .with_opbiten(true)
                .with_mode(false)
                .with_div2(true),
            Self::HalfSquare => control
                .with_opbiten(true)
                .with_mode(false)
                .with_div2(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("SPI: {0}")]
    Bus(spi::ErrorKind),
    #[error("Chip select: {0}")]
    Pin(digital::ErrorKind),
}

impl<E: spi::Error> From<E> for Error {
    fn from(value: E) -> Self {
        Self::Bus(value.kind())
    }
}

/// Frequency tuning word for a frequency in Hertz.
///
/// `round(frequency * 2**28 / mclk)`, aliased into the 28 bit register.
/// Out of range frequencies are not rejected.
pub fn frequency_to_ftw(frequency: f64, mclk: f64) -> u28 {
    let lsb = mclk.recip() * (1u32 << 28) as f64;
    // Alias into Nyquist
    u28::new(((frequency * lsb).round() as i64 as u32) & u28::MASK)
}

/// Output frequency in Hertz for a frequency tuning word.
pub fn ftw_to_frequency(ftw: u28, mclk: f64) -> f64 {
    ftw.value() as f64 * mclk / (1u32 << 28) as f64
}

/// Phase offset word for a phase in turns.
pub fn phase_to_pow(phase: f32) -> u12 {
    // Wrap into one turn
    u12::new(((phase * (1u32 << 12) as f32).round() as i32 as u16) & u12::MASK)
}

#[derive(Clone, Debug)]
pub struct Ad9833<B> {
    bus: B,
    control: Control,
    mclk: f64,
}

impl<B: SpiBus<u8>, P: OutputPin> Ad9833<ExclusiveDevice<B, P, NoDelay>> {
    /// Construct from a bus and an exclusive chip select pin.
    ///
    /// This drives chip select high (idle).
    pub fn with_cs(bus: B, cs: P) -> Result<Self, Error> {
        use digital::Error as _;
        let dev = ExclusiveDevice::new(bus, cs, NoDelay)
            .map_err(|e| Error::Pin(e.kind()))?;
        Ok(Self::new(dev))
    }
}

impl<B: SpiDevice<u8>> Ad9833<B> {
    /// Construct a driver with the default 25 MHz master clock.
    ///
    /// Does not access the device. Call [Ad9833::init] before use.
    pub fn new(bus: B) -> Self {
        Self::with_mclk(bus, MCLK)
    }

    pub fn with_mclk(bus: B, mclk: f64) -> Self {
        Self {
            bus,
            control: Control::default(),
            mclk,
        }
    }

    pub fn mclk(&self) -> f64 {
        self.mclk
    }

    fn write(&mut self, word: u16) -> Result<(), Error> {
        Ok(self.bus.write(&word.to_be_bytes())?)
    }

    /// The last control word written.
    pub fn control(&self) -> Control {
        self.control
    }

    pub fn set_control(&mut self, control: Control) -> Result<(), Error> {
        self.write(control.raw_value())?;
        self.control = control;
        Ok(())
    }

    /// Initialize the device and start a 1 kHz sine wave.
    pub fn init(&mut self) -> Result<(), Error> {
        self.set_control(Control::default().with_b28(true))?;
        self.reset()?;
        self.set_frequency(1e3)?;
        self.set_waveform(Waveform::Sine)?;
        log::info!("AD9833 initialized");
        Ok(())
    }

    /// Pulse the RESET bit.
    pub fn reset(&mut self) -> Result<(), Error> {
        let control = self.control;
        self.set_control(control.with_reset(true))?;
        self.set_control(control.with_reset(false))
    }

    /// Write a frequency tuning word to a frequency register.
    ///
    /// The control word is written first with `b28` set so that the two
    /// following 14 bit halves load the full register.
    pub fn set_ftw(&mut self, reg: Select, ftw: u28) -> Result<(), Error> {
        let addr = match reg {
            Select::Zero => Addr::Freq0,
            Select::One => Addr::Freq1,
        };
        self.set_control(self.control.with_b28(true))?;
        let word = FrequencyWord::default().with_addr(addr);
        self.write(
            word.with_data(u14::new(ftw.value() as u16 & u14::MASK))
                .raw_value(),
        )?;
        self.write(
            word.with_data(u14::new((ftw.value() >> 14) as u16))
                .raw_value(),
        )
    }

    /// Set the FREQ0 output frequency in Hertz.
    ///
    /// Returns the frequency tuning word written.
    pub fn set_frequency(&mut self, frequency: f64) -> Result<u28, Error> {
        if !(0.0..=self.mclk / 2.0).contains(&frequency) {
            log::warn!(
                "Frequency {} Hz outside [0, {}] Hz aliases",
                frequency,
                self.mclk / 2.0
            );
        }
        let ftw = frequency_to_ftw(frequency, self.mclk);
        self.set_ftw(Select::Zero, ftw)?;
        Ok(ftw)
    }

    pub fn set_pow(&mut self, reg: Select, pow: u12) -> Result<(), Error> {
        self.write(
            PhaseWord::default()
                .with_phase1(reg.into())
                .with_data(pow)
                .raw_value(),
        )
    }

    /// Set a phase offset register in turns.
    pub fn set_phase(&mut self, reg: Select, phase: f32) -> Result<u12, Error> {
        let pow = phase_to_pow(phase);
        self.set_pow(reg, pow)?;
        Ok(pow)
    }

    /// Select the frequency and phase registers driving the output.
    pub fn select(&mut self, freq: Select, phase: Select) -> Result<(), Error> {
        self.set_control(
            self.control
                .with_fselect(freq.into())
                .with_pselect(phase.into()),
        )
    }

    pub fn set_waveform(&mut self, waveform: Waveform) -> Result<(), Error> {
        self.set_control(waveform.apply(self.control))
    }

    /// Set waveform and then FREQ0 frequency.
    ///
    /// These are two separate writes and the device may briefly output the
    /// new waveform at the old frequency.
    pub fn set_waveform_frequency(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<u28, Error> {
        self.set_waveform(waveform)?;
        self.set_frequency(frequency)
    }

    /// Clear both sleep bits.
    pub fn enable_output(&mut self) -> Result<(), Error> {
        self.set_control(self.control.with_sleep1(false).with_sleep12(false))
    }

    /// Stop MCLK and power down the DAC.
    ///
    /// Frequency and phase registers are retained.
    pub fn disable_output(&mut self) -> Result<(), Error> {
        self.set_control(self.control.with_sleep1(true).with_sleep12(true))
    }
}
