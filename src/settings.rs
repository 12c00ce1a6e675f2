use miniconf::Tree;
use serde::{Deserialize, Serialize};

use arbitrary_int::u28;
use embedded_hal::spi::SpiDevice;

use crate::{Ad9833, Error, Select, Waveform};

/// Generator output configuration.
#[derive(Clone, Debug, PartialEq, Tree, Serialize, Deserialize)]
pub struct Settings {
    /// The output waveform. See [Waveform] variants.
    #[tree(with=miniconf::leaf)]
    pub waveform: Waveform,

    /// The output frequency in Hertz.
    pub frequency: f64,

    /// The phase offset in turns.
    pub phase: f32,

    /// Output enable. When disabled, MCLK is stopped and the DAC powered down.
    pub enable: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            frequency: 1.0e3,
            phase: 0.0,
            enable: true,
        }
    }
}

impl<B: SpiDevice<u8>> Ad9833<B> {
    /// Program waveform, FREQ0, PHASE0 and output enable.
    ///
    /// Returns the frequency tuning word written.
    pub fn apply(&mut self, settings: &Settings) -> Result<u28, Error> {
        self.set_waveform(settings.waveform)?;
        let ftw = self.set_frequency(settings.frequency)?;
        self.set_phase(Select::Zero, settings.phase)?;
        if settings.enable {
            self.enable_output()?;
        } else {
            self.disable_output()?;
        }
        log::debug!("Applied {:?}: FTW {:#x}", settings, ftw.value());
        Ok(ftw)
    }
}
