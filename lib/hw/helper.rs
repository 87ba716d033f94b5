use stm32g0xx_hal::dma::C1;
use stm32g0xx_hal::gpio::gpioa::{PA6, PA7};
use stm32g0xx_hal::gpio::gpiob::{PB8, PB9};
use stm32g0xx_hal::gpio::gpioc::PC13;
use stm32g0xx_hal::gpio::{Analog, DefaultMode, OpenDrain, Output, PushPull};
use stm32g0xx_hal::i2c::{Config as I2cConfig, I2c, I2cExt};
use stm32g0xx_hal::rcc::{Config, PllConfig, Rcc, RccExt};
use stm32g0xx_hal::stm32g0::stm32g070::{I2C1, RCC};
use stm32g0xx_hal::time::RateExtU32;

use crate::config::BusConfig;
use crate::hw::adc::Adc as HwAdc;
use crate::hw::oled::Oled;

pub fn init_clock(pac_rcc: RCC) -> Rcc {
    // ((16 MHz / 4) * 32) / 2 = 64 MHz
    let pll_config = PllConfig::with_hsi(4, 32, 2);
    pac_rcc.freeze(Config::pll().pll_cfg(pll_config))
}

// PA6 - channel A input (IN6)
pub type InputA = PA6<Analog>;
// PA7 - channel B input (IN7)
pub type InputB = PA7<Analog>;
// PB8 - OLED_SCL
type OledScl = PB8<Output<OpenDrain>>;
// PB9 - OLED_SDA
type OledSda = PB9<Output<OpenDrain>>;
// ADC DMA channel
type DmaChannel = C1;

// PC13 - status LED
pub type StatusLed = PC13<Output<PushPull>>;

pub type Inputs = (InputA, InputB);
pub type Adc = HwAdc<Inputs, DmaChannel>;
pub type OledBus = I2c<I2C1, OledSda, OledScl>;
pub type HwOled = Oled<OledBus>;

pub fn init_oled(
    pac_i2c: I2C1,
    sda: PB9<DefaultMode>,
    scl: PB8<DefaultMode>,
    bus: BusConfig,
    rcc: &mut Rcc,
) -> HwOled {
    let i2c = pac_i2c.i2c(
        sda.into_open_drain_output(),
        scl.into_open_drain_output(),
        I2cConfig::new(bus.clock_hz.Hz()),
        rcc,
    );
    Oled::new(i2c, bus)
}
