use cortex_m::peripheral::SYST;
use stm32g0xx_hal::dma::{Channel as DmaChannel, Direction, Event as DmaEvent, Priority, WordSize};
use stm32g0xx_hal::hal::blocking::delay::DelayUs;
use stm32g0xx_hal::rcc::Rcc;
use stm32g0xx_hal::stm32g0::stm32g070::{ADC, RCC, TIM1};
use stm32g0xx_hal::time::Hertz;
use stm32g0xx_hal::timer::delay::Delay;

use crate::error::ConversionError;
use crate::group::ConversionGroup;
use crate::hw::timers::SampleTimer;
use crate::hw::{AdcPort, Event, Flags, Transfer};
use crate::Sample;

// Polls of a status bit before giving up
const SPIN_LIMIT: u32 = 100_000;
// 20 us at 64 MHz
const VREG_STARTUP_CYCLES: u32 = 1_280;
// Sequencer slot value that ends the sequence
const END_OF_SEQUENCE: u32 = 0xf;

pub struct AdcConfig<I, C> {
    inputs: I,
    dma_channel: C,
    frequency: Hertz,
}

impl<I, C> AdcConfig<I, C>
where
    C: DmaChannel,
{
    /// `inputs` are the analog pins, `frequency` paces streaming sequences.
    pub fn new(inputs: I, dma_channel: C, frequency: Hertz) -> Self {
        AdcConfig {
            inputs,
            dma_channel,
            frequency,
        }
    }
}

pub struct Adc<I, C> {
    adc: InnerAdc,
    dma: Dma<C>,
    trig: SampleTimer,
    circular: bool,
    _inputs: I,
}

impl<I, C> Adc<I, C>
where
    C: DmaChannel,
{
    pub fn new(
        pac_adc: ADC,
        pac_timer: TIM1,
        config: AdcConfig<I, C>,
        rcc: &mut Rcc,
        delay: &mut Delay<SYST>,
    ) -> Result<Self, ConversionError> {
        let adc = InnerAdc::new(pac_adc, rcc, delay)?;
        let dma = Dma::new(config.dma_channel, InnerAdc::get_dma_address());
        let trig = SampleTimer::new(pac_timer, config.frequency, rcc);
        Ok(Adc {
            adc,
            dma,
            trig,
            circular: false,
            _inputs: config.inputs,
        })
    }
}

impl<I, C> AdcPort for Adc<I, C>
where
    C: DmaChannel,
{
    fn arm(
        &mut self,
        group: &ConversionGroup<'_>,
        buffer: &mut [Sample],
        transfer: Transfer,
    ) -> Result<(), ConversionError> {
        self.adc.configure(group, transfer.circular)?;
        self.circular = transfer.circular;
        self.dma
            .start(buffer.as_mut_ptr() as u32, buffer.len() as u16, transfer);
        self.adc.start();
        if transfer.circular {
            self.trig.start();
        }
        Ok(())
    }

    fn poll(&mut self, _buffer: &mut [Sample]) -> Option<Event> {
        let flags = Flags {
            transfer_error: self.dma.pending(DmaEvent::TransferError),
            overrun: self.adc.overrun(),
            half_transfer: self.dma.pending(DmaEvent::HalfTransfer),
            transfer_complete: self.dma.pending(DmaEvent::TransferComplete),
        };
        let event = flags.next_event(self.circular)?;
        match event {
            Event::Fault(ConversionError::DmaTransfer) => {
                self.dma.clear(DmaEvent::TransferError);
            }
            // cleared by `recover`
            Event::Fault(_) => {}
            Event::HalfTransfer => self.dma.clear(DmaEvent::HalfTransfer),
            Event::TransferComplete => {
                self.dma.clear(DmaEvent::TransferComplete);
                if !self.circular {
                    self.adc.clear_overrun();
                }
            }
        }
        Some(event)
    }

    fn halt(&mut self) {
        self.trig.stop();
        self.adc.stop();
        self.dma.stop();
    }

    fn recover(&mut self, error: ConversionError) -> Result<(), ConversionError> {
        match error {
            // Overwrite mode keeps the DMA going, only the flag needs clearing
            ConversionError::Overrun => {
                self.adc.clear_overrun();
                Ok(())
            }
            // Stalled sequence, restart conversions and the trigger
            ConversionError::Timeout => {
                self.adc.stop();
                self.adc.start();
                if self.circular {
                    self.trig.stop();
                    self.trig.start();
                }
                Ok(())
            }
            ConversionError::DmaTransfer => Err(error),
        }
    }

    fn reset(&mut self) -> Result<(), ConversionError> {
        self.halt();
        self.adc.reinit()
    }
}

struct Dma<C> {
    channel: C,
    peripheral_addr: u32,
}

impl<C> Dma<C>
where
    C: DmaChannel,
{
    pub fn new(channel: C, peripheral_addr: u32) -> Self {
        Dma {
            channel,
            peripheral_addr,
        }
    }

    pub fn start(&mut self, memory_addr: u32, len: u16, transfer: Transfer) {
        self.channel.disable();
        self.configure(memory_addr, len, transfer.circular);
        self.channel.clear_event(DmaEvent::Any);
        self.channel.listen(DmaEvent::TransferComplete);
        self.channel.listen(DmaEvent::TransferError);
        if transfer.half_transfer {
            self.channel.listen(DmaEvent::HalfTransfer);
        } else {
            self.channel.unlisten(DmaEvent::HalfTransfer);
        }
        self.channel.enable();
    }

    pub fn stop(&mut self) {
        self.channel.disable();
        self.channel.unlisten(DmaEvent::HalfTransfer);
        self.channel.unlisten(DmaEvent::TransferComplete);
        self.channel.unlisten(DmaEvent::TransferError);
        self.channel.clear_event(DmaEvent::Any);
    }

    pub fn pending(&self, event: DmaEvent) -> bool {
        self.channel.event_occurred(event)
    }

    pub fn clear(&mut self, event: DmaEvent) {
        self.channel.clear_event(event);
    }

    fn configure(&mut self, memory_addr: u32, len: u16, circular: bool) {
        self.channel.set_priority_level(Priority::VeryHigh);
        self.channel.set_word_size(WordSize::BITS16);
        self.channel.set_direction(Direction::FromPeripheral);
        self.channel
            .set_peripheral_address(self.peripheral_addr, false);
        self.channel.set_memory_address(memory_addr, true);
        self.channel.set_transfer_length(len);
        self.channel.set_circular_mode(circular);
    }
}

struct InnerAdc {
    adc: ADC,
}

impl InnerAdc {
    pub fn new<D: DelayUs<u8>>(
        pac_adc: ADC,
        _: &mut Rcc,
        delay: &mut D,
    ) -> Result<Self, ConversionError> {
        InnerAdc::enable_clock_and_reset();
        let mut adc = InnerAdc { adc: pac_adc };
        adc.disable()?;
        adc.enable_vreg();
        // Max starting time declared by stm32g070 datasheet is 20 us
        delay.delay_us(20);
        adc.calibrate()?;
        adc.enable()?;
        Ok(adc)
    }

    pub fn reinit(&mut self) -> Result<(), ConversionError> {
        InnerAdc::enable_clock_and_reset();
        self.disable()?;
        self.enable_vreg();
        cortex_m::asm::delay(VREG_STARTUP_CYCLES);
        self.calibrate()?;
        self.enable()
    }

    pub fn start(&mut self) {
        self.adc.isr.write(|w| {
            w.eoc().set_bit();
            w.eos().set_bit();
            w.ovr().set_bit()
        });
        self.adc.cr.modify(|_, w| w.adstart().set_bit());
    }

    pub fn stop(&mut self) {
        if self.adc.cr.read().adstart().bit_is_clear() {
            return;
        }
        self.adc.cr.modify(|_, w| w.adstp().set_bit());
        let _ = self.wait(|adc| adc.cr.read().adstp().bit_is_clear());
    }

    pub fn overrun(&self) -> bool {
        self.adc.isr.read().ovr().bit_is_set()
    }

    pub fn clear_overrun(&mut self) {
        self.adc.isr.write(|w| w.ovr().set_bit());
    }

    pub fn get_dma_address() -> u32 {
        unsafe { &(*ADC::ptr()).dr as *const _ as u32 }
    }

    fn configure(
        &mut self,
        group: &ConversionGroup<'_>,
        circular: bool,
    ) -> Result<(), ConversionError> {
        self.adc.cfgr1.write(|w| unsafe {
            // Streaming waits for the sample timer rising edge,
            // one-shot starts by software
            w.exten().bits(if circular { 0b01 } else { 0b00 });
            // External trigger 1
            w.extsel().bits(0b001);
            // Right alignment
            w.align().clear_bit();
            // 12-bit resolution
            w.res().bits(0b00);
            // One-shot converts back to back until the DMA is full
            w.cont().bit(!circular);
            // Keep the newest data on overrun
            w.ovrmod().set_bit();
            // Fully configurable sequence
            w.chselrmod().set_bit();
            w.dmacfg().bit(circular);
            // Enable DMA requests
            w.dmaen().set_bit()
        });
        // Vref and temperature sensor are sequenced like inputs
        self.adc.ccr.write(|w| {
            w.vrefen().set_bit();
            w.tsen().set_bit()
        });
        self.adc
            .smpr
            .write(|w| unsafe { w.bits(InnerAdc::smpr_bits(group)) });
        self.adc.isr.write(|w| w.ccrdy().set_bit());
        self.adc
            .chselr()
            .write(|w| unsafe { w.bits(InnerAdc::sequence_bits(group)) });
        self.wait(|adc| adc.isr.read().ccrdy().bit_is_set())?;
        self.adc.isr.write(|w| w.ccrdy().set_bit());
        Ok(())
    }

    // SMP1 holds the primary time, SMP2 the secondary one picked via SMPSELx
    fn smpr_bits(group: &ConversionGroup<'_>) -> u32 {
        let classes = match group.sample_classes() {
            Ok(classes) => classes,
            Err(_) => return 0,
        };
        let mut bits = classes.primary.bits();
        if let Some(secondary) = classes.secondary {
            bits |= secondary.bits() << 4;
        }
        for channel in group.channels {
            if classes.is_secondary(channel.sample_time) {
                bits |= 1 << (8 + u32::from(channel.id.number()));
            }
        }
        bits
    }

    // SQ1 in the low nibble, unused slots end the sequence
    fn sequence_bits(group: &ConversionGroup<'_>) -> u32 {
        let mut bits = u32::MAX;
        for (slot, channel) in group.channels.iter().enumerate().take(8) {
            let shift = slot as u32 * 4;
            bits &= !(END_OF_SEQUENCE << shift);
            bits |= u32::from(channel.id.number()) << shift;
        }
        bits
    }

    fn enable_clock_and_reset() {
        let rcc = unsafe { &(*RCC::ptr()) };
        rcc.apbenr2.modify(|_, w| w.adcen().set_bit());
        rcc.apbrstr2.modify(|_, w| w.adcrst().set_bit());
        rcc.apbrstr2.modify(|_, w| w.adcrst().clear_bit());
    }

    fn enable_vreg(&mut self) {
        self.adc.cr.modify(|_, w| w.advregen().set_bit());
    }

    fn enable(&mut self) -> Result<(), ConversionError> {
        self.adc.isr.write(|w| w.adrdy().set_bit());
        self.adc.cr.modify(|_, w| w.aden().set_bit());
        self.wait(|adc| adc.isr.read().adrdy().bit_is_set())
    }

    fn disable(&mut self) -> Result<(), ConversionError> {
        let cr = self.adc.cr.read();
        if cr.aden().bit_is_clear() {
            return Ok(());
        }
        if cr.adstart().bit_is_set() {
            self.adc.cr.modify(|_, w| w.adstp().set_bit());
        }
        self.adc.cr.modify(|_, w| w.addis().set_bit());
        self.wait(|adc| adc.cr.read().aden().bit_is_clear())?;
        self.adc.isr.write(|w| w.adrdy().set_bit());
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), ConversionError> {
        self.adc.cr.modify(|_, w| w.adcal().set_bit());
        self.wait(|adc| adc.isr.read().eocal().bit_is_set())?;
        self.adc.isr.write(|w| w.eocal().set_bit());
        Ok(())
    }

    fn wait<F>(&self, done: F) -> Result<(), ConversionError>
    where
        F: Fn(&ADC) -> bool,
    {
        for _ in 0..SPIN_LIMIT {
            if done(&self.adc) {
                return Ok(());
            }
        }
        Err(ConversionError::Timeout)
    }
}
