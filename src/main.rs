#![no_main]
#![no_std]

use lib as _;

#[rtic::app(device = stm32g0xx_hal::stm32, peripherals = true)]
mod app {
    use lib::config::{
        BLINK_INTERVAL_MS, DISPLAY_BUS, LINEAR_BUFFER_LEN, LINEAR_DEPTH, LINEAR_SETTLE_MS,
        REFRESH_INTERVAL_MS, SAMPLE_RATE_HZ, SETTLE_MS, STREAM_BUFFER_LEN, STREAM_DEPTH,
    };
    use lib::display::{Display, DisplayConfig};
    use lib::engine::Engine;
    use lib::hw::{
        init_clock, init_oled, Adc, AdcConfig, BlinkTimer, FrameTimer, HwOled, StatusLed,
    };
    use lib::sampler::{LINEAR_GROUP, READINGS, STREAM_GROUP};
    use lib::{LinearBuffer, StreamBuffer};
    use stm32g0xx_hal::delay::DelayExt;
    use stm32g0xx_hal::dma::DmaExt;
    use stm32g0xx_hal::dmamux::DmaMuxIndex;
    use stm32g0xx_hal::gpio::GpioExt;
    use stm32g0xx_hal::hal::blocking::delay::DelayMs;
    use stm32g0xx_hal::hal::digital::v2::ToggleableOutputPin;
    use stm32g0xx_hal::time::RateExtU32;

    // 64 MHz core clock
    const CYCLES_PER_MS: u32 = 64_000;

    #[shared]
    struct Shared {
        // `None` when the converter did not come up
        engine: Option<Engine<'static, Adc>>,
    }

    #[local]
    struct Local {
        // `None` when the panel did not come up
        display: Option<Display<'static, HwOled>>,
        frame_timer: FrameTimer,
        blink_timer: BlinkTimer,
        led: StatusLed,
        linear: Option<&'static mut LinearBuffer>,
        stream: Option<&'static mut StreamBuffer>,
    }

    #[init(local = [
        linear: LinearBuffer = [0; LINEAR_BUFFER_LEN],
        stream: StreamBuffer = [0; STREAM_BUFFER_LEN],
    ])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let device = cx.device;

        // Clock
        let mut rcc = init_clock(device.RCC);
        let mut delay = cx.core.SYST.delay(&mut rcc);

        // GPIO
        let gpioa = device.GPIOA.split(&mut rcc);
        let gpiob = device.GPIOB.split(&mut rcc);
        let gpioc = device.GPIOC.split(&mut rcc);
        let led = gpioc.pc13.into_push_pull_output();
        let inputs = (gpioa.pa6.into_analog(), gpioa.pa7.into_analog());
        delay.delay_ms(SETTLE_MS);

        // OLED
        let oled = init_oled(device.I2C1, gpiob.pb9, gpiob.pb8, DISPLAY_BUS, &mut rcc);
        let display = match Display::new(oled, &READINGS, DisplayConfig::default()) {
            Ok(display) => Some(display),
            Err(error) => {
                defmt::error!("display init failed: {}", error);
                None
            }
        };
        let mut frame_timer = FrameTimer::new(
            device.TIM6,
            (1_000 / REFRESH_INTERVAL_MS).Hz(),
            &mut rcc,
        );

        // ADC
        let dma = device.DMA.split(&mut rcc, device.DMAMUX);
        let mut ch1 = dma.ch1;
        ch1.mux().select_peripheral(DmaMuxIndex::ADC);
        let engine = match Adc::new(
            device.ADC,
            device.TIM1,
            AdcConfig::new(inputs, ch1, SAMPLE_RATE_HZ.Hz()),
            &mut rcc,
            &mut delay,
        ) {
            Ok(adc) => Some(Engine::new(adc)),
            Err(error) => {
                defmt::error!("adc init failed: {}", error);
                None
            }
        };

        // Status LED
        let mut blink_timer = BlinkTimer::new(
            device.TIM7,
            (1_000 / BLINK_INTERVAL_MS).Hz(),
            &mut rcc,
        );

        frame_timer.start();
        blink_timer.start();
        defmt::info!("init done");

        (
            Shared { engine },
            Local {
                display,
                frame_timer,
                blink_timer,
                led,
                linear: Some(cx.local.linear),
                stream: Some(cx.local.stream),
            },
            init::Monotonics(),
        )
    }

    #[idle(shared = [engine], local = [linear, stream])]
    fn idle(mut cx: idle::Context) -> ! {
        if let Some(linear) = cx.local.linear.take() {
            let started = cx.shared.engine.lock(|engine| {
                engine
                    .as_mut()
                    .map(|engine| engine.start(&LINEAR_GROUP, linear, LINEAR_DEPTH))
            });
            if let Some(Err(refused)) = started {
                defmt::warn!("linear run refused: {}", refused.reason);
            }
        }
        cortex_m::asm::delay(LINEAR_SETTLE_MS * CYCLES_PER_MS);
        let linear = cx
            .shared
            .engine
            .lock(|engine| engine.as_mut().and_then(|engine| engine.stop()));
        if let Some(linear) = linear {
            defmt::info!("linear samples: {}", linear);
        }

        if let Some(stream) = cx.local.stream.take() {
            let started = cx.shared.engine.lock(|engine| {
                engine
                    .as_mut()
                    .map(|engine| engine.start_continuous(&STREAM_GROUP, stream, STREAM_DEPTH))
            });
            match started {
                Some(Ok(())) => defmt::info!("streaming"),
                Some(Err(refused)) => defmt::error!("stream refused: {}", refused.reason),
                None => defmt::warn!("no converter, display only"),
            }
        }

        loop {
            cortex_m::asm::nop();
        }
    }

    // A run that cannot be reset stays faulted, the display keeps the last
    // readings.
    fn recover(engine: &mut Engine<'static, Adc>) {
        defmt::warn!("acquisition halted, resetting");
        if engine.reset().is_err() {
            defmt::error!("acquisition lost after {} fatal faults", engine.fatal_streak());
        }
    }

    #[task(binds = DMA_CHANNEL1, priority = 3, shared = [engine])]
    fn dma(mut cx: dma::Context) {
        cx.shared.engine.lock(|engine| {
            if let Some(engine) = engine.as_mut() {
                if engine.service().is_err() {
                    recover(engine);
                }
            }
        });
    }

    #[task(binds = TIM7, priority = 2, shared = [engine], local = [blink_timer, led])]
    fn tim7(mut cx: tim7::Context) {
        cx.local.blink_timer.unpend();
        let _ = cx.local.led.toggle();
        lib::advance_uptime(BLINK_INTERVAL_MS);
        cx.shared.engine.lock(|engine| {
            if let Some(engine) = engine.as_mut() {
                if engine.check_stall(BLINK_INTERVAL_MS).is_err() {
                    recover(engine);
                }
            }
        });
    }

    #[task(binds = TIM6, priority = 1, local = [display, frame_timer])]
    fn tim6(cx: tim6::Context) {
        cx.local.frame_timer.unpend();
        if let Some(display) = cx.local.display.as_mut() {
            display.refresh();
        }
    }
}
