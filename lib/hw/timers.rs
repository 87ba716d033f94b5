use stm32g0xx_hal::hal::timer::CountDown;
use stm32g0xx_hal::hal::PwmPin as PwmPinTrait;
use stm32g0xx_hal::rcc::Rcc;
use stm32g0xx_hal::stm32g0::stm32g070::{TIM1, TIM6, TIM7};
use stm32g0xx_hal::time::Hertz;
use stm32g0xx_hal::timer::pins::TimerPin;
use stm32g0xx_hal::timer::pwm::{Pwm, PwmExt, PwmPin};
use stm32g0xx_hal::timer::{Channel4, Timer, TimerExt};

/// Paces the display task.
pub struct FrameTimer {
    timer: Timer<TIM6>,
    freq: Hertz,
}

impl FrameTimer {
    pub fn new(pac_tim: TIM6, freq: Hertz, rcc: &mut Rcc) -> Self {
        FrameTimer {
            timer: pac_tim.timer(rcc),
            freq,
        }
    }

    pub fn start(&mut self) {
        self.timer.clear_irq();
        self.timer.listen();
        self.timer.start(self.freq);
    }

    pub fn unpend(&mut self) {
        self.timer.clear_irq();
    }
}

/// Paces the status LED.
pub struct BlinkTimer {
    timer: Timer<TIM7>,
    freq: Hertz,
}

impl BlinkTimer {
    pub fn new(pac_tim: TIM7, freq: Hertz, rcc: &mut Rcc) -> Self {
        BlinkTimer {
            timer: pac_tim.timer(rcc),
            freq,
        }
    }

    pub fn start(&mut self) {
        self.timer.clear_irq();
        self.timer.listen();
        self.timer.start(self.freq);
    }

    pub fn unpend(&mut self) {
        self.timer.clear_irq();
    }
}

struct UnusedPin;

impl TimerPin<TIM1> for UnusedPin {
    type Channel = Channel4;

    fn setup(&self) {
        // Do nothing
    }

    fn release(self) -> Self {
        self
    }
}

/// Drives the ADC external trigger, one sequence per period.
pub struct SampleTimer {
    _timer: Pwm<TIM1>,
    trig: PwmPin<TIM1, Channel4>,
}

impl SampleTimer {
    pub fn new(pac_timer: TIM1, freq: Hertz, rcc: &mut Rcc) -> Self {
        let timer = pac_timer.pwm(freq, rcc);
        let trig = timer.bind_pin(UnusedPin);
        SampleTimer {
            _timer: timer,
            trig,
        }
    }

    pub fn start(&mut self) {
        self.trig.set_duty(self.trig.get_max_duty() / 2);
        self.trig.enable();
    }

    pub fn stop(&mut self) {
        self.trig.disable();
    }
}
