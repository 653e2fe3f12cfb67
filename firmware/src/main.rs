#![no_std]
#![no_main]

use dampf::buttons::{self, ButtonResources};
use dampf::control::{self, ControlResources};
use dampf::display::{self, DisplayResources};
use dampf::eeprom;
use defmt::unwrap;
use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::time::{khz, Hertz};
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::{bind_interrupts, i2c, peripherals, spi, Config};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        config.rcc.hsi = true;
        config.rcc.hse = None;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL48,
            divp: Some(PllPDiv::DIV30), // 6.4 MHz ADC sampling clock
            divq: None,
            divr: Some(PllRDiv::DIV2), // 96 MHz system clock
        });
        config.rcc.mux.adc12sel = mux::Adcsel::PLL1_P;
        config.rcc.sys = Sysclk::PLL1_R;
    }
    let p = embassy_stm32::init(config);

    // Launch EEPROM settings storage
    {
        let i2c = i2c::I2c::new(
            p.I2C1,
            p.PA15,
            p.PB7,
            Irqs,
            p.DMA1_CH5,
            p.DMA1_CH3,
            Hertz(100_000),
            Default::default(),
        );
        let eeprom = eeprom24x::Eeprom24x::new_24x64(i2c, eeprom24x::SlaveAddr::Default);

        unwrap!(spawner.spawn(eeprom::eeprom_task(eeprom)));
    }

    // Launch the display scanner
    {
        let display_resources = {
            let spi_config = spi::Config::default();
            DisplayResources {
                spi: spi::Spi::new_txonly(p.SPI2, p.PB13, p.PB15, p.DMA2_CH1, spi_config),
                pin_latch: Output::new(p.PB12, Level::Low, Speed::High),
            }
        };
        unwrap!(spawner.spawn(display::display_task(display_resources)));
    }

    // Launch the pad button driver
    {
        let button_resources = ButtonResources {
            pin_up: Input::new(p.PB1, Pull::Up),
            pin_down: Input::new(p.PB2, Pull::Up),
            pin_mode: Input::new(p.PB10, Pull::Up),
        };

        unwrap!(spawner.spawn(buttons::button_task(button_resources)));
    }

    // Launch the control loop
    {
        let pwm_pin = PwmPin::new_ch1(p.PA8, OutputType::PushPull);

        let control_resources = ControlResources {
            adc: Adc::new(p.ADC1),
            pwm_fire: SimplePwm::new(
                p.TIM1,
                Some(pwm_pin),
                None,
                None,
                None,
                khz(20),
                Default::default(),
            ),
            pin_fire: ExtiInput::new(p.PB0, p.EXTI0, Pull::Up),
            pin_display_power: Output::new(p.PA9, Level::Low, Speed::Low),
        };
        unwrap!(spawner.spawn(control::control_task(control_resources)));
    }
}
