//! The control task: adapts the portable controller to the peripherals.
//!
//! Runs the 1 kHz polling loop, reads the band-gap ADC, drives the MOSFET
//! PWM, and parks on the fire-button EXTI line while the device sleeps.

use dampf_core::controller::{Action, Controller, Inputs, MosfetDrive};
use dampf_core::display as model;
use dampf_core::lifecycle::SleepReason;
use dampf_core::PWM_MAX;
use defmt::{debug, info};
use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Output;
use embassy_stm32::peripherals;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_time::{Duration, Instant, Ticker, Timer};

use crate::{DisplayUpdate, BUTTON_EVENTS, DISPLAY_SIG, SETTINGS_LOADED_SIG, STORE_PERSISTENT_SIG};

/// Control loop poll period.
const LOOP_PERIOD_MS: u64 = 1;
/// How long the farewell slide plays before the panel powers down.
const FAREWELL_MS: u64 = 800;
/// How long the loop keeps polling after a wake edge, so the press can clear
/// the fire debounce and open the gesture window before the task parks again.
const WAKE_ATTEMPT_MS: u64 = 250;

/// Resources for the control task.
pub struct ControlResources {
    /// ADC reading the internal reference against the battery rail.
    pub adc: Adc<'static, peripherals::ADC1>,
    /// 20 kHz PWM on the MOSFET gate.
    pub pwm_fire: SimplePwm<'static, peripherals::TIM1>,
    /// Fire-button line, EXTI capable for wake.
    pub pin_fire: ExtiInput<'static>,
    /// Display power enable.
    pub pin_display_power: Output<'static>,
}

/// Runs the control loop.
#[embassy_executor::task]
pub async fn control_task(mut resources: ControlResources) {
    let (settings, last_fire_mode) = SETTINGS_LOADED_SIG.wait().await;
    info!("Settings loaded, last fire mode {}", last_fire_mode);

    let mut controller = Controller::new(settings, last_fire_mode);

    resources.adc.set_sample_time(SampleTime::CYCLES247_5);
    let mut vrefint = resources.adc.enable_vrefint();

    let mut pwm_fire_channel = resources.pwm_fire.ch1();
    pwm_fire_channel.set_duty_cycle_fully_off();
    pwm_fire_channel.enable();

    resources.pin_display_power.set_high();

    let mut ticker = Ticker::every(Duration::from_millis(LOOP_PERIOD_MS));
    let mut was_firing = false;
    let mut attempt_until = Instant::now();

    loop {
        // Parked: wait for the fire-button falling edge, then let the wake
        // gesture count through the regular steps below.
        if controller.is_sleeping()
            && !controller.puzzle_pending()
            && Instant::now() >= attempt_until
        {
            pwm_fire_channel.set_duty_cycle_fully_off();
            DISPLAY_SIG.signal(DisplayUpdate::Off);
            resources.pin_display_power.set_low();
            resources.pin_fire.wait_for_falling_edge().await;
            resources.pin_display_power.set_high();
            attempt_until = Instant::now() + Duration::from_millis(WAKE_ATTEMPT_MS);
            ticker.reset();
        }

        let now_ms = Instant::now().as_millis() as u32;
        // 12 bit conversion, scaled to the 10 bit code the estimator expects.
        let adc_code = resources.adc.blocking_read(&mut vrefint) >> 2;
        let event = BUTTON_EVENTS.try_receive().ok();

        let outputs = controller.step(&Inputs {
            now_ms,
            fire_pressed: resources.pin_fire.is_low(),
            adc_code,
            event,
        });

        // The output stage commits before anything below may re-arm.
        match outputs.mosfet {
            MosfetDrive::Off => pwm_fire_channel.set_duty_cycle_fully_off(),
            MosfetDrive::Duty(duty) => {
                let max = pwm_fire_channel.max_duty_cycle() as u32;
                pwm_fire_channel.set_duty_cycle((duty as u32 * max / PWM_MAX as u32) as u16);
            }
            MosfetDrive::On => pwm_fire_channel.set_duty_cycle_fully_on(),
        }

        if outputs.firing != was_firing {
            was_firing = outputs.firing;
            if outputs.firing {
                DISPLAY_SIG.signal(DisplayUpdate::Fire);
            }
        }
        if let Some(frame) = outputs.frame {
            if !outputs.firing {
                DISPLAY_SIG.signal(if outputs.slide {
                    DisplayUpdate::Slide(frame)
                } else {
                    DisplayUpdate::Frame(frame)
                });
            }
        }

        match outputs.action {
            Some(Action::EnterSleep(reason)) => {
                debug!("Entering sleep: {}", reason);
                let slide = match reason {
                    SleepReason::LowBattery => model::LOW_BATTERY,
                    SleepReason::Idle | SleepReason::Gesture => model::BYE,
                };
                DISPLAY_SIG.signal(DisplayUpdate::Slide(slide));
                STORE_PERSISTENT_SIG.signal(controller.persist_image());
                // Let the farewell slide play before the panel goes dark.
                Timer::after_millis(FAREWELL_MS).await;
            }
            Some(Action::Wake) => {
                info!("Woke, mode {}", controller.mode());
            }
            None => {}
        }

        ticker.next().await;
    }
}
