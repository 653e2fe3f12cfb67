//! The display task: scans frames onto the shift-register driven 7-segment
//! panel and plays the slide and fire animations.

use dampf_core::display::{Frame, BLANK};
use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Async;
use embassy_stm32::spi::Spi;
use embassy_time::{Duration, Instant, Ticker};

use crate::{DisplayUpdate, DISPLAY_SIG};

/// Digit scan rate: the 30 Hz frame rate times eight scan slots.
const SCAN_RATE_HZ: u64 = 240;
/// Inter-glyph delay of the slide animation.
const SLIDE_STEP: Duration = Duration::from_millis(100);
/// Fire animation step period.
const FIRE_STEP: Duration = Duration::from_millis(100);

/// Segment cycle of the fire animation: a spinner around the outer segments.
const FIRE_SPINNER: [u8; 6] = [
    0b000_0001,
    0b000_0010,
    0b000_0100,
    0b000_1000,
    0b001_0000,
    0b010_0000,
];

/// Resources for the display task.
pub struct DisplayResources {
    /// SPI feeding the segment and digit shift registers.
    pub spi: Spi<'static, Async>,
    /// Storage register latch.
    pub pin_latch: Output<'static>,
}

/// What the scanner is currently rendering.
enum Visual {
    /// A static frame.
    Frame(Frame),
    /// A frame sliding in from the right.
    Slide {
        /// The frame being revealed.
        target: Frame,
        /// Glyphs shown so far.
        shown: usize,
        /// When the last glyph entered.
        last_step: Instant,
    },
    /// The fire spinner.
    Fire {
        /// Spinner position.
        phase: usize,
        /// When the spinner last advanced.
        last_step: Instant,
    },
    /// Panel blanked.
    Off,
}

/// Scans the display.
#[embassy_executor::task]
pub async fn display_task(mut resources: DisplayResources) {
    let mut ticker = Ticker::every(Duration::from_hz(SCAN_RATE_HZ));
    let mut visual = Visual::Off;
    let mut digit = 0usize;

    loop {
        if let Some(update) = DISPLAY_SIG.try_take() {
            visual = match update {
                DisplayUpdate::Frame(frame) => Visual::Frame(frame),
                DisplayUpdate::Slide(frame) => Visual::Slide {
                    target: frame,
                    shown: 0,
                    last_step: Instant::now(),
                },
                DisplayUpdate::Fire => Visual::Fire {
                    phase: 0,
                    last_step: Instant::now(),
                },
                DisplayUpdate::Off => Visual::Off,
            };
        }

        match &mut visual {
            Visual::Slide {
                shown, last_step, ..
            } => {
                if *shown < 4 && last_step.elapsed() >= SLIDE_STEP {
                    *shown += 1;
                    *last_step = Instant::now();
                }
            }
            Visual::Fire { phase, last_step } => {
                if last_step.elapsed() >= FIRE_STEP {
                    *phase = (*phase + 1) % FIRE_SPINNER.len();
                    *last_step = Instant::now();
                }
            }
            Visual::Frame(_) | Visual::Off => {}
        }

        let frame = match &visual {
            Visual::Frame(frame) => *frame,
            Visual::Slide { target, shown, .. } => {
                // Glyphs enter from the right edge.
                let mut frame = [BLANK; 4];
                for i in 0..*shown {
                    frame[4 - shown + i] = target[i];
                }
                frame
            }
            Visual::Fire { phase, .. } => [FIRE_SPINNER[*phase]; 4],
            Visual::Off => [BLANK; 4],
        };

        scan_digit(&mut resources, frame[digit], digit).await;
        digit = (digit + 1) % 4;

        ticker.next().await;
    }
}

/// Shift one digit out and pulse the storage latch.
async fn scan_digit(resources: &mut DisplayResources, segments: u8, digit: usize) {
    // Segment driver first, digit select second in the chain.
    let select = 1u8 << digit;
    if resources.spi.write(&[segments, select]).await.is_ok() {
        resources.pin_latch.set_high();
        resources.pin_latch.set_low();
    }
}
