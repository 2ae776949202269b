//! LED strip control with a small animation renderer.
//!
//! Configuration changes raise [`LedControl::NOTIFY_DEFAULT`]; every render
//! that changes the rendered colours raises [`LedControl::NOTIFY_UPDATE`].

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rover_types::state::{LedAnimation, LedIndicator, LedOutput, LedState};
use rover_types::update::LedUpdate;
use rover_types::{NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

/// LEDs per segment.
pub const SEGMENT_LEN: usize = 8;

const WHITE: u32 = 0xFF_FF_FF;
const RED: u32 = 0xFF_00_00;
const BLUE: u32 = 0x00_00_FF;
const AMBER: u32 = 0xFF_A0_00;
const OFF: u32 = 0;

struct LedInner {
    config: LedState,
    front: Vec<u32>,
    back: Vec<u32>,
    time: f64,
}

pub struct LedControl {
    inner: Mutex<LedInner>,
    notifier: Notifier,
}

impl Default for LedControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LedControl {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;
    pub const NOTIFY_UPDATE: Reason = 1;

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedInner {
                config: LedState {
                    brightness: 1.0,
                    background: OFF,
                    animation: LedAnimation::None,
                    indicators: LedIndicator::None,
                },
                front: vec![OFF; SEGMENT_LEN],
                back: vec![OFF; SEGMENT_LEN],
                time: 0.0,
            }),
            notifier: Notifier::new(),
        }
    }

    pub fn snapshot(&self) -> LedState {
        self.inner.lock().config.clone()
    }

    pub fn output(&self) -> LedOutput {
        let inner = self.inner.lock();
        BTreeMap::from([
            ("front".to_string(), inner.front.clone()),
            ("back".to_string(), inner.back.clone()),
        ])
    }

    pub fn apply(&self, update: &LedUpdate) {
        {
            let mut inner = self.inner.lock();
            let config = &mut inner.config;
            if let Some(brightness) = update.brightness {
                config.brightness = brightness.clamp(0.0, 1.0);
            }
            if let Some(background) = update.background {
                config.background = background & 0xFF_FF_FF;
            }
            if let Some(animation) = update.animation {
                config.animation = animation;
            }
            if let Some(indicators) = update.indicators {
                config.indicators = indicators;
            }
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
        self.rerender();
    }

    /// `true` while the output changes over time without configuration
    /// changes.
    pub fn is_animated(&self) -> bool {
        let inner = self.inner.lock();
        inner.config.animation != LedAnimation::None || inner.config.indicators != LedIndicator::None
    }

    /// Render the strip at `time` seconds.
    pub(crate) fn render(&self, time: f64) {
        self.inner.lock().time = time;
        self.rerender();
    }

    fn rerender(&self) {
        let changed = {
            let mut inner = self.inner.lock();
            let (front, back) = render_frame(&inner.config, inner.time);
            let changed = front != inner.front || back != inner.back;
            inner.front = front;
            inner.back = back;
            changed
        };
        if changed {
            self.notifier.notify(Self::NOTIFY_UPDATE);
        }
    }
}

impl Subject for LedControl {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        2
    }
    fn describe(&self) -> String {
        "leds".to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Renderer
// ────────────────────────────────────────────────────────────────────────────

fn render_frame(config: &LedState, time: f64) -> (Vec<u32>, Vec<u32>) {
    let n = SEGMENT_LEN;
    let phase = (time * 2.0) as usize;
    let blink = phase % 2 == 0;
    let cursor = ((time * 8.0) as usize) % n;
    let bounce = {
        let step = ((time * 8.0) as usize) % (2 * n - 2);
        if step < n { step } else { 2 * n - 2 - step }
    };

    let (mut front, mut back): (Vec<u32>, Vec<u32>) = match config.animation {
        LedAnimation::None => (vec![config.background; n], vec![config.background; n]),
        LedAnimation::Headlights => (vec![WHITE; n], vec![RED; n]),
        LedAnimation::Construction => {
            let seg = (0..n)
                .map(|i| if (i % 2 == 0) == blink { AMBER } else { OFF })
                .collect::<Vec<_>>();
            (seg.clone(), seg)
        }
        LedAnimation::Police | LedAnimation::Ambulance => {
            let second = if config.animation == LedAnimation::Police { BLUE } else { WHITE };
            let seg = (0..n)
                .map(|i| match (i < n / 2, blink) {
                    (true, true) | (false, false) => RED,
                    _ => second,
                })
                .collect::<Vec<_>>();
            (seg.clone(), seg)
        }
        LedAnimation::RunningLight => {
            let seg = (0..n)
                .map(|i| if i == cursor { WHITE } else { config.background })
                .collect::<Vec<_>>();
            (seg.clone(), seg)
        }
        LedAnimation::KnightRider => {
            let seg = (0..n)
                .map(|i| if i == bounce { RED } else { OFF })
                .collect::<Vec<_>>();
            (seg.clone(), seg)
        }
        LedAnimation::Rainbow => {
            let colour = hue_to_rgb(time * 0.25);
            (vec![colour; n], vec![colour; n])
        }
        LedAnimation::RainbowWave => {
            let seg = (0..n)
                .map(|i| hue_to_rgb(time * 0.25 + i as f64 / n as f64))
                .collect::<Vec<_>>();
            (seg.clone(), seg)
        }
    };

    let (left, right) = match config.indicators {
        LedIndicator::None => (false, false),
        LedIndicator::Left => (true, false),
        LedIndicator::Right => (false, true),
        LedIndicator::Hazard => (true, true),
    };
    let indicator = if blink { AMBER } else { OFF };
    for seg in [&mut front, &mut back] {
        if left {
            seg[0] = indicator;
            seg[1] = indicator;
        }
        if right {
            seg[n - 1] = indicator;
            seg[n - 2] = indicator;
        }
        for colour in seg.iter_mut() {
            *colour = dim(*colour, config.brightness);
        }
    }
    (front, back)
}

fn dim(colour: u32, brightness: f32) -> u32 {
    let scale = |shift: u32| -> u32 {
        let channel = (colour >> shift) & 0xFF;
        ((channel as f32 * brightness).round() as u32).min(0xFF) << shift
    };
    scale(16) | scale(8) | scale(0)
}

/// HSV hue in turns (wrapping) at full saturation and value.
fn hue_to_rgb(hue: f64) -> u32 {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = ((1.0 - ((h % 2.0) - 1.0).abs()) * 255.0).round() as u32;
    let (r, g, b) = match h as u32 {
        0 => (255, x, 0),
        1 => (x, 255, 0),
        2 => (0, 255, x),
        3 => (0, x, 255),
        4 => (x, 0, 255),
        _ => (255, 0, x),
    };
    (r << 16) | (g << 8) | b
}
