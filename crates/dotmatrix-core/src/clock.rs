use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{
    audio_queue::AudioProducer, gameboy::GameBoy, input::Button, FrameSink, FRAME_CYCLES,
};

/// State shared between the frontend and the clock worker. Buttons are packed
/// into one atomic word; transitions take effect at the next frame boundary.
struct Shared {
    stop: AtomicBool,
    buttons: AtomicU8,
    /// Master volume as millis (0..=1000), so it fits an atomic word.
    volume_millis: AtomicU32,
}

fn button_bit(button: Button) -> u8 {
    match button {
        Button::Right => 0x01,
        Button::Left => 0x02,
        Button::Up => 0x04,
        Button::Down => 0x08,
        Button::A => 0x10,
        Button::B => 0x20,
        Button::Select => 0x40,
        Button::Start => 0x80,
    }
}

const ALL_BUTTONS: [Button; 8] = [
    Button::Right,
    Button::Left,
    Button::Up,
    Button::Down,
    Button::A,
    Button::B,
    Button::Select,
    Button::Start,
];

/// Frame-paced emulation loop on a dedicated worker thread.
///
/// Each frame runs ~70,224 T-cycles, pushes the finished framebuffer to the
/// sink, drains APU output into the audio ring, then waits for the next
/// 1/59.73 s boundary on the host monotonic clock. When the host falls more
/// than one frame behind, the backlog is dropped rather than replayed.
pub struct Clock {
    gb: GameBoy,
    shared: Arc<Shared>,
    frame_sink: Box<dyn FrameSink>,
    audio: Option<AudioProducer>,
    applied_buttons: u8,
    applied_volume: u32,
}

/// Frontend-side handle to a running [`Clock`].
pub struct ClockHandle {
    shared: Arc<Shared>,
    join: Option<JoinHandle<GameBoy>>,
}

impl Clock {
    /// Start the worker thread. The machine is handed over to the worker and
    /// returned by [`ClockHandle::stop`].
    pub fn spawn(
        gb: GameBoy,
        frame_sink: Box<dyn FrameSink>,
        audio: Option<AudioProducer>,
    ) -> ClockHandle {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            buttons: AtomicU8::new(0),
            volume_millis: AtomicU32::new(1000),
        });

        let mut clock = Clock {
            gb,
            shared: Arc::clone(&shared),
            frame_sink,
            audio,
            applied_buttons: 0,
            applied_volume: 1000,
        };

        let join = thread::Builder::new()
            .name("dotmatrix-clock".into())
            .spawn(move || {
                clock.run();
                clock.gb
            })
            .expect("failed to spawn clock thread");

        ClockHandle {
            shared,
            join: Some(join),
        }
    }

    fn run(&mut self) {
        let period = Duration::from_secs_f64(1.0 / self.gb.config().frame_rate);
        let mut deadline = Instant::now() + period;

        while !self.shared.stop.load(Ordering::Acquire) {
            self.apply_frontend_state();
            self.run_one_frame();

            if self.gb.mmu.ppu.frame_ready() {
                self.frame_sink.push_frame(self.gb.mmu.ppu.framebuffer());
                self.gb.mmu.ppu.clear_frame_flag();
            }
            if let Some(audio) = &self.audio {
                while let Some((l, r)) = self.gb.mmu.apu.pop_stereo() {
                    // The ring drops samples when the consumer stalls.
                    let _ = audio.push_stereo(l, r);
                }
            }

            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
                deadline += period;
            } else if now - deadline > period {
                // More than a frame behind: drop the backlog.
                deadline = now + period;
            } else {
                deadline += period;
            }
        }
    }

    fn run_one_frame(&mut self) {
        let mut cycles = 0u32;
        while cycles < FRAME_CYCLES {
            cycles += self.gb.step();
        }
    }

    fn apply_frontend_state(&mut self) {
        let buttons = self.shared.buttons.load(Ordering::Acquire);
        let changed = buttons ^ self.applied_buttons;
        if changed != 0 {
            for &button in &ALL_BUTTONS {
                let bit = button_bit(button);
                if changed & bit != 0 {
                    self.gb.set_button(button, buttons & bit != 0);
                }
            }
            self.applied_buttons = buttons;
        }

        let volume = self.shared.volume_millis.load(Ordering::Acquire);
        if volume != self.applied_volume {
            self.gb.mmu.apu.set_master_volume(volume as f32 / 1000.0);
            self.applied_volume = volume;
        }
    }
}

impl ClockHandle {
    /// Publish a button transition; the worker applies it before the next
    /// frame.
    pub fn set_button(&self, button: Button, pressed: bool) {
        let bit = button_bit(button);
        if pressed {
            self.shared.buttons.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.shared.buttons.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    /// Publish a master-volume change (clamped to 0..=1).
    pub fn set_volume(&self, volume: f32) {
        let millis = (volume.clamp(0.0, 1.0) * 1000.0) as u32;
        self.shared.volume_millis.store(millis, Ordering::Release);
    }

    /// Ask the worker to stop at the next frame boundary and wait for it,
    /// returning the machine.
    pub fn stop(mut self) -> Option<GameBoy> {
        self.shared.stop.store(true, Ordering::Release);
        self.join
            .take()
            .and_then(|join| join.join().ok())
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
