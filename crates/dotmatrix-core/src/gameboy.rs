use crate::{
    cartridge::Cartridge, config::CoreConfig, cpu::Cpu, diagnostics::TraceHandle, input::Button,
    mmu::Mmu, FRAME_CYCLES,
};

/// The emulated machine: CPU plus the MMU-owned peripherals, stepping in
/// lockstep.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub trace: TraceHandle,
    config: CoreConfig,
}

impl GameBoy {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let mut mmu = Mmu::new();
        mmu.apu.set_sample_rate(config.sample_rate);
        Self {
            cpu: Cpu::new(),
            mmu,
            trace: TraceHandle::new(),
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Replace the cartridge and reinitialize all machine state. Malformed
    /// images degrade to a plain ROM; this never fails.
    pub fn load_rom(&mut self, data: &[u8]) {
        self.mmu.load_cart(Cartridge::load(data.to_vec()));
        self.reset();
    }

    /// Reset to the post-boot state, preserving the loaded cartridge.
    pub fn reset(&mut self) {
        let cart = self.mmu.cart.take();
        self.cpu = Cpu::new();
        let mut mmu = Mmu::new();
        mmu.apu.set_sample_rate(self.config.sample_rate);
        if let Some(c) = cart {
            mmu.load_cart(c);
        }
        self.mmu = mmu;
    }

    /// Execute one instruction (or interrupt dispatch) and advance every
    /// peripheral by the T-cycles it consumed. Returns that count.
    pub fn step(&mut self) -> u32 {
        if self.trace.enabled() {
            let line = self.cpu.debug_state();
            self.trace.emit(format_args!("{line}"));
        }
        let t_cycles = self.cpu.step(&mut self.mmu);
        self.mmu.tick(t_cycles);
        t_cycles
    }

    /// Run until the PPU finishes the current frame (or, with the LCD off,
    /// until one frame's worth of T-cycles has elapsed). Returns the T-cycles
    /// consumed.
    pub fn step_frame(&mut self) -> u32 {
        self.mmu.ppu.clear_frame_flag();
        // One scanline of slack covers instruction overshoot at the frame
        // boundary; the bound only bites when the LCD is off.
        let limit = FRAME_CYCLES + 456;
        let mut spent = 0u32;
        while !self.mmu.ppu.frame_ready() && spent < limit {
            spent += self.step();
        }
        spent
    }

    /// Forward a button transition to the joypad register.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.mmu.set_button(button, pressed);
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
