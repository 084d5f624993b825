use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::{Button, Input},
    ppu::Ppu,
    serial::Serial,
    timer::Timer,
};

/// Interrupt sources in priority order (bit 0 is highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub fn bit(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::Stat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }
}

#[derive(Debug, Default)]
struct OamDma {
    active: bool,
    /// Source page, i.e. the value last written to FF46.
    page: u8,
    /// Next OAM byte to fill.
    index: u8,
    /// T-cycles accumulated toward the next byte.
    cycle: u8,
}

pub struct Mmu {
    pub wram: [u8; 0x2000],
    pub hram: [u8; 0x7F],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub timer: Timer,
    pub input: Input,
    pub serial: Serial,
    pub ppu: Ppu,
    pub apu: Apu,
    dma: OamDma,
}

impl Mmu {
    pub fn new() -> Self {
        let mut timer = Timer::new();
        // Post-boot DIV phase measured on DMG-ABC hardware.
        timer.div = 0xABCC;

        Self {
            wram: [0; 0x2000],
            hram: [0; 0x7F],
            cart: None,
            if_reg: 0xE1,
            ie_reg: 0,
            timer,
            input: Input::new(),
            serial: Serial::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            dma: OamDma::default(),
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn request_interrupt(&mut self, kind: Interrupt) {
        self.if_reg |= kind.bit();
    }

    /// Update a button shadow; a press on a selected line raises the Joypad
    /// interrupt.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if self.input.set_button(button, pressed) {
            self.request_interrupt(Interrupt::Joypad);
        }
    }

    fn read_byte_inner(&self, addr: u16, allow_dma: bool) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                // The DMA engine owns the OAM bus for the whole transfer.
                if self.dma.active && !allow_dma {
                    0xFF
                } else {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.dma.page,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        self.read_byte_inner(addr, false)
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize] = val,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if !self.dma.active {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val, &mut self.if_reg),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => {
                self.dma.page = val;
                self.dma.active = true;
                self.dma.index = 0;
                self.dma.cycle = 0;
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val, &mut self.if_reg),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    pub fn dma_active(&self) -> bool {
        self.dma.active
    }

    /// Advance the OAM DMA engine: one byte lands every fourth T-cycle until
    /// all 160 have been copied.
    pub fn dma_step(&mut self, t_cycles: u32) {
        if !self.dma.active {
            return;
        }
        for _ in 0..t_cycles {
            self.dma.cycle += 1;
            if self.dma.cycle < 4 {
                continue;
            }
            self.dma.cycle = 0;
            let src = ((self.dma.page as u16) << 8) + self.dma.index as u16;
            let byte = self.read_byte_inner(src, true);
            self.ppu.oam[self.dma.index as usize] = byte;
            self.dma.index += 1;
            if self.dma.index == 160 {
                self.dma.active = false;
                return;
            }
        }
    }

    /// Advance DIV/TIMA and the DMA engine. The PPU and APU are driven
    /// separately with the same cycle count via [`Mmu::tick`].
    pub fn step(&mut self, t_cycles: u32) {
        self.timer.step(t_cycles, &mut self.if_reg);
        self.dma_step(t_cycles);
    }

    /// Advance every peripheral by the T-cycles one CPU instruction consumed.
    pub fn tick(&mut self, t_cycles: u32) {
        self.step(t_cycles);
        self.ppu.step(t_cycles, &mut self.if_reg);
        self.apu.step(t_cycles);
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
