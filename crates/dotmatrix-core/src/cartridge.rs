use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

/// MBC2 carries 512 x 4-bit cells regardless of the header RAM code.
const MBC2_RAM_SIZE: usize = 0x200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Problems a caller may want to surface when loading a ROM image.
///
/// `Cartridge::load` itself never fails; header decode falls back to
/// [`MbcType::RomOnly`] defaults. This type exists for frontends that validate
/// images before loading them.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("ROM image too short for a cartridge header ({0} bytes)")]
    TooShort(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    rom_bank_count: usize,
    cart_type: u8,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

#[derive(Debug)]
enum MbcState {
    RomOnly,
    Mbc1 {
        bank_lo: u8,
        bank_hi: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Rtc,
        latch_pending: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

/// MBC3 real-time-clock registers.
///
/// The clock is latched but never advanced; the five registers hold whatever
/// the program wrote.
#[derive(Debug, Clone, Copy, Default)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    day_low: u8,
    day_high: u8,
}

#[derive(Debug, Default)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
}

impl Rtc {
    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => self.latched.day_low,
            0x0C => self.latched.day_high & 0xC1,
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => self.regs.seconds = value & 0x3F,
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.day_low = value,
            0x0C => self.regs.day_high = value & 0xC1,
            _ => {}
        }
    }
}

impl Cartridge {
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data);

        if cart.has_battery() {
            let mut save = PathBuf::from(path.as_ref());
            save.set_extension("sav");
            cart.save_path = Some(save.clone());
            if let Ok(bytes) = fs::read(&save) {
                cart.restore_ram(&bytes);
            }
        }

        log::info!(
            target: "dotmatrix_core::cartridge",
            "loaded ROM: {} (MBC: {:?}, {} ROM banks, {} bytes RAM)",
            cart.title,
            cart.mbc,
            cart.rom_bank_count,
            cart.ram.len()
        );
        Ok(cart)
    }

    pub fn from_bytes_with_ram(data: Vec<u8>, ram_size: usize) -> Self {
        let mut c = Self::load(data);
        c.ram = vec![0; ram_size];
        c
    }

    /// Decode the cartridge header and build the mapper state.
    ///
    /// Total function: unknown type bytes fall back to a plain ROM.
    pub fn load(data: Vec<u8>) -> Self {
        let header = Header::parse(&data);
        let mbc = header.mbc_type();
        let title = header.title();
        let cart_type = header.cart_type();
        let ram_size = if mbc == MbcType::Mbc2 {
            MBC2_RAM_SIZE
        } else {
            header.ram_size()
        };
        // The bank count comes from the header's ROM-size code, not from the
        // length of the image; reads that land past the physical data fall
        // through to 0xFF in `rom_read`.
        let rom_bank_count = 2usize << header.rom_size_code().min(8);

        let mbc_state = match mbc {
            MbcType::RomOnly => MbcState::RomOnly,
            MbcType::Mbc1 => MbcState::Mbc1 {
                bank_lo: 1,
                bank_hi: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: Rtc::default(),
                latch_pending: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            rom_bank_count,
            cart_type,
            save_path: None,
            mbc_state,
        }
    }

    fn rom_read(&self, bank: usize, addr: u16) -> u8 {
        let offset = (bank % self.rom_bank_count) * ROM_BANK_SIZE + (addr as usize & 0x3FFF);
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    /// Switchable-window read for the mappers that can never expose bank 0
    /// there: a bank number that normalizes to 0 reads bank 1 instead.
    fn rom_read_switchable(&self, bank: usize, addr: u16) -> u8 {
        let mut bank = bank % self.rom_bank_count;
        if bank == 0 {
            bank = 1;
        }
        self.rom_read(bank, addr)
    }

    pub fn read(&self, addr: u16) -> u8 {
        match (&self.mbc_state, addr) {
            (MbcState::RomOnly, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { bank_hi, mode, .. }, 0x0000..=0x3FFF) => {
                // Advanced mode maps the high-2 latch into the fixed window.
                let bank = if *mode == 0 {
                    0
                } else {
                    ((*bank_hi as usize) & 0x03) << 5
                };
                self.rom_read(bank, addr)
            }
            (MbcState::Mbc1 {
                bank_lo, bank_hi, ..
            }, 0x4000..=0x7FFF) => {
                let mut lo = (*bank_lo as usize) & 0x1F;
                if lo == 0 {
                    lo = 1;
                }
                let bank = ((*bank_hi as usize & 0x03) << 5) | lo;
                self.rom_read_switchable(bank, addr)
            }
            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let mut bank = (*rom_bank as usize) & 0x0F;
                if bank == 0 {
                    bank = 1;
                }
                self.rom_read_switchable(bank, addr)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = if *rom_bank == 0 { 1 } else { *rom_bank } as usize;
                self.rom_read_switchable(bank, addr)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                // MBC5 can map bank 0 into the switchable window.
                self.rom_read(*rom_bank as usize, addr)
            }
            (MbcState::RomOnly, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 {
                ram_enable,
                bank_hi,
                mode,
                ..
            }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                let bank = if *mode == 0 { 0 } else { (*bank_hi & 0x03) as usize };
                let idx = self.ram_index(bank, addr);
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                // 512 nibbles mirrored across the window; high bits read back set.
                let idx = (addr as usize - 0xA000) & 0x01FF;
                let nibble = self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F;
                0xF0 | nibble
            }
            (MbcState::Mbc3 {
                ram_enable,
                ram_bank,
                rtc,
                ..
            }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                match *ram_bank {
                    0x00..=0x03 => {
                        let idx = self.ram_index(*ram_bank as usize, addr);
                        self.ram.get(idx).copied().unwrap_or(0xFF)
                    }
                    0x08..=0x0C => rtc.read_latched(*ram_bank),
                    _ => 0xFF,
                }
            }
            (MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                let idx = self.ram_index(*ram_bank as usize, addr);
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            // Writes into the ROM window of a plain cartridge do nothing.
            (MbcState::RomOnly, 0x0000..=0x7FFF) => {}
            (MbcState::RomOnly, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { bank_lo, .. }, 0x2000..=0x3FFF) => {
                *bank_lo = val & 0x1F;
                if *bank_lo == 0 {
                    *bank_lo = 1;
                }
            }
            (MbcState::Mbc1 { bank_hi, .. }, 0x4000..=0x5FFF) => {
                *bank_hi = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 {
                ram_enable,
                bank_hi,
                mode,
                ..
            }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let bank = if *mode == 0 { 0 } else { (*bank_hi & 0x03) as usize };
                    let idx = Self::ram_index_for(bank, addr, self.ram.len());
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (MbcState::Mbc2 {
                rom_bank,
                ram_enable,
            }, 0x0000..=0x3FFF) => {
                // Address bit 8 selects RAMG vs ROMB across the whole range.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (MbcState::Mbc3 {
                latch_pending, rtc, ..
            }, 0x6000..=0x7FFF) => {
                // Latch on a 0x00 -> 0x01 write sequence.
                if val == 0 {
                    *latch_pending = true;
                } else {
                    if val == 1 && *latch_pending {
                        rtc.latch();
                    }
                    *latch_pending = false;
                }
            }
            (MbcState::Mbc3 {
                ram_enable,
                ram_bank,
                rtc,
                ..
            }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx =
                                Self::ram_index_for(*ram_bank as usize, addr, self.ram.len());
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => rtc.write_register(*ram_bank, val),
                        _ => {}
                    }
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = Self::ram_index_for(*ram_bank as usize, addr, self.ram.len());
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, bank: usize, addr: u16) -> usize {
        Self::ram_index_for(bank, addr, self.ram.len())
    }

    fn ram_index_for(bank: usize, addr: u16, ram_len: usize) -> usize {
        let bank_count = ram_len.div_ceil(RAM_BANK_SIZE).max(1);
        (bank % bank_count) * RAM_BANK_SIZE + (addr as usize - 0xA000)
    }

    /// Flat external-RAM contents, for frontends that persist saves themselves.
    pub fn ram_snapshot(&self) -> &[u8] {
        &self.ram
    }

    /// Restore external RAM from a previously taken snapshot. Extra bytes in
    /// `data` are ignored; a short snapshot leaves the tail untouched.
    pub fn restore_ram(&mut self, data: &[u8]) {
        for (d, s) in self.ram.iter_mut().zip(data.iter()) {
            *d = *s;
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn save_ram(&mut self) -> io::Result<()> {
        if self.has_battery() && !self.ram.is_empty() {
            if let Some(path) = &self.save_path {
                fs::write(path, &self.ram)?;
            }
        }
        Ok(())
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let end = 0x0143.min(self.data.len());
        let mut slice = &self.data[0x0134.min(self.data.len())..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cart_type(&self) -> u8 {
        self.data.get(0x0147).copied().unwrap_or(0)
    }

    /// ROM-size code at 0x0148: the image holds `2 << code` 16 KiB banks.
    fn rom_size_code(&self) -> u8 {
        self.data.get(0x0148).copied().unwrap_or(0)
    }

    fn mbc_type(&self) -> MbcType {
        if self.data.len() < 0x150 {
            return MbcType::RomOnly;
        }
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => MbcType::RomOnly,
            0x01..=0x03 => MbcType::Mbc1,
            0x05 | 0x06 => MbcType::Mbc2,
            0x0F..=0x13 => MbcType::Mbc3,
            0x19..=0x1E => MbcType::Mbc5,
            other => {
                log::warn!(
                    target: "dotmatrix_core::cartridge",
                    "unknown cartridge type {other:02X}, treating as ROM only"
                );
                MbcType::RomOnly
            }
        }
    }

    fn ram_size(&self) -> usize {
        if self.data.len() < 0x150 {
            return RAM_BANK_SIZE;
        }
        match self.data.get(0x0149).copied().unwrap_or(0) {
            0x00 => 0,
            0x01 => 0x800,   // 2KB
            0x02 => 0x2000,  // 8KB
            0x03 => 0x8000,  // 32KB (4 banks)
            0x04 => 0x20000, // 128KB (16 banks)
            0x05 => 0x10000, // 64KB (8 banks)
            _ => RAM_BANK_SIZE,
        }
    }
}
