use dotmatrix_core::{
    cartridge::Cartridge,
    input::Button,
    mmu::{Interrupt, Mmu},
};

#[test]
fn wram_echo_mirrors_both_directions() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xC123, 0x42);
    assert_eq!(mmu.read_byte(0xE123), 0x42);
    mmu.write_byte(0xE500, 0x77);
    assert_eq!(mmu.read_byte(0xC500), 0x77);
}

#[test]
fn hram_round_trips_every_value() {
    let mut mmu = Mmu::new();
    for (i, addr) in (0xFF80..=0xFFFE).enumerate() {
        let val = (i as u8).wrapping_mul(7).wrapping_add(3);
        mmu.write_byte(addr, val);
        assert_eq!(mmu.read_byte(addr), val);
    }
    for val in 0..=255u8 {
        mmu.write_byte(0xFF80, val);
        assert_eq!(mmu.read_byte(0xFF80), val);
    }
}

#[test]
fn unusable_region_reads_ff() {
    let mut mmu = Mmu::new();
    for addr in 0xFEA0..=0xFEFF {
        mmu.write_byte(addr, 0x12);
        assert_eq!(mmu.read_byte(addr), 0xFF);
    }
}

#[test]
fn unmapped_rom_reads_ff_without_cart() {
    let mmu = Mmu::new();
    assert_eq!(mmu.read_byte(0x0000), 0xFF);
    assert_eq!(mmu.read_byte(0x4000), 0xFF);
    assert_eq!(mmu.read_byte(0xA000), 0xFF);
}

#[test]
fn if_register_masks() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF0F, 0x00);
    assert_eq!(mmu.read_byte(0xFF0F), 0xE0);
    mmu.write_byte(0xFF0F, 0xFF);
    assert_eq!(mmu.read_byte(0xFF0F), 0xFF);
    mmu.write_byte(0xFF0F, 0x15);
    assert_eq!(mmu.read_byte(0xFF0F), 0xF5);
}

#[test]
fn ie_register_stores_full_byte() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFFFF, 0xAB);
    assert_eq!(mmu.read_byte(0xFFFF), 0xAB);
}

#[test]
fn request_interrupt_sets_if_bit() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF0F, 0x00);
    mmu.request_interrupt(Interrupt::Timer);
    assert_eq!(mmu.read_byte(0xFF0F) & 0x1F, 0x04);
    mmu.request_interrupt(Interrupt::Joypad);
    assert_eq!(mmu.read_byte(0xFF0F) & 0x1F, 0x14);
}

#[test]
fn oam_dma_copies_the_full_page() {
    let mut mmu = Mmu::new();
    for i in 0..0xA0u16 {
        mmu.write_byte(0xC000 + i, i as u8);
    }
    mmu.write_byte(0xFF46, 0xC0);
    assert!(mmu.dma_active());
    mmu.dma_step(160 * 4);
    assert!(!mmu.dma_active());
    for i in 0..0xA0usize {
        assert_eq!(mmu.ppu.oam[i], i as u8);
    }
}

#[test]
fn oam_dma_paces_one_byte_per_four_cycles() {
    let mut mmu = Mmu::new();
    for i in 0..0xA0u16 {
        mmu.write_byte(0xC000 + i, 0x40 + i as u8);
    }
    mmu.write_byte(0xFF46, 0xC0);
    mmu.dma_step(3);
    assert_eq!(mmu.ppu.oam[0], 0x00);
    mmu.dma_step(1);
    assert_eq!(mmu.ppu.oam[0], 0x40);
    assert_eq!(mmu.ppu.oam[1], 0x00);
    mmu.dma_step(4);
    assert_eq!(mmu.ppu.oam[1], 0x41);
}

#[test]
fn oam_blocked_from_cpu_during_dma() {
    let mut mmu = Mmu::new();
    mmu.ppu.oam[0] = 0x55;
    mmu.write_byte(0xFF46, 0xC0);
    // Reads of OAM return 0xFF and writes are dropped while the engine runs.
    assert_eq!(mmu.read_byte(0xFE00), 0xFF);
    mmu.write_byte(0xFE05, 0x99);
    // Other buses stay usable.
    mmu.write_byte(0xC000, 0x21);
    assert_eq!(mmu.read_byte(0xC000), 0x21);
    mmu.dma_step(640);
    assert_eq!(mmu.read_byte(0xFE00), 0x21);
    assert_eq!(mmu.ppu.oam[5], 0x00);
}

#[test]
fn dma_register_reads_back_last_page() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF46, 0xC0);
    mmu.dma_step(640);
    assert_eq!(mmu.read_byte(0xFF46), 0xC0);
}

#[test]
fn ly_write_resets_to_zero() {
    let mut mmu = Mmu::new();
    // Run the PPU a few lines in, then write LY.
    mmu.ppu.step(456 * 10, &mut mmu.if_reg);
    assert_eq!(mmu.read_byte(0xFF44), 10);
    mmu.write_byte(0xFF44, 0x55);
    assert_eq!(mmu.read_byte(0xFF44), 0);
}

#[test]
fn stat_write_touches_only_enable_bits() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF41, 0xFF);
    let stat = mmu.read_byte(0xFF41);
    assert_eq!(stat & 0x78, 0x78);
    // Mode bits reflect the PPU, not the write.
    assert_eq!(stat & 0x03, mmu.ppu.mode() & 0x03);
    mmu.write_byte(0xFF41, 0x00);
    assert_eq!(mmu.read_byte(0xFF41) & 0x78, 0x00);
}

#[test]
fn joypad_press_composes_and_interrupts() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF0F, 0x00);
    mmu.write_byte(0xFF00, 0x10);
    mmu.set_button(Button::Right, true);
    assert_eq!(mmu.read_byte(0xFF00), 0xDE);
    assert_eq!(mmu.read_byte(0xFF0F) & 0x10, 0x10);
}

#[test]
fn joypad_only_select_bits_writable() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF00, 0xFF);
    // Bits 6-7 read set, low nibble synthesized (nothing pressed).
    assert_eq!(mmu.read_byte(0xFF00), 0xFF);
    mmu.write_byte(0xFF00, 0x00);
    assert_eq!(mmu.read_byte(0xFF00), 0xCF);
}

#[test]
fn serial_transfer_buffers_byte_and_interrupts() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF0F, 0x00);
    mmu.write_byte(0xFF01, b'P');
    mmu.write_byte(0xFF02, 0x81);
    assert_eq!(mmu.take_serial(), vec![b'P']);
    assert_eq!(mmu.read_byte(0xFF0F) & 0x08, 0x08);
    // Disconnected line shifts in all ones.
    assert_eq!(mmu.read_byte(0xFF01), 0xFF);
    // Transfer already complete: SC bit 7 cleared.
    assert_eq!(mmu.read_byte(0xFF02) & 0x80, 0x00);
}

#[test]
fn rom_only_write_does_not_change_rom() {
    let mut rom = vec![0u8; 0x8000];
    rom[0x1234] = 0xAB;
    let mut mmu = Mmu::new();
    mmu.load_cart(Cartridge::load(rom));
    for addr in [0x0000u16, 0x1234, 0x4000, 0x7FFF] {
        mmu.write_byte(addr, 0x99);
    }
    assert_eq!(mmu.read_byte(0x1234), 0xAB);
    assert_eq!(mmu.read_byte(0x0000), 0x00);
}

#[test]
fn unused_io_reads_ff() {
    let mmu = Mmu::new();
    for addr in [0xFF03u16, 0xFF08, 0xFF4C, 0xFF7F] {
        assert_eq!(mmu.read_byte(addr), 0xFF, "addr {addr:04X}");
    }
}
