pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod cpu;
pub mod nes;
pub mod ppu;
