use crate::bus::Device;

/// PPU Status Register ($2002) bit constants
/// Bit 7: VBlank Started
/// Bit 6: Sprite 0 Hit
/// Bit 5: Sprite Overflow
/// Bit 4-0: Unused
const VBLANK_STARTED: u8 = 0b1000_0000;
const SPRITE_0_HIT: u8 = 0b0100_0000;
const SPRITE_OVERFLOW: u8 = 0b0010_0000;

/// Number of PPU cycles (dots) per scanline
pub const DOTS_PER_SCANLINE: u32 = 341;
/// Number of scanlines per frame
pub const SCANLINES_PER_FRAME: u32 = 262;
/// Dot index at which the vblank latch sets (start of scanline 240)
pub const VBLANK_START_DOT: u32 = 240 * DOTS_PER_SCANLINE;
/// Total dots in one frame; the counter wraps back to 0 here
pub const DOTS_PER_FRAME: u32 = SCANLINES_PER_FRAME * DOTS_PER_SCANLINE;

/// Pixel-processing unit timing stub.
///
/// Tracks a dot position within a fixed-length frame and the status latches a
/// program can observe through the register bank at $2000-$3FFF. Clocked at
/// three times the CPU rate by its own divisor, and mapped on the bus as a
/// `Device`, so it is shared between the driving loop and the bus behind
/// `Rc<RefCell<_>>`.
///
/// Rendering is not modeled; the register bank satisfies the device contract
/// and the vblank state machine, nothing more.
pub struct Ppu {
    /// Current dot within the frame (0..=DOTS_PER_FRAME)
    dot: u32,
    vblank: bool,
    sprite_zero_hit: bool,
    sprite_overflow: bool,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            dot: 0,
            vblank: false,
            sprite_zero_hit: false,
            sprite_overflow: false,
        }
    }

    /// Current dot position within the frame.
    pub fn dot(&self) -> u32 {
        self.dot
    }

    /// Scanline the current dot falls on.
    pub fn scanline(&self) -> u32 {
        self.dot / DOTS_PER_SCANLINE
    }

    pub fn in_vblank(&self) -> bool {
        self.vblank
    }

    /// Advance one dot. The vblank latch sets at a fixed dot index and
    /// clears when the position wraps to the top of the frame.
    pub fn clk(&mut self) {
        if self.dot == 0 {
            if self.vblank {
                log::debug!("ppu: end vblank");
            }
            self.vblank = false;
        } else if !self.vblank && self.dot == VBLANK_START_DOT {
            log::debug!("ppu: begin vblank");
            self.vblank = true;
        }

        self.dot = if self.dot == DOTS_PER_FRAME {
            0
        } else {
            self.dot + 1
        };
    }

    /// Assemble the status byte from the latches.
    fn status(&self) -> u8 {
        let mut status = 0;
        if self.vblank {
            status |= VBLANK_STARTED;
        }
        if self.sprite_zero_hit {
            status |= SPRITE_0_HIT;
        }
        if self.sprite_overflow {
            status |= SPRITE_OVERFLOW;
        }
        status
    }

    #[cfg(test)]
    pub fn force_vblank_for_test(&mut self) {
        self.vblank = true;
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Ppu {
    fn get(&mut self, offset: u16) -> u8 {
        match offset {
            // PPUSTATUS: reading clears the vblank latch, as the hardware
            // latch does.
            2 => {
                let status = self.status();
                self.vblank = false;
                status
            }
            _ => 0,
        }
    }

    fn set(&mut self, offset: u16, value: u8) {
        // Register writes are observed but not yet modeled.
        match offset {
            0 => log::debug!("ppu: PPUCTRL <- {value:#04x}"),
            1 => log::debug!("ppu: PPUMASK <- {value:#04x}"),
            _ => log::debug!("ppu: register {offset} <- {value:#04x}"),
        }
    }
}
