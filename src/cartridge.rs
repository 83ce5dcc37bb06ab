use thiserror::Error;

/// Size of the cartridge image header.
const HEADER_SIZE: usize = 16;
/// PRG ROM size unit (header byte 4 counts these).
const PRG_BANK_SIZE: usize = 16384;
/// CHR ROM size unit (header byte 5 counts these).
const CHR_BANK_SIZE: usize = 8192;

/// Errors raised while loading a cartridge image.
///
/// These surface before any core component is constructed; the core is never
/// handed an under-sized image.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("image is {0} bytes, shorter than the {HEADER_SIZE}-byte header")]
    MissingHeader(usize),
    #[error("image truncated: header declares {declared} bytes of program data, {available} available")]
    TruncatedPrg { declared: usize, available: usize },
    #[error("image truncated: header declares {declared} bytes of character data, {available} available")]
    TruncatedChr { declared: usize, available: usize },
    #[error("header declares no program banks")]
    EmptyPrg,
}

/// A parsed cartridge image.
///
/// Layout: 16-byte header, then `16384 * header[4]` bytes of program data,
/// then `8192 * header[5]` bytes of character data. The core consumes only
/// the program slice; the character slice is parsed and kept for the video
/// path that would sit on the PPU side.
#[derive(Debug)]
pub struct Cartridge {
    prg_rom: Vec<u8>,
    chr_rom: Vec<u8>,
}

impl Cartridge {
    /// Parse a raw cartridge image, validating the declared sizes against
    /// the buffer before slicing.
    pub fn new(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < HEADER_SIZE {
            return Err(RomError::MissingHeader(data.len()));
        }

        let prg_size = data[4] as usize * PRG_BANK_SIZE;
        let chr_size = data[5] as usize * CHR_BANK_SIZE;
        if prg_size == 0 {
            return Err(RomError::EmptyPrg);
        }

        let prg_end = HEADER_SIZE + prg_size;
        if data.len() < prg_end {
            return Err(RomError::TruncatedPrg {
                declared: prg_size,
                available: data.len() - HEADER_SIZE,
            });
        }
        let chr_end = prg_end + chr_size;
        if data.len() < chr_end {
            return Err(RomError::TruncatedChr {
                declared: chr_size,
                available: data.len() - prg_end,
            });
        }

        log::info!(
            "cartridge: {} bytes program, {} bytes character",
            prg_size,
            chr_size
        );

        Ok(Self {
            prg_rom: data[HEADER_SIZE..prg_end].to_vec(),
            chr_rom: data[prg_end..chr_end].to_vec(),
        })
    }

    /// Program storage slice, mapped at $8000-$FFFF by the bus.
    pub fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    /// Character storage slice, for the (unmodeled) video path.
    pub fn chr_rom(&self) -> &[u8] {
        &self.chr_rom
    }

    /// Move the program slice out, consuming the cartridge.
    pub fn into_prg_rom(self) -> Vec<u8> {
        self.prg_rom
    }
}
