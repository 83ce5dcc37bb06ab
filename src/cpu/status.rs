use bitflags::bitflags;

bitflags! {
    /// Processor status register.
    ///
    /// Bit 5 is hardwired high on the real part. All flag mutation goes
    /// through `set`/`insert`/`remove` (and the `set_zn` helper) so a flag
    /// update can never clobber its neighbors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const CARRY = 0x01;
        const ZERO = 0x02;
        const INTERRUPT_DISABLE = 0x04;
        const DECIMAL = 0x08;
        const BREAK = 0x10;
        const UNUSED = 0x20;
        const OVERFLOW = 0x40;
        const NEGATIVE = 0x80;
    }
}

impl Status {
    /// Power-up value: only the hardwired bit set.
    pub fn power_up() -> Self {
        Status::UNUSED
    }

    /// Set Zero and Negative from a result byte, leaving everything else.
    pub fn set_zn(&mut self, value: u8) {
        self.set(Status::ZERO, value == 0);
        self.set(Status::NEGATIVE, value & 0x80 != 0);
    }
}
