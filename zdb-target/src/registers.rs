//! レジスタ情報

/// Z80レジスタのスナップショット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub iff1: bool,
    pub iff2: bool,
    /// HALT命令で停止中
    pub halted: bool,
}

impl Registers {
    /// アキュムレータ
    pub fn a(&self) -> u8 {
        (self.af >> 8) as u8
    }

    /// フラグレジスタ
    pub fn f(&self) -> u8 {
        self.af as u8
    }

    pub fn set_a(&mut self, a: u8) {
        self.af = (self.af & 0x00ff) | ((a as u16) << 8);
    }

    pub fn set_f(&mut self, f: u8) {
        self.af = (self.af & 0xff00) | f as u16;
    }
}
