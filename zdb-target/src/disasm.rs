//! 逆アセンブル機能
//!
//! Z80命令をデコードして命令長とニーモニックを求めます。
//! デバッガはこれを命令境界の計算（ステップオーバーの戻り先、表示カーソルの移動）に使います。

use crate::{CpuCore, Result, SymbolTable};
use std::path::Path;

/// アドレスの解釈（論理アドレス表示か物理アドレス表示か）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressView {
    #[default]
    Logical,
    Physical,
}

impl AddressView {
    /// この表示でのアドレス全域マスク
    pub fn mask(self) -> u32 {
        match self {
            Self::Logical => 0xffff,
            Self::Physical => u32::MAX,
        }
    }
}

/// 逆アセンブルサービス
pub trait DisassemblyService {
    /// `addr` の命令を逆アセンブルし、（次の命令のアドレス, テキスト）を返す
    ///
    /// 読み取れないアドレスの場合は None。
    fn disassemble(&self, core: &dyn CpuCore, addr: u32, view: AddressView) -> Option<(u32, String)>;

    /// ラベル名からアドレスを解決する
    fn label(&self, name: &str) -> Option<u32>;
}

const R: [&str; 8] = ["b", "c", "d", "e", "h", "l", "(hl)", "a"];
const RP: [&str; 4] = ["bc", "de", "hl", "sp"];
const RP2: [&str; 4] = ["bc", "de", "hl", "af"];
const CC: [&str; 8] = ["nz", "z", "nc", "c", "po", "pe", "p", "m"];
const ALU: [&str; 8] = ["add a,", "adc a,", "sub ", "sbc a,", "and ", "xor ", "or ", "cp "];
const ROT: [&str; 8] = ["rlc", "rrc", "rl", "rr", "sla", "sra", "sll", "srl"];
const MISC: [&str; 8] = ["rlca", "rrca", "rla", "rra", "daa", "cpl", "scf", "ccf"];
const BLOCK: [[&str; 4]; 4] = [
    ["ldi", "cpi", "ini", "outi"],
    ["ldd", "cpd", "ind", "outd"],
    ["ldir", "cpir", "inir", "otir"],
    ["lddr", "cpdr", "indr", "otdr"],
];

/// 1命令分のデコード状態
struct Decoder<'a> {
    bytes: [u8; 4],
    pos: usize,
    addr: u32,
    index: Option<&'static str>,
    disp: Option<i8>,
    symbols: Option<&'a SymbolTable>,
}

impl<'a> Decoder<'a> {
    fn new(bytes: [u8; 4], addr: u32, symbols: Option<&'a SymbolTable>) -> Self {
        Self {
            bytes,
            pos: 0,
            addr,
            index: None,
            disp: None,
            symbols,
        }
    }

    fn byte(&mut self) -> u8 {
        let b = self.bytes[self.pos.min(3)];
        self.pos += 1;
        b
    }

    fn word(&mut self) -> u16 {
        let lo = self.byte() as u16;
        let hi = self.byte() as u16;
        lo | (hi << 8)
    }

    fn imm8(&mut self) -> String {
        format!("${:02X}", self.byte())
    }

    fn imm16(&mut self) -> String {
        let value = self.word() as u32;
        match self.symbols.and_then(|s| s.name_at(value)) {
            Some(name) => name.to_string(),
            None => format!("${:04X}", value),
        }
    }

    fn relative(&mut self) -> String {
        let d = self.byte() as i8;
        let target = (self.addr.wrapping_add(self.pos as u32) as i64 + d as i64) as u32;
        format!("${:04X}", target & 0xffff)
    }

    fn hl(&self) -> &'static str {
        self.index.unwrap_or("hl")
    }

    fn rp(&self, p: u8) -> &'static str {
        if p == 2 {
            self.hl()
        } else {
            RP[p as usize]
        }
    }

    fn rp2(&self, p: u8) -> &'static str {
        if p == 2 {
            self.hl()
        } else {
            RP2[p as usize]
        }
    }

    fn displacement(&mut self) -> i8 {
        match self.disp {
            Some(d) => d,
            None => {
                let d = self.byte() as i8;
                self.disp = Some(d);
                d
            }
        }
    }

    fn mem_hl(&mut self) -> String {
        match self.index {
            None => "(hl)".to_string(),
            Some(ix) => {
                let d = self.displacement();
                if d < 0 {
                    format!("({}-${:02X})", ix, -(d as i16))
                } else {
                    format!("({}+${:02X})", ix, d)
                }
            }
        }
    }

    /// レジスタオペランド。`halves` が true ならインデックス時に h/l を ixh/ixl に置き換える
    fn reg(&mut self, idx: u8, halves: bool) -> String {
        match (idx, self.index) {
            (6, _) => self.mem_hl(),
            (4, Some(ix)) if halves => format!("{}h", ix),
            (5, Some(ix)) if halves => format!("{}l", ix),
            _ => R[idx as usize].to_string(),
        }
    }

    fn main(&mut self, op: u8) -> String {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => match z {
                0 => match y {
                    0 => "nop".to_string(),
                    1 => "ex af,af'".to_string(),
                    2 => format!("djnz {}", self.relative()),
                    3 => format!("jr {}", self.relative()),
                    _ => format!("jr {},{}", CC[(y - 4) as usize], self.relative()),
                },
                1 if q == 0 => format!("ld {},{}", self.rp(p), self.imm16()),
                1 => format!("add {},{}", self.hl(), self.rp(p)),
                2 => match (q, p) {
                    (0, 0) => "ld (bc),a".to_string(),
                    (0, 1) => "ld (de),a".to_string(),
                    (0, 2) => format!("ld ({}),{}", self.imm16(), self.hl()),
                    (0, _) => format!("ld ({}),a", self.imm16()),
                    (_, 0) => "ld a,(bc)".to_string(),
                    (_, 1) => "ld a,(de)".to_string(),
                    (_, 2) => format!("ld {},({})", self.hl(), self.imm16()),
                    _ => format!("ld a,({})", self.imm16()),
                },
                3 if q == 0 => format!("inc {}", self.rp(p)),
                3 => format!("dec {}", self.rp(p)),
                4 => format!("inc {}", self.reg(y, true)),
                5 => format!("dec {}", self.reg(y, true)),
                6 => {
                    let dst = self.reg(y, true);
                    format!("ld {},{}", dst, self.imm8())
                }
                _ => MISC[y as usize].to_string(),
            },
            1 if y == 6 && z == 6 => "halt".to_string(),
            1 => {
                let halves = y != 6 && z != 6;
                let dst = self.reg(y, halves);
                let src = self.reg(z, halves);
                format!("ld {},{}", dst, src)
            }
            2 => format!("{}{}", ALU[y as usize], self.reg(z, true)),
            _ => match z {
                0 => format!("ret {}", CC[y as usize]),
                1 if q == 0 => format!("pop {}", self.rp2(p)),
                1 => match p {
                    0 => "ret".to_string(),
                    1 => "exx".to_string(),
                    2 => format!("jp ({})", self.hl()),
                    _ => format!("ld sp,{}", self.hl()),
                },
                2 => format!("jp {},{}", CC[y as usize], self.imm16()),
                3 => match y {
                    0 => format!("jp {}", self.imm16()),
                    1 => {
                        // CBプレフィックスは呼び出し側で処理済み
                        let op = self.byte();
                        self.bitops(op)
                    }
                    2 => format!("out ({}),a", self.imm8()),
                    3 => format!("in a,({})", self.imm8()),
                    4 => format!("ex (sp),{}", self.hl()),
                    5 => "ex de,hl".to_string(),
                    6 => "di".to_string(),
                    _ => "ei".to_string(),
                },
                4 => format!("call {},{}", CC[y as usize], self.imm16()),
                5 if q == 0 => format!("push {}", self.rp2(p)),
                5 => format!("call {}", self.imm16()),
                6 => format!("{}{}", ALU[y as usize], self.imm8()),
                _ => format!("rst ${:02X}", y * 8),
            },
        }
    }

    fn bitops(&mut self, op: u8) -> String {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let operand = if self.index.is_some() {
            self.mem_hl()
        } else {
            self.reg(z, false)
        };

        match x {
            0 => format!("{} {}", ROT[y as usize], operand),
            1 => format!("bit {},{}", y, operand),
            2 => format!("res {},{}", y, operand),
            _ => format!("set {},{}", y, operand),
        }
    }

    fn extended(&mut self, op: u8) -> String {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            (1, 0) if y == 6 => "in (c)".to_string(),
            (1, 0) => format!("in {},(c)", R[y as usize]),
            (1, 1) if y == 6 => "out (c),0".to_string(),
            (1, 1) => format!("out (c),{}", R[y as usize]),
            (1, 2) if q == 0 => format!("sbc hl,{}", RP[p as usize]),
            (1, 2) => format!("adc hl,{}", RP[p as usize]),
            (1, 3) if q == 0 => format!("ld ({}),{}", self.imm16(), RP[p as usize]),
            (1, 3) => format!("ld {},({})", RP[p as usize], self.imm16()),
            (1, 4) => "neg".to_string(),
            (1, 5) if y == 1 => "reti".to_string(),
            (1, 5) => "retn".to_string(),
            (1, 6) => format!("im {}", [0, 0, 1, 2, 0, 0, 1, 2][y as usize]),
            (1, _) => ["ld i,a", "ld r,a", "ld a,i", "ld a,r", "rrd", "rld", "nop*", "nop*"][y as usize]
                .to_string(),
            (2, 0..=3) if y >= 4 => BLOCK[(y - 4) as usize][z as usize].to_string(),
            _ => format!("db $ED,${:02X}", op),
        }
    }

    fn decode(mut self) -> (u32, String) {
        let first = self.byte();
        let text = match first {
            0xdd | 0xfd => {
                let next = self.bytes[1];
                if matches!(next, 0xdd | 0xfd | 0xed) {
                    // 後続のプレフィックスで打ち消される
                    return (1, format!("db ${:02X}", first));
                }
                self.index = Some(if first == 0xdd { "ix" } else { "iy" });
                let op = self.byte();
                if op == 0xcb {
                    self.displacement();
                    let op = self.byte();
                    self.bitops(op)
                } else {
                    self.main(op)
                }
            }
            0xed => {
                let op = self.byte();
                self.extended(op)
            }
            op => self.main(op),
        };
        (self.pos as u32, text)
    }
}

/// 命令バイト列から命令長を求める
pub fn instruction_length(bytes: [u8; 4]) -> u32 {
    Decoder::new(bytes, 0, None).decode().0
}

/// 命令バイト列を逆アセンブルする
pub fn decode_instruction(bytes: [u8; 4], addr: u32, symbols: Option<&SymbolTable>) -> (u32, String) {
    Decoder::new(bytes, addr, symbols).decode()
}

/// Z80逆アセンブラ
#[derive(Debug, Default)]
pub struct Z80Disassembler {
    symbols: SymbolTable,
}

impl Z80Disassembler {
    /// 新しい逆アセンブラを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// シンボル表を指定して作成する
    pub fn with_symbols(symbols: SymbolTable) -> Self {
        Self { symbols }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// シンボルファイルを読み込む
    pub fn load_symbols<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        self.symbols.load(path)
    }

    fn fetch(core: &dyn CpuCore, addr: u32, view: AddressView) -> Option<[u8; 4]> {
        let mut bytes = [0u8; 4];
        match view {
            AddressView::Logical => {
                let base = addr as u16;
                for (i, b) in bytes.iter_mut().enumerate() {
                    *b = core.read_logical(base.wrapping_add(i as u16));
                }
            }
            AddressView::Physical => {
                if addr >= core.hardware().memory_size() {
                    return None;
                }
                for (i, b) in bytes.iter_mut().enumerate() {
                    *b = core.read_physical(addr.wrapping_add(i as u32));
                }
            }
        }
        Some(bytes)
    }
}

impl DisassemblyService for Z80Disassembler {
    fn disassemble(&self, core: &dyn CpuCore, addr: u32, view: AddressView) -> Option<(u32, String)> {
        let bytes = Self::fetch(core, addr, view)?;
        let (len, text) = decode_instruction(bytes, addr, Some(&self.symbols));
        Some((addr.wrapping_add(len), text))
    }

    fn label(&self, name: &str) -> Option<u32> {
        self.symbols.resolve(name)
    }
}
