//! 参照用の簡易Z80コア
//!
//! デバッガコアのテストとCLIのデモ実行に使う小さなインタプリタです。
//! 制御フロー（call/ret/jp/jr/djnz/rst/retn/reti）、スタック、ロード、8ビット算術、
//! ポート入出力、HALTとIM1割り込みを実装しています。未実装の命令は命令長だけ進めます。
//!
//! メモリはTI-83 Plusと同様に16KBのバンク4つで構成され、各バンクにROMまたはRAMのページを割り当てます。

use crate::{
    instruction_length, BreakKind, CoreBreakpoint, CoreHandle, CpuCore, ExecOutcome, Hardware,
    Registers, TriggerTest, PAGE_SIZE,
};

const FLAG_C: u8 = 0x01;
const FLAG_N: u8 = 0x02;
const FLAG_PV: u8 = 0x04;
const FLAG_H: u8 = 0x10;
const FLAG_Z: u8 = 0x40;
const FLAG_S: u8 = 0x80;

/// IM1割り込みベクタ
const INTERRUPT_VECTOR: u16 = 0x0038;

/// 命令実行中に発生したデータアクセス
#[derive(Debug, Clone, Copy)]
enum DataAccess {
    MemRead(u16),
    MemWrite(u16),
    PortRead(u8),
    PortWrite(u8),
}

/// 参照用Z80コア
pub struct SimCore {
    regs: Registers,
    hw: Hardware,
    memory: Vec<u8>,
    /// 各論理バンクの物理ベースアドレス
    banks: [u32; 4],
    breakpoints: Vec<(CoreHandle, CoreBreakpoint)>,
    next_handle: u32,
    breakpoint_limit: Option<usize>,
    interrupt_pending: bool,
    /// 直前に停止したPC（再開時にそのアドレスの実行ブレークポイントを1回だけ無視する）
    last_break_pc: Option<u16>,
    accesses: Vec<DataAccess>,
    port_input: [u8; 256],
    port_output: Vec<(u8, u8)>,
    instructions: u64,
}

impl SimCore {
    /// 指定した構成でコアを作成する
    pub fn new(hw: Hardware) -> Self {
        let mut core = Self {
            regs: Registers {
                sp: 0xfff0,
                ..Default::default()
            },
            hw,
            memory: vec![0; hw.memory_size() as usize],
            banks: [0; 4],
            breakpoints: Vec::new(),
            next_handle: 1,
            breakpoint_limit: None,
            interrupt_pending: false,
            last_break_pc: None,
            accesses: Vec::new(),
            port_input: [0xff; 256],
            port_output: Vec::new(),
            instructions: 0,
        };
        core.map_page(0, 0);
        core.map_page(1, 1);
        core.map_page(2, hw.ram_page_base + 1);
        core.map_page(3, hw.ram_page_base);
        core
    }

    /// 論理バンクにページを割り当てる
    pub fn map_page(&mut self, bank: usize, page: u32) {
        self.banks[bank & 3] = self.hw.page_address(page, 0);
    }

    /// 論理アドレスにバイト列を書き込む（ROM保護を無視する）
    pub fn load_logical(&mut self, addr: u16, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            let phys = self.logical_to_physical(addr.wrapping_add(i as u16));
            if let Some(slot) = self.memory.get_mut(phys as usize) {
                *slot = *b;
            }
        }
    }

    /// 物理アドレスにバイト列を書き込む
    pub fn load_physical(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            if let Some(slot) = self.memory.get_mut(addr as usize + i) {
                *slot = *b;
            }
        }
    }

    /// レジスタを変更する
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// マスク可能割り込みを要求する
    pub fn raise_interrupt(&mut self) {
        self.interrupt_pending = true;
    }

    /// `in` 命令で読まれる値を設定する
    pub fn set_port_input(&mut self, port: u8, value: u8) {
        self.port_input[port as usize] = value;
    }

    /// `out` 命令で書かれた（ポート, 値）の履歴
    pub fn port_output(&self) -> &[(u8, u8)] {
        &self.port_output
    }

    /// 登録されているブレークポイント数
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    /// 登録されているブレークポイント
    pub fn breakpoints(&self) -> impl Iterator<Item = &CoreBreakpoint> {
        self.breakpoints.iter().map(|(_, bp)| bp)
    }

    /// 登録できるブレークポイント数の上限（超えた登録は拒否される）
    pub fn set_breakpoint_limit(&mut self, limit: Option<usize>) {
        self.breakpoint_limit = limit;
    }

    /// 実行した命令数
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    fn peek_bytes(&self, addr: u16) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_logical(addr.wrapping_add(i as u16));
        }
        bytes
    }

    /// トリガーテストに渡すオペコード値（プレフィックス付きは `prefix << 8 | op`）
    fn opcode_value(bytes: [u8; 4]) -> u32 {
        match bytes[0] {
            0xcb | 0xdd | 0xed | 0xfd => ((bytes[0] as u32) << 8) | bytes[1] as u32,
            op => op as u32,
        }
    }

    fn fetch8(&mut self) -> u8 {
        let b = self.read_logical(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        b
    }

    fn fetch16(&mut self) -> u16 {
        let lo = self.fetch8() as u16;
        let hi = self.fetch8() as u16;
        lo | (hi << 8)
    }

    fn read8(&mut self, addr: u16) -> u8 {
        self.accesses.push(DataAccess::MemRead(addr));
        self.read_logical(addr)
    }

    fn write8(&mut self, addr: u16, value: u8) {
        self.accesses.push(DataAccess::MemWrite(addr));
        let phys = self.logical_to_physical(addr);
        if phys >= self.hw.rom_size {
            if let Some(slot) = self.memory.get_mut(phys as usize) {
                *slot = value;
            }
        }
    }

    fn read16(&mut self, addr: u16) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    fn write16(&mut self, addr: u16, value: u16) {
        self.write8(addr, value as u8);
        self.write8(addr.wrapping_add(1), (value >> 8) as u8);
    }

    fn push(&mut self, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.write16(self.regs.sp, value);
    }

    fn pop(&mut self) -> u16 {
        let value = self.read16(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    fn port_in(&mut self, port: u8) -> u8 {
        self.accesses.push(DataAccess::PortRead(port));
        self.port_input[port as usize]
    }

    fn port_out(&mut self, port: u8, value: u8) {
        self.accesses.push(DataAccess::PortWrite(port));
        self.port_output.push((port, value));
    }

    fn reg(&mut self, idx: u8) -> u8 {
        if idx == 6 {
            return self.read8(self.regs.hl);
        }
        let r = &self.regs;
        match idx {
            0 => (r.bc >> 8) as u8,
            1 => r.bc as u8,
            2 => (r.de >> 8) as u8,
            3 => r.de as u8,
            4 => (r.hl >> 8) as u8,
            5 => r.hl as u8,
            _ => r.a(),
        }
    }

    fn set_reg(&mut self, idx: u8, value: u8) {
        fn hi(pair: &mut u16, v: u8) {
            *pair = (*pair & 0x00ff) | ((v as u16) << 8);
        }
        fn lo(pair: &mut u16, v: u8) {
            *pair = (*pair & 0xff00) | v as u16;
        }
        match idx {
            0 => hi(&mut self.regs.bc, value),
            1 => lo(&mut self.regs.bc, value),
            2 => hi(&mut self.regs.de, value),
            3 => lo(&mut self.regs.de, value),
            4 => hi(&mut self.regs.hl, value),
            5 => lo(&mut self.regs.hl, value),
            6 => self.write8(self.regs.hl, value),
            _ => self.regs.set_a(value),
        }
    }

    fn rp(&self, p: u8) -> u16 {
        match p {
            0 => self.regs.bc,
            1 => self.regs.de,
            2 => self.regs.hl,
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, p: u8, value: u16) {
        match p {
            0 => self.regs.bc = value,
            1 => self.regs.de = value,
            2 => self.regs.hl = value,
            _ => self.regs.sp = value,
        }
    }

    fn rp2(&self, p: u8) -> u16 {
        if p == 3 {
            self.regs.af
        } else {
            self.rp(p)
        }
    }

    fn set_rp2(&mut self, p: u8, value: u16) {
        if p == 3 {
            self.regs.af = value;
        } else {
            self.set_rp(p, value);
        }
    }

    fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f();
        match cc {
            0 => f & FLAG_Z == 0,
            1 => f & FLAG_Z != 0,
            2 => f & FLAG_C == 0,
            3 => f & FLAG_C != 0,
            4 => f & FLAG_PV == 0,
            5 => f & FLAG_PV != 0,
            6 => f & FLAG_S == 0,
            _ => f & FLAG_S != 0,
        }
    }

    fn jump_relative(&mut self, d: i8) {
        self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
    }

    fn alu(&mut self, op: u8, value: u8) {
        let a = self.regs.a();
        let carry = (self.regs.f() & FLAG_C) as u16;
        let sz = |v: u8| (v & FLAG_S) | if v == 0 { FLAG_Z } else { 0 };
        let parity = |v: u8| if v.count_ones() % 2 == 0 { FLAG_PV } else { 0 };

        match op {
            0 | 1 => {
                let c = if op == 1 { carry } else { 0 };
                let wide = a as u16 + value as u16 + c;
                let r = wide as u8;
                let overflow = if (a ^ r) & (value ^ r) & 0x80 != 0 { FLAG_PV } else { 0 };
                let cf = if wide > 0xff { FLAG_C } else { 0 };
                self.regs.set_a(r);
                self.regs.set_f(sz(r) | overflow | cf);
            }
            2 | 3 | 7 => {
                let c = if op == 3 { carry } else { 0 };
                let wide = (a as u16).wrapping_sub(value as u16).wrapping_sub(c);
                let r = wide as u8;
                let overflow = if (a ^ value) & (a ^ r) & 0x80 != 0 { FLAG_PV } else { 0 };
                let cf = if wide > 0xff { FLAG_C } else { 0 };
                if op != 7 {
                    self.regs.set_a(r);
                }
                self.regs.set_f(sz(r) | overflow | cf | FLAG_N);
            }
            4 => {
                let r = a & value;
                self.regs.set_a(r);
                self.regs.set_f(sz(r) | parity(r) | FLAG_H);
            }
            5 => {
                let r = a ^ value;
                self.regs.set_a(r);
                self.regs.set_f(sz(r) | parity(r));
            }
            _ => {
                let r = a | value;
                self.regs.set_a(r);
                self.regs.set_f(sz(r) | parity(r));
            }
        }
    }

    fn inc_dec(&mut self, idx: u8, dec: bool) {
        let v = self.reg(idx);
        let r = if dec { v.wrapping_sub(1) } else { v.wrapping_add(1) };
        self.set_reg(idx, r);
        let keep = self.regs.f() & FLAG_C;
        let overflow = match (dec, r) {
            (false, 0x80) | (true, 0x7f) => FLAG_PV,
            _ => 0,
        };
        let n = if dec { FLAG_N } else { 0 };
        let zero = if r == 0 { FLAG_Z } else { 0 };
        self.regs.set_f(keep | (r & FLAG_S) | zero | overflow | n);
    }

    /// プレフィックスなし命令を実行する。未実装なら false
    fn exec_main(&mut self, op: u8) -> bool {
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (op >> 6, z) {
            (0, 0) => match y {
                0 => true,
                1 => false,
                2 => {
                    let d = self.fetch8() as i8;
                    let b = ((self.regs.bc >> 8) as u8).wrapping_sub(1);
                    self.set_reg(0, b);
                    if b != 0 {
                        self.jump_relative(d);
                    }
                    true
                }
                3 => {
                    let d = self.fetch8() as i8;
                    self.jump_relative(d);
                    true
                }
                _ => {
                    let d = self.fetch8() as i8;
                    if self.condition(y - 4) {
                        self.jump_relative(d);
                    }
                    true
                }
            },
            (0, 1) => {
                if q == 0 {
                    let nn = self.fetch16();
                    self.set_rp(p, nn);
                } else {
                    let wide = self.regs.hl as u32 + self.rp(p) as u32;
                    self.regs.hl = wide as u16;
                    let f = self.regs.f() & (FLAG_S | FLAG_Z | FLAG_PV);
                    self.regs.set_f(f | if wide > 0xffff { FLAG_C } else { 0 });
                }
                true
            }
            (0, 2) => {
                match (q, p) {
                    (0, 0) => self.write8(self.regs.bc, self.regs.a()),
                    (0, 1) => self.write8(self.regs.de, self.regs.a()),
                    (0, 2) => {
                        let nn = self.fetch16();
                        self.write16(nn, self.regs.hl);
                    }
                    (0, _) => {
                        let nn = self.fetch16();
                        self.write8(nn, self.regs.a());
                    }
                    (_, 0) => {
                        let v = self.read8(self.regs.bc);
                        self.regs.set_a(v);
                    }
                    (_, 1) => {
                        let v = self.read8(self.regs.de);
                        self.regs.set_a(v);
                    }
                    (_, 2) => {
                        let nn = self.fetch16();
                        self.regs.hl = self.read16(nn);
                    }
                    _ => {
                        let nn = self.fetch16();
                        let v = self.read8(nn);
                        self.regs.set_a(v);
                    }
                }
                true
            }
            (0, 3) => {
                let v = self.rp(p);
                let v = if q == 0 { v.wrapping_add(1) } else { v.wrapping_sub(1) };
                self.set_rp(p, v);
                true
            }
            (0, 4) => {
                self.inc_dec(y, false);
                true
            }
            (0, 5) => {
                self.inc_dec(y, true);
                true
            }
            (0, 6) => {
                let n = self.fetch8();
                self.set_reg(y, n);
                true
            }
            (0, _) => match y {
                5 => {
                    let a = !self.regs.a();
                    self.regs.set_a(a);
                    self.regs.set_f(self.regs.f() | FLAG_H | FLAG_N);
                    true
                }
                6 => {
                    self.regs.set_f((self.regs.f() & (FLAG_S | FLAG_Z | FLAG_PV)) | FLAG_C);
                    true
                }
                7 => {
                    let f = self.regs.f();
                    self.regs.set_f((f & (FLAG_S | FLAG_Z | FLAG_PV)) | ((f & FLAG_C) ^ FLAG_C));
                    true
                }
                _ => false,
            },
            (1, _) => {
                if y == 6 && z == 6 {
                    self.regs.halted = true;
                } else {
                    let v = self.reg(z);
                    self.set_reg(y, v);
                }
                true
            }
            (2, _) => {
                let v = self.reg(z);
                self.alu(y, v);
                true
            }
            (_, 0) => {
                if self.condition(y) {
                    self.regs.pc = self.pop();
                }
                true
            }
            (_, 1) => {
                if q == 0 {
                    let v = self.pop();
                    self.set_rp2(p, v);
                    return true;
                }
                match p {
                    0 => {
                        self.regs.pc = self.pop();
                        true
                    }
                    2 => {
                        self.regs.pc = self.regs.hl;
                        true
                    }
                    3 => {
                        self.regs.sp = self.regs.hl;
                        true
                    }
                    _ => false,
                }
            }
            (_, 2) => {
                let nn = self.fetch16();
                if self.condition(y) {
                    self.regs.pc = nn;
                }
                true
            }
            (_, 3) => match y {
                0 => {
                    self.regs.pc = self.fetch16();
                    true
                }
                2 => {
                    let n = self.fetch8();
                    self.port_out(n, self.regs.a());
                    true
                }
                3 => {
                    let n = self.fetch8();
                    let v = self.port_in(n);
                    self.regs.set_a(v);
                    true
                }
                5 => {
                    std::mem::swap(&mut self.regs.de, &mut self.regs.hl);
                    true
                }
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                    true
                }
                7 => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                    true
                }
                _ => false,
            },
            (_, 4) => {
                let nn = self.fetch16();
                if self.condition(y) {
                    self.push(self.regs.pc);
                    self.regs.pc = nn;
                }
                true
            }
            (_, 5) => {
                if q == 0 {
                    self.push(self.rp2(p));
                    true
                } else if p == 0 {
                    let nn = self.fetch16();
                    self.push(self.regs.pc);
                    self.regs.pc = nn;
                    true
                } else {
                    false
                }
            }
            (_, 6) => {
                let n = self.fetch8();
                self.alu(y, n);
                true
            }
            _ => {
                self.push(self.regs.pc);
                self.regs.pc = (y as u16) * 8;
                true
            }
        }
    }

    /// EDプレフィックス命令を実行する。未実装なら false
    fn exec_extended(&mut self, op: u8) -> bool {
        let y = (op >> 3) & 7;
        let p = y >> 1;
        match (op >> 6, op & 7) {
            (1, 3) => {
                let nn = self.fetch16();
                if y & 1 == 0 {
                    self.write16(nn, self.rp(p));
                } else {
                    let v = self.read16(nn);
                    self.set_rp(p, v);
                }
                true
            }
            (1, 4) => {
                let a = self.regs.a();
                self.regs.set_a(0);
                self.alu(2, a);
                true
            }
            (1, 5) => {
                // RETN / RETI
                self.regs.pc = self.pop();
                self.regs.iff1 = self.regs.iff2;
                true
            }
            _ => false,
        }
    }

    /// DD/FDプレフィックス命令を実行する。未実装なら false
    fn exec_indexed(&mut self, prefix: u8, op: u8) -> bool {
        let index = if prefix == 0xdd { self.regs.ix } else { self.regs.iy };
        let set_index = |core: &mut Self, v: u16| {
            if prefix == 0xdd {
                core.regs.ix = v;
            } else {
                core.regs.iy = v;
            }
        };

        match op {
            0x21 => {
                let nn = self.fetch16();
                set_index(self, nn);
                true
            }
            0xe1 => {
                let v = self.pop();
                set_index(self, v);
                true
            }
            0xe5 => {
                self.push(index);
                true
            }
            0xe9 => {
                self.regs.pc = index;
                true
            }
            0xf9 => {
                self.regs.sp = index;
                true
            }
            _ => false,
        }
    }

    /// 1命令をデコード・実行し、オペコード値を返す
    fn step_instruction(&mut self) -> u32 {
        if self.regs.halted {
            return 0x76;
        }

        let start = self.regs.pc;
        let bytes = self.peek_bytes(start);
        let op = Self::opcode_value(bytes);
        let first = self.fetch8();

        let handled = match first {
            0xdd | 0xfd if !matches!(bytes[1], 0xdd | 0xfd | 0xed) => {
                let op = self.fetch8();
                self.exec_indexed(first, op)
            }
            0xdd | 0xfd => return first as u32,
            0xed => {
                let op = self.fetch8();
                self.exec_extended(op)
            }
            0xcb => false,
            _ => self.exec_main(first),
        };

        if !handled {
            self.regs.pc = start.wrapping_add(instruction_length(bytes) as u16);
        }
        op
    }

    fn service_interrupt(&mut self) {
        if !(self.interrupt_pending && self.regs.iff1) {
            return;
        }
        self.interrupt_pending = false;
        self.regs.halted = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.push(self.regs.pc);
        self.regs.pc = INTERRUPT_VECTOR;
        // 割り込み応答のスタック書き込みはブレークポイントの対象外
        self.accesses.clear();
    }

    /// 種類と値に一致するブレークポイントを集める
    fn matching(&self, kind: BreakKind, value: u32, logical: Option<u16>) -> Vec<CoreHandle> {
        self.breakpoints
            .iter()
            .filter(|(_, bp)| bp.kind == kind)
            .filter(|(_, bp)| match (bp.physical, logical) {
                (true, Some(addr)) => bp.covers(self.logical_to_physical(addr)),
                _ => bp.covers(value),
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn find(&self, handle: CoreHandle) -> Option<CoreBreakpoint> {
        self.breakpoints
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, bp)| *bp)
    }

    /// 一致したブレークポイントを評価し、停止すべきハンドルを返す
    fn evaluate(&mut self, tests: &mut dyn TriggerTest, hits: Vec<CoreHandle>, op: u32) -> Option<CoreHandle> {
        for handle in hits {
            // 先行するトリガーテストで解除されている場合がある
            let Some(bp) = self.find(handle) else {
                continue;
            };
            if !bp.tested || tests.test(self, handle, op) {
                return Some(handle);
            }
        }
        None
    }
}

impl Default for SimCore {
    fn default() -> Self {
        Self::new(Hardware::default())
    }
}

impl CpuCore for SimCore {
    fn add_breakpoint(&mut self, bp: CoreBreakpoint) -> Option<CoreHandle> {
        if bp.start > bp.end {
            return None;
        }
        if let Some(limit) = self.breakpoint_limit {
            if self.breakpoints.len() >= limit {
                return None;
            }
        }
        let handle = CoreHandle(self.next_handle);
        self.next_handle += 1;
        self.breakpoints.push((handle, bp));
        Some(handle)
    }

    fn remove_breakpoint(&mut self, handle: CoreHandle) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|(h, _)| *h != handle);
        self.breakpoints.len() != before
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn interrupt_pending(&self) -> bool {
        self.interrupt_pending
    }

    fn hardware(&self) -> Hardware {
        self.hw
    }

    fn logical_to_physical(&self, addr: u16) -> u32 {
        self.banks[(addr >> 14) as usize] + (addr as u32 & (PAGE_SIZE - 1))
    }

    fn read_physical(&self, addr: u32) -> u8 {
        self.memory.get(addr as usize).copied().unwrap_or(0)
    }

    fn execute(&mut self, tests: &mut dyn TriggerTest) -> ExecOutcome {
        let pc = self.regs.pc;
        let resumed = self.last_break_pc.take() == Some(pc);

        if !self.regs.halted && !resumed {
            let op = Self::opcode_value(self.peek_bytes(pc));
            let hits = self.matching(BreakKind::MemExec, pc as u32, Some(pc));
            if let Some(handle) = self.evaluate(tests, hits, op) {
                self.last_break_pc = Some(pc);
                return ExecOutcome::Break(handle);
            }
        }

        self.accesses.clear();
        let op = self.step_instruction();
        self.instructions += 1;

        let mut stop = None;
        let accesses = std::mem::take(&mut self.accesses);
        for access in accesses {
            let hits = match access {
                DataAccess::MemRead(addr) => self.matching(BreakKind::MemRead, addr as u32, Some(addr)),
                DataAccess::MemWrite(addr) => self.matching(BreakKind::MemWrite, addr as u32, Some(addr)),
                DataAccess::PortRead(port) => self.matching(BreakKind::PortRead, port as u32, None),
                DataAccess::PortWrite(port) => self.matching(BreakKind::PortWrite, port as u32, None),
            };
            stop = self.evaluate(tests, hits, op);
            if stop.is_some() {
                break;
            }
        }

        if stop.is_none() {
            let hits = self.matching(BreakKind::Execute, op, None);
            stop = self.evaluate(tests, hits, op);
        }

        self.service_interrupt();

        match stop {
            Some(handle) => {
                self.last_break_pc = Some(self.regs.pc);
                ExecOutcome::Break(handle)
            }
            None => ExecOutcome::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 検査付きブレークポイントで常に停止するテスト
    struct AlwaysStop;

    impl TriggerTest for AlwaysStop {
        fn test(&mut self, _core: &mut dyn CpuCore, _handle: CoreHandle, _op: u32) -> bool {
            true
        }
    }

    fn run(core: &mut SimCore, count: usize) {
        for _ in 0..count {
            core.execute(&mut AlwaysStop);
        }
    }

    #[test]
    fn test_call_and_ret() {
        let mut core = SimCore::default();
        // 9000: call 9010 / 9003: halt / 9010: ld a,$42 / ret
        core.load_logical(0x9000, &[0xcd, 0x10, 0x90, 0x76]);
        core.load_logical(0x9010, &[0x3e, 0x42, 0xc9]);
        core.regs_mut().pc = 0x9000;

        run(&mut core, 1);
        assert_eq!(core.registers().pc, 0x9010);
        assert_eq!(core.registers().sp, 0xffee);
        assert_eq!(core.read_word(0xffee), 0x9003);

        run(&mut core, 2);
        assert_eq!(core.registers().pc, 0x9003);
        assert_eq!(core.registers().a(), 0x42);
        assert_eq!(core.registers().sp, 0xfff0);
    }

    #[test]
    fn test_exec_breakpoint_stops_before_fetch_and_resumes() {
        let mut core = SimCore::default();
        core.load_logical(0x9000, &[0x00, 0x00, 0x00]);
        core.regs_mut().pc = 0x9000;
        let handle = core
            .add_breakpoint(CoreBreakpoint::new(BreakKind::MemExec, 0x9001, 0x9001, 0xffff))
            .unwrap();

        assert_eq!(core.execute(&mut AlwaysStop), ExecOutcome::Continue);
        assert_eq!(core.execute(&mut AlwaysStop), ExecOutcome::Break(handle));
        assert_eq!(core.registers().pc, 0x9001);
        // 同じPCから再開すると一度だけ無視される
        assert_eq!(core.execute(&mut AlwaysStop), ExecOutcome::Continue);
        assert_eq!(core.registers().pc, 0x9002);
    }

    #[test]
    fn test_physical_write_breakpoint() {
        let mut core = SimCore::default();
        // ld a,$55 / ld ($8000),a
        core.load_logical(0x9000, &[0x3e, 0x55, 0x32, 0x00, 0x80]);
        core.regs_mut().pc = 0x9000;
        let phys = core.logical_to_physical(0x8000);
        let handle = core
            .add_breakpoint(CoreBreakpoint::new(BreakKind::MemWrite, phys, phys, u32::MAX).physical())
            .unwrap();

        assert_eq!(core.execute(&mut AlwaysStop), ExecOutcome::Continue);
        assert_eq!(core.execute(&mut AlwaysStop), ExecOutcome::Break(handle));
        assert_eq!(core.read_logical(0x8000), 0x55);
    }

    #[test]
    fn test_port_breakpoint_and_output() {
        let mut core = SimCore::default();
        // ld a,$01 / out ($10),a
        core.load_logical(0x9000, &[0x3e, 0x01, 0xd3, 0x10]);
        core.regs_mut().pc = 0x9000;
        let handle = core
            .add_breakpoint(CoreBreakpoint::new(BreakKind::PortWrite, 0x10, 0x10, 0xff))
            .unwrap();

        run(&mut core, 1);
        assert_eq!(core.execute(&mut AlwaysStop), ExecOutcome::Break(handle));
        assert_eq!(core.port_output(), &[(0x10, 0x01)]);
    }

    #[test]
    fn test_halt_waits_for_interrupt() {
        let mut core = SimCore::default();
        // ei / halt
        core.load_logical(0x9000, &[0xfb, 0x76]);
        core.regs_mut().pc = 0x9000;

        run(&mut core, 4);
        assert!(core.registers().halted);
        assert_eq!(core.registers().pc, 0x9002);

        core.raise_interrupt();
        run(&mut core, 1);
        assert!(!core.registers().halted);
        assert_eq!(core.registers().pc, INTERRUPT_VECTOR);
        assert_eq!(core.read_word(core.registers().sp), 0x9002);
    }

    #[test]
    fn test_breakpoint_limit_rejects() {
        let mut core = SimCore::default();
        core.set_breakpoint_limit(Some(1));
        let bp = CoreBreakpoint::new(BreakKind::MemExec, 0, 0, 0xffff);
        assert!(core.add_breakpoint(bp).is_some());
        assert!(core.add_breakpoint(bp).is_none());
        assert_eq!(core.breakpoint_count(), 1);
    }

    #[test]
    fn test_banked_translation() {
        let core = SimCore::default();
        let hw = core.hardware();
        assert_eq!(core.logical_to_physical(0x0010), 0x0010);
        assert_eq!(core.logical_to_physical(0x8000), hw.rom_size + PAGE_SIZE);
        assert_eq!(core.logical_to_physical(0xc001), hw.rom_size + 1);
    }
}
