//! 逆アセンブル表示のカーソル
//!
//! 可変長命令の列の中で表示の先頭行と選択行を移動します。
//! 命令境界は逆アセンブラに問い合わせて求めます。

use zdb_target::{AddressView, CpuCore, DisassemblyService};

/// 後方探索で遡る最大バイト数
const MAX_LOOKBACK: u32 = 6;

/// 命令境界の計算に必要なもの一式
#[derive(Clone, Copy)]
pub struct Navigator<'a> {
    pub core: &'a dyn CpuCore,
    pub disasm: &'a dyn DisassemblyService,
    pub view: AddressView,
}

impl<'a> Navigator<'a> {
    pub fn new(core: &'a dyn CpuCore, disasm: &'a dyn DisassemblyService, view: AddressView) -> Self {
        Self { core, disasm, view }
    }

    /// 次の命令のアドレス
    ///
    /// 逆アセンブルできない、または進まない場合は `addr + 1`。
    pub fn next_addr(&self, addr: u32) -> u32 {
        let next = match self.disasm.disassemble(self.core, addr, self.view) {
            Some((next, _)) if next & self.view.mask() != addr & self.view.mask() => next,
            _ => addr.wrapping_add(1),
        };
        next & self.view.mask()
    }

    /// 前の命令のアドレス
    ///
    /// 最大6バイト手前の各候補から順に（遠い方から）逆アセンブルを進め、
    /// ちょうど `addr` に到達した場合はその直前の命令を返します。
    /// どの候補も到達しない場合は `addr - 1` で近似します。
    pub fn prev_addr(&self, addr: u32) -> u32 {
        let addr = addr & self.view.mask();
        if addr == 0 {
            return 0;
        }

        for back in (1..=MAX_LOOKBACK.min(addr)).rev() {
            let mut pos = addr - back;
            let mut last = pos;
            while pos < addr {
                last = pos;
                pos += self.length_at(pos);
            }
            if pos == addr {
                return last;
            }
        }
        addr - 1
    }

    /// `addr` の命令長（折り返しを含まない）
    fn length_at(&self, addr: u32) -> u32 {
        let next = self.next_addr(addr);
        next.wrapping_sub(addr) & self.view.mask()
    }

    /// `base` から `lines` 行の中で `addr` が表示される行
    pub fn line_for_addr(&self, base: u32, lines: usize, addr: u32) -> Option<usize> {
        let target = addr & self.view.mask();
        let mut pos = base & self.view.mask();
        for line in 0..lines {
            if pos == target {
                return Some(line);
            }
            pos = self.next_addr(pos);
        }
        None
    }

    /// `base` から `line` 行目のアドレス
    pub fn addr_at_line(&self, base: u32, line: usize) -> u32 {
        (0..line).fold(base & self.view.mask(), |pos, _| self.next_addr(pos))
    }
}

/// カーソルの移動方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    Up,
    Down,
}

/// 表示の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmLine {
    pub addr: u32,
    pub text: String,
    pub is_pc: bool,
    pub has_breakpoint: bool,
    pub selected: bool,
}

/// 逆アセンブル表示のカーソル
#[derive(Debug, Clone)]
pub struct DisassemblyCursor {
    base: u32,
    selected: u32,
    lines: usize,
    follow_pc: bool,
    view: AddressView,
}

impl DisassemblyCursor {
    /// 表示行数と表示モードを指定して作成する（PC追従で開始）
    pub fn new(lines: usize, view: AddressView) -> Self {
        Self {
            base: 0,
            selected: 0,
            lines: lines.max(1),
            follow_pc: true,
            view,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn selected(&self) -> u32 {
        self.selected
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn view(&self) -> AddressView {
        self.view
    }

    pub fn follows_pc(&self) -> bool {
        self.follow_pc
    }

    /// 表示モードを切り替える（PC追従に戻る）
    pub fn set_view(&mut self, view: AddressView) {
        self.view = view;
        self.follow_pc = true;
    }

    fn is_visible(&self, nav: &Navigator<'_>, addr: u32) -> bool {
        nav.line_for_addr(self.base, self.lines, addr).is_some()
    }

    /// 表示を `delta` 行スクロールする
    ///
    /// 選択行が表示範囲から外れた場合は先頭行に移ります。
    pub fn scroll(&mut self, nav: &Navigator<'_>, delta: i32) {
        for _ in 0..delta.unsigned_abs() {
            self.base = if delta > 0 {
                nav.next_addr(self.base)
            } else {
                nav.prev_addr(self.base)
            };
        }
        if !self.is_visible(nav, self.selected) {
            self.selected = self.base;
        }
        self.follow_pc = false;
    }

    /// 選択行を1命令移動する
    ///
    /// 選択行が表示範囲から外れた場合は表示がそれに合わせて移動します。
    pub fn move_cursor(&mut self, nav: &Navigator<'_>, dir: CursorMove) {
        self.selected = match dir {
            CursorMove::Up => nav.prev_addr(self.selected),
            CursorMove::Down => nav.next_addr(self.selected),
        };
        if !self.is_visible(nav, self.selected) {
            self.base = self.selected;
        }
        self.follow_pc = false;
    }

    /// 指定アドレスを先頭・選択行にする
    pub fn go_to(&mut self, addr: u32) {
        self.base = addr & self.view.mask();
        self.selected = self.base;
        self.follow_pc = false;
    }

    /// PCを表示する（以後PCに追従する）
    pub fn go_to_pc(&mut self, pc: u32) {
        self.base = pc & self.view.mask();
        self.selected = self.base;
        self.follow_pc = true;
    }

    /// PC追従中なら、表示前に選択行をPCに合わせる
    pub fn sync(&mut self, nav: &Navigator<'_>, pc: u32) {
        if !self.follow_pc {
            return;
        }
        self.selected = pc & self.view.mask();
        if !self.is_visible(nav, self.selected) {
            self.base = self.selected;
        }
    }

    /// 表示範囲の各行
    pub fn rows(&self, nav: &Navigator<'_>, pc: u32, has_breakpoint: impl Fn(u32) -> bool) -> Vec<DisasmLine> {
        let mut rows = Vec::with_capacity(self.lines);
        let mut addr = self.base;
        for _ in 0..self.lines {
            let text = match nav.disasm.disassemble(nav.core, addr, nav.view) {
                Some((_, text)) => text,
                None => "??".to_string(),
            };
            rows.push(DisasmLine {
                addr,
                text,
                is_pc: addr == pc & self.view.mask(),
                has_breakpoint: has_breakpoint(addr),
                selected: addr == self.selected,
            });
            addr = nav.next_addr(addr);
        }
        rows
    }
}
