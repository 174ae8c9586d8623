//! デバッガのメインロジック

use crate::codec::{BreakpointCodec, ParseContext};
use crate::cursor::{CursorMove, DisasmLine, DisassemblyCursor, Navigator};
use crate::errors::{BreakpointParseError, ERR_BREAKPOINT_NOT_FOUND, ERR_NO_TARGET};
use crate::parse::{parse_number, parse_physical};
use crate::{matcher, Breakpoint, BreakpointId, DebuggerConfig, Emulator, Machine, Result, Space, Toggle};
use anyhow::bail;
use std::path::Path;
use zdb_target::{AddressView, CpuCore, Hardware, Registers, Z80Disassembler};

/// デバッガ
///
/// ブレークポイント・ステップ実行・逆アセンブル表示の操作をまとめます。
/// 各操作はエミュレータのロックを取得してから行い、ロック外に参照を持ち出しません。
pub struct Debugger {
    /// エミュレータ（ワーカースレッドと共有）
    emulator: Emulator,
    /// 逆アセンブラとシンボル表
    disasm: Z80Disassembler,
    /// ブレークポイントのテキスト形式（直前の種類・モードを保持）
    codec: BreakpointCodec,
    /// 逆アセンブル表示のカーソル
    cursor: DisassemblyCursor,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new(emulator: Emulator, config: DebuggerConfig) -> Self {
        let mut debugger = Self {
            emulator,
            disasm: Z80Disassembler::new(),
            codec: BreakpointCodec::new(config.default_space, config.default_access),
            cursor: DisassemblyCursor::new(config.disasm_lines, config.view),
        };
        debugger.go_to_pc();
        debugger
    }

    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    pub fn disassembler(&self) -> &Z80Disassembler {
        &self.disasm
    }

    pub fn codec(&self) -> &BreakpointCodec {
        &self.codec
    }

    pub fn cursor(&self) -> &DisassemblyCursor {
        &self.cursor
    }

    /// 表示モードに対応するブレークポイントの空間
    fn view_space(&self) -> Space {
        match self.cursor.view() {
            AddressView::Logical => Space::Logical,
            AddressView::Physical => Space::Physical,
        }
    }

    /// CPUコアを接続する（以前のコアのブレークポイントは全て解除される）
    pub fn attach_core(&mut self, core: Box<dyn CpuCore>) {
        self.emulator.with(|m| m.replace_core(Some(core)));
        self.go_to_pc();
    }

    /// エミュレータのコアが変わったときに呼ぶ
    ///
    /// ブレークポイントとステップセッションを全て解除し、表示をPCに戻します。
    pub fn core_changed(&mut self) {
        self.emulator.with(Machine::reset_breakpoints);
        self.go_to_pc();
    }

    /// シンボルファイルを読み込む
    pub fn load_symbols<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        self.disasm.load_symbols(path)
    }

    /// 現在のレジスタ
    pub fn registers(&self) -> Option<Registers> {
        self.emulator.lock().core().map(|core| core.registers())
    }

    /// 表示中のアドレス空間での実行ブレークポイントを切り替える
    pub fn toggle_breakpoint(&mut self, addr: u32) -> Option<Toggle> {
        let space = self.view_space();
        let mut machine = self.emulator.lock();
        let Some((core, store)) = machine.store_mut() else {
            tracing::debug!("{}", ERR_NO_TARGET);
            return None;
        };

        let toggle = store.toggle_at(core, addr, space);
        if let Toggle::Added(id) = toggle {
            if let Some(entry) = store.get(id) {
                self.codec.remember(entry.breakpoint());
            }
        }
        Some(toggle)
    }

    /// 選択行の実行ブレークポイントを切り替える
    pub fn toggle_at_cursor(&mut self) -> Option<Toggle> {
        self.toggle_breakpoint(self.cursor.selected())
    }

    /// テキストからブレークポイントを追加、または既存のものを置き換える
    ///
    /// 存在しないIDを指定した場合は新規に追加します。
    /// コアが接続されていない場合は何もせず `Ok(None)` を返します。
    pub fn add_or_edit_breakpoint(
        &mut self,
        text: &str,
        existing: Option<BreakpointId>,
    ) -> std::result::Result<Option<BreakpointId>, BreakpointParseError> {
        let mut machine = self.emulator.lock();
        let ctx = ParseContext {
            labels: Some(&self.disasm),
            hardware: machine.core().map(|core| core.hardware()),
        };
        let bp = self.codec.parse(text, &ctx)?;

        let Some((core, store)) = machine.store_mut() else {
            tracing::debug!("{}", ERR_NO_TARGET);
            return Ok(None);
        };
        let id = match existing {
            Some(id) if store.replace(core, id, bp) => id,
            _ => store.add(core, bp),
        };
        self.codec.remember(&bp);
        Ok(Some(id))
    }

    /// ブレークポイントを削除する
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<()> {
        let mut machine = self.emulator.lock();
        let Some((core, store)) = machine.store_mut() else {
            bail!(ERR_NO_TARGET);
        };
        if !store.remove(core, id) {
            bail!("{} ({})", ERR_BREAKPOINT_NOT_FOUND, id);
        }
        Ok(())
    }

    /// ブレークポイントの有効・無効を切り替える
    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<()> {
        let mut machine = self.emulator.lock();
        let Some((core, store)) = machine.store_mut() else {
            bail!(ERR_NO_TARGET);
        };
        if !store.set_enabled(core, id, enabled) {
            bail!("{} ({})", ERR_BREAKPOINT_NOT_FOUND, id);
        }
        Ok(())
    }

    /// ブレークポイントをテキスト形式で取得する
    pub fn format_breakpoint(&self, id: BreakpointId) -> Option<String> {
        let machine = self.emulator.lock();
        machine
            .store()
            .get(id)
            .map(|entry| BreakpointCodec::format(entry.breakpoint()))
    }

    /// 全てのブレークポイントのIDと定義（コアのハンドルは含まない）
    pub fn breakpoints(&self) -> Vec<(BreakpointId, Breakpoint)> {
        self.emulator
            .lock()
            .store()
            .iter()
            .map(|entry| (entry.id(), *entry.breakpoint()))
            .collect()
    }

    /// 接続中のコアのメモリ構成
    pub fn hardware(&self) -> Option<Hardware> {
        self.emulator.lock().core().map(|core| core.hardware())
    }

    /// 新規ブレークポイントの入力欄に表示する初期テキスト
    pub fn breakpoint_template(&self) -> String {
        match self.cursor.view() {
            AddressView::Logical => format!("logical x {:04X}", self.cursor.selected()),
            AddressView::Physical => {
                let width = self.hardware().map_or(6, |hw| hw.address_width());
                format!("physical x {:0w$X}", self.cursor.selected(), w = width)
            }
        }
    }

    /// 1命令実行する
    pub fn step_into(&self) -> bool {
        self.emulator.with(Machine::step_into)
    }

    /// 現在の命令を実行し、呼び出したサブルーチンからは戻るまで実行する
    pub fn step_over(&self) -> bool {
        let disasm = &self.disasm;
        self.emulator.with(|m| m.step_over(disasm))
    }

    /// 現在のサブルーチンから戻るまで実行する
    pub fn finish(&self) -> bool {
        self.emulator.with(Machine::finish)
    }

    /// 実行を再開する
    pub fn run(&self) {
        self.emulator.run();
    }

    /// 実行を停止する
    pub fn pause(&self) {
        self.emulator.pause();
    }

    /// PCを表示してPCに追従する
    pub fn go_to_pc(&mut self) {
        let space = self.view_space();
        let machine = self.emulator.lock();
        if let Some(core) = machine.core() {
            let pc = matcher::normalize(core.registers().pc, space, core);
            self.cursor.go_to_pc(pc);
        }
    }

    /// スタック上の `pos` 番目の値を表示する（負ならPC）
    pub fn go_to_stack(&mut self, pos: i32) {
        if pos < 0 {
            self.go_to_pc();
            return;
        }

        let space = self.view_space();
        let machine = self.emulator.lock();
        let Some(core) = machine.core() else {
            return;
        };
        let slot = core.registers().sp.wrapping_add((pos as u16).wrapping_mul(2));
        let addr = core.read_word(slot);
        self.cursor.go_to(matcher::normalize(addr, space, core));
    }

    /// アドレス・ラベル（物理表示では `PAGE:OFFSET` も可）を表示する
    pub fn go_to(&mut self, text: &str) -> std::result::Result<(), BreakpointParseError> {
        let text = text.trim();
        let machine = self.emulator.lock();
        let hardware = machine.core().map(|core| core.hardware());

        let addr = match (self.cursor.view(), hardware) {
            (AddressView::Physical, Some(hw)) if text.contains(':') => parse_physical(text, &hw, Some(&self.disasm)),
            _ => parse_number(text, Some(&self.disasm)),
        };
        let addr = addr.ok_or_else(|| BreakpointParseError::InvalidAddress(text.to_string()))?;
        self.cursor.go_to(addr);
        Ok(())
    }

    /// 表示をスクロールする
    pub fn scroll(&mut self, delta: i32) {
        let machine = self.emulator.lock();
        if let Some(core) = machine.core() {
            let nav = Navigator::new(core, &self.disasm, self.cursor.view());
            self.cursor.scroll(&nav, delta);
        }
    }

    /// 選択行を移動する
    pub fn move_cursor(&mut self, dir: CursorMove) {
        let machine = self.emulator.lock();
        if let Some(core) = machine.core() {
            let nav = Navigator::new(core, &self.disasm, self.cursor.view());
            self.cursor.move_cursor(&nav, dir);
        }
    }

    /// 表示モードを切り替える
    pub fn set_view(&mut self, view: AddressView) {
        self.cursor.set_view(view);
        self.go_to_pc();
    }

    /// 現在の表示範囲を逆アセンブルする
    pub fn disassembly(&mut self) -> Vec<DisasmLine> {
        let space = self.view_space();
        let machine = self.emulator.lock();
        let Some(core) = machine.core() else {
            return Vec::new();
        };

        let nav = Navigator::new(core, &self.disasm, self.cursor.view());
        let pc = matcher::normalize(core.registers().pc, space, core);
        self.cursor.sync(&nav, pc);

        let store = machine.store();
        self.cursor
            .rows(&nav, pc, |addr| store.find_exec_match(addr, space).is_some())
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.emulator.with(Machine::reset_breakpoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Access;
    use zdb_target::SimCore;

    fn debugger_with(code: &[u8]) -> Debugger {
        let mut core = SimCore::default();
        core.load_logical(0x9000, code);
        core.regs_mut().pc = 0x9000;
        Debugger::new(Emulator::new(Some(Box::new(core))), DebuggerConfig::default())
    }

    #[test]
    fn test_toggle_and_codec_defaults() {
        let mut debugger = debugger_with(&[0x00; 4]);
        debugger.add_or_edit_breakpoint("io w 10", None).unwrap();
        assert_eq!(debugger.codec().last_space(), Space::Port);

        let toggle = debugger.toggle_breakpoint(0x9000);
        assert!(matches!(toggle, Some(Toggle::Added(_))));
        assert_eq!(debugger.codec().last_space(), Space::Logical);
        assert_eq!(debugger.codec().last_access(), Access::EXEC);

        assert!(matches!(debugger.toggle_breakpoint(0x9000), Some(Toggle::Removed(_))));
        assert_eq!(debugger.breakpoints().len(), 1);
    }

    #[test]
    fn test_edit_preserves_id_and_unknown_id_appends() {
        let mut debugger = debugger_with(&[0x00; 4]);
        let id = debugger.add_or_edit_breakpoint("l x 9000", None).unwrap().unwrap();
        debugger.set_enabled(id, false).unwrap();

        let edited = debugger.add_or_edit_breakpoint("l rw 8000-80ff", Some(id)).unwrap();
        assert_eq!(edited, Some(id));
        assert_eq!(debugger.format_breakpoint(id).unwrap(), "L RW 8000-80FF (disabled)");

        let appended = debugger.add_or_edit_breakpoint("l x 9100", Some(42)).unwrap().unwrap();
        assert_ne!(appended, 42);
        assert_eq!(debugger.breakpoints().len(), 2);
    }

    #[test]
    fn test_unknown_id_reports_not_found() {
        let mut debugger = debugger_with(&[0x00; 4]);
        let id = debugger.add_or_edit_breakpoint("l x 9000", None).unwrap().unwrap();

        let err = debugger.remove_breakpoint(id + 1).unwrap_err();
        assert!(err.to_string().starts_with(ERR_BREAKPOINT_NOT_FOUND));
        let err = debugger.set_enabled(id + 1, false).unwrap_err();
        assert!(err.to_string().starts_with(ERR_BREAKPOINT_NOT_FOUND));

        debugger.remove_breakpoint(id).unwrap();
        assert!(debugger.remove_breakpoint(id).is_err());

        let mut detached = Debugger::new(Emulator::new(None), DebuggerConfig::default());
        assert_eq!(detached.remove_breakpoint(1).unwrap_err().to_string(), ERR_NO_TARGET);
    }

    #[test]
    fn test_breakpoint_template_follows_view() {
        let mut debugger = debugger_with(&[0x00; 4]);
        assert_eq!(debugger.breakpoint_template(), "logical x 9000");

        debugger.set_view(AddressView::Physical);
        let pc = debugger.cursor().selected();
        assert_eq!(debugger.hardware().unwrap().address_width(), 6);
        assert_eq!(debugger.breakpoint_template(), format!("physical x {:06X}", pc));

        let template = debugger.breakpoint_template();
        let id = debugger.add_or_edit_breakpoint(&template, None).unwrap().unwrap();
        let (first, bp) = debugger.breakpoints()[0];
        assert_eq!(first, id);
        assert_eq!((bp.space, bp.start, bp.end), (Space::Physical, pc, pc));
    }

    #[test]
    fn test_parse_error_leaves_store_untouched() {
        let mut debugger = debugger_with(&[0x00; 4]);
        let err = debugger.add_or_edit_breakpoint("l 9000-8000", None).unwrap_err();
        assert_eq!(err.to_string(), "End < start in '9000-8000'");
        assert!(debugger.breakpoints().is_empty());
    }

    #[test]
    fn test_no_core_is_a_noop() {
        let mut debugger = Debugger::new(Emulator::new(None), DebuggerConfig::default());
        assert_eq!(debugger.toggle_breakpoint(0x9000), None);
        assert_eq!(debugger.add_or_edit_breakpoint("l x 9000", None), Ok(None));
        assert!(!debugger.step_into());
        assert!(!debugger.step_over());
        assert!(!debugger.finish());
        assert!(debugger.disassembly().is_empty());
    }

    #[test]
    fn test_disassembly_marks_breakpoints() {
        // ld a,$01 / nop / nop
        let mut debugger = debugger_with(&[0x3e, 0x01, 0x00, 0x00]);
        debugger.toggle_breakpoint(0x9002);

        let rows = debugger.disassembly();
        assert_eq!(rows[0].addr, 0x9000);
        assert!(rows[0].is_pc);
        assert!(!rows[0].has_breakpoint);
        assert_eq!(rows[1].addr, 0x9002);
        assert!(rows[1].has_breakpoint);
    }

    #[test]
    fn test_physical_view_uses_physical_space() {
        let mut debugger = debugger_with(&[0x00; 4]);
        debugger.set_view(AddressView::Physical);
        let pc = debugger.cursor().selected();
        assert!(pc > 0xffff);

        debugger.toggle_at_cursor();
        let (_, bp) = debugger.breakpoints()[0];
        assert_eq!(bp.space, Space::Physical);
        assert_eq!((bp.start, bp.mask), (pc, 0xffff_ffff));
        assert!(debugger.disassembly()[0].has_breakpoint);
    }

    #[test]
    fn test_go_to_stack_and_labels() {
        let mut core = SimCore::default();
        core.regs_mut().pc = 0x9000;
        core.regs_mut().sp = 0xffe0;
        core.load_logical(0xffe0, &[0x34, 0x12, 0x78, 0x56]);
        let mut debugger = Debugger::new(Emulator::new(Some(Box::new(core))), DebuggerConfig::default());

        debugger.go_to_stack(1);
        assert_eq!(debugger.cursor().selected(), 0x5678);
        debugger.go_to_stack(0);
        assert_eq!(debugger.cursor().selected(), 0x1234);
        debugger.go_to_stack(-1);
        assert_eq!(debugger.cursor().selected(), 0x9000);
        assert!(debugger.cursor().follows_pc());

        assert!(debugger.go_to("$4000").is_ok());
        assert_eq!(debugger.cursor().base(), 0x4000);
        assert!(!debugger.cursor().follows_pc());
        assert_eq!(
            debugger.go_to("nowhere"),
            Err(BreakpointParseError::InvalidAddress("nowhere".to_string()))
        );
    }

    #[test]
    fn test_drop_releases_all_handles() {
        let emulator = {
            let mut core = SimCore::default();
            core.regs_mut().pc = 0x9000;
            Emulator::new(Some(Box::new(core)))
        };
        {
            let mut debugger = Debugger::new(emulator.clone(), DebuggerConfig::default());
            debugger.add_or_edit_breakpoint("l rwx 9000", None).unwrap();
            debugger.finish();
            assert!(emulator.lock().store().live_handles() > 0);
        }
        let machine = emulator.lock();
        assert!(machine.store().is_empty());
        assert!(!machine.stepper().is_active());
    }
}
