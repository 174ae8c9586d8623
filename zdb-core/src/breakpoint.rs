//! ブレークポイント管理

use crate::matcher;
use zdb_target::{BreakKind, CoreBreakpoint, CoreHandle, CpuCore};

/// ブレークポイントID
pub type BreakpointId = usize;

/// ブレークポイントのアドレス空間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    /// CPUから見た16ビット論理アドレス
    Logical,
    /// バンク変換後のROM+RAMの物理アドレス
    Physical,
    /// I/Oポート
    Port,
    /// オペコード値
    Opcode,
}

impl Space {
    /// 空間ごとの既定マスク
    pub fn default_mask(self) -> u32 {
        match self {
            Space::Logical => 0xffff,
            Space::Port => 0xff,
            Space::Physical | Space::Opcode => 0xffff_ffff,
        }
    }

    /// 表示用の短いラベル
    pub fn label(self) -> &'static str {
        match self {
            Space::Logical => "L",
            Space::Physical => "P",
            Space::Port => "IO",
            Space::Opcode => "OP",
        }
    }

    /// この空間で有効なアクセスモード
    pub fn legal_access(self) -> Access {
        match self {
            Space::Logical | Space::Physical => Access::all(),
            Space::Port => Access::READ | Access::WRITE,
            Space::Opcode => Access::EXEC,
        }
    }
}

bitflags::bitflags! {
    /// アクセスモード
    ///
    /// ビット位置はコアハンドル配列の添字に対応する（EXEC=0, WRITE=1, READ=2）。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const EXEC = 0b001;
        const WRITE = 0b010;
        const READ = 0b100;
    }
}

/// ブレークポイント定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub space: Space,
    pub access: Access,
    pub start: u32,
    pub end: u32,
    pub mask: u32,
    pub enabled: bool,
}

impl Breakpoint {
    /// 空間の既定マスクでブレークポイントを作成する
    pub fn new(space: Space, access: Access, start: u32, end: u32) -> Self {
        let mask = space.default_mask();
        Self {
            space,
            access,
            start: start & mask,
            end: end & mask,
            mask,
            enabled: true,
        }
    }

    /// 単一アドレスの実行ブレークポイント
    pub fn exec_at(space: Space, addr: u32) -> Self {
        Self::new(space, Access::EXEC, addr, addr)
    }

    /// マスクを変更し、範囲をマスクし直す
    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self.start &= mask;
        self.end &= mask;
        self
    }

    /// 有効・無効を設定する
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// アクセスビットに対応するコアブレークポイント
    fn core_breakpoint(&self, bit: Access) -> Option<CoreBreakpoint> {
        let kind = if bit == Access::EXEC {
            match self.space {
                Space::Logical | Space::Physical => BreakKind::MemExec,
                Space::Opcode => BreakKind::Execute,
                Space::Port => return None,
            }
        } else if bit == Access::WRITE {
            match self.space {
                Space::Logical | Space::Physical => BreakKind::MemWrite,
                Space::Port => BreakKind::PortWrite,
                Space::Opcode => return None,
            }
        } else {
            match self.space {
                Space::Logical | Space::Physical => BreakKind::MemRead,
                Space::Port => BreakKind::PortRead,
                Space::Opcode => return None,
            }
        };

        let bp = CoreBreakpoint::new(kind, self.start, self.end, self.mask);
        Some(if self.space == Space::Physical { bp.physical() } else { bp })
    }
}

/// ハンドル配列の添字順のアクセスビット
const HANDLE_BITS: [Access; 3] = [Access::EXEC, Access::WRITE, Access::READ];

/// ストアに登録されたブレークポイント
///
/// コアのハンドルを持つため、ロックの外には持ち出せません（複製不可）。
#[derive(Debug)]
pub struct BreakpointEntry {
    id: BreakpointId,
    breakpoint: Breakpoint,
    handles: [Option<CoreHandle>; 3],
}

impl BreakpointEntry {
    pub fn id(&self) -> BreakpointId {
        self.id
    }

    pub fn breakpoint(&self) -> &Breakpoint {
        &self.breakpoint
    }

    /// アクセスビットに対応するコアハンドル
    pub fn handle(&self, bit: Access) -> Option<CoreHandle> {
        HANDLE_BITS
            .iter()
            .position(|b| *b == bit)
            .and_then(|i| self.handles[i])
    }

    /// 現在コアに登録されているハンドル数
    pub fn live_handles(&self) -> usize {
        self.handles.iter().flatten().count()
    }

    fn register(&mut self, core: &mut dyn CpuCore) {
        if !self.breakpoint.enabled {
            return;
        }

        for (slot, bit) in self.handles.iter_mut().zip(HANDLE_BITS) {
            if !self.breakpoint.access.contains(bit) {
                continue;
            }
            let Some(core_bp) = self.breakpoint.core_breakpoint(bit) else {
                continue;
            };
            match core.add_breakpoint(core_bp) {
                Some(handle) => {
                    tracing::debug!(id = self.id, handle = handle.0, kind = ?core_bp.kind, "registered breakpoint");
                    *slot = Some(handle);
                }
                None => {
                    tracing::warn!(id = self.id, kind = ?core_bp.kind, "core rejected breakpoint registration");
                }
            }
        }
    }

    fn unregister(&mut self, core: &mut dyn CpuCore) {
        for slot in self.handles.iter_mut() {
            if let Some(handle) = slot.take() {
                if !core.remove_breakpoint(handle) {
                    tracing::warn!(id = self.id, handle = handle.0, "core did not know breakpoint handle");
                }
            }
        }
    }
}

/// `toggle_at` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added(BreakpointId),
    Removed(BreakpointId),
}

/// ブレークポイントストア
///
/// 論理的なブレークポイント定義と、コアに登録したハンドルを一緒に管理します。
/// 全ての操作はエミュレータのロックを保持した状態で呼び出されます。
/// 破棄する前に [`BreakpointStore::clear`] で全ハンドルを解除すること。
#[derive(Debug)]
pub struct BreakpointStore {
    entries: Vec<BreakpointEntry>,
    next_id: BreakpointId,
}

impl BreakpointStore {
    /// 新しいストアを作成する
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// ブレークポイントを追加し、有効ならコアに登録する
    ///
    /// コアに拒否されたアクセスビットは登録されないまま残ります（エントリは保存される）。
    pub fn add(&mut self, core: &mut dyn CpuCore, bp: Breakpoint) -> BreakpointId {
        let id = self.next_id;
        self.next_id += 1;

        let mut entry = BreakpointEntry {
            id,
            breakpoint: bp,
            handles: [None; 3],
        };
        entry.register(core);
        self.entries.push(entry);
        id
    }

    /// ブレークポイントを解除して削除する
    pub fn remove(&mut self, core: &mut dyn CpuCore, id: BreakpointId) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let mut entry = self.entries.remove(pos);
        entry.unregister(core);
        true
    }

    /// 定義を置き換える（有効・無効の状態は維持する）
    pub fn replace(&mut self, core: &mut dyn CpuCore, id: BreakpointId, bp: Breakpoint) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        entry.unregister(core);
        entry.breakpoint = bp.with_enabled(entry.breakpoint.enabled);
        entry.register(core);
        true
    }

    /// 有効・無効を切り替える
    pub fn set_enabled(&mut self, core: &mut dyn CpuCore, id: BreakpointId, enabled: bool) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        if entry.breakpoint.enabled == enabled {
            return true;
        }
        entry.unregister(core);
        entry.breakpoint.enabled = enabled;
        entry.register(core);
        true
    }

    /// アドレスに一致する最初の有効な実行ブレークポイント
    ///
    /// `addr` は `space` の空間（論理または物理）のアドレス。
    pub fn find_exec_match(&self, addr: u32, space: Space) -> Option<BreakpointId> {
        self.entries
            .iter()
            .find(|e| {
                let bp = &e.breakpoint;
                bp.enabled
                    && bp.space == space
                    && bp.access.contains(Access::EXEC)
                    && matcher::matches(addr, bp)
            })
            .map(|e| e.id)
    }

    /// 実行ブレークポイントを切り替える
    ///
    /// 一致するものがあれば削除し、なければ空間全体のマスクで単一アドレスのものを追加します。
    pub fn toggle_at(&mut self, core: &mut dyn CpuCore, addr: u32, space: Space) -> Toggle {
        match self.find_exec_match(addr, space) {
            Some(id) => {
                self.remove(core, id);
                Toggle::Removed(id)
            }
            None => Toggle::Added(self.add(core, Breakpoint::exec_at(space, addr))),
        }
    }

    /// 全てのブレークポイントを解除して削除する
    pub fn clear(&mut self, core: &mut dyn CpuCore) {
        for mut entry in self.entries.drain(..) {
            entry.unregister(core);
        }
    }

    /// コアを失った場合にハンドルを解除せずに破棄する
    pub(crate) fn forget(&mut self) {
        self.entries.clear();
    }

    /// ブレークポイントを取得する
    pub fn get(&self, id: BreakpointId) -> Option<&BreakpointEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// 全てのブレークポイントを追加順に取得する
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointEntry> {
        self.entries.iter()
    }

    /// ブレークポイントの数を取得する
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// コアに登録されているハンドルの総数
    pub fn live_handles(&self) -> usize {
        self.entries.iter().map(BreakpointEntry::live_handles).sum()
    }

    fn position(&self, id: BreakpointId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

impl Default for BreakpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BreakpointStore {
    fn drop(&mut self) {
        let live = self.live_handles();
        if live > 0 {
            tracing::warn!(live, "breakpoint store dropped with registered core handles");
        }
    }
}
