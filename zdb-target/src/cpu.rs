//! CPUコアのインターフェース

use crate::{CoreBreakpoint, CoreHandle, Hardware, Registers};

/// 1命令実行の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// 実行を継続してよい
    Continue,
    /// ブレークポイントにより停止した
    Break(CoreHandle),
}

/// トリガーテスト
///
/// 検査付きブレークポイントが一致したとき、コアはワーカースレッド上で
/// （エミュレータのロックを保持したまま）これを同期的に呼び出します。
/// 実装はロックを再取得してはいけません。
pub trait TriggerTest {
    /// 実行を停止すべきなら true を返す
    ///
    /// # Arguments
    /// * `core` - 呼び出し元のコア（ブレークポイントの付け替えに使用できる）
    /// * `handle` - 一致したブレークポイント
    /// * `op` - 直前に実行された（またはこれから実行される）オペコード
    fn test(&mut self, core: &mut dyn CpuCore, handle: CoreHandle, op: u32) -> bool;
}

/// Z80エミュレータコア
///
/// 命令のデコード・実行とメモリマッピングはコア側の責務です。
/// デバッガはこのトレイトを通してブレークポイントの登録と状態の読み取りのみを行います。
pub trait CpuCore: Send {
    /// ブレークポイントを登録する。コアが拒否した場合は None
    fn add_breakpoint(&mut self, bp: CoreBreakpoint) -> Option<CoreHandle>;

    /// ブレークポイントを解除する。存在しなければ false
    fn remove_breakpoint(&mut self, handle: CoreHandle) -> bool;

    /// 現在のレジスタを取得する
    fn registers(&self) -> Registers;

    /// マスク可能割り込みが保留中かどうか
    fn interrupt_pending(&self) -> bool;

    /// ROM/RAM構成
    fn hardware(&self) -> Hardware;

    /// 論理アドレスを物理アドレスに変換する
    fn logical_to_physical(&self, addr: u16) -> u32;

    /// 物理メモリを読む（範囲外は0）
    fn read_physical(&self, addr: u32) -> u8;

    /// 論理メモリを読む
    fn read_logical(&self, addr: u16) -> u8 {
        self.read_physical(self.logical_to_physical(addr))
    }

    /// 論理メモリからリトルエンディアンの16ビット値を読む
    fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_logical(addr) as u16;
        let hi = self.read_logical(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    /// 1命令実行する
    fn execute(&mut self, tests: &mut dyn TriggerTest) -> ExecOutcome;
}
