//! ステップ実行制御
//!
//! step into / step over / finish を、条件付きの一時ブレークポイント（トランポリン）で実装します。
//! トランポリンは常に1つだけで、新しいセッションを始める前に必ず前のセッションを解除します。
//!
//! トリガーテストはワーカースレッド上でエミュレータのロックを保持したまま呼ばれます。

use crate::opclass::{classify, InstructionClass};
use zdb_target::{AddressView, BreakKind, CoreBreakpoint, CoreHandle, CpuCore, DisassemblyService, TriggerTest};

/// ステップオーバーの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverPhase {
    /// 次に実行される命令の完了を待っている
    Stepping,
    /// 目標アドレスの実行ブレークポイントに付け替え済み
    Armed { target: u16 },
}

/// ステップの種類と種類ごとの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Into,
    Over { over_target: u16, phase: OverPhase },
    Finish { sp_threshold: u16 },
}

/// 実行中のステップセッション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSession {
    pub kind: StepKind,
    /// セッションが所有する唯一のコアブレークポイント
    pub trampoline: CoreHandle,
}

/// ステップ制御の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Idle,
    Into,
    Over,
    Finish,
}

/// ステップコントローラ
#[derive(Debug, Default)]
pub struct StepController {
    session: Option<StepSession>,
}

impl StepController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の状態
    pub fn state(&self) -> StepState {
        match self.session.map(|s| s.kind) {
            None => StepState::Idle,
            Some(StepKind::Into) => StepState::Into,
            Some(StepKind::Over { .. }) => StepState::Over,
            Some(StepKind::Finish { .. }) => StepState::Finish,
        }
    }

    /// 実行中のセッション
    pub fn session(&self) -> Option<&StepSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// 1命令実行する（HALT中は割り込みを待つ）
    pub fn begin_into(&mut self, core: &mut dyn CpuCore) -> bool {
        self.cancel(core);
        self.begin(core, StepKind::Into)
    }

    /// 現在の命令を実行し、サブルーチン呼び出しは戻るまで実行する
    ///
    /// 命令長が求められない場合は `pc + 1` を戻り先とする。
    pub fn begin_over(&mut self, core: &mut dyn CpuCore, disasm: &dyn DisassemblyService) -> bool {
        self.cancel(core);

        let pc = core.registers().pc;
        let over_target = match disasm.disassemble(core, pc as u32, AddressView::Logical) {
            Some((next, _)) if next as u16 != pc => next as u16,
            _ => {
                tracing::debug!(pc, "instruction length unavailable, stepping one byte");
                pc.wrapping_add(1)
            }
        };

        self.begin(
            core,
            StepKind::Over {
                over_target,
                phase: OverPhase::Stepping,
            },
        )
    }

    /// 現在のサブルーチンから戻るまで実行する
    pub fn begin_finish(&mut self, core: &mut dyn CpuCore) -> bool {
        self.cancel(core);
        let sp_threshold = core.registers().sp;
        self.begin(core, StepKind::Finish { sp_threshold })
    }

    /// セッションを解除する（Idleでも安全）
    pub fn cancel(&mut self, core: &mut dyn CpuCore) {
        if let Some(session) = self.session.take() {
            core.remove_breakpoint(session.trampoline);
            tracing::debug!(kind = ?session.kind, "step session cancelled");
        }
    }

    /// コアを失った場合にハンドルを解除せずにセッションを破棄する
    pub(crate) fn forget(&mut self) {
        self.session = None;
    }

    /// 全てのオペコードで発火するトリガーを登録してセッションを開始する
    fn begin(&mut self, core: &mut dyn CpuCore, kind: StepKind) -> bool {
        let trigger = CoreBreakpoint::new(BreakKind::Execute, 0, 0, 0).tested();
        match core.add_breakpoint(trigger) {
            Some(trampoline) => {
                tracing::debug!(?kind, handle = trampoline.0, "step session started");
                self.session = Some(StepSession { kind, trampoline });
                true
            }
            None => {
                tracing::warn!(?kind, "core rejected step trigger");
                false
            }
        }
    }

    /// トリガーテスト本体。停止すべきなら true
    ///
    /// 停止する場合はセッションを破棄してトランポリンを解除します。
    /// 自分のものでないハンドルからの呼び出しは停止として扱います。
    pub fn trigger(&mut self, core: &mut dyn CpuCore, handle: CoreHandle, op: u32) -> bool {
        let stop = match self.session.as_mut() {
            Some(session) if session.trampoline == handle => evaluate(session, core, op),
            _ => {
                tracing::debug!(handle = handle.0, "trigger from unknown breakpoint");
                return true;
            }
        };

        if stop {
            if let Some(session) = self.session.take() {
                core.remove_breakpoint(session.trampoline);
                tracing::debug!(kind = ?session.kind, pc = core.registers().pc, "step finished");
            }
        }
        stop
    }
}

impl TriggerTest for StepController {
    fn test(&mut self, core: &mut dyn CpuCore, handle: CoreHandle, op: u32) -> bool {
        self.trigger(core, handle, op)
    }
}

/// セッションの停止条件を評価する
fn evaluate(session: &mut StepSession, core: &mut dyn CpuCore, op: u32) -> bool {
    let regs = core.registers();

    match &mut session.kind {
        StepKind::Into => {
            // HALTは有効な割り込みが保留されるまで待つ
            classify(op) != InstructionClass::Halt || (regs.iff1 && core.interrupt_pending())
        }

        StepKind::Finish { sp_threshold } => {
            if regs.sp <= *sp_threshold {
                return false;
            }
            match classify(op) {
                InstructionClass::Return | InstructionClass::IndirectJump | InstructionClass::InterruptReturn => true,
                InstructionClass::ConditionalReturn(cc) => cc.holds(regs.f()),
                _ => false,
            }
        }

        StepKind::Over { phase: OverPhase::Armed { .. }, .. } => true,

        StepKind::Over { over_target, phase } => {
            let target = if classify(op).transfers_control() {
                regs.pc
            } else {
                *over_target
            };

            core.remove_breakpoint(session.trampoline);
            let relocated = CoreBreakpoint::new(BreakKind::MemExec, target as u32, target as u32, 0xffff).tested();
            match core.add_breakpoint(relocated) {
                Some(handle) => {
                    tracing::debug!(target, handle = handle.0, "step over trampoline relocated");
                    session.trampoline = handle;
                    *phase = OverPhase::Armed { target };
                    false
                }
                None => {
                    tracing::warn!(target, "core rejected step over trampoline");
                    true
                }
            }
        }
    }
}
