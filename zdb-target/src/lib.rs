//! zdb ターゲット（CPUコア）境界
//!
//! このクレートは、デバッガコアが利用するZ80エミュレータコアとのインターフェースを提供します。
//! ブレークポイント登録、レジスタ・メモリアクセス、論理→物理アドレス変換、
//! 逆アセンブルとシンボル表、およびテスト・CLI用の小さな参照コア（SimCore）を含みます。

pub mod breakpoint;
pub mod cpu;
pub mod disasm;
pub mod hardware;
pub mod registers;
pub mod sim;
pub mod symbols;

pub use breakpoint::{BreakKind, CoreBreakpoint, CoreHandle};
pub use cpu::{CpuCore, ExecOutcome, TriggerTest};
pub use disasm::{instruction_length, AddressView, DisassemblyService, Z80Disassembler};
pub use hardware::{Hardware, PAGE_SIZE};
pub use registers::Registers;
pub use sim::SimCore;
pub use symbols::{SymbolError, SymbolTable};

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
