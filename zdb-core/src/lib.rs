//! zdb デバッガのコア機能
//!
//! このクレートは、Z80デバッガの実行制御を提供します。
//! ブレークポイントの管理とテキスト形式、ステップ実行（step into / step over / finish）、
//! 逆アセンブル表示のカーソル移動を、エミュレータのロック規律のもとで統合します。

pub mod breakpoint;
pub mod codec;
pub mod command;
pub mod config;
pub mod cursor;
pub mod debugger;
pub mod emulator;
pub mod errors;
pub mod matcher;
pub mod opclass;
pub mod parse;
pub mod step;

pub use breakpoint::{Access, Breakpoint, BreakpointEntry, BreakpointId, BreakpointStore, Space, Toggle};
pub use codec::{BreakpointCodec, ParseContext};
pub use command::Command;
pub use config::DebuggerConfig;
pub use cursor::{CursorMove, DisasmLine, DisassemblyCursor, Navigator};
pub use debugger::Debugger;
pub use emulator::{Emulator, Machine, RunResult, Worker};
pub use errors::BreakpointParseError;
pub use opclass::{classify, Condition, InstructionClass};
pub use step::{OverPhase, StepController, StepKind, StepSession, StepState};

// 他のクレートから使用するために再エクスポート
pub use zdb_target::{AddressView, CpuCore, Registers};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
