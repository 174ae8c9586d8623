//! デバッガの設定

use crate::{Access, Space};
use zdb_target::AddressView;

/// デバッガの設定
///
/// CLIの引数から作られ、[`crate::Debugger::new`] に渡されます。
#[derive(Debug, Clone)]
pub struct DebuggerConfig {
    /// 逆アセンブル表示の行数
    pub disasm_lines: usize,
    /// 初期の表示モード
    pub view: AddressView,
    /// ブレークポイント定義で種類を省略したときの初期値
    pub default_space: Space,
    /// ブレークポイント定義でモードを省略したときの初期値
    pub default_access: Access,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            disasm_lines: 16,
            view: AddressView::Logical,
            default_space: Space::Logical,
            default_access: Access::EXEC,
        }
    }
}
