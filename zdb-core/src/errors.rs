//! エラー型とエラーメッセージ定数

/// CPUコアが接続されていない場合のエラーメッセージ
pub const ERR_NO_TARGET: &str = "No calculator core attached";

/// ブレークポイントが見つからない場合のエラーメッセージ
pub const ERR_BREAKPOINT_NOT_FOUND: &str = "Breakpoint not found";

/// ブレークポイント定義テキストの解析エラー
///
/// 解析はエラーの時点で中断され、ストアは変更されません。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakpointParseError {
    #[error("Empty breakpoint definition")]
    Empty,

    #[error("Missing address")]
    MissingAddress,

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid end address '{0}'")]
    InvalidEndAddress(String),

    #[error("Invalid mask '{0}'")]
    InvalidMask(String),

    /// ポートで読み書き以外のモードだけが指定された
    #[error("Invalid access mode '{0}' (I/O port breakpoints accept only read and write)")]
    InvalidAccessMode(String),

    #[error("End < start in '{0}'")]
    EndBeforeStart(String),
}
