//! コアレベルのブレークポイント定義

/// コアブレークポイントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakKind {
    /// メモリ読み込み
    MemRead,
    /// メモリ書き込み
    MemWrite,
    /// 命令フェッチ（指定アドレスの命令を実行する直前）
    MemExec,
    /// I/Oポート読み込み
    PortRead,
    /// I/Oポート書き込み
    PortWrite,
    /// オペコード実行（命令の実行直後、範囲はオペコード値に対して評価される）
    Execute,
}

/// コアが発行するブレークポイントハンドル
///
/// 0は使用されません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreHandle(pub u32);

/// コアに登録するブレークポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreBreakpoint {
    pub kind: BreakKind,
    /// trueなら start/end/mask を物理アドレスとして評価する（メモリ系のみ）
    pub physical: bool,
    pub start: u32,
    pub end: u32,
    pub mask: u32,
    /// trueなら一致時にトリガーテストを呼び出し、その結果で停止を決める
    pub tested: bool,
}

impl CoreBreakpoint {
    /// 検査なしのブレークポイントを作成する
    pub fn new(kind: BreakKind, start: u32, end: u32, mask: u32) -> Self {
        Self {
            kind,
            physical: false,
            start,
            end,
            mask,
            tested: false,
        }
    }

    /// 物理アドレス空間で評価するようにする
    pub fn physical(mut self) -> Self {
        self.physical = true;
        self
    }

    /// トリガーテスト付きにする
    pub fn tested(mut self) -> Self {
        self.tested = true;
        self
    }

    /// 値（アドレス、ポート番号、オペコード）が範囲に一致するか
    pub fn covers(&self, value: u32) -> bool {
        let masked = value & self.mask;
        masked >= self.start && masked <= self.end
    }
}
