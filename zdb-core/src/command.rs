//! デバッガコマンド

use crate::{BreakpointId, CursorMove};
use zdb_target::AddressView;

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを追加（テキスト形式、空なら入力を促す）
    Break(String),
    /// ブレークポイントを置き換え（空なら現在の定義から編集する）
    Edit(BreakpointId, String),
    /// ブレークポイントを削除
    Delete(BreakpointId),
    /// ブレークポイントを有効化
    Enable(BreakpointId),
    /// ブレークポイントを無効化
    Disable(BreakpointId),
    /// 実行ブレークポイントを切り替え（省略時は選択行）
    Toggle(Option<String>),
    /// ブレークポイント一覧
    Breakpoints,
    /// 実行継続
    Continue,
    /// 1命令実行
    Step,
    /// サブルーチン呼び出しを飛ばして1命令実行
    Next,
    /// 現在のサブルーチンから抜けるまで実行
    Finish,
    /// 逆アセンブル表示
    Disasm,
    /// 指定アドレスへ移動
    GoTo(String),
    /// PCへ移動
    Pc,
    /// スタック上のアドレスへ移動
    Stack(i32),
    /// 表示をスクロール
    Scroll(i32),
    /// 選択行を移動
    Move(CursorMove),
    /// 表示モードを切り替え
    View(AddressView),
    /// レジスタ表示
    Registers,
    /// シンボルファイル読み込み
    Symbols(String),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let rest = || parts[1..].join(" ");
        let id = || parts.get(1).and_then(|s| s.parse::<BreakpointId>().ok());

        match parts[0] {
            "break" | "b" => Some(Command::Break(rest())),
            "edit" | "e" => {
                let id = id()?;
                Some(Command::Edit(id, parts[2..].join(" ")))
            }
            "delete" | "d" => id().map(Command::Delete),
            "enable" => id().map(Command::Enable),
            "disable" => id().map(Command::Disable),
            "toggle" | "t" => Some(Command::Toggle(parts.get(1).map(|s| s.to_string()))),
            "breakpoints" | "bl" => Some(Command::Breakpoints),
            "info" => match parts.get(1) {
                Some(&"breakpoints") | Some(&"b") => Some(Command::Breakpoints),
                Some(&"registers") | Some(&"r") => Some(Command::Registers),
                _ => None,
            },
            "continue" | "c" => Some(Command::Continue),
            "step" | "s" => Some(Command::Step),
            "next" | "n" => Some(Command::Next),
            "finish" | "f" => Some(Command::Finish),
            "disasm" | "x" | "list" | "l" => Some(Command::Disasm),
            "goto" | "g" => {
                if parts.len() > 1 {
                    Some(Command::GoTo(rest()))
                } else {
                    None
                }
            }
            "pc" => Some(Command::Pc),
            "stack" => {
                let pos = match parts.get(1) {
                    Some(s) => s.parse().ok()?,
                    None => 0,
                };
                Some(Command::Stack(pos))
            }
            "scroll" => parts.get(1).and_then(|s| s.parse().ok()).map(Command::Scroll),
            "up" => Some(Command::Move(CursorMove::Up)),
            "down" => Some(Command::Move(CursorMove::Down)),
            "view" => match parts.get(1).map(|s| s.to_ascii_lowercase()).as_deref() {
                Some("logical") | Some("l") => Some(Command::View(AddressView::Logical)),
                Some("physical") | Some("p") => Some(Command::View(AddressView::Physical)),
                _ => None,
            },
            "registers" | "regs" | "r" => Some(Command::Registers),
            "symbols" | "sym" => {
                if parts.len() > 1 {
                    Some(Command::Symbols(rest()))
                } else {
                    None
                }
            }
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("continue"), Some(Command::Continue));
        assert_eq!(Command::parse("c"), Some(Command::Continue));
        assert_eq!(Command::parse("step"), Some(Command::Step));
        assert_eq!(Command::parse("n"), Some(Command::Next));
        assert_eq!(Command::parse("finish"), Some(Command::Finish));
        assert_eq!(Command::parse("info b"), Some(Command::Breakpoints));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("frobnicate"), None);
    }

    #[test]
    fn test_parse_breakpoint_commands() {
        assert_eq!(
            Command::parse("break  io   rw 10-1f"),
            Some(Command::Break("io rw 10-1f".to_string()))
        );
        assert_eq!(
            Command::parse("edit 3 l x 9000"),
            Some(Command::Edit(3, "l x 9000".to_string()))
        );
        assert_eq!(Command::parse("edit 3"), Some(Command::Edit(3, String::new())));
        assert_eq!(Command::parse("edit"), None);
        assert_eq!(Command::parse("b"), Some(Command::Break(String::new())));
        assert_eq!(Command::parse("delete 2"), Some(Command::Delete(2)));
        assert_eq!(Command::parse("delete x"), None);
        assert_eq!(Command::parse("disable 1"), Some(Command::Disable(1)));
        assert_eq!(Command::parse("toggle"), Some(Command::Toggle(None)));
        assert_eq!(Command::parse("t 9000"), Some(Command::Toggle(Some("9000".to_string()))));
    }

    #[test]
    fn test_parse_navigation_commands() {
        assert_eq!(Command::parse("stack"), Some(Command::Stack(0)));
        assert_eq!(Command::parse("stack -1"), Some(Command::Stack(-1)));
        assert_eq!(Command::parse("scroll -4"), Some(Command::Scroll(-4)));
        assert_eq!(Command::parse("scroll"), None);
        assert_eq!(Command::parse("down"), Some(Command::Move(CursorMove::Down)));
        assert_eq!(Command::parse("view Physical"), Some(Command::View(AddressView::Physical)));
        assert_eq!(Command::parse("goto _GetKey"), Some(Command::GoTo("_GetKey".to_string())));
    }
}
