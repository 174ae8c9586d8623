//! ブレークポイントのテキスト形式
//!
//! 空白区切りのトークンで、種類・モード・マスク・アドレスを任意の順序で指定します。
//!
//! ```text
//! [logical|physical|port|opcode] [r|w|x|rw|read/write|...] [mask=XXXX] START[-[END]] [(disabled)]
//! ```
//!
//! 終了アドレスを空にした `START-` は `START` と同じです。
//! 種類やモードが省略された場合は、直前に使われた種類・モードが使われます。

use crate::errors::BreakpointParseError;
use crate::parse::{parse_number, parse_physical};
use crate::{Access, Breakpoint, Space};
use zdb_target::{DisassemblyService, Hardware};

/// 解析時に参照する外部情報
#[derive(Clone, Copy, Default)]
pub struct ParseContext<'a> {
    /// ラベル解決に使う逆アセンブラ
    pub labels: Option<&'a dyn DisassemblyService>,
    /// `PAGE:OFFSET` の変換に使うハードウェア構成
    pub hardware: Option<Hardware>,
}

/// 無効化フラグのトークン
const DISABLED_TOKEN: &str = "(disabled)";

/// ブレークポイントのテキスト形式の変換器
///
/// 直前に使われた種類・モードを保持します。
#[derive(Debug, Clone)]
pub struct BreakpointCodec {
    last_space: Space,
    last_access: Access,
}

impl BreakpointCodec {
    /// 省略時の種類・モードを指定して作成する
    pub fn new(space: Space, access: Access) -> Self {
        Self {
            last_space: space,
            last_access: access,
        }
    }

    /// 直前に使われた種類
    pub fn last_space(&self) -> Space {
        self.last_space
    }

    /// 直前に使われたモード
    pub fn last_access(&self) -> Access {
        self.last_access
    }

    /// 追加・編集・切り替えに成功したブレークポイントを次の既定値として記録する
    pub fn remember(&mut self, bp: &Breakpoint) {
        self.last_space = bp.space;
        self.last_access = bp.access;
    }

    /// テキストをブレークポイントに変換する
    pub fn parse(&self, text: &str, ctx: &ParseContext<'_>) -> Result<Breakpoint, BreakpointParseError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(BreakpointParseError::Empty);
        }

        let mut space = None;
        let mut mode: Option<(Access, &str)> = None;
        let mut mask = None;
        let mut address = None;
        let mut enabled = true;

        for token in tokens {
            let lower = token.to_ascii_lowercase();

            if let Some(s) = space_keyword(&lower) {
                space.get_or_insert(s);
            } else if let Some(value) = lower.strip_prefix("mask=").or_else(|| lower.strip_prefix("mask:")) {
                let value = parse_number(value, ctx.labels)
                    .ok_or_else(|| BreakpointParseError::InvalidMask(token.to_string()))?;
                mask.get_or_insert(value);
            } else if lower == DISABLED_TOKEN {
                enabled = false;
            } else if let Some(a) = mode_keyword(&lower) {
                mode.get_or_insert((a, token));
            } else if address.is_none() {
                address = Some(token);
            }
        }

        let space = space.unwrap_or(self.last_space);
        let access = self.resolve_access(space, mode)?;
        let address = address.ok_or(BreakpointParseError::MissingAddress)?;

        let (start_text, end_text) = match address.split_once('-') {
            Some((start, end)) => (start, Some(end)),
            None => (address, None),
        };
        let start = parse_address(start_text, space, ctx)
            .ok_or_else(|| BreakpointParseError::InvalidAddress(start_text.to_string()))?;
        let end = match end_text {
            Some(text) if !text.is_empty() => parse_address(text, space, ctx)
                .ok_or_else(|| BreakpointParseError::InvalidEndAddress(text.to_string()))?,
            _ => start,
        };

        let mask = match (space, mask) {
            (Space::Physical | Space::Opcode, Some(mask)) => mask,
            _ => space.default_mask(),
        };
        let bp = Breakpoint::new(space, access, start, end)
            .with_mask(mask)
            .with_enabled(enabled);
        if bp.end < bp.start {
            return Err(BreakpointParseError::EndBeforeStart(address.to_string()));
        }

        Ok(bp)
    }

    /// 空間ごとの制約を適用してモードを決める
    fn resolve_access(&self, space: Space, mode: Option<(Access, &str)>) -> Result<Access, BreakpointParseError> {
        let explicit = mode.map(|(access, _)| access);
        let access = explicit.unwrap_or(self.last_access);

        match space {
            Space::Opcode => Ok(Access::EXEC),
            Space::Port => {
                let access = access & space.legal_access();
                match (access.is_empty(), mode) {
                    (true, Some((_, token))) => Err(BreakpointParseError::InvalidAccessMode(token.to_string())),
                    (true, None) => Ok(Access::READ),
                    (false, _) => Ok(access),
                }
            }
            Space::Logical | Space::Physical => {
                if access.is_empty() {
                    Ok(Access::EXEC)
                } else {
                    Ok(access)
                }
            }
        }
    }

    /// ブレークポイントをテキストに変換する
    ///
    /// 既定と異なるマスクは `mask=` として、無効なものは `(disabled)` として付加されます。
    pub fn format(bp: &Breakpoint) -> String {
        let mode: String = [(Access::READ, 'R'), (Access::WRITE, 'W'), (Access::EXEC, 'X')]
            .iter()
            .filter(|(bit, _)| bp.access.contains(*bit))
            .map(|(_, c)| *c)
            .collect();

        let width = match bp.space {
            Space::Logical => 4,
            Space::Physical if bp.end > 0xffff => 6,
            Space::Physical => 4,
            Space::Port => 2,
            Space::Opcode if bp.end > 0xffff => 6,
            Space::Opcode => 2,
        };

        let mut text = if bp.start == bp.end {
            format!("{} {} {:0w$X}", bp.space.label(), mode, bp.start, w = width)
        } else {
            format!("{} {} {:0w$X}-{:0w$X}", bp.space.label(), mode, bp.start, bp.end, w = width)
        };

        if bp.mask != bp.space.default_mask() {
            text.push_str(&format!(" mask={:X}", bp.mask));
        }
        if !bp.enabled {
            text.push(' ');
            text.push_str(DISABLED_TOKEN);
        }
        text
    }
}

impl Default for BreakpointCodec {
    fn default() -> Self {
        Self::new(Space::Logical, Access::EXEC)
    }
}

/// 種類キーワード
fn space_keyword(token: &str) -> Option<Space> {
    match token {
        "logical" | "log" | "l" | "mem" => Some(Space::Logical),
        "physical" | "phys" | "p" | "abs" => Some(Space::Physical),
        "port" | "io" | "i/o" => Some(Space::Port),
        "opcode" | "op" => Some(Space::Opcode),
        _ => None,
    }
}

/// モードキーワード
///
/// `read`/`write`/`exec`/`execute` の語、または `r`/`w`/`x` の文字列を
/// `/` `+` `,` `|` `-` で連結したもの。
fn mode_keyword(token: &str) -> Option<Access> {
    let mut access = Access::empty();
    for part in token.split(['/', '+', ',', '|', '-']) {
        access |= match part {
            "read" => Access::READ,
            "write" => Access::WRITE,
            "exec" | "execute" => Access::EXEC,
            letters if !letters.is_empty() => {
                let mut bits = Access::empty();
                for c in letters.chars() {
                    bits |= match c {
                        'r' => Access::READ,
                        'w' => Access::WRITE,
                        'x' => Access::EXEC,
                        _ => return None,
                    };
                }
                bits
            }
            _ => return None,
        };
    }
    Some(access)
}

/// 空間に応じてアドレスを解釈する
fn parse_address(text: &str, space: Space, ctx: &ParseContext<'_>) -> Option<u32> {
    if space == Space::Physical && text.contains(':') {
        return parse_physical(text, ctx.hardware.as_ref()?, ctx.labels);
    }
    parse_number(text, ctx.labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdb_target::{SymbolTable, Z80Disassembler};

    fn parse(text: &str) -> Result<Breakpoint, BreakpointParseError> {
        BreakpointCodec::default().parse(text, &ParseContext::default())
    }

    #[test]
    fn test_parse_logical_range_ignores_mask() {
        let bp = parse("L X 8000-80FF mask=FFFF").unwrap();
        assert_eq!(bp.space, Space::Logical);
        assert_eq!(bp.access, Access::EXEC);
        assert_eq!((bp.start, bp.end, bp.mask), (0x8000, 0x80ff, 0xffff));
        assert_eq!(BreakpointCodec::format(&bp), "L X 8000-80FF");

        let bp = parse("logical 8000 mask=00FF").unwrap();
        assert_eq!(bp.mask, 0xffff);
    }

    #[test]
    fn test_token_order_is_free() {
        let a = parse("port rw 10-1F").unwrap();
        let b = parse("10-1F RW io").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.access, Access::READ | Access::WRITE);
        assert_eq!(BreakpointCodec::format(&a), "IO RW 10-1F");
    }

    #[test]
    fn test_first_type_and_mode_win() {
        let bp = parse("physical logical w r 1234").unwrap();
        assert_eq!(bp.space, Space::Physical);
        assert_eq!(bp.access, Access::WRITE);
    }

    #[test]
    fn test_mode_words() {
        assert_eq!(parse("read/write 8000").unwrap().access, Access::READ | Access::WRITE);
        assert_eq!(parse("Exec 8000").unwrap().access, Access::EXEC);
        assert_eq!(parse("RWX 8000").unwrap().access, Access::all());
    }

    #[test]
    fn test_mode_separators() {
        let rw = Access::READ | Access::WRITE;
        assert_eq!(parse("l read-write 8000").unwrap().access, rw);
        assert_eq!(parse("l r-x 8000").unwrap().access, Access::READ | Access::EXEC);
        assert_eq!(parse("l r+w 8000").unwrap().access, rw);
        // 範囲指定はモードとして扱わない
        let bp = parse("l r-w 8000-80ff").unwrap();
        assert_eq!((bp.access, bp.start, bp.end), (rw, 0x8000, 0x80ff));
    }

    #[test]
    fn test_empty_end_is_single_address() {
        let bp = parse("l w 8000-").unwrap();
        assert_eq!((bp.start, bp.end), (0x8000, 0x8000));
        assert_eq!(BreakpointCodec::format(&bp), "L W 8000");
    }

    #[test]
    fn test_port_mode_error_explains_legal_modes() {
        let err = parse("io x 10").unwrap_err();
        assert_eq!(err, BreakpointParseError::InvalidAccessMode("x".to_string()));
        assert!(err.to_string().contains("only read and write"), "{}", err);
        // 読み書きが含まれていれば実行ビットは落とす
        assert_eq!(parse("io rwx 10").unwrap().access, Access::READ | Access::WRITE);
    }

    #[test]
    fn test_mode_defaults_per_space() {
        // 直前のモードが実行のみでも、ポートでは読み込みになる
        assert_eq!(parse("io 10").unwrap().access, Access::READ);
        // オペコードは常に実行
        assert_eq!(parse("opcode rw c9").unwrap().access, Access::EXEC);
        assert_eq!(
            parse("io x 10"),
            Err(BreakpointParseError::InvalidAccessMode("x".to_string()))
        );
    }

    #[test]
    fn test_last_used_defaults() {
        let mut codec = BreakpointCodec::default();
        let bp = codec.parse("p w 4000", &ParseContext::default()).unwrap();
        codec.remember(&bp);

        let next = codec.parse("5000", &ParseContext::default()).unwrap();
        assert_eq!(next.space, Space::Physical);
        assert_eq!(next.access, Access::WRITE);
    }

    #[test]
    fn test_physical_mask_and_pages() {
        let ctx = ParseContext {
            labels: None,
            hardware: Some(Hardware::default()),
        };
        let codec = BreakpointCodec::default();

        let bp = codec.parse("p x 41:0000 mask=FFFF0", &ctx).unwrap();
        assert_eq!(bp.mask, 0xffff0);
        assert_eq!(bp.start, 0x84000);
        assert_eq!(BreakpointCodec::format(&bp), "P X 084000 mask=FFFF0");

        // ハードウェア構成がなければページ指定は使えない
        assert_eq!(
            codec.parse("p x 41:0000", &ParseContext::default()),
            Err(BreakpointParseError::InvalidAddress("41:0000".to_string()))
        );
    }

    #[test]
    fn test_opcode_mask() {
        let bp = parse("op ed45 mask=FFC7").unwrap();
        assert_eq!((bp.start, bp.end, bp.mask), (0xed45, 0xed45, 0xffc7));
        assert_eq!(BreakpointCodec::format(&bp), "OP X ED45 mask=FFC7");
    }

    #[test]
    fn test_labels() {
        let mut symbols = SymbolTable::new();
        symbols.insert("PlotSScreen", 0x9340);
        let disasm = Z80Disassembler::with_symbols(symbols);
        let ctx = ParseContext {
            labels: Some(&disasm),
            hardware: None,
        };

        let bp = BreakpointCodec::default().parse("l w plotsscreen", &ctx).unwrap();
        assert_eq!(bp.start, 0x9340);
    }

    #[test]
    fn test_mask_accepts_labels() {
        let mut symbols = SymbolTable::new();
        symbols.insert("PageMask", 0x3fff);
        let disasm = Z80Disassembler::with_symbols(symbols);
        let ctx = ParseContext {
            labels: Some(&disasm),
            hardware: None,
        };

        let bp = BreakpointCodec::default().parse("p r 4000 mask=pagemask", &ctx).unwrap();
        assert_eq!(bp.mask, 0x3fff);
        assert_eq!(
            BreakpointCodec::default().parse("p r 4000 mask=nosuchlabel", &ctx),
            Err(BreakpointParseError::InvalidMask("mask=nosuchlabel".to_string()))
        );
    }

    #[test]
    fn test_errors_name_the_token() {
        assert_eq!(parse("   "), Err(BreakpointParseError::Empty));
        assert_eq!(parse("logical rw"), Err(BreakpointParseError::MissingAddress));
        assert_eq!(parse("l zzzz"), Err(BreakpointParseError::InvalidAddress("zzzz".to_string())));
        assert_eq!(
            parse("l 8000-qq"),
            Err(BreakpointParseError::InvalidEndAddress("qq".to_string()))
        );
        assert_eq!(
            parse("p 8000 mask=zz"),
            Err(BreakpointParseError::InvalidMask("mask=zz".to_string()))
        );
        assert_eq!(
            parse("l 9000-8000"),
            Err(BreakpointParseError::EndBeforeStart("9000-8000".to_string()))
        );
    }

    #[test]
    fn test_addresses_are_masked() {
        let bp = parse("l 18000").unwrap();
        assert_eq!(bp.start, 0x8000);
        let bp = parse("io 1ff").unwrap();
        assert_eq!(bp.start, 0xff);
    }

    #[test]
    fn test_disabled_round_trip() {
        let bp = Breakpoint::new(Space::Port, Access::WRITE, 0x10, 0x10).with_enabled(false);
        let text = BreakpointCodec::format(&bp);
        assert_eq!(text, "IO W 10 (disabled)");
        assert_eq!(parse(&text).unwrap(), bp);
    }

    #[test]
    fn test_format_widths() {
        let fmt = |space, start, end| BreakpointCodec::format(&Breakpoint::new(space, Access::EXEC, start, end));
        assert_eq!(fmt(Space::Logical, 0x10, 0x10), "L X 0010");
        assert_eq!(fmt(Space::Physical, 0x10, 0x10), "P X 0010");
        assert_eq!(fmt(Space::Physical, 0x10, 0x84000), "P X 000010-084000");
        assert_eq!(fmt(Space::Opcode, 0xc9, 0xc9), "OP X C9");
        assert_eq!(fmt(Space::Opcode, 0x1, 0xddcb00), "OP X 000001-DDCB00");
    }

    #[test]
    fn test_format_parse_round_trip() {
        let codec = BreakpointCodec::new(Space::Opcode, Access::EXEC);
        let samples = [
            Breakpoint::new(Space::Logical, Access::all(), 0x8000, 0x80ff),
            Breakpoint::new(Space::Logical, Access::READ, 0, 0),
            Breakpoint::new(Space::Physical, Access::WRITE | Access::EXEC, 0x84000, 0x87fff),
            Breakpoint::new(Space::Physical, Access::READ, 0x4000, 0x4000).with_mask(0x3fff),
            Breakpoint::new(Space::Port, Access::READ | Access::WRITE, 0x01, 0x01).with_enabled(false),
            Breakpoint::new(Space::Opcode, Access::EXEC, 0xed45, 0xed7d).with_mask(0xffc7),
        ];

        for bp in samples {
            let text = BreakpointCodec::format(&bp);
            let parsed = codec.parse(&text, &ParseContext::default()).unwrap();
            assert_eq!(parsed, bp, "{}", text);
        }
    }
}
