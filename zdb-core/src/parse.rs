//! パース関連のユーティリティ関数

use zdb_target::{DisassemblyService, Hardware};

/// 数値またはラベルをアドレスにパース
///
/// `$` または `0x` プレフィックスと末尾の `h` を許す16進数として解釈し、
/// 失敗した場合はシンボル表のラベルとして解決します。
///
/// # Examples
/// ```
/// use zdb_core::parse::parse_number;
///
/// assert_eq!(parse_number("$8000", None), Some(0x8000));
/// assert_eq!(parse_number("0x8000", None), Some(0x8000));
/// assert_eq!(parse_number("8000h", None), Some(0x8000));
/// ```
pub fn parse_number(s: &str, labels: Option<&dyn DisassemblyService>) -> Option<u32> {
    let s = s.trim();
    let digits = s
        .strip_prefix('$')
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let digits = digits
        .strip_suffix('h')
        .or_else(|| digits.strip_suffix('H'))
        .unwrap_or(digits);

    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(value) = u32::from_str_radix(digits, 16) {
            return Some(value);
        }
    }

    labels?.label(s)
}

/// `PAGE:OFFSET` 形式を物理アドレスにパース
///
/// ページ・オフセットはそれぞれ [`parse_number`] で解釈します。
pub fn parse_physical(s: &str, hw: &Hardware, labels: Option<&dyn DisassemblyService>) -> Option<u32> {
    let (page, offset) = s.split_once(':')?;
    let page = parse_number(page, labels)?;
    let offset = parse_number(offset, labels)?;
    Some(hw.page_address(page, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdb_target::{SymbolTable, Z80Disassembler};

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse_number("8000", None), Some(0x8000));
        assert_eq!(parse_number("$C9", None), Some(0xc9));
        assert_eq!(parse_number("0xabcd", None), Some(0xabcd));
        assert_eq!(parse_number("0ABCDh", None), Some(0xabcd));
        assert_eq!(parse_number("12H", None), Some(0x12));
    }

    #[test]
    fn test_parse_number_invalid() {
        assert_eq!(parse_number("", None), None);
        assert_eq!(parse_number("$", None), None);
        assert_eq!(parse_number("xyz", None), None);
        assert_eq!(parse_number("123456789", None), None);
    }

    #[test]
    fn test_parse_number_label() {
        let mut symbols = SymbolTable::new();
        symbols.insert("_GetKey", 0x4972);
        let disasm = Z80Disassembler::with_symbols(symbols);

        assert_eq!(parse_number("_getkey", Some(&disasm)), Some(0x4972));
        assert_eq!(parse_number("missing", Some(&disasm)), None);
        // 16進数として読めるものは数値が優先される
        assert_eq!(parse_number("beef", Some(&disasm)), Some(0xbeef));
    }

    #[test]
    fn test_parse_physical_pages() {
        let hw = Hardware::default();
        assert_eq!(parse_physical("03:0010", &hw, None), Some(0xc010));
        assert_eq!(parse_physical("41:4000", &hw, None), Some(0x84000));
        assert_eq!(parse_physical("42:0005", &hw, None), Some(0x80005));
        assert_eq!(parse_physical("8000", &hw, None), None);
        assert_eq!(parse_physical("zz:0", &hw, None), None);
    }
}
