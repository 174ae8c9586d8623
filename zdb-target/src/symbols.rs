//! シンボル表（ラベル名 ⇔ アドレス）

use crate::Result;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// シンボルファイルの解析エラー
#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    #[error("line {line}: cannot parse symbol definition '{text}'")]
    Malformed { line: usize, text: String },
}

/// シンボル表
///
/// 名前の検索は大文字小文字を区別しません（Z80アセンブラの慣習に合わせる）。
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    by_name: HashMap<String, u32>,
    by_address: BTreeMap<u32, String>,
}

impl SymbolTable {
    /// 空のシンボル表を作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// シンボルを追加する
    pub fn insert(&mut self, name: &str, address: u32) {
        self.by_name.insert(name.to_ascii_lowercase(), address);
        self.by_address.entry(address).or_insert_with(|| name.to_string());
    }

    /// シンボル名からアドレスを解決する
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// アドレスちょうどに定義されたシンボル名
    pub fn name_at(&self, address: u32) -> Option<&str> {
        self.by_address.get(&address).map(String::as_str)
    }

    /// シンボル数
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// シンボルファイルを読み込んで追加する
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read symbol file {}: {}", path.display(), e))?;
        let count = self.parse(&text)?;
        tracing::debug!(count, path = %path.display(), "loaded symbols");
        Ok(count)
    }

    /// シンボル定義テキストを解析して追加する
    ///
    /// 1行に1定義で、`NAME = $ADDR`、`NAME .equ ADDRh`、`NAME EQU 0xADDR` の形式を受け付けます。
    /// 空行と `;` `#` で始まるコメントは無視します。
    /// 解析できない行があった場合は何も追加しません。
    pub fn parse(&mut self, text: &str) -> Result<usize> {
        let pattern = Regex::new(
            r"(?i)^\s*([A-Za-z_.][\w.]*)\s*(?:=|\.?equ)\s*(?:\$|0x)?([0-9A-Fa-f]+)h?\s*(?:;.*)?$",
        )?;

        let mut parsed = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
                continue;
            }

            let caps = pattern.captures(trimmed).ok_or_else(|| SymbolError::Malformed {
                line: idx + 1,
                text: trimmed.to_string(),
            })?;
            let address = u32::from_str_radix(&caps[2], 16).map_err(|_| SymbolError::Malformed {
                line: idx + 1,
                text: trimmed.to_string(),
            })?;
            parsed.push((caps[1].to_string(), address));
        }

        for (name, address) in &parsed {
            self.insert(name, *address);
        }
        Ok(parsed.len())
    }
}
