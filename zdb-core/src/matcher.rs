//! アドレス一致判定

use crate::{Breakpoint, Space};
use zdb_target::CpuCore;

/// `(addr & mask)` が `[start, end]` に含まれるか
pub fn range_matches(addr: u32, start: u32, end: u32, mask: u32) -> bool {
    let masked = addr & mask;
    masked >= start && masked <= end
}

/// アドレスがブレークポイントの範囲に一致するか
///
/// `addr` はあらかじめ [`normalize`] でブレークポイントの空間に揃えておくこと。
pub fn matches(addr: u32, bp: &Breakpoint) -> bool {
    range_matches(addr, bp.start, bp.end, bp.mask)
}

/// 論理アドレスを指定した空間のアドレスに変換する
///
/// 物理空間ではコアの論理→物理変換を使い、それ以外は16ビットのまま返します。
pub fn normalize(addr: u16, space: Space, core: &dyn CpuCore) -> u32 {
    match space {
        Space::Physical => core.logical_to_physical(addr),
        _ => addr as u32,
    }
}
