//! ハードウェア構成（ROM/RAMサイズ、ページ）

/// メモリページのサイズ（16KB）
pub const PAGE_SIZE: u32 = 0x4000;

/// 物理メモリ構成
///
/// 物理アドレス空間は ROM（0 から `rom_size`）の後に RAM が続きます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hardware {
    pub rom_size: u32,
    pub ram_size: u32,
    /// これ以上のページ番号はRAMページとして扱われる
    pub ram_page_base: u32,
}

impl Hardware {
    /// 構成を検証して作成する
    ///
    /// ROMとRAMの合計が32ビットに収まらない場合は `None`。
    pub fn checked(rom_size: u32, ram_size: u32, ram_page_base: u32) -> Option<Self> {
        rom_size.checked_add(ram_size)?;
        Some(Self {
            rom_size,
            ram_size,
            ram_page_base,
        })
    }

    /// 物理メモリ全体のサイズ
    pub fn memory_size(&self) -> u32 {
        self.rom_size + self.ram_size
    }

    /// `PAGE:OFFSET` 形式を物理アドレスに変換する
    ///
    /// オフセットは14ビットにマスクされます。RAMページはRAMサイズで、
    /// ROMページはROMサイズで折り返します。
    pub fn page_address(&self, page: u32, offset: u32) -> u32 {
        let offset = offset & (PAGE_SIZE - 1);
        if page >= self.ram_page_base {
            let addr = offset.wrapping_add((page - self.ram_page_base).wrapping_shl(14));
            addr % self.ram_size.max(1) + self.rom_size
        } else {
            let addr = offset.wrapping_add(page.wrapping_shl(14));
            addr % self.rom_size.max(1)
        }
    }

    /// 物理アドレスの表示幅（16進桁数）
    pub fn address_width(&self) -> usize {
        if self.memory_size() > 0xffff {
            6
        } else {
            4
        }
    }
}

impl Default for Hardware {
    /// TI-83 Plus相当の構成（512KB ROM、32KB RAM）
    fn default() -> Self {
        Self {
            rom_size: 0x80000,
            ram_size: 0x8000,
            ram_page_base: 0x40,
        }
    }
}
