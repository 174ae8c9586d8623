//! 命令の分類
//!
//! ステップオーバーと finish が参照する制御フロー命令の分類です。
//! オペコード値はコアの表現（1バイト、またはCB/DD/ED/FDプレフィックス付きは `prefix << 8 | op`）に従います。
//! DD/FDプレフィックス付きの命令はプレフィックスなしの命令として分類されます。

/// フラグ条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    NonZero,
    Zero,
    NoCarry,
    Carry,
    ParityOdd,
    ParityEven,
    Plus,
    Minus,
}

const FLAG_C: u8 = 0x01;
const FLAG_PV: u8 = 0x04;
const FLAG_Z: u8 = 0x40;
const FLAG_S: u8 = 0x80;

impl Condition {
    /// 命令中の3ビットの条件コードから
    pub fn from_code(cc: u8) -> Self {
        match cc & 7 {
            0 => Self::NonZero,
            1 => Self::Zero,
            2 => Self::NoCarry,
            3 => Self::Carry,
            4 => Self::ParityOdd,
            5 => Self::ParityEven,
            6 => Self::Plus,
            _ => Self::Minus,
        }
    }

    /// フラグレジスタの値で条件が成立するか
    pub fn holds(self, f: u8) -> bool {
        match self {
            Self::NonZero => f & FLAG_Z == 0,
            Self::Zero => f & FLAG_Z != 0,
            Self::NoCarry => f & FLAG_C == 0,
            Self::Carry => f & FLAG_C != 0,
            Self::ParityOdd => f & FLAG_PV == 0,
            Self::ParityEven => f & FLAG_PV != 0,
            Self::Plus => f & FLAG_S == 0,
            Self::Minus => f & FLAG_S != 0,
        }
    }
}

/// 命令の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionClass {
    /// `call nn`
    Call,
    /// `call cc,nn`
    ConditionalCall(Condition),
    /// `rst n`
    Restart,
    /// `ret`
    Return,
    /// `ret cc`
    ConditionalReturn(Condition),
    /// `retn` / `reti`
    InterruptReturn,
    /// `jp nn` / `jr e`
    Jump,
    /// `jp (hl)` / `jp (ix)` / `jp (iy)`
    IndirectJump,
    /// `jp cc,nn` / `jr cc,e`、および `djnz`（条件なし）
    Branch(Option<Condition>),
    /// `halt`
    Halt,
    Other,
}

impl InstructionClass {
    /// 実行後のPCが戻り先・分岐先になる命令か（ステップオーバーでは現在のPCを目標にする）
    pub fn transfers_control(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::IndirectJump
                | Self::Branch(_)
                | Self::Return
                | Self::ConditionalReturn(_)
                | Self::InterruptReturn
        )
    }
}

/// オペコードを分類する
pub fn classify(op: u32) -> InstructionClass {
    // DD/FD xx は xx として扱う
    let op = if op & !0x20ff == 0xdd00 { op & 0xff } else { op };

    if op > 0xff {
        // ED 45/4D/55/5D/65/6D/75/7D
        return if op & 0xffc7 == 0xed45 {
            InstructionClass::InterruptReturn
        } else {
            InstructionClass::Other
        };
    }

    let op = op as u8;
    let cc = Condition::from_code(op >> 3);
    match op {
        0x76 => InstructionClass::Halt,
        0xcd => InstructionClass::Call,
        0xc9 => InstructionClass::Return,
        0xc3 | 0x18 => InstructionClass::Jump,
        0xe9 => InstructionClass::IndirectJump,
        0x10 => InstructionClass::Branch(None),
        0x20 | 0x28 | 0x30 | 0x38 => InstructionClass::Branch(Some(Condition::from_code((op >> 3) & 3))),
        _ if op & 0xc7 == 0xc4 => InstructionClass::ConditionalCall(cc),
        _ if op & 0xc7 == 0xc7 => InstructionClass::Restart,
        _ if op & 0xc7 == 0xc0 => InstructionClass::ConditionalReturn(cc),
        _ if op & 0xc7 == 0xc2 => InstructionClass::Branch(Some(cc)),
        _ => InstructionClass::Other,
    }
}
