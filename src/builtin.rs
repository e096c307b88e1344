use std::fmt;

/// A WGSL builtin function.
///
/// Shared by the constant evaluator and by IR builtin call instructions.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum BuiltinFn {
    Abs,
    All,
    Any,
    Ceil,
    Clamp,
    CountLeadingZeros,
    CountOneBits,
    CountTrailingZeros,
    Cross,
    Determinant,
    Dot,
    ExtractBits,
    FirstLeadingBit,
    FirstTrailingBit,
    Floor,
    InsertBits,
    Length,
    Max,
    Min,
    ReverseBits,
    Saturate,
    Select,
    Sign,
    Sqrt,
    Step,
    Transpose,
    Trunc,
    TextureDimensions,
    TextureSampleLevel,
    TextureSampleBaseClampToEdge,
}

impl BuiltinFn {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::All => "all",
            Self::Any => "any",
            Self::Ceil => "ceil",
            Self::Clamp => "clamp",
            Self::CountLeadingZeros => "countLeadingZeros",
            Self::CountOneBits => "countOneBits",
            Self::CountTrailingZeros => "countTrailingZeros",
            Self::Cross => "cross",
            Self::Determinant => "determinant",
            Self::Dot => "dot",
            Self::ExtractBits => "extractBits",
            Self::FirstLeadingBit => "firstLeadingBit",
            Self::FirstTrailingBit => "firstTrailingBit",
            Self::Floor => "floor",
            Self::InsertBits => "insertBits",
            Self::Length => "length",
            Self::Max => "max",
            Self::Min => "min",
            Self::ReverseBits => "reverseBits",
            Self::Saturate => "saturate",
            Self::Select => "select",
            Self::Sign => "sign",
            Self::Sqrt => "sqrt",
            Self::Step => "step",
            Self::Transpose => "transpose",
            Self::Trunc => "trunc",
            Self::TextureDimensions => "textureDimensions",
            Self::TextureSampleLevel => "textureSampleLevel",
            Self::TextureSampleBaseClampToEdge => "textureSampleBaseClampToEdge",
        }
    }

    /// Number of arguments the builtin takes.
    pub const fn argument_count(self) -> usize {
        match self {
            Self::Abs
            | Self::All
            | Self::Any
            | Self::Ceil
            | Self::CountLeadingZeros
            | Self::CountOneBits
            | Self::CountTrailingZeros
            | Self::Determinant
            | Self::FirstLeadingBit
            | Self::FirstTrailingBit
            | Self::Floor
            | Self::Length
            | Self::ReverseBits
            | Self::Saturate
            | Self::Sign
            | Self::Sqrt
            | Self::Transpose
            | Self::Trunc
            | Self::TextureDimensions => 1,
            Self::Cross | Self::Dot | Self::Max | Self::Min | Self::Step => 2,
            Self::Clamp | Self::ExtractBits | Self::Select | Self::TextureSampleBaseClampToEdge => 3,
            Self::InsertBits | Self::TextureSampleLevel => 4,
        }
    }

    /// Whether calls to this builtin may be folded into constants.
    pub const fn is_const(self) -> bool {
        !matches!(
            self,
            Self::TextureDimensions | Self::TextureSampleLevel | Self::TextureSampleBaseClampToEdge
        )
    }
}

impl fmt::Display for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
