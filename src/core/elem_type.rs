//! Scalar element types.

use super::strides::Bit;

/// Kind of a scalar element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    BFloat,
    Signless,
    Signed,
    Unsigned,
}

/// Scalar kind plus bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElemType {
    pub kind: ScalarKind,
    pub width: u32,
}

impl ElemType {
    pub const F16: ElemType = ElemType::new(ScalarKind::Float, 16);
    pub const F32: ElemType = ElemType::new(ScalarKind::Float, 32);
    pub const BF16: ElemType = ElemType::new(ScalarKind::BFloat, 16);
    pub const I1: ElemType = ElemType::new(ScalarKind::Signless, 1);
    pub const I8: ElemType = ElemType::new(ScalarKind::Signless, 8);
    pub const I32: ElemType = ElemType::new(ScalarKind::Signless, 32);
    pub const SI8: ElemType = ElemType::new(ScalarKind::Signed, 8);
    pub const UI8: ElemType = ElemType::new(ScalarKind::Unsigned, 8);

    pub const fn new(kind: ScalarKind, width: u32) -> Self {
        Self { kind, width }
    }

    pub const fn size(&self) -> Bit {
        Bit(self.width as i64)
    }

    /// Parse the textual form (`f16`, `bf16`, `i1`, `si8`, `ui8`, ...).
    pub fn from_str(s: &str) -> Option<Self> {
        let (kind, digits) = if let Some(rest) = s.strip_prefix("bf") {
            (ScalarKind::BFloat, rest)
        } else if let Some(rest) = s.strip_prefix("si") {
            (ScalarKind::Signed, rest)
        } else if let Some(rest) = s.strip_prefix("ui") {
            (ScalarKind::Unsigned, rest)
        } else if let Some(rest) = s.strip_prefix('f') {
            (ScalarKind::Float, rest)
        } else if let Some(rest) = s.strip_prefix('i') {
            (ScalarKind::Signless, rest)
        } else {
            return None;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let width: u32 = digits.parse().ok()?;
        match kind {
            ScalarKind::Float if matches!(width, 16 | 32 | 64) => Some(Self::new(kind, width)),
            ScalarKind::BFloat if width == 16 => Some(Self::new(kind, width)),
            ScalarKind::Signless | ScalarKind::Signed | ScalarKind::Unsigned
                if (1..=64).contains(&width) =>
            {
                Some(Self::new(kind, width))
            }
            _ => None,
        }
    }

    pub fn mnemonic_prefix(&self) -> &'static str {
        match self.kind {
            ScalarKind::Float => "f",
            ScalarKind::BFloat => "bf",
            ScalarKind::Signless => "i",
            ScalarKind::Signed => "si",
            ScalarKind::Unsigned => "ui",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_elem_types() {
        assert_eq!(ElemType::from_str("f16"), Some(ElemType::F16));
        assert_eq!(ElemType::from_str("bf16"), Some(ElemType::BF16));
        assert_eq!(ElemType::from_str("i1"), Some(ElemType::I1));
        assert_eq!(ElemType::from_str("si8"), Some(ElemType::SI8));
        assert_eq!(ElemType::from_str("ui8"), Some(ElemType::UI8));
        assert_eq!(ElemType::from_str("f13"), None);
        assert_eq!(ElemType::from_str("x8"), None);
        assert_eq!(ElemType::from_str("i"), None);
    }
}
