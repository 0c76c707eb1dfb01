//! Memory spaces a buffer can be placed in.

/// Physical memory kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Ddr,
    CmxNn,
    CmxUpa,
    CsRam,
    Register,
}

impl MemoryKind {
    pub const fn name(self) -> &'static str {
        match self {
            MemoryKind::Ddr => "DDR",
            MemoryKind::CmxNn => "CMX_NN",
            MemoryKind::CmxUpa => "CMX_UPA",
            MemoryKind::CsRam => "CSRAM",
            MemoryKind::Register => "Register",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DDR" => Some(MemoryKind::Ddr),
            "CMX_NN" => Some(MemoryKind::CmxNn),
            "CMX_UPA" => Some(MemoryKind::CmxUpa),
            "CSRAM" => Some(MemoryKind::CsRam),
            "Register" => Some(MemoryKind::Register),
            _ => None,
        }
    }
}

/// Memory kind with an optional index (e.g. the owning cluster of a CMX slice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemSpace {
    pub kind: MemoryKind,
    pub index: Option<u32>,
}

impl MemSpace {
    pub const DDR: MemSpace = MemSpace::new(MemoryKind::Ddr);
    pub const CMX_NN: MemSpace = MemSpace::new(MemoryKind::CmxNn);

    pub const fn new(kind: MemoryKind) -> Self {
        Self { kind, index: None }
    }

    pub const fn indexed(kind: MemoryKind, index: u32) -> Self {
        Self { kind, index: Some(index) }
    }
}

impl Default for MemSpace {
    fn default() -> Self {
        MemSpace::DDR
    }
}
