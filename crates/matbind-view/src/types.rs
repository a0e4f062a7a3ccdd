//! Element types supported by the native matrix library.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BindError;

/// Element type of a native matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 64-bit floating point (double)
    F64,
    /// 32-bit floating point (float)
    F32,
}

impl ElementType {
    pub const ALL: [ElementType; 2] = [ElementType::F64, ElementType::F32];

    /// Single-character tag used in native symbol names.
    pub fn tag(self) -> char {
        match self {
            ElementType::F64 => 'd',
            ElementType::F32 => 'f',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::F64 => "float64",
            ElementType::F32 => "float32",
        }
    }

    pub fn layout(self) -> ElementLayout {
        match self {
            ElementType::F64 => ElementLayout::of::<f64>(),
            ElementType::F32 => ElementLayout::of::<f32>(),
        }
    }

    fn supported() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|t| t.name()).collect();
        format!("({})", names.join(", "))
    }
}

impl FromStr for ElementType {
    type Err = BindError;

    /// Parse a host dtype name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float64" | "f64" | "double" | "d" => Ok(ElementType::F64),
            "float32" | "f32" | "float" | "single" | "f" => Ok(ElementType::F32),
            _ => Err(BindError::InvalidType {
                given: s.to_string(),
                supported: Self::supported(),
            }),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte size and alignment of one stored element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementLayout {
    pub size: usize,
    pub align: usize,
}

impl ElementLayout {
    fn of<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }
}

/// Rust scalar types that can back a matrix view.
pub trait NativeElement: Copy + fmt::Debug + PartialEq + 'static {
    const ELEMENT_TYPE: ElementType;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl NativeElement for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::F64;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

impl NativeElement for f32 {
    const ELEMENT_TYPE: ElementType = ElementType::F32;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}
