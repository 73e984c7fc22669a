use half::{bf16, f16};

/// Runtime tag for the element type stored in a buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub enum DType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    BF16,
    #[default]
    F32,
    F64,
}

impl DType {
    /// Returns the size of the type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

/// Element types that can live in a [`crate::Buffer`].
///
/// `Pod` gives checked byte reinterpretation; [`ElementType::is_nan`] drives
/// the NaN-tolerant equality on tensors.
pub trait ElementType:
    Copy + std::fmt::Debug + PartialEq + Send + Sync + 'static + bytemuck::Pod
{
    fn dt() -> DType;

    fn is_nan(&self) -> bool {
        false
    }
}

macro_rules! map_type {
    ($t:ty, $v:ident) => {
        impl ElementType for $t {
            fn dt() -> DType {
                DType::$v
            }
        }
    };
}

macro_rules! map_float_type {
    ($t:ty, $v:ident) => {
        impl ElementType for $t {
            fn dt() -> DType {
                DType::$v
            }

            fn is_nan(&self) -> bool {
                <$t>::is_nan(*self)
            }
        }
    };
}

map_type!(i8, I8);
map_type!(i16, I16);
map_type!(i32, I32);
map_type!(i64, I64);
map_type!(u8, U8);
map_type!(u16, U16);
map_type!(u32, U32);
map_type!(u64, U64);
map_float_type!(f16, F16);
map_float_type!(bf16, BF16);
map_float_type!(f32, F32);
map_float_type!(f64, F64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_rust_types() {
        assert_eq!(<f16 as ElementType>::dt().size_of(), std::mem::size_of::<f16>());
        assert_eq!(<i64 as ElementType>::dt().size_of(), std::mem::size_of::<i64>());
        assert_eq!(<u8 as ElementType>::dt().size_of(), 1);
    }

    #[test]
    fn nan_detection() {
        assert!(ElementType::is_nan(&f32::NAN));
        assert!(ElementType::is_nan(&bf16::NAN));
        assert!(!ElementType::is_nan(&1.0f64));
        assert!(!ElementType::is_nan(&7i32));
    }
}
