//! Element-wise reduction kernels.
//!
//! A fold is selected by (operation kind, datatype kind); each kernel is
//! statically typed and works on little-endian byte slices, so the match
//! engine and transports stay oblivious to element types.
//!
//! Supported combinations:
//! - `Sum`/`Prod`/`Min`/`Max`: all integer widths, `F32`, `F64`; `Sum` and
//!   `Prod` additionally on `ComplexF32`/`ComplexF64`.
//! - logical ops: integers and `Bool` (non-zero is true, results are 0/1).
//! - bitwise ops: integers, `Byte`, `Bool`.
//! - `MinLoc`/`MaxLoc`: integers and floats, over consecutive
//!   `(value, index)` element pairs; ties keep the lower index.
//!
//! Integer arithmetic wraps on overflow. Everything else is
//! `InvalidDatatype`.

use crate::error::{MpiError, Result};
use crate::types::{DataType, ReduceOp};

/// Read/write a fixed-width value from a little-endian byte slice
/// (alignment-safe).
trait LeBytes: Sized {
    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_le_bytes {
    ($($ty:ty),*) => {
        $(
            impl LeBytes for $ty {
                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    Self::from_le_bytes(
                        bytes.try_into().expect("slice length matches type size"),
                    )
                }
                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_bytes!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Types supporting the four arithmetic reductions.
trait Arith: LeBytes + Copy + PartialOrd {
    fn combine(a: Self, b: Self, op: ReduceOp) -> Self;
}

macro_rules! impl_arith {
    (int: $($ty:ty),*) => {
        $(
            impl Arith for $ty {
                #[inline]
                fn combine(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                        _ => unreachable!("arith kernel called with {op}"),
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Arith for $ty {
                #[inline]
                fn combine(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                        _ => unreachable!("arith kernel called with {op}"),
                    }
                }
            }
        )*
    };
}

impl_arith!(int: i8, i16, i32, i64, u8, u16, u32, u64);
impl_arith!(float: f32, f64);

/// Integer types supporting logical and bitwise reductions.
trait IntLogic: LeBytes + Copy {
    fn is_true(self) -> bool;
    fn from_bool(v: bool) -> Self;
    fn bits(a: Self, b: Self, op: ReduceOp) -> Self;
}

macro_rules! impl_int_logic {
    ($($ty:ty),*) => {
        $(
            impl IntLogic for $ty {
                #[inline]
                fn is_true(self) -> bool {
                    self != 0
                }
                #[inline]
                fn from_bool(v: bool) -> Self {
                    if v { 1 } else { 0 }
                }
                #[inline]
                fn bits(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::BitAnd => a & b,
                        ReduceOp::BitOr => a | b,
                        ReduceOp::BitXor => a ^ b,
                        _ => unreachable!("bitwise kernel called with {op}"),
                    }
                }
            }
        )*
    };
}

impl_int_logic!(i8, i16, i32, i64, u8, u16, u32, u64);

fn fold_arith<T: Arith>(dst: &mut [u8], src: &[u8], count: usize, op: ReduceOp) {
    let width = std::mem::size_of::<T>();
    for i in 0..count {
        let off = i * width;
        let a = T::read_le(&dst[off..off + width]);
        let b = T::read_le(&src[off..off + width]);
        T::combine(a, b, op).write_le(&mut dst[off..off + width]);
    }
}

/// Complex elements are `(re, im)` scalar pairs; `Prod` is complex
/// multiplication.
fn fold_complex<T: Arith>(dst: &mut [u8], src: &[u8], count: usize, op: ReduceOp)
where
    T: std::ops::Add<Output = T> + std::ops::Sub<Output = T> + std::ops::Mul<Output = T>,
{
    let width = std::mem::size_of::<T>();
    for i in 0..count {
        let off = 2 * i * width;
        let a_re = T::read_le(&dst[off..off + width]);
        let a_im = T::read_le(&dst[off + width..off + 2 * width]);
        let b_re = T::read_le(&src[off..off + width]);
        let b_im = T::read_le(&src[off + width..off + 2 * width]);
        let (re, im) = match op {
            ReduceOp::Sum => (a_re + b_re, a_im + b_im),
            ReduceOp::Prod => (a_re * b_re - a_im * b_im, a_re * b_im + a_im * b_re),
            _ => unreachable!("complex kernel called with {op}"),
        };
        re.write_le(&mut dst[off..off + width]);
        im.write_le(&mut dst[off + width..off + 2 * width]);
    }
}

fn fold_logical<T: IntLogic>(dst: &mut [u8], src: &[u8], count: usize, op: ReduceOp) {
    let width = std::mem::size_of::<T>();
    for i in 0..count {
        let off = i * width;
        let a = T::read_le(&dst[off..off + width]).is_true();
        let b = T::read_le(&src[off..off + width]).is_true();
        let r = match op {
            ReduceOp::LogicalAnd => a && b,
            ReduceOp::LogicalOr => a || b,
            ReduceOp::LogicalXor => a != b,
            _ => unreachable!("logical kernel called with {op}"),
        };
        T::from_bool(r).write_le(&mut dst[off..off + width]);
    }
}

fn fold_bitwise<T: IntLogic>(dst: &mut [u8], src: &[u8], count: usize, op: ReduceOp) {
    let width = std::mem::size_of::<T>();
    for i in 0..count {
        let off = i * width;
        let a = T::read_le(&dst[off..off + width]);
        let b = T::read_le(&src[off..off + width]);
        T::bits(a, b, op).write_le(&mut dst[off..off + width]);
    }
}

/// `(value, index)` pairs: keep the pair with the smaller (MinLoc) or
/// larger (MaxLoc) value; on equal values keep the smaller index.
/// Incomparable values (NaN) keep the left pair.
fn fold_loc<T: Arith>(dst: &mut [u8], src: &[u8], pairs: usize, op: ReduceOp) {
    let width = std::mem::size_of::<T>();
    for i in 0..pairs {
        let off = 2 * i * width;
        let a_val = T::read_le(&dst[off..off + width]);
        let a_idx = T::read_le(&dst[off + width..off + 2 * width]);
        let b_val = T::read_le(&src[off..off + width]);
        let b_idx = T::read_le(&src[off + width..off + 2 * width]);

        let take_b = match a_val.partial_cmp(&b_val) {
            Some(std::cmp::Ordering::Equal) => b_idx < a_idx,
            Some(ord) => match op {
                ReduceOp::MinLoc => ord == std::cmp::Ordering::Greater,
                ReduceOp::MaxLoc => ord == std::cmp::Ordering::Less,
                _ => unreachable!("loc kernel called with {op}"),
            },
            None => false,
        };
        if take_b {
            b_val.write_le(&mut dst[off..off + width]);
            b_idx.write_le(&mut dst[off + width..off + 2 * width]);
        }
    }
}

fn unsupported(dtype: DataType, op: ReduceOp) -> MpiError {
    MpiError::InvalidDatatype {
        dtype,
        op: op.name(),
    }
}

/// Fold `count` elements of `src` into `dst` with the kernel selected by
/// `(op, dtype)`.
pub(crate) fn fold(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
) -> Result<()> {
    let nbytes = count * dtype.size_in_bytes();
    if dst.len() < nbytes || src.len() < nbytes {
        return Err(MpiError::OperationFailed(format!(
            "reduction buffers shorter than {count} {dtype} elements"
        )));
    }

    use DataType as D;
    use ReduceOp as O;
    match op {
        O::Sum | O::Prod | O::Min | O::Max => match dtype {
            D::I8 => fold_arith::<i8>(dst, src, count, op),
            D::I16 => fold_arith::<i16>(dst, src, count, op),
            D::I32 => fold_arith::<i32>(dst, src, count, op),
            D::I64 => fold_arith::<i64>(dst, src, count, op),
            D::U8 => fold_arith::<u8>(dst, src, count, op),
            D::U16 => fold_arith::<u16>(dst, src, count, op),
            D::U32 => fold_arith::<u32>(dst, src, count, op),
            D::U64 => fold_arith::<u64>(dst, src, count, op),
            D::F32 => fold_arith::<f32>(dst, src, count, op),
            D::F64 => fold_arith::<f64>(dst, src, count, op),
            D::ComplexF32 if matches!(op, O::Sum | O::Prod) => {
                fold_complex::<f32>(dst, src, count, op)
            }
            D::ComplexF64 if matches!(op, O::Sum | O::Prod) => {
                fold_complex::<f64>(dst, src, count, op)
            }
            _ => return Err(unsupported(dtype, op)),
        },
        O::LogicalAnd | O::LogicalOr | O::LogicalXor => match dtype {
            D::I8 => fold_logical::<i8>(dst, src, count, op),
            D::I16 => fold_logical::<i16>(dst, src, count, op),
            D::I32 => fold_logical::<i32>(dst, src, count, op),
            D::I64 => fold_logical::<i64>(dst, src, count, op),
            D::U8 | D::Bool => fold_logical::<u8>(dst, src, count, op),
            D::U16 => fold_logical::<u16>(dst, src, count, op),
            D::U32 => fold_logical::<u32>(dst, src, count, op),
            D::U64 => fold_logical::<u64>(dst, src, count, op),
            _ => return Err(unsupported(dtype, op)),
        },
        O::BitAnd | O::BitOr | O::BitXor => match dtype {
            D::I8 => fold_bitwise::<i8>(dst, src, count, op),
            D::I16 => fold_bitwise::<i16>(dst, src, count, op),
            D::I32 => fold_bitwise::<i32>(dst, src, count, op),
            D::I64 => fold_bitwise::<i64>(dst, src, count, op),
            D::U8 | D::Byte | D::Bool => fold_bitwise::<u8>(dst, src, count, op),
            D::U16 => fold_bitwise::<u16>(dst, src, count, op),
            D::U32 => fold_bitwise::<u32>(dst, src, count, op),
            D::U64 => fold_bitwise::<u64>(dst, src, count, op),
            _ => return Err(unsupported(dtype, op)),
        },
        O::MinLoc | O::MaxLoc => {
            if count % 2 != 0 {
                return Err(MpiError::OperationFailed(format!(
                    "{op} needs an even element count for (value, index) pairs, got {count}"
                )));
            }
            let pairs = count / 2;
            match dtype {
                D::I8 => fold_loc::<i8>(dst, src, pairs, op),
                D::I16 => fold_loc::<i16>(dst, src, pairs, op),
                D::I32 => fold_loc::<i32>(dst, src, pairs, op),
                D::I64 => fold_loc::<i64>(dst, src, pairs, op),
                D::U8 => fold_loc::<u8>(dst, src, pairs, op),
                D::U16 => fold_loc::<u16>(dst, src, pairs, op),
                D::U32 => fold_loc::<u32>(dst, src, pairs, op),
                D::U64 => fold_loc::<u64>(dst, src, pairs, op),
                D::F32 => fold_loc::<f32>(dst, src, pairs, op),
                D::F64 => fold_loc::<f64>(dst, src, pairs, op),
                _ => return Err(unsupported(dtype, op)),
            }
        }
    }
    Ok(())
}

/// Check that `(op, dtype)` selects a kernel, without running one.
///
/// Collectives call this on every rank before any traffic moves, so an
/// unsupported pair fails everywhere instead of only where the fold runs.
pub(crate) fn ensure_supported(dtype: DataType, op: ReduceOp) -> Result<()> {
    fold(&mut [], &[], 0, dtype, op)
}

/// Identity element of a reduction, for types that have one.
trait Identity: LeBytes + Copy {
    fn identity(op: ReduceOp) -> Option<Self>;
}

macro_rules! impl_identity {
    (int: $($ty:ty),*) => {
        $(
            impl Identity for $ty {
                #[inline]
                fn identity(op: ReduceOp) -> Option<Self> {
                    match op {
                        ReduceOp::Sum => Some(0),
                        ReduceOp::Prod => Some(1),
                        ReduceOp::Min => Some(<$ty>::MAX),
                        ReduceOp::Max => Some(<$ty>::MIN),
                        ReduceOp::LogicalAnd => Some(1),
                        ReduceOp::LogicalOr | ReduceOp::LogicalXor => Some(0),
                        ReduceOp::BitAnd => Some(!0),
                        ReduceOp::BitOr | ReduceOp::BitXor => Some(0),
                        ReduceOp::MinLoc | ReduceOp::MaxLoc => None,
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Identity for $ty {
                #[inline]
                fn identity(op: ReduceOp) -> Option<Self> {
                    match op {
                        ReduceOp::Sum => Some(0.0),
                        ReduceOp::Prod => Some(1.0),
                        ReduceOp::Min => Some(<$ty>::MAX),
                        ReduceOp::Max => Some(<$ty>::MIN),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_identity!(int: i8, i16, i32, i64, u8, u16, u32, u64);
impl_identity!(float: f32, f64);

fn identity_typed<T: Identity>(count: usize, dtype: DataType, op: ReduceOp) -> Result<Vec<u8>> {
    let val = T::identity(op).ok_or_else(|| unsupported(dtype, op))?;
    let width = std::mem::size_of::<T>();
    let mut buf = vec![0u8; count * width];
    for i in 0..count {
        val.write_le(&mut buf[i * width..(i + 1) * width]);
    }
    Ok(buf)
}

/// Pair identity for MinLoc/MaxLoc: `(neutral value, index 0)` per pair.
fn identity_loc_typed<T: Identity>(
    count: usize,
    dtype: DataType,
    op: ReduceOp,
) -> Result<Vec<u8>> {
    let neutral = match op {
        ReduceOp::MinLoc => T::identity(ReduceOp::Min),
        ReduceOp::MaxLoc => T::identity(ReduceOp::Max),
        _ => None,
    }
    .ok_or_else(|| unsupported(dtype, op))?;
    let zero = T::identity(ReduceOp::Sum).ok_or_else(|| unsupported(dtype, op))?;

    let width = std::mem::size_of::<T>();
    let mut buf = vec![0u8; count * width];
    for i in 0..count / 2 {
        let off = 2 * i * width;
        neutral.write_le(&mut buf[off..off + width]);
        zero.write_le(&mut buf[off + width..off + 2 * width]);
    }
    Ok(buf)
}

/// A buffer of `count` identity elements for `(op, dtype)`, used where a
/// fold needs a neutral starting point (exclusive scan on rank 0).
pub(crate) fn identity(count: usize, dtype: DataType, op: ReduceOp) -> Result<Vec<u8>> {
    use DataType as D;
    use ReduceOp as O;

    if matches!(op, O::MinLoc | O::MaxLoc) {
        if count % 2 != 0 {
            return Err(MpiError::OperationFailed(format!(
                "{op} needs an even element count for (value, index) pairs, got {count}"
            )));
        }
        return match dtype {
            D::I8 => identity_loc_typed::<i8>(count, dtype, op),
            D::I16 => identity_loc_typed::<i16>(count, dtype, op),
            D::I32 => identity_loc_typed::<i32>(count, dtype, op),
            D::I64 => identity_loc_typed::<i64>(count, dtype, op),
            D::U8 => identity_loc_typed::<u8>(count, dtype, op),
            D::U16 => identity_loc_typed::<u16>(count, dtype, op),
            D::U32 => identity_loc_typed::<u32>(count, dtype, op),
            D::U64 => identity_loc_typed::<u64>(count, dtype, op),
            D::F32 => identity_loc_typed::<f32>(count, dtype, op),
            D::F64 => identity_loc_typed::<f64>(count, dtype, op),
            _ => Err(unsupported(dtype, op)),
        };
    }

    match dtype {
        D::I8 => identity_typed::<i8>(count, dtype, op),
        D::I16 => identity_typed::<i16>(count, dtype, op),
        D::I32 => identity_typed::<i32>(count, dtype, op),
        D::I64 => identity_typed::<i64>(count, dtype, op),
        D::U8 => identity_typed::<u8>(count, dtype, op),
        D::U16 => identity_typed::<u16>(count, dtype, op),
        D::U32 => identity_typed::<u32>(count, dtype, op),
        D::U64 => identity_typed::<u64>(count, dtype, op),
        D::F32 => identity_typed::<f32>(count, dtype, op),
        D::F64 => identity_typed::<f64>(count, dtype, op),
        D::Bool => match op {
            O::LogicalAnd => Ok(vec![1u8; count]),
            O::LogicalOr | O::LogicalXor | O::BitOr | O::BitXor => Ok(vec![0u8; count]),
            O::BitAnd => Ok(vec![0xFF; count]),
            _ => Err(unsupported(dtype, op)),
        },
        D::Byte => match op {
            O::BitAnd => Ok(vec![0xFF; count]),
            O::BitOr | O::BitXor => Ok(vec![0u8; count]),
            _ => Err(unsupported(dtype, op)),
        },
        D::ComplexF32 | D::ComplexF64 => {
            let scalar = if dtype == D::ComplexF32 {
                DataType::F32
            } else {
                DataType::F64
            };
            match op {
                // (0, 0) per element.
                O::Sum => identity_typed_pairwise(count, scalar, 0.0, 0.0),
                // (1, 0) per element.
                O::Prod => identity_typed_pairwise(count, scalar, 1.0, 0.0),
                _ => Err(unsupported(dtype, op)),
            }
        }
        _ => Err(unsupported(dtype, op)),
    }
}

fn identity_typed_pairwise(
    count: usize,
    scalar: DataType,
    re: f64,
    im: f64,
) -> Result<Vec<u8>> {
    let width = scalar.size_in_bytes();
    let mut buf = vec![0u8; count * 2 * width];
    for i in 0..count {
        let off = 2 * i * width;
        match scalar {
            DataType::F32 => {
                (re as f32).write_le(&mut buf[off..off + width]);
                (im as f32).write_le(&mut buf[off + width..off + 2 * width]);
            }
            _ => {
                re.write_le(&mut buf[off..off + width]);
                im.write_le(&mut buf[off + width..off + 2 * width]);
            }
        }
    }
    Ok(buf)
}
