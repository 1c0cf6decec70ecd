//! Trigonometric kernels
//!
//! Inputs of any integer or float width widen to `f64`.

use super::Column;

/// Numeric element types accepted by the kernels.
pub trait ToF64: Copy {
    fn to_f64(self) -> f64;
}

macro_rules! impl_to_f64 {
    ($($t:ty),*) => {
        $(
            impl ToF64 for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_to_f64!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

fn apply<T: ToF64>(col: &Column<T>, f: fn(f64) -> f64) -> Column<f64> {
    col.map(|v| Some(f((*v).to_f64())))
}

pub fn sin<T: ToF64>(col: &Column<T>) -> Column<f64> {
    apply(col, f64::sin)
}

pub fn cos<T: ToF64>(col: &Column<T>) -> Column<f64> {
    apply(col, f64::cos)
}

pub fn tan<T: ToF64>(col: &Column<T>) -> Column<f64> {
    apply(col, f64::tan)
}

pub fn atan<T: ToF64>(col: &Column<T>) -> Column<f64> {
    apply(col, f64::atan)
}
