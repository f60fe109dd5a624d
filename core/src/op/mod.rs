mod ops;


pub(crate) use ops::UNARY_PRIORITY;
pub use ops::{BinOp, UnOp, compare_le, compare_lt};
