pub mod diary;
pub mod warehouse;

pub use diary::DiaryDocument;
pub use warehouse::{DimensionKey, Period};
