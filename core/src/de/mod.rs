pub mod typeref;
pub mod value;
