pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Cat, Init, Ls, Put, Version};
