#![allow(dead_code)]

pub mod builders;
pub mod recording;
pub mod strategies;

pub use builders::*;
pub use recording::*;
pub use strategies::*;
