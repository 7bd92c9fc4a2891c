//! Testing utilities and harness for sectioned lists

mod recording;
pub mod test_rule;

pub use recording::*;
pub use test_rule::*;
