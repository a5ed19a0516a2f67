pub mod compile;
pub mod dump;
pub mod error;
pub mod exec;
pub mod modules;

#[cfg(test)]
mod compile_tests;
#[cfg(test)]
mod exec_tests;
#[cfg(test)]
mod test_utils;
