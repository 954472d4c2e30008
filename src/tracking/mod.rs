//! Live trip tracking engine

pub mod animator;
pub mod geometry;
pub mod progress;
pub mod resolver;
pub mod session;
pub mod trip;

#[cfg(test)]
mod tests;
