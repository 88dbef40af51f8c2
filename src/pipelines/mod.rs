//! Render pipeline construction for material programs.

pub mod basic;
