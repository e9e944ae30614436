#![doc = include_str!("../README.md")]

mod catalog;
mod check;
mod consul;
mod descriptor;
mod error;
mod lifecycle;
mod memory;
mod record;
mod registrar;

pub use crate::catalog::*;
pub use crate::check::*;
pub use crate::consul::*;
pub use crate::descriptor::*;
pub use crate::error::*;
pub use crate::lifecycle::*;
pub use crate::memory::*;
pub use crate::record::*;
pub use crate::registrar::*;
