mod core;

pub use core::{cmd_pick, cmd_scan, PickRequest};
