pub mod controller;

pub use controller::{MonitorController, MonitorSnapshot};
