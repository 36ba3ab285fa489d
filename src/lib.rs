#[macro_use]
extern crate log;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate lazy_static;

pub mod browser_controller;
pub mod clock;
pub mod context;
pub mod download;
pub mod exporter;
pub mod logging;
pub mod mailer;
pub mod navigator;
pub mod pages;
pub mod pipeline;
pub mod readiness;
pub mod reports;
pub mod runner;
pub mod scheduler;
pub mod settle;
pub mod surface;
pub mod types;
pub mod utils;
