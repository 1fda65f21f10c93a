//! printpage: render a web page in headless Chromium and hand back a PDF.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
