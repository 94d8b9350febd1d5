//! Application entry point for the ForceAtlas2 layout viewer.
//!
//! This binary installs the log subscriber, sets up eframe/egui and
//! delegates all interactive logic and rendering to [`Viewer`] from the
//! `viewer` module.

mod generator;
mod viewer;

use tracing_subscriber::EnvFilter;
use viewer::Viewer;

/// Starts the native eframe application.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `info`).
///
/// ### Returns
/// - `Ok(())` if the application runs to completion without errors.
/// - `Err` if eframe fails to create the native window or event loop.
fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    eframe::run_native(
        "ForceAtlas2",
        eframe::NativeOptions::default(),
        Box::new(|_cc| Ok(Box::new(Viewer::new()))),
    )
}
