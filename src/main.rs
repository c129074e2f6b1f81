// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod controller;
mod error;
mod gui;
mod link;
mod sampler;
mod session;
mod simulator;
mod types;

use anyhow::{anyhow, Context, Result};
use config::SensorConfig;
use eframe::egui;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SensorConfig::from_env().context("invalid sensor configuration")?;
    log::info!(
        "Sensor: {:?} mode, {} @ {} baud",
        config.mode,
        config.address,
        config.baud_rate
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_title("HC-SR04 Distance Sensor GUI"),
        ..Default::default()
    };

    eframe::run_native(
        "HC-SR04 Distance Sensor GUI",
        options,
        Box::new(move |cc| Box::new(gui::DistanceScopeApp::new(cc, config))),
    )
    .map_err(|e| anyhow!("window closed with error: {e}"))
}
