// src/gui.rs
use crate::config::SensorConfig;
use crate::controller::Controller;
use crate::link::{Connector, SerialConnector};
use crate::simulator::SimulatedConnector;
use crate::types::*;
use eframe::egui;
use egui::{Color32, RichText, Vec2};
use egui_plot::{Line, Plot, PlotPoints};
use std::sync::Arc;
use std::time::Duration;

const READOUT_BLUE: Color32 = Color32::from_rgb(0, 0, 255);
const START_GREEN: Color32 = Color32::from_rgb(0, 128, 0);
const STOP_RED: Color32 = Color32::from_rgb(200, 0, 0);
const CLEAR_GRAY: Color32 = Color32::from_rgb(128, 128, 128);

pub fn readout_text(distance: Option<f64>) -> String {
    match distance {
        Some(d) => format!("Distance: {:.2} cm", d),
        None => "Distance: -- cm".to_owned(),
    }
}

fn log_color(kind: LogKind) -> Color32 {
    match kind {
        LogKind::Info => Color32::from_rgb(90, 90, 100),
        LogKind::Data => Color32::from_rgb(30, 30, 35),
        LogKind::Error => Color32::from_rgb(200, 40, 40),
    }
}

pub struct DistanceScopeApp {
    controller: Controller,
    // Last Clear the chart has seen; a mismatch resets the plot view.
    chart_generation: u64,
}

impl DistanceScopeApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: SensorConfig) -> Self {
        let connector: Box<dyn Connector> = match config.mode {
            ConnectionMode::Hardware => Box::new(SerialConnector),
            ConnectionMode::Simulation => Box::new(SimulatedConnector::default()),
        };
        let ctx = cc.egui_ctx.clone();
        let controller = Controller::new(config, connector)
            .with_notify(Arc::new(move || ctx.request_repaint()));

        let mut visuals = egui::Visuals::light();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(245, 245, 247);
        visuals.window_fill = Color32::from_rgb(250, 250, 252);
        cc.egui_ctx.set_visuals(visuals);

        Self {
            controller,
            chart_generation: 0,
        }
    }

    fn command_button(ui: &mut egui::Ui, enabled: bool, label: &str, fill: Color32) -> bool {
        let button = egui::Button::new(RichText::new(label).size(15.0).color(Color32::WHITE))
            .fill(fill)
            .min_size(Vec2::new(130.0, 30.0));
        ui.add_enabled(enabled, button).clicked()
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(6.0);
            ui.heading("HC-SR04 Ultrasonic Sensor");
            ui.label(
                RichText::new(readout_text(self.controller.readout()))
                    .size(24.0)
                    .color(READOUT_BLUE),
            );
            ui.add_space(4.0);
        });

        let running = self.controller.is_running();
        let mut command = None;
        ui.horizontal(|ui| {
            // Centre the three buttons.
            let row_width = 3.0 * 130.0 + 2.0 * ui.spacing().item_spacing.x;
            ui.add_space(((ui.available_width() - row_width) / 2.0).max(0.0));
            if Self::command_button(ui, !running, "Start Reading", START_GREEN) {
                command = Some(GuiCommand::Start);
            }
            if Self::command_button(ui, running, "Stop Reading", STOP_RED) {
                command = Some(GuiCommand::Stop);
            }
            if Self::command_button(ui, true, "Clear Graph", CLEAR_GRAY) {
                command = Some(GuiCommand::Clear);
            }
        });
        if let Some(cmd) = command {
            self.controller.dispatch(cmd);
        }

        let config = self.controller.config();
        ui.vertical_centered(|ui| {
            ui.label(
                RichText::new(format!(
                    "{:?} | {:?} | {} @ {} baud | {} samples",
                    self.controller.link_state(),
                    config.mode,
                    config.address,
                    config.baud_rate,
                    self.controller.sample_count()
                ))
                .small()
                .color(Color32::from_rgb(120, 120, 130)),
            );
        });
        ui.add_space(4.0);
    }

    fn show_chart(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| ui.strong("Distance vs Time"));

        let mut plot = Plot::new("distance_plot")
            .x_axis_label("Time (s)")
            .y_axis_label("Distance (cm)")
            .auto_bounds_x()
            .auto_bounds_y();
        if self.chart_generation != self.controller.chart_generation() {
            self.chart_generation = self.controller.chart_generation();
            plot = plot.reset();
        }

        // Full redraw from the session snapshot every frame.
        let points: PlotPoints = self
            .controller
            .samples()
            .iter()
            .map(|s| [s.timestamp, s.value])
            .collect();
        plot.show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(points)
                    .name("Distance")
                    .color(Color32::BLUE)
                    .width(1.5),
            );
        });
    }

    fn show_serial_monitor(&self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Serial Monitor Output:").size(14.0));
        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for entry in self.controller.log_entries() {
                    ui.label(
                        RichText::new(&entry.text)
                            .monospace()
                            .color(log_color(entry.kind)),
                    );
                }
            });
    }

    fn show_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.controller.alert().map(str::to_owned) else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Connection Error")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(message);
                ui.add_space(6.0);
                ui.vertical_centered(|ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });
        if dismissed {
            self.controller.dismiss_alert();
        }
    }
}

impl eframe::App for DistanceScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.pump();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| self.show_controls(ui));
        egui::TopBottomPanel::bottom("serial_monitor")
            .resizable(true)
            .default_height(170.0)
            .show(ctx, |ui| self.show_serial_monitor(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.show_chart(ui));

        self.show_alert(ctx);

        if self.controller.is_running() {
            // The sampler wakes us on data; this covers quiet links.
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }
}
