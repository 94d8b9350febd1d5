//! Interactive ForceAtlas2 layout viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns the graph, the layout engine
//! and the run configuration, and implements [`eframe::App`] to render and
//! control the layout through an egui UI.

use crate::generator::ClusterSpec;
use eframe::App;
use fa2_core::{Config, Dimensions, FailurePolicy, ForceAtlas2, Graph, types::NodeId};
use glam::{DVec2, DVec3};
use tracing::{error, info, warn};

/// Click radius for picking a node, in screen pixels.
const PICK_RADIUS: f64 = 12.0;

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The layout core: [`Graph`], [`ForceAtlas2`], [`Config`].
/// - The graph generator settings ([`ClusterSpec`]).
/// - UI state (pan/zoom, timing, last error).
///
/// The typical per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true` and enough time has passed, call [`Viewer::step_once`].
/// 3. Render edges and nodes, pinned nodes highlighted.
///
/// The engine copies its configuration at construction, so edits made in
/// the config panel only take effect once they are applied, which rebuilds
/// the engine over the current positions.
pub struct Viewer {
    graph: Graph,
    engine: Option<ForceAtlas2>,
    cfg: Config,
    spec: ClusterSpec,

    running: bool,
    zoom: f32,
    pan: egui::Vec2,

    step_interval: f64,
    last_step_time: f64,
    last_step_dt: f64,
    last_distance: f64,
    last_error: Option<String>,
}

impl Viewer {
    /// Creates a viewer over a freshly generated clustered graph.
    pub fn new() -> Self {
        let spec = ClusterSpec::default();
        let cfg = Config {
            dimensions: Dimensions::Two,
            ..Config::for_node_count(spec.node_count())
        };
        let mut viewer = Self {
            graph: Graph::default(),
            engine: None,
            cfg,
            spec,
            running: false,
            zoom: 0.5,
            pan: egui::vec2(0.0, 0.0),
            step_interval: 0.02,
            last_step_time: 0.0,
            last_step_dt: 0.0,
            last_distance: 0.0,
            last_error: None,
        };
        viewer.regenerate();
        viewer
    }

    /// Replaces the graph with a new one from the generator settings and
    /// restarts the layout.
    fn regenerate(&mut self) {
        self.graph = self.spec.generate(self.cfg.dimensions);
        info!(
            nodes = self.graph.nodes.len(),
            edges = self.graph.edges.len(),
            "generated graph"
        );
        self.rebuild_engine();
        self.running = false;
    }

    /// Starts a new run over the current positions with the current config.
    fn rebuild_engine(&mut self) {
        match ForceAtlas2::new(&self.graph, self.cfg) {
            Ok(engine) => {
                self.engine = Some(engine);
                self.last_error = None;
            }
            Err(err) => {
                warn!(%err, "cannot start layout");
                self.engine = None;
                self.last_error = Some(err.to_string());
                self.running = false;
            }
        }
        self.last_distance = 0.0;
    }

    /// Advances the layout by a single step.
    ///
    /// A failing step stops auto-running and is shown in the status bar.
    fn step_once(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match engine.step(&mut self.graph) {
            Ok(distance) => self.last_distance = distance,
            Err(err) => {
                error!(%err, "layout step failed");
                self.last_error = Some(err.to_string());
                self.running = false;
            }
        }
    }

    /// Toggles the pinned flag of the node nearest to `world`, if one lies
    /// within `max_distance`.
    fn toggle_pin(&mut self, world: DVec2, max_distance: f64) -> Option<NodeId> {
        let id = self.nearest_node(world, max_distance)?;
        let node = &mut self.graph.nodes[id];
        node.fixed = !node.fixed;
        Some(id)
    }

    fn nearest_node(&self, world: DVec2, max_distance: f64) -> Option<NodeId> {
        self.graph
            .nodes
            .iter()
            .enumerate()
            .map(|(id, n)| (id, (n.position.truncate() - world).length()))
            .filter(|&(_, d)| d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Converts a world-space position to screen-space.
    ///
    /// Only x and y are drawn; a 3D layout is seen from above. World
    /// coordinates are scaled by `zoom`, offset by `pan`, and centered inside
    /// `rect`, with the y-axis flipped so that positive y goes up.
    fn world_to_screen(&self, p: DVec3, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + p.x as f32 * self.zoom + self.pan.x,
            center.y - p.y as f32 * self.zoom + self.pan.y,
        )
    }

    /// Converts a screen-space position back to world-space (x and y).
    ///
    /// Inverse of [`Viewer::world_to_screen`] up to floating point rounding.
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> DVec2 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        DVec2::new(x as f64, y as f64)
    }

    /// Helper to draw a labeled numeric [`egui::DragValue`].
    fn labeled_drag<N: egui::emath::Numeric>(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut N,
        range: std::ops::RangeInclusive<N>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// A checkbox that turns an optional value on (with `default`) or off,
    /// followed by a drag value while it is on.
    fn optional_drag<N: egui::emath::Numeric>(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut Option<N>,
        default: N,
        range: std::ops::RangeInclusive<N>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            let mut enabled = value.is_some();
            if ui.checkbox(&mut enabled, label).changed() {
                *value = enabled.then_some(default);
            }
            if let Some(v) = value {
                ui.add(egui::DragValue::new(v).range(range).speed(speed));
            }
        });
    }

    /// Builds the top panel UI (run controls, stepping, zoom).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let can_run = self.engine.is_some();
                if ui
                    .add_enabled(
                        can_run,
                        egui::Button::new(if self.running { "⏸ Pause" } else { "▶ Run" }),
                    )
                    .clicked()
                {
                    self.running = !self.running;
                }

                ui.add(
                    egui::DragValue::new(&mut self.step_interval)
                        .prefix("dt target = ")
                        .range(0.0..=1.0)
                        .speed(0.01),
                );

                if ui.add_enabled(can_run, egui::Button::new("Step")).clicked() {
                    let now = ctx.input(|i| i.time);
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = now - self.last_step_time;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                if ui.button("Restart layout").clicked() {
                    self.rebuild_engine();
                }

                if ui.button("New graph").clicked() {
                    self.regenerate();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.zoom, 0.05..=10.0).text("Zoom"));
            });
        });
    }

    /// Builds the bottom status bar (step, speed, change per node, counts).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("dt last = {:.3} s", self.last_step_dt));
                ui.separator();
                ui.label(format!(
                    "nodes = {}, edges = {}",
                    self.graph.nodes.len(),
                    self.graph.edges.len()
                ));
                if let Some(engine) = &self.engine {
                    let per_node = if self.graph.nodes.is_empty() {
                        0.0
                    } else {
                        self.last_distance / self.graph.nodes.len() as f64
                    };
                    ui.label(format!("change/node = {per_node:.4}"));
                    ui.label(format!("efficiency = {:.3}", engine.speed_efficiency()));
                    ui.label(format!("speed = {:.3}", engine.speed()));
                    ui.label(format!("step = {}", engine.step_count()));
                }
                if let Some(err) = &self.last_error {
                    ui.colored_label(egui::Color32::LIGHT_RED, err);
                }
            });
        });
    }

    /// Builds the right-hand panel: generator settings and every layout tunable.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Graph");
                    Self::labeled_drag(ui, "clusters:", &mut self.spec.clusters, 1..=50, 0.1);
                    Self::labeled_drag(
                        ui,
                        "cluster_size:",
                        &mut self.spec.cluster_size,
                        1..=500,
                        1.0,
                    );
                    Self::labeled_drag(ui, "p_intra:", &mut self.spec.p_intra, 0.0..=1.0, 0.005);
                    Self::labeled_drag(ui, "p_inter:", &mut self.spec.p_inter, 0.0..=1.0, 0.001);
                    Self::labeled_drag(ui, "node_size:", &mut self.spec.node_size, 0.0..=50.0, 0.1);
                    Self::labeled_drag(ui, "seed:", &mut self.spec.seed, 0..=u64::MAX, 1.0);
                    if ui.button("Generate").clicked() {
                        self.regenerate();
                    }

                    ui.separator();
                    ui.heading("Forces");
                    Self::labeled_drag(
                        ui,
                        "scaling_ratio:",
                        &mut self.cfg.scaling_ratio,
                        0.01..=1000.0,
                        0.1,
                    );
                    Self::labeled_drag(ui, "gravity:", &mut self.cfg.gravity, 0.0..=100.0, 0.05);
                    ui.checkbox(&mut self.cfg.strong_gravity_mode, "strong gravity");
                    ui.checkbox(&mut self.cfg.lin_log_mode, "lin-log mode");
                    ui.checkbox(
                        &mut self.cfg.outbound_attraction_distribution,
                        "dissuade hubs (outbound distribution)",
                    );
                    ui.checkbox(&mut self.cfg.adjust_sizes, "prevent overlap");
                    Self::labeled_drag(
                        ui,
                        "edge_weight_influence:",
                        &mut self.cfg.edge_weight_influence,
                        0.0..=5.0,
                        0.05,
                    );
                    Self::optional_drag(
                        ui,
                        "weight_as_of:",
                        &mut self.cfg.weight_as_of,
                        0.0,
                        f64::MIN..=f64::MAX,
                        0.1,
                    );

                    ui.separator();
                    ui.heading("Speed");
                    Self::labeled_drag(
                        ui,
                        "jitter_tolerance:",
                        &mut self.cfg.jitter_tolerance,
                        0.01..=10.0,
                        0.01,
                    );
                    ui.checkbox(&mut self.cfg.alt_speed, "alternative speed");

                    ui.separator();
                    ui.heading("Barnes-Hut");
                    ui.checkbox(&mut self.cfg.barnes_hut_optimize, "enabled");
                    Self::labeled_drag(
                        ui,
                        "theta:",
                        &mut self.cfg.barnes_hut_theta,
                        0.0..=5.0,
                        0.01,
                    );
                    Self::labeled_drag(
                        ui,
                        "tree_refresh_interval:",
                        &mut self.cfg.tree_refresh_interval,
                        1..=1000,
                        0.1,
                    );
                    ui.checkbox(
                        &mut self.cfg.refresh_center_when_not_rebuilding,
                        "refresh centers between rebuilds",
                    );
                    let derived_rounds = self.cfg.split_rounds();
                    Self::optional_drag(
                        ui,
                        "tree_split_rounds:",
                        &mut self.cfg.tree_split_rounds,
                        derived_rounds,
                        1..=8,
                        0.05,
                    );

                    ui.separator();
                    ui.heading("Execution");
                    Self::labeled_drag(ui, "workers:", &mut self.cfg.worker_count, 1..=256, 0.1);
                    ui.horizontal(|ui| {
                        ui.radio_value(&mut self.cfg.dimensions, Dimensions::Two, "2D");
                        ui.radio_value(&mut self.cfg.dimensions, Dimensions::Three, "3D");
                    });
                    ui.horizontal(|ui| {
                        ui.radio_value(
                            &mut self.cfg.failure_policy,
                            FailurePolicy::FailFast,
                            "fail fast",
                        );
                        ui.radio_value(
                            &mut self.cfg.failure_policy,
                            FailurePolicy::BestEffort,
                            "best effort",
                        );
                    });

                    ui.separator();
                    ui.horizontal(|ui| {
                        if ui.button("Apply").clicked() {
                            self.rebuild_engine();
                        }
                        if ui.button("Defaults for graph size").clicked() {
                            self.cfg = Config {
                                dimensions: self.cfg.dimensions,
                                ..Config::for_node_count(self.graph.nodes.len())
                            };
                            self.rebuild_engine();
                        }
                    });
                });
            });
    }

    /// Builds the central panel where the graph is drawn and interacted with.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            // Pan with drag.
            if response.dragged() {
                self.pan += response.drag_delta();
            }

            // Click pins or unpins the nearest node.
            if response.clicked()
                && let Some(pointer) = response.interact_pointer_pos()
            {
                let world = self.screen_to_world(pointer, rect);
                let max_distance = PICK_RADIUS / self.zoom as f64;
                if let Some(id) = self.toggle_pin(world, max_distance) {
                    info!(node = id, fixed = self.graph.nodes[id].fixed, "toggled pin");
                }
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let world_before = self.screen_to_world(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(0.05, 10.0);

                let screen_after =
                    self.world_to_screen(DVec3::new(world_before.x, world_before.y, 0.0), rect);
                self.pan += pointer_screen - screen_after;
            }

            // Edges.
            let edge_stroke = egui::Stroke::new(
                1.0,
                egui::Color32::from_rgba_unmultiplied(160, 200, 160, 90),
            );
            for e in &self.graph.edges {
                let a = self.world_to_screen(self.graph.nodes[e.source].position, rect);
                let b = self.world_to_screen(self.graph.nodes[e.target].position, rect);
                painter.line_segment([a, b], edge_stroke);
            }

            // Nodes, pinned ones highlighted.
            for n in &self.graph.nodes {
                let p = self.world_to_screen(n.position, rect);
                let r = (n.size as f32 * self.zoom).max(2.0);
                let color = if n.fixed {
                    egui::Color32::ORANGE
                } else {
                    egui::Color32::LIGHT_BLUE
                };
                painter.circle_filled(p, r, color);
            }

            // Auto-run the layout if requested.
            if self.running {
                let now = ctx.input(|i| i.time);
                let elapsed = now - self.last_step_time;
                if elapsed >= self.step_interval {
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = elapsed;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rect() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::new(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    fn small_viewer() -> Viewer {
        let mut viewer = Viewer::new();
        viewer.spec = ClusterSpec {
            clusters: 2,
            cluster_size: 5,
            p_intra: 1.0,
            p_inter: 0.0,
            ..ClusterSpec::default()
        };
        viewer.cfg.worker_count = 2;
        viewer.regenerate();
        viewer
    }

    #[test]
    fn world_to_screen_and_back_is_roundtrip() {
        let mut viewer = small_viewer();
        viewer.zoom = 2.0;
        viewer.pan = egui::vec2(15.0, -7.0);
        let rect = test_rect();

        for p in [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(10.0, -5.0, 3.0),
            DVec3::new(-3.5, 8.25, 0.0),
        ] {
            let back = viewer.screen_to_world(viewer.world_to_screen(p, rect), rect);
            assert!(
                (back.x - p.x).abs() < 1e-4 && (back.y - p.y).abs() < 1e-4,
                "roundtrip mismatch: p={p:?}, back={back:?}"
            );
        }
    }

    #[test]
    fn regenerate_restarts_the_layout() {
        let mut viewer = small_viewer();
        viewer.step_once();
        viewer.running = true;

        viewer.regenerate();

        assert_eq!(viewer.graph.nodes.len(), 10);
        assert_eq!(viewer.engine.as_ref().unwrap().step_count(), 0);
        assert!(!viewer.running);
    }

    #[test]
    fn step_once_moves_nodes() {
        let mut viewer = small_viewer();
        let before: Vec<_> = viewer.graph.nodes.iter().map(|n| n.position).collect();

        viewer.step_once();
        viewer.step_once();

        let engine = viewer.engine.as_ref().unwrap();
        assert_eq!(engine.step_count(), 2);
        assert!(viewer.last_distance > 0.0);
        assert!(
            viewer
                .graph
                .nodes
                .iter()
                .zip(before)
                .any(|(n, p)| n.position != p)
        );
    }

    #[test]
    fn invalid_config_disables_stepping() {
        let mut viewer = small_viewer();
        viewer.cfg.scaling_ratio = 0.0;

        viewer.rebuild_engine();

        assert!(viewer.engine.is_none());
        assert!(viewer.last_error.is_some());
        let before = viewer.graph.clone();
        viewer.step_once();
        assert_eq!(viewer.graph, before);
    }

    #[test]
    fn toggle_pin_flips_the_nearest_node() {
        let mut viewer = small_viewer();
        let target = viewer.graph.nodes[3].position;
        let world = DVec2::new(target.x + 0.1, target.y);

        assert_eq!(viewer.toggle_pin(world, 1.0), Some(3));
        assert!(viewer.graph.nodes[3].fixed);
        assert_eq!(viewer.toggle_pin(world, 1.0), Some(3));
        assert!(!viewer.graph.nodes[3].fixed);

        assert_eq!(viewer.toggle_pin(DVec2::new(1e6, 1e6), 1.0), None);
    }
}
