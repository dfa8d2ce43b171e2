//! Analysis panel and marker detail card using bevy_egui

use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use fengshui_core::{
    place_card_in, score_commentary, AnalysisResult, Annotation, AnnotationKind, CardLayout,
    InteractionMode, LoadPhase, MarkerEvent, PixelPoint, ScreenRect,
};

use crate::camera::MainCamera;
use crate::markers::MarkerState;
use crate::models::RoomModel;
use crate::types::{AnalysisData, ModelJobDisplay, ViewerSettings};

/// Half size of the screen box a marker anchors its card to
const MARKER_ANCHOR_HALF: f32 = 14.0;
const PANEL_WIDTH: f32 = 320.0;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(EguiPrimaryContextPass, ui_system);
    }
}

fn accent(kind: AnnotationKind) -> egui::Color32 {
    let (r, g, b) = kind.accent_rgb();
    egui::Color32::from_rgb(r, g, b)
}

#[allow(clippy::too_many_arguments)]
fn ui_system(
    mut contexts: EguiContexts,
    analysis: Res<AnalysisData>,
    room: Res<RoomModel>,
    job: Res<ModelJobDisplay>,
    mut settings: ResMut<ViewerSettings>,
    mut state: ResMut<MarkerState>,
    camera: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    let Ok(ctx) = contexts.ctx_mut() else { return };

    let mut events = Vec::new();
    let mut mode = settings.interaction_mode;

    egui::SidePanel::left("analysis_panel")
        .resizable(false)
        .exact_width(PANEL_WIDTH)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("Feng Shui Analysis");
                ui.separator();
                match analysis.result() {
                    Some(result) => render_summary(ui, result),
                    None => {
                        ui.label(
                            egui::RichText::new("No analysis loaded").color(egui::Color32::GRAY),
                        );
                    }
                }

                ui.separator();
                render_model_status(ui, &job, &room, &state);

                ui.separator();
                ui.label(egui::RichText::new("Markers").strong());
                ui.horizontal(|ui| {
                    ui.radio_value(&mut mode, InteractionMode::Hover, "Hover");
                    ui.radio_value(&mut mode, InteractionMode::Click, "Click");
                });
                render_annotation_list(ui, analysis.annotations(), &state, &mut events);
            });
        });

    if mode != settings.interaction_mode {
        settings.interaction_mode = mode;
        events.push(MarkerEvent::Close);
    }

    render_loading_overlay(ctx, &room, &job);

    if let (Ok((camera, camera_transform)), Ok(window)) = (camera.single(), windows.single()) {
        let viewport = ScreenRect {
            left: PANEL_WIDTH,
            top: 0.0,
            width: (window.width() - PANEL_WIDTH).max(0.0),
            height: window.height(),
        };
        if let Some(marker) = state.active_marker() {
            let annotation = marker.annotation(analysis.annotations());
            let screen = camera.world_to_viewport(camera_transform, marker.position);
            if let (Some(annotation), Ok(screen)) = (annotation, screen) {
                let point = PixelPoint {
                    x: screen.x,
                    y: screen.y,
                };
                if render_detail_card(ctx, annotation, point, viewport, &settings.card) {
                    events.push(MarkerEvent::Close);
                }
            }
        }
    }

    for event in events {
        state.handle(event, settings.interaction_mode);
    }
}

fn render_list(ui: &mut egui::Ui, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    egui::CollapsingHeader::new(title)
        .default_open(true)
        .show(ui, |ui| {
            for item in items {
                ui.label(format!("• {}", item));
            }
        });
}

fn render_summary(ui: &mut egui::Ui, result: &AnalysisResult) {
    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new(format!("{:.0}", result.score))
                .size(36.0)
                .strong(),
        );
        ui.label(
            egui::RichText::new("/ 10")
                .size(18.0)
                .color(egui::Color32::GRAY),
        );
    });
    let commentary = score_commentary(result.score);
    ui.label(egui::RichText::new(commentary).italics());
    if result.is_celebration() {
        ui.label(
            egui::RichText::new("Great energy in this room!")
                .color(accent(AnnotationKind::Good)),
        );
    }
    ui.add_space(6.0);
    ui.label(&result.overall_analysis);
    ui.add_space(6.0);

    render_list(ui, "Strengths", &result.strengths);
    render_list(ui, "Weaknesses", &result.weaknesses);
    render_list(ui, "Suggestions", &result.suggestions);
}

fn render_model_status(
    ui: &mut egui::Ui,
    job: &ModelJobDisplay,
    room: &RoomModel,
    state: &MarkerState,
) {
    ui.label(egui::RichText::new("3D Model").strong());

    if let Some(status) = job.status {
        ui.label(status.label());
    } else if let Some(id) = &job.job_id {
        ui.label(format!("Waiting for job {}", id));
    }
    if let Some(message) = &job.message {
        ui.colored_label(accent(AnnotationKind::Bad), message);
    }

    match room.phase() {
        LoadPhase::Idle => {
            if job.job_id.is_none() {
                ui.label(egui::RichText::new("No model").color(egui::Color32::GRAY));
            }
        }
        LoadPhase::Loading => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading model...");
            });
        }
        LoadPhase::Ready(model) => {
            let markers = state.cache.markers();
            ui.label(
                egui::RichText::new(format!(
                    "{} triangles, {} markers",
                    model.prepared.triangle_count(),
                    markers.len()
                ))
                .small(),
            );
            if !markers.dropped.is_empty() {
                ui.label(
                    egui::RichText::new(format!(
                        "{} annotations missed the model",
                        markers.dropped.len()
                    ))
                    .small()
                    .color(egui::Color32::GRAY),
                );
            }
        }
        LoadPhase::Failed(reason) => {
            ui.colored_label(
                accent(AnnotationKind::Bad),
                format!("Could not load model: {}", reason),
            );
        }
    }
}

fn render_annotation_list(
    ui: &mut egui::Ui,
    annotations: &[Annotation],
    state: &MarkerState,
    events: &mut Vec<MarkerEvent>,
) {
    let markers = state.cache.markers();
    for (index, annotation) in annotations.iter().enumerate() {
        let text = egui::RichText::new(format!(
            "{} {}",
            annotation.kind.icon(),
            annotation.object_class
        ))
        .color(accent(annotation.kind));

        if markers.contains(index) {
            let selected = state.interaction.is_active(index);
            if ui.selectable_label(selected, text).clicked() {
                events.push(MarkerEvent::Click(index));
            }
        } else {
            ui.add_enabled(false, egui::Label::new(text))
                .on_disabled_hover_text("Not visible on the model");
        }
    }
}

/// Show the card for the active marker; returns whether close was clicked
fn render_detail_card(
    ctx: &egui::Context,
    annotation: &Annotation,
    marker: PixelPoint,
    viewport: ScreenRect,
    layout: &CardLayout,
) -> bool {
    let anchor = ScreenRect::around(marker, MARKER_ANCHOR_HALF);
    let position = place_card_in(viewport, anchor, marker, layout);
    let mut close = false;

    egui::Area::new(egui::Id::new("detail_card"))
        .fixed_pos(egui::pos2(position.left, position.top))
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style())
                .stroke(egui::Stroke::new(2.0, accent(annotation.kind)))
                .show(ui, |ui| {
                    ui.set_width(layout.card_width - 2.0 * layout.padding);
                    ui.set_max_height(layout.max_height);
                    ui.horizontal(|ui| {
                        ui.label(
                            egui::RichText::new(format!(
                                "{} {}",
                                annotation.kind.icon(),
                                annotation.object_class
                            ))
                            .strong()
                            .color(accent(annotation.kind)),
                        );
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.small_button("✕").clicked() {
                                close = true;
                            }
                        });
                    });
                    ui.label(&annotation.message);
                    ui.label(
                        egui::RichText::new(format!(
                            "Confidence {:.0}%",
                            annotation.confidence * 100.0
                        ))
                        .small()
                        .color(egui::Color32::GRAY),
                    );
                });
        });
    close
}

fn render_loading_overlay(ctx: &egui::Context, room: &RoomModel, job: &ModelJobDisplay) {
    let generating = match job.status {
        Some(status) => !status.is_terminal(),
        None => job.job_id.is_some(),
    };
    let text = if room.is_loading() {
        "Loading 3D model..."
    } else if generating && room.loaded().is_none() {
        job.status.map(|s| s.label()).unwrap_or("Initializing 3D...")
    } else {
        return;
    };

    egui::Area::new(egui::Id::new("loading_overlay"))
        .anchor(
            egui::Align2::CENTER_CENTER,
            egui::vec2(PANEL_WIDTH / 2.0, 0.0),
        )
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(text);
                });
            });
        });
}
