use crate::render_cache::{Lookup, RenderCache};
use crate::session::{ActionError, ReviewSession, Step};
use eframe::egui;
use ocr_review_cli::InputArgs;
use pdf_engine::{ClipRect, RenderRequest, RgbaImage};
use review_model::{BoundingBox, LastSession, MatchColumns, Preferences, RecordKey, MAX_OPTIONS};
use review_storage::Storage;

const PAGE_PADDING: f32 = 20.0;
const MAX_ZOOM_PERCENT: f32 = 400.0;
const MIN_ZOOM_PERCENT: f32 = 10.0;

const BOX_COLOR: egui::Color32 = egui::Color32::from_rgb(220, 60, 60);
const CORRECTED_BOX_COLOR: egui::Color32 = egui::Color32::from_rgb(40, 160, 80);

/// Rendered page cache key
#[derive(Clone, Copy, PartialEq, Eq)]
struct PageCacheKey {
    page_index: usize,
    zoom_percent: u32,
}

struct PageTexture {
    handle: egui::TextureHandle,
    /// Display size in UI points.
    size: egui::Vec2,
}

#[derive(Clone, Copy, PartialEq)]
struct CropCacheKey {
    record: RecordKey,
    padding: f64,
    zoom: f32,
}

struct ErrorDialogState {
    severity: ErrorSeverity,
    title: String,
    message: String,
}

#[derive(Clone, Copy, PartialEq)]
enum ErrorSeverity {
    Error,
    Warning,
}

impl ErrorSeverity {
    fn icon(&self) -> &'static str {
        match self {
            ErrorSeverity::Error => "❌",
            ErrorSeverity::Warning => "⚠️",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FitMode {
    #[default]
    FitPage,
    FitWidth,
}

impl FitMode {
    fn label(&self) -> &'static str {
        match self {
            FitMode::FitPage => "Fit Page",
            FitMode::FitWidth => "Fit Width",
        }
    }
}

pub struct ReviewApp {
    session: ReviewSession,
    inputs: InputArgs,
    storage: Option<Storage>,
    preferences: Preferences,

    fit_mode: FitMode,
    page_texture: RenderCache<PageCacheKey, PageTexture>,
    crop_texture: RenderCache<CropCacheKey, egui::TextureHandle>,
    /// Rubber-band capture is armed; drags on the page select a region.
    capturing: bool,
    /// Drag start and current pointer, in screen coordinates.
    selection: Option<(egui::Pos2, egui::Pos2)>,

    notice: Option<String>,
    error_dialog: Option<ErrorDialogState>,
    confirm_close: bool,
    allow_close: bool,
}

impl ReviewApp {
    pub fn new(
        session: ReviewSession,
        inputs: InputArgs,
        storage: Option<Storage>,
        preferences: Preferences,
    ) -> Self {
        Self {
            session,
            inputs,
            storage,
            preferences,
            fit_mode: FitMode::default(),
            page_texture: RenderCache::default(),
            crop_texture: RenderCache::default(),
            capturing: false,
            selection: None,
            notice: None,
            error_dialog: None,
            confirm_close: false,
            allow_close: false,
        }
    }

    fn show_error(&mut self, severity: ErrorSeverity, title: &str, message: impl Into<String>) {
        self.error_dialog =
            Some(ErrorDialogState { severity, title: title.to_owned(), message: message.into() });
    }

    fn step(&mut self, step: Step) {
        match self.session.go(step) {
            Ok(moved) if moved.is_boundary() => self.notice = Some(step.boundary_notice().to_owned()),
            Ok(_) => self.notice = None,
            Err(err) => self.show_error(ErrorSeverity::Error, "Record not found", err.to_string()),
        }
    }

    fn select(&mut self, key: RecordKey) {
        match self.session.select(key) {
            Ok(_) => self.notice = None,
            Err(err) => self.show_error(ErrorSeverity::Error, "Record not found", err.to_string()),
        }
    }

    fn revert(&mut self) {
        match self.session.revert_current() {
            Ok(true) => self.notice = Some("Correction reverted".to_owned()),
            Ok(false) => {}
            Err(err) => self.show_error(ErrorSeverity::Error, "Record not found", err.to_string()),
        }
    }

    fn capture(&mut self, region: BoundingBox) {
        self.capturing = false;
        match self.session.capture_region(region, self.preferences.crop_zoom) {
            Ok(path) => self.notice = Some(format!("Captured {}", path.display())),
            Err(err) => {
                tracing::error!("capture failed: {err}");
                self.show_error(ErrorSeverity::Error, "Capture failed", err.to_string());
            }
        }
    }

    fn save(&mut self) -> bool {
        match self.session.save() {
            Ok(path) => {
                self.notice = Some(format!("Saved to {}", path.display()));
                self.remember_session();
                true
            }
            Err(err) => {
                self.report_save_error(err);
                false
            }
        }
    }

    fn save_as(&mut self) {
        let suggested = self
            .session
            .output()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "corrections.json".to_owned());

        let mut dialog = rfd::FileDialog::new().add_filter("JSON", &["json"]).set_file_name(suggested);
        if let Some(dir) = self.session.output().parent() {
            dialog = dialog.set_directory(dir);
        }

        let Some(path) = dialog.save_file() else {
            return;
        };

        match self.session.save_as(path) {
            Ok(()) => {
                self.notice = Some(format!("Saved to {}", self.session.output().display()));
                self.remember_session();
            }
            Err(err) => self.report_save_error(err),
        }
    }

    fn report_save_error(&mut self, err: ActionError) {
        tracing::error!("save failed: {err}");
        let (severity, title) = match err {
            ActionError::Invalid(_) => (ErrorSeverity::Warning, "Cannot save yet"),
            ActionError::NotFound(_) => (ErrorSeverity::Error, "Record not found"),
            _ => (ErrorSeverity::Error, "Save failed"),
        };
        self.show_error(
            severity,
            title,
            format!("{err}\n\nYour corrections are still in memory and the previous file was left as it was."),
        );
    }

    fn remember_session(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        let session = LastSession {
            pdf: self.inputs.pdf.clone(),
            bbox_json: self.inputs.bbox_json.clone(),
            ocr_json: self.inputs.ocr_json.clone(),
            output: self.session.output().to_path_buf(),
            position: self.session.position(),
        };

        if let Err(err) = storage.save_session(&session) {
            tracing::warn!("failed to record session: {err}");
        }
    }

    fn remember_preferences(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        if let Err(err) = storage.save_preferences(&self.preferences) {
            tracing::warn!("failed to save preferences: {err}");
        }
    }
}

impl eframe::App for ReviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_close_request(ctx);
        self.handle_keyboard_shortcuts(ctx);
        self.draw_toolbar(ctx);
        self.draw_status_bar(ctx);
        self.draw_question_panel(ctx);
        self.draw_viewport(ctx);
        self.draw_error_dialog(ctx);
        self.draw_close_dialog(ctx);
    }
}

impl ReviewApp {
    fn handle_close_request(&mut self, ctx: &egui::Context) {
        if !ctx.input(|i| i.viewport().close_requested()) {
            return;
        }

        if self.session.has_unsaved_changes() && !self.allow_close {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.confirm_close = true;
            return;
        }

        self.remember_session();
    }

    fn handle_keyboard_shortcuts(&mut self, ctx: &egui::Context) {
        let typing = ctx.wants_keyboard_input();
        let (save, next_page, previous_page, next_question, previous_question, escape) =
            ctx.input(|i| {
                let cmd_or_ctrl = i.modifiers.command || i.modifiers.ctrl;
                (
                    cmd_or_ctrl && i.key_pressed(egui::Key::S),
                    !typing && i.key_pressed(egui::Key::ArrowRight),
                    !typing && i.key_pressed(egui::Key::ArrowLeft),
                    i.key_pressed(egui::Key::PageDown) || (cmd_or_ctrl && i.key_pressed(egui::Key::ArrowDown)),
                    i.key_pressed(egui::Key::PageUp) || (cmd_or_ctrl && i.key_pressed(egui::Key::ArrowUp)),
                    i.key_pressed(egui::Key::Escape),
                )
            });

        if escape {
            if self.error_dialog.is_some() {
                self.error_dialog = None;
            } else if self.confirm_close {
                self.confirm_close = false;
            } else if self.capturing {
                self.capturing = false;
                self.selection = None;
            }
            return;
        }

        if save {
            self.save();
        } else if next_page {
            self.step(Step::NextPage);
        } else if previous_page {
            self.step(Step::PreviousPage);
        } else if next_question {
            self.step(Step::NextQuestion);
        } else if previous_question {
            self.step(Step::PreviousQuestion);
        }
    }

    fn draw_toolbar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.add_space(8.0);

                let navigator = self.session.navigator();
                let (can_previous, can_next) = (navigator.can_go_previous(), navigator.can_go_next());
                let page_label = format!("Page {} / {}", self.session.page(), navigator.page_count());

                if ui.add_enabled(can_previous, egui::Button::new("◀")).clicked() {
                    self.step(Step::PreviousPage);
                }
                ui.label(page_label);
                if ui.add_enabled(can_next, egui::Button::new("▶")).clicked() {
                    self.step(Step::NextPage);
                }

                ui.separator();

                if ui.button("⏶ Question").on_hover_text("Previous question (PgUp)").clicked() {
                    self.step(Step::PreviousQuestion);
                }
                if ui.button("Question ⏷").on_hover_text("Next question (PgDn)").clicked() {
                    self.step(Step::NextQuestion);
                }

                ui.separator();

                let unsaved = self.session.has_unsaved_changes();
                if ui.add_enabled(unsaved, egui::Button::new("💾 Save")).clicked() {
                    self.save();
                }
                if ui.button("Save As…").clicked() {
                    self.save_as();
                }

                ui.separator();

                egui::ComboBox::from_id_salt("fit_mode")
                    .selected_text(self.fit_mode.label())
                    .width(80.0)
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.fit_mode, FitMode::FitPage, FitMode::FitPage.label());
                        ui.selectable_value(&mut self.fit_mode, FitMode::FitWidth, FitMode::FitWidth.label());
                    });

                if ui.checkbox(&mut self.preferences.show_overlays, "Boxes").changed() {
                    self.remember_preferences();
                }
            });
        });
    }

    fn draw_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let store = self.session.store();
                ui.label(format!("{} questions, {} corrected", store.len(), store.corrected_count()));

                let pending = store.dirty_keys().count() + usize::from(self.session.draft_is_pending());
                if pending > 0 {
                    ui.separator();
                    ui.colored_label(ui.visuals().warn_fg_color, format!("{pending} unsaved"));
                }

                if let Some(notice) = &self.notice {
                    ui.separator();
                    ui.label(notice);
                }

                if !self.session.review().engine.renders_content() {
                    ui.separator();
                    ui.colored_label(ui.visuals().warn_fg_color, "PDF renderer unavailable, pages are blank");
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(self.session.output().display().to_string());
                });
            });
        });
    }

    fn draw_question_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("question")
            .default_width(380.0)
            .resizable(true)
            .show(ctx, |ui| {
                let page = self.session.page();
                let current_key = self.session.current().map(|record| record.key());
                let entries: Vec<(RecordKey, bool, bool)> = self
                    .session
                    .store()
                    .list_for_page(page)
                    .into_iter()
                    .map(|record| {
                        let key = record.key();
                        (key, record.is_corrected(), self.session.store().is_record_dirty(key))
                    })
                    .collect();

                ui.heading(format!("Page {page}"));
                ui.separator();

                if entries.is_empty() {
                    ui.weak("No questions on this page");
                    return;
                }

                let mut clicked = None;
                ui.horizontal_wrapped(|ui| {
                    for (key, corrected, dirty) in &entries {
                        let mut label = format!("Q{}", key.question);
                        if *dirty {
                            label.push_str(" •");
                        } else if *corrected {
                            label.push_str(" ✓");
                        }
                        if ui.selectable_label(current_key == Some(*key), label).clicked() {
                            clicked = Some(*key);
                        }
                    }
                });
                if let Some(key) = clicked.filter(|key| Some(*key) != current_key) {
                    self.select(key);
                }

                ui.separator();
                self.draw_current_question(ctx, ui);
            });
    }

    fn draw_current_question(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let Some(record) = self.session.current() else {
            return;
        };
        let key = record.key();
        let extracted = record.text.clone();
        let corrected = record.is_corrected();
        let edited =
            corrected || self.session.store().has_field_edits(key) || self.session.draft_is_pending();

        ui.strong(format!("Question {}", key.question));

        match self.crop_texture(ctx, key) {
            Some(handle) => {
                egui::Frame::NONE
                    .stroke(egui::Stroke::new(1.0, ui.visuals().widgets.inactive.bg_stroke.color))
                    .inner_margin(2.0)
                    .show(ui, |ui| {
                        ui.add(egui::Image::new(&handle).max_width(ui.available_width()));
                    });
            }
            None => {
                ui.weak("Crop unavailable");
            }
        }
        self.draw_crop_controls(ui);

        ui.add_space(8.0);
        ui.label("Extracted");
        egui::ScrollArea::vertical().id_salt("extracted").max_height(120.0).show(ui, |ui| {
            ui.weak(extracted);
        });

        ui.add_space(8.0);
        ui.label(if corrected { "Correction" } else { "Correction (unchanged)" });
        ui.add(
            egui::TextEdit::multiline(self.session.draft_mut())
                .desired_width(f32::INFINITY)
                .desired_rows(8),
        );

        ui.add_space(8.0);
        self.draw_field_editor(ui);

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui.add_enabled(edited, egui::Button::new("Revert")).clicked() {
                self.revert();
            }
            let capture_label = if self.capturing { "Cancel capture" } else { "✂ Capture image" };
            if ui
                .selectable_label(self.capturing, capture_label)
                .on_hover_text("Drag a rectangle on the page to save it as this question's image")
                .clicked()
            {
                self.capturing = !self.capturing;
                self.selection = None;
            }
        });
    }

    fn draw_crop_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Padding");
            let padding = ui.add(
                egui::DragValue::new(&mut self.preferences.crop_padding)
                    .range(Preferences::CROP_PADDING_RANGE)
                    .speed(0.5)
                    .suffix(" pt"),
            );
            ui.label("Zoom");
            let zoom = ui.add(
                egui::DragValue::new(&mut self.preferences.crop_zoom)
                    .range(Preferences::CROP_ZOOM_RANGE)
                    .speed(0.05)
                    .max_decimals(2)
                    .suffix("×"),
            );

            let settled = |response: &egui::Response| {
                response.drag_stopped() || (response.changed() && !response.dragged())
            };
            if settled(&padding) || settled(&zoom) {
                self.remember_preferences();
            }
        });
    }

    /// Options, answer, match table and image path of the question on screen.
    fn draw_field_editor(&mut self, ui: &mut egui::Ui) {
        let fields = self.session.fields_mut();
        if fields.options.len() < MAX_OPTIONS {
            fields.options.resize(MAX_OPTIONS, String::new());
        }

        ui.label("Options");
        egui::Grid::new("options").num_columns(2).striped(true).show(ui, |ui| {
            for (index, option) in fields.options.iter_mut().enumerate() {
                ui.label(format!("{}.", index + 1));
                ui.add(egui::TextEdit::singleline(option).desired_width(f32::INFINITY));
                ui.end_row();
            }
        });

        let slots = fields.options.len() as u32;
        ui.horizontal(|ui| {
            ui.label("Correct option");
            let selected = fields.correct_option.map_or_else(|| "None".to_owned(), |value| value.to_string());
            egui::ComboBox::from_id_salt("correct_option").selected_text(selected).width(60.0).show_ui(ui, |ui| {
                ui.selectable_value(&mut fields.correct_option, None, "None");
                for value in 1..=slots {
                    ui.selectable_value(&mut fields.correct_option, Some(value), value.to_string());
                }
            });
        });

        egui::CollapsingHeader::new("Match columns")
            .default_open(fields.match_columns.is_some())
            .show(ui, |ui| {
                if let Some(columns) = fields.match_columns.as_mut() {
                    *columns = std::mem::take(columns).squared();
                    egui::Grid::new("match_columns").num_columns(2).striped(true).show(ui, |ui| {
                        ui.strong("Column A");
                        ui.strong("Column B");
                        ui.end_row();
                        for (left, right) in columns.column_a.iter_mut().zip(columns.column_b.iter_mut()) {
                            ui.text_edit_singleline(left);
                            ui.text_edit_singleline(right);
                            ui.end_row();
                        }
                    });
                }

                ui.horizontal(|ui| {
                    if ui.button("Add row").clicked() {
                        fields.match_columns.get_or_insert_with(MatchColumns::default).push_row();
                    }
                    let has_rows = fields.match_columns.as_ref().is_some_and(|columns| columns.rows() > 0);
                    if ui.add_enabled(has_rows, egui::Button::new("Remove row")).clicked() {
                        if let Some(columns) = fields.match_columns.as_mut() {
                            columns.pop_row();
                        }
                        fields.match_columns = fields.match_columns.take().filter(|columns| columns.rows() > 0);
                    }
                });
            });

        ui.horizontal(|ui| {
            ui.label("Image");
            match fields.image_path.as_deref() {
                Some(path) => {
                    ui.monospace(path);
                    if ui.small_button("✖").on_hover_text("Clear image path").clicked() {
                        fields.image_path = None;
                    }
                }
                None => {
                    ui.weak("none");
                }
            }
        });
    }

    /// Padded crop of the question at the preferred zoom, cached per record.
    fn crop_texture(&mut self, ctx: &egui::Context, record: RecordKey) -> Option<egui::TextureHandle> {
        let key = CropCacheKey {
            record,
            padding: self.preferences.crop_padding,
            zoom: self.preferences.crop_zoom,
        };
        match self.crop_texture.lookup(&key) {
            Lookup::Hit(handle) => return Some(handle.clone()),
            Lookup::Failed => return None,
            Lookup::Miss => {}
        }

        let bbox = self.session.store().get(record.page, record.question).ok()?.bbox.padded(key.padding);
        let clip = ClipRect {
            x: bbox.x as f32,
            y: bbox.y as f32,
            width: bbox.width as f32,
            height: bbox.height as f32,
        };

        let review = self.session.review();
        let request = RenderRequest::clipped(record.page - 1, key.zoom * ctx.pixels_per_point(), clip);
        match review.engine.render_page(review.handle, request) {
            Ok(image) => {
                let handle = ctx.load_texture(
                    format!("crop_{}_{}", record.page, record.question),
                    color_image(&image),
                    egui::TextureOptions::LINEAR,
                );
                self.crop_texture.fill(key, handle.clone());
                Some(handle)
            }
            Err(err) => {
                tracing::warn!(page = record.page, question = record.question, "failed to render crop: {err}");
                self.crop_texture.fail(key);
                None
            }
        }
    }

    fn effective_zoom(&self, page_width: f32, page_height: f32, viewport: egui::Vec2) -> f32 {
        let available_width = (viewport.x - PAGE_PADDING * 2.0).max(100.0);
        let available_height = (viewport.y - PAGE_PADDING * 2.0).max(100.0);

        let zoom = match self.fit_mode {
            FitMode::FitPage => (available_width / page_width).min(available_height / page_height),
            FitMode::FitWidth => available_width / page_width,
        };
        (zoom * 100.0).clamp(MIN_ZOOM_PERCENT, MAX_ZOOM_PERCENT)
    }

    fn render_page_texture(&mut self, ctx: &egui::Context, viewport: egui::Vec2) -> bool {
        let page_index = self.session.position().page_index;
        let review = self.session.review();

        let size = match review.engine.page_size(review.handle, page_index as u32) {
            Ok(size) => size,
            Err(err) => {
                tracing::warn!(page_index, "failed to read page size: {err}");
                return false;
            }
        };

        let zoom = self.effective_zoom(size.width_pt, size.height_pt, viewport);
        let key = PageCacheKey { page_index, zoom_percent: zoom as u32 };
        match self.page_texture.lookup(&key) {
            Lookup::Hit(_) => return true,
            Lookup::Failed => return false,
            Lookup::Miss => {}
        }

        let scale = key.zoom_percent as f32 / 100.0;
        let request = RenderRequest::page(page_index as u32, scale * ctx.pixels_per_point());
        match review.engine.render_page(review.handle, request) {
            Ok(image) => {
                let handle = ctx.load_texture(
                    format!("page_{}_{}", page_index, key.zoom_percent),
                    color_image(&image),
                    egui::TextureOptions::LINEAR,
                );
                let size = egui::vec2(size.width_pt * scale, size.height_pt * scale);
                self.page_texture.fill(key, PageTexture { handle, size });
                true
            }
            Err(err) => {
                let message = format!("Failed to render page {}: {err}", page_index + 1);
                tracing::warn!("{message}");
                self.page_texture.fail(key);
                self.show_error(ErrorSeverity::Warning, "Render failed", message);
                false
            }
        }
    }

    fn draw_viewport(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let viewport = ui.available_size();
            let rendered = self.render_page_texture(ctx, viewport);
            let Some((key, texture)) = self.page_texture.ready().filter(|_| rendered) else {
                ui.centered_and_justified(|ui| {
                    ui.weak("Page unavailable");
                });
                return;
            };

            let size = texture.size;
            let scale = key.zoom_percent as f32 / 100.0;
            let texture_id = texture.handle.id();
            let capturing = self.capturing && self.session.current().is_some();
            let mut clicked_at = None;
            let mut captured = None;
            let mut page_rect = egui::Rect::NOTHING;

            egui::ScrollArea::both().auto_shrink([false, false]).show(ui, |ui| {
                let available = ui.available_size();
                let padding_x = ((available.x - size.x) / 2.0).max(0.0);
                let padding_y = ((available.y - size.y) / 2.0).max(0.0);

                ui.add_space(padding_y);
                ui.horizontal(|ui| {
                    ui.add_space(padding_x);
                    let sense = if capturing { egui::Sense::click_and_drag() } else { egui::Sense::click() };
                    let (rect, response) = ui.allocate_exact_size(size, sense);
                    page_rect = rect;

                    ui.painter().image(
                        texture_id,
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );

                    if self.preferences.show_overlays {
                        self.paint_overlays(ui, rect, scale);
                    }

                    if capturing {
                        let response = response.on_hover_cursor(egui::CursorIcon::Crosshair);
                        captured = self.track_selection(ui, &response, rect);
                    } else if response.clicked() {
                        clicked_at = response.interact_pointer_pos();
                    }
                });
            });

            if let Some(selection) = captured {
                let to_page = |pos: egui::Pos2| {
                    (f64::from((pos.x - page_rect.min.x) / scale), f64::from((pos.y - page_rect.min.y) / scale))
                };
                let (x0, y0) = to_page(selection.min);
                let (x1, y1) = to_page(selection.max);
                match BoundingBox::from_corners(x0, y0, x1, y1) {
                    Ok(region) => self.capture(region),
                    Err(err) => tracing::debug!("ignoring empty selection: {err}"),
                }
            }

            if let Some(pos) = clicked_at {
                let x = f64::from((pos.x - page_rect.min.x) / scale);
                let y = f64::from((pos.y - page_rect.min.y) / scale);
                let hit = self
                    .session
                    .store()
                    .list_for_page(self.session.page())
                    .into_iter()
                    .find(|record| record.bbox.contains(x, y))
                    .map(|record| record.key());
                if let Some(key) = hit {
                    self.select(key);
                }
            }
        });
    }

    /// Follows a rubber-band drag over the page and paints it. Returns the
    /// selected screen rectangle, clipped to the page, once the drag ends.
    fn track_selection(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        page_rect: egui::Rect,
    ) -> Option<egui::Rect> {
        if response.drag_started() {
            self.selection = response.interact_pointer_pos().map(|pos| (pos, pos));
        }
        if let (Some((_, end)), Some(pos)) = (self.selection.as_mut(), response.interact_pointer_pos()) {
            *end = pos;
        }

        let (start, end) = self.selection?;
        let rect = egui::Rect::from_two_pos(start, end).intersect(page_rect);
        let color = ui.visuals().selection.stroke.color;
        ui.painter().rect_filled(rect, 0.0, color.gamma_multiply(0.15));
        ui.painter().rect_stroke(rect, 0.0, egui::Stroke::new(1.5, color), egui::StrokeKind::Inside);

        if response.drag_stopped() {
            self.selection = None;
            return Some(rect);
        }
        None
    }

    fn paint_overlays(&self, ui: &egui::Ui, page_rect: egui::Rect, scale: f32) {
        let current = self.session.current().map(|record| record.key());
        let painter = ui.painter();
        let highlight = ui.visuals().selection.bg_fill;

        for record in self.session.store().list_for_page(self.session.page()) {
            let bbox = record.bbox;
            let rect = egui::Rect::from_min_size(
                page_rect.min + egui::vec2(bbox.x as f32 * scale, bbox.y as f32 * scale),
                egui::vec2(bbox.width as f32 * scale, bbox.height as f32 * scale),
            );

            if current == Some(record.key()) {
                painter.rect_filled(rect, 2.0, highlight.gamma_multiply(0.2));
                painter.rect_stroke(rect, 2.0, egui::Stroke::new(3.0, highlight), egui::StrokeKind::Outside);
            } else {
                let color = if record.is_corrected() { CORRECTED_BOX_COLOR } else { BOX_COLOR };
                painter.rect_stroke(rect, 2.0, egui::Stroke::new(1.5, color), egui::StrokeKind::Outside);
            }

            painter.text(
                rect.left_top() + egui::vec2(2.0, -2.0),
                egui::Align2::LEFT_BOTTOM,
                format!("Q{}", record.question_id),
                egui::FontId::proportional(11.0),
                highlight,
            );
        }
    }

    fn draw_error_dialog(&mut self, ctx: &egui::Context) {
        let Some(error) = &self.error_dialog else {
            return;
        };

        let title = format!("{} {}", error.severity.icon(), error.title);
        let message = error.message.clone();

        let mut should_close = false;
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&message);
                ui.add_space(12.0);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                    if ui.button("OK").clicked() {
                        should_close = true;
                    }
                });
            });

        if should_close {
            self.error_dialog = None;
        }
    }

    fn draw_close_dialog(&mut self, ctx: &egui::Context) {
        if !self.confirm_close {
            return;
        }

        let mut save_and_quit = false;
        let mut discard = false;
        let mut cancel = false;

        egui::Window::new("Unsaved corrections")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!("Save your corrections to {} before quitting?", self.session.output().display()));
                ui.add_space(12.0);
                ui.horizontal(|ui| {
                    save_and_quit = ui.button("Save and Quit").clicked();
                    discard = ui.button("Discard").clicked();
                    cancel = ui.button("Cancel").clicked();
                });
            });

        if cancel {
            self.confirm_close = false;
        } else if discard || (save_and_quit && self.save()) {
            self.confirm_close = false;
            self.allow_close = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        } else if save_and_quit {
            self.confirm_close = false;
        }
    }
}

fn color_image(image: &RgbaImage) -> egui::ColorImage {
    let (width, height) = image.dimensions();
    egui::ColorImage::from_rgba_unmultiplied([width as usize, height as usize], image.as_raw())
}
