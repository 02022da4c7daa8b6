use std::path::PathBuf;
use std::time::Duration;

use ab_glyph::FontArc;
use iced::widget::{button, column, container, image, row, text, text_input};
use iced::{Element, Length, Subscription, Task};

use facewatch_core::{AnnotatedFrame, Config, SharedAnalyzer};
use facewatch_hw::Camera;

use crate::controller::{Controller, ControllerError, SourceOpener};
use crate::engine::FrameSource;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone)]
pub enum Message {
    Start,
    Stop,
    AddFace,
    ImagePicked(Option<PathBuf>),
    NameChanged(String),
    ConfirmName,
    CancelName,
    ViewLogs,
    Tick,
    CloseRequested,
    DialogClosed,
}

pub struct App {
    controller: Controller,
    frame: Option<image::Handle>,
    status: String,
    tick_interval: Duration,
    /// Image chosen for enrollment, waiting for a name.
    pending_image: Option<PathBuf>,
    name_draft: String,
}

impl App {
    pub fn new(config: Config, analyzer: SharedAnalyzer, font: Option<FontArc>) -> (Self, Task<Message>) {
        let tick_interval = config.frame_interval();
        let opener = camera_opener(&config);
        let (controller, load_error) = Controller::new(config, analyzer, font, opener);

        let status = format!("{} known face(s). Press Start to begin.", controller.store().len());
        let task = match load_error {
            Some(e) => error_dialog("Could not load known faces", e.to_string()),
            None => Task::none(),
        };

        (
            Self {
                controller,
                frame: None,
                status,
                tick_interval,
                pending_image: None,
                name_draft: String::new(),
            },
            task,
        )
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Start => match self.controller.start() {
                Ok(()) => self.status = "Recognition running".to_string(),
                Err(e) => return error_dialog("Could not start recognition", e.to_string()),
            },
            Message::Stop => {
                self.controller.stop();
                self.status = "Recognition stopped".to_string();
            }
            Message::Tick => {
                let poll = self.controller.poll();
                if let Some(frame) = poll.frame {
                    self.frame = Some(frame_handle(frame));
                }
                if let Some(reason) = poll.failure {
                    self.status = "Recognition stopped after an error".to_string();
                    return error_dialog("Recognition stopped", reason);
                }
            }
            Message::AddFace => {
                return Task::perform(
                    async {
                        rfd::AsyncFileDialog::new()
                            .set_title("Select a face image")
                            .add_filter("Images", IMAGE_EXTENSIONS)
                            .pick_file()
                            .await
                            .map(|h| h.path().to_path_buf())
                    },
                    Message::ImagePicked,
                );
            }
            Message::ImagePicked(Some(path)) => {
                self.pending_image = Some(path);
                self.name_draft.clear();
            }
            Message::ImagePicked(None) => {}
            Message::NameChanged(name) => {
                self.name_draft = name;
            }
            Message::ConfirmName => {
                let Some(path) = self.pending_image.clone() else {
                    return Task::none();
                };
                match self.controller.add_face(&path, &self.name_draft) {
                    Ok(name) => {
                        self.pending_image = None;
                        self.name_draft.clear();
                        let mut body = format!("Added {name}.");
                        if self.controller.is_running() {
                            body.push_str(" Restart recognition to include the new face.");
                        }
                        self.status = format!("{} known face(s)", self.controller.store().len());
                        return info_dialog("Face added", body);
                    }
                    Err(e) => {
                        // Keep the panel open so a missing name can be typed in.
                        if !matches!(e, ControllerError::EmptyName) {
                            self.pending_image = None;
                        }
                        return error_dialog("Could not add face", e.to_string());
                    }
                }
            }
            Message::CancelName => {
                self.pending_image = None;
                self.name_draft.clear();
            }
            Message::ViewLogs => match self.controller.view_logs() {
                Ok(Some(contents)) => return info_dialog("Today's recognitions", contents),
                Ok(None) => {
                    let today = chrono::Local::now().date_naive();
                    return info_dialog("Today's recognitions", format!("No logs found for {today}."));
                }
                Err(e) => return error_dialog("Could not read logs", e.to_string()),
            },
            Message::CloseRequested => {
                self.controller.shutdown();
                return iced::exit();
            }
            Message::DialogClosed => {}
        }
        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let running = self.controller.is_running();
        let enrolling = self.pending_image.is_some();

        let video: Element<'_, Message> = match &self.frame {
            Some(handle) => image(handle.clone()).width(Length::Fill).height(Length::Fill).into(),
            None => text("Camera is off").into(),
        };
        let video = container(video)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill);

        let controls = row![
            button(text("Start")).on_press_maybe((!running).then_some(Message::Start)),
            button(text("Stop")).on_press_maybe(running.then_some(Message::Stop)),
            button(text("Add Face")).on_press_maybe((!enrolling).then_some(Message::AddFace)),
            button(text("View Logs")).on_press(Message::ViewLogs),
        ]
        .spacing(8);

        let mut content = column![video, controls].spacing(12).padding(12);

        if let Some(path) = &self.pending_image {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let panel = column![
                text(format!("Name for {file}:")),
                row![
                    text_input("Name", &self.name_draft)
                        .on_input(Message::NameChanged)
                        .on_submit(Message::ConfirmName),
                    button(text("Save")).on_press(Message::ConfirmName),
                    button(text("Cancel"))
                        .on_press(Message::CancelName)
                        .style(button::secondary),
                ]
                .spacing(8),
            ]
            .spacing(6);
            content = content.push(panel);
        }

        content.push(text(&self.status).size(13)).into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let close = iced::window::close_requests().map(|_| Message::CloseRequested);
        if self.controller.is_running() {
            Subscription::batch([
                iced::time::every(self.tick_interval).map(|_| Message::Tick),
                close,
            ])
        } else {
            close
        }
    }
}

fn camera_opener(config: &Config) -> SourceOpener {
    let device = config.camera_device.clone();
    let (width, height) = (config.capture_width, config.capture_height);
    Box::new(move || {
        let camera = Camera::open(&device, width, height)?;
        Ok(Box::new(camera) as Box<dyn FrameSource>)
    })
}

fn frame_handle(frame: AnnotatedFrame) -> image::Handle {
    let rgba = ::image::DynamicImage::ImageRgb8(frame.image).into_rgba8();
    let (width, height) = rgba.dimensions();
    image::Handle::from_rgba(width, height, rgba.into_raw())
}

fn info_dialog(title: &str, body: String) -> Task<Message> {
    dialog(rfd::MessageLevel::Info, title, body)
}

fn error_dialog(title: &str, body: String) -> Task<Message> {
    tracing::warn!(title, error = %body, "reporting error");
    dialog(rfd::MessageLevel::Error, title, body)
}

fn dialog(level: rfd::MessageLevel, title: &str, body: String) -> Task<Message> {
    let dialog = rfd::AsyncMessageDialog::new()
        .set_level(level)
        .set_title(title)
        .set_description(body)
        .set_buttons(rfd::MessageButtons::Ok);
    Task::perform(dialog.show(), |_| Message::DialogClosed)
}
