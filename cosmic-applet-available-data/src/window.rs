// Copyright 2023 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use std::{sync::LazyLock, time::Duration};

use cosmic::{
    Element, Task, app,
    applet::cosmic_panel_config::PanelAnchor,
    cosmic_config::{Config, CosmicConfigEntry},
    iced::{
        Alignment, Color, Length, Subscription,
        widget::{row, vertical_space},
    },
    widget::{Id, autosize, button, container},
};

use crate::{
    config::{self, AvailableDataConfig, parse_color},
    fl,
    poller::{Invocation, LabelSink, Poller, TimerToken},
    process::{Completion, ProcessRunner, SpawnError, TokioRunner},
};

static AUTOSIZE_MAIN_ID: LazyLock<Id> = LazyLock::new(|| Id::new("autosize-main"));

/// What the panel shows.
#[derive(Debug, Clone, Default)]
struct Label {
    text: String,
    color: Option<Color>,
    /// Configured colors, parsed when the config is loaded.
    palette: Vec<(String, Option<Color>)>,
}

impl Label {
    fn set_palette(&mut self, config: &AvailableDataConfig) {
        self.palette = [&config.ok_color, &config.error_color]
            .into_iter()
            .map(|name| {
                let color = parse_color(name);
                if color.is_none() {
                    tracing::warn!(color = %name, "invalid label color, using the theme color");
                }
                (name.clone(), color)
            })
            .collect();
    }
}

impl LabelSink for Label {
    fn set_text(&mut self, text: &str) {
        text.clone_into(&mut self.text);
    }

    fn set_color(&mut self, color: &str) {
        self.color = self
            .palette
            .iter()
            .find(|(name, _)| name == color)
            .map_or_else(|| parse_color(color), |(_, parsed)| *parsed);
    }
}

pub struct Window {
    core: cosmic::app::Core,
    config: AvailableDataConfig,
    poller: Poller,
    label: Label,
    runner: TokioRunner,
}

#[derive(Debug, Clone)]
pub enum Message {
    Stop,
    Tick(TimerToken),
    Retrieved(Result<Completion, SpawnError>),
    Clicked,
    Opened(Result<i32, SpawnError>),
    ConfigChanged(AvailableDataConfig),
}

impl Window {
    fn retrieve(&self, invocation: Option<Invocation>) -> app::Task<Message> {
        let Some(invocation) = invocation else {
            return Task::none();
        };

        Task::perform(
            self.runner.run_captured(invocation.into_argv()),
            |result| cosmic::Action::App(Message::Retrieved(result)),
        )
    }

    // One-shot: the next timer is only armed once this cycle's retrieval
    // has completed.
    fn schedule(next: Option<(TimerToken, Duration)>) -> app::Task<Message> {
        let Some((token, delay)) = next else {
            return Task::none();
        };

        tracing::debug!(?token, ?delay, "next retrieval scheduled");
        Task::perform(tokio::time::sleep(delay), move |()| {
            cosmic::Action::App(Message::Tick(token))
        })
    }
}

impl cosmic::Application for Window {
    type Message = Message;
    type Executor = cosmic::SingleThreadExecutor;
    type Flags = ();
    const APP_ID: &'static str = config::APP_ID;

    fn init(core: app::Core, _flags: Self::Flags) -> (Self, app::Task<Self::Message>) {
        let config = match Config::new(Self::APP_ID, AvailableDataConfig::VERSION) {
            Ok(c) => AvailableDataConfig::get_entry(&c).unwrap_or_else(|(errors, config)| {
                for why in errors {
                    tracing::error!(%why, "Error loading config");
                }
                config
            }),
            Err(why) => {
                tracing::error!(%why, "Failed to open config, using defaults");
                AvailableDataConfig::default()
            }
        };

        let mut window = Self {
            core,
            config,
            poller: Poller::default(),
            label: Label {
                text: fl!("no-data-yet"),
                ..Default::default()
            },
            runner: TokioRunner,
        };
        window.label.set_palette(&window.config);

        let invocation = window.poller.start(&window.config);
        let task = window.retrieve(invocation);
        (window, task)
    }

    fn core(&self) -> &cosmic::app::Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut cosmic::app::Core {
        &mut self.core
    }

    fn style(&self) -> Option<cosmic::iced_runtime::Appearance> {
        Some(cosmic::applet::style())
    }

    fn subscription(&self) -> Subscription<Message> {
        self.core.watch_config(Self::APP_ID).map(|u| {
            for why in u.errors {
                tracing::error!(?why, "Error watching config");
            }
            Message::ConfigChanged(u.config)
        })
    }

    fn update(&mut self, message: Self::Message) -> app::Task<Self::Message> {
        match message {
            Message::Stop => {
                tracing::info!(
                    state = ?self.poller.state(),
                    pending = ?self.poller.pending_timer(),
                    "applet exiting"
                );
                self.poller.stop();
                Task::none()
            }
            Message::Tick(token) => {
                let invocation = self.poller.run_cycle(token, &self.config);
                self.retrieve(invocation)
            }
            Message::Retrieved(result) => {
                let next = self
                    .poller
                    .retrieved(result, &self.config, &mut self.label);
                Self::schedule(next)
            }
            Message::Clicked => {
                let Some(invocation) = self.poller.clicked(&self.config) else {
                    return Task::none();
                };
                Task::perform(
                    self.runner.run_fire_and_forget(invocation.into_argv()),
                    |result| cosmic::Action::App(Message::Opened(result)),
                )
            }
            Message::Opened(result) => {
                self.poller.opened(result, &self.config);
                Task::none()
            }
            Message::ConfigChanged(config) => {
                for key in self.config.changed_keys(&config) {
                    self.poller.settings_changed(key);
                }
                if self.config.ok_color != config.ok_color
                    || self.config.error_color != config.error_color
                {
                    self.label.set_palette(&config);
                }
                self.config = config;
                Task::none()
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let horizontal = matches!(
            self.core.applet.anchor,
            PanelAnchor::Top | PanelAnchor::Bottom
        );

        let mut text = self.core.applet.text(self.label.text.clone());
        if let Some(color) = self.label.color {
            text = text.class(cosmic::theme::Text::Color(color));
        }

        let content: Element<'_, Message> = if horizontal {
            row!(
                text,
                container(vertical_space().height(Length::Fixed(
                    (self.core.applet.suggested_size(true).1
                        + 2 * self.core.applet.suggested_padding(true).1)
                        as f32
                )))
            )
            .align_y(Alignment::Center)
            .into()
        } else {
            text.into()
        };

        let button = button::custom(content)
            .padding(if horizontal {
                [0, self.core.applet.suggested_padding(true).0]
            } else {
                [self.core.applet.suggested_padding(true).0, 0]
            })
            .on_press_down(Message::Clicked)
            .class(cosmic::theme::Button::AppletIcon);

        autosize::autosize(button, AUTOSIZE_MAIN_ID.clone()).into()
    }

    fn on_app_exit(&mut self) -> Option<Message> {
        Some(Message::Stop)
    }
}
