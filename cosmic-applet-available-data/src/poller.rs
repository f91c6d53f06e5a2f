// Copyright 2023 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

//! Self-rescheduling poll of the external query script.
//!
//! [`Poller`] never spawns processes or sleeps by itself. Each operation
//! returns the work the host must carry out (an [`Invocation`] to run or a
//! timer to arm) and the host feeds the results back in. All calls happen on
//! the host's single update thread.

use std::{path::Path, time::Duration};

use crate::process::{Completion, SpawnError};

pub const GET: &str = "get";
pub const OPEN: &str = "open";

/// Exit codes the script uses for failures it understands, such as rejected
/// credentials.
const KNOWN_FAILURES: [i32; 2] = [1, 2];

/// Values are read on every use and never cached by the poller.
pub trait SettingsProvider {
    fn username(&self) -> &str;
    fn password(&self) -> &str;
    fn update_delay_minutes(&self) -> u32;
    fn do_autologin(&self) -> bool;
    fn ok_color(&self) -> &str;
    fn error_color(&self) -> &str;
    fn script(&self) -> &str;
}

pub trait LabelSink {
    fn set_text(&mut self, text: &str);
    fn set_color(&mut self, color: &str);
}

/// One call of the external script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn get(settings: &impl SettingsProvider) -> Self {
        Self {
            program: settings.script().to_owned(),
            args: vec![
                GET.to_owned(),
                settings.username().to_owned(),
                settings.password().to_owned(),
            ],
        }
    }

    fn open(settings: &impl SettingsProvider) -> Self {
        let mut args = vec![OPEN.to_owned()];
        if settings.do_autologin() {
            args.push(settings.username().to_owned());
            args.push(settings.password().to_owned());
        }

        Self {
            program: settings.script().to_owned(),
            args,
        }
    }

    pub fn into_argv(self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program);
        argv.extend(self.args);
        argv
    }
}

/// Identifies an armed timer. Only the most recently armed one is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayResult {
    /// `None` keeps the text currently on the label.
    pub text: Option<String>,
    pub is_error: bool,
}

impl DisplayResult {
    pub fn render(&self, settings: &impl SettingsProvider, sink: &mut impl LabelSink) {
        if let (Some(text), false) = (&self.text, self.is_error) {
            sink.set_text(text);
        }

        sink.set_color(if self.is_error {
            settings.error_color()
        } else {
            settings.ok_color()
        });
    }
}

/// Why a cycle produced no balance. `Display` is the operator-facing log line.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(
        "{script} could not retrieve the available data, verify the credentials in the applet settings"
    )]
    KnownFailure { script: String },
    #[error("{script} exited with code {code}: {stderr}")]
    Unexpected {
        script: String,
        code: i32,
        stderr: String,
    },
}

/// Maps a finished retrieval to the text to show.
pub fn interpret(
    script: &str,
    result: Result<Completion, SpawnError>,
) -> Result<String, CycleError> {
    let Completion { exit_code, output } = result?;
    let script = script_name(script);

    match exit_code {
        0 => Ok(output.trim_end_matches(['\r', '\n']).to_owned()),
        code if KNOWN_FAILURES.contains(&code) => Err(CycleError::KnownFailure { script }),
        code => Err(CycleError::Unexpected {
            script,
            code,
            stderr: output,
        }),
    }
}

fn script_name(script: &str) -> String {
    Path::new(script)
        .file_name()
        .map_or_else(|| script.to_owned(), |name| name.to_string_lossy().into_owned())
}

/// Delay until the next cycle. Anything below a minute would hammer the
/// provider, so it is clamped.
pub fn interval(settings: &impl SettingsProvider) -> Duration {
    Duration::from_secs(u64::from(settings.update_delay_minutes().max(1)) * 60)
}

#[derive(Debug, Default)]
pub struct Poller {
    active: bool,
    retrieving: bool,
    in_flight_click: bool,
    generation: u64,
    timer: Option<TimerToken>,
}

impl Poller {
    pub fn state(&self) -> State {
        if self.active {
            State::Polling
        } else {
            State::Idle
        }
    }

    pub fn pending_timer(&self) -> Option<TimerToken> {
        self.timer
    }

    /// Starts polling, or restarts the cycle when already polling.
    ///
    /// Returns the retrieval to run now. `None` means a retrieval is already
    /// in flight; its completion arms the next timer.
    pub fn start(&mut self, settings: &impl SettingsProvider) -> Option<Invocation> {
        tracing::debug!("polling started");
        self.active = true;
        self.disarm();
        self.begin_cycle(settings)
    }

    /// Stops polling. A retrieval still running is not killed; its result
    /// is rendered but schedules nothing.
    pub fn stop(&mut self) {
        tracing::debug!("polling stopped");
        self.active = false;
        self.disarm();
    }

    /// Called when the timer identified by `token` elapses.
    pub fn run_cycle(
        &mut self,
        token: TimerToken,
        settings: &impl SettingsProvider,
    ) -> Option<Invocation> {
        if !self.active || self.timer != Some(token) {
            tracing::trace!(?token, "ignoring stale timer");
            return None;
        }

        self.timer = None;
        self.begin_cycle(settings)
    }

    /// Renders a finished retrieval and returns the single timer to arm next.
    pub fn retrieved(
        &mut self,
        result: Result<Completion, SpawnError>,
        settings: &impl SettingsProvider,
        sink: &mut impl LabelSink,
    ) -> Option<(TimerToken, Duration)> {
        self.retrieving = false;

        let display = match interpret(settings.script(), result) {
            Ok(text) => {
                if text.trim().is_empty() {
                    tracing::warn!(
                        "nothing retrieved by {}, verify the credentials in the applet settings",
                        script_name(settings.script())
                    );
                }
                DisplayResult {
                    text: Some(text),
                    is_error: false,
                }
            }
            Err(why) => {
                tracing::error!("{why}");
                DisplayResult {
                    text: None,
                    is_error: true,
                }
            }
        };
        display.render(settings, sink);

        self.arm(settings)
    }

    /// Returns the `open` call to run, or `None` while a previous one is
    /// still running.
    pub fn clicked(&mut self, settings: &impl SettingsProvider) -> Option<Invocation> {
        if self.in_flight_click {
            return None;
        }

        self.in_flight_click = true;
        Some(Invocation::open(settings))
    }

    pub fn opened(&mut self, result: Result<i32, SpawnError>, settings: &impl SettingsProvider) {
        self.in_flight_click = false;

        match result {
            Ok(0) => (),
            Ok(code) => tracing::error!(
                "{} failed to open the provider page (exit code {code})",
                script_name(settings.script())
            ),
            Err(why) => tracing::error!("{why}"),
        }
    }

    /// Hook for reacting to a changed setting. Every value is already read
    /// fresh at use, so nothing needs to happen yet.
    pub fn settings_changed(&mut self, key: &str) {
        tracing::trace!(key, "setting changed");
    }

    fn begin_cycle(&mut self, settings: &impl SettingsProvider) -> Option<Invocation> {
        if self.retrieving {
            return None;
        }

        self.retrieving = true;
        Some(Invocation::get(settings))
    }

    fn arm(&mut self, settings: &impl SettingsProvider) -> Option<(TimerToken, Duration)> {
        if !self.active || self.timer.is_some() {
            return None;
        }

        self.generation += 1;
        let token = TimerToken(self.generation);
        self.timer = Some(token);
        Some((token, interval(settings)))
    }

    fn disarm(&mut self) {
        self.timer = None;
        self.generation += 1;
    }
}
