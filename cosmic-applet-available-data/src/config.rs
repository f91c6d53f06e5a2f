// Copyright 2023 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use cosmic::cosmic_config::{self, CosmicConfigEntry, cosmic_config_derive::CosmicConfigEntry};
use cosmic::iced::Color;
use serde::{Deserialize, Serialize};

use crate::poller::SettingsProvider;

pub const APP_ID: &str = "com.github.derytelecom.CosmicAppletAvailableData";

#[derive(Clone, Serialize, Deserialize, CosmicConfigEntry, PartialEq, Eq)]
#[version = 1]
#[serde(default)]
pub struct AvailableDataConfig {
    pub username: String,
    pub password: String,
    pub update_delay_minutes: u32,
    pub do_autologin: bool,
    /// `#RRGGBB` or `#RRGGBBAA`
    pub ok_color: String,
    pub error_color: String,
    /// Executable invoked with `get`/`open`, looked up in `PATH` if not absolute.
    pub script: String,
}

impl Default for AvailableDataConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            update_delay_minutes: 30,
            do_autologin: false,
            ok_color: "#8ff0a4".to_string(),
            error_color: "#f66151".to_string(),
            script: "derytelecomextranetquery".to_string(),
        }
    }
}

// Keep the password out of logs.
impl fmt::Debug for AvailableDataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailableDataConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("update_delay_minutes", &self.update_delay_minutes)
            .field("do_autologin", &self.do_autologin)
            .field("ok_color", &self.ok_color)
            .field("error_color", &self.error_color)
            .field("script", &self.script)
            .finish()
    }
}

impl AvailableDataConfig {
    /// Names of the keys whose values differ between `self` and `new`.
    pub fn changed_keys(&self, new: &Self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.username != new.username {
            keys.push("username");
        }
        if self.password != new.password {
            keys.push("password");
        }
        if self.update_delay_minutes != new.update_delay_minutes {
            keys.push("update_delay_minutes");
        }
        if self.do_autologin != new.do_autologin {
            keys.push("do_autologin");
        }
        if self.ok_color != new.ok_color {
            keys.push("ok_color");
        }
        if self.error_color != new.error_color {
            keys.push("error_color");
        }
        if self.script != new.script {
            keys.push("script");
        }
        keys
    }
}

impl SettingsProvider for AvailableDataConfig {
    fn username(&self) -> &str {
        &self.username
    }

    fn password(&self) -> &str {
        &self.password
    }

    fn update_delay_minutes(&self) -> u32 {
        self.update_delay_minutes
    }

    fn do_autologin(&self) -> bool {
        self.do_autologin
    }

    fn ok_color(&self) -> &str {
        &self.ok_color
    }

    fn error_color(&self) -> &str {
        &self.error_color
    }

    fn script(&self) -> &str {
        &self.script
    }
}

/// Parses `#RRGGBB` or `#RRGGBBAA`.
pub fn parse_color(s: &str) -> Option<Color> {
    let hex = s.trim().strip_prefix('#')?;
    if (hex.len() != 6 && hex.len() != 8) || !hex.is_ascii() {
        return None;
    }

    let component = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let r = component(0)?;
    let g = component(2)?;
    let b = component(4)?;
    let a = if hex.len() == 8 {
        f32::from(component(6)?) / 255.0
    } else {
        1.0
    };

    Some(Color::from_rgba8(r, g, b, a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_and_rgba() {
        assert_eq!(parse_color("#ff0000"), Some(Color::from_rgb8(255, 0, 0)));
        assert_eq!(
            parse_color("#00ff0000"),
            Some(Color::from_rgba8(0, 255, 0, 0.0))
        );
        assert_eq!(parse_color(" #0000ff "), Some(Color::from_rgb8(0, 0, 255)));
    }

    #[test]
    fn rejects_malformed_colors() {
        for s in ["", "red", "#fff", "#gg0000", "ff0000", "#ff00000", "#ééé"] {
            assert_eq!(parse_color(s), None, "{s:?}");
        }
    }

    #[test]
    fn default_colors_parse() {
        let config = AvailableDataConfig::default();
        assert!(parse_color(&config.ok_color).is_some());
        assert!(parse_color(&config.error_color).is_some());
    }

    #[test]
    fn changed_keys_lists_each_difference() {
        let old = AvailableDataConfig::default();
        assert!(old.changed_keys(&old.clone()).is_empty());

        let new = AvailableDataConfig {
            password: "hunter2".into(),
            update_delay_minutes: 5,
            ..old.clone()
        };
        assert_eq!(
            old.changed_keys(&new),
            vec!["password", "update_delay_minutes"]
        );
    }

    #[test]
    fn debug_redacts_password() {
        let config = AvailableDataConfig {
            password: "hunter2".into(),
            ..Default::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
