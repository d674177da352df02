// Конфигурация виджета: то, что слой представления передаёт ядру
use serde::{Deserialize, Serialize};

use crate::utils::normalize_base_url;

/// Где слой представления раскрывает меню устройств.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MenuPosition {
    Top,
    TopLeft,
    TopRight,
    Bottom,
    BottomLeft,
    #[default]
    BottomRight,
}

impl MenuPosition {
    /// Неизвестные значения откатываются к `bottom-right`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "top" => Self::Top,
            "top-left" => Self::TopLeft,
            "top-right" => Self::TopRight,
            "bottom" => Self::Bottom,
            "bottom-left" => Self::BottomLeft,
            _ => Self::BottomRight,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    pub api_url: String,
    pub auth_token: Option<String>,
    pub show_device_selection: bool,
    pub debug_enabled: bool,
    #[serde(deserialize_with = "lenient_menu_position")]
    pub menu_position: MenuPosition,
    pub dark_mode: bool,
}

fn lenient_menu_position<'de, D>(deserializer: D) -> Result<MenuPosition, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(MenuPosition::parse).unwrap_or_default())
}

impl WidgetConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Reads `VOICELINK_*` variables; missing ones keep their defaults.
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        Self {
            api_url: std::env::var("VOICELINK_API_URL").unwrap_or_default(),
            auth_token: std::env::var("VOICELINK_AUTH_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            show_device_selection: flag("VOICELINK_SHOW_DEVICE_SELECTION"),
            debug_enabled: flag("VOICELINK_DEBUG"),
            menu_position: std::env::var("VOICELINK_MENU_POSITION")
                .map(|v| MenuPosition::parse(&v))
                .unwrap_or_default(),
            dark_mode: flag("VOICELINK_DARK_MODE"),
        }
    }

    pub fn base_url(&self) -> String {
        normalize_base_url(&self.api_url)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
