use std::{collections::HashMap, fs, path::Path};

use anyhow::bail;
use serde::{de::Visitor, Deserialize};
use winit::keyboard::{self, NamedKey};

use crate::{
    brush::BrushParams,
    math::{vec2, Vec2f},
};

/// Range the interactive brush size may be configured or resized to.
pub const BRUSH_SIZE_RANGE: (f32, f32) = (1.0, 256.0);

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The interactive brush at startup.
    pub brush: BrushParams,
    pub canvas: CanvasConfig,
    pub api: ApiConfig,
    pub bind: HashMap<Key, CommandVerb>,
}

impl Default for Config {
    fn default() -> Self {
        let bind = [
            ("e", CommandVerb::ToolEraser),
            ("c", CommandVerb::Clear),
            ("]", CommandVerb::BrushGrow),
            ("[", CommandVerb::BrushShrink),
        ]
        .into_iter()
        .map(|(key, verb)| (Key::character(key), verb))
        .collect();

        Self {
            brush: BrushParams::default(),
            canvas: CanvasConfig::default(),
            api: ApiConfig::default(),
            bind,
        }
    }
}

impl Config {
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let (min, max) = BRUSH_SIZE_RANGE;
        let brush = &self.brush;
        if !(min..=max).contains(&brush.size) {
            bail!("brush size must be between {min} and {max} (found {})", brush.size);
        }
        if !(0.1..=1.0).contains(&brush.smoothing) {
            bail!(
                "brush smoothing must be between 0.1 and 1 (found {})",
                brush.smoothing
            );
        }
        if brush.color > 0xff_ffff {
            bail!("brush color must be a 0xRRGGBB value (found {:#x})", brush.color);
        }

        let canvas = &self.canvas;
        if !(16..=8192).contains(&canvas.size) {
            bail!("canvas size must be between 16 and 8192 (found {})", canvas.size);
        }
        if !(canvas.screen_fraction > 0.0 && canvas.screen_fraction <= 1.0) {
            bail!(
                "canvas screen_fraction must be in (0, 1] (found {})",
                canvas.screen_fraction
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasConfig {
    /// Side length of the square drawing surface, in canvas pixels.
    pub size: u32,
    /// Clip the displayed canvas to a circle.
    pub circular: bool,
    /// Share of the window's shorter side the canvas occupies.
    pub screen_fraction: f32,
    /// Window background as `0xRRGGBB`.
    pub background: u32,
}

impl CanvasConfig {
    /// Window pixels per canvas pixel in a window of `window_size`.
    pub fn display_scale(&self, window_size: Vec2f) -> f32 {
        window_size.x().min(window_size.y()) * self.screen_fraction / self.size as f32
    }

    /// Maps `pos` in a window of `window_size` onto the canvas centered in that window.
    pub fn to_canvas(&self, window_size: Vec2f, pos: Vec2f) -> Vec2f {
        let half_canvas = self.size as f32 * 0.5;
        (pos - window_size * 0.5) / self.display_scale(window_size)
            + vec2(half_canvas, half_canvas)
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            circular: true,
            screen_fraction: 0.5,
            background: 0xffffff,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Read API calls as JSON lines from standard input.
    pub stdin: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { stdin: true }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Key(pub(crate) keyboard::Key);

impl Key {
    fn character(c: &str) -> Self {
        Key(keyboard::Key::Character(c.to_lowercase().into()))
    }

    /// Normalizes a key reported by the window so it can be looked up in the bindings.
    pub fn from_logical(key: &keyboard::Key) -> Self {
        match key {
            keyboard::Key::Character(c) => Self::character(c),
            other => Key(other.clone()),
        }
    }
}

impl<'a> Deserialize<'a> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = Key;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a single character or a key name")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let named = match v {
                    "Space" => NamedKey::Space,
                    "Escape" => NamedKey::Escape,
                    "Enter" => NamedKey::Enter,
                    "Tab" => NamedKey::Tab,
                    "Backspace" => NamedKey::Backspace,
                    "Delete" => NamedKey::Delete,
                    _ if v.chars().count() == 1 => return Ok(Key::character(v)),
                    _ => return Err(E::custom(format_args!("invalid key name '{v}'"))),
                };
                Ok(Key(keyboard::Key::Named(named)))
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CommandVerb {
    /// Erase while the key is held.
    #[serde(rename = "TOOL_ERASER")]
    ToolEraser,
    #[serde(rename = "CLEAR")]
    Clear,
    #[serde(rename = "BRUSH_GROW")]
    BrushGrow,
    #[serde(rename = "BRUSH_SHRINK")]
    BrushShrink,
}
