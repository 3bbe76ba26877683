//! LED strip commands for the ESP32 controllers.

use kiosk_core::config::LedStripConfig;
use serde::Serialize;

use super::MessagingError;
use crate::content::{Exhibit, LedPosition};

pub const HIGHLIGHT_EFFECT: &str = "highlight";
pub const HIGHLIGHT_DURATION_MS: u32 = 10_000;
pub const DEFAULT_EFFECT_DURATION_MS: u32 = 5_000;
pub const FULL_BRIGHTNESS: u8 = 255;
pub const DEFAULT_SPEED: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    /// Highlight colour for a category slug; white for anything unmapped.
    pub fn for_category(slug: Option<&str>) -> Rgb {
        match slug {
            Some("kunst") => Rgb { r: 255, g: 0, b: 255 },
            Some("geschichte") => Rgb { r: 255, g: 165, b: 0 },
            Some("natur") => Rgb { r: 0, g: 255, b: 0 },
            Some("technik") => Rgb { r: 0, g: 0, b: 255 },
            _ => Self::WHITE,
        }
    }
}

/// What a lightbulb event asks the strip to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightAction {
    Activate,
    Deactivate,
}

impl LightAction {
    /// `clicked` / `activate` switch on; every other action switches off.
    pub fn parse(action: &str) -> Self {
        match action {
            "clicked" | "activate" => Self::Activate,
            _ => Self::Deactivate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }
}

/// Contiguous LED range on one strip, with the controller that drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedSegment {
    pub strip_number: u32,
    pub start: u32,
    pub end: u32,
    pub esp32_id: String,
    pub room_position: Option<String>,
}

impl LedSegment {
    /// Join an exhibit's LED position with the configured strips.
    pub fn locate(
        exhibit_id: &str, position: Option<&LedPosition>, strips: &[LedStripConfig],
    ) -> Result<Self, MessagingError> {
        let no_position = || MessagingError::NoLedPosition(exhibit_id.to_string());
        let position = position.ok_or_else(no_position)?;
        let (Some(strip_number), Some(start), Some(end)) = (position.strip_number, position.led_start, position.led_end)
        else {
            return Err(no_position());
        };
        if end < start {
            return Err(MessagingError::InvalidSegment { start, end });
        }

        let strip = strips
            .iter()
            .find(|s| s.strip_number == strip_number)
            .ok_or(MessagingError::UnknownStrip(strip_number))?;

        Ok(Self { strip_number, start, end, esp32_id: strip.esp32_id.clone(), room_position: position.room_position.clone() })
    }

    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Per-strip topic below `base`.
    pub fn topic(&self, base: &str) -> String {
        format!("{base}/strip{}", self.strip_number)
    }
}

/// Highlight command for one exhibit's LED segment.
#[derive(Debug, Clone, Serialize)]
pub struct LightbulbCommand {
    pub command: &'static str,
    pub exhibit_id: String,
    pub exhibit_title: Option<String>,
    pub exhibit_inventarnummer: Option<String>,
    pub timestamp: String,
    pub led_effect: &'static str,
    pub led_color: Rgb,
    pub led_brightness: u8,
    pub led_duration: u32,
    pub led_speed: u8,
    pub strip_number: u32,
    pub led_start: u32,
    pub led_end: u32,
    pub led_count: u32,
    pub esp32_id: String,
}

impl LightbulbCommand {
    pub fn new(exhibit: &Exhibit, action: LightAction, segment: &LedSegment, timestamp: String) -> Self {
        let slug = exhibit.category.as_ref().and_then(|c| c.slug());
        Self {
            command: action.as_str(),
            exhibit_id: exhibit.id.clone(),
            exhibit_title: exhibit.title.clone(),
            exhibit_inventarnummer: exhibit.inventory_number.clone(),
            timestamp,
            led_effect: HIGHLIGHT_EFFECT,
            led_color: Rgb::for_category(slug),
            led_brightness: FULL_BRIGHTNESS,
            led_duration: HIGHLIGHT_DURATION_MS,
            led_speed: DEFAULT_SPEED,
            strip_number: segment.strip_number,
            led_start: segment.start,
            led_end: segment.end,
            led_count: segment.count(),
            esp32_id: segment.esp32_id.clone(),
        }
    }
}
