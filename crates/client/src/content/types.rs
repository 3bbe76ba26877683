//! Document shapes returned by the kiosk queries.
//!
//! Field names on the wire are the CMS schema's German names; the Rust
//! side uses English ones. Projections return `null` for absent fields, so
//! nearly everything is optional and lists default to empty.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `{ "current": "..." }` slug object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slug {
    pub current: Option<String>,
}

/// Image field with its dereferenced asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub asset: Option<Asset>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// `_id` when dereferenced, `_ref` when not.
    #[serde(rename = "_id", alias = "_ref")]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Option<ImageMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Low-quality image placeholder (base64 data URL).
    pub lqip: Option<String>,
    pub dimensions: Option<Dimensions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Category as embedded in exhibits and exhibitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "titel")]
    pub title: Option<String>,
    pub slug: Option<Slug>,
    pub icon: Option<String>,
    #[serde(rename = "farbe")]
    pub color: Option<String>,
}

impl CategorySummary {
    pub fn slug(&self) -> Option<&str> {
        self.slug.as_ref().and_then(|s| s.current.as_deref())
    }
}

/// `kategorie` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "titel")]
    pub title: Option<String>,
    pub slug: Option<Slug>,
    #[serde(rename = "beschreibung")]
    pub description: Option<Value>,
    pub icon: Option<String>,
    #[serde(rename = "farbe")]
    pub color: Option<String>,
    #[serde(rename = "reihenfolge")]
    pub rank: Option<f64>,
}

/// Where an exhibit sits on the LED strips of its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedPosition {
    pub strip_number: Option<u32>,
    pub led_start: Option<u32>,
    pub led_end: Option<u32>,
    #[serde(rename = "raum_position")]
    pub room_position: Option<String>,
}

/// `exponat` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exhibit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "inventarnummer", default)]
    pub inventory_number: Option<String>,
    #[serde(rename = "titel", default)]
    pub title: Option<String>,
    #[serde(rename = "untertitel", default)]
    pub subtitle: Option<String>,
    #[serde(rename = "kurzbeschreibung", default)]
    pub short_description: Option<String>,
    /// Portable text blocks.
    #[serde(rename = "beschreibung", default)]
    pub description: Option<Value>,
    #[serde(rename = "hauptbild", default)]
    pub main_image: Option<Image>,
    #[serde(rename = "bilder", default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    #[serde(rename = "kategorie", default)]
    pub category: Option<CategorySummary>,
    #[serde(rename = "datierung", default)]
    pub dating: Option<Value>,
    #[serde(rename = "herstellung", default)]
    pub production: Option<Value>,
    #[serde(rename = "physisch", default)]
    pub physical: Option<Value>,
    #[serde(default)]
    pub organisation: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(rename = "ist_highlight", default, deserialize_with = "null_as_default")]
    pub is_highlight: bool,
    #[serde(rename = "reihenfolge", default)]
    pub rank: Option<f64>,
    #[serde(default)]
    pub qr_code: Option<Slug>,
    #[serde(rename = "hat_led_licht", default, deserialize_with = "null_as_default")]
    pub has_led: bool,
    #[serde(default)]
    pub led_position: Option<LedPosition>,
    #[serde(default)]
    pub audio: Option<Value>,
    #[serde(default)]
    pub video: Option<Value>,
    #[serde(rename = "dokumente", default)]
    pub documents: Option<Value>,
}

/// `museumInfo` singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuseumInfo {
    pub name: Option<String>,
    #[serde(rename = "untertitel")]
    pub subtitle: Option<String>,
    pub logo: Option<Image>,
    #[serde(rename = "willkommenstext")]
    pub welcome_text: Option<Value>,
    #[serde(rename = "kontakt")]
    pub contact: Option<Value>,
    #[serde(rename = "oeffnungszeiten")]
    pub opening_hours: Option<Value>,
    #[serde(rename = "eintrittspreise")]
    pub admission: Option<Value>,
    pub social_media: Option<Value>,
    #[serde(rename = "sprachen", default, deserialize_with = "null_as_default")]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub status: Option<String>,
}

/// `ausstellung` document. List queries fill only the summary fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exhibition {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "titel", default)]
    pub title: Option<String>,
    #[serde(rename = "untertitel", default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub slug: Option<Slug>,
    #[serde(rename = "kurzbeschreibung", default)]
    pub short_description: Option<String>,
    #[serde(rename = "beschreibung", default)]
    pub description: Option<Value>,
    #[serde(rename = "titelbild", default)]
    pub cover_image: Option<Image>,
    /// Cover image, or the first video's thumbnail.
    #[serde(rename = "titelbildOrFallback", default)]
    pub cover_or_fallback: Option<Value>,
    #[serde(rename = "galerie", default, deserialize_with = "null_as_default")]
    pub gallery: Vec<Image>,
    #[serde(default)]
    pub videos: Option<Value>,
    #[serde(rename = "dokumente", default)]
    pub documents: Option<Value>,
    #[serde(rename = "exponate", default, deserialize_with = "null_as_default")]
    pub exhibits: Vec<Exhibit>,
    #[serde(rename = "highlight_exponate", default, deserialize_with = "null_as_default")]
    pub highlight_exhibits: Vec<Exhibit>,
    #[serde(rename = "kategorien", default, deserialize_with = "null_as_default")]
    pub categories: Vec<CategorySummary>,
    #[serde(rename = "zeitraum", default)]
    pub period: Option<Value>,
    #[serde(default)]
    pub organisation: Option<Value>,
    #[serde(rename = "veranstaltungen", default)]
    pub events: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(rename = "ist_featured", default, deserialize_with = "null_as_default")]
    pub is_featured: bool,
    #[serde(rename = "reihenfolge", default)]
    pub rank: Option<f64>,
    #[serde(rename = "veroeffentlichung", default)]
    pub publication: Option<Publication>,
    #[serde(rename = "exponatCount", default)]
    pub exhibit_count: Option<u64>,
}

/// `kioskDevice` configuration joined with its exhibition's kiosk template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskDevice {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "kioskId", default)]
    pub kiosk_id: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Template mode of the linked exhibition (video, slideshow, explorer, reader).
    #[serde(rename = "modus", default)]
    pub mode: Option<String>,
    #[serde(rename = "konfiguration", default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub design: Option<Value>,
    #[serde(rename = "funktionen", default)]
    pub features: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exhibit_from_projection_with_nulls() {
        let exhibit: Exhibit = serde_json::from_value(json!({
            "_id": "exp-vase",
            "inventarnummer": "INV-1907-12",
            "titel": "Jugendstilvase",
            "untertitel": null,
            "bilder": null,
            "tags": null,
            "ist_highlight": true,
            "hat_led_licht": null,
            "kategorie": {"_id": "kat-kunst", "titel": "Kunst", "slug": {"current": "kunst"}, "icon": null, "farbe": "#f0f"},
            "led_position": {"strip_number": 2, "led_start": 10, "led_end": 19, "raum_position": "Vitrine 3"}
        }))
        .unwrap();

        assert_eq!(exhibit.title.as_deref(), Some("Jugendstilvase"));
        assert!(exhibit.images.is_empty());
        assert!(exhibit.tags.is_empty());
        assert!(exhibit.is_highlight);
        assert!(!exhibit.has_led);
        assert_eq!(exhibit.category.as_ref().and_then(CategorySummary::slug), Some("kunst"));
        let led = exhibit.led_position.unwrap();
        assert_eq!((led.strip_number, led.led_start, led.led_end), (Some(2), Some(10), Some(19)));
        assert_eq!(led.room_position.as_deref(), Some("Vitrine 3"));
    }

    #[test]
    fn test_image_asset_ref_or_id() {
        let dereferenced: Image = serde_json::from_value(json!({
            "asset": {"_id": "image-abc-800x600-jpg", "metadata": {"lqip": "data:", "dimensions": {"width": 800, "height": 600}}}
        }))
        .unwrap();
        let asset = dereferenced.asset.unwrap();
        assert_eq!(asset.id.as_deref(), Some("image-abc-800x600-jpg"));
        assert_eq!(asset.metadata.unwrap().dimensions, Some(Dimensions { width: 800.0, height: 600.0 }));

        let reference: Image = serde_json::from_value(json!({"asset": {"_ref": "image-def-10x10-png"}})).unwrap();
        assert_eq!(reference.asset.unwrap().id.as_deref(), Some("image-def-10x10-png"));
    }

    #[test]
    fn test_exhibition_summary() {
        let exhibition: Exhibition = serde_json::from_value(json!({
            "_id": "aus-1",
            "titel": "Moderne",
            "slug": {"current": "moderne"},
            "ist_featured": true,
            "veroeffentlichung": {"status": "veroeffentlicht"},
            "exponatCount": 14
        }))
        .unwrap();
        assert!(exhibition.is_featured);
        assert_eq!(exhibition.exhibit_count, Some(14));
        assert!(exhibition.exhibits.is_empty());
        assert_eq!(exhibition.publication.unwrap().status.as_deref(), Some("veroeffentlicht"));
    }
}
