//! GROQ query construction.
//!
//! Every builder returns a [`Query`]: the query text plus its `$name`
//! parameters. Values never get spliced into the text; only slice bounds
//! (integers) do.

use std::collections::BTreeMap;

use serde_json::{Value, json};

/// Exhibit projection used by list and detail queries.
const EXHIBIT_PROJECTION: &str = r#"{
  _id,
  inventarnummer,
  titel,
  untertitel,
  kurzbeschreibung,
  beschreibung,
  hauptbild{..., asset->{_id, metadata{lqip, dimensions}}},
  bilder[]{..., asset->{_id, metadata{lqip, dimensions}}},
  "kategorie": kategorie->{_id, titel, slug, icon, farbe},
  datierung,
  herstellung,
  physisch,
  organisation,
  tags,
  ist_highlight,
  reihenfolge,
  qr_code,
  hat_led_licht,
  led_position,
  audio,
  video,
  dokumente
}"#;

const RANK_ORDER: &str = "order(reihenfolge asc, _createdAt desc)";

const EXHIBITION_SUMMARY_PROJECTION: &str = r#"{
  _id,
  titel,
  untertitel,
  slug,
  kurzbeschreibung,
  titelbild{..., asset->{_id, metadata{lqip, dimensions}}},
  "titelbildOrFallback": coalesce(titelbild, videos[0].thumbnail),
  zeitraum,
  ist_featured,
  reihenfolge,
  veroeffentlichung,
  "exponatCount": count(exponate)
}"#;

const EXHIBITION_PROJECTION: &str = r#"{
  _id,
  titel,
  untertitel,
  slug,
  kurzbeschreibung,
  beschreibung,
  titelbild{..., asset->{_id, metadata{lqip, dimensions}}},
  "titelbildOrFallback": coalesce(titelbild, videos[0].thumbnail),
  galerie[]{..., asset->{_id, metadata{lqip, dimensions}}},
  videos,
  dokumente,
  "exponate": exponate[]->{
    _id, inventarnummer, titel, untertitel, kurzbeschreibung,
    hauptbild{..., asset->{_id, metadata{lqip, dimensions}}},
    "kategorie": kategorie->{_id, titel, slug, icon, farbe},
    ist_highlight, reihenfolge, led_position
  },
  "highlight_exponate": highlight_exponate[]->{
    _id, inventarnummer, titel, untertitel, kurzbeschreibung, beschreibung,
    hauptbild{..., asset->{_id, metadata{lqip, dimensions}}},
    bilder[]{..., asset->{_id, metadata{lqip, dimensions}}},
    "kategorie": kategorie->{_id, titel, slug, icon, farbe},
    datierung, herstellung, physisch, tags, ist_highlight, led_position
  },
  "kategorien": kategorien[]->{_id, titel, slug, icon, farbe},
  zeitraum,
  organisation,
  veranstaltungen,
  tags,
  ist_featured,
  reihenfolge,
  veroeffentlichung
}"#;

const KIOSK_DEVICE_PROJECTION: &str = r#"{
  _id,
  kioskId,
  hostname,
  location,
  "modus": ausstellung->kioskTemplate.template,
  "konfiguration": {
    "video_settings": {
      "playlist": ausstellung->videos[]{
        "typ": "video",
        "video": videodatei{asset->{_id, url, originalFilename, size, mimeType}},
        "titel": videotitel,
        "beschreibung": beschreibung,
        "dauer": dauer,
        "untertitel": untertitel{asset->{_id, url}},
        "bild": thumbnail{asset->{_id, url, metadata{lqip, dimensions}}}
      },
      "loop": ausstellung->kioskTemplate.videoSettings.loop,
      "shuffle": ausstellung->kioskTemplate.videoSettings.shuffle,
      "zeige_overlay": ausstellung->kioskTemplate.videoSettings.zeige_overlay,
      "overlay_position": ausstellung->kioskTemplate.videoSettings.overlay_position,
      "uebergang": ausstellung->kioskTemplate.videoSettings.uebergang,
      "zeige_untertitel": ausstellung->kioskTemplate.videoSettings.zeige_untertitel,
      "audio": {"lautstaerke": ausstellung->kioskTemplate.videoSettings.lautstaerke}
    },
    "slideshow_settings": ausstellung->kioskTemplate.slideshowSettings,
    "explorer_settings": ausstellung->kioskTemplate.explorerSettings,
    "reader_settings": ausstellung->kioskTemplate.readerSettings
  },
  "design": {"theme": "default"},
  "funktionen": {"zeige_qr_codes": true, "idle_timeout": 300}
}"#;

/// Default page size of [`exhibits`].
pub const DEFAULT_LIMIT: u32 = 50;

/// Default page size of [`exhibits_page`].
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// A GROQ query and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub groq: String,
    pub params: BTreeMap<String, Value>,
}

impl Query {
    pub fn new(groq: impl Into<String>) -> Self {
        Self { groq: groq.into(), params: BTreeMap::new() }
    }

    /// Bind `$name` to a JSON value.
    pub fn param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }
}

/// Exhibit list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExhibitFilter {
    /// Only exhibits flagged as highlights.
    pub highlight: bool,
    /// Single category reference.
    pub category: Option<String>,
    /// Any of these category references.
    pub categories: Vec<String>,
    pub offset: u32,
    /// Page size; each list builder has its own default.
    pub limit: Option<u32>,
}

impl ExhibitFilter {
    /// Append the filter expression (inside `*[...]`) and return its parameters.
    fn apply(&self, groq: &mut String) -> BTreeMap<String, Value> {
        let mut params = BTreeMap::new();
        groq.push_str(r#"_type == "exponat""#);
        if self.highlight {
            groq.push_str(" && ist_highlight == true");
        }
        if let Some(category) = &self.category {
            groq.push_str(" && kategorie._ref == $category");
            params.insert("category".into(), json!(category));
        }
        if !self.categories.is_empty() {
            groq.push_str(" && kategorie._ref in $categories");
            params.insert("categories".into(), json!(self.categories));
        }
        params
    }

    fn slice(&self, default_limit: u32) -> String {
        let limit = self.limit.unwrap_or(default_limit);
        format!("[{}...{}]", self.offset, self.offset.saturating_add(limit))
    }
}

fn exhibit_list(filter: &ExhibitFilter, default_limit: u32) -> Query {
    let mut groq = String::from("*[");
    let params = filter.apply(&mut groq);
    groq.push_str(&format!("] | {RANK_ORDER}{} {EXHIBIT_PROJECTION}", filter.slice(default_limit)));
    Query { groq, params }
}

/// Ordered exhibit list (default limit 50).
pub fn exhibits(filter: &ExhibitFilter) -> Query {
    exhibit_list(filter, DEFAULT_LIMIT)
}

/// One page of exhibits (default page size 12).
pub fn exhibits_page(filter: &ExhibitFilter) -> Query {
    exhibit_list(filter, DEFAULT_PAGE_SIZE)
}

/// Number of exhibits matching the filter; offset and limit are ignored.
pub fn exhibit_count(filter: &ExhibitFilter) -> Query {
    let mut groq = String::from("count(*[");
    let params = filter.apply(&mut groq);
    groq.push_str("])");
    Query { groq, params }
}

pub fn exhibit(id: &str) -> Query {
    Query::new(format!(r#"*[_type == "exponat" && _id == $id][0]{EXHIBIT_PROJECTION}"#)).param("id", json!(id))
}

/// Exhibit addressed by the code printed on its QR label.
pub fn exhibit_by_qr(code: &str) -> Query {
    Query::new(r#"*[_type == "exponat" && qr_code.current == $qrCode][0]{_id, inventarnummer, titel, kurzbeschreibung, hauptbild}"#)
        .param("qrCode", json!(code))
}

/// Exhibits by id, in exhibit order. `None` when no usable id is left.
///
/// Ids may be plain strings or reference objects carrying `_ref` / `_id`.
pub fn exhibits_by_ids(ids: &[Value]) -> Option<Query> {
    let cleaned: Vec<&str> = ids
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("_ref").or_else(|| map.get("_id")).and_then(Value::as_str),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    Some(
        Query::new(format!(r#"*[_type == "exponat" && _id in $ids] | {RANK_ORDER} {EXHIBIT_PROJECTION}"#))
            .param("ids", json!(cleaned)),
    )
}

pub fn categories() -> Query {
    Query::new(
        r#"*[_type == "kategorie"] | order(reihenfolge asc, titel asc) {_id, titel, slug, beschreibung, icon, farbe, reihenfolge}"#,
    )
}

pub fn museum_info() -> Query {
    Query::new(
        r#"*[_type == "museumInfo"][0]{name, untertitel, logo, willkommenstext, kontakt, oeffnungszeiten, eintrittspreise, social_media, sprachen}"#,
    )
}

/// Exhibition list. `active` keeps published and in-preparation exhibitions.
pub fn exhibitions(featured: bool, active: bool) -> Query {
    let mut filters = vec![r#"_type == "ausstellung""#];
    if featured {
        filters.push("ist_featured == true");
    }
    if active {
        filters.push(r#"veroeffentlichung.status in ["veroeffentlicht", "vorbereitung"]"#);
    }
    Query::new(format!("*[{}] | {RANK_ORDER} {EXHIBITION_SUMMARY_PROJECTION}", filters.join(" && ")))
}

/// Exhibition by document id or slug.
pub fn exhibition(id_or_slug: &str) -> Query {
    Query::new(format!(
        r#"*[_type == "ausstellung" && (_id == $id || slug.current == $id)][0]{EXHIBITION_PROJECTION}"#
    ))
    .param("id", json!(id_or_slug))
}

/// Kiosk device by kiosk id (`RPI_01`), hostname or document id.
pub fn kiosk_config(identifier: &str) -> Query {
    Query::new(format!(
        r#"*[_type == "kioskDevice" && (kioskId == $identifier || hostname == $identifier || _id == $identifier)][0]{KIOSK_DEVICE_PROJECTION}"#
    ))
    .param("identifier", json!(identifier))
}

/// Listener query for change notifications on one document type.
pub fn changes(document_type: &str) -> Query {
    Query::new("*[_type == $type]").param("type", json!(document_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhibits_default_slice() {
        let q = exhibits(&ExhibitFilter::default());
        assert!(q.groq.starts_with(r#"*[_type == "exponat"] | order(reihenfolge asc, _createdAt desc)[0...50] {"#));
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_exhibits_page_slice() {
        let filter = ExhibitFilter { offset: 24, ..Default::default() };
        assert!(exhibits_page(&filter).groq.contains("[24...36]"));

        let filter = ExhibitFilter { offset: 10, limit: Some(5), ..Default::default() };
        assert!(exhibits_page(&filter).groq.contains("[10...15]"));
    }

    #[test]
    fn test_exhibit_filter_params() {
        let filter = ExhibitFilter {
            highlight: true,
            category: Some("kat-kunst".into()),
            categories: vec!["kat-kunst".into(), "kat-natur".into()],
            ..Default::default()
        };
        let q = exhibits(&filter);
        assert!(q.groq.starts_with(
            r#"*[_type == "exponat" && ist_highlight == true && kategorie._ref == $category && kategorie._ref in $categories]"#
        ));
        assert_eq!(q.params["category"], json!("kat-kunst"));
        assert_eq!(q.params["categories"], json!(["kat-kunst", "kat-natur"]));
    }

    #[test]
    fn test_exhibit_count_ignores_slice() {
        let filter = ExhibitFilter { highlight: true, offset: 12, limit: Some(12), ..Default::default() };
        assert_eq!(exhibit_count(&filter).groq, r#"count(*[_type == "exponat" && ist_highlight == true])"#);
    }

    #[test]
    fn test_exhibit_by_id_binds_param() {
        let q = exhibit(r#"x" || true || ""#);
        assert!(q.groq.contains("_id == $id][0]{"));
        assert!(q.groq.contains("led_position"));
        assert_eq!(q.params["id"], json!(r#"x" || true || ""#));
    }

    #[test]
    fn test_exhibits_by_ids_cleans_refs() {
        let q = exhibits_by_ids(&[json!("a"), json!({"_ref": "b"}), json!({"_id": "c"}), json!(null), json!("")]).unwrap();
        assert_eq!(q.params["ids"], json!(["a", "b", "c"]));

        assert!(exhibits_by_ids(&[]).is_none());
        assert!(exhibits_by_ids(&[json!(42), json!({"title": "x"})]).is_none());
    }

    #[test]
    fn test_exhibitions_filters() {
        assert!(exhibitions(false, false).groq.starts_with(r#"*[_type == "ausstellung"] |"#));
        let q = exhibitions(true, true);
        assert!(q.groq.starts_with(
            r#"*[_type == "ausstellung" && ist_featured == true && veroeffentlichung.status in ["veroeffentlicht", "vorbereitung"]]"#
        ));
        assert!(q.groq.contains(r#""exponatCount": count(exponate)"#));
    }

    #[test]
    fn test_kiosk_config_matches_any_identifier() {
        let q = kiosk_config("RPI_01");
        assert!(q.groq.contains("kioskId == $identifier || hostname == $identifier || _id == $identifier"));
        assert_eq!(q.params["identifier"], json!("RPI_01"));
    }

    #[test]
    fn test_categories_order() {
        assert!(categories().groq.contains("order(reihenfolge asc, titel asc)"));
    }
}
