//! The canonical subscriber record shared by the source and destination services.
//!
//! Records arrive with arbitrary key casing. [`normalize_keys`] uppercases keys and turns
//! sentinel values into null; [`project`] then maps the result onto the fixed list of
//! [`CANONICAL_FIELDS`], in order, dropping anything else.

use serde_json::Value as JsonValue;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::json::JsonObject;
use crate::types::ColumnDef;

/// A record as fetched from the source, keys in any case.
pub type RawRecord = JsonObject;

/// Number of canonical fields.
pub const CANONICAL_FIELD_COUNT: usize = 45;

/// Canonical field names, in insertion order.
pub const CANONICAL_FIELDS: [&str; CANONICAL_FIELD_COUNT] = [
    "OBJECTID",
    "SECTION",
    "LOT",
    "PARCELLE",
    "RANG",
    "NUMÉRO_DU_COMPTEUR",
    "NUMÉRO_D_ABONNÉ",
    "POSITION_GPS",
    "NUMÉRO_DE_TÉLÉPHONE",
    "CODESTICKER",
    "PUISSANCE_SOUSCRITE",
    "AMPERAGE",
    "EXPLOITATION",
    "NATURE_CLIENT",
    "USAGE_D_AUTRE_SOURCE_D_ÉNERGIE",
    "AUTRE_SOURCE_D_ÉNERGIE",
    "TYPE_DE_CLIENT",
    "USAGE",
    "CATÉGORIE_D_INSTITUTION",
    "TYPE_DE_BÂTI",
    "CATÉGORIE_ADMINISTRATION",
    "ACTIVITÉS",
    "GLOBALID",
    "CREATED_USER",
    "CREATED_DATE",
    "LAST_EDITED_USER",
    "LAST_EDITED_DATE",
    "NOTES",
    "LOT_1",
    "USAGE_SECONDAIRE_POUR_ACTIVITÉ",
    "NOM_D_UTILISATEUR",
    "VALIDATEUR",
    "QUALITÉ_VÉRIFIÉE",
    "ACCESSIBILITÉ",
    "NOM",
    "N_POLICE",
    "PRÉNOMS",
    "SOCIOPROFESSIONALCATEGORY",
    "ÉQUIPEMENT_ADMINISTRATIF",
    "ÉQUIPEMENT_INSTITUTIONNEL",
    "ÉQUIPEMENT_DE_MÉNAGE",
    "POINT_X",
    "POINT_Y",
    "KWH_2023_2024",
    "FCFA_2023_2024",
];

/// Text tokens that mean "not a number" and are stored as null.
pub const NAN_TOKENS: [&str; 2] = ["NaN", "nan"];

/// Whether `value` means "no data".
pub fn is_sentinel(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => NAN_TOKENS.contains(&s.as_str()),
        _ => false,
    }
}

/// Uppercase every key and replace sentinel values with null.
///
/// When two keys collide after uppercasing, the one that was already uppercase wins; otherwise
/// the later key wins. The function is idempotent.
pub fn normalize_keys(raw: &RawRecord) -> RawRecord {
    let mut out = RawRecord::new();
    let mut from_exact: Vec<String> = Vec::new();
    for (key, value) in raw {
        let upper = key.to_uppercase();
        let exact = upper == *key;
        if !exact && from_exact.contains(&upper) {
            continue;
        }
        if exact {
            from_exact.push(upper.clone());
        }
        let value = if is_sentinel(value) {
            JsonValue::Null
        } else {
            value.clone()
        };
        out.insert(upper, value);
    }
    out
}

/// A record projected onto [`CANONICAL_FIELDS`].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    values: Vec<JsonValue>,
}

impl CanonicalRecord {
    /// Values in canonical field order; always [`CANONICAL_FIELD_COUNT`] long.
    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    /// Value of a canonical field (uppercase name).
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        let idx = CANONICAL_FIELDS.iter().position(|f| *f == field)?;
        self.values.get(idx)
    }

    /// Number of fields carrying a non-null value.
    pub fn populated(&self) -> usize {
        self.values.iter().filter(|v| !v.is_null()).count()
    }

    /// Values rendered for binding against text columns.
    pub fn to_text_row(&self) -> Vec<Option<String>> {
        self.values.iter().map(json_to_text).collect()
    }
}

/// Project a normalized record onto the canonical fields.
///
/// Absent fields become null; fields outside the canonical list are dropped.
pub fn project(normalized: &RawRecord) -> CanonicalRecord {
    let values = CANONICAL_FIELDS
        .iter()
        .map(|field| normalized.get(*field).cloned().unwrap_or(JsonValue::Null))
        .collect();
    CanonicalRecord { values }
}

/// Canonical fields missing from a normalized record, in canonical order.
pub fn missing_fields(normalized: &RawRecord) -> Vec<String> {
    CANONICAL_FIELDS
        .iter()
        .filter(|f| !normalized.contains_key(**f))
        .map(|f| f.to_string())
        .collect()
}

/// Normalize and project `raw`, requiring every canonical field to be present.
pub fn require_complete(raw: &RawRecord) -> PipelineResult<CanonicalRecord> {
    let normalized = normalize_keys(raw);
    let missing = missing_fields(&normalized);
    if !missing.is_empty() {
        return Err(PipelineError::MissingFields { fields: missing });
    }
    Ok(project(&normalized))
}

/// Destination column names (lowercase canonical names), in canonical order.
pub fn canonical_column_names() -> Vec<String> {
    CANONICAL_FIELDS.iter().map(|f| f.to_lowercase()).collect()
}

/// Destination table definition: every canonical column as text, `objectid` as primary key.
pub fn canonical_columns() -> Vec<ColumnDef> {
    canonical_column_names()
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let column = ColumnDef::text(name);
            if idx == 0 { column.primary_key() } else { column }
        })
        .collect()
}

/// Text rendering of a JSON value for a text column. Nested values are stored as JSON text.
pub fn json_to_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> RawRecord {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn canonical_list_is_complete_and_ordered() {
        assert_eq!(CANONICAL_FIELDS.len(), 45);
        assert_eq!(CANONICAL_FIELDS[0], "OBJECTID");
        assert_eq!(CANONICAL_FIELDS[44], "FCFA_2023_2024");
        assert_eq!(canonical_column_names()[6], "numéro_d_abonné");
    }

    #[test]
    fn keys_are_uppercased_and_sentinels_nulled() {
        let out = normalize_keys(&record(json!({
            "objectid": 7,
            "Nom": "NaN",
            "prénoms": "nan",
            "notes": null,
            "usage": "NAN"
        })));
        assert_eq!(out["OBJECTID"], json!(7));
        assert_eq!(out["NOM"], JsonValue::Null);
        assert_eq!(out["PRÉNOMS"], JsonValue::Null);
        assert_eq!(out["NOTES"], JsonValue::Null);
        assert_eq!(out["USAGE"], json!("NAN"));
    }

    #[test]
    fn uppercase_key_wins_collision() {
        let out = normalize_keys(&record(json!({ "NOM": "a", "nom": "b" })));
        assert_eq!(out.len(), 1);
        assert_eq!(out["NOM"], json!("a"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = record(json!({ "Lot": "NaN", "section": 3, "extra": [1, 2] }));
        let once = normalize_keys(&raw);
        assert_eq!(normalize_keys(&once), once);
    }

    #[test]
    fn projection_has_every_canonical_field() {
        let normalized = normalize_keys(&record(json!({ "objectid": 1, "nom": "Ouedraogo", "unknown": 1 })));
        let projected = project(&normalized);
        assert_eq!(projected.values().len(), CANONICAL_FIELD_COUNT);
        assert_eq!(projected.populated(), 2);
        assert_eq!(projected.get("NOM"), Some(&json!("Ouedraogo")));
        assert_eq!(projected.to_text_row()[0].as_deref(), Some("1"));
    }

    #[test]
    fn strict_insert_lists_missing_fields() {
        let err = require_complete(&record(json!({ "objectid": 1 }))).unwrap_err();
        match err {
            PipelineError::MissingFields { fields } => {
                assert_eq!(fields.len(), 44);
                assert_eq!(fields[0], "SECTION");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
