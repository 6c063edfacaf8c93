use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::MaterialError;
use crate::normalization;

/// A single recyclable-material guide, such as "Paper" or "Glass".
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    /// The slug identifying the material. Unique within a list.
    #[serde(deserialize_with = "normalization::deserialize")]
    pub id: String,

    /// The display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// A short description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,

    /// An external video explaining how to recycle the material.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// The display color as a hex string.
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,

    /// How to handle the material.
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: HandlingGuide,
}

/// What can and cannot be recycled, and how to prepare it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlingGuide {
    #[serde(default, deserialize_with = "null_as_default")]
    pub recyclable: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub non_recyclable: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub how_to_prepare: String,
}

/// An incoming material value, as submitted by an edit form. Every
/// field may be absent.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialDraft {
    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<GuideDraft>,
}

/// An incoming handling guide. Lists that are not well-formed arrays of
/// strings deserialize as absent.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideDraft {
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub recyclable: Option<Vec<String>>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub non_recyclable: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_prepare: Option<String>,
}

impl MaterialDraft {
    /// Creates a draft carrying only an ID.
    pub fn with_id(id: impl AsRef<str>) -> Self {
        MaterialDraft {
            id: Some(normalization::normalize_key(id)).filter(|id| !id.is_empty()),
            ..Default::default()
        }
    }

    /// Returns the normalized ID, if the draft has one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Turns the draft into a full material. Absent fields fall back to
    /// `existing` when given and to empty values otherwise.
    pub fn into_material(self, existing: Option<&Material>) -> Result<Material, MaterialError> {
        let id = match self.id() {
            Some(id) => id.to_owned(),
            None => return Err(MaterialError::MissingId),
        };

        let material = match existing {
            Some(existing) => Material {
                id,
                name: self.name.unwrap_or_else(|| existing.name.clone()),
                description: self
                    .description
                    .unwrap_or_else(|| existing.description.clone()),
                video_url: self.video_url.or_else(|| existing.video_url.clone()),
                color: self.color.unwrap_or_else(|| existing.color.clone()),
                items: match self.items {
                    Some(items) => items.merge_onto(&existing.items),
                    None => existing.items.clone(),
                },
            },
            None => Material {
                id,
                name: self.name.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
                video_url: self.video_url,
                color: self.color.unwrap_or_default(),
                items: self
                    .items
                    .map(|items| items.merge_onto(&HandlingGuide::default()))
                    .unwrap_or_default(),
            },
        };

        Ok(material)
    }
}

impl GuideDraft {
    fn merge_onto(self, existing: &HandlingGuide) -> HandlingGuide {
        HandlingGuide {
            recyclable: self
                .recyclable
                .unwrap_or_else(|| existing.recyclable.clone()),
            non_recyclable: self
                .non_recyclable
                .unwrap_or_else(|| existing.non_recyclable.clone()),
            how_to_prepare: self
                .how_to_prepare
                .unwrap_or_else(|| existing.how_to_prepare.clone()),
        }
    }
}

impl From<Material> for MaterialDraft {
    fn from(material: Material) -> Self {
        MaterialDraft {
            id: Some(material.id),
            name: Some(material.name),
            description: Some(material.description),
            video_url: material.video_url,
            color: Some(material.color),
            items: Some(GuideDraft {
                recyclable: Some(material.items.recyclable),
                non_recyclable: Some(material.items.non_recyclable),
                how_to_prepare: Some(material.items.how_to_prepare),
            }),
        }
    }
}

/// Removes materials whose ID already appeared earlier in the list,
/// keeping the order of first occurrences.
pub fn dedup_by_id(materials: Vec<Material>) -> Vec<Material> {
    let mut seen = HashSet::new();

    materials
        .into_iter()
        .filter(|material| seen.insert(material.id.clone()))
        .collect()
}

/// Parses a cached list. Anything but a JSON array of materials is
/// rejected.
pub fn parse_list(raw: &str) -> Result<Vec<Material>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Deserializes a field that may be `null`, which counts as absent.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value: Option<T> = Deserialize::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

fn deserialize_lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where D: Deserializer<'de> {
    let value: Value = Deserialize::deserialize(deserializer)?;

    let list = match value {
        Value::Array(entries) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect::<Option<Vec<_>>>(),
        _ => None,
    };

    Ok(list)
}
