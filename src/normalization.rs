use serde::{Deserialize, Deserializer};

/// Normalizes a material key by stripping surrounding whitespace and
/// composing it into Unicode Normalization Form C.
///
/// ```
/// use materials_sync::normalization::normalize_key;
/// assert_eq!(normalize_key(" vidro "), "vidro");
/// assert_eq!(normalize_key("plástico"), normalize_key("pla\u{301}stico"));
/// ```
pub fn normalize_key(key: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    key.as_ref().trim().nfc().collect()
}

/// Deserializes a `String` after running it through `normalize_key`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_key(s))
}

/// Deserializes an optional `String` after running it through
/// `normalize_key`. Keys that are blank once normalized become `None`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_key).filter(|key| !key.is_empty()))
}
