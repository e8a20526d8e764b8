//! Serde helpers for broker payloads that mix string and numeric encodings.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

/// Accepts `"123.4"`, `123.4` or `null`; blank strings count as absent.
pub(crate) fn opt_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(value
        .map(|v| match v {
            StringOrNumber::String(s) => s.trim().to_owned(),
            StringOrNumber::Number(n) => n.to_string(),
        })
        .filter(|s| !s.is_empty()))
}
