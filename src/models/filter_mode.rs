use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Number of recommendations returned when the caller gives no usable limit
pub const DEFAULT_LIMIT: usize = 5;

/// Retrieval and ranking strategy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Top,
    Genre,
    Artist,
    Energy,
    Tempo,
}

impl FilterMode {
    pub const ALL: [FilterMode; 5] = [
        FilterMode::Top,
        FilterMode::Genre,
        FilterMode::Artist,
        FilterMode::Energy,
        FilterMode::Tempo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Top => "top",
            FilterMode::Genre => "genre",
            FilterMode::Artist => "artist",
            FilterMode::Energy => "energy",
            FilterMode::Tempo => "tempo",
        }
    }

    /// Parses a user-supplied mode, falling back to `Top` for anything that is not an
    /// exact lowercase mode name
    pub fn from_param(value: Option<&str>) -> Self {
        value
            .and_then(|raw| Self::ALL.into_iter().find(|mode| mode.as_str() == raw))
            .unwrap_or_default()
    }
}

impl Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positive leading integer of `raw` (`"2.9"` and `"3 tracks"` both count), or `None`
pub fn parse_limit(raw: &str) -> Option<usize> {
    let raw = raw.trim_start();
    let unsigned = raw.strip_prefix('+').unwrap_or(raw);
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());

    unsigned[..digits_end]
        .parse::<usize>()
        .ok()
        .filter(|limit| *limit > 0)
}

/// Same as [`parse_limit`] for a loosely typed JSON value (number or numeric string)
pub fn limit_from_json(value: Option<&serde_json::Value>) -> Option<usize> {
    let limit = match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        serde_json::Value::String(s) => return parse_limit(s),
        _ => return None,
    };
    (limit > 0).then_some(limit as usize)
}
