use serde::{Deserialize, Serialize};

/// Raw decoded response body. The client returns it without reshaping.
pub type QueryResult = serde_json::Value;

// =============================================================================
// DIMENSIONS
// =============================================================================

/// Breakdown axis accepted by the `metrics` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Referrer,
    Browser,
    Os,
    Device,
    Country,
    Event,
}

impl Dimension {
    pub const ALL: [Self; 6] = [
        Self::Referrer,
        Self::Browser,
        Self::Os,
        Self::Device,
        Self::Country,
        Self::Event,
    ];

    /// Canonical `type` values sent to the API.
    pub const VALUES: [&'static str; 6] = [
        "referrer", "browser", "os", "device", "country", "event",
    ];

    /// Returns the canonical API string for this dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Referrer => "referrer",
            Self::Browser => "browser",
            Self::Os => "os",
            Self::Device => "device",
            Self::Country => "country",
            Self::Event => "event",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DimensionParseError {
    value: String,
}

impl std::fmt::Display for DimensionParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid dimension '{}'; expected one of: {}",
            self.value,
            Dimension::VALUES.join(", ")
        )
    }
}

impl std::error::Error for DimensionParseError {}

impl std::str::FromStr for Dimension {
    type Err = DimensionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let dimension = match value.trim().to_ascii_lowercase().as_str() {
            "referrer" | "referrers" => Self::Referrer,
            "browser" | "browsers" => Self::Browser,
            "os" | "operatingsystem" | "operating-system" => Self::Os,
            "device" | "devices" => Self::Device,
            "country" | "countries" => Self::Country,
            "event" | "events" => Self::Event,
            _ => {
                return Err(DimensionParseError {
                    value: value.to_string(),
                })
            }
        };
        Ok(dimension)
    }
}

impl From<Dimension> for String {
    fn from(value: Dimension) -> Self {
        value.as_str().to_string()
    }
}

// =============================================================================
// RESPONSE SHAPES
// =============================================================================
//
// Typed views over the common payloads. The client itself returns
// `QueryResult`; callers opt in with `serde_json::from_value`.

/// One row of a metrics breakdown, e.g. `{"x": "/about", "y": 50}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Dimension value. `None` for direct traffic and unknown values
    pub x: Option<String>,
    /// Count for this value
    pub y: u64,
}

/// One bucket of a pageview series, keyed by the bucket start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket start as formatted by the server (e.g. "2024-01-01 00:00:00")
    pub x: String,
    pub y: u64,
}

/// Response of the `pageviews` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageViews {
    #[serde(default)]
    pub pageviews: Vec<SeriesPoint>,
    #[serde(default)]
    pub sessions: Vec<SeriesPoint>,
}

/// Body of `POST /api/auth/login`.
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Fields read from the login response; anything else is ignored.
#[derive(Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
}
