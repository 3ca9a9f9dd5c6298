use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo;

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// An axis-aligned box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BBox {
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

/// Restricts or favours results within a geographic area.
///
/// With `strict` set the remote service must drop results outside the
/// region; otherwise the region only affects ranking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegionBias {
    #[default]
    None,
    #[serde(rename_all = "camelCase")]
    CenterRadius {
        center: LatLon,
        radius_meters: f64,
        #[serde(default)]
        strict: bool,
    },
    #[serde(rename = "bbox")]
    BBox {
        bbox: BBox,
        #[serde(default)]
        strict: bool,
    },
}

impl RegionBias {
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        match self {
            Self::None => false,
            Self::CenterRadius { strict, .. } | Self::BBox { strict, .. } => *strict,
        }
    }

    /// The box covered by this bias, approximating circles by their
    /// bounding box. `None` for [`RegionBias::None`].
    #[must_use]
    pub fn bbox(&self) -> Option<BBox> {
        match self {
            Self::None => None,
            Self::CenterRadius {
                center,
                radius_meters,
                ..
            } => Some(geo::bbox_around(*center, *radius_meters)),
            Self::BBox { bbox, .. } => Some(*bbox),
        }
    }
}

/// Parameters shared by every lookup of one [`Searcher`](crate::Searcher).
///
/// Part of the cache key, so two searches only share cached results when
/// their contexts are semantically equal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// ISO 3166-1 alpha-2 filters. Empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub country_codes: Vec<String>,
    #[serde(default)]
    pub region_bias: RegionBias,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_country_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.country_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_region_bias(mut self, bias: RegionBias) -> Self {
        self.region_bias = bias;
        self
    }
}

/// Structured parts of an address. Every field is optional because
/// providers rarely return all of them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
}

/// One candidate returned by a [`Provider`](crate::Provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<LatLon>,
    #[serde(default)]
    pub components: Components,
    /// Provider-specific identifier, opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub provider: String,
    /// The provider's original payload for this candidate.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

impl Address {
    #[must_use]
    pub fn new(label: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            coordinates: None,
            components: Components::default(),
            id: None,
            provider: provider.into(),
            raw: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub const fn with_coordinates(mut self, coordinates: LatLon) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether `self` and `other` denote the same place.
    ///
    /// Identifiers decide when both sides carry one; otherwise label and
    /// provider must match.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.label == other.label && self.provider == other.provider,
        }
    }
}

/// An [`Address`] as handed to callers, with the distance from the
/// configured origin when both are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(flatten)]
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

impl Suggestion {
    #[must_use]
    pub fn new(address: Address, origin: Option<LatLon>) -> Self {
        let distance_meters = origin
            .zip(address.coordinates)
            .map(|(origin, point)| geo::distance_meters(origin, point));
        Self {
            address,
            distance_meters,
        }
    }

    /// Human-readable distance, e.g. `"4.2 km"`.
    #[must_use]
    pub fn distance_label(&self) -> Option<String> {
        self.distance_meters.map(geo::format_distance_meters)
    }
}
