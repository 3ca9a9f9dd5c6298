use serde_json::Value;
use wayfind_core::{Address, Components, LatLon};

use crate::PROVIDER_NAME;

const UNKNOWN_LABEL: &str = "Unknown address";

/// Convert one Nominatim result into an [`Address`].
///
/// Fields of the wrong type are treated as absent. The original item is
/// kept in [`Address::raw`].
#[must_use]
pub fn normalize(item: Value) -> Address {
    let coordinates = match (coordinate(&item, "lat"), coordinate(&item, "lon")) {
        (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
        _ => None,
    };

    let label = string(&item, "display_name")
        .or_else(|| string(&item, "name"))
        .unwrap_or_else(|| UNKNOWN_LABEL.to_owned());

    let id = match item.get("place_id") {
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let components = item
        .get("address")
        .map(components)
        .unwrap_or_default();

    Address {
        label,
        coordinates,
        components,
        id,
        provider: PROVIDER_NAME.to_owned(),
        raw: item,
    }
}

fn components(address: &Value) -> Components {
    Components {
        country_code: string(address, "country_code").map(|c| c.to_uppercase()),
        country: string(address, "country"),
        region: string(address, "state"),
        city: string(address, "city")
            .or_else(|| string(address, "town"))
            .or_else(|| string(address, "village")),
        postal_code: string(address, "postcode"),
        street: string(address, "road"),
        house_number: string(address, "house_number"),
    }
}

fn string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Nominatim encodes coordinates as decimal strings.
fn coordinate(value: &Value, key: &str) -> Option<f64> {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}
