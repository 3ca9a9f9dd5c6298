use std::time::Duration;

use clap::Parser;
use wayfind_core::{BBox, Context, LatLon, Options, RegionBias};

/// Address autocomplete against a remote geocoder.
///
/// Each line read from stdin is the current content of the input field.
/// Lines starting with `:` are commands (`:cancel`, `:clear`, `:refetch`,
/// `:quit`).
#[derive(Debug, Parser)]
#[command(name = "wayfind", version)]
pub struct Args {
    /// Search endpoint of a Nominatim instance.
    #[arg(long, env = "WAYFIND_ENDPOINT", default_value = wayfind_nominatim::DEFAULT_ENDPOINT)]
    pub endpoint: String,

    #[arg(long, env = "WAYFIND_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Contact address sent with every request.
    #[arg(long, env = "WAYFIND_EMAIL")]
    pub email: Option<String>,

    /// Preferred result language, e.g. `sk` or `en-US`.
    #[arg(long, env = "WAYFIND_LOCALE")]
    pub locale: Option<String>,

    /// Restrict results to these countries (ISO 3166-1 alpha-2).
    #[arg(long = "country", env = "WAYFIND_COUNTRIES", value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Bias towards a box: `west,south,east,north`.
    #[arg(long, value_parser = parse_bbox, conflicts_with = "center", allow_hyphen_values = true)]
    pub bbox: Option<BBox>,

    /// Bias towards a circle around `lat,lon`. Needs `--radius`.
    #[arg(long, value_parser = parse_lat_lon, requires = "radius", allow_hyphen_values = true)]
    pub center: Option<LatLon>,

    /// Radius of the `--center` bias in meters.
    #[arg(long, requires = "center")]
    pub radius: Option<f64>,

    /// Reject results outside the bias region instead of ranking them lower.
    #[arg(long)]
    pub strict: bool,

    /// Show distances from `lat,lon`.
    #[arg(long, value_parser = parse_lat_lon, env = "WAYFIND_ORIGIN", allow_hyphen_values = true)]
    pub origin: Option<LatLon>,

    #[arg(long, default_value_t = 3)]
    pub min_chars: usize,

    #[arg(long, default_value_t = 250)]
    pub debounce_ms: u64,

    /// Cache lifetime. Zero or negative disables caching.
    #[arg(long, env = "WAYFIND_CACHE_TTL_MS", default_value_t = 60_000, allow_negative_numbers = true)]
    pub cache_ttl_ms: i64,

    /// Maximum number of results per lookup.
    #[arg(long, default_value_t = 8)]
    pub limit: usize,

    /// Feed each line one character at a time, this many ms apart.
    #[arg(long)]
    pub typing_ms: Option<u64>,

    /// Print views as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    #[must_use]
    pub fn region_bias(&self) -> RegionBias {
        let strict = self.strict;
        if let Some(bbox) = self.bbox {
            return RegionBias::BBox { bbox, strict };
        }
        match (self.center, self.radius) {
            (Some(center), Some(radius_meters)) => RegionBias::CenterRadius {
                center,
                radius_meters,
                strict,
            },
            _ => RegionBias::None,
        }
    }

    #[must_use]
    pub fn context(&self) -> Context {
        let mut context = Context::new()
            .with_country_codes(self.countries.iter().map(|c| c.trim().to_owned()))
            .with_region_bias(self.region_bias());
        if let Some(locale) = &self.locale {
            context = context.with_locale(locale.clone());
        }
        context
    }

    #[must_use]
    pub fn searcher_options(&self) -> Options {
        Options {
            min_chars: self.min_chars,
            debounce: Duration::from_millis(self.debounce_ms),
            cache_ttl: Duration::from_millis(u64::try_from(self.cache_ttl_ms).unwrap_or(0)),
            origin: self.origin,
        }
    }

    #[must_use]
    pub fn provider_options(&self) -> wayfind_nominatim::Options {
        wayfind_nominatim::Options {
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            email: self.email.clone(),
            limit: self.limit,
            ..wayfind_nominatim::Options::default()
        }
    }
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let parts = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number \"{part}\": {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    <[f64; N]>::try_from(parts)
        .map_err(|parts| format!("expected {N} comma-separated numbers, got {}", parts.len()))
}

fn parse_lat_lon(s: &str) -> Result<LatLon, String> {
    let [lat, lon] = parse_numbers::<2>(s)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinates out of range: {s}"));
    }
    Ok(LatLon::new(lat, lon))
}

fn parse_bbox(s: &str) -> Result<BBox, String> {
    let [west, south, east, north] = parse_numbers::<4>(s)?;
    if south > north {
        return Err(format!("south edge {south} is above north edge {north}"));
    }
    Ok(BBox::new(west, south, east, north))
}
