//! Cascading geography resolver.
//!
//! Resolves country → state → city option lists in sequence. Selecting a
//! higher level *synchronously* clears every lower level, then issues a
//! sequence-numbered fetch token for the next level down. Responses are
//! applied through their token; a token whose sequence number has been
//! superseded is discarded - "latest request wins". This is the race the
//! component exists to prevent: a slow state-list response for the previous
//! country must never overwrite the selection made after it.
//!
//! The [`OTHER_CITY`] sentinel switches the city field to free text and is
//! the only value that bypasses the cascade.
//!
//! The `load_*` conveniences combine issue + fetch + apply for callers that
//! hold the resolver across the await; event-loop callers that interleave
//! user input with completions use the `select_*`/`apply_*` pairs directly.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{ApiError, CityOption, Country, GeoDirectory, StateOption};

/// City sentinel that switches the UI to a free-text field.
pub const OTHER_CITY: &str = "Other";

/// Load state of one cascade level's option list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldState<T> {
    /// Nothing requested yet (or cleared by a higher-level change).
    #[default]
    Empty,
    /// A fetch is outstanding.
    Loading,
    /// Options available.
    Loaded(Vec<T>),
    /// The fetch failed; empty options plus an error flag.
    Failed,
}

impl<T> FieldState<T> {
    /// The options, empty unless loaded.
    #[must_use]
    pub fn options(&self) -> &[T] {
        match self {
            Self::Loaded(options) => options,
            _ => &[],
        }
    }

    /// Whether a fetch is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether the last fetch failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Which cascade level a fetch token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Country,
    State,
    City,
}

/// A sequence-numbered handle for one outstanding fetch.
///
/// Obtained when a fetch is issued; required to apply its response. Stale
/// tokens (superseded by a newer selection at the same level) are discarded
/// on apply.
#[derive(Debug, Clone, Copy)]
#[must_use = "a fetch token must be passed back to the matching apply_* call"]
pub struct FetchToken {
    level: Level,
    seq: u64,
}

/// The shopper's city choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitySelection {
    /// Picked from the fetched option list.
    Listed(String),
    /// Free text, entered after choosing the [`OTHER_CITY`] sentinel.
    Custom(String),
}

// =============================================================================
// GeographyResolver
// =============================================================================

/// Owns the cascade's option lists, selections, and fetch sequencing.
#[derive(Debug, Default)]
pub struct GeographyResolver {
    countries: FieldState<Country>,
    states: FieldState<StateOption>,
    cities: FieldState<CityOption>,

    country_code: Option<String>,
    state_code: Option<String>,
    city: Option<CitySelection>,

    country_seq: u64,
    state_seq: u64,
    city_seq: u64,
}

impl GeographyResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Issue
    // =========================================================================

    /// Start loading the country list.
    pub fn begin_countries_load(&mut self) -> FetchToken {
        self.countries = FieldState::Loading;
        self.country_seq += 1;
        FetchToken {
            level: Level::Country,
            seq: self.country_seq,
        }
    }

    /// Select a country.
    ///
    /// Clears the state and city selections and option lists immediately -
    /// before any fetch resolves - and starts loading the state list.
    /// Outstanding state *and* city fetches are superseded.
    pub fn select_country(&mut self, code: &str) -> FetchToken {
        self.country_code = Some(code.to_owned());
        self.state_code = None;
        self.city = None;
        self.states = FieldState::Loading;
        self.cities = FieldState::Empty;
        self.state_seq += 1;
        self.city_seq += 1;
        FetchToken {
            level: Level::State,
            seq: self.state_seq,
        }
    }

    /// Select a state within the current country.
    ///
    /// Clears the city selection immediately and starts loading the city
    /// list; outstanding city fetches are superseded.
    pub fn select_state(&mut self, code: &str) -> FetchToken {
        self.state_code = Some(code.to_owned());
        self.city = None;
        self.cities = FieldState::Loading;
        self.city_seq += 1;
        FetchToken {
            level: Level::City,
            seq: self.city_seq,
        }
    }

    /// Select a city from the option list.
    ///
    /// The [`OTHER_CITY`] sentinel switches to a free-text custom city
    /// (filled in via [`Self::set_custom_city`]).
    pub fn select_city(&mut self, name: &str) {
        self.city = if name == OTHER_CITY {
            Some(CitySelection::Custom(String::new()))
        } else {
            Some(CitySelection::Listed(name.to_owned()))
        };
    }

    /// Set the free-text city. Only meaningful after the sentinel was chosen,
    /// but harmless otherwise - it simply makes the city custom.
    pub fn set_custom_city(&mut self, text: &str) {
        self.city = Some(CitySelection::Custom(text.to_owned()));
    }

    // =========================================================================
    // Apply
    // =========================================================================

    /// Apply a country-list response.
    pub fn apply_countries(&mut self, token: FetchToken, result: Result<Vec<Country>, ApiError>) {
        if self.is_stale(token, Level::Country) {
            return;
        }
        self.countries = Self::to_field_state(result, "country");
    }

    /// Apply a state-list response for the token's selection.
    pub fn apply_states(&mut self, token: FetchToken, result: Result<Vec<StateOption>, ApiError>) {
        if self.is_stale(token, Level::State) {
            return;
        }
        self.states = Self::to_field_state(result, "state");
    }

    /// Apply a city-list response for the token's selection.
    pub fn apply_cities(&mut self, token: FetchToken, result: Result<Vec<CityOption>, ApiError>) {
        if self.is_stale(token, Level::City) {
            return;
        }
        self.cities = Self::to_field_state(result, "city");
    }

    fn is_stale(&self, token: FetchToken, expected: Level) -> bool {
        debug_assert!(token.level == expected, "token applied at wrong level");
        let current = match expected {
            Level::Country => self.country_seq,
            Level::State => self.state_seq,
            Level::City => self.city_seq,
        };
        if token.level != expected || token.seq != current {
            debug!(?token, current, "discarding stale geography response");
            return true;
        }
        false
    }

    fn to_field_state<T>(result: Result<Vec<T>, ApiError>, level: &str) -> FieldState<T> {
        match result {
            Ok(options) => FieldState::Loaded(options),
            Err(e) => {
                // Does not block editing of already-resolved higher levels
                warn!(level, error = %e, "geography fetch failed");
                FieldState::Failed
            }
        }
    }

    // =========================================================================
    // Convenience fetch-and-apply
    // =========================================================================

    /// Load the country list.
    pub async fn load_countries(&mut self, geo: &impl GeoDirectory) {
        let token = self.begin_countries_load();
        let result = geo.countries().await;
        self.apply_countries(token, result);
    }

    /// Load the state list for the current country selection, if any.
    pub async fn load_states(&mut self, geo: &impl GeoDirectory) {
        let Some(country) = self.country_code.clone() else {
            return;
        };
        let token = FetchToken {
            level: Level::State,
            seq: self.state_seq,
        };
        let result = geo.states(&country).await;
        self.apply_states(token, result);
    }

    /// Load the city list for the current country/state selection, if any.
    pub async fn load_cities(&mut self, geo: &impl GeoDirectory) {
        let (Some(country), Some(state)) = (self.country_code.clone(), self.state_code.clone())
        else {
            return;
        };
        let token = FetchToken {
            level: Level::City,
            seq: self.city_seq,
        };
        let result = geo.cities(&country, &state).await;
        self.apply_cities(token, result);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub const fn countries(&self) -> &FieldState<Country> {
        &self.countries
    }

    #[must_use]
    pub const fn states(&self) -> &FieldState<StateOption> {
        &self.states
    }

    #[must_use]
    pub const fn cities(&self) -> &FieldState<CityOption> {
        &self.cities
    }

    #[must_use]
    pub fn selected_country(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    #[must_use]
    pub fn selected_state(&self) -> Option<&str> {
        self.state_code.as_deref()
    }

    #[must_use]
    pub const fn city_selection(&self) -> Option<&CitySelection> {
        self.city.as_ref()
    }

    /// The effective city name: a listed city, or non-empty custom text.
    #[must_use]
    pub fn resolved_city(&self) -> Option<&str> {
        match self.city.as_ref()? {
            CitySelection::Listed(name) => Some(name),
            CitySelection::Custom(text) if !text.is_empty() => Some(text),
            CitySelection::Custom(_) => None,
        }
    }
}
