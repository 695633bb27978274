/// Weather data ingestion.
///
/// Submodules:
/// - `http_cache`: caching, retrying HTTP boundary shared by all requests.
/// - `open_meteo`: Open-Meteo forecast client and the `WeatherSource` trait.

pub mod http_cache;
pub mod open_meteo;

pub use open_meteo::{OpenMeteoSource, WeatherSource};
