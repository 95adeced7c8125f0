/// External data APIs.
///
/// - `openweather`: OpenWeatherMap current, 3-hourly and daily forecasts.

pub mod openweather;
