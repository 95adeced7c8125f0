/// OpenWeatherMap Data API Client
///
/// Retrieves current conditions, the 3-hourly forecast and the daily
/// forecast for one location from the OpenWeatherMap 2.5 API and turns the
/// responses into `WeatherReport`s ready for the time-series sink.
///
/// API Documentation: https://openweathermap.org/api
/// Current conditions: https://openweathermap.org/current
/// Daily forecast: https://openweathermap.org/forecast16

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::{WeatherConfig, WeatherCredentials};
use crate::model::{CompassDirection, Coordinates, FieldValue, ReportKind, WeatherError, WeatherReport};

/// Entries per day in the 3-hourly forecast.
const FORECAST_STEPS_PER_DAY: u16 = 8;

/// The free 3-hourly forecast stops after five days.
const FORECAST_MAX_STEPS: u16 = 40;

/// Number of daily reports folded into the weekly summary.
pub const WEEK_DAYS: usize = 7;

// ============================================================================
// OpenWeatherMap API Response Structures
// ============================================================================

/// Response of the `weather` endpoint
#[derive(Debug, Deserialize)]
pub struct OwmCurrentResponse {
    pub name: String,
    pub coord: OwmCoord,
    #[serde(default)]
    pub weather: Vec<OwmCondition>,
    pub main: OwmMain,
    pub visibility: Option<i64>,
    pub clouds: Option<OwmClouds>,
    pub wind: Option<OwmWind>,
    pub sys: OwmSys,
    pub timezone: i64, // shift from UTC in seconds
    pub rain: Option<OwmPrecip>,
    pub snow: Option<OwmPrecip>,
}

#[derive(Debug, Deserialize)]
pub struct OwmCoord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct OwmCondition {
    pub main: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct OwmMain {
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub pressure: Option<i64>,  // hPa
    pub humidity: Option<i64>,  // %
}

#[derive(Debug, Deserialize)]
pub struct OwmClouds {
    pub all: i64,  // %
}

#[derive(Debug, Deserialize)]
pub struct OwmWind {
    pub speed: Option<f64>,
    pub deg: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OwmSys {
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

/// Precipitation volume in mm; either key may be missing.
#[derive(Debug, Deserialize)]
pub struct OwmPrecip {
    #[serde(rename = "1h")]
    pub one_hour: Option<f64>,
    #[serde(rename = "3h")]
    pub three_hours: Option<f64>,
}

/// Place block shared by both forecast endpoints
#[derive(Debug, Deserialize)]
pub struct OwmCity {
    pub name: String,
    pub coord: OwmCoord,
    #[serde(default)]
    pub timezone: i64,
}

/// Response of the 3-hourly `forecast` endpoint
#[derive(Debug, Deserialize)]
pub struct OwmForecastResponse {
    pub city: OwmCity,
    pub list: Vec<OwmForecastEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OwmForecastEntry {
    pub dt: i64,
    pub main: OwmMain,
    #[serde(default)]
    pub weather: Vec<OwmCondition>,
    pub clouds: Option<OwmClouds>,
    pub wind: Option<OwmWind>,
    pub visibility: Option<i64>,
    pub pop: Option<f64>,  // probability of precipitation, 0..1
    pub rain: Option<OwmPrecip>,
    pub snow: Option<OwmPrecip>,
}

/// Response of the `forecast/daily` endpoint
#[derive(Debug, Deserialize)]
pub struct OwmDailyResponse {
    pub city: OwmCity,
    pub list: Vec<OwmDailyEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OwmDailyEntry {
    pub dt: i64,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub temp: OwmDailyTemp,
    pub feels_like: Option<OwmDailyFeelsLike>,
    pub pressure: Option<i64>,
    pub humidity: Option<i64>,
    #[serde(default)]
    pub weather: Vec<OwmCondition>,
    pub speed: Option<f64>,
    pub deg: Option<i64>,
    pub clouds: Option<i64>,
    pub pop: Option<f64>,
    pub rain: Option<f64>,  // mm for the whole day
    pub snow: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct OwmDailyTemp {
    pub day: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub night: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct OwmDailyFeelsLike {
    pub day: Option<f64>,
}

// ============================================================================
// API Client
// ============================================================================

/// Blocking client bound to one location and one API key.
pub struct WeatherClient {
    http: reqwest::blocking::Client,
    base_url: String,
    credentials: WeatherCredentials,
    units: String,
    lang: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig, credentials: WeatherCredentials) -> Result<Self, WeatherError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WeatherError::RequestError(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            units: config.units.clone(),
            lang: config.lang.clone(),
        })
    }

    /// Full request URL for `endpoint`, with the location, key, units and
    /// language parameters every call carries.
    pub fn build_url(&self, endpoint: &str, extra: &[(&str, String)]) -> Result<reqwest::Url, WeatherError> {
        let mut params = vec![
            ("lat", self.credentials.lat.to_string()),
            ("lon", self.credentials.lon.to_string()),
            ("appid", self.credentials.api_key.clone()),
            ("units", self.units.clone()),
            ("lang", self.lang.clone()),
        ];
        params.extend(extra.iter().map(|(k, v)| (*k, v.clone())));
        reqwest::Url::parse_with_params(&format!("{}/{}", self.base_url, endpoint), &params)
            .map_err(|e| WeatherError::RequestError(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str, extra: &[(&str, String)]) -> Result<T, WeatherError> {
        let url = self.build_url(endpoint, extra)?;
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| WeatherError::RequestError(e.to_string()))?;

        // Only 200 counts; 204 or a redirect body is as useless as a 500.
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(WeatherError::HttpError(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| WeatherError::RequestError(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| WeatherError::ParseError(e.to_string()))
    }

    /// Fetch current conditions
    pub fn fetch_current(&self) -> Result<WeatherReport, WeatherError> {
        let response: OwmCurrentResponse = self.get_json("weather", &[])?;
        parse_current(response, Utc::now())
    }

    /// Fetch the 3-hourly forecast covering `days` days (capped at five)
    pub fn fetch_forecast(&self, days: u8) -> Result<Vec<WeatherReport>, WeatherError> {
        let response: OwmForecastResponse =
            self.get_json("forecast", &[("cnt", forecast_steps(days).to_string())])?;
        parse_forecast(response)
    }

    /// Fetch one report per day for `days` days
    pub fn fetch_daily(&self, days: u8) -> Result<Vec<WeatherReport>, WeatherError> {
        let response: OwmDailyResponse =
            self.get_json("forecast/daily", &[("cnt", days.to_string())])?;
        parse_daily(response)
    }
}

/// Number of 3-hourly forecast entries requested for `days` days.
pub fn forecast_steps(days: u8) -> u16 {
    (u16::from(days) * FORECAST_STEPS_PER_DAY).min(FORECAST_MAX_STEPS)
}

// ============================================================================
// Response Parsing
// ============================================================================

fn timestamp(secs: i64) -> Result<DateTime<Utc>, WeatherError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| WeatherError::ParseError(format!("timestamp out of range: {}", secs)))
}

/// Local wall-clock time of a UTC epoch, shifted by the place's offset.
fn local_clock(secs: i64, tz_shift: i64) -> Result<String, WeatherError> {
    Ok(timestamp(secs + tz_shift)?.format("%H:%M:%S").to_string())
}

fn place(report: &mut WeatherReport, name: &str, coord: &OwmCoord) {
    report.location = Some(name.to_string());
    report.coordinates = Some(Coordinates {
        lat: coord.lat,
        lon: coord.lon,
    });
}

fn set_conditions(report: &mut WeatherReport, conditions: &[OwmCondition]) {
    // Only the primary condition is kept.
    if let Some(primary) = conditions.first() {
        report.set("weather", primary.main.as_str());
        report.set("weather description", primary.description.as_str());
    }
}

fn set_main(report: &mut WeatherReport, main: &OwmMain) {
    report.set_opt("temperature", main.temp);
    report.set_opt("temperature min", main.temp_min);
    report.set_opt("temperature max", main.temp_max);
    report.set_opt("felt temp", main.feels_like);
    report.set_opt("humidity", main.humidity);
    report.set_opt("pressure", main.pressure);
}

fn set_wind(report: &mut WeatherReport, speed: Option<f64>, deg: Option<i64>) {
    report.set_opt("wind speed", speed);
    report.set_opt("wind deg", deg);
    if let Some(deg) = deg {
        report.set("wind direction", CompassDirection::from_degrees(deg as f64).to_string());
    }
}

/// Build the current-conditions report.
///
/// `now` becomes the report timestamp; the API's own observation time can
/// lag by up to an hour.
pub fn parse_current(res: OwmCurrentResponse, now: DateTime<Utc>) -> Result<WeatherReport, WeatherError> {
    let mut report = WeatherReport::new(ReportKind::Current, now);
    place(&mut report, &res.name, &res.coord);

    set_conditions(&mut report, &res.weather);
    set_main(&mut report, &res.main);
    report.set_opt("visibility", res.visibility);
    report.set_opt("cloud coverage", res.clouds.map(|c| c.all));
    if let Some(wind) = &res.wind {
        set_wind(&mut report, wind.speed, wind.deg);
    }

    if let Some(sunrise) = res.sys.sunrise {
        report.set("sunrise", local_clock(sunrise, res.timezone)?);
    }
    if let Some(sunset) = res.sys.sunset {
        report.set("sunset", local_clock(sunset, res.timezone)?);
    }

    if let Some(rain) = &res.rain {
        report.set_opt("rain next hour", rain.one_hour);
        report.set_opt("rain next 3 hours", rain.three_hours);
    }
    if let Some(snow) = &res.snow {
        report.set_opt("snow next hour", snow.one_hour);
        report.set_opt("snow next 3 hours", snow.three_hours);
    }

    Ok(report)
}

/// Build one forecast report per 3-hour step, timestamped with the step.
pub fn parse_forecast(res: OwmForecastResponse) -> Result<Vec<WeatherReport>, WeatherError> {
    res.list
        .iter()
        .map(|entry| {
            let mut report = WeatherReport::new(ReportKind::Forecast, timestamp(entry.dt)?);
            place(&mut report, &res.city.name, &res.city.coord);
            set_conditions(&mut report, &entry.weather);
            set_main(&mut report, &entry.main);
            report.set_opt("visibility", entry.visibility);
            report.set_opt("cloud coverage", entry.clouds.as_ref().map(|c| c.all));
            if let Some(wind) = &entry.wind {
                set_wind(&mut report, wind.speed, wind.deg);
            }
            report.set_opt("precipitation probability", entry.pop);
            report.set_opt("rain next 3 hours", entry.rain.as_ref().and_then(|r| r.three_hours));
            report.set_opt("snow next 3 hours", entry.snow.as_ref().and_then(|s| s.three_hours));
            Ok(report)
        })
        .collect()
}

/// Build one daily report per forecast day.
pub fn parse_daily(res: OwmDailyResponse) -> Result<Vec<WeatherReport>, WeatherError> {
    let tz_shift = res.city.timezone;
    res.list
        .iter()
        .map(|entry| {
            let mut report = WeatherReport::new(ReportKind::Daily, timestamp(entry.dt)?);
            place(&mut report, &res.city.name, &res.city.coord);
            set_conditions(&mut report, &entry.weather);
            report.set_opt("temperature", entry.temp.day);
            report.set_opt("temperature min", entry.temp.min);
            report.set_opt("temperature max", entry.temp.max);
            report.set_opt("temperature night", entry.temp.night);
            report.set_opt("felt temp", entry.feels_like.as_ref().and_then(|f| f.day));
            report.set_opt("humidity", entry.humidity);
            report.set_opt("pressure", entry.pressure);
            report.set_opt("cloud coverage", entry.clouds);
            set_wind(&mut report, entry.speed, entry.deg);
            report.set_opt("precipitation probability", entry.pop);
            report.set_opt("rain", entry.rain);
            report.set_opt("snow", entry.snow);
            if let Some(sunrise) = entry.sunrise {
                report.set("sunrise", local_clock(sunrise, tz_shift)?);
            }
            if let Some(sunset) = entry.sunset {
                report.set("sunset", local_clock(sunset, tz_shift)?);
            }
            Ok(report)
        })
        .collect()
}

// ============================================================================
// Weekly Summary
// ============================================================================

fn numeric(report: &WeatherReport, name: &str) -> Option<f64> {
    match report.fields.get(name)? {
        FieldValue::Float(v) => Some(*v),
        FieldValue::Int(v) => Some(*v as f64),
        FieldValue::Text(_) => None,
    }
}

fn values<'a>(days: &'a [WeatherReport], name: &'a str) -> impl Iterator<Item = f64> + 'a {
    days.iter().filter_map(move |d| numeric(d, name))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Fold the first seven daily reports into one weekly report.
///
/// Returns `None` when fewer than seven days are available. Precipitation
/// is summed, temperatures give the week's extremes and mean, and the
/// precipitation probability is the highest of the week.
pub fn weekly_summary(daily: &[WeatherReport]) -> Option<WeatherReport> {
    if daily.len() < WEEK_DAYS {
        return None;
    }
    let week = &daily[..WEEK_DAYS];
    let first = &week[0];

    let mut report = WeatherReport::new(ReportKind::Weekly, first.timestamp);
    report.location = first.location.clone();
    report.coordinates = first.coordinates;

    report.set_opt("temperature", mean(values(week, "temperature")).map(round2));
    report.set_opt("temperature min", values(week, "temperature min").reduce(f64::min));
    report.set_opt("temperature max", values(week, "temperature max").reduce(f64::max));
    report.set_opt("humidity", mean(values(week, "humidity")).map(|h| h.round() as i64));
    report.set("rain", round2(values(week, "rain").sum()));
    report.set("snow", round2(values(week, "snow").sum()));
    report.set_opt(
        "precipitation probability",
        values(week, "precipitation probability").reduce(f64::max),
    );
    report.set("days", WEEK_DAYS as i64);
    Some(report)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CURRENT_JSON: &str = r#"{
        "coord": {"lon": 13.41, "lat": 52.52},
        "weather": [{"id": 500, "main": "Rain", "description": "Leichter Regen", "icon": "10d"}],
        "base": "stations",
        "main": {"temp": 18.5, "feels_like": 18.1, "temp_min": 17.2, "temp_max": 19.9,
                 "pressure": 1012, "humidity": 71},
        "visibility": 10000,
        "wind": {"speed": 4.1, "deg": 230},
        "rain": {"1h": 0.42},
        "clouds": {"all": 75},
        "dt": 1717243200,
        "sys": {"type": 2, "country": "DE", "sunrise": 1717208400, "sunset": 1717267500},
        "timezone": 7200,
        "id": 2950159,
        "name": "Berlin",
        "cod": 200
    }"#;

    const FORECAST_JSON: &str = r#"{
        "cod": "200", "message": 0, "cnt": 2,
        "list": [
            {"dt": 1717250400,
             "main": {"temp": 20.1, "feels_like": 19.8, "temp_min": 19.5, "temp_max": 20.1,
                      "pressure": 1011, "humidity": 60},
             "weather": [{"id": 803, "main": "Clouds", "description": "Überwiegend bewölkt"}],
             "clouds": {"all": 80}, "wind": {"speed": 3.2, "deg": 10},
             "visibility": 10000, "pop": 0.2, "dt_txt": "2024-06-01 14:00:00"},
            {"dt": 1717261200,
             "main": {"temp": 16.4, "temp_min": 16.4, "temp_max": 16.4, "humidity": 82},
             "weather": [{"id": 500, "main": "Rain", "description": "Leichter Regen"}],
             "pop": 0.65, "rain": {"3h": 1.3}}
        ],
        "city": {"id": 2950159, "name": "Berlin", "coord": {"lat": 52.52, "lon": 13.41},
                 "country": "DE", "timezone": 7200}
    }"#;

    fn daily_json(days: usize) -> String {
        let entries: Vec<String> = (0..days)
            .map(|i| {
                format!(
                    r#"{{"dt": {dt}, "sunrise": 1717208400, "sunset": 1717267500,
                        "temp": {{"day": {day}, "min": {min}, "max": {max}, "night": 12.0}},
                        "feels_like": {{"day": {day}}},
                        "pressure": 1010, "humidity": {hum},
                        "weather": [{{"main": "Clear", "description": "Klarer Himmel"}}],
                        "speed": 2.5, "deg": 90, "clouds": 10, "pop": {pop},
                        "rain": {rain}}}"#,
                    dt = 1717236000 + 86400 * i as i64,
                    day = 20.0 + i as f64,
                    min = 10.0 + i as f64,
                    max = 25.0 + i as f64,
                    hum = 50 + i,
                    pop = 0.1 * i as f64,
                    rain = 0.5,
                )
            })
            .collect();
        format!(
            r#"{{"city": {{"name": "Berlin", "coord": {{"lat": 52.52, "lon": 13.41}}, "timezone": 7200}},
                "cod": "200", "cnt": {}, "list": [{}]}}"#,
            days,
            entries.join(",")
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 5, 0).unwrap()
    }

    #[test]
    fn test_parse_current_fills_named_fields() {
        let res: OwmCurrentResponse = serde_json::from_str(CURRENT_JSON).unwrap();
        let report = parse_current(res, now()).unwrap();

        assert_eq!(report.kind, ReportKind::Current);
        assert_eq!(report.timestamp, now());
        assert_eq!(report.location.as_deref(), Some("Berlin"));
        assert_eq!(report.coordinates, Some(Coordinates { lat: 52.52, lon: 13.41 }));
        assert!(report.is_valid());

        let f = &report.fields;
        assert_eq!(f.get("weather"), Some(&FieldValue::Text("Rain".into())));
        assert_eq!(f.get("weather description"), Some(&FieldValue::Text("Leichter Regen".into())));
        assert_eq!(f.get("temperature"), Some(&FieldValue::Float(18.5)));
        assert_eq!(f.get("felt temp"), Some(&FieldValue::Float(18.1)));
        assert_eq!(f.get("humidity"), Some(&FieldValue::Int(71)));
        assert_eq!(f.get("pressure"), Some(&FieldValue::Int(1012)));
        assert_eq!(f.get("visibility"), Some(&FieldValue::Int(10000)));
        assert_eq!(f.get("cloud coverage"), Some(&FieldValue::Int(75)));
        assert_eq!(f.get("wind deg"), Some(&FieldValue::Int(230)));
        assert_eq!(f.get("wind direction"), Some(&FieldValue::Text("SW".into())));
        assert_eq!(f.get("rain next hour"), Some(&FieldValue::Float(0.42)));
        assert!(!f.contains_key("rain next 3 hours"));
        assert!(!f.contains_key("snow next hour"));
    }

    #[test]
    fn test_sunrise_and_sunset_use_local_offset() {
        let res: OwmCurrentResponse = serde_json::from_str(CURRENT_JSON).unwrap();
        let report = parse_current(res, now()).unwrap();
        // 1717208400 is 02:20:00 UTC, +2h
        assert_eq!(report.fields.get("sunrise"), Some(&FieldValue::Text("04:20:00".into())));
        assert_eq!(report.fields.get("sunset"), Some(&FieldValue::Text("20:45:00".into())));
    }

    #[test]
    fn test_current_without_temperature_is_still_valid() {
        let json = CURRENT_JSON.replace("\"temp\": 18.5, ", "");
        let res: OwmCurrentResponse = serde_json::from_str(&json).unwrap();
        let report = parse_current(res, now()).unwrap();
        assert!(report.is_valid());
        assert!(!report.has_temperature());
    }

    #[test]
    fn test_current_missing_name_is_parse_error() {
        let json = CURRENT_JSON.replace("\"name\": \"Berlin\",", "");
        let result: Result<OwmCurrentResponse, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_forecast_one_report_per_step() {
        let res: OwmForecastResponse = serde_json::from_str(FORECAST_JSON).unwrap();
        let reports = parse_forecast(res).unwrap();
        assert_eq!(reports.len(), 2);

        let first = &reports[0];
        assert_eq!(first.kind, ReportKind::Forecast);
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap());
        assert_eq!(first.location.as_deref(), Some("Berlin"));
        assert_eq!(first.fields.get("wind direction"), Some(&FieldValue::Text("N".into())));
        assert_eq!(first.fields.get("precipitation probability"), Some(&FieldValue::Float(0.2)));

        let second = &reports[1];
        assert_eq!(second.fields.get("rain next 3 hours"), Some(&FieldValue::Float(1.3)));
        assert!(!second.fields.contains_key("wind speed"));
    }

    #[test]
    fn test_forecast_steps_capped_at_five_days() {
        assert_eq!(forecast_steps(1), 8);
        assert_eq!(forecast_steps(5), 40);
        assert_eq!(forecast_steps(16), 40);
    }

    #[test]
    fn test_parse_daily_reports() {
        let res: OwmDailyResponse = serde_json::from_str(&daily_json(3)).unwrap();
        let reports = parse_daily(res).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.kind == ReportKind::Daily && r.is_valid()));
        assert_eq!(reports[1].fields.get("temperature"), Some(&FieldValue::Float(21.0)));
        assert_eq!(reports[1].fields.get("temperature night"), Some(&FieldValue::Float(12.0)));
        assert_eq!(reports[0].fields.get("wind direction"), Some(&FieldValue::Text("E".into())));
        assert_eq!(reports[0].fields.get("sunrise"), Some(&FieldValue::Text("04:20:00".into())));
    }

    #[test]
    fn test_weekly_summary_needs_seven_days() {
        let res: OwmDailyResponse = serde_json::from_str(&daily_json(6)).unwrap();
        let daily = parse_daily(res).unwrap();
        assert_eq!(weekly_summary(&daily), None);
    }

    #[test]
    fn test_weekly_summary_aggregates_first_seven_days() {
        let res: OwmDailyResponse = serde_json::from_str(&daily_json(10)).unwrap();
        let daily = parse_daily(res).unwrap();
        let weekly = weekly_summary(&daily).unwrap();

        assert_eq!(weekly.kind, ReportKind::Weekly);
        assert_eq!(weekly.timestamp, daily[0].timestamp);
        assert_eq!(weekly.location.as_deref(), Some("Berlin"));

        let f = &weekly.fields;
        // days 0..7: day temps 20..26, mins 10..16, maxes 25..31
        assert_eq!(f.get("temperature"), Some(&FieldValue::Float(23.0)));
        assert_eq!(f.get("temperature min"), Some(&FieldValue::Float(10.0)));
        assert_eq!(f.get("temperature max"), Some(&FieldValue::Float(31.0)));
        assert_eq!(f.get("humidity"), Some(&FieldValue::Int(53)));
        assert_eq!(f.get("rain"), Some(&FieldValue::Float(3.5)));
        assert_eq!(f.get("snow"), Some(&FieldValue::Float(0.0)));
        assert_eq!(f.get("days"), Some(&FieldValue::Int(7)));
        match f.get("precipitation probability") {
            Some(FieldValue::Float(p)) => assert!((p - 0.6).abs() < 1e-9),
            other => panic!("unexpected pop: {:?}", other),
        }
    }

    #[test]
    fn test_build_url_carries_location_and_key() {
        let config = WeatherConfig::default();
        let client = WeatherClient::new(
            &config,
            WeatherCredentials {
                api_key: "abc123".to_string(),
                lat: 52.52,
                lon: 13.41,
            },
        )
        .unwrap();
        let url = client.build_url("forecast/daily", &[("cnt", "7".to_string())]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.openweathermap.org/data/2.5/forecast/daily?lat=52.52&lon=13.41&appid=abc123&units=metric&lang=de&cnt=7"
        );
    }

    #[test]
    #[ignore] // Requires network and a real API key
    fn test_live_current_weather() {
        let mut config = crate::config::Config::default();
        config
            .apply_env(|key| std::env::var(key).ok())
            .expect("valid environment");
        let credentials = config.weather.credentials().expect("API_KEY, LAT and LON set");
        let client = WeatherClient::new(&config.weather, credentials).unwrap();
        let report = client.fetch_current().expect("current weather");
        assert!(report.is_valid());
    }
}
