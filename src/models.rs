//! Data models for the air-quality pipeline.
//!
//! `HourlyRecord` is the canonical unit after transformation. All derived
//! features (AQI category, severity score, risk flag, hour-of-day) are pure
//! functions of a record's pollutant readings and timestamp.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Hourly metrics requested from the upstream API, in staged column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pollutant {
    Pm10,
    Pm2_5,
    CarbonMonoxide,
    NitrogenDioxide,
    SulphurDioxide,
    Ozone,
    UvIndex,
}

impl Pollutant {
    // ---
    pub const ALL: [Pollutant; 7] = [
        Pollutant::Pm10,
        Pollutant::Pm2_5,
        Pollutant::CarbonMonoxide,
        Pollutant::NitrogenDioxide,
        Pollutant::SulphurDioxide,
        Pollutant::Ozone,
        Pollutant::UvIndex,
    ];

    /// Key used by the upstream API, the staged file and the remote table.
    pub fn key(self) -> &'static str {
        // ---
        match self {
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::CarbonMonoxide => "carbon_monoxide",
            Pollutant::NitrogenDioxide => "nitrogen_dioxide",
            Pollutant::SulphurDioxide => "sulphur_dioxide",
            Pollutant::Ozone => "ozone",
            Pollutant::UvIndex => "uv_index",
        }
    }

    /// Weight in the severity sum. UV index is carried but not scored.
    pub fn severity_weight(self) -> f64 {
        // ---
        match self {
            Pollutant::Pm2_5 => 5.0,
            Pollutant::Pm10 => 3.0,
            Pollutant::NitrogenDioxide => 4.0,
            Pollutant::SulphurDioxide => 4.0,
            Pollutant::CarbonMonoxide => 2.0,
            Pollutant::Ozone => 3.0,
            Pollutant::UvIndex => 0.0,
        }
    }
}

/// Which of the two hourly feeds a run works on.
///
/// Each dataset has its own upstream endpoint, metric set, raw directory,
/// staged file, remote table and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    AirQuality,
    Weather,
}

impl Dataset {
    // ---
    pub const ALL: [Dataset; 2] = [Dataset::AirQuality, Dataset::Weather];

    pub fn name(self) -> &'static str {
        // ---
        match self {
            Dataset::AirQuality => "air_quality",
            Dataset::Weather => "weather",
        }
    }

    /// Comma-separated `hourly` query parameter for the upstream API.
    pub fn hourly_query_param(self) -> String {
        // ---
        let keys: Vec<&str> = match self {
            Dataset::AirQuality => Pollutant::ALL.iter().map(|p| p.key()).collect(),
            Dataset::Weather => WeatherMetric::ALL.iter().map(|m| m.api_keys()[0]).collect(),
        };
        keys.join(",")
    }
}

/// Nullable pollutant values for one hour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PollutantReadings {
    // ---
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,
}

impl PollutantReadings {
    // ---
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        // ---
        match pollutant {
            Pollutant::Pm10 => self.pm10,
            Pollutant::Pm2_5 => self.pm2_5,
            Pollutant::CarbonMonoxide => self.carbon_monoxide,
            Pollutant::NitrogenDioxide => self.nitrogen_dioxide,
            Pollutant::SulphurDioxide => self.sulphur_dioxide,
            Pollutant::Ozone => self.ozone,
            Pollutant::UvIndex => self.uv_index,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        // ---
        let slot = match pollutant {
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::Pm2_5 => &mut self.pm2_5,
            Pollutant::CarbonMonoxide => &mut self.carbon_monoxide,
            Pollutant::NitrogenDioxide => &mut self.nitrogen_dioxide,
            Pollutant::SulphurDioxide => &mut self.sulphur_dioxide,
            Pollutant::Ozone => &mut self.ozone,
            Pollutant::UvIndex => &mut self.uv_index,
        };
        *slot = value;
    }

    /// True when every declared pollutant is null.
    pub fn is_empty(&self) -> bool {
        // ---
        Pollutant::ALL.iter().all(|p| self.get(*p).is_none())
    }

    /// Weighted pollutant sum; null terms count as zero.
    pub fn severity_score(&self) -> f64 {
        // ---
        Pollutant::ALL
            .iter()
            .map(|p| self.get(*p).unwrap_or(0.0) * p.severity_weight())
            .sum()
    }
}

/// AQI label derived from PM2.5 alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl AqiCategory {
    // ---
    pub fn from_pm2_5(pm2_5: Option<f64>) -> Option<Self> {
        // ---
        let v = pm2_5.filter(|v| !v.is_nan())?;
        let category = if v <= 50.0 {
            AqiCategory::Good
        } else if v <= 100.0 {
            AqiCategory::Moderate
        } else if v <= 200.0 {
            AqiCategory::Unhealthy
        } else if v <= 300.0 {
            AqiCategory::VeryUnhealthy
        } else {
            AqiCategory::Hazardous
        };
        Some(category)
    }

    pub fn label(self) -> &'static str {
        // ---
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

/// Three-level classification of the severity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskFlag {
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Moderate Risk")]
    Moderate,
    #[serde(rename = "Low Risk")]
    Low,
}

impl RiskFlag {
    // ---
    pub const ALL: [RiskFlag; 3] = [RiskFlag::High, RiskFlag::Moderate, RiskFlag::Low];

    pub fn from_severity(severity: f64) -> Self {
        // ---
        if severity > 400.0 {
            RiskFlag::High
        } else if severity > 200.0 {
            RiskFlag::Moderate
        } else {
            // NaN lands here too
            RiskFlag::Low
        }
    }

    pub fn label(self) -> &'static str {
        // ---
        match self {
            RiskFlag::High => "High Risk",
            RiskFlag::Moderate => "Moderate Risk",
            RiskFlag::Low => "Low Risk",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        // ---
        RiskFlag::ALL.into_iter().find(|f| f.label() == label.trim())
    }
}

/// Parse a timestamp as a UTC instant.
///
/// Accepts RFC 3339, the offset-less `YYYY-MM-DDTHH:MM[:SS]` the upstream API
/// emits (taken as UTC), and the `YYYY-MM-DD HH:MM:SS+00:00` form dataframe
/// exports write.
pub fn parse_utc_time(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    let raw = raw.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(t.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc())
}

/// Geographic point the extractor fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    // ---
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl City {
    // ---
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        // ---
        City {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

/// One city-hour after transformation, enriched with derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRecord {
    // ---
    pub city: String,
    pub time: DateTime<Utc>,
    pub hour: u32,
    pub readings: PollutantReadings,
    pub aqi_category: Option<AqiCategory>,
    pub severity_score: f64,
    pub risk_flag: RiskFlag,
}

impl HourlyRecord {
    // ---
    pub fn derive(city: impl Into<String>, time: DateTime<Utc>, readings: PollutantReadings) -> Self {
        // ---
        let severity_score = readings.severity_score();

        HourlyRecord {
            city: city.into(),
            time,
            hour: time.hour(),
            readings,
            aqi_category: AqiCategory::from_pm2_5(readings.pm2_5),
            severity_score,
            risk_flag: RiskFlag::from_severity(severity_score),
        }
    }
}

/// Hourly weather metrics requested from the forecast API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherMetric {
    Temperature,
    RelativeHumidity,
    WindSpeed,
}

impl WeatherMetric {
    // ---
    pub const ALL: [WeatherMetric; 3] = [
        WeatherMetric::Temperature,
        WeatherMetric::RelativeHumidity,
        WeatherMetric::WindSpeed,
    ];

    /// Payload keys, requested spelling first. The API has renamed some of
    /// these over time and echoes whichever spelling was asked for.
    pub fn api_keys(self) -> &'static [&'static str] {
        // ---
        match self {
            WeatherMetric::Temperature => &["temperature_2m"],
            WeatherMetric::RelativeHumidity => &["relativehumidity_2m", "relative_humidity_2m"],
            WeatherMetric::WindSpeed => &["windspeed_10m", "wind_speed_10m"],
        }
    }

    /// Column name in the staged file and the remote table.
    pub fn column(self) -> &'static str {
        // ---
        match self {
            WeatherMetric::Temperature => "temperature_c",
            WeatherMetric::RelativeHumidity => "relative_humidity",
            WeatherMetric::WindSpeed => "wind_speed_kmh",
        }
    }
}

/// Nullable weather values for one hour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReadings {
    // ---
    pub temperature_c: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
}

impl WeatherReadings {
    // ---
    pub fn get(&self, metric: WeatherMetric) -> Option<f64> {
        match metric {
            WeatherMetric::Temperature => self.temperature_c,
            WeatherMetric::RelativeHumidity => self.relative_humidity,
            WeatherMetric::WindSpeed => self.wind_speed_kmh,
        }
    }

    pub fn set(&mut self, metric: WeatherMetric, value: Option<f64>) {
        // ---
        let slot = match metric {
            WeatherMetric::Temperature => &mut self.temperature_c,
            WeatherMetric::RelativeHumidity => &mut self.relative_humidity,
            WeatherMetric::WindSpeed => &mut self.wind_speed_kmh,
        };
        *slot = value;
    }

    /// True when all three sensors are null.
    pub fn is_empty(&self) -> bool {
        WeatherMetric::ALL.iter().all(|m| self.get(*m).is_none())
    }

    /// Temperature nudged down by humidity; a rough proxy, not a heat index.
    pub fn feels_like_c(&self) -> Option<f64> {
        // ---
        let temperature = self.temperature_c?;
        let humidity = self.relative_humidity?;
        Some(temperature - humidity / 100.0 * 2.0)
    }
}

/// Temperature band; bins are closed on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempCategory {
    VeryCold,
    Cold,
    Mild,
    Warm,
    Hot,
}

impl TempCategory {
    // ---
    /// `(-100, 0]` very cold, `(0, 10]` cold, `(10, 20]` mild, `(20, 30]`
    /// warm, `(30, 100]` hot. Anything outside `(-100, 100]` has no band.
    pub fn from_celsius(temperature: Option<f64>) -> Option<Self> {
        // ---
        let t = temperature.filter(|t| *t > -100.0 && *t <= 100.0)?;
        let category = if t <= 0.0 {
            TempCategory::VeryCold
        } else if t <= 10.0 {
            TempCategory::Cold
        } else if t <= 20.0 {
            TempCategory::Mild
        } else if t <= 30.0 {
            TempCategory::Warm
        } else {
            TempCategory::Hot
        };
        Some(category)
    }

    pub fn label(self) -> &'static str {
        // ---
        match self {
            TempCategory::VeryCold => "very_cold",
            TempCategory::Cold => "cold",
            TempCategory::Mild => "mild",
            TempCategory::Warm => "warm",
            TempCategory::Hot => "hot",
        }
    }
}

/// One city-hour of weather after transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    // ---
    pub city: String,
    pub time: DateTime<Utc>,
    pub date: NaiveDate,
    pub hour: u32,
    pub readings: WeatherReadings,
    pub temp_category: Option<TempCategory>,
    pub feels_like_c: Option<f64>,
}

impl WeatherRecord {
    pub fn derive(city: impl Into<String>, time: DateTime<Utc>, readings: WeatherReadings) -> Self {
        // ---
        WeatherRecord {
            city: city.into(),
            time,
            date: time.date_naive(),
            hour: time.hour(),
            readings,
            temp_category: TempCategory::from_celsius(readings.temperature_c),
            feels_like_c: readings.feels_like_c(),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn create_test_readings(pm2_5: f64, pm10: f64) -> PollutantReadings {
        // ---
        PollutantReadings {
            pm2_5: Some(pm2_5),
            pm10: Some(pm10),
            ..Default::default()
        }
    }

    #[test]
    fn test_aqi_category_boundaries() {
        // ---
        assert_eq!(AqiCategory::from_pm2_5(Some(0.0)), Some(AqiCategory::Good));
        assert_eq!(AqiCategory::from_pm2_5(Some(50.0)), Some(AqiCategory::Good));
        assert_eq!(AqiCategory::from_pm2_5(Some(50.1)), Some(AqiCategory::Moderate));
        assert_eq!(AqiCategory::from_pm2_5(Some(100.0)), Some(AqiCategory::Moderate));
        assert_eq!(AqiCategory::from_pm2_5(Some(100.1)), Some(AqiCategory::Unhealthy));
        assert_eq!(AqiCategory::from_pm2_5(Some(200.0)), Some(AqiCategory::Unhealthy));
        assert_eq!(
            AqiCategory::from_pm2_5(Some(200.5)),
            Some(AqiCategory::VeryUnhealthy)
        );
        assert_eq!(
            AqiCategory::from_pm2_5(Some(300.0)),
            Some(AqiCategory::VeryUnhealthy)
        );
        assert_eq!(AqiCategory::from_pm2_5(Some(300.1)), Some(AqiCategory::Hazardous));
        assert_eq!(AqiCategory::from_pm2_5(None), None);
        assert_eq!(AqiCategory::from_pm2_5(Some(f64::NAN)), None);
    }

    #[test]
    fn test_risk_flag_boundaries() {
        // ---
        assert_eq!(RiskFlag::from_severity(200.0), RiskFlag::Low);
        assert_eq!(RiskFlag::from_severity(200.1), RiskFlag::Moderate);
        assert_eq!(RiskFlag::from_severity(400.0), RiskFlag::Moderate);
        assert_eq!(RiskFlag::from_severity(400.1), RiskFlag::High);
        assert_eq!(RiskFlag::from_severity(f64::NAN), RiskFlag::Low);
    }

    #[test]
    fn test_risk_flag_labels() {
        // ---
        for flag in RiskFlag::ALL {
            assert_eq!(RiskFlag::from_label(flag.label()), Some(flag));
        }
        assert_eq!(RiskFlag::from_label("High"), None);
    }

    #[test]
    fn test_severity_weights() {
        // ---
        let readings = PollutantReadings {
            pm10: Some(1.0),
            pm2_5: Some(1.0),
            carbon_monoxide: Some(1.0),
            nitrogen_dioxide: Some(1.0),
            sulphur_dioxide: Some(1.0),
            ozone: Some(1.0),
            uv_index: Some(100.0),
        };
        // 5 + 3 + 4 + 4 + 2 + 3, UV index is not scored
        assert_eq!(readings.severity_score(), 21.0);

        let partial = create_test_readings(10.0, 20.0);
        assert_eq!(partial.severity_score(), 110.0);
    }

    #[test]
    fn test_severity_all_null_is_zero() {
        // ---
        let empty = PollutantReadings::default();
        assert!(empty.is_empty());
        assert_eq!(empty.severity_score(), 0.0);
    }

    #[test]
    fn test_uv_index_alone_is_not_empty() {
        // ---
        let readings = PollutantReadings {
            uv_index: Some(3.0),
            ..Default::default()
        };
        assert!(!readings.is_empty());
        assert_eq!(readings.severity_score(), 0.0);
    }

    #[test]
    fn test_record_derivation() {
        // ---
        let time = Utc.with_ymd_and_hms(2025, 12, 11, 13, 0, 0).unwrap();
        let record = HourlyRecord::derive("Delhi", time, create_test_readings(60.0, 80.0));

        assert_eq!(record.hour, 13);
        assert_eq!(record.aqi_category, Some(AqiCategory::Moderate));
        // 60*5 + 80*3
        assert_eq!(record.severity_score, 540.0);
        assert_eq!(record.risk_flag, RiskFlag::High);
        assert_eq!(record.city, "Delhi");
    }

    #[test]
    fn test_time_parsing() {
        // ---
        let expected = Utc.with_ymd_and_hms(2025, 12, 11, 13, 0, 0).unwrap();

        assert_eq!(parse_utc_time("2025-12-11T13:00"), Some(expected));
        assert_eq!(parse_utc_time("2025-12-11T13:00:00Z"), Some(expected));
        assert_eq!(parse_utc_time("2025-12-11T18:30:00+05:30"), Some(expected));
        assert_eq!(parse_utc_time("2025-12-11 13:00:00+00:00"), Some(expected));
        assert_eq!(parse_utc_time("2025-12-11 13:00:00"), Some(expected));
        assert_eq!(parse_utc_time("yesterday"), None);
    }

    #[test]
    fn test_hourly_query_param() {
        // ---
        assert_eq!(
            Dataset::AirQuality.hourly_query_param(),
            "pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,sulphur_dioxide,ozone,uv_index"
        );
        assert_eq!(
            Dataset::Weather.hourly_query_param(),
            "temperature_2m,relativehumidity_2m,windspeed_10m"
        );
    }

    #[test]
    fn test_temp_category_bins() {
        // ---
        let band = |t: f64| TempCategory::from_celsius(Some(t));

        assert_eq!(band(-100.0), None);
        assert_eq!(band(-99.9), Some(TempCategory::VeryCold));
        assert_eq!(band(0.0), Some(TempCategory::VeryCold));
        assert_eq!(band(0.1), Some(TempCategory::Cold));
        assert_eq!(band(10.0), Some(TempCategory::Cold));
        assert_eq!(band(20.0), Some(TempCategory::Mild));
        assert_eq!(band(30.0), Some(TempCategory::Warm));
        assert_eq!(band(30.5), Some(TempCategory::Hot));
        assert_eq!(band(100.0), Some(TempCategory::Hot));
        assert_eq!(band(100.5), None);
        assert_eq!(TempCategory::from_celsius(None), None);
        assert_eq!(TempCategory::from_celsius(Some(f64::NAN)), None);
    }

    #[test]
    fn test_weather_derivation() {
        // ---
        let time = Utc.with_ymd_and_hms(2025, 12, 11, 23, 0, 0).unwrap();
        let readings = WeatherReadings {
            temperature_c: Some(25.0),
            relative_humidity: Some(50.0),
            wind_speed_kmh: None,
        };

        let record = WeatherRecord::derive("Hyderabad", time, readings);

        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 12, 11).unwrap());
        assert_eq!(record.hour, 23);
        assert_eq!(record.temp_category, Some(TempCategory::Warm));
        // 25 - 50/100*2
        assert_eq!(record.feels_like_c, Some(24.0));
    }

    #[test]
    fn test_feels_like_needs_both_inputs() {
        // ---
        let wind_only = WeatherReadings {
            wind_speed_kmh: Some(12.0),
            ..Default::default()
        };
        assert!(!wind_only.is_empty());
        assert_eq!(wind_only.feels_like_c(), None);
        assert!(WeatherReadings::default().is_empty());
    }
}
