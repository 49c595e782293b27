//! 天气查询（-weather?）
//!
//! 先用 Google 地理编码把玩家输入的地名转成经纬度，再查 OpenWeatherMap 即时
//! 天气，拼成对齐过视觉宽度的聊天报告。

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    /// 未配置 API Key
    #[error("尚未設定天氣或地理編碼 API Key，無法查詢")]
    NotConfigured,

    /// 地理编码找不到该地名
    #[error("地圖系統找不到「{0}」這個地方")]
    PlaceNotFound(String),

    #[error("天氣系統暫時發生問題，請稍後再試")]
    Upstream(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    coord: Coord,
    weather: Vec<Condition>,
    main: MainMetrics,
    visibility: f64,
    wind: Wind,
    clouds: Clouds,
    sys: Sys,
}

#[derive(Debug, Deserialize)]
struct Coord {
    lon: f64,
    lat: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainMetrics {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct Clouds {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct Sys {
    country: Option<String>,
    sunrise: i64,
    sunset: i64,
}

/// 天气查询器
pub struct WeatherLookup {
    client: reqwest::Client,
    geocoding_api_key: Option<String>,
    openweather_api_key: Option<String>,
}

impl WeatherLookup {
    pub fn new(geocoding_api_key: Option<String>, openweather_api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            geocoding_api_key,
            openweather_api_key,
        }
    }

    /// 查询一座城市的即时天气，返回整段聊天报告
    pub async fn report(&self, city: &str) -> Result<String, WeatherError> {
        let (Some(geo_key), Some(weather_key)) =
            (&self.geocoding_api_key, &self.openweather_api_key)
        else {
            return Err(WeatherError::NotConfigured);
        };

        tracing::info!(city, "geocoding place name");
        let geo: GeocodeResponse = self
            .client
            .get("https://maps.googleapis.com/maps/api/geocode/json")
            .query(&[("address", city), ("language", "zh-TW"), ("key", geo_key)])
            .send()
            .await?
            .json()
            .await?;

        if geo.status != "OK" || geo.results.is_empty() {
            return Err(WeatherError::PlaceNotFound(city.to_string()));
        }
        let place = &geo.results[0];
        let LatLng { lat, lng } = place.geometry.location;

        let weather: WeatherResponse = self
            .client
            .get("https://api.openweathermap.org/data/2.5/weather")
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("appid", weather_key.clone()),
                ("units", "metric".to_string()),
                ("lang", "zh_tw".to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;

        Ok(format_report(&place.formatted_address, &weather))
    }
}

fn format_unix_time(unix: i64) -> String {
    match Utc.timestamp_opt(unix, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M").to_string(),
        _ => "--:--".to_string(),
    }
}

/// 全角字符占两格，用于标题分隔线对齐
fn visual_width(text: &str) -> usize {
    text.chars()
        .map(|c| if (c as u32) > 255 { 2 } else { 1 })
        .sum()
}

fn format_report(place: &str, w: &WeatherResponse) -> String {
    let base_dashes = 10;
    let title = format!(" {} 的即時天氣報告 ", place);
    let total = base_dashes + visual_width(&title) + base_dashes;
    let description = w
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or("未知");

    [
        format!("§b{dash}{title}{dash}", dash = "-".repeat(base_dashes)),
        format!(
            "§f§l位置：§7 約在經度{}/緯度{}的地方  ({})",
            w.coord.lon,
            w.coord.lat,
            w.sys.country.as_deref().unwrap_or("?")
        ),
        format!(
            "§f§l天氣狀況： §e{} §f/ 雲量：§7{}",
            description, w.clouds.all
        ),
        format!(
            "§f§l目前氣溫： §6{}°C （體感：{}°C）",
            w.main.temp, w.main.feels_like
        ),
        format!(
            "§f§l  溫差：§a 最低{}°C / 最高{}°C",
            w.main.temp_min, w.main.temp_max
        ),
        format!(
            "§f§l  環境：§3 濕度 {}% / 氣壓 {}hPa",
            w.main.humidity, w.main.pressure
        ),
        format!("§f§l能見度：§d {:.1}km", w.visibility / 1000.0),
        format!("§f§l風： §b風速{}m/s，風向{}°", w.wind.speed, w.wind.deg),
        format!(
            "§f§l日出/日落： §6{} / {}",
            format_unix_time(w.sys.sunrise),
            format_unix_time(w.sys.sunset)
        ),
        format!("§b{}", "-".repeat(total)),
    ]
    .join("\n")
}
