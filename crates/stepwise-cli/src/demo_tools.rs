//! Demo tools registered by the CLI.
//!
//! `get_weather` returns a deterministic mock forecast so turns are
//! reproducible without a weather API; `get_local_time` reads the system
//! clock.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::{Value, json};
use stepwise_agent::ToolsConfig;
use stepwise_tools::{RegistryError, Result, ToolError, ToolExecutor, ToolRegistry};
use tracing::debug;

const CONDITIONS: [&str; 5] = ["sunny", "partly cloudy", "overcast", "light rain", "windy"];

/// Build the registry of demo tools, leaving out any listed in
/// `tools.disabled`.
pub fn build_registry(tools: &ToolsConfig) -> std::result::Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    if tools.is_enabled(WeatherTool::NAME) {
        registry.register(
            WeatherTool::NAME,
            "Get the current weather for a city.",
            WeatherTool::schema(),
            WeatherTool,
        )?;
    }
    if tools.is_enabled(LocalTimeTool::NAME) {
        registry.register(
            LocalTimeTool::NAME,
            "Get the current local time for a UTC offset.",
            LocalTimeTool::schema(),
            LocalTimeTool,
        )?;
    }

    for name in &tools.disabled {
        if name != WeatherTool::NAME && name != LocalTimeTool::NAME {
            tracing::warn!(tool = %name, "disabled tool is not a known demo tool");
        }
    }

    Ok(registry)
}

// ---------------------------------------------------------------------------
// get_weather
// ---------------------------------------------------------------------------

/// Mock weather lookup.
pub struct WeatherTool;

impl WeatherTool {
    pub const NAME: &'static str = "get_weather";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "minLength": 1,
                    "description": "City name, e.g. 'Cairo'"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "Temperature unit (default celsius)"
                }
            },
            "required": ["city"]
        })
    }

    /// Same city, same forecast.
    fn forecast(city: &str) -> (i64, &'static str) {
        let seed = city
            .to_lowercase()
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let celsius = 5 + (seed % 31) as i64;
        let conditions = CONDITIONS[(seed / 31 % CONDITIONS.len() as u64) as usize];
        (celsius, conditions)
    }
}

#[async_trait]
impl ToolExecutor for WeatherTool {
    async fn execute(&self, input: Value) -> Result<Value> {
        let city = input["city"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidInput("missing required string field `city`".into()))?;
        let unit = input["unit"].as_str().unwrap_or("celsius");

        let (celsius, conditions) = Self::forecast(city);
        let temperature = match unit {
            "fahrenheit" => celsius * 9 / 5 + 32,
            _ => celsius,
        };

        debug!(city, unit, temperature, "weather lookup");

        Ok(json!({
            "city": city,
            "temperature": temperature,
            "unit": unit,
            "conditions": conditions,
        }))
    }
}

// ---------------------------------------------------------------------------
// get_local_time
// ---------------------------------------------------------------------------

/// Current time at a fixed UTC offset.
pub struct LocalTimeTool;

impl LocalTimeTool {
    pub const NAME: &'static str = "get_local_time";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "number",
                    "minimum": -12,
                    "maximum": 14,
                    "description": "Offset from UTC in hours (default 0)"
                }
            }
        })
    }
}

#[async_trait]
impl ToolExecutor for LocalTimeTool {
    async fn execute(&self, input: Value) -> Result<Value> {
        let hours = input["utc_offset_hours"].as_f64().unwrap_or(0.0);
        let seconds = (hours * 3600.0).round() as i32;
        let offset = FixedOffset::east_opt(seconds)
            .ok_or_else(|| ToolError::InvalidInput(format!("invalid UTC offset: {hours}")))?;

        let now = Utc::now().with_timezone(&offset);
        Ok(json!({
            "local_time": now.to_rfc3339(),
            "utc_offset": offset.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_both_tools_in_order() {
        let registry = build_registry(&ToolsConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["get_weather", "get_local_time"]);
    }

    #[test]
    fn disabled_tools_are_skipped() {
        let tools = ToolsConfig {
            disabled: vec!["get_local_time".into(), "no_such_tool".into()],
        };
        let registry = build_registry(&tools).unwrap();
        assert_eq!(registry.names(), vec!["get_weather"]);
    }

    #[tokio::test]
    async fn weather_is_deterministic() {
        let a = WeatherTool.execute(json!({ "city": "Cairo" })).await.unwrap();
        let b = WeatherTool.execute(json!({ "city": "cairo" })).await.unwrap();
        assert_eq!(a["temperature"], b["temperature"]);
        assert_eq!(a["conditions"], b["conditions"]);
        assert_eq!(a["unit"], "celsius");
    }

    #[tokio::test]
    async fn weather_converts_to_fahrenheit() {
        let c = WeatherTool.execute(json!({ "city": "Oslo" })).await.unwrap();
        let f = WeatherTool
            .execute(json!({ "city": "Oslo", "unit": "fahrenheit" }))
            .await
            .unwrap();
        let c = c["temperature"].as_i64().unwrap();
        assert_eq!(f["temperature"].as_i64().unwrap(), c * 9 / 5 + 32);
    }

    #[test]
    fn weather_schema_rejects_missing_city() {
        let registry = build_registry(&ToolsConfig::default()).unwrap();
        assert!(registry.validate_input("get_weather", &json!({})).is_err());
        assert!(
            registry
                .validate_input("get_weather", &json!({ "city": "Cairo", "unit": "kelvin" }))
                .is_err()
        );
    }

    #[tokio::test]
    async fn local_time_honours_offset() {
        let out = LocalTimeTool
            .execute(json!({ "utc_offset_hours": 2 }))
            .await
            .unwrap();
        assert_eq!(out["utc_offset"], "+02:00");
        assert!(out["local_time"].as_str().unwrap().ends_with("+02:00"));
    }
}
