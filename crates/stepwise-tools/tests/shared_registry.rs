//! Integration tests for sharing a populated registry across tasks.

use std::sync::Arc;

use serde_json::{Value, json};
use stepwise_tools::{RegistryError, ToolError, ToolRegistry, tool_fn};

fn weather_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            "getWeather",
            "Get the current weather for a city.",
            json!({
                "type": "object",
                "properties": { "city": { "type": "string", "minLength": 1 } },
                "required": ["city"]
            }),
            tool_fn(|input: Value| async move {
                let city = input["city"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidInput("city must be a string".into()))?;
                Ok(json!({ "city": city, "forecast": "30°C, sunny" }))
            }),
        )
        .unwrap();
    registry
        .register(
            "failing",
            "Always fails.",
            json!({ "type": "object" }),
            tool_fn(|_| async move { Err(ToolError::failed("upstream unavailable")) }),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn concurrent_lookups_and_executions_share_one_registry() {
    let registry = Arc::new(weather_registry());

    let mut handles = Vec::new();
    for i in 0..16 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let tool = registry.lookup("getWeather").unwrap();
            let city = format!("city-{i}");
            let input = json!({ "city": city });
            tool.validate(&input).unwrap();
            tool.execute(input).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let out = handle.await.unwrap();
        assert_eq!(out["city"], json!(format!("city-{i}")));
        assert_eq!(out["forecast"], json!("30°C, sunny"));
    }
}

#[tokio::test]
async fn execution_failures_surface_as_tool_errors() {
    let registry = weather_registry();
    let tool = registry.lookup("failing").unwrap();
    let err = tool.execute(json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    assert_eq!(err.to_string(), "execution failed: upstream unavailable");
}

#[test]
fn schema_constraints_beyond_type_are_enforced() {
    let registry = weather_registry();
    let err = registry
        .validate_input("getWeather", &json!({ "city": "" }))
        .unwrap_err();
    assert!(matches!(err, RegistryError::SchemaValidation { .. }));

    let err = registry.validate_input("getWeather", &json!({})).unwrap_err();
    assert!(err.to_string().contains("getWeather"));
}

#[test]
fn descriptions_serialize_for_the_model() {
    let registry = weather_registry();
    let described: Vec<Value> = registry
        .describe_all()
        .map(|d| serde_json::to_value(d).unwrap())
        .collect();
    assert_eq!(described.len(), 2);
    assert_eq!(described[0]["name"], "getWeather");
    assert_eq!(described[0]["input_schema"]["required"], json!(["city"]));
    assert_eq!(described[1]["name"], "failing");
}
