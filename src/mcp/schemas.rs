//! JSON schema builders for MCP tools.

use serde_json::{Map, Value, json};

/// Build the schema describing the `add_memories` tool input.
pub(crate) fn add_memories_input_schema() -> Map<String, Value> {
    let mut item_schema = Map::new();
    item_schema.insert("type".into(), Value::String("string".into()));

    let mut memories_schema = Map::new();
    memories_schema.insert("type".into(), Value::String("array".into()));
    memories_schema.insert(
        "description".into(),
        Value::String("Facts to remember, one statement per entry, submitted as one batch".into()),
    );
    memories_schema.insert("items".into(), Value::Object(item_schema));
    memories_schema.insert("minItems".into(), Value::Number(1.into()));

    let mut properties = Map::new();
    properties.insert("memories".into(), Value::Object(memories_schema));

    let mut schema = finalize_object_schema(properties, &["memories"]);
    schema.insert(
        "examples".into(),
        json!([{ "memories": ["I like pasta", "I am an engineer"] }]),
    );
    schema
}

/// Build the schema describing the `get_memories` tool input.
pub(crate) fn get_memories_input_schema(default_page_size: u32) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "page".into(),
        positive_integer_schema("1-based page number", 1),
    );
    properties.insert(
        "size".into(),
        positive_integer_schema("Memories per page", default_page_size),
    );
    finalize_object_schema(properties, &[])
}

/// Build the schema describing the `get_configuration` tool input.
pub(crate) fn get_configuration_input_schema() -> Map<String, Value> {
    let mut section_schema = Map::new();
    section_schema.insert("type".into(), Value::String("string".into()));
    section_schema.insert(
        "description".into(),
        Value::String(
            "Optional slash-separated section such as 'mem0/llm'; omit for the full mapping"
                .into(),
        ),
    );
    section_schema.insert(
        "pattern".into(),
        Value::String("^/?[A-Za-z0-9_-]+(/[A-Za-z0-9_-]+)*/?$".into()),
    );

    let mut properties = Map::new();
    properties.insert("section".into(), Value::Object(section_schema));
    finalize_object_schema(properties, &[])
}

/// Build the schema describing the `update_configuration` tool input.
pub(crate) fn update_configuration_input_schema() -> Map<String, Value> {
    let mut provider_schema = Map::new();
    provider_schema.insert("type".into(), Value::String("object".into()));

    let mut config_schema = Map::new();
    config_schema.insert("type".into(), Value::String("object".into()));
    config_schema.insert(
        "description".into(),
        Value::String(
            "Configuration mapping: each key names a section whose value holds provider settings"
                .into(),
        ),
    );
    config_schema.insert("minProperties".into(), Value::Number(1.into()));
    config_schema.insert(
        "additionalProperties".into(),
        Value::Object(provider_schema),
    );

    let mut properties = Map::new();
    properties.insert("config".into(), Value::Object(config_schema));

    let mut schema = finalize_object_schema(properties, &["config"]);
    schema.insert(
        "examples".into(),
        json!([{
            "config": {
                "mem0": {
                    "llm": { "provider": "mistral", "config": { "model": "mistral-small-latest" } },
                    "embedder": { "provider": "mistral", "config": { "model": "mistral-embed" } }
                }
            }
        }]),
    );
    schema
}

fn positive_integer_schema(description: &str, default: u32) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("integer".into()));
    schema.insert("description".into(), Value::String(description.into()));
    schema.insert("minimum".into(), Value::Number(1.into()));
    schema.insert("default".into(), Value::Number(default.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}
