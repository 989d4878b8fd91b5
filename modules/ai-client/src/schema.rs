use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types the model is forced to emit through the structured-response tool.
///
/// The scoring pipeline depends on two guarantees the stock derived schema
/// does not give:
/// 1. every property is required, optional ones included — the repair loop
///    measures reasoning lengths, so the model must always emit each field
///    (null when it does not apply) instead of omitting it;
/// 2. the schema is fully self-contained — the tool-definition endpoint
///    rejects `$ref` pointers into a definitions table.
/// `output_schema` post-processes the derived schema into that strict form.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn output_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = match &value {
            Value::Object(map) => map.get("definitions").cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        strictify(&mut value, &definitions);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }
        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// One recursive pass over the schema tree: inline `#/definitions/*`
/// references, unwrap the single-element `allOf` wrappers schemars emits for
/// nullable nested types, close every object (`additionalProperties: false`),
/// and promote all of an object's properties into `required`. Inlined
/// definition bodies re-enter the pass, so nested extraction structs come out
/// as strict as the root.
fn strictify(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(definition) = definitions.get(name) {
                        *value = definition.clone();
                        strictify(value, definitions);
                        return;
                    }
                }
            }

            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    strictify(value, definitions);
                    return;
                }
            }

            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all_keys));
                }
            }

            for (_, v) in map.iter_mut() {
                strictify(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strictify(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    /// The scorer's response shape, reduced to the parts the schema contract
    /// has to guarantee: numeric dimensions with reasoning strings, optional
    /// backend-specialty fields, a nested extraction struct, and a list.
    #[derive(Deserialize, JsonSchema)]
    struct Review {
        activity_score: f64,
        activity_reasoning: String,
        backend_fit_score: Option<f64>,
        backend_fit_reasoning: Option<String>,
        extraction: Extraction,
        metrics: Vec<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Extraction {
        task_domain: String,
        dataset_size: Option<i64>,
    }

    fn required_names(schema: &Value) -> Vec<String> {
        schema["required"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn optional_backend_fields_are_still_required() {
        // The repair loop needs nullable fields emitted, never omitted.
        let schema = Review::output_schema();
        let required = required_names(&schema);
        for field in [
            "activity_score",
            "activity_reasoning",
            "backend_fit_score",
            "backend_fit_reasoning",
            "extraction",
            "metrics",
        ] {
            assert!(required.iter().any(|r| r == field), "missing {field}");
        }
    }

    #[test]
    fn schema_is_self_contained() {
        let schema = Review::output_schema();
        let text = serde_json::to_string(&schema).unwrap();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("definitions"));
        assert!(!text.contains("$schema"));
    }

    #[test]
    fn nested_extraction_object_is_closed_and_strict() {
        let schema = Review::output_schema();
        let extraction = &schema["properties"]["extraction"];
        assert_eq!(extraction["type"], "object");
        assert_eq!(extraction["additionalProperties"], false);
        let required = required_names(extraction);
        assert!(required.iter().any(|r| r == "task_domain"));
        assert!(required.iter().any(|r| r == "dataset_size"));
    }

    #[test]
    fn root_object_is_closed() {
        let schema = Review::output_schema();
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn list_fields_keep_their_item_type() {
        let schema = Review::output_schema();
        let metrics = &schema["properties"]["metrics"];
        assert_eq!(metrics["type"], "array");
        assert_eq!(metrics["items"]["type"], "string");
    }

    #[test]
    fn type_name_reports_struct_name() {
        assert_eq!(Review::type_name(), "Review");
    }
}
