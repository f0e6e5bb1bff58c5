use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    Object,
    String,
    Array,
}

/// Parameter schema in the shape the Gemini function-calling API expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<&'static str, Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<&'static str>,
}

impl Schema {
    fn string() -> Self {
        Self {
            kind: SchemaType::String,
            description: None,
            properties: BTreeMap::new(),
            items: None,
            required: Vec::new(),
        }
    }

    fn described(description: &'static str) -> Self {
        Self {
            description: Some(description),
            ..Self::string()
        }
    }

    fn array(items: Schema) -> Self {
        Self {
            kind: SchemaType::Array,
            items: Some(Box::new(items)),
            ..Self::string()
        }
    }

    fn object(properties: Vec<(&'static str, Schema)>, required: Vec<&'static str>) -> Self {
        Self {
            kind: SchemaType::Object,
            properties: properties.into_iter().collect(),
            required,
            ..Self::string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Schema,
}

/// Declarations advertised to the backend, one per registered tool.
pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: "generate_image",
            description: "Generate an image based on a prompt. Use for visuals, posters, drawings, etc.",
            parameters: Schema::object(
                vec![
                    ("prompt", Schema::described("Visual description.")),
                    ("aspectRatio", Schema::described("1:1, 16:9, 9:16, 4:3, 3:4")),
                ],
                vec!["prompt"],
            ),
        },
        ToolDeclaration {
            name: "render_svg",
            description: "Generate SVG code for icons, logos, diagrams.",
            parameters: Schema::object(
                vec![
                    ("code", Schema::described("SVG XML code.")),
                    ("description", Schema::described("Description.")),
                ],
                vec!["code", "description"],
            ),
        },
        ToolDeclaration {
            name: "create_table",
            description: "Create structured data tables.",
            parameters: Schema::object(
                vec![
                    ("title", Schema::string()),
                    ("headers", Schema::array(Schema::string())),
                    ("rows", Schema::array(Schema::array(Schema::string()))),
                ],
                vec!["headers", "rows"],
            ),
        },
        ToolDeclaration {
            name: "perform_search",
            description: "Search the web for real-time info.",
            parameters: Schema::object(vec![("query", Schema::string())], vec!["query"]),
        },
        ToolDeclaration {
            name: "generate_app",
            description: "Generate app code, scripts, or build simulations (APK, OS, VBS).",
            parameters: Schema::object(
                vec![
                    ("language", Schema::string()),
                    ("code", Schema::string()),
                    ("filename", Schema::string()),
                    ("instructions", Schema::string()),
                    ("type", Schema::string()),
                ],
                vec!["language", "code"],
            ),
        },
        ToolDeclaration {
            name: "use_integration_service",
            description: "Interact with connected external services (GitHub, Facebook, Slack, Firebase, etc.).",
            parameters: Schema::object(
                vec![
                    (
                        "service",
                        Schema::described(
                            "Service name (github, facebook, firebase, slack, n8n, remote_desktop)",
                        ),
                    ),
                    (
                        "action",
                        Schema::described("Action (post, fetch_issues, deploy, message, connect)"),
                    ),
                    ("payload", Schema::described("JSON string of data")),
                ],
                vec!["service", "action"],
            ),
        },
        ToolDeclaration {
            name: "manage_skills",
            description: "Add or modify AI skills dynamically.",
            parameters: Schema::object(
                vec![
                    ("action", Schema::described("add, remove")),
                    ("skill", Schema::described("Name of skill")),
                    ("details", Schema::described("Skill definition")),
                ],
                vec!["action", "skill"],
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::TOOL_NAMES;

    #[test]
    fn every_registered_tool_is_declared_once() {
        let decls = declarations();
        let names: Vec<&str> = decls.iter().map(|d| d.name).collect();
        assert_eq!(names, TOOL_NAMES.to_vec());
    }

    #[test]
    fn required_params_are_declared_properties() {
        for decl in declarations() {
            for req in &decl.parameters.required {
                assert!(
                    decl.parameters.properties.contains_key(req),
                    "{} requires undeclared {}",
                    decl.name,
                    req
                );
            }
        }
    }

    #[test]
    fn nested_arrays_serialize_with_items() {
        let table = declarations()
            .into_iter()
            .find(|d| d.name == "create_table")
            .unwrap();
        let json = serde_json::to_value(&table.parameters).unwrap();
        assert_eq!(json["type"], "OBJECT");
        assert_eq!(json["properties"]["rows"]["type"], "ARRAY");
        assert_eq!(json["properties"]["rows"]["items"]["type"], "ARRAY");
        assert_eq!(json["properties"]["rows"]["items"]["items"]["type"], "STRING");
        assert!(json["properties"]["title"].get("description").is_none());
    }
}
