use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const META_TYPE: &str = "type";
pub const META_DYNAMIC_TOOLS: &str = "dynamic_tools";
pub const BOT_TYPE: &str = "bot";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RulesetId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    Text { value: String },
    JsonSchema { schema: Value },
}

impl Rule {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { value: value.into() }
    }

    pub fn json_schema(schema: Value) -> Self {
        Self::JsonSchema { schema }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Text { value } => value.clone(),
            Self::JsonSchema { schema } => format!(
                "Output must be valid JSON that adheres to this schema: {}",
                Value::to_string(schema)
            ),
        }
    }
}

/// A bundle of behavioral rules plus free-form metadata applied to an agent run.
///
/// Rulesets are built fresh for every request and never mutated afterwards.
/// Identity-bound rulesets are looked up by name and may be absent; an absent
/// one is represented by [`Ruleset::empty`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    #[serde(default)]
    pub id: Option<RulesetId>,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Ruleset {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self { id: None, name: name.into(), rules, meta: Map::new() }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(RulesetId(id.into()));
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.meta.get(META_TYPE).and_then(Value::as_str)
    }

    pub fn is_bot(&self) -> bool {
        self.kind() == Some(BOT_TYPE)
    }

    pub fn wants_dynamic_tools(&self) -> bool {
        self.meta.get(META_DYNAMIC_TOOLS).and_then(Value::as_bool).unwrap_or(false)
    }
}
