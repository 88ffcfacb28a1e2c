//! The advisory tool surface.
//!
//! Each of the six operations is wrapped as a [`Tool`]: a named,
//! JSON-schema'd entry point that parses its arguments, delegates to the
//! [`WisdomEngine`], and returns the answer as a JSON value. The same
//! registry backs both the HTTP API (`POST /tools/{name}`) and the MCP
//! JSON-RPC bridge, so the two surfaces can never drift apart.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::WisdomError;
use crate::wisdom::WisdomEngine;

/// A named advisory operation exposed to tool-calling clients.
///
/// `parameters_schema` must return a JSON Schema object with
/// `type: "object"` and `properties`; it is served verbatim from
/// `GET /tools/list` and the MCP `list_tools` call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description clients use to decide whether to call this.
    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Run the operation. Argument parsing failures surface as
    /// [`WisdomError::InvalidInput`] so transports can map them to a
    /// client error rather than a server fault.
    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError>;
}

/// Tool metadata as served from `GET /tools/list`.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry of the advisory tools, looked up by name at dispatch time.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with all six advisory tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchWisdomTool));
        registry.register(Box::new(GetAdviceTool));
        registry.register(Box::new(CompareExpertsTool));
        registry.register(Box::new(GeneratePlaybookTool));
        registry.register(Box::new(FindMetricsTool));
        registry.register(Box::new(ListEpisodesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Argument parsing ============

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, WisdomError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WisdomError::invalid(format!("{key} must be a non-empty string")))
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// Clients send both 5 and 5.0; accept either.
fn optional_limit(params: &Value, key: &str) -> Result<Option<i64>, WisdomError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| WisdomError::invalid(format!("{key} must be a number"))),
    }
}

fn experts_param(params: &Value) -> Result<Vec<String>, WisdomError> {
    match params.get("experts") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| WisdomError::invalid("experts must be an array of strings"))
            })
            .collect(),
        _ => Err(WisdomError::invalid(
            "experts must be an array of at least two guest names",
        )),
    }
}

fn encode<T: Serialize>(answer: &T) -> Result<Value, WisdomError> {
    serde_json::to_value(answer)
        .map_err(|e| WisdomError::unavailable(format!("encoding answer: {e}")))
}

// ============ Tool implementations ============

pub struct SearchWisdomTool;

#[async_trait]
impl Tool for SearchWisdomTool {
    fn name(&self) -> &str {
        "search_wisdom"
    }

    fn description(&self) -> &str {
        "Semantic search across the podcast transcript corpus. Use for finding expert opinions on specific topics."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Natural language question or topic to search for" },
                "limit": { "type": "number", "description": "Maximum number of results to return (default: 5)", "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError> {
        let query = required_str(&params, "query")?;
        let limit = optional_limit(&params, "limit")?;
        encode(&engine.search_wisdom(query, limit).await?)
    }
}

pub struct GetAdviceTool;

#[async_trait]
impl Tool for GetAdviceTool {
    fn name(&self) -> &str {
        "get_advice"
    }

    fn description(&self) -> &str {
        "Get synthesized advice on a business challenge from multiple expert perspectives, grouped and attributed per guest."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "challenge": { "type": "string", "description": "Business challenge or strategic question" },
                "context": { "type": "string", "description": "Optional context about your situation (company stage, role, industry)" }
            },
            "required": ["challenge"]
        })
    }

    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError> {
        let challenge = required_str(&params, "challenge")?;
        let context = optional_str(&params, "context");
        encode(&engine.get_advice(challenge, context).await?)
    }
}

pub struct CompareExpertsTool;

#[async_trait]
impl Tool for CompareExpertsTool {
    fn name(&self) -> &str {
        "compare_experts"
    }

    fn description(&self) -> &str {
        "Compare how two or more named guests approach a topic, one viewpoint block per guest. Guests without qualifying passages are reported explicitly."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "Topic to compare viewpoints on" },
                "experts": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 2,
                    "description": "Guest names to compare (at least two)"
                }
            },
            "required": ["topic", "experts"]
        })
    }

    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError> {
        let topic = required_str(&params, "topic")?;
        let experts = experts_param(&params)?;
        encode(&engine.compare_experts(topic, &experts).await?)
    }
}

pub struct GeneratePlaybookTool;

#[async_trait]
impl Tool for GeneratePlaybookTool {
    fn name(&self) -> &str {
        "generate_playbook"
    }

    fn description(&self) -> &str {
        "Generate an actionable playbook for a goal, with steps grouped by theme and backed by cited passages."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal": { "type": "string", "description": "The goal you want to achieve (e.g., 'launch a new product', 'build a growth team')" },
                "constraints": { "type": "string", "description": "Optional constraints (timeline, budget, team size, etc.)" }
            },
            "required": ["goal"]
        })
    }

    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError> {
        let goal = required_str(&params, "goal")?;
        let constraints = optional_str(&params, "constraints");
        encode(&engine.generate_playbook(goal, constraints).await?)
    }
}

pub struct FindMetricsTool;

#[async_trait]
impl Tool for FindMetricsTool {
    fn name(&self) -> &str {
        "find_metrics"
    }

    fn description(&self) -> &str {
        "Find KPIs, benchmarks, and concrete numbers experts recommend for a category. Only passages containing figures are returned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "description": "Category of metrics (growth, retention, engagement, revenue, team)" },
                "context": { "type": "string", "description": "Context for the metrics (e.g., 'B2B SaaS Series A', 'consumer app')" }
            },
            "required": ["category"]
        })
    }

    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError> {
        let category = required_str(&params, "category")?;
        let context = optional_str(&params, "context");
        encode(&engine.find_metrics(category, context).await?)
    }
}

pub struct ListEpisodesTool;

#[async_trait]
impl Tool for ListEpisodesTool {
    fn name(&self) -> &str {
        "list_episodes"
    }

    fn description(&self) -> &str {
        "Browse and filter episodes by guest or title text. Returns episode metadata, no transcript search."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "guest": { "type": "string", "description": "Filter by guest name" },
                "search": { "type": "string", "description": "Search in episode titles and descriptions" },
                "sort": { "type": "string", "enum": ["views", "duration", "recent"], "description": "Sort order (default: views)" },
                "limit": { "type": "number", "description": "Maximum results (default: 10)", "default": 10 }
            }
        })
    }

    async fn execute(&self, params: Value, engine: &WisdomEngine) -> Result<Value, WisdomError> {
        let guest = optional_str(&params, "guest");
        let search = optional_str(&params, "search");
        let sort = optional_str(&params, "sort");
        let limit = optional_limit(&params, "limit")?;
        encode(&engine.list_episodes(guest, search, sort, limit).await?)
    }
}
