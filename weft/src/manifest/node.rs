//! Node definitions: one step of a flow, tagged by kind.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Node kind: which executor runs the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Prompt the user and park until content arrives.
    Input,
    /// Drive one LLM turn (streaming, tool calls, output projection).
    Llm,
    /// Invoke a declared tool directly.
    Tool,
    /// Pure state mutation, no model or tool involved.
    UpdateState,
    /// Surface rendered text to the human channel.
    Output,
}

impl NodeKind {
    /// Wire name as written in manifests (`type:` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::UpdateState => "update_state",
            Self::Output => "output",
        }
    }
}

/// Retry strategy for a failing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Ask the recovery analyzer whether the failure is worth retrying.
    #[default]
    Intelligent,
    /// Retry unconditionally until `max_retries` is exhausted.
    Simple,
}

/// String → string map that preserves YAML declaration order.
///
/// Declaration order is load-bearing: an input node stores user content into
/// its *first* `output_model` key, and projections are requested in declared
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedMap(pub Vec<(String, String)>);

impl OrderedMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn first_key(&self) -> Option<&str> {
        self.0.first().map(|(k, _)| k.as_str())
    }
}

impl Serialize for OrderedMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor;

        impl<'de> Visitor<'de> for OrderedMapVisitor {
            type Value = OrderedMap;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a mapping of string keys to string values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    entries.push((k, v));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor)
    }
}

/// Parallel scatter block: fan the node out over a list in state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelSpec {
    /// State key holding the list to iterate.
    pub for_each: String,
    /// Loop variable bound to the current item in each sibling's state.
    #[serde(rename = "as")]
    pub item_var: String,
    /// Optional variable bound to the item index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_as: Option<String>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

/// Verb applied by one `update_state` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    #[default]
    Set,
    Append,
    Increment,
}

/// One pure state mutation of an `update_state` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSpec {
    /// Target state key.
    pub key: String,
    #[serde(default, skip_serializing_if = "is_default_action")]
    pub action: UpdateAction,
    /// Literal value; template strings are rendered against state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    /// Copy the value of another state key instead of a literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_variable: Option<String>,
}

fn is_default_action(a: &UpdateAction) -> bool {
    *a == UpdateAction::default()
}

/// One step of a flow. Only the fields matching `kind` are meaningful; load
/// validation enforces the required ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Template string with `{variable}` substitution from state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// System template, prepended to the rendered prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// State keys this node must populate, with declared type tags.
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub output_model: OrderedMap,
    /// State keys whose values are surfaced to the human channel. Absent
    /// means the node's textual output is internal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_message: Vec<String>,

    /// Whether the node may call tools at all.
    #[serde(default, skip_serializing_if = "is_false")]
    pub tools: bool,
    /// Names of the tools the node may call (filtered from the session set).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_selection: Vec<String>,
    /// Skip the human approval gate for this node's tool calls.
    #[serde(default, skip_serializing_if = "is_false")]
    pub tools_auto_approval: bool,
    /// Arguments for a `tool` node, rendered against state.
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub args: OrderedMap,
    /// Routes structured tool-result fields into state keys without LLM
    /// reformatting: state key → tool-result field.
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub raw_tool_output: OrderedMap,

    /// Input choices: literals or a state key naming a list to expand.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Mutations for `update_state` nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<UpdateSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelSpec>,
    /// `append`: aggregate parallel outputs into a list per output key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_action: Option<String>,

    #[serde(default = "default_max_retries", skip_serializing_if = "is_default_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "is_default_strategy")]
    pub retry_strategy: RetryStrategy,

    /// Suppress user-visible transition rendering for this node.
    #[serde(default, skip_serializing_if = "is_false")]
    pub silent: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_default_retries(n: &u32) -> bool {
    *n == default_max_retries()
}

fn is_default_strategy(s: &RetryStrategy) -> bool {
    *s == RetryStrategy::default()
}

impl NodeDef {
    /// True when parallel outputs should accumulate into lists.
    pub fn appends_parallel_output(&self) -> bool {
        self.output_action.as_deref() == Some("append")
    }
}
