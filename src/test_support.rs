//! In-memory graph used by execution tests.
//!
//! Interprets exactly the statement shapes the compilers emit. Labels, keys
//! and relationship types are expected to be plain identifiers.

use crate::backend::GraphBackend;
use crate::models::{CompiledStatement, Counters, Record};
use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub labels: Vec<String>,
    pub props: Record,
}

#[derive(Debug, Clone)]
pub struct FakeRelationship {
    pub from: usize,
    pub to: usize,
    pub rel_type: String,
    pub props: Record,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: Vec<FakeNode>,
    relationships: Vec<FakeRelationship>,
    constraints: usize,
    executed: Vec<String>,
    resets: usize,
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
    /// Statements whose text contains this fail without touching the graph.
    pub fail_when_contains: Option<String>,
    pub unreachable: bool,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(pattern: &str) -> Self {
        Self {
            fail_when_contains: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_constraints(self, constraints: usize) -> Self {
        self.state.lock().unwrap().constraints = constraints;
        self
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state.lock().unwrap().relationships.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.state.lock().unwrap().constraints
    }

    pub fn reset_calls(&self) -> usize {
        self.state.lock().unwrap().resets
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn nodes(&self) -> Vec<FakeNode> {
        self.state.lock().unwrap().nodes.clone()
    }

    pub fn relationships(&self) -> Vec<FakeRelationship> {
        self.state.lock().unwrap().relationships.clone()
    }

    /// Seed a node directly, bypassing statements.
    pub fn insert_node(&self, label: &str, props: Value) {
        let props = props.as_object().cloned().unwrap_or_default();
        self.state.lock().unwrap().nodes.push(FakeNode {
            labels: vec![label.to_string()],
            props,
        });
    }
}

impl GraphBackend for MemoryGraph {
    async fn verify_connectivity(&self) -> Result<()> {
        if self.unreachable {
            bail!("connection refused");
        }
        Ok(())
    }

    async fn execute(&self, statement: &CompiledStatement, _database: &str) -> Result<Counters> {
        if let Some(pattern) = &self.fail_when_contains {
            if statement.text.contains(pattern.as_str()) {
                bail!("Neo.ClientError.Statement.SyntaxError near '{}'", pattern);
            }
        }

        let mut state = self.state.lock().unwrap();
        state.executed.push(statement.text.clone());

        let mut counters = if statement.text.contains("AS node_data") {
            apply_nodes(&mut state, statement)?
        } else if statement.text.contains("AS from_to_data") {
            apply_relationships(&mut state, statement)?
        } else {
            bail!("unsupported statement: {}", statement.text);
        };
        counters.properties_set = statement.property_bindings as u64;
        Ok(counters)
    }

    async fn reset(&self, _database: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.nodes.clear();
        state.relationships.clear();
        state.constraints = 0;
        state.resets += 1;
        Ok(())
    }
}

fn property_pairs(block: &str, statement: &CompiledStatement) -> Result<Record> {
    let pair = Regex::new(r"`([^`]+)`:\$(\w+)").unwrap();
    let mut props = Record::new();
    for cap in pair.captures_iter(block) {
        props.insert(cap[1].to_string(), param(statement, &cap[2])?);
    }
    Ok(props)
}

fn param(statement: &CompiledStatement, name: &str) -> Result<Value> {
    statement
        .parameters
        .get(name)
        .cloned()
        .ok_or_else(|| anyhow!("unbound parameter ${}", name))
}

fn apply_nodes(state: &mut GraphState, statement: &CompiledStatement) -> Result<Counters> {
    let merge = Regex::new(r"MERGE \(n:`([^`]+)` \{`([^`]+)`:node\[0\]\}\)").unwrap();
    let create = Regex::new(r"CREATE \(n:`([^`]+)`\)").unwrap();
    let extra = Regex::new(r"SET n:`([^`]+)`").unwrap();
    let element = Regex::new(r"\[\$(\w+), \{([^}]*)\}\]").unwrap();

    let extra_labels: Vec<String> = extra.captures_iter(&statement.text).map(|c| c[1].to_string()).collect();
    let mut counters = Counters::default();

    for cap in element.captures_iter(&statement.text) {
        let key_value = param(statement, &cap[1])?;
        let props = property_pairs(&cap[2], statement)?;

        let idx = if let Some(m) = merge.captures(&statement.text) {
            let (label, key) = (m[1].to_string(), m[2].to_string());
            let existing = state
                .nodes
                .iter()
                .position(|n| n.labels.contains(&label) && n.props.get(&key) == Some(&key_value));
            match existing {
                Some(idx) => idx,
                None => {
                    let mut node_props = Record::new();
                    node_props.insert(key, key_value);
                    state.nodes.push(FakeNode {
                        labels: vec![label],
                        props: node_props,
                    });
                    counters.nodes_created += 1;
                    state.nodes.len() - 1
                }
            }
        } else if let Some(c) = create.captures(&statement.text) {
            state.nodes.push(FakeNode {
                labels: vec![c[1].to_string()],
                props: Record::new(),
            });
            counters.nodes_created += 1;
            state.nodes.len() - 1
        } else {
            bail!("node statement without MERGE or CREATE");
        };

        let node = &mut state.nodes[idx];
        node.props.extend(props);
        for label in &extra_labels {
            if !node.labels.contains(label) {
                node.labels.push(label.clone());
            }
        }
    }

    Ok(counters)
}

fn apply_relationships(state: &mut GraphState, statement: &CompiledStatement) -> Result<Counters> {
    let endpoint = Regex::new(r"MATCH \((fromNode|toNode)(?::`([^`]+)`)? \{`([^`]+)`:tuple\[\d\]\}\)").unwrap();
    let write = Regex::new(r"(MERGE|CREATE) \(fromNode\)-\[r:`([^`]+)`\]->\(toNode\)").unwrap();
    let element = Regex::new(r"\[\$(\w+), \$(\w+), \{([^}]*)\}\]").unwrap();

    let mut matchers = endpoint
        .captures_iter(&statement.text)
        .map(|c| (c.get(2).map(|m| m.as_str().to_string()), c[3].to_string()));
    let from_match = matchers.next().ok_or_else(|| anyhow!("missing fromNode MATCH"))?;
    let to_match = matchers.next().ok_or_else(|| anyhow!("missing toNode MATCH"))?;
    let w = write
        .captures(&statement.text)
        .ok_or_else(|| anyhow!("missing relationship write clause"))?;
    let merge = &w[1] == "MERGE";
    let rel_type = w[2].to_string();

    let mut counters = Counters::default();
    for cap in element.captures_iter(&statement.text) {
        let from_value = param(statement, &cap[1])?;
        let to_value = param(statement, &cap[2])?;
        let props = property_pairs(&cap[3], statement)?;

        // MATCH yields no rows when an endpoint is missing.
        let (Some(from), Some(to)) = (
            find_node(state, &from_match, &from_value),
            find_node(state, &to_match, &to_value),
        ) else {
            continue;
        };

        let existing = if merge {
            state
                .relationships
                .iter()
                .position(|r| r.from == from && r.to == to && r.rel_type == rel_type)
        } else {
            None
        };
        let idx = match existing {
            Some(idx) => idx,
            None => {
                state.relationships.push(FakeRelationship {
                    from,
                    to,
                    rel_type: rel_type.clone(),
                    props: Record::new(),
                });
                counters.relationships_created += 1;
                state.relationships.len() - 1
            }
        };
        state.relationships[idx].props.extend(props);
    }

    Ok(counters)
}

fn find_node(state: &GraphState, (label, key): &(Option<String>, String), value: &Value) -> Option<usize> {
    state.nodes.iter().position(|n| {
        label.as_ref().map_or(true, |l| n.labels.contains(l)) && n.props.get(key) == Some(value)
    })
}
