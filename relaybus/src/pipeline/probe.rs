/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// A tree of named scopes collected while probing a pipe.
///
/// Properties are JSON values. Child scopes are grouped by key, so probing
/// two filters yields `{"filters": [{...}, {...}]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeContext {
    #[serde(flatten)]
    properties: BTreeMap<String, Value>,
    #[serde(flatten)]
    scopes: BTreeMap<String, Vec<ProbeContext>>,
}

impl ProbeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property on this scope.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds a child scope under `key` and returns it.
    pub fn create_scope(&mut self, key: impl Into<String>) -> &mut ProbeContext {
        let children = self.scopes.entry(key.into()).or_default();
        let index = children.len();
        children.push(ProbeContext::default());
        &mut children[index]
    }

    /// Adds a `filters` child tagged with `filterType`.
    pub fn create_filter_scope(&mut self, filter_type: &str) -> &mut ProbeContext {
        let scope = self.create_scope("filters");
        scope.add("filterType", filter_type);
        scope
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Child scopes recorded under `key`.
    pub fn scopes(&self, key: &str) -> &[ProbeContext] {
        self.scopes.get(key).map_or(&[], Vec::as_slice)
    }

    /// The tree as a JSON object.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (key, value) in &self.properties {
            object.insert(key.clone(), value.clone());
        }
        for (key, children) in &self.scopes {
            object.insert(
                key.clone(),
                Value::Array(children.iter().map(ProbeContext::to_json).collect()),
            );
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_scopes_accumulate_in_order() {
        let mut probe = ProbeContext::new();
        probe.create_filter_scope("first");
        probe.create_filter_scope("second").add("retries", 3);

        let filters = probe.scopes("filters");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].property("filterType"), Some(&Value::from("first")));
        assert_eq!(filters[1].property("retries"), Some(&Value::from(3)));
    }

    #[test]
    fn json_matches_serde_output() {
        let mut probe = ProbeContext::new();
        probe.add("name", "pipe");
        probe.create_scope("children").add("kind", "leaf");

        let expected = serde_json::json!({
            "name": "pipe",
            "children": [{ "kind": "leaf" }]
        });
        assert_eq!(probe.to_json(), expected);
        assert_eq!(serde_json::to_value(&probe).unwrap_or_default(), expected);
    }
}
