//! Scenarios: which sensitivity to use for a given table row.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CsvdbError, Result};
use crate::value::Value;

/// Source of sensitivity selections for projections.
pub trait SensitivityResolver {
    /// The sensitivity selected for `(table, key, filters)`, if any.
    fn sensitivity(&self, table: &str, key: Option<&str>, filters: &[(String, Value)])
    -> Option<String>;
}

/// One sensitivity selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFilter {
    pub table: String,
    #[serde(default)]
    pub key: Option<String>,
    pub sensitivity: String,
    #[serde(default)]
    pub constraints: Vec<(String, Value)>,
}

impl ScenarioFilter {
    pub fn new(
        table: impl Into<String>,
        key: Option<&str>,
        sensitivity: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key: key.map(str::to_string),
            sensitivity: sensitivity.into(),
            constraints: Vec::new(),
        }
    }

    /// Restrict the selection to rows also matching `column == value`.
    pub fn with_constraint(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.push((column.into(), value.into()));
        self
    }
}

type LookupKey = (Option<String>, Vec<(String, Value)>);

fn lookup_key(key: Option<&str>, constraints: &[(String, Value)]) -> LookupKey {
    let mut constraints = constraints.to_vec();
    constraints.sort();
    (key.map(str::to_string), constraints)
}

/// An in-memory set of sensitivity selections.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    name: String,
    filters: HashMap<String, HashMap<LookupKey, String>>,
}

#[derive(Deserialize)]
struct ScenarioFile {
    name: String,
    #[serde(default)]
    filters: Vec<ScenarioFilter>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters: HashMap::new(),
        }
    }

    /// Load a scenario from a JSON file of the form
    /// `{"name": ..., "filters": [{"table", "key", "sensitivity", "constraints"}]}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CsvdbError::io(path, e))?;
        let parsed: ScenarioFile = serde_json::from_reader(BufReader::new(file))?;

        let mut scenario = Scenario::new(parsed.name);
        for filter in parsed.filters {
            scenario.add_filter(filter)?;
        }
        Ok(scenario)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a selection. Two selections for the same table, key and
    /// constraint set are a configuration error.
    pub fn add_filter(&mut self, filter: ScenarioFilter) -> Result<()> {
        let key = lookup_key(filter.key.as_deref(), &filter.constraints);
        let table = self.filters.entry(filter.table.clone()).or_default();
        if let Some(existing) = table.get(&key) {
            return Err(CsvdbError::Config(format!(
                "scenario '{}': table '{}' key {:?} already selects sensitivity '{}'",
                self.name, filter.table, filter.key, existing
            )));
        }
        table.insert(key, filter.sensitivity);
        Ok(())
    }

    /// Builder form of [`Scenario::add_filter`].
    pub fn with_filter(mut self, filter: ScenarioFilter) -> Result<Self> {
        self.add_filter(filter)?;
        Ok(self)
    }

    /// Number of selections.
    pub fn len(&self) -> usize {
        self.filters.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SensitivityResolver for Scenario {
    fn sensitivity(
        &self,
        table: &str,
        key: Option<&str>,
        filters: &[(String, Value)],
    ) -> Option<String> {
        self.filters
            .get(table)?
            .get(&lookup_key(key, filters))
            .cloned()
    }
}
