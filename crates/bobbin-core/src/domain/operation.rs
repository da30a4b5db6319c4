use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an operation a job can request (a key in `params`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationName(String);

impl OperationName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Operation name + the query text the engine runs for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: OperationName,
    query: String,
}

impl Operation {
    pub fn new(name: OperationName, query: impl Into<String>) -> Self {
        Self {
            name,
            query: query.into(),
        }
    }

    pub fn name(&self) -> &OperationName {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}
