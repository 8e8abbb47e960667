use std::sync::Arc;

use anyhow::{Result, bail};
use serde_json::{Map, Value, json};

use crate::io::search::SearchClient;
use crate::tools::{Tool, string_arg};

/// `search_internet`: free-text web search.
pub struct SearchInternet {
    client: Arc<dyn SearchClient>,
}

impl SearchInternet {
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        Self { client }
    }
}

impl Tool for SearchInternet {
    fn name(&self) -> &str {
        "search_internet"
    }

    fn description(&self) -> &str {
        "Search the web. Useful for library documentation and current APIs."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
        let query = string_arg(args, "query")?.trim();
        if query.is_empty() {
            bail!("query must be non-empty");
        }
        self.client.search(query)
    }
}
