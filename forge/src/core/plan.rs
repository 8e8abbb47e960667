//! Three-phase task plan produced by the planner.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Task category. Phases always execute in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Common,
    Backend,
    Frontend,
}

impl Phase {
    pub const ORDER: [Phase; 3] = [Phase::Common, Phase::Backend, Phase::Frontend];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Common => "common",
            Phase::Backend => "backend",
            Phase::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered task lists. Order within a list is author-declared and preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub common_tasks: Vec<String>,
    pub backend_tasks: Vec<String>,
    pub frontend_tasks: Vec<String>,
}

impl Plan {
    pub fn tasks(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Common => &self.common_tasks,
            Phase::Backend => &self.backend_tasks,
            Phase::Frontend => &self.frontend_tasks,
        }
    }

    /// Phases paired with their tasks, in execution order.
    pub fn phases(&self) -> impl Iterator<Item = (Phase, &[String])> + '_ {
        Phase::ORDER
            .into_iter()
            .map(move |phase| (phase, self.tasks(phase)))
    }

    pub fn task_count(&self) -> usize {
        self.common_tasks.len() + self.backend_tasks.len() + self.frontend_tasks.len()
    }

    /// Trim every task and reject blank entries.
    pub fn normalized(self) -> Result<Self, String> {
        fn clean(phase: Phase, tasks: Vec<String>) -> Result<Vec<String>, String> {
            tasks
                .into_iter()
                .enumerate()
                .map(|(idx, task)| {
                    let trimmed = task.trim();
                    if trimmed.is_empty() {
                        Err(format!("{phase} task {idx} is blank"))
                    } else {
                        Ok(trimmed.to_string())
                    }
                })
                .collect()
        }

        Ok(Self {
            common_tasks: clean(Phase::Common, self.common_tasks)?,
            backend_tasks: clean(Phase::Backend, self.backend_tasks)?,
            frontend_tasks: clean(Phase::Frontend, self.frontend_tasks)?,
        })
    }
}

/// JSON Schema the structured-extraction call must satisfy.
pub fn plan_schema() -> Value {
    let task_list = json!({
        "type": "array",
        "items": { "type": "string", "minLength": 1 }
    });
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "common_tasks": task_list,
            "backend_tasks": task_list,
            "frontend_tasks": task_list
        },
        "required": ["common_tasks", "backend_tasks", "frontend_tasks"],
        "additionalProperties": false
    })
}
