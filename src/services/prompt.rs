use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;

const BUILTIN: &str = include_str!("../../prompts/cryptosage.tpl");
const PLACEHOLDER: &str = "{{ DEPLOYMENT_REFERENCE }}";

/// System prompt template with a single deployment placeholder.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    template: String,
}

impl SystemPrompt {
    pub fn builtin() -> Self {
        Self::from_template(BUILTIN)
    }

    pub fn from_template(template: &str) -> Self {
        SystemPrompt {
            template: template.to_string(),
        }
    }

    /// Read `dir/file` when it exists, otherwise use the compiled-in template.
    pub fn load(dir: &str, file: &str) -> Result<Self> {
        let path = Path::new(dir).join(file);
        if !path.is_file() {
            debug!(path = %path.display(), "prompt file absent, using builtin template");
            return Ok(Self::builtin());
        }
        let template = fs::read_to_string(&path)?;
        info!(path = %path.display(), "loaded prompt template");
        Ok(Self::from_template(&template))
    }

    pub fn render(&self, deployment_label: &str) -> String {
        let label = deployment_label.trim();
        let reference = if label.is_empty() {
            String::new()
        } else {
            format!(" integrated on {label}")
        };
        self.template.replace(PLACEHOLDER, &reference)
    }
}
