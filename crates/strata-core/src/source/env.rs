use async_trait::async_trait;

use crate::entry::{Entries, Entry};
use crate::error::Result;
use crate::source::Source;

/// Shells export variables like `_` whose normalized form is empty or a bare
/// separator run; those can never be addressed as settings, so they are
/// dropped rather than failing layer validation.
fn is_addressable(normalized: &str) -> bool {
    !normalized.is_empty() && !normalized.starts_with('.')
}

/// Process-environment configuration source. A snapshot of the environment is
/// taken on each load; environment entries never change after process start,
/// so this source carries no notifier.
pub struct EnvironmentSource {
    name: String,
    variables: Option<Vec<(String, String)>>,
}

impl EnvironmentSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: None,
        }
    }

    /// Replace the process environment with a fixed variable set
    pub fn with_variables(
        name: impl Into<String>,
        variables: Vec<(String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            variables: Some(variables),
        }
    }
}

#[async_trait]
impl Source for EnvironmentSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Entries> {
        let variables = match &self.variables {
            Some(fixed) => fixed.clone(),
            None => std::env::vars().collect(),
        };

        Ok(variables
            .into_iter()
            .map(|(name, value)| Entry::new(&self.name, name, value))
            .filter(|entry| is_addressable(&entry.normalized_name))
            .collect())
    }
}
