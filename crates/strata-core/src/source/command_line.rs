use async_trait::async_trait;

use crate::entry::{Entries, Entry};
use crate::error::Result;
use crate::source::Source;

/// Command-line configuration source. Arguments of the form `--key=value`
/// and `--key value` become entries; a bare `--flag` becomes `"true"`.
/// Anything not starting with `--` is skipped as a positional argument.
pub struct CommandLineSource {
    name: String,
    arguments: Vec<String>,
}

impl CommandLineSource {
    pub fn new(name: impl Into<String>, arguments: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().collect(),
        }
    }

    /// Build from the process arguments, skipping the program name
    pub fn from_args(name: impl Into<String>) -> Self {
        Self::new(name, std::env::args().skip(1))
    }
}

#[async_trait]
impl Source for CommandLineSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Entries> {
        let mut entries = Entries::default();
        let mut arguments = self.arguments.iter().peekable();

        while let Some(argument) = arguments.next() {
            let Some(flag) = argument.strip_prefix("--") else {
                continue;
            };

            if let Some((name, value)) = flag.split_once('=') {
                entries.push(Entry::new(&self.name, name, value));
            } else if let Some(value) = arguments.peek().filter(|a| !a.starts_with("--")) {
                entries.push(Entry::new(&self.name, flag, value.as_str()));
                arguments.next();
            } else {
                entries.push(Entry::new(&self.name, flag, "true"));
            }
        }

        Ok(entries)
    }
}
