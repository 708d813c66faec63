//! Script content descriptors.

use crate::output::LINE_SEPARATOR;

/// Script body: raw text or an ordered list of commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Text written to disk verbatim.
    Content(String),
    /// Commands joined with the platform line separator.
    Commands(Vec<String>),
}

impl ScriptSource {
    /// Build from any sequence of commands.
    pub fn commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Commands(commands.into_iter().map(Into::into).collect())
    }

    /// Text as it will be written to the script file.
    pub fn render(&self) -> String {
        match self {
            Self::Content(content) => content.clone(),
            Self::Commands(commands) => commands.join(LINE_SEPARATOR),
        }
    }
}

impl From<String> for ScriptSource {
    fn from(content: String) -> Self {
        Self::Content(content)
    }
}

impl From<&str> for ScriptSource {
    fn from(content: &str) -> Self {
        Self::Content(content.to_string())
    }
}

impl From<Vec<String>> for ScriptSource {
    fn from(commands: Vec<String>) -> Self {
        Self::Commands(commands)
    }
}

impl From<&[&str]> for ScriptSource {
    fn from(commands: &[&str]) -> Self {
        Self::commands(commands.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for ScriptSource {
    fn from(commands: [&str; N]) -> Self {
        Self::commands(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_verbatim() {
        let source = ScriptSource::from("echo a\necho b\n");
        assert_eq!(source.render(), "echo a\necho b\n");
    }

    #[test]
    fn test_commands_joined() {
        let source = ScriptSource::from(["echo a", "echo b"]);
        assert_eq!(source.render(), format!("echo a{LINE_SEPARATOR}echo b"));
    }

    #[test]
    fn test_empty_commands() {
        assert_eq!(ScriptSource::commands(Vec::<String>::new()).render(), "");
    }

    #[test]
    fn test_conversions() {
        let owned: ScriptSource = vec!["ls".to_string()].into();
        let borrowed: ScriptSource = (&["ls"][..]).into();
        assert_eq!(owned, borrowed);
    }
}
