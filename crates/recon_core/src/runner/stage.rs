use std::fmt;
use std::path::{Path, PathBuf};

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    name: String,
    program: String,
    args: Vec<String>,
    requires: Vec<PathBuf>,
    produces: Vec<PathBuf>,
}

impl Stage {
    /// A stage named `name` running `program` with no arguments yet.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            requires: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// Append a bare argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `--key value`.
    pub fn opt(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.push(key.to_string());
        self.args.push(value.to_string());
        self
    }

    /// Append `--key <path>`.
    pub fn path_opt(self, key: &str, path: &Path) -> Self {
        self.opt(key, path.display())
    }

    /// Declare a path that must exist before the stage runs.
    pub fn requires(mut self, path: impl Into<PathBuf>) -> Self {
        self.requires.push(path.into());
        self
    }

    /// Declare a path the stage must leave behind.
    pub fn produces(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces.push(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn required_paths(&self) -> &[PathBuf] {
        &self.requires
    }

    pub fn produced_paths(&self) -> &[PathBuf] {
        &self.produces
    }

    /// Value following `key` in the argument list, if present.
    pub fn arg_value(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == key)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Whether a bare argument or key is present.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("\"{}\"", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_argument_list_in_order() {
        let stage = Stage::new("mapper", "colmap")
            .arg("mapper")
            .opt("--random_seed", 3)
            .path_opt("--database_path", Path::new("/p/db.db"))
            .requires("/p/db.db")
            .produces("/p/sparse");

        assert_eq!(
            stage.args(),
            ["mapper", "--random_seed", "3", "--database_path", "/p/db.db"]
        );
        assert_eq!(stage.arg_value("--random_seed"), Some("3"));
        assert!(stage.has_arg("mapper"));
        assert_eq!(stage.required_paths(), [PathBuf::from("/p/db.db")]);
        assert_eq!(stage.produced_paths(), [PathBuf::from("/p/sparse")]);
    }

    #[test]
    fn command_line_quotes_spaces() {
        let stage = Stage::new("x", "colmap")
            .arg("feature_extractor")
            .opt("--image_path", "my images");
        assert_eq!(
            stage.command_line(),
            "colmap feature_extractor --image_path \"my images\""
        );
    }
}
