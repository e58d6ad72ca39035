//! Files fetched from a pull request.

use serde::{Deserialize, Serialize};

/// One changed file in a pull request, as handed to the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Full file content at the PR head.
    pub content: String,
    /// Detected language, when the extension is recognised.
    pub language: Option<String>,
}

impl PrFile {
    /// Build a file, detecting the language from the path extension.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = language_for_path(&path).map(str::to_string);
        Self {
            path,
            content: content.into(),
            language,
        }
    }
}

/// Map a file extension to a language label for the analyzer prompt.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    let lang = match ext {
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "md" => "markdown",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "json" => "json",
        _ => return None,
    };
    Some(lang)
}
