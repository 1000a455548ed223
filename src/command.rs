//! Shell command construction for remote agent invocations.
//!
//! Commands are executed verbatim by a POSIX shell on the remote host, so
//! every user-controlled argument is wrapped in ANSI-C quoting
//! (`$'...'`). The escape set tolerates arbitrary text — embedded quotes,
//! newlines, control characters — without opening a metacharacter
//! injection hole.

/// Quote `s` for a POSIX shell using ANSI-C quoting.
///
/// Escapes, in order: backslash, single quote, newline, carriage return,
/// and tab as literal two-character sequences, then wraps the result in
/// `$'...'`. The remote shell reconstructs the original bytes as one
/// literal argument.
#[must_use]
pub fn escape_ansi_c(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 3);
    escaped.push_str("$'");
    for ch in s.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped.push('\'');
    escaped
}

/// Builder for one `claude -p … --output-format stream-json` invocation.
///
/// Optional flags are appended only when present; the fixed flag order is
/// for readability, not semantics.
#[derive(Debug, Clone)]
pub struct ClaudeCommand {
    binary: String,
    message: String,
    resume_token: Option<String>,
    allowed_tools: Option<String>,
    project_dir: Option<String>,
}

impl ClaudeCommand {
    /// Start building an invocation of `binary` with the given prompt.
    #[must_use]
    pub fn new(binary: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            message: message.into(),
            resume_token: None,
            allowed_tools: None,
            project_dir: None,
        }
    }

    /// Resume a prior remote session (`--resume <token>`).
    #[must_use]
    pub fn resume(mut self, token: impl Into<String>) -> Self {
        self.resume_token = Some(token.into());
        self
    }

    /// Restrict the agent to a tool allowlist (`--allowedTools <list>`).
    #[must_use]
    pub fn allowed_tools(mut self, tools: impl Into<String>) -> Self {
        self.allowed_tools = Some(tools.into());
        self
    }

    /// Run inside a specific remote directory (`--project-dir <dir>`).
    #[must_use]
    pub fn project_dir(mut self, dir: impl Into<String>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Render the full command line, safe to execute verbatim.
    #[must_use]
    pub fn build(&self) -> String {
        let mut parts = vec![
            self.binary.clone(),
            "-p".to_owned(),
            escape_ansi_c(&self.message),
            "--output-format".to_owned(),
            "stream-json".to_owned(),
        ];

        if let Some(token) = &self.resume_token {
            parts.push("--resume".to_owned());
            parts.push(token.clone());
        }

        if let Some(tools) = &self.allowed_tools {
            parts.push("--allowedTools".to_owned());
            parts.push(escape_ansi_c(tools));
        }

        if let Some(dir) = &self.project_dir {
            parts.push("--project-dir".to_owned());
            parts.push(dir.clone());
        }

        parts.join(" ")
    }
}
