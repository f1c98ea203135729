use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Node, Selector};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

use swe_config::schema::ToolsConfig;
use swe_core::{Tool, ToolCall, ToolError, ToolExecutor, ToolOutput};

/// Directories never descended into by `glob` and `grep`.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    ".venv",
    "__pycache__",
    "dist",
    "build",
    ".next",
    ".cache",
];
const MAX_GLOB_RESULTS: usize = 500;
const MAX_GREP_MATCHES: usize = 200;
const MAX_GREP_LINE_CHARS: usize = 300;
const DEFAULT_READ_LIMIT: usize = 2000;
const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const DEFAULT_SEARCH_RESULTS: u64 = 5;
const MAX_SEARCH_RESULTS: u64 = 20;
const SEARCH_TOPICS: &[&str] = &["general", "news", "finance"];

/// Limits applied by the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub shell_timeout: Duration,
    pub fetch_timeout: Duration,
    /// 0 disables truncation.
    pub max_output_chars: usize,
    /// Tavily key. `web_search` is only offered when one is set.
    pub search_api_key: Option<String>,
    pub search_url: String,
}

impl ToolSettings {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            shell_timeout: Duration::from_secs(config.shell_timeout_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            max_output_chars: config.max_output_chars,
            search_api_key: None,
            search_url: TAVILY_SEARCH_URL.to_string(),
        }
    }

    pub fn with_search_key(mut self, key: Option<String>) -> Self {
        self.search_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

/// File, search, shell and network tools. Relative paths resolve against the
/// working directory the tools were created with.
#[derive(Clone)]
pub struct BuiltinTools {
    settings: ToolSettings,
    cwd: PathBuf,
    http: reqwest::Client,
}

impl BuiltinTools {
    pub fn new(cwd: impl Into<PathBuf>, settings: ToolSettings) -> Self {
        Self {
            settings,
            cwd: cwd.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }

    fn call_timeout(&self, call: &ToolCall) -> Duration {
        call.arguments
            .get("timeout")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.settings.fetch_timeout)
    }

    fn specs(&self) -> Vec<Tool> {
        let mut specs = vec![
            Tool::new(
                "ls",
                "List the entries of a directory. Directories are shown with a trailing '/'.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory to list (absolute, or relative to the working directory). Defaults to the working directory."
                        }
                    }
                }),
            ),
            Tool::new(
                "read_file",
                "Read a text file. Output lines are numbered starting at 1. Use offset and limit to page through large files.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string", "description": "Path of the file to read" },
                        "offset": { "type": "integer", "minimum": 0, "description": "Line to start from (0-based)" },
                        "limit": { "type": "integer", "minimum": 1, "description": "Maximum number of lines (default 2000)" }
                    },
                    "required": ["file_path"]
                }),
            ),
            Tool::new(
                "glob",
                "Find files by glob pattern, e.g. '**/*.rs' or 'src/*.toml'. A pattern without '/' matches file names at any depth.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "Glob pattern" },
                        "path": { "type": "string", "description": "Directory to search from (default: working directory)" }
                    },
                    "required": ["pattern"]
                }),
            ),
            Tool::new(
                "grep",
                "Search file contents with a regular expression. Returns path:line:text for each match.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "Regex to search for, e.g. 'fn main' or 'TODO|FIXME'" },
                        "path": { "type": "string", "description": "File or directory to search (default: working directory)" },
                        "glob": { "type": "string", "description": "Only search files matching this glob, e.g. '*.rs'" }
                    },
                    "required": ["pattern"]
                }),
            ),
            Tool::new(
                "write_file",
                "Create a file or replace its entire content. Parent directories are created as needed.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string", "description": "Path of the file to write" },
                        "content": { "type": "string", "description": "Full new content" }
                    },
                    "required": ["file_path", "content"]
                }),
            ),
            Tool::new(
                "edit_file",
                "Replace exact text in a file. old_string must match exactly once unless replace_all is true.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string", "description": "Path of the file to edit" },
                        "old_string": { "type": "string", "description": "Exact text to replace, including whitespace" },
                        "new_string": { "type": "string", "description": "Replacement text" },
                        "replace_all": { "type": "boolean", "description": "Replace every occurrence (default false)" }
                    },
                    "required": ["file_path", "old_string", "new_string"]
                }),
            ),
            Tool::new(
                "shell",
                "Run a non-interactive shell command with `sh -c` and return its exit code, stdout and stderr. Stdin is closed.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": { "type": "string", "description": "The command line to run" },
                        "working_dir": { "type": "string", "description": "Directory to run in (default: working directory)" }
                    },
                    "required": ["command"]
                }),
            ),
            Tool::new(
                "fetch_url",
                "Fetch a URL with GET and return its body. HTML pages are reduced to plain text.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "http or https URL" },
                        "timeout": { "type": "integer", "minimum": 1, "description": "Timeout in seconds" }
                    },
                    "required": ["url"]
                }),
            ),
            Tool::new(
                "http_request",
                "Send an HTTP request and return the status and body.",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "http or https URL" },
                        "method": { "type": "string", "description": "HTTP method (default GET)" },
                        "headers": {
                            "type": "object",
                            "additionalProperties": { "type": "string" },
                            "description": "Request headers"
                        },
                        "body": { "type": "string", "description": "Request body" },
                        "timeout": { "type": "integer", "minimum": 1, "description": "Timeout in seconds" }
                    },
                    "required": ["url"]
                }),
            ),
        ];
        if self.settings.search_api_key.is_some() {
            specs.push(Tool::new(
                "web_search",
                "Search the web and return the top results with title, URL and a content excerpt.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "What to search for" },
                        "max_results": { "type": "integer", "minimum": 1, "maximum": MAX_SEARCH_RESULTS, "description": "Number of results (default 5)" },
                        "topic": { "type": "string", "enum": SEARCH_TOPICS, "description": "Search category (default general)" },
                        "include_raw_content": { "type": "boolean", "description": "Include the full page text of each result" }
                    },
                    "required": ["query"]
                }),
            ));
        }
        specs
    }

    async fn exec_ls(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let dir = self.resolve(call.str_arg("path").unwrap_or("."));
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        let count = entries.len();
        let content = if entries.is_empty() {
            format!("{} is empty", dir.display())
        } else {
            entries.join("\n")
        };
        Ok(ToolOutput::text(content).with_data(json!({ "count": count })))
    }

    async fn exec_read_file(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let path = self.resolve(required_str(call, "file_path")?);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        let offset = call.arguments.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = call
            .arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_READ_LIMIT);

        let total = content.lines().count();
        if total == 0 {
            return Ok(ToolOutput::text(format!("{} is empty", path.display())));
        }
        if offset >= total {
            return Err(ToolError::validation(format!(
                "offset {offset} is past the end of {} ({total} lines)",
                path.display()
            )));
        }

        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(i, line)| format!("{:>6}\t{line}", i + 1))
            .collect();
        let end = offset + numbered.len();

        let mut out = numbered.join("\n");
        if end < total {
            out.push_str(&format!(
                "\n\n[showing lines {}-{end} of {total}; pass offset={end} to continue]",
                offset + 1
            ));
        }
        Ok(ToolOutput::text(out).with_data(json!({ "total_lines": total })))
    }

    // ── Search ─────────────────────────────────────────────────

    async fn exec_glob(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let pattern = required_str(call, "pattern")?;
        let root = self.resolve(call.str_arg("path").unwrap_or("."));
        tokio::fs::metadata(&root)
            .await
            .map_err(|e| io_error(&root, e))?;
        let matcher = GlobMatcher::new(pattern)?;

        let walk_root = root.clone();
        let mut found = tokio::task::spawn_blocking(move || {
            walk_files(walk_root.clone())
                .filter(|path| matcher.matches(&walk_root, path))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ToolError::failed(format!("glob worker failed: {e}")))?;

        if found.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No files matching '{pattern}' under {}",
                root.display()
            )));
        }
        // Sorted before the cut so the kept subset is stable across runs.
        found.sort();
        let total = found.len();
        let truncated = total > MAX_GLOB_RESULTS;
        found.truncate(MAX_GLOB_RESULTS);

        let mut out: Vec<String> = found.iter().map(|p| p.display().to_string()).collect();
        if truncated {
            out.push(format!(
                "[showing the first {MAX_GLOB_RESULTS} of {total} files; narrow the pattern]"
            ));
        }
        Ok(ToolOutput::text(out.join("\n"))
            .with_data(json!({ "count": found.len(), "total": total })))
    }

    async fn exec_grep(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let pattern = required_str(call, "pattern")?;
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::validation(format!("invalid regex '{pattern}': {e}")))?;
        let root = self.resolve(call.str_arg("path").unwrap_or("."));
        tokio::fs::metadata(&root)
            .await
            .map_err(|e| io_error(&root, e))?;
        let filter = call.str_arg("glob").map(GlobMatcher::new).transpose()?;

        let walk_root = root.clone();
        let (hits, truncated) = tokio::task::spawn_blocking(move || {
            let mut hits = Vec::new();
            for path in walk_files(walk_root.clone()) {
                if filter.as_ref().is_some_and(|f| !f.matches(&walk_root, &path)) {
                    continue;
                }
                // Binary and unreadable files are skipped.
                let Ok(text) = std::fs::read_to_string(&path) else {
                    continue;
                };
                for (i, line) in text.lines().enumerate() {
                    if !regex.is_match(line) {
                        continue;
                    }
                    let line: String = line.trim_end().chars().take(MAX_GREP_LINE_CHARS).collect();
                    hits.push(format!("{}:{}:{line}", path.display(), i + 1));
                    if hits.len() >= MAX_GREP_MATCHES {
                        return (hits, true);
                    }
                }
            }
            (hits, false)
        })
        .await
        .map_err(|e| ToolError::failed(format!("grep worker failed: {e}")))?;

        if hits.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No matches for '{pattern}' in {}",
                root.display()
            )));
        }
        let count = hits.len();
        let mut out = hits.join("\n");
        if truncated {
            out.push_str(&format!("\n[stopped after {MAX_GREP_MATCHES} matches]"));
        }
        Ok(ToolOutput::text(out).with_data(json!({ "count": count })))
    }

    // ── Mutations ──────────────────────────────────────────────

    async fn exec_write_file(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let path = self.resolve(required_str(call, "file_path")?);
        let content = required_str(call, "content")?;

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(path = %path.display(), bytes = content.len(), "wrote file");
        let verb = if existed { "Updated" } else { "Created" };
        Ok(ToolOutput::text(format!(
            "{verb} {} ({} lines)",
            path.display(),
            content.lines().count()
        ))
        .with_data(json!({ "bytes": content.len(), "created": !existed })))
    }

    async fn exec_edit_file(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let path = self.resolve(required_str(call, "file_path")?);
        let old_string = required_str(call, "old_string")?;
        let new_string = required_str(call, "new_string")?;
        let replace_all = call
            .arguments
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if old_string.is_empty() {
            return Err(ToolError::validation("old_string must not be empty"));
        }
        if old_string == new_string {
            return Err(ToolError::validation("old_string and new_string are identical"));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        let occurrences = content.matches(old_string).count();
        match occurrences {
            0 => {
                return Err(ToolError::validation(format!(
                    "old_string not found in {}. Match the exact text, including whitespace and indentation.",
                    path.display()
                )));
            }
            n if n > 1 && !replace_all => {
                return Err(ToolError::validation(format!(
                    "old_string occurs {n} times in {}. Include more surrounding context to make it unique, or set replace_all.",
                    path.display()
                )));
            }
            _ => {}
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };
        tokio::fs::write(&path, &updated)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(path = %path.display(), occurrences, "edited file");
        let replaced = if replace_all { occurrences } else { 1 };
        Ok(ToolOutput::text(format!(
            "Edited {} ({replaced} replacement{})",
            path.display(),
            if replaced == 1 { "" } else { "s" }
        ))
        .with_data(json!({ "replacements": replaced })))
    }

    async fn exec_shell(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let command = required_str(call, "command")?;
        let dir = call
            .str_arg("working_dir")
            .map(|d| self.resolve(d))
            .unwrap_or_else(|| self.cwd.clone());
        let timeout = self.settings.shell_timeout;

        info!(command, dir = %dir.display(), timeout_secs = timeout.as_secs(), "executing shell command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&dir)
            // Interactive programs fail fast instead of hanging.
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                ToolError::timeout(format!(
                    "command timed out after {}s: {command}",
                    timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| ToolError::failed(format!("could not start shell in {}: {e}", dir.display())))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        let content = format!(
            "Exit code: {exit_code}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
            clip(&stdout, self.settings.max_output_chars),
            clip(&stderr, self.settings.max_output_chars / 3),
        );

        if output.status.success() {
            Ok(ToolOutput::text(content).with_data(json!({ "exit_code": exit_code })))
        } else {
            Err(ToolError::failed(content))
        }
    }

    // ── Network ────────────────────────────────────────────────

    async fn exec_fetch_url(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let url = parse_url(required_str(call, "url")?)?;
        let timeout = self.call_timeout(call);
        info!(%url, timeout_secs = timeout.as_secs(), "fetching URL");

        let response = self
            .http
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;
        let status = response.status();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;

        if !status.is_success() {
            return Err(ToolError::failed(format!(
                "HTTP {status} from {url}: {}",
                clip(&body, 500)
            )));
        }

        let text = if is_html { html_to_text(&body) } else { body };
        Ok(ToolOutput::text(clip(&text, self.settings.max_output_chars))
            .with_data(json!({ "status": status.as_u16(), "url": url.as_str() })))
    }

    async fn exec_http_request(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let url = parse_url(required_str(call, "url")?)?;
        let method_name = call.str_arg("method").unwrap_or("GET").to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ToolError::validation(format!("invalid HTTP method '{method_name}'")))?;
        let timeout = self.call_timeout(call);

        let mut request = self.http.request(method.clone(), url.clone()).timeout(timeout);
        if let Some(headers) = call.arguments.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(name.as_str(), value);
            }
        }
        if let Some(body) = call.str_arg("body") {
            request = request.body(body.to_string());
        }

        info!(%method, %url, "sending HTTP request");
        let response = request
            .send()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;

        Ok(ToolOutput::text(format!(
            "HTTP {status}\n\n{}",
            clip(&body, self.settings.max_output_chars)
        ))
        .with_data(json!({ "status": status.as_u16() })))
    }

    async fn exec_web_search(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let query = required_str(call, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::validation("query must not be empty"));
        }
        let max_results = call
            .arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .clamp(1, MAX_SEARCH_RESULTS);
        let topic = call.str_arg("topic").unwrap_or("general");
        if !SEARCH_TOPICS.contains(&topic) {
            return Err(ToolError::validation(format!(
                "unknown topic '{topic}' (expected one of: {})",
                SEARCH_TOPICS.join(", ")
            )));
        }
        let include_raw = call
            .arguments
            .get("include_raw_content")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let Some(key) = self.settings.search_api_key.as_deref() else {
            return Err(ToolError::failed(
                "web search is not configured (set services.tavily_api_key or TAVILY_API_KEY)",
            ));
        };
        let url = parse_url(&self.settings.search_url)?;
        let timeout = self.settings.fetch_timeout;

        info!(query, max_results, topic, "searching the web");
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(key)
            .timeout(timeout)
            .json(&json!({
                "query": query,
                "max_results": max_results,
                "topic": topic,
                "include_raw_content": include_raw,
            }))
            .send()
            .await
            .map_err(|e| request_error(&url, timeout, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::failed(format!(
                "search failed with HTTP {status}: {}",
                clip(&body, 500)
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("unreadable search response: {e}")))?;

        let results = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(ToolOutput::text(clip(
            &format_search_results(query, &results, include_raw),
            self.settings.max_output_chars,
        ))
        .with_data(json!({ "count": results.len() })))
    }
}

/// Render search hits as a numbered list: title, URL, then the excerpt.
fn format_search_results(query: &str, results: &[Value], include_raw: bool) -> String {
    if results.is_empty() {
        return format!("No results for '{query}'");
    }
    let field = |hit: &Value, key: &str| {
        hit.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };
    let mut out = Vec::with_capacity(results.len());
    for (i, hit) in results.iter().enumerate() {
        let mut entry = format!(
            "{}. {}\n   {}\n   {}",
            i + 1,
            field(hit, "title"),
            field(hit, "url"),
            field(hit, "content")
        );
        let raw = field(hit, "raw_content");
        if include_raw && !raw.is_empty() {
            entry.push_str(&format!("\n\n{raw}"));
        }
        out.push(entry);
    }
    out.join("\n\n")
}

#[async_trait]
impl ToolExecutor for BuiltinTools {
    fn tools(&self) -> Vec<Tool> {
        self.specs()
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        debug!(tool = %call.tool_name, call_id = %call.id, "executing builtin tool");
        match call.tool_name.as_str() {
            "ls" => self.exec_ls(call).await,
            "read_file" => self.exec_read_file(call).await,
            "glob" => self.exec_glob(call).await,
            "grep" => self.exec_grep(call).await,
            "write_file" => self.exec_write_file(call).await,
            "edit_file" => self.exec_edit_file(call).await,
            "shell" => self.exec_shell(call).await,
            "fetch_url" => self.exec_fetch_url(call).await,
            "http_request" => self.exec_http_request(call).await,
            "web_search" => self.exec_web_search(call).await,
            other => Err(ToolError::not_found(format!("unknown tool '{other}'"))),
        }
    }
}

fn required_str<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, ToolError> {
    call.str_arg(key)
        .ok_or_else(|| ToolError::validation(format!("missing '{key}' argument")))
}

fn io_error(path: &Path, e: std::io::Error) -> ToolError {
    let mut err = ToolError::from(e);
    err.message = format!("{}: {}", path.display(), err.message);
    err
}

fn parse_url(raw: &str) -> Result<reqwest::Url, ToolError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ToolError::validation(format!("invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::validation(format!(
            "unsupported URL scheme '{other}' (expected http or https)"
        ))),
    }
}

fn request_error(url: &reqwest::Url, timeout: Duration, e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::timeout(format!("{url} did not respond within {}s", timeout.as_secs()))
    } else {
        ToolError::failed(format!("request to {url} failed: {e}"))
    }
}

/// Cut `text` to `max` characters with a marker. 0 means no limit.
pub(crate) fn clip(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if max == 0 || total <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{kept}\n\n[... output truncated: {} more characters ...]", total - max)
}

/// Every regular file under `root`, skipping [`SKIP_DIRS`]. A file root
/// yields just itself.
fn walk_files(root: PathBuf) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

/// Shell-style glob compiled to a regex. Supports `*`, `**`, `?` and
/// `{a,b}`. Patterns without `/` are matched against the file name only.
#[derive(Debug, Clone)]
struct GlobMatcher {
    regex: Regex,
    name_only: bool,
}

impl GlobMatcher {
    fn new(glob: &str) -> Result<Self, ToolError> {
        let mut re = String::from("^");
        let mut chars = glob.chars().peekable();
        let mut braces = 0usize;
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                }
                '*' => re.push_str("[^/]*"),
                '?' => re.push_str("[^/]"),
                '{' => {
                    braces += 1;
                    re.push_str("(?:");
                }
                '}' if braces > 0 => {
                    braces -= 1;
                    re.push(')');
                }
                ',' if braces > 0 => re.push('|'),
                c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        re.push('$');

        let regex = Regex::new(&re)
            .map_err(|e| ToolError::validation(format!("invalid glob '{glob}': {e}")))?;
        Ok(Self {
            regex,
            name_only: !glob.contains('/'),
        })
    }

    fn matches(&self, root: &Path, path: &Path) -> bool {
        if self.name_only {
            return path
                .file_name()
                .is_some_and(|n| self.regex.is_match(&n.to_string_lossy()));
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        let rel = rel.to_string_lossy().replace('\\', "/");
        self.regex.is_match(&rel)
    }
}

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template"];

/// Elements that start a new line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tr", "ul",
];

/// Strip an HTML page down to readable text: the body's text without
/// scripts or styles, one line per block element.
pub(crate) fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut text = String::new();
    for node in body.descendants() {
        match node.value() {
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => {
                text.push('\n')
            }
            Node::Text(fragment) => {
                let hidden = node.ancestors().any(|parent| {
                    parent
                        .value()
                        .as_element()
                        .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
                });
                if !hidden {
                    text.push_str(fragment);
                }
            }
            _ => {}
        }
    }

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
