//! Azure CLI based credential.
//!
//! Shells out to `az account get-access-token`. When no tenant is configured the
//! currently logged-in tenant is looked up first with `az account show`.
//! Process execution goes through [`CommandRunner`] so the parsing and stderr
//! classification can be exercised without a real CLI installed.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::auth::{Token, TokenCredential, epoch_seconds, scope_to_resource};
use crate::config::CredentialEnv;
use crate::error::{AuthError, Result};

const CLI_PROGRAM: &str = "az";
const DEFAULT_TENANT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

static NOT_INSTALLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"az:(.*)not found|^'az' is not recognized").expect("valid not-installed pattern")
});
static LOGIN_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)az login(.*)").expect("valid login pattern"));
static SCOPED_LOGIN_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"az login --scope").expect("valid scoped-login pattern"));
static VALID_TENANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z.-]+$").expect("valid tenant pattern"));
static VALID_RESOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_.:/-]+$").expect("valid resource pattern"));

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, aborting after `timeout`.
    ///
    /// A program that cannot be started maps to [`AuthError::CliNotInstalled`],
    /// an expired deadline to [`AuthError::Timeout`].
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput>;
}

/// Runs commands through the platform shell (`sh -c` / `cmd /C`).
///
/// Arguments are joined verbatim; callers must only pass shell-safe values.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    fn working_dir() -> PathBuf {
        if cfg!(windows) {
            std::env::var_os("SYSTEMROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(r"C:\Windows"))
        } else {
            PathBuf::from("/bin")
        }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut command_line = program.to_string();
        for arg in args {
            command_line.push(' ');
            command_line.push_str(arg);
        }

        let mut command = if cfg!(windows) {
            let mut c = tokio::process::Command::new("cmd");
            c.arg("/C").arg(&command_line);
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.arg("-c").arg(&command_line);
            c
        };
        command
            .current_dir(Self::working_dir())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(target: "azure_rest_auth::cli", %program, timeout_ms = timeout.as_millis() as u64, "spawning command");

        match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => Err(AuthError::Timeout {
                context: format!("AzureCliCredential ({program})"),
                timeout,
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(
                AuthError::CliNotInstalled(format!("failed to start '{program}': {e}")),
            ),
            Ok(Err(e)) => Err(AuthError::ProcessError(format!(
                "failed to start '{program}': {e}"
            ))),
            Ok(Ok(output)) => Ok(CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
        }
    }
}

/// How the CLI's stderr should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StderrKind {
    NotInstalled,
    NotLoggedIn,
    Other,
}

/// Classify CLI stderr. A scope-specific `az login --scope` hint is not a
/// blocking login error; only the bare login prompt is.
pub(crate) fn classify_stderr(stderr: &str) -> StderrKind {
    let stderr = stderr.trim();
    if NOT_INSTALLED.is_match(stderr) {
        StderrKind::NotInstalled
    } else if LOGIN_PROMPT.is_match(stderr) && !SCOPED_LOGIN_HINT.is_match(stderr) {
        StderrKind::NotLoggedIn
    } else {
        StderrKind::Other
    }
}

#[derive(Debug, Deserialize)]
struct CliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(rename = "expiresOn", default)]
    expires_on_text: Option<String>,
    #[serde(rename = "tokenType", default)]
    token_type: Option<String>,
}

/// Parse `az account get-access-token` output. The numeric `expires_on` wins
/// when it is a valid number; otherwise `expiresOn` is parsed as a date.
pub(crate) fn parse_cli_token(stdout: &str) -> Result<Token> {
    let response: CliTokenResponse = serde_json::from_str(stdout.trim()).map_err(|e| {
        AuthError::ParseError(format!("AzureCliCredential: invalid CLI output: {e}"))
    })?;

    let expires_at = epoch_seconds(response.expires_on.as_ref())
        .or_else(|| response.expires_on_text.as_deref().and_then(parse_cli_date))
        .ok_or_else(|| {
            AuthError::ParseError(
                "AzureCliCredential: CLI output has no usable expiry (expires_on / expiresOn)"
                    .to_string(),
            )
        })?;

    Ok(Token::new(response.access_token, expires_at)?.with_token_type(response.token_type))
}

/// `expiresOn` is either RFC 3339 or the CLI's local `YYYY-MM-DD HH:MM:SS.ffffff`.
fn parse_cli_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Options for [`AzureCliCredential`].
#[derive(Debug, Clone)]
pub struct AzureCliOptions {
    /// Tenant to request the token for; the logged-in tenant when `None`.
    pub tenant_id: Option<String>,
    pub tenant_query_timeout: Duration,
    pub token_timeout: Duration,
}

impl Default for AzureCliOptions {
    fn default() -> Self {
        Self {
            tenant_id: None,
            tenant_query_timeout: DEFAULT_TENANT_QUERY_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }
}

impl AzureCliOptions {
    pub fn from_config(env: &CredentialEnv) -> Self {
        Self {
            tenant_id: env.tenant_id.clone(),
            ..Self::default()
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub const fn with_tenant_query_timeout(mut self, timeout: Duration) -> Self {
        self.tenant_query_timeout = timeout;
        self
    }

    pub const fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }
}

/// Obtains tokens from the locally logged-in Azure CLI.
#[derive(Clone)]
pub struct AzureCliCredential {
    options: AzureCliOptions,
    runner: Arc<dyn CommandRunner>,
}

impl AzureCliCredential {
    pub fn new(options: AzureCliOptions) -> Self {
        Self::with_runner(options, Arc::new(ShellCommandRunner))
    }

    pub fn with_runner(options: AzureCliOptions, runner: Arc<dyn CommandRunner>) -> Self {
        Self { options, runner }
    }

    pub fn from_env() -> Self {
        Self::new(AzureCliOptions::from_config(&CredentialEnv::from_env()))
    }

    async fn logged_in_tenant(&self) -> Result<String> {
        let args = ["account", "show", "--query", "tenantId", "--output", "tsv"].map(String::from);
        let output = self
            .runner
            .run(CLI_PROGRAM, &args, self.options.tenant_query_timeout)
            .await?;

        if classify_stderr(&output.stderr) == StderrKind::NotInstalled {
            return Err(AuthError::CliNotInstalled(
                "Azure CLI not found on PATH. Install it from https://aka.ms/azure-cli".to_string(),
            ));
        }
        let tenant = output.stdout.trim();
        if !output.success || tenant.is_empty() {
            return Err(AuthError::CliNotLoggedIn(format!(
                "could not determine the logged-in tenant, please run 'az login': {}",
                output.stderr.trim()
            )));
        }
        Ok(tenant.to_string())
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> Result<Token> {
        let resource = scope_to_resource(scope);
        if !VALID_RESOURCE.is_match(resource) {
            return Err(AuthError::ConfigurationError(format!(
                "AzureCliCredential: scope contains unsupported characters: {scope}"
            )));
        }

        let tenant = match &self.options.tenant_id {
            Some(tenant) => tenant.clone(),
            None => self.logged_in_tenant().await?,
        };
        if !VALID_TENANT.is_match(&tenant) {
            return Err(AuthError::ConfigurationError(format!(
                "AzureCliCredential: invalid tenant id: {tenant}"
            )));
        }

        let args = [
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            resource,
            "--tenant",
            tenant.as_str(),
        ]
        .map(String::from);
        let output = self
            .runner
            .run(CLI_PROGRAM, &args, self.options.token_timeout)
            .await?;

        match classify_stderr(&output.stderr) {
            StderrKind::NotInstalled => {
                return Err(AuthError::CliNotInstalled(
                    "Azure CLI not found on PATH. Install it from https://aka.ms/azure-cli"
                        .to_string(),
                ));
            }
            StderrKind::NotLoggedIn => {
                return Err(AuthError::CliNotLoggedIn(
                    "Please run 'az login' from a command prompt to authenticate before using this credential."
                        .to_string(),
                ));
            }
            StderrKind::Other => {}
        }

        match parse_cli_token(&output.stdout) {
            Ok(token) => Ok(token),
            Err(_) if !output.stderr.trim().is_empty() => {
                Err(AuthError::ProcessError(output.stderr.trim().to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedRunner {
        replies: Mutex<VecDeque<Result<CommandOutput>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(replies: Vec<Result<CommandOutput>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput> {
            assert_eq!(program, "az");
            self.calls.lock().unwrap().push(args.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected command")
        }
    }

    fn ok(stdout: &str, stderr: &str) -> Result<CommandOutput> {
        Ok(CommandOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    fn failed(stderr: &str) -> Result<CommandOutput> {
        Ok(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    const TOKEN_JSON: &str = r#"{"accessToken":"cli-token","expiresOn":"2023-11-14 22:13:20.000000","expires_on":1700000000,"tokenType":"Bearer","tenant":"t1"}"#;

    fn credential(runner: Arc<ScriptedRunner>, tenant: Option<&str>) -> AzureCliCredential {
        let options = AzureCliOptions {
            tenant_id: tenant.map(String::from),
            ..AzureCliOptions::default()
        };
        AzureCliCredential::with_runner(options, runner)
    }

    #[tokio::test]
    async fn uses_configured_tenant_and_strips_default_scope() {
        let runner = ScriptedRunner::new(vec![ok(TOKEN_JSON, "")]);
        let cred = credential(runner.clone(), Some("tenant-1"));

        let token = cred
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap();
        assert_eq!(token.access_token(), "cli-token");
        assert_eq!(token.expires_at().timestamp_millis(), 1_700_000_000_000);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                "https://management.azure.com",
                "--tenant",
                "tenant-1"
            ]
        );
    }

    #[tokio::test]
    async fn queries_logged_in_tenant_when_unset() {
        let runner = ScriptedRunner::new(vec![ok("tenant-from-cli\n", ""), ok(TOKEN_JSON, "")]);
        let cred = credential(runner.clone(), None);

        cred.get_token("https://vault.azure.net/.default")
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][..2], ["account", "show"]);
        assert_eq!(calls[1].last().map(String::as_str), Some("tenant-from-cli"));
    }

    #[tokio::test]
    async fn tenant_query_failure_is_not_logged_in() {
        let runner = ScriptedRunner::new(vec![failed("ERROR: Please run 'az login' to setup account.")]);
        let err = credential(runner, None)
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CliNotLoggedIn(_)), "{err}");
    }

    #[tokio::test]
    async fn scoped_login_hint_is_not_a_login_error() {
        let stderr = "WARNING: run az login --scope https://management.azure.com/.default to refresh";
        let runner = ScriptedRunner::new(vec![ok(TOKEN_JSON, stderr)]);
        let token = credential(runner, Some("t1"))
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap();
        assert_eq!(token.access_token(), "cli-token");
    }

    #[tokio::test]
    async fn bare_login_prompt_is_a_login_error() {
        let runner = ScriptedRunner::new(vec![failed("ERROR: Please run 'az login' to setup account.")]);
        let err = credential(runner, Some("t1"))
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CliNotLoggedIn(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_cli_is_reported_distinctly() {
        let runner = ScriptedRunner::new(vec![failed("/bin/sh: 1: az: not found")]);
        let err = credential(runner, Some("t1"))
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CliNotInstalled(_)), "{err}");
    }

    #[tokio::test]
    async fn unparsable_output_surfaces_stderr() {
        let runner = ScriptedRunner::new(vec![failed("ERROR: AADSTS70043: The refresh token has expired")]);
        let err = credential(runner, Some("t1"))
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProcessError(ref m) if m.contains("AADSTS70043")));
    }

    #[tokio::test]
    async fn unsafe_tenant_is_rejected_without_spawning() {
        let runner = ScriptedRunner::new(vec![]);
        let err = credential(runner.clone(), Some("t1; rm -rf /"))
            .get_token("https://management.azure.com/.default")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ConfigurationError(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn numeric_expiry_wins() {
        let token = parse_cli_token(
            r#"{"accessToken":"a","expires_on":"1700000000","expiresOn":"2001-01-01 00:00:00.000000"}"#,
        )
        .unwrap();
        assert_eq!(token.expires_at().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn unparsable_numeric_expiry_falls_back_to_date() {
        let token = parse_cli_token(
            r#"{"accessToken":"a","expires_on":"soon","expiresOn":"2023-11-14T22:13:20Z"}"#,
        )
        .unwrap();
        assert_eq!(token.expires_at().timestamp(), 1_700_000_000);

        let local = parse_cli_token(r#"{"accessToken":"a","expiresOn":"2023-11-14 22:13:20.000000"}"#)
            .unwrap();
        let expected = Local
            .from_local_datetime(
                &NaiveDateTime::parse_from_str("2023-11-14 22:13:20", "%Y-%m-%d %H:%M:%S").unwrap(),
            )
            .earliest()
            .unwrap();
        assert_eq!(local.expires_at(), expected.with_timezone(&Utc));
    }

    #[test]
    fn missing_expiry_is_a_parse_error() {
        let err = parse_cli_token(r#"{"accessToken":"a"}"#).unwrap_err();
        assert!(matches!(err, AuthError::ParseError(_)));
    }

    #[test]
    fn classifies_stderr() {
        assert_eq!(classify_stderr("az: command not found"), StderrKind::NotInstalled);
        assert_eq!(
            classify_stderr("'az' is not recognized as an internal or external command"),
            StderrKind::NotInstalled
        );
        assert_eq!(classify_stderr("Please run 'az login'"), StderrKind::NotLoggedIn);
        assert_eq!(
            classify_stderr("Run 'az login --scope https://x/.default'"),
            StderrKind::Other
        );
        assert_eq!(classify_stderr(""), StderrKind::Other);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_captures_output() {
        let out = ShellCommandRunner
            .run("echo", &["hello".to_string()], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_enforces_timeout() {
        let err = ShellCommandRunner
            .run("sleep", &["5".to_string()], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }
}
