//! Seam to the language toolchain that installs and loads project code.
//!
//! The pipeline never interprets user code itself. Installing dependencies,
//! probing that the entry module loads, describing an API module and running
//! its post-deploy hook all go through [`Toolchain`], so tests can substitute
//! a scripted implementation.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use funcdeploy_protocol::HookOutcome;
use tracing::debug;

use crate::error::PackageError;
use crate::module::ModuleDescription;

pub type ToolchainFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PackageError>> + Send + 'a>>;

/// Options for a clean dependency installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Install dependencies flagged optional.
    pub optional: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self { optional: true }
    }
}

/// Result of loading an entry module in a fresh process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    pub stderr: String,
}

pub trait Toolchain: Send + Sync {
    /// Clean production install of the manifest's dependencies into `dir`.
    fn install(&self, dir: &Path, options: InstallOptions) -> ToolchainFuture<'_, ()>;

    /// Loads `./<entry>` from `dir` in a separate process whose environment
    /// additionally holds `env`.
    fn probe(
        &self,
        dir: &Path,
        entry: &str,
        env: &BTreeMap<String, String>,
    ) -> ToolchainFuture<'_, ProbeResult>;

    /// Reports which optional capabilities `module` exports. The module is
    /// loaded with `env` applied, as in [`Toolchain::probe`].
    fn describe_module(
        &self,
        dir: &Path,
        module: &str,
        env: &BTreeMap<String, String>,
    ) -> ToolchainFuture<'_, ModuleDescription>;

    /// Invokes the module's post-deploy hook with the event and options.
    fn run_post_deploy(
        &self,
        dir: &Path,
        module: &str,
        event: &serde_json::Value,
        options: &serde_json::Value,
        env: &BTreeMap<String, String>,
    ) -> ToolchainFuture<'_, HookOutcome>;
}

/// A program and its fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Commands used by [`CommandToolchain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Clean production install.
    pub install: CommandSpec,
    /// Appended to `install` when optional dependencies are skipped.
    pub skip_optional_arg: String,
    /// Evaluates a script given as the next argument (`node -e`).
    pub eval: CommandSpec,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            install: CommandSpec::new("npm", &["install", "--production"]),
            skip_optional_arg: "--no-optional".to_string(),
            eval: CommandSpec::new("node", &["-e"]),
        }
    }
}

/// Toolchain backed by external processes.
#[derive(Debug, Clone, Default)]
pub struct CommandToolchain {
    config: ToolchainConfig,
}

struct Output {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CommandToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    async fn eval(
        &self,
        dir: PathBuf,
        script: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Result<Output, PackageError> {
        let output = tokio::process::Command::new(&self.config.eval.program)
            .args(&self.config.eval.args)
            .arg(script)
            .args(args)
            .envs(env)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                PackageError::Toolchain(format!(
                    "failed to start {}: {e}",
                    self.config.eval.program
                ))
            })?;
        Ok(Output {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Toolchain for CommandToolchain {
    fn install(&self, dir: &Path, options: InstallOptions) -> ToolchainFuture<'_, ()> {
        let dir = dir.to_path_buf();
        Box::pin(async move {
            let spec = &self.config.install;
            let mut command = tokio::process::Command::new(&spec.program);
            command.args(&spec.args);
            if !options.optional {
                command.arg(&self.config.skip_optional_arg);
            }
            debug!(dir = %dir.display(), program = %spec.program, "installing dependencies");

            let output = command
                .current_dir(&dir)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| PackageError::Install(format!("failed to start {}: {e}", spec.program)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(PackageError::Install(format!(
                    "{} exited with {}: {}",
                    spec.program,
                    output.status,
                    stderr.trim()
                )));
            }
            Ok(())
        })
    }

    fn probe(
        &self,
        dir: &Path,
        entry: &str,
        env: &BTreeMap<String, String>,
    ) -> ToolchainFuture<'_, ProbeResult> {
        let dir = dir.to_path_buf();
        let script = probe_script(entry);
        let env = env.clone();
        Box::pin(async move {
            let output = self.eval(dir, script, Vec::new(), env).await?;
            Ok(ProbeResult {
                success: output.success,
                stderr: output.stderr,
            })
        })
    }

    fn describe_module(
        &self,
        dir: &Path,
        module: &str,
        env: &BTreeMap<String, String>,
    ) -> ToolchainFuture<'_, ModuleDescription> {
        let dir = dir.to_path_buf();
        let script = describe_script(module);
        let module = module.to_string();
        let env = env.clone();
        Box::pin(async move {
            let output = self.eval(dir, script, Vec::new(), env).await?;
            if !output.success {
                return Err(PackageError::Module(format!(
                    "cannot load {module}: {}",
                    output.stderr.trim()
                )));
            }
            Ok(serde_json::from_str(output.stdout.trim())?)
        })
    }

    fn run_post_deploy(
        &self,
        dir: &Path,
        module: &str,
        event: &serde_json::Value,
        options: &serde_json::Value,
        env: &BTreeMap<String, String>,
    ) -> ToolchainFuture<'_, HookOutcome> {
        let dir = dir.to_path_buf();
        let script = post_deploy_script(module);
        let args = vec![event.to_string(), options.to_string()];
        let env = env.clone();
        Box::pin(async move {
            let output = self.eval(dir, script, args, env).await?;
            parse_hook_output(&output.stdout, output.success, &output.stderr)
        })
    }
}

fn require_path(module: &str) -> String {
    let quoted = serde_json::Value::String(format!("./{module}")).to_string();
    format!("require({quoted})")
}

fn probe_script(entry: &str) -> String {
    require_path(entry)
}

fn describe_script(module: &str) -> String {
    format!(
        "const m = {}; \
         const cfg = typeof m.apiConfig === 'function' ? m.apiConfig() : null; \
         process.stdout.write(JSON.stringify({{ \
           apiConfig: cfg, \
           hasProxyRouter: typeof m.proxyRouter === 'function', \
           hasRouter: typeof m.router === 'function', \
           hasPostDeploy: typeof m.postDeploy === 'function' \
         }}));",
        require_path(module)
    )
}

fn post_deploy_script(module: &str) -> String {
    format!(
        "const m = {}; \
         const out = (status, value) => process.stdout.write(JSON.stringify({{ status, value }})); \
         Promise.resolve() \
           .then(() => m.postDeploy(JSON.parse(process.argv[1]), JSON.parse(process.argv[2]))) \
           .then(v => out('succeeded', v === undefined ? null : v), \
                 e => out('failed', String((e && e.message) || e)));",
        require_path(module)
    )
}

/// Decodes the tagged outcome a post-deploy process writes to stdout.
fn parse_hook_output(stdout: &str, success: bool, stderr: &str) -> Result<HookOutcome, PackageError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        let detail = if success { "post-deploy hook produced no result" } else { stderr.trim() };
        return Ok(HookOutcome::Failed(detail.to_string()));
    }
    Ok(serde_json::from_str(trimmed)?)
}
