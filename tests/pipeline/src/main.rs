fn main() {
    println!("Run `cargo test -p pipeline-scenarios` to execute end-to-end deploy scenarios.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use funcdeploy_deploy::{DeployError, DeployOrchestrator, UpdateOptions, stage};
    use funcdeploy_gateway::stage_url;
    use funcdeploy_package::{
        InstallOptions, ModuleDescription, PackageError, ProbeResult, Toolchain, ToolchainFuture,
        copy_project,
    };
    use funcdeploy_protocol::{ApiConfig, HookOutcome, RemoteErrorKind, Route};
    use funcdeploy_remote::memory::InMemoryPlatform;
    use funcdeploy_remote::{FunctionStore, RecordingLog, RetryPolicy};
    use serde_json::{Value, json};

    const ACCOUNT: &str = "123456789012";
    const REGION: &str = "us-east-1";

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Stands in for the language toolchain by reading fixture sources.
    ///
    /// An entry loads when `<entry>.js` exists, every bare `require` in it
    /// resolves under `node_modules` and every `process.env.<NAME>` it reads
    /// is set. Route tables come from a `<module>.routes.json` sidecar.
    /// Installing materializes `file:` dependencies with absolute paths.
    #[derive(Default)]
    struct FixtureToolchain {
        installs: Mutex<Vec<InstallOptions>>,
        manifests: Mutex<Vec<Value>>,
        probes: Mutex<Vec<(String, BTreeMap<String, String>)>>,
        hooks: Mutex<Vec<(Value, Value, BTreeMap<String, String>)>>,
    }

    fn required_packages(source: &str) -> Vec<String> {
        source
            .split("require('")
            .skip(1)
            .filter_map(|rest| rest.split('\'').next())
            .filter(|name| !name.starts_with('.'))
            .map(str::to_string)
            .collect()
    }

    fn required_env(source: &str) -> Vec<String> {
        source
            .split("process.env.")
            .skip(1)
            .map(|rest| {
                rest.chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect::<String>()
            })
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn load_failure(source: &str, env: &BTreeMap<String, String>, dir: &Path) -> Option<String> {
        if let Some(missing) = required_packages(source)
            .into_iter()
            .find(|name| !dir.join("node_modules").join(name).is_dir())
        {
            return Some(format!("Cannot find module '{missing}'"));
        }
        required_env(source)
            .into_iter()
            .find(|name| !env.contains_key(name))
            .map(|name| format!("Error: {name} is not set"))
    }

    fn materialize_local_dependencies(dir: &Path) -> Option<Value> {
        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("package.json")).ok()?).ok()?;
        let deps = manifest["dependencies"].as_object().cloned().unwrap_or_default();
        for (name, spec) in deps {
            let Some(target) = spec.as_str().and_then(|s| s.strip_prefix("file:")) else {
                continue;
            };
            if Path::new(target).is_absolute() {
                let installed = dir.join("node_modules").join(&name);
                std::fs::create_dir_all(&installed).unwrap();
                std::fs::write(installed.join("index.js"), b"module.exports = () => 1;").unwrap();
            }
        }
        Some(manifest)
    }

    impl Toolchain for FixtureToolchain {
        fn install(&self, dir: &Path, options: InstallOptions) -> ToolchainFuture<'_, ()> {
            self.installs.lock().unwrap().push(options);
            if let Some(manifest) = materialize_local_dependencies(dir) {
                self.manifests.lock().unwrap().push(manifest);
            }
            Box::pin(async { Ok(()) })
        }

        fn probe(
            &self,
            dir: &Path,
            entry: &str,
            env: &BTreeMap<String, String>,
        ) -> ToolchainFuture<'_, ProbeResult> {
            self.probes
                .lock()
                .unwrap()
                .push((entry.to_string(), env.clone()));
            let result = match std::fs::read_to_string(dir.join(format!("{entry}.js"))) {
                Err(e) => ProbeResult {
                    success: false,
                    stderr: format!("Cannot find module './{entry}': {e}"),
                },
                Ok(source) => match load_failure(&source, env, dir) {
                    Some(stderr) => ProbeResult {
                        success: false,
                        stderr,
                    },
                    None => ProbeResult {
                        success: true,
                        stderr: String::new(),
                    },
                },
            };
            Box::pin(async move { Ok(result) })
        }

        fn describe_module(
            &self,
            dir: &Path,
            module: &str,
            env: &BTreeMap<String, String>,
        ) -> ToolchainFuture<'_, ModuleDescription> {
            let source = std::fs::read_to_string(dir.join(format!("{module}.js"))).unwrap_or_default();
            if let Some(failure) = load_failure(&source, env, dir) {
                return Box::pin(async move { Err(PackageError::Module(failure)) });
            }
            let api_config: Option<ApiConfig> =
                std::fs::read_to_string(dir.join(format!("{module}.routes.json")))
                    .ok()
                    .map(|text| serde_json::from_str(&text).unwrap());
            let description = ModuleDescription {
                api_config,
                has_proxy_router: source.contains("exports.proxyRouter"),
                has_router: source.contains("exports.router"),
                has_post_deploy: source.contains("exports.postDeploy"),
            };
            Box::pin(async move { Ok(description) })
        }

        fn run_post_deploy(
            &self,
            _dir: &Path,
            _module: &str,
            event: &Value,
            options: &Value,
            env: &BTreeMap<String, String>,
        ) -> ToolchainFuture<'_, HookOutcome> {
            self.hooks
                .lock()
                .unwrap()
                .push((event.clone(), options.clone(), env.clone()));
            let result = options.get("postresult").cloned().unwrap_or(Value::Null);
            Box::pin(async move { Ok(HookOutcome::Succeeded(result)) })
        }
    }

    /// A fixture project copied into a scratch directory, plus a platform
    /// already holding its function.
    struct Scenario {
        platform: Arc<InMemoryPlatform>,
        toolchain: Arc<FixtureToolchain>,
        source: tempfile::TempDir,
        work: tempfile::TempDir,
    }

    impl Scenario {
        fn new(fixture: &str) -> Self {
            let platform = Arc::new(InMemoryPlatform::new(ACCOUNT, REGION));
            platform.create_function("f", "main.handler", None);
            let source = tempfile::tempdir().unwrap();
            copy_project(&fixtures_dir().join(fixture), source.path(), true).unwrap();
            Self {
                platform,
                toolchain: Arc::new(FixtureToolchain::default()),
                source,
                work: tempfile::tempdir().unwrap(),
            }
        }

        fn with_config(self, config: Value) -> Self {
            std::fs::write(
                self.source.path().join("funcdeploy.json"),
                serde_json::to_vec_pretty(&config).unwrap(),
            )
            .unwrap();
            self
        }

        fn plain(fixture: &str) -> Self {
            Self::new(fixture).with_config(json!({"function": {"name": "f", "region": REGION}}))
        }

        /// Route-mode project fronted by a fresh API. Returns the api id.
        fn with_api(fixture: &str) -> (Self, String) {
            let scenario = Self::new(fixture);
            let api = scenario.platform.create_api("f");
            let scenario = scenario.with_config(json!({
                "function": {"name": "f", "region": REGION},
                "api": {"id": api, "module": "main"}
            }));
            (scenario, api)
        }

        fn options(&self) -> UpdateOptions {
            UpdateOptions {
                work_root: Some(self.work.path().to_path_buf()),
                ..UpdateOptions::for_source(self.source.path())
            }
        }

        fn orchestrator(&self) -> DeployOrchestrator {
            DeployOrchestrator::new(self.platform.platform(), self.toolchain.clone())
                .with_retry_policy(RetryPolicy::none())
        }

        fn replace_source(&self, fixture: &str) {
            for file in ["main.js", "main.routes.json"] {
                std::fs::copy(fixtures_dir().join(fixture).join(file), self.source.path().join(file))
                    .unwrap();
            }
        }

        fn work_entries(&self) -> usize {
            std::fs::read_dir(self.work.path()).unwrap().count()
        }
    }

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // --- preconditions ---

    #[tokio::test]
    async fn missing_region_fails_before_any_call() {
        let s = Scenario::new("hello-world").with_config(json!({"function": {"name": "f"}}));
        let log = RecordingLog::new();

        let err = s.orchestrator().update(&s.options(), Some(&log)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid configuration -- function.region missing from funcdeploy.json"
        );
        assert!(err.is_precondition());
        assert!(log.all_api_calls().is_empty());
        assert!(log.stage_log(false).is_empty());
        assert_eq!(s.platform.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_env_csv_fails_before_any_call() {
        let s = Scenario::plain("hello-world");
        let opts = UpdateOptions {
            set_env: Some("XPATH,YPATH=/var/lib".into()),
            ..s.options()
        };

        let err = s.orchestrator().update(&opts, None).await.unwrap_err();

        assert!(matches!(err, DeployError::EnvParsing(_)));
        assert_eq!(
            err.to_string(),
            "Cannot read variables from set-env, Invalid CSV element XPATH"
        );
        assert_eq!(s.platform.call_count(), 0);
        assert_eq!(s.work_entries(), 0);
    }

    #[tokio::test]
    async fn temp_directory_source_fails_before_any_call() {
        let s = Scenario::plain("hello-world");
        let log = RecordingLog::new();
        let opts = UpdateOptions {
            source: std::env::temp_dir(),
            ..s.options()
        };

        let err = s.orchestrator().update(&opts, Some(&log)).await.unwrap_err();

        assert!(matches!(err, DeployError::Configuration(_)));
        assert!(err.to_string().starts_with("Source directory is the system temp directory."));
        assert!(log.all_api_calls().is_empty());
        assert_eq!(s.platform.call_count(), 0);
        assert_eq!(s.work_entries(), 0);
    }

    #[tokio::test]
    async fn unresolvable_dependency_publishes_nothing() {
        let s = Scenario::plain("broken-dependency");
        let log = RecordingLog::new();

        let err = s.orchestrator().update(&s.options(), Some(&log)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "cannot require ./main after clean installation. Check your dependencies."
        );
        assert_eq!(s.platform.version_count("f"), 0);
        assert_eq!(s.platform.alias_target("f", "latest"), None);
        assert!(!log.all_api_calls().contains(&"lambda.updateFunctionCode".to_string()));
        assert_eq!(s.work_entries(), 0);
    }

    #[tokio::test]
    async fn missing_api_publishes_nothing() {
        let s = Scenario::new("api-gw-hello").with_config(json!({
            "function": {"name": "f", "region": REGION},
            "api": {"id": "doesnotexist", "module": "main"}
        }));

        let err = s.orchestrator().update(&s.options(), None).await.unwrap_err();

        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotFound));
        assert_eq!(s.platform.version_count("f"), 0);
        assert!(s.toolchain.installs.lock().unwrap().is_empty());
    }

    // --- publication ---

    #[tokio::test]
    async fn each_run_adds_one_version_and_moves_only_its_alias() {
        let s = Scenario::plain("hello-world");
        let orch = s.orchestrator();
        let stable = UpdateOptions {
            version: Some("stable".into()),
            ..s.options()
        };
        orch.update(&stable, None).await.unwrap();

        for expected in 2..=3u64 {
            let before = s.platform.version_count("f");
            let result = orch.update(&s.options(), None).await.unwrap();

            assert_eq!(s.platform.version_count("f"), before + 1);
            assert_eq!(result.version, expected.to_string());
            assert_eq!(
                result.function_arn,
                format!("arn:aws:lambda:{REGION}:{ACCOUNT}:function:f:{expected}")
            );
            assert_eq!(s.platform.alias_target("f", "latest"), Some(expected));
            assert_eq!(s.platform.alias_target("f", "stable"), Some(1));
        }

        let versions: Vec<String> = s
            .platform
            .list_versions("f")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, ["$LATEST", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn published_archive_holds_project_files() {
        let s = Scenario::plain("hello-world");

        s.orchestrator().update(&s.options(), None).await.unwrap();

        let code = s.platform.version_code("f", 1).unwrap();
        assert_eq!(&code[..2], b"PK");
        // Archive stores file names uncompressed in its directory.
        let names = String::from_utf8_lossy(&code);
        assert!(names.contains("main.js"));
        assert!(names.contains("package.json"));
        assert!(!names.contains("funcdeploy-"));
    }

    #[tokio::test]
    async fn environment_is_replaced_then_merged() {
        let s = Scenario::plain("hello-world");
        s.platform
            .create_function("f", "main.handler", Some(env(&[("OLD", "1")])));
        let orch = s.orchestrator();

        let replace = UpdateOptions {
            set_env: Some("XPATH=/var/www,YPATH=/var/lib".into()),
            ..s.options()
        };
        orch.update(&replace, None).await.unwrap();
        assert_eq!(
            s.platform.latest_configuration("f").unwrap().environment,
            Some(env(&[("XPATH", "/var/www"), ("YPATH", "/var/lib")]))
        );

        let merge = UpdateOptions {
            update_env: Some("XPATH=/srv,ZPATH=/opt".into()),
            ..s.options()
        };
        orch.update(&merge, None).await.unwrap();
        assert_eq!(
            s.platform.latest_configuration("f").unwrap().environment,
            Some(env(&[("XPATH", "/srv"), ("YPATH", "/var/lib"), ("ZPATH", "/opt")]))
        );

        // Validation saw the environment the function will run with.
        let probes = s.toolchain.probes.lock().unwrap();
        assert_eq!(probes[1].1.get("ZPATH").map(String::as_str), Some("/opt"));
    }

    #[tokio::test]
    async fn unchanged_configuration_is_not_rewritten() {
        let s = Scenario::plain("hello-world");
        let log = RecordingLog::new();

        s.orchestrator().update(&s.options(), Some(&log)).await.unwrap();

        assert!(
            !log.api_calls_for("lambda", true)
                .contains(&"lambda.updateFunctionConfiguration".to_string())
        );
    }

    #[tokio::test]
    async fn staged_upload_goes_through_object_store() {
        let s = Scenario::plain("hello-world");
        let log = RecordingLog::new();
        let opts = UpdateOptions {
            use_s3_bucket: Some("deploy-artifacts".into()),
            ..s.options()
        };

        let result = s.orchestrator().update(&opts, Some(&log)).await.unwrap();

        let key = result.s3_key.unwrap();
        assert!(key.starts_with("f-") && key.ends_with(".zip"));
        let code = s.platform.version_code("f", 1).unwrap();
        assert_eq!(s.platform.object_size("deploy-artifacts", &key), Some(code.len()));
        assert_eq!(log.api_calls_for("s3", false), vec!["s3.upload".to_string()]);
    }

    #[tokio::test]
    async fn kept_archive_matches_published_code() {
        let s = Scenario::plain("hello-world");
        let opts = UpdateOptions {
            keep: true,
            ..s.options()
        };

        let result = s.orchestrator().update(&opts, None).await.unwrap();

        let archive = result.archive.unwrap();
        assert_eq!(std::fs::read(&archive).unwrap(), s.platform.version_code("f", 1).unwrap());
        assert_eq!(s.work_entries(), 1);
    }

    #[tokio::test]
    async fn stripping_optional_dependencies_skips_them_at_install() {
        let s = Scenario::plain("hello-world");
        let opts = UpdateOptions {
            optional_dependencies: false,
            ..s.options()
        };

        s.orchestrator().update(&opts, None).await.unwrap();

        assert_eq!(
            s.toolchain.installs.lock().unwrap().as_slice(),
            &[InstallOptions { optional: false }]
        );
        assert_eq!(s.platform.version_count("f"), 1);
    }

    #[tokio::test]
    async fn local_dependencies_are_packaged_without_install() {
        let s = Scenario::plain("local-dependency");
        let installed = s.source.path().join("node_modules/greeting");
        std::fs::create_dir_all(&installed).unwrap();
        std::fs::write(installed.join("index.js"), b"module.exports = () => 'hi';").unwrap();
        let opts = UpdateOptions {
            use_local_dependencies: true,
            ..s.options()
        };

        s.orchestrator().update(&opts, None).await.unwrap();

        assert!(s.toolchain.installs.lock().unwrap().is_empty());
        let code = s.platform.version_code("f", 1).unwrap();
        assert!(String::from_utf8_lossy(&code).contains("node_modules/greeting/index.js"));
    }

    #[tokio::test]
    async fn relative_file_dependency_is_rewired_before_install() {
        let s = Scenario::plain("local-dependency");

        s.orchestrator().update(&s.options(), None).await.unwrap();

        let source = std::fs::canonicalize(s.source.path()).unwrap();
        let expected = format!("file:{}", source.parent().unwrap().join("greeting").display());
        let manifests = s.toolchain.manifests.lock().unwrap();
        assert_eq!(manifests[0]["dependencies"]["greeting"], json!(expected));
        // The project itself is left untouched.
        let original: Value =
            serde_json::from_slice(&std::fs::read(s.source.path().join("package.json")).unwrap())
                .unwrap();
        assert_eq!(original["dependencies"]["greeting"], json!("file:../greeting"));
        assert_eq!(s.platform.version_count("f"), 1);
    }

    #[tokio::test]
    async fn set_env_overrides_json_environment() {
        let s = Scenario::plain("hello-world");
        s.platform
            .create_function("f", "main.handler", Some(env(&[("OLD", "1")])));
        let vars = tempfile::tempdir().unwrap();
        let json_path = vars.path().join("env.json");
        std::fs::write(&json_path, r#"{"A":"json","B":"json"}"#).unwrap();
        let opts = UpdateOptions {
            set_env_from_json: Some(json_path),
            set_env: Some("B=csv".into()),
            ..s.options()
        };

        s.orchestrator().update(&opts, None).await.unwrap();

        assert_eq!(
            s.platform.latest_configuration("f").unwrap().environment,
            Some(env(&[("A", "json"), ("B", "csv")]))
        );
    }

    // --- gateway ---

    #[tokio::test]
    async fn api_project_logs_every_stage_and_reports_url() {
        let (s, api) = Scenario::with_api("api-gw-hello");
        let log = RecordingLog::new();

        let result = s.orchestrator().update(&s.options(), Some(&log)).await.unwrap();

        assert_eq!(log.stage_log(false), stage::ALL.to_vec());
        assert_eq!(result.url.as_deref(), Some(stage_url(&api, REGION, "latest").as_str()));
        assert_eq!(
            s.platform.latest_configuration("f").unwrap().handler,
            "main.proxyRouter"
        );
        assert_eq!(
            s.platform.stage_routes(&api, "latest").unwrap(),
            vec![Route {
                path: "/hello".into(),
                method: "GET".into()
            }]
        );
        assert_eq!(s.platform.serving_version(&api, "latest"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_calls_retry_without_changing_stages() {
        let (s, api) = Scenario::with_api("api-gw-hello");
        s.platform.throttle_next(2);
        let log = RecordingLog::new();
        let orch = DeployOrchestrator::new(s.platform.platform(), s.toolchain.clone())
            .with_retry_policy(RetryPolicy {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                ..RetryPolicy::default()
            });

        let result = orch.update(&s.options(), Some(&log)).await.unwrap();

        assert_eq!(result.version, "1");
        assert_eq!(log.stage_log(false), stage::ALL.to_vec());
        assert_eq!(
            log.retry_log(),
            vec![
                ("lambda.getFunctionConfiguration".to_string(), 1),
                ("lambda.getFunctionConfiguration".to_string(), 2),
            ]
        );
        assert_eq!(s.platform.serving_version(&api, "latest"), Some(1));
    }

    #[tokio::test]
    async fn stages_keep_serving_their_own_versions() {
        let (s, api) = Scenario::with_api("api-gw-hello");
        let orch = s.orchestrator();

        let original = UpdateOptions {
            version: Some("original".into()),
            ..s.options()
        };
        orch.update(&original, None).await.unwrap();

        s.replace_source("api-gw-echo");
        let development = UpdateOptions {
            version: Some("development".into()),
            ..s.options()
        };
        orch.update(&development, None).await.unwrap();

        assert_eq!(s.platform.serving_version(&api, "original"), Some(1));
        assert_eq!(s.platform.serving_version(&api, "development"), Some(2));
        let route = |path: &str| Route {
            path: path.into(),
            method: "GET".into(),
        };
        assert_eq!(s.platform.stage_routes(&api, "original").unwrap(), vec![route("/hello")]);
        assert_eq!(s.platform.stage_routes(&api, "development").unwrap(), vec![route("/echo")]);
    }

    #[tokio::test]
    async fn cached_configuration_skips_unchanged_routes() {
        let (s, api) = Scenario::with_api("api-gw-postdeploy");
        let orch = s.orchestrator();
        let opts = UpdateOptions {
            cache_api_config: Some("funcdeployConfig".into()),
            ..s.options()
        };

        let first = orch.update(&opts, None).await.unwrap();
        assert_eq!(first.deploy.map(|d| d.was_api_cache_used), Some(false));
        let digest = s.platform.stage_variables(&api, "latest").unwrap()["funcdeployConfig"].clone();
        assert!(!digest.is_empty());

        let second = orch.update(&opts, None).await.unwrap();
        assert_eq!(second.deploy.map(|d| d.was_api_cache_used), Some(true));
        assert_eq!(s.platform.deployment_count(&api), 1);
        assert_eq!(s.platform.serving_version(&api, "latest"), Some(2));

        std::fs::write(
            s.source.path().join("main.routes.json"),
            r#"{"version":3,"routes":{"postdeploy/hello":{"GET":{},"POST":{}}}}"#,
        )
        .unwrap();
        let third = orch.update(&opts, None).await.unwrap();
        assert_eq!(third.deploy.map(|d| d.was_api_cache_used), Some(false));
        assert_eq!(s.platform.deployment_count(&api), 2);
        assert_ne!(
            s.platform.stage_variables(&api, "latest").unwrap()["funcdeployConfig"],
            digest
        );
    }

    #[tokio::test]
    async fn post_deploy_hook_receives_options_and_deployment() {
        let (s, api) = Scenario::with_api("api-gw-postdeploy");
        let mut opts = s.options();
        opts.post_deploy_options
            .insert("postresult".into(), json!("option-123"));
        opts.post_deploy_options.insert("quiet".into(), json!(true));

        let result = s.orchestrator().update(&opts, None).await.unwrap();

        let report = result.deploy.unwrap();
        assert_eq!(report.result, json!("option-123"));
        assert!(!report.was_api_cache_used);

        let hooks = s.toolchain.hooks.lock().unwrap();
        let (event, options, _) = &hooks[0];
        assert_eq!(event["name"], json!("f"));
        assert_eq!(event["alias"], json!("latest"));
        assert_eq!(event["apiId"], json!(api));
        assert_eq!(event["region"], json!(REGION));
        assert_eq!(options["quiet"], json!(true));
    }

    #[tokio::test]
    async fn proxy_api_forwards_every_path() {
        let s = Scenario::new("hello-world");
        let api = s.platform.create_api("f");
        let s = s.with_config(json!({
            "function": {"name": "f", "region": REGION},
            "api": {"id": api, "isProxy": true}
        }));

        let result = s.orchestrator().update(&s.options(), None).await.unwrap();

        assert!(result.deploy.is_none());
        assert_eq!(
            s.platform.latest_configuration("f").unwrap().handler,
            "main.handler"
        );
        let any = |path: &str| Route {
            path: path.into(),
            method: "ANY".into(),
        };
        assert_eq!(
            s.platform.stage_routes(&api, "latest").unwrap(),
            vec![any("/"), any("/{proxy+}")]
        );
        assert_eq!(s.platform.serving_version(&api, "latest"), Some(1));
    }

    #[tokio::test]
    async fn module_load_and_hook_see_the_function_environment() {
        let (s, _) = Scenario::with_api("api-gw-needs-env");
        let orch = s.orchestrator();

        let err = orch.update(&s.options(), None).await.unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
        assert_eq!(s.platform.version_count("f"), 0);

        let opts = UpdateOptions {
            set_env: Some("NEEDED=yes".into()),
            ..s.options()
        };
        let result = orch.update(&opts, None).await.unwrap();

        assert_eq!(result.version, "1");
        assert!(result.deploy.is_some());
        let hooks = s.toolchain.hooks.lock().unwrap();
        assert_eq!(hooks[0].2, env(&[("NEEDED", "yes")]));
    }

    #[tokio::test]
    async fn router_without_proxy_router_is_rejected_before_mutation() {
        let (s, _) = Scenario::with_api("api-gw-router-only");
        let log = RecordingLog::new();

        let err = s.orchestrator().update(&s.options(), Some(&log)).await.unwrap_err();

        assert!(matches!(err, DeployError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "main does not export proxyRouter; cannot route gateway requests to it"
        );
        assert_eq!(s.platform.version_count("f"), 0);
        assert_eq!(
            s.platform.latest_configuration("f").unwrap().handler,
            "main.handler"
        );
        assert!(
            !log.all_api_calls()
                .contains(&"lambda.updateFunctionConfiguration".to_string())
        );
    }

    #[tokio::test]
    async fn cache_use_is_reported_without_a_hook() {
        let (s, _) = Scenario::with_api("api-gw-hello");
        let orch = s.orchestrator();
        let opts = UpdateOptions {
            cache_api_config: Some("funcdeployConfig".into()),
            ..s.options()
        };

        let first = orch.update(&opts, None).await.unwrap();
        assert!(first.deploy.is_none());
        assert_eq!(first.was_api_cache_used, Some(false));

        let second = orch.update(&opts, None).await.unwrap();
        assert_eq!(second.was_api_cache_used, Some(true));
        assert_eq!(serde_json::to_value(&second).unwrap()["wasApiCacheUsed"], json!(true));

        let plain = Scenario::plain("hello-world");
        let result = plain.orchestrator().update(&plain.options(), None).await.unwrap();
        assert_eq!(result.was_api_cache_used, None);
    }

    #[tokio::test]
    async fn changed_stage_variable_invalidates_cache() {
        let (s, api) = Scenario::with_api("api-gw-hello");
        let orch = s.orchestrator();
        let with_color = |color: &str| UpdateOptions {
            cache_api_config: Some("funcdeployConfig".into()),
            stage_variables: env(&[("color", color)]),
            ..s.options()
        };

        let first = orch.update(&with_color("blue"), None).await.unwrap();
        assert_eq!(first.was_api_cache_used, Some(false));
        assert_eq!(s.platform.stage_variables(&api, "latest").unwrap()["color"], "blue");

        let second = orch.update(&with_color("blue"), None).await.unwrap();
        assert_eq!(second.was_api_cache_used, Some(true));
        assert_eq!(s.platform.deployment_count(&api), 1);

        let third = orch.update(&with_color("red"), None).await.unwrap();
        assert_eq!(third.was_api_cache_used, Some(false));
        assert_eq!(s.platform.deployment_count(&api), 2);
        assert_eq!(s.platform.stage_variables(&api, "latest").unwrap()["color"], "red");
    }
}
