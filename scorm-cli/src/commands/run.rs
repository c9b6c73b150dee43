//! Scripted SCO sessions
//!
//! A script is a JSON array of API calls, fed to the bridge in order the way
//! content would make them:
//!
//! ```json
//! [
//!   {"call": "LMSInitialize", "args": [""]},
//!   {"call": "LMSSetValue", "args": ["cmi.core.lesson_status", "passed"]},
//!   {"call": "LMSFinish", "args": [""]}
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::info;

use crate::config::ConfigLoader;
use scorm_core::{
    LaunchContext, OpenRequest, RecordingHost, ScormVersion, SessionHandle, SessionManager,
    SqliteAttemptBackend,
};

#[derive(Args)]
pub struct RunArgs {
    /// Learner id
    #[arg(long)]
    pub user: String,

    /// Package id
    #[arg(long)]
    pub package: String,

    /// SCORM version of the package (1.2 or 2004)
    #[arg(long = "version", value_name = "VERSION")]
    pub scorm_version: ScormVersion,

    /// JSON file with the calls to make
    #[arg(long)]
    pub script: PathBuf,

    /// Learner display name (defaults to the id)
    #[arg(long)]
    pub learner_name: Option<String>,

    /// Mastery score (1.2) on a 0-100 scale
    #[arg(long)]
    pub mastery_score: Option<f64>,

    /// Scaled passing score (2004) on a -1..1 scale
    #[arg(long)]
    pub passing_score: Option<f64>,

    /// Launch without credit
    #[arg(long)]
    pub no_credit: bool,
}

/// One scripted API call
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptCall {
    pub call: String,
    #[serde(default)]
    pub args: Vec<String>,
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptCall>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid script {}", path.display()))
}

fn launch_context(args: &RunArgs) -> LaunchContext {
    let name = args.learner_name.clone().unwrap_or_else(|| args.user.clone());
    let mut launch = LaunchContext::new(args.user.clone(), name);
    launch.credit = !args.no_credit;
    launch.mastery_score = args.mastery_score;
    launch.scaled_passing_score = args.passing_score;
    launch
}

/// Feed every call through the session, returning one report line per call
pub fn play(session: &SessionHandle, calls: &[ScriptCall]) -> Vec<String> {
    let bridge = session.bridge();
    calls
        .iter()
        .map(|step| {
            let args: Vec<&str> = step.args.iter().map(String::as_str).collect();
            let result = session.invoke(&step.call, &args);
            let code = bridge
                .lock()
                .map(|b| b.last_error_code())
                .unwrap_or_default();
            format!(
                "{}({}) = {:?} [error {}]",
                step.call,
                args.iter()
                    .map(|a| format!("{:?}", a))
                    .collect::<Vec<_>>()
                    .join(", "),
                result,
                code
            )
        })
        .collect()
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let calls = load_script(&args.script)?;

    let backend = Arc::new(SqliteAttemptBackend::open(&config.storage.database)?);
    let manager = SessionManager::from_config(backend, config).await?;
    let host = Arc::new(RecordingHost::new());

    let request = OpenRequest::new(args.user.clone(), args.package.clone(), args.scorm_version)
        .with_launch(launch_context(&args));
    let session = manager.open(request, host.clone()).await?;
    info!(
        attempt_id = session.attempt_id(),
        resumed = session.is_resumed(),
        "session opened"
    );

    for line in play(&session, &calls) {
        println!("{}", line);
    }

    let attempt = session.close().await;
    println!();
    println!("Attempt:  {} (#{})", attempt.id, attempt.attempt_number);
    println!("Status:   {}", attempt.status);
    if let Some(raw) = attempt.score_raw {
        println!("Score:    {}", raw);
    }
    println!(
        "Open:     {}",
        if attempt.is_terminated() { "no" } else { "yes" }
    );
    for (status, score) in host.completions() {
        match score {
            Some(score) => println!("Complete: {} ({:.1}%)", status, score),
            None => println!("Complete: {}", status),
        }
    }
    for message in host.errors() {
        eprintln!("Warning:  {}", message);
    }
    if !manager.replay().is_empty().await {
        eprintln!(
            "Warning:  progress parked in {}; run `scorm-rte replay` once the database is reachable",
            manager.replay().file_path().display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorm_core::{MemoryAttemptBackend, RteConfig};
    use tempfile::TempDir;

    #[test]
    fn script_args_default_to_empty() {
        let calls: Vec<ScriptCall> =
            serde_json::from_str(r#"[{"call": "LMSGetLastError"}]"#).unwrap();
        assert_eq!(calls[0].args, Vec::<String>::new());
    }

    #[test]
    fn load_script_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calls.json");
        std::fs::write(&path, "{not json").unwrap();
        let error = load_script(&path).unwrap_err();
        assert!(error.to_string().contains("Invalid script"));
    }

    #[tokio::test]
    async fn play_reports_results_and_codes() {
        let dir = TempDir::new().unwrap();
        let mut config = RteConfig::default();
        config.persistence.replay_dir = dir.path().to_path_buf();
        let manager = SessionManager::from_config(Arc::new(MemoryAttemptBackend::new()), config)
            .await
            .unwrap();
        let session = manager
            .open(
                OpenRequest::new("u1", "p1", ScormVersion::Scorm12),
                Arc::new(RecordingHost::new()),
            )
            .await
            .unwrap();

        let calls: Vec<ScriptCall> = serde_json::from_str(
            r#"[
                {"call": "LMSInitialize", "args": [""]},
                {"call": "LMSGetValue", "args": ["cmi.core.lesson_location"]},
                {"call": "LMSSetValue", "args": ["cmi.core.student_id", "x"]}
            ]"#,
        )
        .unwrap();
        let lines = play(&session, &calls);

        assert_eq!(lines[0], r#"LMSInitialize("") = "true" [error 0]"#);
        assert_eq!(
            lines[1],
            r#"LMSGetValue("cmi.core.lesson_location") = "" [error 401]"#
        );
        assert!(lines[2].ends_with(r#"= "false" [error 403]"#));
    }

    #[test]
    fn launch_context_applies_flags() {
        let args = RunArgs {
            user: "u1".into(),
            package: "p1".into(),
            scorm_version: ScormVersion::Scorm12,
            script: PathBuf::from("calls.json"),
            learner_name: None,
            mastery_score: Some(80.0),
            passing_score: None,
            no_credit: true,
        };
        let launch = launch_context(&args);
        assert_eq!(launch.learner_name, "u1");
        assert!(!launch.credit);
        assert_eq!(launch.mastery_score, Some(80.0));
    }
}
