//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::config::{PartialConfig, ReplConfig};
use crate::error::ConfigError;
use crate::event::{decode_event, EventError};
use crate::outcome::{InvocationResponse, ReplicationFailure, ReplicationResult, Stage};
use crate::types::{BranchName, CommitId, ReplicationRequest};

/// Replicate a commit from a source repository into a destination repository.
#[derive(Parser, Debug)]
#[command(name = "commit-repl")]
#[command(about = "Cross-region commit replication", long_about = None)]
pub struct Cli {
    /// Config file (`.toml` or `.json`).
    #[arg(short, long, global = true, env = "COMMIT_REPL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Source repository name.
    #[arg(long, global = true, env = "SOURCE_REPO")]
    pub source_repo: Option<String>,

    /// Destination repository name.
    #[arg(long, global = true, env = "DESTINATION_REPO")]
    pub destination_repo: Option<String>,

    /// Source endpoint (`http(s)://...` or `memory://name`).
    #[arg(long, global = true, env = "SOURCE_ENDPOINT")]
    pub source_endpoint: Option<String>,

    /// Destination endpoint (`http(s)://...` or `memory://name`).
    #[arg(long, global = true, env = "DESTINATION_ENDPOINT")]
    pub destination_endpoint: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replicate one commit.
    Replicate {
        /// Source commit id.
        #[arg(long)]
        commit: String,
        /// Branch to replicate onto.
        #[arg(long, default_value = "main")]
        branch: String,
    },
    /// Replicate the commit named by a change notification.
    HandleEvent {
        /// Event file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        event: String,
    },
}

impl Cli {
    /// Options given on the command line or through the environment.
    pub fn overrides(&self) -> PartialConfig {
        PartialConfig {
            source_repo: self.source_repo.clone(),
            destination_repo: self.destination_repo.clone(),
            source_endpoint: self.source_endpoint.clone(),
            destination_endpoint: self.destination_endpoint.clone(),
            ..Default::default()
        }
    }

    /// Layer the command line over the config file and validate the result.
    pub fn load_config(&self) -> Result<ReplConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => PartialConfig::from_file(path)?,
            None => PartialConfig::default(),
        };
        base.merge(self.overrides()).build()
    }

    /// Run the selected command and produce the invocation response.
    ///
    /// Configuration and event problems are reported in the response without
    /// contacting either repository.
    pub async fn run(self) -> InvocationResponse {
        let config = match self.load_config() {
            Ok(c) => c,
            Err(e) => return config_failure(&e),
        };

        let request = match &self.command {
            Command::Replicate { commit, branch } => ReplicationRequest {
                source_repo: config.source_repo.clone(),
                destination_repo: config.destination_repo.clone(),
                commit_id: CommitId::new(commit.as_str()),
                branch_name: BranchName::new(branch.as_str()),
            },
            Command::HandleEvent { event } => match read_event(event).await {
                Ok(payload) => match decode_event(&payload, &config) {
                    Ok(req) => req,
                    Err(e) => return ReplicationResult::Failure(e.to_failure()).to_response(),
                },
                Err(e) => return ReplicationResult::Failure(e.to_failure()).to_response(),
            },
        };

        let replicator = match config.build_replicator() {
            Ok(r) => r,
            Err(e) => return config_failure(&e),
        };

        info!(
            source = %config.source_endpoint,
            destination = %config.destination_endpoint,
            commit = %request.commit_id,
            "starting replication"
        );
        replicator.replicate(&request).await.to_response()
    }
}

fn config_failure(err: &ConfigError) -> InvocationResponse {
    tracing::error!(error = %err, "invalid configuration");
    ReplicationResult::Failure(ReplicationFailure::config(Stage::FetchMetadata, err)).to_response()
}

async fn read_event(source: &str) -> Result<String, EventError> {
    if source == "-" {
        let mut payload = String::new();
        tokio::io::stdin().read_to_string(&mut payload).await?;
        Ok(payload)
    } else {
        Ok(tokio::fs::read_to_string(source).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CommitSpec, RepoClient};
    use crate::memory::MemoryRepoHost;
    use crate::types::FileChange;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENDPOINTS: [&str; 4] = [
        "--source-endpoint",
        "memory://east",
        "--destination-endpoint",
        "memory://west",
    ];

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["commit-repl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn test_replicate_defaults_branch() {
            let cli = parse(&["replicate", "--commit", "abc"]);
            assert_eq!(
                cli.command,
                Command::Replicate {
                    commit: "abc".into(),
                    branch: "main".into()
                }
            );
        }

        #[test]
        fn test_global_options_after_subcommand() {
            let cli = parse(&["handle-event", "--event", "e.json", "--source-repo", "app", "--json"]);
            assert_eq!(cli.source_repo.as_deref(), Some("app"));
            assert!(cli.json);
            assert_eq!(cli.command, Command::HandleEvent { event: "e.json".into() });
        }

        #[test]
        fn test_replicate_requires_commit() {
            assert!(Cli::try_parse_from(["commit-repl", "replicate"]).is_err());
        }

        #[test]
        fn test_flags_override_file() {
            let mut file = NamedTempFile::with_suffix(".toml").unwrap();
            writeln!(
                file,
                r#"
source_repo = "app"
destination_repo = "app-replica"
source_endpoint = "memory://east"
destination_endpoint = "memory://west"
"#
            )
            .unwrap();
            let path = file.path().to_str().unwrap();
            let cli = parse(&["--config", path, "--destination-repo", "mirror", "replicate", "--commit", "c1"]);
            let config = cli.load_config().unwrap();
            assert_eq!(config.source_repo.as_str(), "app");
            assert_eq!(config.destination_repo.as_str(), "mirror");
        }
    }

    mod running {
        use super::*;

        #[tokio::test]
        async fn test_invalid_endpoint_reported_before_any_call() {
            let cli = parse(&[
                "--source-repo",
                "app",
                "--destination-repo",
                "app-replica",
                "--source-endpoint",
                "us-east-1",
                "--destination-endpoint",
                "memory://west",
                "replicate",
                "--commit",
                "c1",
            ]);
            let resp = cli.run().await;
            assert_eq!(resp.status_code, 500);
            assert_eq!(resp.body["error"], "ConfigurationError");
        }

        #[tokio::test]
        async fn test_event_without_commit() {
            let mut file = NamedTempFile::with_suffix(".json").unwrap();
            writeln!(file, r#"{{"detail": {{"referenceName": "main"}}}}"#).unwrap();
            let path = file.path().to_str().unwrap();
            let mut args = vec!["--source-repo", "app", "--destination-repo", "app-replica"];
            args.extend_from_slice(&ENDPOINTS);
            args.extend_from_slice(&["handle-event", "--event", path]);

            let resp = parse(&args).run().await;
            assert_eq!(resp.status_code, 500);
            assert_eq!(resp.body["stage"], "FetchMetadata");
            assert_eq!(resp.body["error"], "Unknown");
        }

        #[tokio::test]
        async fn test_missing_config_file_reports_cause() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("missing.toml");
            let os_error = std::fs::read_to_string(&path).unwrap_err().to_string();

            let cli = parse(&["--config", path.to_str().unwrap(), "replicate", "--commit", "c1"]);
            let resp = cli.run().await;
            assert_eq!(resp.status_code, 500);
            assert_eq!(resp.body["error"], "ConfigurationError");
            assert_eq!(resp.body["detail"], format!("I/O error: {}", os_error));
        }

        #[tokio::test]
        async fn test_replicate_between_registered_memory_hosts() {
            let source = MemoryRepoHost::named("cli-east");
            let dest = MemoryRepoHost::named("cli-west");
            source.create_repo("app").await;
            dest.create_repo("app-replica").await;
            let commit = source
                .create_commit(
                    &"app".into(),
                    CommitSpec {
                        branch: "main".into(),
                        put_files: vec![FileChange::new("a.txt", "hello")],
                        delete_files: vec![],
                        message: "add a".into(),
                        author_name: "Ada".into(),
                        author_email: "ada@example.com".into(),
                        parent: None,
                    },
                )
                .await
                .unwrap();

            let resp = parse(&[
                "--source-repo",
                "app",
                "--destination-repo",
                "app-replica",
                "--source-endpoint",
                "memory://cli-east",
                "--destination-endpoint",
                "memory://cli-west",
                "replicate",
                "--commit",
                commit.as_str(),
            ])
            .run()
            .await;
            assert_eq!(resp.status_code, 200);
            assert_eq!(resp.body["sourceCommit"], commit.as_str());
            assert_eq!(resp.body["destinationCommit"], "cli-west-1");
        }

        #[tokio::test]
        async fn test_unknown_repository_on_empty_memory_host() {
            let args = [
                "--source-repo",
                "app",
                "--destination-repo",
                "app-replica",
                "--source-endpoint",
                "memory://cli-empty-east",
                "--destination-endpoint",
                "memory://cli-empty-west",
                "replicate",
                "--commit",
                "c1",
            ];

            let resp = parse(&args).run().await;
            assert_eq!(resp.status_code, 500);
            assert_eq!(resp.body["stage"], "FetchMetadata");
            assert_eq!(resp.body["error"], "NotFound");
        }
    }
}
