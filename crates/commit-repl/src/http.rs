//! JSON-over-HTTP adapter for a hosted repository service.
//!
//! Blob and file content travels base64-encoded on the wire; this module is
//! the only place that encodes or decodes it. HTTP statuses and service error
//! codes are classified into [`RemoteError`] here so that the engine only sees
//! the taxonomy.
//!
//! Routes, relative to the endpoint:
//! - `GET  repositories/{repo}/commits/{id}`
//! - `GET  repositories/{repo}/commits/{id}/differences[?nextToken=..]`
//! - `GET  repositories/{repo}/blobs/{blob}`
//! - `GET  repositories/{repo}/branches/{branch}`
//! - `POST repositories/{repo}/commits`

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{CommitSpec, RemoteOp, RemoteResult, RepoClient};
use crate::error::RemoteError;
use crate::types::{BlobId, BranchName, CommitId, CommitMetadata, DiffEntry, RepoId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitEnvelope {
    commit: WireCommit,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommit {
    commit_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<WireAuthor>,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DifferencesPage {
    #[serde(default)]
    differences: Vec<WireDifference>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDifference {
    #[serde(default)]
    before_blob: Option<WireBlobRef>,
    #[serde(default)]
    after_blob: Option<WireBlobRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlobRef {
    path: String,
    #[serde(default)]
    blob_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobEnvelope {
    content: String,
}

#[derive(Debug, Deserialize)]
struct BranchEnvelope {
    branch: WireBranch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBranch {
    commit_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommitBody {
    branch_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_commit_id: Option<String>,
    put_files: Vec<WirePutFile>,
    delete_files: Vec<WireDeleteFile>,
    commit_message: String,
    author_name: String,
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePutFile {
    file_path: String,
    file_content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDeleteFile {
    file_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommitResponse {
    commit_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl From<CommitSpec> for CreateCommitBody {
    fn from(spec: CommitSpec) -> Self {
        Self {
            branch_name: spec.branch.to_string(),
            parent_commit_id: spec.parent.map(|p| p.to_string()),
            put_files: spec
                .put_files
                .into_iter()
                .map(|f| WirePutFile {
                    file_path: f.path,
                    file_content: STANDARD.encode(&f.content),
                })
                .collect(),
            delete_files: spec
                .delete_files
                .into_iter()
                .map(|file_path| WireDeleteFile { file_path })
                .collect(),
            commit_message: spec.message,
            author_name: spec.author_name,
            email: spec.author_email,
        }
    }
}

fn into_diff_entry(d: WireDifference) -> Option<DiffEntry> {
    match (d.before_blob, d.after_blob) {
        (before, Some(WireBlobRef { path, blob_id: Some(blob) })) => match before {
            Some(b) if b.path != path => Some(DiffEntry::renamed(b.path, path, blob)),
            _ => Some(DiffEntry::written(path, blob)),
        },
        (Some(before), _) => Some(DiffEntry::deleted(before.path)),
        (None, _) => None,
    }
}

/// Map a non-success HTTP response onto the error taxonomy.
fn classify(op: RemoteOp, status: u16, body: &str) -> RemoteError {
    let err: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let msg = if err.message.is_empty() {
        format!("{} failed with HTTP {}", op.name(), status)
    } else {
        err.message.clone()
    };

    match err.code.as_str() {
        "CommitDoesNotExistException" | "CommitIdDoesNotExistException" => {
            return RemoteError::CommitNotFound { commit_id: msg };
        }
        "BranchDoesNotExistException" => return RemoteError::BranchNotFound { branch: msg },
        "BlobIdDoesNotExistException" | "RepositoryDoesNotExistException" => {
            return RemoteError::NotFound { what: msg };
        }
        "ParentCommitIdOutdatedException" | "ParentCommitIdRequiredException" => {
            return RemoteError::Conflict { msg };
        }
        _ => {}
    }

    match status {
        404 => match op {
            RemoteOp::GetCommit | RemoteOp::ListChangedPaths => RemoteError::CommitNotFound { commit_id: msg },
            RemoteOp::GetBranchHead => RemoteError::BranchNotFound { branch: msg },
            RemoteOp::GetBlob | RemoteOp::CreateCommit => RemoteError::NotFound { what: msg },
        },
        409 | 412 => RemoteError::Conflict { msg },
        400 | 422 => RemoteError::Rejected { msg },
        408 | 429 | 500..=599 => RemoteError::RemoteUnavailable { msg },
        _ if err.code.is_empty() => RemoteError::Unknown {
            msg: format!("HTTP {}: {}", status, body),
        },
        _ => RemoteError::Unknown {
            msg: format!("{}: {}", err.code, msg),
        },
    }
}

fn transport_error(op: RemoteOp, e: reqwest::Error) -> RemoteError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        RemoteError::unavailable(format!("{}: {}", op.name(), e))
    } else {
        RemoteError::unknown(format!("{}: {}", op.name(), e))
    }
}

/// Repository client speaking JSON over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpRepoClient {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpRepoClient {
    /// Create a client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::unknown(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// The normalized endpoint (no trailing slash).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, repo: &RepoId, tail: &str) -> String {
        format!(
            "{}/repositories/{}/{}",
            self.endpoint,
            urlencoding::encode(repo.as_str()),
            tail
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, op: RemoteOp, url: &str) -> RemoteResult<T> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(op, e))?;
        read_json(op, resp).await
    }
}

async fn read_json<T: DeserializeOwned>(op: RemoteOp, resp: reqwest::Response) -> RemoteResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => format!("<unreadable error body: {}>", e),
        };
        return Err(classify(op, status.as_u16(), &body));
    }
    resp.json::<T>()
        .await
        .map_err(|e| RemoteError::unknown(format!("{}: malformed response: {}", op.name(), e)))
}

#[async_trait]
impl RepoClient for HttpRepoClient {
    async fn get_commit(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<CommitMetadata> {
        let url = self.url(repo, &format!("commits/{}", urlencoding::encode(commit.as_str())));
        let env: CommitEnvelope = self.get_json(RemoteOp::GetCommit, &url).await?;
        let (author_name, author_email) = match env.commit.author {
            Some(a) => (a.name, a.email),
            None => (None, None),
        };
        Ok(CommitMetadata {
            id: CommitId::new(env.commit.commit_id),
            message: env.commit.message,
            author_name,
            author_email,
            parents: env.commit.parents.into_iter().map(CommitId::new).collect(),
        })
    }

    async fn list_changed_paths(&self, repo: &RepoId, commit: &CommitId) -> RemoteResult<Vec<DiffEntry>> {
        let base = self.url(
            repo,
            &format!("commits/{}/differences", urlencoding::encode(commit.as_str())),
        );
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let url = match &token {
                Some(t) => format!("{}?nextToken={}", base, urlencoding::encode(t)),
                None => base.clone(),
            };
            let page: DifferencesPage = self.get_json(RemoteOp::ListChangedPaths, &url).await?;
            entries.extend(page.differences.into_iter().filter_map(into_diff_entry));
            match page.next_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        Ok(entries)
    }

    async fn get_blob(&self, repo: &RepoId, blob: &BlobId) -> RemoteResult<Bytes> {
        let url = self.url(repo, &format!("blobs/{}", urlencoding::encode(blob.as_str())));
        let env: BlobEnvelope = self.get_json(RemoteOp::GetBlob, &url).await?;
        let raw = STANDARD
            .decode(env.content.as_bytes())
            .map_err(|e| RemoteError::unknown(format!("blob {} is not valid base64: {}", blob, e)))?;
        Ok(Bytes::from(raw))
    }

    async fn get_branch_head(&self, repo: &RepoId, branch: &BranchName) -> RemoteResult<CommitId> {
        let url = self.url(repo, &format!("branches/{}", urlencoding::encode(branch.as_str())));
        let env: BranchEnvelope = self.get_json(RemoteOp::GetBranchHead, &url).await?;
        Ok(CommitId::new(env.branch.commit_id))
    }

    async fn create_commit(&self, repo: &RepoId, spec: CommitSpec) -> RemoteResult<CommitId> {
        let url = self.url(repo, "commits");
        let body = CreateCommitBody::from(spec);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(RemoteOp::CreateCommit, e))?;
        let created: CreateCommitResponse = read_json(RemoteOp::CreateCommit, resp).await?;
        Ok(CommitId::new(created.commit_id))
    }
}
