use crate::reorg::config::FolioStoreConfig;
use crate::reorg::store::{
    ContentStore, RetryPolicy, Revision, StoreError, validate_store_path,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// GitHub's contents API stops inlining file bodies above this size.
pub const INLINE_CONTENT_LIMIT: u64 = 1_048_576;

const USER_AGENT: &str = concat!("folio-reorg/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    size: u64,
    sha: String,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, PartialEq, Eq)]
enum ContentPayload {
    Inline(Vec<u8>),
    Blob { download_url: String },
}

impl ContentsResponse {
    fn into_payload(self, path: &str) -> Result<ContentPayload, StoreError> {
        let inline = self
            .content
            .filter(|content| !content.trim().is_empty())
            .filter(|_| self.size <= INLINE_CONTENT_LIMIT);
        match inline {
            Some(content) => {
                let compact: String = content.split_whitespace().collect();
                let bytes = STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|err| StoreError::payload(path, format!("bad base64: {err}")))?;
                Ok(ContentPayload::Inline(bytes))
            }
            None => match self.download_url {
                Some(download_url) => Ok(ContentPayload::Blob { download_url }),
                None => Err(StoreError::payload(
                    path,
                    "content not inlined and no download_url",
                )),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct DirectWrite<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DirectDelete<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Serialize)]
struct ProxyWrite<'a> {
    path: &'a str,
    content: String,
    message: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ProxyDelete<'a> {
    path: &'a str,
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    content: Option<WrittenContent>,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

/// Content store backed by a GitHub repository's contents API.
///
/// Reads always go to the API. Writes go either to the API with a bearer
/// token, or through a write proxy that holds the credential itself.
pub struct GitHubStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    proxy_url: Option<String>,
    retry: RetryPolicy,
}

impl GitHubStore {
    pub fn new(
        cfg: &FolioStoreConfig,
        token: Option<String>,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            owner: cfg.owner.clone(),
            repo: cfg.repo.clone(),
            branch: cfg.branch.clone(),
            token: token.filter(|t| !t.trim().is_empty()),
            proxy_url: Some(cfg.proxy_url.trim().to_string()).filter(|url| !url.is_empty()),
            retry,
        })
    }

    pub fn can_write(&self) -> bool {
        self.proxy_url.is_some() || self.token.is_some()
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        request.send().map_err(|source| StoreError::Transport {
            path: path.to_string(),
            source,
        })
    }

    fn ensure_success(
        method: &'static str,
        path: &str,
        response: Response,
    ) -> Result<Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Err(StoreError::Status {
            method,
            path: path.to_string(),
            status,
            body: crate::reorg::util::truncate_with_ellipsis(&body, 300),
        })
    }

    fn metadata(&self, path: &str) -> Result<Option<ContentsResponse>, StoreError> {
        validate_store_path(path)?;
        self.retry.run("metadata", || self.metadata_once(path))
    }

    fn metadata_once(&self, path: &str) -> Result<Option<ContentsResponse>, StoreError> {
        let request = self.authorized(
            self.client
                .get(self.contents_url(path))
                .query(&[("ref", self.branch.as_str())]),
        );
        let response = self.send(path, request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success("GET", path, response)?;
        response
            .json::<ContentsResponse>()
            .map(Some)
            .map_err(|err| StoreError::payload(path, format!("bad contents json: {err}")))
    }

    fn fetch_blob(&self, path: &str, download_url: &str) -> Result<Vec<u8>, StoreError> {
        self.retry.run("download_blob", || {
            let request = self.authorized(self.client.get(download_url));
            let response = self.send(path, request)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(path.to_string()));
            }
            let response = Self::ensure_success("GET", path, response)?;
            response
                .bytes()
                .map(|bytes| bytes.to_vec())
                .map_err(|source| StoreError::Transport {
                    path: path.to_string(),
                    source,
                })
        })
    }

    fn missing_write_credential(&self, path: &str) -> StoreError {
        StoreError::payload(
            path,
            "no write credential: set FOLIO_GITHUB_TOKEN or configure store.proxy_url",
        )
    }

    fn written_revision(
        path: &str,
        response: Response,
        fallback: &[u8],
    ) -> Result<Revision, StoreError> {
        let parsed: WriteResponse = response.json().unwrap_or_default();
        Ok(match parsed.content {
            Some(content) => Revision(content.sha),
            None => {
                tracing::debug!(path, "write response carried no sha; using local digest");
                Revision(crate::reorg::util::sha256_hex(fallback))
            }
        })
    }
}

impl ContentStore for GitHubStore {
    fn backend(&self) -> &'static str {
        "github"
    }

    fn writable(&self) -> bool {
        self.can_write()
    }

    fn check_access(&self) -> Result<(), StoreError> {
        let url = format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo);
        let label = format!("{}/{}", self.owner, self.repo);
        self.retry.run("check_access", || {
            let request = self.authorized(self.client.get(&url));
            let response = self.send(&label, request)?;
            Self::ensure_success("GET", &label, response).map(|_| ())
        })
    }

    fn revision(&self, path: &str) -> Result<Option<Revision>, StoreError> {
        Ok(self.metadata(path)?.map(|meta| Revision(meta.sha)))
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let meta = self
            .metadata(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        match meta.into_payload(path)? {
            ContentPayload::Inline(bytes) => Ok(bytes),
            ContentPayload::Blob { download_url } => self.fetch_blob(path, &download_url),
        }
    }

    fn upload(&self, path: &str, bytes: &[u8], message: &str) -> Result<Revision, StoreError> {
        validate_store_path(path)?;
        if !self.can_write() {
            return Err(self.missing_write_credential(path));
        }
        let encoded = STANDARD.encode(bytes);

        // The sha is re-read on every attempt: a failed attempt may still have
        // committed, and the retry must not send the revision it replaced.
        self.retry.run("upload", || {
            let current = self.metadata_once(path)?.map(|meta| meta.sha);
            let sha = current.as_deref();
            let request = match &self.proxy_url {
                Some(proxy) => self.client.post(proxy).json(&ProxyWrite {
                    path,
                    content: encoded.clone(),
                    message,
                    branch: &self.branch,
                    sha,
                }),
                None => self
                    .authorized(self.client.put(self.contents_url(path)))
                    .json(&DirectWrite {
                        message,
                        content: encoded.clone(),
                        branch: &self.branch,
                        sha,
                    }),
            };
            let response = self.send(path, request)?;
            let response = Self::ensure_success("PUT", path, response)?;
            Self::written_revision(path, response, bytes)
        })
    }

    fn delete(&self, path: &str, message: &str, revision: &Revision) -> Result<(), StoreError> {
        validate_store_path(path)?;
        if !self.can_write() {
            return Err(self.missing_write_credential(path));
        }
        self.retry.run("delete", || {
            let request = match &self.proxy_url {
                Some(proxy) => self.client.delete(proxy).json(&ProxyDelete {
                    path,
                    message,
                    sha: &revision.0,
                    branch: &self.branch,
                }),
                None => self
                    .authorized(self.client.delete(self.contents_url(path)))
                    .json(&DirectDelete {
                        message,
                        sha: &revision.0,
                        branch: &self.branch,
                    }),
            };
            let response = self.send(path, request)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(path.to_string()));
            }
            if response.status() == StatusCode::CONFLICT {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                });
            }
            Self::ensure_success("DELETE", path, response).map(|_| ())
        })
    }

    /// The contents API lists at most 1000 entries per directory.
    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let dir = dir.trim_end_matches('/');
        validate_store_path(dir)?;
        let entries = self.retry.run("list", || {
            let request = self.authorized(
                self.client
                    .get(self.contents_url(dir))
                    .query(&[("ref", self.branch.as_str())]),
            );
            let response = self.send(dir, request)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }
            let response = Self::ensure_success("GET", dir, response)?;
            response
                .json::<Vec<DirectoryEntry>>()
                .map_err(|err| StoreError::payload(dir, format!("bad directory json: {err}")))
        })?;
        let mut paths: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| entry.path)
            .collect();
        paths.sort();
        Ok(paths)
    }
}
