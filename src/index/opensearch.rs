//! OpenSearch over its REST API.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};

use crate::{document::Document, prelude::*};

use super::{IndexError, SearchIndex};

/// The index we write to unless told otherwise.
pub const DEFAULT_INDEX: &str = "documents";

/// An OpenSearch index.
#[derive(Clone, Debug)]
pub struct OpenSearchIndex {
    client: Client,
    address: Url,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchIndex {
    /// Create a client for `index` on the cluster at `address`.
    ///
    /// `insecure` disables TLS certificate checks, which is what you want for
    /// a development cluster with self-signed certificates and nothing else.
    pub fn new(
        address: &str,
        index: &str,
        username: Option<String>,
        password: Option<String>,
        insecure: bool,
    ) -> Result<Self, IndexError> {
        let address = Url::parse(address).map_err(|err| IndexError::InvalidUrl {
            url: address.to_owned(),
            reason: err.to_string(),
        })?;
        if address.cannot_be_a_base() {
            return Err(IndexError::InvalidUrl {
                url: address.to_string(),
                reason: "not a base URL".to_owned(),
            });
        }
        if insecure {
            warn!("TLS certificate verification for the search index is disabled");
        }
        let client = Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            client,
            address,
            index: index.to_owned(),
            username,
            password,
        })
    }

    /// Build a URL from path segments, escaping each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.address.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.username {
            Some(username) => req.basic_auth(username, self.password.as_deref()),
            None => req,
        }
    }
}

/// Pull a human-readable message out of an OpenSearch error response. These
/// look like `{"error": {"type": "...", "reason": "..."}, "status": 400}`, or
/// occasionally have a plain string as the `error`.
async fn error_message(res: Response) -> String {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    error_message_from_body(&body).unwrap_or_else(|| {
        if body.is_empty() {
            status.to_string()
        } else {
            body
        }
    })
}

fn error_message_from_body(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    match value.get("error")? {
        serde_json::Value::String(message) => Some(message.clone()),
        error => {
            let kind = error.get("type").and_then(|t| t.as_str()).unwrap_or("error");
            let reason = error.get("reason").and_then(|r| r.as_str()).unwrap_or("");
            Some(format!("{kind}: {reason}"))
        }
    }
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    #[instrument(level = "debug", skip_all, fields(index = %self.index))]
    async fn ensure_index(&self) -> Result<(), IndexError> {
        let res = self
            .request(Method::PUT, self.url(&[self.index.as_str()]))
            .send()
            .await?;
        match res.status() {
            status if status.is_success() => {
                info!(index = %self.index, "Created search index");
                Ok(())
            }
            StatusCode::BAD_REQUEST => {
                let message = error_message(res).await;
                if message.contains("already_exists") {
                    debug!(index = %self.index, "Search index already exists");
                    Ok(())
                } else {
                    Err(IndexError::Rejected {
                        status: StatusCode::BAD_REQUEST,
                        message,
                    })
                }
            }
            status => Err(IndexError::Rejected {
                status,
                message: error_message(res).await,
            }),
        }
    }

    #[instrument(level = "debug", skip(self, document))]
    async fn upsert(&self, id: &str, document: &Document) -> Result<(), IndexError> {
        let res = self
            .request(Method::PUT, self.url(&[self.index.as_str(), "_doc", id]))
            .json(document)
            .send()
            .await?;
        let status = res.status();
        if status.is_success() {
            debug!(status = %status, "Indexed document");
            Ok(())
        } else {
            Err(IndexError::Rejected {
                status,
                message: error_message(res).await,
            })
        }
    }

    #[instrument(level = "debug", skip_all)]
    async fn ping(&self) -> Result<(), IndexError> {
        let res = self
            .request(Method::GET, self.address.clone())
            .send()
            .await?;
        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(IndexError::Rejected {
                status,
                message: error_message(res).await,
            })
        }
    }
}
