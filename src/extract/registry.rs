//! Looking up companies in the Swiss commercial register.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::prelude::*;

/// A company, as the register knows it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    /// The registered name. We deduplicate on this.
    pub legal_name: String,

    /// Swiss business identifier, like `CHE-123.456.789`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Town of the registered office.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_seat: Option<String>,

    /// Short legal form, like `AG` or `GmbH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_form: Option<String>,

    /// Register status, like `ACTIVE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Company {
    /// A company with just a name.
    #[cfg(test)]
    pub fn named(legal_name: impl Into<String>) -> Self {
        Self {
            legal_name: legal_name.into(),
            uid: None,
            legal_seat: None,
            legal_form: None,
            status: None,
        }
    }
}

/// Errors talking to the register. These never fail a page.
#[derive(Debug, Error)]
pub enum RegistryLookupError {
    #[error("invalid registry URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot reach company registry")]
    Request(#[from] reqwest::Error),

    #[error("company registry returned unexpected status {0}")]
    Status(StatusCode),
}

/// Interface to a company register.
#[async_trait]
pub trait CompanyRegistry: Send + Sync + 'static {
    /// Find the company best matching `name`, if there is one.
    async fn find_company(&self, name: &str) -> Result<Option<Company>, RegistryLookupError>;

    /// Check that the register is reachable and accepts our credentials.
    async fn ping(&self) -> Result<(), RegistryLookupError>;
}

/// Client for the public Zefix REST API.
#[derive(Clone, Debug)]
pub struct ZefixClient {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    name: &'a str,
    active_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZefixCompany {
    name: String,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    legal_seat: Option<String>,
    #[serde(default)]
    legal_form: Option<ZefixLegalForm>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZefixLegalForm {
    #[serde(default)]
    short_name: Option<ZefixTranslations>,
}

#[derive(Debug, Deserialize)]
struct ZefixTranslations {
    #[serde(default)]
    de: Option<String>,
}

impl From<ZefixCompany> for Company {
    fn from(company: ZefixCompany) -> Self {
        Self {
            legal_name: company.name,
            uid: company.uid,
            legal_seat: company.legal_seat,
            legal_form: company
                .legal_form
                .and_then(|form| form.short_name)
                .and_then(|name| name.de),
            status: company.status,
        }
    }
}

impl ZefixClient {
    /// Create a client for the API at `base_url`, for example
    /// `https://www.zefix.admin.ch/ZefixPublicREST/`.
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RegistryLookupError> {
        let mut base_url = Url::parse(base_url).map_err(|err| RegistryLookupError::InvalidUrl {
            url: base_url.to_owned(),
            reason: err.to_string(),
        })?;
        // `Url::join` replaces the last path segment unless it ends in `/`.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            username,
            password,
        })
    }

    fn url(&self, path: &str) -> Result<Url, RegistryLookupError> {
        self.base_url
            .join(path)
            .map_err(|err| RegistryLookupError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: err.to_string(),
            })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, RegistryLookupError> {
        let req = self.client.request(method, self.url(path)?);
        Ok(match &self.username {
            Some(username) => req.basic_auth(username, self.password.as_deref()),
            None => req,
        })
    }
}

#[async_trait]
impl CompanyRegistry for ZefixClient {
    #[instrument(level = "debug", skip(self))]
    async fn find_company(&self, name: &str) -> Result<Option<Company>, RegistryLookupError> {
        let res = self
            .request(reqwest::Method::POST, "api/v1/company/search")?
            .json(&SearchRequest {
                name,
                active_only: false,
            })
            .send()
            .await?;
        match res.status() {
            // Zefix answers "no results" with a 404.
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::OK => {}
            status => return Err(RegistryLookupError::Status(status)),
        }

        let companies = res.json::<Vec<ZefixCompany>>().await?;
        trace!(?companies, "Zefix search results");
        Ok(best_match(name, companies).map(Company::from))
    }

    #[instrument(level = "debug", skip_all)]
    async fn ping(&self) -> Result<(), RegistryLookupError> {
        let res = self
            .request(reqwest::Method::GET, "api/v1/legalForm")?
            .send()
            .await?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(RegistryLookupError::Status(res.status()))
        }
    }
}

/// Prefer an exact (case-insensitive) name match, then whatever the register
/// ranked first.
fn best_match(name: &str, mut companies: Vec<ZefixCompany>) -> Option<ZefixCompany> {
    let name = name.to_lowercase();
    let idx = companies
        .iter()
        .position(|company| company.name.to_lowercase() == name)
        .unwrap_or(0);
    (idx < companies.len()).then(|| companies.swap_remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zefix(name: &str) -> ZefixCompany {
        ZefixCompany {
            name: name.to_owned(),
            uid: None,
            legal_seat: None,
            legal_form: None,
            status: None,
        }
    }

    #[test]
    fn parses_search_results() {
        let json = r#"[{
            "name": "Baloise Assicurazione SA",
            "ehraid": 123,
            "uid": "CHE-101.018.398",
            "legalSeat": "Basel",
            "legalForm": {"id": 3, "shortName": {"de": "AG", "fr": "SA"}},
            "status": "ACTIVE"
        }]"#;
        let companies: Vec<ZefixCompany> = serde_json::from_str(json).unwrap();
        let company = Company::from(companies.into_iter().next().unwrap());
        assert_eq!(company.legal_name, "Baloise Assicurazione SA");
        assert_eq!(company.uid.as_deref(), Some("CHE-101.018.398"));
        assert_eq!(company.legal_seat.as_deref(), Some("Basel"));
        assert_eq!(company.legal_form.as_deref(), Some("AG"));
    }

    #[test]
    fn prefers_exact_matches() {
        let companies = vec![zefix("Muster AG in Liquidation"), zefix("MUSTER AG")];
        assert_eq!(best_match("Muster AG", companies).unwrap().name, "MUSTER AG");

        let companies = vec![zefix("Müller Holz AG"), zefix("Müller AG")];
        assert_eq!(best_match("müller holz ag", companies).unwrap().name, "Müller Holz AG");
        assert!(best_match("Nobody AG", vec![]).is_none());
    }

    #[test]
    fn api_paths_keep_base_path() {
        let client =
            ZefixClient::new("https://www.zefix.admin.ch/ZefixPublicREST", None, None, None).unwrap();
        assert_eq!(
            client.url("api/v1/company/search").unwrap().as_str(),
            "https://www.zefix.admin.ch/ZefixPublicREST/api/v1/company/search"
        );
    }
}
