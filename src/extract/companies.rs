//! Finding company names in page text.
//!
//! We look for anything that ends in a Swiss legal form (`AG`, `GmbH`, `SA`,
//! `Sagl`), and ask the commercial register whether it's a real company. The
//! regex is greedy and will happily match "Rechnung Muster AG"; the register
//! lookup sorts that out.

use std::sync::LazyLock;

use regex::Regex;

use crate::prelude::*;

use super::registry::{Company, CompanyRegistry};

static COMPANY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\p{L}() -]+ (?:AG|GmbH|SA|Sagl)\b").expect("failed to compile regex")
});

/// Swiss Post's name is on nearly every letter we receive, usually as the
/// franking "Post CH AG". Never worth a lookup.
const POST_BOILERPLATE: &str = "post ch ";

fn is_post_boilerplate(candidate: &str) -> bool {
    let candidate = candidate.to_lowercase();
    candidate.starts_with(POST_BOILERPLATE) || POST_BOILERPLATE.starts_with(&candidate)
}

/// Possible company names in `text`, trimmed, deduplicated and in order of
/// first appearance.
pub fn company_candidates(text: &str) -> Vec<String> {
    let mut candidates: Vec<String> = vec![];
    for m in COMPANY_RE.find_iter(text) {
        let candidate = m.as_str().trim();
        if is_post_boilerplate(candidate) {
            trace!(candidate, "Skipping Post CH boilerplate");
            continue;
        }
        if !candidates.iter().any(|c| c == candidate) {
            candidates.push(candidate.to_owned());
        }
    }
    candidates
}

/// Look up every candidate in `text` and return the companies the register
/// knows about, deduplicated by legal name. The first company mentioned comes
/// first. Lookup failures are logged and skipped.
#[instrument(level = "debug", skip_all)]
pub async fn find_companies(registry: &dyn CompanyRegistry, text: &str) -> Vec<Company> {
    let mut companies: Vec<Company> = vec![];
    for candidate in company_candidates(text) {
        match registry.find_company(&candidate).await {
            Ok(Some(company)) => {
                if companies.iter().any(|c| c.legal_name == company.legal_name) {
                    continue;
                }
                debug!(%candidate, legal_name = %company.legal_name, "Found company");
                companies.push(company);
            }
            Ok(None) => debug!(%candidate, "Not in the company register"),
            Err(err) => warn!(%candidate, error = %err, "Company lookup failed"),
        }
    }
    companies
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::extract::registry::RegistryLookupError;

    /// In-memory register. Names map to legal names; `None` means the lookup
    /// fails.
    #[derive(Default)]
    pub(crate) struct FakeRegistry {
        pub companies: HashMap<String, Option<String>>,
        pub lookups: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        pub(crate) fn with(entries: &[(&str, Option<&str>)]) -> Self {
            Self {
                companies: entries
                    .iter()
                    .map(|(name, legal)| ((*name).to_owned(), legal.map(str::to_owned)))
                    .collect(),
                lookups: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl CompanyRegistry for FakeRegistry {
        async fn find_company(&self, name: &str) -> Result<Option<Company>, RegistryLookupError> {
            self.lookups.lock().unwrap().push(name.to_owned());
            match self.companies.get(name) {
                Some(Some(legal_name)) => Ok(Some(Company::named(legal_name.as_str()))),
                Some(None) => Err(RegistryLookupError::Status(reqwest::StatusCode::BAD_GATEWAY)),
                None => Ok(None),
            }
        }

        async fn ping(&self) -> Result<(), RegistryLookupError> {
            Ok(())
        }
    }

    #[test]
    fn finds_candidates_in_order() {
        let text = "Baloise Assicurazione SA\nAeschengraben 21\nlabor team w ag\nMüller (Schweiz) GmbH\nBaloise Assicurazione SA";
        assert_eq!(
            company_candidates(text),
            vec![
                "Baloise Assicurazione SA",
                "labor team w ag",
                "Müller (Schweiz) GmbH"
            ]
        );
    }

    #[test]
    fn legal_form_must_be_a_whole_word() {
        assert!(company_candidates("Zahlung an Sagittarius").is_empty());
        assert!(company_candidates("Gruppe AGB").is_empty());
    }

    #[test]
    fn post_ch_alone_yields_nothing() {
        assert!(company_candidates("Post CH AG").is_empty());
        assert!(company_candidates("POST CH AG\nP.P. CH-8001 Zürich").is_empty());
    }

    #[tokio::test]
    async fn post_ch_alone_yields_zero_companies() {
        let registry = FakeRegistry::with(&[("Post CH AG", Some("Post CH AG"))]);
        assert!(find_companies(&registry, "Post CH AG").await.is_empty());
        assert!(registry.lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dedups_by_legal_name_and_drops_failures() {
        let registry = FakeRegistry::with(&[
            ("Muster AG", Some("Muster AG")),
            ("MUSTER AG", Some("Muster AG")),
            ("Broken GmbH", None),
            ("Beispiel Sagl", Some("Beispiel Sagl")),
        ]);
        let text = "Muster AG\nBroken GmbH\nMUSTER AG\nUnbekannt SA\nBeispiel Sagl";
        let companies = find_companies(&registry, text).await;
        let names = companies
            .iter()
            .map(|c| c.legal_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Muster AG", "Beispiel Sagl"]);
        assert_eq!(registry.lookups.lock().unwrap().len(), 5);
    }
}
