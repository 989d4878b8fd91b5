//! Client for the structured PDF parsing service. The service is an external
//! collaborator; this module only consumes its JSON output of section blocks.

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ParsedDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub sections: Vec<ParsedSection>,
    #[serde(default)]
    pub authors: Vec<ParsedAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedSection {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
}

pub struct ParseClient {
    base_url: String,
    http: reqwest::Client,
}

impl ParseClient {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Submit PDF bytes and get back structured section blocks.
    pub async fn parse_pdf(&self, pdf: Vec<u8>, name: &str) -> Result<ParsedDocument> {
        let part = reqwest::multipart::Part::bytes(pdf)
            .file_name(name.to_string())
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{}/parse", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("parse service HTTP {status}"));
        }
        Ok(resp.json().await?)
    }
}

/// First section whose heading matches any keyword, truncated to `max_chars`.
pub fn section_summary(
    sections: &[ParsedSection],
    keywords: &[&str],
    max_chars: usize,
) -> Option<String> {
    for section in sections {
        let heading = section.heading.to_lowercase();
        if keywords.iter().any(|kw| heading.contains(kw)) && !section.text.trim().is_empty() {
            return Some(section.text.trim().chars().take(max_chars).collect());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> Vec<ParsedSection> {
        vec![
            ParsedSection {
                heading: "Introduction".into(),
                text: "intro text".into(),
            },
            ParsedSection {
                heading: "Experiments and Results".into(),
                text: "we evaluate on 500 tasks".into(),
            },
            ParsedSection {
                heading: "Dataset Construction".into(),
                text: "scraped from public repos".into(),
            },
        ]
    }

    #[test]
    fn summary_matches_heading_keywords() {
        let summary = section_summary(&sections(), &["evaluation", "experiments", "results"], 1000);
        assert_eq!(summary.as_deref(), Some("we evaluate on 500 tasks"));
    }

    #[test]
    fn summary_respects_char_cap() {
        let summary = section_summary(&sections(), &["dataset"], 7).unwrap();
        assert_eq!(summary, "scraped");
    }

    #[test]
    fn no_matching_heading_is_none() {
        assert!(section_summary(&sections(), &["baselines"], 1000).is_none());
    }

    #[test]
    fn parsed_document_deserializes_service_payload() {
        let json = r#"{
            "title": "Paper",
            "abstract": "Long abstract text",
            "sections": [{"heading": "Evaluation", "text": "body"}],
            "authors": [{"name": "A. Person", "affiliation": "Some University"}]
        }"#;
        let doc: ParsedDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.abstract_text, "Long abstract text");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.authors[0].affiliation.as_deref(), Some("Some University"));
    }
}
