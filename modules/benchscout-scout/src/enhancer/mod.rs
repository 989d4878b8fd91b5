//! PDF enhancement for arXiv candidates: download the paper (cached on disk),
//! run it through the structured parsing service, attach section summaries to
//! the candidate metadata, and generate a cover-page image for notification
//! cards. Every step is best-effort per candidate; failures never abort the
//! stage.

pub mod cover;
pub mod parser;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use benchscout_common::constants::{
    COVER_IMAGE_DPI, IMAGE_KEY_CACHE_TTL_SECS, PDF_DOWNLOAD_TIMEOUT_SECS, PDF_PARSE_CONCURRENCY,
    SECTION_SUMMARY_MAX_CHARS,
};
use benchscout_common::{arxiv_id_from_url, RawCandidate, ScoredCandidate, Source};
use benchscout_store::cache::fingerprint;
use benchscout_store::{retry_async, CacheClient, GridStore, RetryPolicy};

use parser::{section_summary, ParseClient, ParsedDocument};

/// Seam so the pipeline can run without a PDF toolchain in tests.
#[async_trait]
pub trait Enhance: Send + Sync {
    /// Stage 3: PDF enhancement of the arXiv subset, before scoring.
    async fn enhance_batch(&self, candidates: Vec<RawCandidate>) -> Vec<RawCandidate>;

    /// Stage 5.5: hero-image upload for scored candidates that survived the
    /// priority filter and carry an image URL but no platform key yet.
    async fn upload_hero_images(&self, candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        candidates
    }
}

pub struct PdfEnhancer {
    cache_dir: PathBuf,
    http: reqwest::Client,
    parser: Option<ParseClient>,
    uploader: Option<Arc<GridStore>>,
    image_cache: CacheClient,
    parse_semaphore: Semaphore,
}

impl PdfEnhancer {
    pub fn new(
        cache_dir: PathBuf,
        parse_service_url: Option<&str>,
        uploader: Option<Arc<GridStore>>,
        image_cache: CacheClient,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(PDF_DOWNLOAD_TIMEOUT_SECS))
            .user_agent("benchscout/0.4")
            .build()
            .unwrap_or_default();
        let parser = parse_service_url.map(|url| ParseClient::new(url, http.clone()));
        Self {
            cache_dir,
            http,
            parser,
            uploader,
            image_cache,
            parse_semaphore: Semaphore::new(PDF_PARSE_CONCURRENCY),
        }
    }

    async fn enhance_one(&self, mut candidate: RawCandidate) -> RawCandidate {
        let Some(arxiv_id) = candidate
            .raw_metadata
            .get("arxiv_id")
            .cloned()
            .or_else(|| arxiv_id_from_url(&candidate.url))
        else {
            warn!(url = %candidate.url, "no arxiv id extractable, skipping enhancement");
            return candidate;
        };

        let pdf_path = match self.download_pdf(&arxiv_id).await {
            Ok(path) => path,
            Err(e) => {
                warn!(arxiv_id = %arxiv_id, error = %e, "pdf download failed, candidate kept unenhanced");
                return candidate;
            }
        };

        if let Some(parsed) = self.parse_pdf(&arxiv_id, &pdf_path).await {
            merge_parsed(&mut candidate, &parsed);
        }

        match self.cover_image_key(&arxiv_id, &pdf_path).await {
            Ok(Some(key)) => candidate.hero_image_key = Some(key),
            Ok(None) => {}
            Err(e) => warn!(arxiv_id = %arxiv_id, error = %e, "cover image generation failed"),
        }

        candidate
    }

    /// Download into `{cache_dir}/{arxiv_id}.pdf`, reusing the cached copy.
    async fn download_pdf(&self, arxiv_id: &str) -> Result<PathBuf> {
        let path = self.cache_dir.join(format!("{arxiv_id}.pdf"));
        if path.exists() {
            debug!(arxiv_id, "pdf cache hit");
            return Ok(path);
        }
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let url = format!(
            "{}/{arxiv_id}.pdf",
            benchscout_common::constants::ARXIV_PDF_BASE
        );
        let bytes = retry_async(RetryPolicy::download(), "pdf.download", || async {
            let resp = self.http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("pdf HTTP {status}"));
            }
            Ok::<_, anyhow::Error>(resp.bytes().await?)
        })
        .await?;

        tokio::fs::write(&path, &bytes).await?;
        info!(arxiv_id, bytes = bytes.len(), "pdf downloaded");
        Ok(path)
    }

    /// Parse through the external service, bounded to avoid overloading it.
    async fn parse_pdf(&self, arxiv_id: &str, pdf_path: &Path) -> Option<ParsedDocument> {
        let parser = self.parser.as_ref()?;
        let _permit = self.parse_semaphore.acquire().await.ok()?;

        let pdf = match tokio::fs::read(pdf_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(arxiv_id, error = %e, "cached pdf unreadable");
                return None;
            }
        };
        match parser.parse_pdf(pdf, &format!("{arxiv_id}.pdf")).await {
            Ok(doc) => {
                debug!(arxiv_id, sections = doc.sections.len(), "pdf parsed");
                Some(doc)
            }
            Err(e) => {
                warn!(arxiv_id, error = %e, "pdf parse failed, enhancement skipped");
                None
            }
        }
    }

    /// Fetch a scored candidate's hero image URL (README figure, OpenGraph
    /// image) and upload it so notification cards can embed it. Keyed in the
    /// image cache by the URL hash.
    async fn upload_hero_image(&self, mut candidate: ScoredCandidate) -> ScoredCandidate {
        let Some(ref uploader) = self.uploader else {
            return candidate;
        };
        let Some(url) = candidate.raw.hero_image_url.clone() else {
            return candidate;
        };

        let cache_key = format!("image:{}", fingerprint(&[&url]));
        if let Some(key) = self.image_cache.get::<String>(&cache_key).await {
            candidate.raw.hero_image_key = Some(key);
            return candidate;
        }

        let bytes = match async {
            let resp = self.http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("image HTTP {status}"));
            }
            Ok::<_, anyhow::Error>(resp.bytes().await?)
        }
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "hero image fetch failed");
                return candidate;
            }
        };

        match uploader.upload_image(bytes.to_vec(), "hero.png").await {
            Ok(key) => {
                self.image_cache
                    .set(&cache_key, &key, IMAGE_KEY_CACHE_TTL_SECS)
                    .await;
                candidate.raw.hero_image_key = Some(key);
            }
            Err(e) => warn!(url = %url, error = %e, "hero image upload failed"),
        }
        candidate
    }

    /// Render page 1 to PNG off-thread, upload it, and cache the returned
    /// key for 30 days. Missing renderer or uploader leaves the field empty.
    async fn cover_image_key(&self, arxiv_id: &str, pdf_path: &Path) -> Result<Option<String>> {
        let Some(ref uploader) = self.uploader else {
            return Ok(None);
        };

        let cache_key = format!("image:{}", fingerprint(&[arxiv_id]));
        if let Some(key) = self.image_cache.get::<String>(&cache_key).await {
            debug!(arxiv_id, "image key cache hit");
            return Ok(Some(key));
        }

        let path = pdf_path.to_path_buf();
        let png = match tokio::task::spawn_blocking(move || {
            cover::render_first_page(&path, COVER_IMAGE_DPI)
        })
        .await?
        {
            Ok(png) => png,
            Err(e) => {
                warn!(arxiv_id, error = %e, "page render unavailable, leaving image empty");
                return Ok(None);
            }
        };

        let key = uploader
            .upload_image(png, &format!("{arxiv_id}.png"))
            .await
            .map_err(|e| anyhow!("image upload failed: {e}"))?;
        self.image_cache
            .set(&cache_key, &key, IMAGE_KEY_CACHE_TTL_SECS)
            .await;
        Ok(Some(key))
    }
}

#[async_trait]
impl Enhance for PdfEnhancer {
    /// Enhance the arXiv subset of a batch; other sources pass through
    /// untouched. Order is preserved.
    async fn enhance_batch(&self, candidates: Vec<RawCandidate>) -> Vec<RawCandidate> {
        let arxiv_count = candidates
            .iter()
            .filter(|c| c.source == Source::Arxiv)
            .count();
        if arxiv_count == 0 {
            return candidates;
        }
        info!(arxiv_count, "enhancing arxiv candidates");

        let results: Vec<(usize, RawCandidate)> =
            stream::iter(candidates.into_iter().enumerate().map(|(i, candidate)| async move {
                if candidate.source == Source::Arxiv {
                    (i, self.enhance_one(candidate).await)
                } else {
                    (i, candidate)
                }
            }))
            .buffer_unordered(PDF_PARSE_CONCURRENCY)
            .collect()
            .await;

        let mut ordered: Vec<(usize, RawCandidate)> = results;
        ordered.sort_by_key(|(i, _)| *i);
        ordered.into_iter().map(|(_, c)| c).collect()
    }

    /// Upload hero images for the to-save set only: candidates dropped by the
    /// scorer or the priority filter never cost an upload call.
    async fn upload_hero_images(&self, candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        let pending = candidates
            .iter()
            .filter(|c| c.raw.hero_image_url.is_some() && c.raw.hero_image_key.is_none())
            .count();
        if pending == 0 || self.uploader.is_none() {
            return candidates;
        }
        info!(pending, "uploading hero images for saved candidates");

        let results: Vec<(usize, ScoredCandidate)> =
            stream::iter(candidates.into_iter().enumerate().map(|(i, candidate)| async move {
                if candidate.raw.hero_image_url.is_some() && candidate.raw.hero_image_key.is_none()
                {
                    (i, self.upload_hero_image(candidate).await)
                } else {
                    (i, candidate)
                }
            }))
            .buffer_unordered(PDF_PARSE_CONCURRENCY)
            .collect()
            .await;

        let mut ordered: Vec<(usize, ScoredCandidate)> = results;
        ordered.sort_by_key(|(i, _)| *i);
        ordered.into_iter().map(|(_, c)| c).collect()
    }
}

/// Fold parsed sections into the candidate: summaries into `raw_metadata`,
/// a longer abstract wins, affiliations fill `raw_institutions`.
fn merge_parsed(candidate: &mut RawCandidate, parsed: &ParsedDocument) {
    let evaluation = section_summary(
        &parsed.sections,
        &["evaluation", "experiments", "results", "performance"],
        SECTION_SUMMARY_MAX_CHARS,
    );
    let dataset = section_summary(
        &parsed.sections,
        &["dataset", "benchmark", "corpus", "data"],
        SECTION_SUMMARY_MAX_CHARS,
    );
    let baselines = section_summary(
        &parsed.sections,
        &["baselines", "comparison", "related work", "prior work"],
        SECTION_SUMMARY_MAX_CHARS,
    );

    if let Some(text) = evaluation {
        candidate
            .raw_metadata
            .insert("evaluation_summary".into(), text);
    }
    if let Some(text) = dataset {
        candidate.raw_metadata.insert("dataset_summary".into(), text);
    }
    if let Some(text) = baselines {
        candidate
            .raw_metadata
            .insert("baselines_summary".into(), text);
    }

    let current_len = candidate.abstract_text.as_deref().map_or(0, str::len);
    if parsed.abstract_text.len() > current_len {
        candidate.abstract_text = Some(parsed.abstract_text.clone());
    }

    if candidate.raw_institutions.is_none() {
        let institutions: Vec<String> = parsed
            .authors
            .iter()
            .filter_map(|a| a.affiliation.clone())
            .filter(|a| !a.trim().is_empty())
            .take(3)
            .collect();
        if !institutions.is_empty() {
            candidate.raw_institutions = Some(institutions.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parser::{ParsedAuthor, ParsedSection};
    use super::*;

    fn parsed() -> ParsedDocument {
        ParsedDocument {
            title: "Paper".into(),
            abstract_text: "A much longer parsed abstract with richer detail than the feed".into(),
            sections: vec![
                ParsedSection {
                    heading: "Experimental Results".into(),
                    text: "We evaluate on 500 tasks across three settings.".into(),
                },
                ParsedSection {
                    heading: "Benchmark Construction".into(),
                    text: "Tasks are mined from issue trackers.".into(),
                },
                ParsedSection {
                    heading: "Comparison to Prior Work".into(),
                    text: "We compare against strong baselines.".into(),
                },
            ],
            authors: vec![
                ParsedAuthor {
                    name: "A. Person".into(),
                    affiliation: Some("Some University".into()),
                },
                ParsedAuthor {
                    name: "B. Person".into(),
                    affiliation: None,
                },
            ],
        }
    }

    #[test]
    fn merge_attaches_summaries_and_institutions() {
        let mut candidate = RawCandidate::new(
            "A Benchmark Paper",
            "https://arxiv.org/abs/2401.11111",
            Source::Arxiv,
        );
        candidate.abstract_text = Some("short".into());

        merge_parsed(&mut candidate, &parsed());

        assert!(candidate
            .raw_metadata
            .get("evaluation_summary")
            .unwrap()
            .contains("500 tasks"));
        assert!(candidate
            .raw_metadata
            .get("dataset_summary")
            .unwrap()
            .contains("issue trackers"));
        assert!(candidate
            .raw_metadata
            .get("baselines_summary")
            .unwrap()
            .contains("strong baselines"));
        // The longer parsed abstract replaces the short feed abstract.
        assert!(candidate.abstract_text.as_deref().unwrap().contains("richer detail"));
        assert_eq!(candidate.raw_institutions.as_deref(), Some("Some University"));
    }

    #[test]
    fn merge_keeps_longer_existing_abstract() {
        let mut candidate = RawCandidate::new(
            "A Benchmark Paper",
            "https://arxiv.org/abs/2401.11111",
            Source::Arxiv,
        );
        let long = "x".repeat(500);
        candidate.abstract_text = Some(long.clone());
        merge_parsed(&mut candidate, &parsed());
        assert_eq!(candidate.abstract_text.as_deref(), Some(long.as_str()));
    }

    #[tokio::test]
    async fn hero_upload_without_uploader_passes_through() {
        use benchscout_common::{ScoreSet, ScoreWeights};

        let enhancer = PdfEnhancer::new(
            std::env::temp_dir().join("benchscout-test-pdf"),
            None,
            None,
            CacheClient::disabled(),
        );
        let mut raw = RawCandidate::new(
            "Repo with a figure",
            "https://github.com/a/figured",
            Source::Github,
        );
        raw.hero_image_url = Some("https://example.com/fig.png".into());
        let scored = ScoredCandidate::from_parts(raw, ScoreSet::default(), &ScoreWeights::default());

        let out = enhancer.upload_hero_images(vec![scored]).await;
        assert_eq!(out.len(), 1);
        // No uploader configured: the URL stays, the key stays empty.
        assert!(out[0].raw.hero_image_key.is_none());
        assert!(out[0].raw.hero_image_url.is_some());
    }

    #[tokio::test]
    async fn non_arxiv_candidates_pass_through_in_order() {
        let enhancer = PdfEnhancer::new(
            std::env::temp_dir().join("benchscout-test-pdf"),
            None,
            None,
            CacheClient::disabled(),
        );
        let a = RawCandidate::new("First repository", "https://github.com/a/a", Source::Github);
        let b = RawCandidate::new("Second repository", "https://github.com/b/b", Source::Helm);
        let out = enhancer.enhance_batch(vec![a, b]).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "First repository");
        assert_eq!(out[1].title, "Second repository");
    }
}
