//! arXiv Atom API client.
//! Endpoint: https://export.arxiv.org/api/query

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use litmux_common::config::ArxivConfig;
use litmux_common::sandbox::SandboxClient as Client;
use litmux_common::{Article, Author, SourceKind};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, instrument, warn};

use super::{collect_records, LiteratureSource, RecordOutcome};
use crate::normalise::{clean_text, derive_metrics, derive_tags};

lazy_static! {
    static ref VERSION_SUFFIX: Regex = Regex::new(r"v\d+$").unwrap();
}

/// Platform category used when no listed arXiv category is mapped.
pub const DEFAULT_CATEGORY: &str = "ai";

/// arXiv taxonomy code → platform category.
static CATEGORY_MAP: &[(&str, &str)] = &[
    ("cs.HC",          "brain-computer-interface"),
    ("q-bio.NC",       "neuroscience"),
    ("cs.AI",          "ai"),
    ("cs.LG",          "machine-learning"),
    ("stat.ML",        "machine-learning"),
    ("cs.NE",          "machine-learning"),
    ("cs.CV",          "computer-vision"),
    ("cs.CL",          "nlp"),
    ("cs.RO",          "robotics"),
    ("eess.SP",        "signal-processing"),
    ("q-bio.GN",       "genomics"),
    ("q-bio.BM",       "biotechnology"),
    ("q-bio.QM",       "biology"),
    ("physics.med-ph", "medicine"),
];

pub fn map_category(code: &str) -> Option<&'static str> {
    CATEGORY_MAP
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, platform)| *platform)
}

/// Mapped platform categories for `codes`, deduplicated in order.
pub fn platform_categories(codes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for platform in codes.iter().filter_map(|c| map_category(c)) {
        if !out.iter().any(|o| o == platform) {
            out.push(platform.to_string());
        }
    }
    if out.is_empty() {
        out.push(DEFAULT_CATEGORY.to_string());
    }
    out
}

/// arXiv codes to browse for a platform category (or a literal arXiv code).
fn codes_for(category: &str) -> Vec<&'static str> {
    CATEGORY_MAP
        .iter()
        .filter(|(code, platform)| platform.eq_ignore_ascii_case(category) || code.eq_ignore_ascii_case(category))
        .map(|(code, _)| *code)
        .collect()
}

pub struct ArxivClient {
    client: Client,
    query_url: String,
}

impl ArxivClient {
    pub fn new(client: Client, config: &ArxivConfig) -> Self {
        Self { client, query_url: config.query_url.clone() }
    }
}

#[async_trait]
impl LiteratureSource for ArxivClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    fn build_query(&self, text: &str, categories: &[String]) -> Option<String> {
        let words: Vec<String> = text.split_whitespace().map(|w| format!("all:{w}")).collect();
        if !words.is_empty() {
            return Some(words.join(" AND "));
        }

        let mut codes: Vec<String> = Vec::new();
        for category in categories.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            let mapped = codes_for(category);
            if mapped.is_empty() && category.contains('.') {
                codes.push(category.to_string());
            }
            for code in mapped {
                if !codes.iter().any(|c| c == code) {
                    codes.push(code.to_string());
                }
            }
        }
        let expr: Vec<String> = codes.iter().map(|c| format!("cat:{c}")).collect();
        (!expr.is_empty()).then(|| expr.join(" OR "))
    }

    #[instrument(skip(self))]
    async fn fetch(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Article>> {
        let sort_by = if query.starts_with("cat:") { "submittedDate" } else { "relevance" };
        let params = [
            ("search_query", query.to_string()),
            ("start", "0".to_string()),
            ("max_results", max_results.to_string()),
            ("sortBy", sort_by.to_string()),
            ("sortOrder", "descending".to_string()),
        ];

        let xml = self.client
            .get(&self.query_url)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let today = Utc::now().date_naive();
        let mut articles = collect_records(SourceKind::Arxiv, parse_atom(&xml, today));
        articles.truncate(max_results);
        debug!(count = articles.len(), "arXiv returned entries");
        Ok(articles)
    }
}

#[derive(Default)]
struct RawEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    doi: String,
    link: Option<String>,
    codes: Vec<String>,
    authors: Vec<Author>,
}

impl RawEntry {
    fn add_code(&mut self, term: &str, primary: bool) {
        let code = term.trim().to_lowercase();
        if code.is_empty() || self.codes.contains(&code) {
            return;
        }
        if primary {
            self.codes.insert(0, code);
        } else {
            self.codes.push(code);
        }
    }

    fn into_outcome(self, today: NaiveDate) -> RecordOutcome {
        let raw_id = self.id.trim();
        let id = raw_id.rsplit_once("/abs/").map_or(raw_id, |(_, id)| id);
        let id = VERSION_SUFFIX.replace(id, "").into_owned();
        if id.is_empty() {
            return RecordOutcome::skipped("entry without id");
        }
        let title = clean_text(&self.title);
        if title.is_empty() {
            return RecordOutcome::skipped(format!("arXiv {id} has no title"));
        }

        let summary = clean_text(&self.summary);
        let published = self
            .published
            .trim()
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        let url = self.link.unwrap_or_else(|| format!("https://arxiv.org/abs/{id}"));

        let mut article = Article::new(format!("arxiv-{id}"), title, SourceKind::Arxiv, url);
        article.tags = derive_tags(&format!("{} {}", article.title, summary), SourceKind::Arxiv);
        article.categories = platform_categories(&self.codes);
        article.metrics = derive_metrics(&summary, published, article.source.source_type, today);
        article.abstract_text = summary;
        article.keywords = self.codes;
        article.authors = self.authors;
        article.doi = Some(self.doi.trim().to_string()).filter(|d| !d.is_empty());
        article.external_id = Some(id);
        article.publication_date = published;
        RecordOutcome::Parsed(article)
    }
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Handles elements whose content lives in attributes; these may arrive
/// either self-closed or as a start tag.
fn on_attribute_element(e: &BytesStart, entry: &mut RawEntry) {
    match e.local_name().as_ref() {
        b"category" => {
            if let Some(term) = attr(e, "term") {
                entry.add_code(&term, false);
            }
        }
        b"primary_category" => {
            if let Some(term) = attr(e, "term") {
                entry.add_code(&term, true);
            }
        }
        b"link" => {
            if attr(e, "rel").as_deref() == Some("alternate") {
                entry.link = attr(e, "href");
            }
        }
        _ => {}
    }
}

/// Parse an Atom feed into one outcome per `<entry>`.
pub fn parse_atom(xml: &str, today: NaiveDate) -> Vec<RecordOutcome> {
    let mut outcomes = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut author_name = String::new();
    let mut author_affiliation = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "entry" => current = Some(RawEntry::default()),
                    "author" => {
                        author_name.clear();
                        author_affiliation.clear();
                    }
                    _ => {
                        if let Some(entry) = current.as_mut() {
                            on_attribute_element(e, entry);
                        }
                    }
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(entry) = current.as_mut() {
                    on_attribute_element(e, entry);
                }
            }
            Ok(Event::Text(ref e)) => {
                let Some(entry) = current.as_mut() else { continue };
                let text = match e.unescape() {
                    Ok(t) => t,
                    Err(err) => {
                        warn!(error = %err, "undecodable text in arXiv feed");
                        continue;
                    }
                };
                let in_author = stack.iter().any(|n| n == "author");
                let in_summary = stack.iter().any(|n| n == "summary");
                match stack.last().map(String::as_str) {
                    _ if in_summary => entry.summary.push_str(&text),
                    Some("name") if in_author => author_name.push_str(&text),
                    Some("affiliation") if in_author => author_affiliation.push_str(&text),
                    Some("id") => entry.id.push_str(&text),
                    Some("title") => entry.title.push_str(&text),
                    Some("published") => entry.published.push_str(&text),
                    Some("doi") => entry.doi.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                stack.pop();
                match e.local_name().as_ref() {
                    b"author" => {
                        let name = clean_text(&author_name);
                        if let (Some(entry), false) = (current.as_mut(), name.is_empty()) {
                            let affiliation = clean_text(&author_affiliation);
                            entry.authors.push(Author {
                                name,
                                affiliation: (!affiliation.is_empty()).then_some(affiliation),
                            });
                        }
                    }
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            outcomes.push(entry.into_outcome(today));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, parsed = outcomes.len(), "arXiv XML parse error");
                break;
            }
            _ => {}
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use litmux_test_utils::{ARXIV_ATOM_XML, ARXIV_EMPTY_ATOM_XML};
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn client() -> ArxivClient {
        ArxivClient::new(Client::new().unwrap(), &ArxivConfig::default())
    }

    #[test]
    fn test_parse_atom_entries() {
        let articles = collect_records(SourceKind::Arxiv, parse_atom(ARXIV_ATOM_XML, today()));
        assert_eq!(articles.len(), 2);

        let a = &articles[0];
        assert_eq!(a.id, "arxiv-2401.01234");
        assert_eq!(a.external_id.as_deref(), Some("2401.01234"));
        assert_eq!(a.title, "A Brain-Computer Interface for Speech Decoding");
        assert_eq!(
            a.abstract_text,
            "We present a neural interface that decodes attempted speech from cortical activity."
        );
        assert_eq!(a.authors.len(), 2);
        assert_eq!(a.authors[0].affiliation.as_deref(), Some("Analytical Engine Lab"));
        assert_eq!(a.keywords, vec!["cs.hc".to_string(), "q-bio.nc".to_string()]);
        assert_eq!(
            a.categories,
            vec!["brain-computer-interface".to_string(), "neuroscience".to_string()]
        );
        assert_eq!(a.publication_date, NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(a.doi.as_deref(), Some("10.48550/arXiv.2401.01234"));
        assert_eq!(a.source.url, "http://arxiv.org/abs/2401.01234v2");
        assert_eq!(a.source.name, "arXiv");
    }

    #[test]
    fn test_unmapped_category_defaults_to_ai() {
        let articles = collect_records(SourceKind::Arxiv, parse_atom(ARXIV_ATOM_XML, today()));
        assert_eq!(articles[1].categories, vec![DEFAULT_CATEGORY.to_string()]);
        assert_eq!(articles[1].keywords, vec!["math.st".to_string()]);
        assert_eq!(articles[1].doi, None);
    }

    #[test]
    fn test_empty_feed() {
        assert!(parse_atom(ARXIV_EMPTY_ATOM_XML, today()).is_empty());
        assert!(parse_atom("", today()).is_empty());
    }

    #[test]
    fn test_category_map_is_case_insensitive() {
        assert_eq!(map_category("cs.hc"), Some("brain-computer-interface"));
        assert_eq!(map_category("Q-BIO.NC"), Some("neuroscience"));
        assert_eq!(map_category("astro-ph.GA"), None);
        assert_eq!(
            platform_categories(&["cs.lg".to_string(), "stat.ml".to_string()]),
            vec!["machine-learning".to_string()]
        );
    }

    #[test]
    fn test_free_text_query() {
        assert_eq!(
            client().build_query("CRISPR gene editing", &[]),
            Some("all:CRISPR AND all:gene AND all:editing".to_string())
        );
    }

    #[test]
    fn test_category_browse_query() {
        let q = client().build_query(
            "",
            &["brain-computer-interface".to_string(), "q-bio.NC".to_string(), "astro-ph.GA".to_string()],
        );
        assert_eq!(q, Some("cat:cs.HC OR cat:q-bio.NC OR cat:astro-ph.GA".to_string()));
        assert_eq!(client().build_query("", &["unknown".to_string()]), None);
    }
}
