//! PubMed E-utilities client.
//!
//! Two-phase protocol:
//!   esearch: query → PMID list (JSON)
//!   efetch:  PMID list → PubmedArticleSet (XML)

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use litmux_common::config::PubMedConfig;
use litmux_common::sandbox::SandboxClient as Client;
use litmux_common::{Article, Author, SourceKind};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use super::{collect_records, LiteratureSource, RecordOutcome};
use crate::normalise::{clean_text, derive_metrics, derive_tags};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub struct PubMedClient {
    client: Client,
    api_key: Option<SecretString>,
    esearch_url: String,
    efetch_url: String,
}

impl PubMedClient {
    pub fn new(client: Client, config: &PubMedConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone().map(SecretString::from),
            esearch_url: config.esearch_url.clone(),
            efetch_url: config.efetch_url.clone(),
        }
    }

    fn with_api_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.expose_secret().to_string()));
        }
        params
    }

    /// Search PubMed and return a list of PMIDs.
    #[instrument(skip(self))]
    async fn esearch(&self, query: &str, max: usize) -> anyhow::Result<Vec<String>> {
        let params = self.with_api_key(vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", max.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
        ]);

        let resp: serde_json::Value = self.client
            .get(&self.esearch_url)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ids = parse_esearch_ids(&resp);
        debug!(count = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch PubMed XML for a list of PMIDs.
    #[instrument(skip(self, pmids), fields(count = pmids.len()))]
    async fn efetch(&self, pmids: &[String]) -> anyhow::Result<String> {
        let params = self.with_api_key(vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("rettype", "abstract".to_string()),
            ("retmode", "xml".to_string()),
        ]);

        let xml = self.client
            .get(&self.efetch_url)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(xml)
    }
}

#[async_trait]
impl LiteratureSource for PubMedClient {
    fn kind(&self) -> SourceKind {
        SourceKind::PubMed
    }

    fn build_query(&self, text: &str, categories: &[String]) -> Option<String> {
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
        let terms: Vec<String> = categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| format!("\"{}\"", c.replace('-', " ")))
            .collect();
        (!terms.is_empty()).then(|| terms.join(" OR "))
    }

    #[instrument(skip(self))]
    async fn fetch(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Article>> {
        let pmids = self.esearch(query, max_results).await?;
        if pmids.is_empty() {
            return Ok(vec![]);
        }
        let xml = self.efetch(&pmids).await?;
        let today = Utc::now().date_naive();
        Ok(collect_records(SourceKind::PubMed, parse_efetch_xml(&xml, today)))
    }
}

pub fn parse_esearch_ids(resp: &serde_json::Value) -> Vec<String> {
    resp["esearchresult"]["idlist"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Default)]
struct RawAuthor {
    last: String,
    fore: String,
    collective: String,
    affiliation: Option<String>,
}

impl RawAuthor {
    fn into_author(self) -> Option<Author> {
        let last = clean_text(&self.last);
        let fore = clean_text(&self.fore);
        let name = match (fore.is_empty(), last.is_empty()) {
            (false, false) => format!("{} {}", fore, last),
            (true, false) => last,
            _ => clean_text(&self.collective),
        };
        if name.is_empty() {
            return None;
        }
        Some(Author {
            name,
            affiliation: self.affiliation.map(|a| clean_text(&a)).filter(|a| !a.is_empty()),
        })
    }
}

#[derive(Default)]
struct RawRecord {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<Author>,
    year: String,
    month: String,
    day: String,
    medline_date: String,
    doi: Option<String>,
    elocation_doi: Option<String>,
    keywords: Vec<String>,
}

impl RawRecord {
    fn into_outcome(self, today: NaiveDate) -> RecordOutcome {
        let Some(pmid) = self.pmid.filter(|p| !p.is_empty()) else {
            return RecordOutcome::skipped("record without PMID");
        };
        let title = clean_text(&self.title);
        if title.is_empty() {
            return RecordOutcome::skipped(format!("PMID {pmid} has no title"));
        }
        let abstract_text = clean_text(&self.abstract_parts.join(" "));
        let publication_date = assemble_date(&self.year, &self.month, &self.day, &self.medline_date);
        if publication_date.is_none() {
            debug!(%pmid, "no usable publication date");
        }

        let mut article = Article::new(
            format!("pubmed-{pmid}"),
            title,
            SourceKind::PubMed,
            format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"),
        );
        let tag_text = format!("{} {} {}", article.title, abstract_text, self.keywords.join(" "));
        article.tags = derive_tags(&tag_text, SourceKind::PubMed);
        article.categories = article.tags.clone();
        article.metrics = derive_metrics(&abstract_text, publication_date, article.source.source_type, today);
        article.abstract_text = abstract_text;
        article.authors = self.authors;
        article.keywords = self.keywords;
        article.doi = self.doi.or(self.elocation_doi);
        article.external_id = Some(pmid);
        article.publication_date = publication_date;
        RecordOutcome::Parsed(article)
    }
}

/// Month number from "3", "03", "Mar" or "March".
fn month_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let prefix: String = raw.chars().take(3).collect::<String>().to_lowercase();
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

/// Builds a date from PubDate parts, falling back to a free-form
/// MedlineDate such as "1998 Dec-1999 Jan". Missing month/day → 1.
fn assemble_date(year: &str, month: &str, day: &str, medline_date: &str) -> Option<NaiveDate> {
    let mut tokens = medline_date.split_whitespace();
    let (year, month) = if year.trim().is_empty() {
        let y = tokens.next().unwrap_or("");
        let m = tokens.next().unwrap_or("");
        (y.get(..4).unwrap_or(y), m.split('-').next().unwrap_or(""))
    } else {
        (year.trim(), month)
    };

    let year: i32 = year.parse().ok()?;
    let month = month_number(month).unwrap_or(1);
    let day: u32 = day.trim().parse().unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parent(stack: &[String]) -> Option<&str> {
    stack.len().checked_sub(2).map(|i| stack[i].as_str())
}

fn within(stack: &[String], name: &str) -> bool {
    stack.iter().any(|n| n == name)
}

/// Parse an efetch PubmedArticleSet into one outcome per PubmedArticle.
///
/// A syntax error stops parsing; records completed before it are kept.
pub fn parse_efetch_xml(xml: &str, today: NaiveDate) -> Vec<RecordOutcome> {
    let mut outcomes = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RawRecord> = None;
    let mut author = RawAuthor::default();
    let mut article_id_type: Option<String> = None;
    let mut elocation_type: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => current = Some(RawRecord::default()),
                    "Author" => author = RawAuthor::default(),
                    "AbstractText" => {
                        if let Some(rec) = current.as_mut() {
                            rec.abstract_parts.push(String::new());
                        }
                    }
                    "ArticleId" => article_id_type = attr(e, "IdType"),
                    "ELocationID" => elocation_type = attr(e, "EIdType"),
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let Some(rec) = current.as_mut() else { continue };
                let text = match e.unescape() {
                    Ok(t) => t,
                    Err(err) => {
                        warn!(error = %err, "undecodable text in PubMed XML");
                        continue;
                    }
                };
                route_text(&stack, rec, &mut author, &article_id_type, &elocation_type, &text);
            }
            Ok(Event::End(ref e)) => {
                stack.pop();
                match e.name().as_ref() {
                    b"Author" => {
                        let done = std::mem::take(&mut author);
                        if let (Some(rec), Some(a)) = (current.as_mut(), done.into_author()) {
                            rec.authors.push(a);
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(rec) = current.take() {
                            outcomes.push(rec.into_outcome(today));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, parsed = outcomes.len(), "PubMed XML parse error");
                break;
            }
            _ => {}
        }
    }

    outcomes
}

fn route_text(
    stack: &[String],
    rec: &mut RawRecord,
    author: &mut RawAuthor,
    article_id_type: &Option<String>,
    elocation_type: &Option<String>,
    text: &str,
) {
    // Cited and correcting articles carry their own PMIDs and DOIs.
    if within(stack, "ReferenceList") || within(stack, "CommentsCorrectionsList") {
        return;
    }
    if within(stack, "ArticleTitle") {
        rec.title.push_str(text);
        return;
    }
    if within(stack, "AbstractText") {
        if let Some(part) = rec.abstract_parts.last_mut() {
            part.push_str(text);
        }
        return;
    }

    let Some(current) = stack.last().map(String::as_str) else { return };
    let parent = parent(stack);
    match current {
        "PMID" if parent == Some("MedlineCitation") && rec.pmid.is_none() => {
            rec.pmid = Some(text.trim().to_string());
        }
        "LastName" if within(stack, "Author") => author.last.push_str(text),
        "ForeName" if within(stack, "Author") => author.fore.push_str(text),
        "CollectiveName" if within(stack, "Author") => author.collective.push_str(text),
        "Affiliation" if within(stack, "Author") && author.affiliation.is_none() => {
            author.affiliation = Some(text.to_string());
        }
        "Year" if within(stack, "PubDate") => rec.year.push_str(text),
        "Month" if within(stack, "PubDate") => rec.month.push_str(text),
        "Day" if within(stack, "PubDate") => rec.day.push_str(text),
        "MedlineDate" if within(stack, "PubDate") => rec.medline_date.push_str(text),
        "ArticleId"
            if within(stack, "PubmedData")
                && article_id_type.as_deref() == Some("doi")
                && rec.doi.is_none() =>
        {
            rec.doi = Some(text.trim().to_string()).filter(|d| !d.is_empty());
        }
        "ELocationID" if elocation_type.as_deref() == Some("doi") => {
            rec.elocation_doi = Some(text.trim().to_string()).filter(|d| !d.is_empty());
        }
        "Keyword" | "DescriptorName" => {
            let keyword = clean_text(text);
            if !keyword.is_empty() && !rec.keywords.contains(&keyword) {
                rec.keywords.push(keyword);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litmux_test_utils::PUBMED_EFETCH_XML;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn parsed(xml: &str) -> (Vec<Article>, usize) {
        let outcomes = parse_efetch_xml(xml, today());
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Skipped { .. }))
            .count();
        (collect_records(SourceKind::PubMed, outcomes), skipped)
    }

    #[test]
    fn test_parse_fixture_record_set() {
        let (articles, skipped) = parsed(PUBMED_EFETCH_XML);
        assert_eq!(articles.len(), 2);
        assert_eq!(skipped, 1);

        let a = &articles[0];
        assert_eq!(a.id, "pubmed-38000001");
        assert_eq!(a.external_id.as_deref(), Some("38000001"));
        assert_eq!(a.title, "Base editing with CRISPR Cas9 in primary T cells.");
        assert_eq!(
            a.abstract_text,
            "Gene editing enables precise changes. We edited 90% of cells. Off-target effects were rare."
        );
        assert_eq!(a.publication_date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(a.doi.as_deref(), Some("10.1038/s41587-024-00001-X"));
        assert_eq!(a.authors[0].name, "Jennifer A Doudna");
        assert_eq!(a.authors[0].affiliation.as_deref(), Some("University of California, Berkeley."));
        assert_eq!(a.authors[1].name, "David R Liu");
        assert_eq!(a.keywords, vec!["base editing".to_string(), "CRISPR".to_string()]);
        assert!(a.tags.contains(&"genomics".to_string()));
        assert_eq!(a.source.name, "PubMed");
        assert_eq!(a.metrics.impact_score, 0.6);
        assert_eq!(a.metrics.novelty_score, 1.0);
    }

    #[test]
    fn test_reference_dois_are_ignored() {
        let (articles, _) = parsed(PUBMED_EFETCH_XML);
        let b = &articles[1];
        assert_eq!(b.doi, None);
        assert_eq!(b.publication_date, NaiveDate::from_ymd_opt(2023, 11, 1));
        assert_eq!(b.authors[0].name, "BCI Consortium");
        assert!(b.tags.contains(&"machine-learning".to_string()));
    }

    #[test]
    fn test_empty_record_set() {
        let (articles, skipped) = parsed("<PubmedArticleSet></PubmedArticleSet>");
        assert!(articles.is_empty());
        assert_eq!(skipped, 0);
        assert!(parse_efetch_xml("", today()).is_empty());
    }

    #[test]
    fn test_truncated_xml_keeps_completed_records() {
        let cut = PUBMED_EFETCH_XML.find("<PMID Version=\"1\">38000002").unwrap();
        let (articles, _) = parsed(&PUBMED_EFETCH_XML[..cut]);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "pubmed-38000001");
    }

    #[test]
    fn test_month_names_and_medline_dates() {
        assert_eq!(assemble_date("2020", "Sep", "", ""), NaiveDate::from_ymd_opt(2020, 9, 1));
        assert_eq!(assemble_date("2020", "September", "15", ""), NaiveDate::from_ymd_opt(2020, 9, 15));
        assert_eq!(assemble_date("2021", "02", "30", ""), NaiveDate::from_ymd_opt(2021, 2, 1));
        assert_eq!(assemble_date("", "", "", "1998 Dec-1999 Jan"), NaiveDate::from_ymd_opt(1998, 12, 1));
        assert_eq!(assemble_date("", "", "", ""), None);
        assert_eq!(month_number("13"), None);
        assert_eq!(month_number("Winter"), None);
    }

    #[test]
    fn test_esearch_ids() {
        let v: serde_json::Value = serde_json::from_str(litmux_test_utils::PUBMED_ESEARCH_JSON).unwrap();
        assert_eq!(parse_esearch_ids(&v), vec!["38000001".to_string(), "38000002".to_string()]);
        assert!(parse_esearch_ids(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_build_query() {
        let client = PubMedClient::new(Client::new().unwrap(), &PubMedConfig::default());
        assert_eq!(client.build_query(" CRISPR ", &[]), Some("CRISPR".to_string()));
        assert_eq!(
            client.build_query("", &["gene-therapy".to_string(), "genomics".to_string()]),
            Some("\"gene therapy\" OR \"genomics\"".to_string())
        );
        assert_eq!(client.build_query("  ", &[]), None);
    }
}
