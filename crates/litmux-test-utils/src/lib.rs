//! Shared fixtures and builders for litmux tests.

use chrono::NaiveDate;
use litmux_common::{Article, ArticleStatus, Author, SourceKind};

/// Fluent builder for `Article` test values.
#[derive(Debug, Clone)]
pub struct ArticleBuilder {
    article: Article,
}

impl ArticleBuilder {
    /// A PubMed-flavoured article with the given id and an empty title.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            article: Article::new(id, "", SourceKind::PubMed, "https://example.org/"),
        }
    }

    pub fn source(mut self, kind: SourceKind) -> Self {
        self.article.source.name = kind.display_name().to_string();
        self.article.source.source_type = kind.source_type();
        self.article.status = kind.default_status();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.article.title = title.to_string();
        self
    }

    pub fn abstract_text(mut self, text: &str) -> Self {
        self.article.abstract_text = text.to_string();
        self
    }

    pub fn doi(mut self, doi: &str) -> Self {
        self.article.doi = Some(doi.to_string());
        self
    }

    pub fn authors(mut self, names: &[&str]) -> Self {
        self.article.authors = names.iter().map(|n| Author::named(*n)).collect();
        self
    }

    pub fn categories(mut self, categories: &[&str]) -> Self {
        self.article.categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.article.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn published(mut self, year: i32, month: u32, day: u32) -> Self {
        self.article.publication_date = NaiveDate::from_ymd_opt(year, month, day);
        self
    }

    pub fn citations(mut self, count: u32) -> Self {
        self.article.citation_count = count;
        self
    }

    pub fn trending(mut self, score: f64) -> Self {
        self.article.trending_score = score;
        self
    }

    pub fn impact(mut self, score: f64) -> Self {
        self.article.metrics.impact_score = score;
        self
    }

    pub fn status(mut self, status: ArticleStatus) -> Self {
        self.article.status = status;
        self
    }

    /// Marks the article as coming from the local store.
    pub fn local(mut self) -> Self {
        self.article.is_local = true;
        self.article.source.name = "local".to_string();
        self
    }

    pub fn build(self) -> Article {
        self.article
    }
}

/// esearch.fcgi response listing two PMIDs.
pub const PUBMED_ESEARCH_JSON: &str = r#"{
  "header": {"type": "esearch", "version": "0.3"},
  "esearchresult": {
    "count": "2", "retmax": "2", "retstart": "0",
    "idlist": ["38000001", "38000002"],
    "translationset": [], "querytranslation": "CRISPR gene editing"
  }
}"#;

/// esearch.fcgi response with no hits.
pub const PUBMED_ESEARCH_EMPTY_JSON: &str = r#"{
  "header": {"type": "esearch", "version": "0.3"},
  "esearchresult": {"count": "0", "retmax": "0", "retstart": "0", "idlist": []}
}"#;

/// efetch.fcgi record set: two well-formed records and one without a title.
pub const PUBMED_EFETCH_XML: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">38000001</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <Title>Nature Biotechnology</Title>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2024</Year><Month>Mar</Month><Day>05</Day></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Base editing with <i>CRISPR</i>   Cas9 in primary T cells.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Gene editing enables <b>precise</b> changes.</AbstractText>
          <AbstractText Label="RESULTS">We edited 90% of cells. Off-target effects were rare.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y">
            <LastName>Doudna</LastName><ForeName>Jennifer A</ForeName><Initials>JA</Initials>
            <AffiliationInfo><Affiliation>University of California, Berkeley.</Affiliation></AffiliationInfo>
          </Author>
          <Author ValidYN="Y">
            <LastName>Liu</LastName><ForeName>David R</ForeName><Initials>DR</Initials>
          </Author>
        </AuthorList>
        <ELocationID EIdType="doi" ValidYN="Y">10.1038/s41587-024-00001-x</ELocationID>
      </Article>
      <KeywordList Owner="NOTNLM">
        <Keyword MajorTopicYN="N">base editing</Keyword>
        <Keyword MajorTopicYN="N">CRISPR</Keyword>
      </KeywordList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">38000001</ArticleId>
        <ArticleId IdType="doi">10.1038/s41587-024-00001-X</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference>
          <Citation>Some earlier work.</Citation>
          <ArticleIdList><ArticleId IdType="doi">10.1000/reference-doi</ArticleId></ArticleIdList>
        </Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">38000002</PMID>
      <Article PubModel="Print">
        <Journal>
          <Title>Journal of Neural Engineering</Title>
          <JournalIssue>
            <PubDate><Year>2023</Year><Month>11</Month></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Decoding motor imagery from EEG with deep learning.</ArticleTitle>
        <AuthorList>
          <Author><CollectiveName>BCI Consortium</CollectiveName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList><ArticleId IdType="pubmed">38000002</ArticleId></ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation Status="In-Process" Owner="NLM">
      <PMID Version="1">38000003</PMID>
      <Article PubModel="Print">
        <Journal><Title>Broken Records</Title></Journal>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

/// arXiv Atom feed with two entries.
pub const ARXIV_ATOM_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=all:brain</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2024-02-01T00:00:00-05:00</updated>
  <opensearch:totalResults>2</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v2</id>
    <updated>2024-01-10T12:00:00Z</updated>
    <published>2024-01-03T18:30:00Z</published>
    <title>A Brain-Computer Interface
      for Speech Decoding</title>
    <summary>  We present a neural interface that decodes <em>attempted</em> speech
      from cortical activity.  </summary>
    <author><name>Ada Lovelace</name><arxiv:affiliation>Analytical Engine Lab</arxiv:affiliation></author>
    <author><name>Alan Turing</name></author>
    <arxiv:doi>10.48550/arXiv.2401.01234</arxiv:doi>
    <link href="http://arxiv.org/abs/2401.01234v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.01234v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.HC" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.HC" scheme="http://arxiv.org/schemas/atom"/>
    <category term="q-bio.NC" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2312.09999v1</id>
    <published>2023-12-15T09:00:00Z</published>
    <title>Scaling Laws for Sparse Mixtures</title>
    <summary>We study scaling of sparse models.</summary>
    <author><name>Grace Hopper</name></author>
    <arxiv:primary_category term="math.ST" scheme="http://arxiv.org/schemas/atom"/>
    <category term="math.ST" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

/// arXiv Atom feed with no entries.
pub const ARXIV_EMPTY_ATOM_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:nothing</title>
  <id>http://arxiv.org/api/empty</id>
</feed>"#;

/// bioRxiv details collection: two neuroscience items, one biotech, one
/// without a title.
pub const BIORXIV_DETAILS_JSON: &str = r#"{
  "messages": [{"status": "ok", "count": 4, "total": 4, "cursor": 0}],
  "collection": [
    {
      "doi": "10.1101/2024.01.01.000001",
      "title": "Cortical NEURONS encode reward prediction",
      "authors": "Smith, J.; Doe, A.",
      "author_corresponding": "Jane Smith",
      "author_corresponding_institution": "MIT",
      "date": "2024-01-02",
      "version": "1",
      "type": "new results",
      "category": "neuroscience",
      "abstract": "Recordings from mouse cortex.",
      "published": "NA",
      "server": "biorxiv"
    },
    {
      "doi": "10.1101/2024.01.05.000002",
      "title": "Astrocyte signalling in sleep",
      "authors": "Lee, K.",
      "date": "2024-01-06",
      "version": "2",
      "category": "cell biology",
      "abstract": "Glial control of neuromodulation during sleep.",
      "published": "NA"
    },
    {
      "doi": "10.1101/2024.02.01.000003",
      "title": "Biotech scale-up of enzyme production",
      "authors": "Garcia, M.; Chen, L.",
      "date": "2024-02-01",
      "version": "1",
      "category": "bioengineering",
      "abstract": "Fermentation yields improved fourfold.",
      "published": "NA"
    },
    {
      "doi": "10.1101/2024.02.02.000004",
      "title": "",
      "authors": "Nobody, N.",
      "date": "2024-02-02",
      "version": "1",
      "category": "neuroscience",
      "abstract": "A neuro abstract without a title.",
      "published": "NA"
    }
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let a = ArticleBuilder::new("x")
            .title("T")
            .doi("10.1/x")
            .citations(3)
            .source(SourceKind::Arxiv)
            .build();
        assert_eq!(a.id, "x");
        assert_eq!(a.title, "T");
        assert_eq!(a.doi.as_deref(), Some("10.1/x"));
        assert_eq!(a.source.name, "arXiv");
        assert_eq!(a.status, ArticleStatus::Preprint);
    }

    #[test]
    fn test_fixtures_are_valid_json() {
        for raw in [PUBMED_ESEARCH_JSON, PUBMED_ESEARCH_EMPTY_JSON, BIORXIV_DETAILS_JSON] {
            serde_json::from_str::<serde_json::Value>(raw).unwrap();
        }
    }
}
