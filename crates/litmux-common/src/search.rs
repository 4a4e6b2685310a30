//! Search request vocabulary shared by the HTTP layer and the aggregator:
//! result filters, sort keys and pagination.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::article::{Article, ArticleStatus};

/// Which article populations a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Local,
    External,
    #[default]
    All,
}

impl SearchType {
    pub fn includes_local(&self) -> bool { matches!(self, SearchType::Local | SearchType::All) }

    pub fn includes_external(&self) -> bool { matches!(self, SearchType::External | SearchType::All) }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local"    => Ok(SearchType::Local),
            "external" => Ok(SearchType::External),
            "all" | "" => Ok(SearchType::All),
            other => Err(format!("unknown search type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn contains(&self, value: T) -> bool {
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }
}

/// Post-merge result filters. Empty lists and open ranges match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub sources: Vec<String>,
    pub date_range: DateRange,
    pub citation_range: Range<u32>,
    pub impact_range: Range<f64>,
    pub status: Vec<ArticleStatus>,
}

impl SearchFilters {
    pub fn matches(&self, article: &Article) -> bool {
        if !self.categories.is_empty()
            && !article.categories.iter().any(|c| self.categories.iter().any(|f| f.eq_ignore_ascii_case(c)))
        {
            return false;
        }

        if !self.authors.is_empty() {
            let wanted: Vec<String> = self.authors.iter().map(|a| a.to_lowercase()).collect();
            let hit = article.authors.iter().any(|author| {
                let name = author.name.to_lowercase();
                wanted.iter().any(|w| name.contains(w))
            });
            if !hit {
                return false;
            }
        }

        if !self.sources.is_empty()
            && !self.sources.iter().any(|s| s.eq_ignore_ascii_case(&article.source.name)
                || (s.eq_ignore_ascii_case("local") && article.is_local))
        {
            return false;
        }

        if self.date_range.from.is_some() || self.date_range.to.is_some() {
            let Some(date) = article.publication_date else { return false };
            if self.date_range.from.map_or(false, |from| date < from)
                || self.date_range.to.map_or(false, |to| date > to)
            {
                return false;
            }
        }

        if !self.citation_range.contains(article.citation_count) {
            return false;
        }
        if !self.impact_range.contains(article.metrics.impact_score) {
            return false;
        }
        if !self.status.is_empty() && !self.status.contains(&article.status) {
            return false;
        }
        true
    }

    pub fn apply(&self, articles: Vec<Article>) -> Vec<Article> {
        articles.into_iter().filter(|a| self.matches(a)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Citations,
    Trending,
    Impact,
    Title,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relevance" | "" => Ok(SortBy::Relevance),
            "date" | "publicationdate" => Ok(SortBy::Date),
            "citations" | "citationcount" => Ok(SortBy::Citations),
            "trending" | "trendingscore" => Ok(SortBy::Trending),
            "impact" | "impactscore" => Ok(SortBy::Impact),
            "title" => Ok(SortBy::Title),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSpec {
    pub by: SortBy,
    pub order: SortOrder,
}

/// Stable sort. `Relevance` keeps the incoming (ranker) order when descending.
pub fn sort_articles(articles: &mut [Article], spec: SortSpec) {
    let cmp: fn(&Article, &Article) -> Ordering = match spec.by {
        SortBy::Relevance => |a, b| {
            a.search_score.unwrap_or(0.0).total_cmp(&b.search_score.unwrap_or(0.0))
        },
        SortBy::Date      => |a, b| a.publication_date.cmp(&b.publication_date),
        SortBy::Citations => |a, b| a.citation_count.cmp(&b.citation_count),
        SortBy::Trending  => |a, b| a.trending_score.total_cmp(&b.trending_score),
        SortBy::Impact    => |a, b| a.metrics.impact_score.total_cmp(&b.metrics.impact_score),
        SortBy::Title     => |a, b| a.normalized_title().cmp(&b.normalized_title()),
    };

    match (spec.by, spec.order) {
        (SortBy::Relevance, SortOrder::Desc) => {}
        (SortBy::Relevance, SortOrder::Asc) => articles.reverse(),
        (_, SortOrder::Asc) => articles.sort_by(cmp),
        (_, SortOrder::Desc) => articles.sort_by(|a, b| cmp(b, a)),
    }
}

pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_SIZE }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE),
        }
        .normalized()
    }

    /// Clamps page to ≥1 and limit to 1..=MAX_PAGE_SIZE.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Number of results needed to fill every page up to this one.
    pub fn window(&self) -> usize {
        self.page.saturating_mul(self.limit)
    }

    pub fn paginate<T>(&self, items: Vec<T>) -> (Vec<T>, PageInfo) {
        let p = self.normalized();
        let total = items.len();
        let start = (p.page - 1).saturating_mul(p.limit);
        let page_items: Vec<T> = items.into_iter().skip(start).take(p.limit).collect();
        let info = PageInfo {
            page: p.page,
            limit: p.limit,
            total,
            has_more: p.window() < total,
        };
        (page_items, info)
    }
}
