//! Dropdown menu handlers
//!
//! A menu handler answers `(input_text, page_start, page_limit)` with one
//! page of `{name, label, data}` items and a `more` flag. Results are cached
//! under the handler's base key extended with the request parameters.

use crate::error::QueryError;
use crate::filter::{ApiQuery, Filter, FilterOp};
use crate::page::{this_page, PageRange};
use crate::policy::CachePolicy;
use crate::response::{ListFetcher, ListResponse};
use crate::store::QueryCache;
use indexmap::IndexMap;
use scopecache_key::QueryKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Menu results stay fresh for 5 minutes and are kept for 10
pub const MENU_POLICY: CachePolicy =
    CachePolicy::new(Duration::from_secs(5 * 60), Duration::from_secs(10 * 60));

/// One selectable entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem<D> {
    /// Value submitted on selection
    pub name: String,
    /// Text shown to the user
    pub label: String,
    /// Source entity
    pub data: D,
}

/// One page of menu entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuResponse<D> {
    /// Entries on this page
    pub results: Vec<MenuItem<D>>,
    /// More pages follow
    pub more: bool,
}

fn has_more(page_start: u64, page_limit: u64, total_count: Option<u64>) -> bool {
    this_page(page_start, page_limit).saturating_mul(page_limit) < total_count.unwrap_or(0)
}

/// Creates menu handlers sharing one cache store
#[derive(Debug, Clone)]
pub struct MenuQueryHandlers {
    cache: QueryCache,
}

impl MenuQueryHandlers {
    /// Factory over `cache`
    #[must_use]
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    /// Handler searching a list verb
    #[must_use]
    pub fn list(&self, base_key: QueryKey, config: ListMenuConfig) -> ListMenuHandler {
        let mut defaults = vec![Filter::present(config.id_key.clone())];
        defaults.extend(fixed_filters(&config.fixed_filters));
        ListMenuHandler {
            cache: self.cache.clone(),
            base_key,
            default_filters: defaults,
            config,
        }
    }

    /// Handler over the distinct values of one field
    #[must_use]
    pub fn stat(&self, base_key: QueryKey, config: StatMenuConfig) -> StatMenuHandler {
        let mut defaults = vec![Filter::present(config.distinct.clone())];
        defaults.extend(fixed_filters(&config.fixed_filters));
        StatMenuHandler {
            cache: self.cache.clone(),
            base_key,
            default_filters: defaults,
            config,
        }
    }
}

fn fixed_filters(fixed: &IndexMap<String, Value>) -> impl Iterator<Item = Filter> + '_ {
    fixed
        .iter()
        .map(|(key, value)| Filter::new(key.clone(), value.clone(), FilterOp::Eq))
}

async fn fetch_page(
    cache: &QueryCache,
    base_key: &QueryKey,
    fetcher: &Arc<dyn ListFetcher<Value>>,
    params: Value,
) -> Result<Arc<ListResponse<Value>>, QueryError> {
    let key = base_key.with_suffix(&params);
    let fetcher = Arc::clone(fetcher);
    cache
        .get_or_fetch(&key, MENU_POLICY, move || async move { fetcher.list(params).await })
        .await
}

/// Configuration of a list menu
#[derive(Clone)]
pub struct ListMenuConfig {
    /// Transport for the list verb
    pub fetcher: Arc<dyn ListFetcher<Value>>,
    /// Field holding the entity id
    pub id_key: String,
    /// Fields to request
    pub only: Option<Vec<String>>,
    /// Equality filters always applied
    pub fixed_filters: IndexMap<String, Value>,
    /// Fields matched against the input text
    pub search_targets: Vec<String>,
}

impl ListMenuConfig {
    /// Config for `fetcher` keyed by `id_key`
    #[must_use]
    pub fn new(fetcher: Arc<dyn ListFetcher<Value>>, id_key: impl Into<String>) -> Self {
        Self {
            fetcher,
            id_key: id_key.into(),
            only: None,
            fixed_filters: IndexMap::new(),
            search_targets: Vec::new(),
        }
    }

    /// With requested fields
    #[must_use]
    pub fn with_only<I, S>(mut self, only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(only.into_iter().map(Into::into).collect());
        self
    }

    /// With an equality filter
    #[must_use]
    pub fn with_fixed_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fixed_filters.insert(key.into(), value.into());
        self
    }

    /// With search target fields
    #[must_use]
    pub fn with_search_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_targets = targets.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for ListMenuConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListMenuConfig")
            .field("id_key", &self.id_key)
            .field("only", &self.only)
            .field("fixed_filters", &self.fixed_filters)
            .field("search_targets", &self.search_targets)
            .finish_non_exhaustive()
    }
}

/// Menu over a list verb
#[derive(Debug, Clone)]
pub struct ListMenuHandler {
    cache: QueryCache,
    base_key: QueryKey,
    default_filters: Vec<Filter>,
    config: ListMenuConfig,
}

impl ListMenuHandler {
    /// Request parameters for one call
    #[must_use]
    pub fn params(&self, input_text: &str, page_start: u64, page_limit: u64) -> Value {
        let mut query = ApiQuery::new();
        query.filters.clone_from(&self.default_filters);
        if !input_text.is_empty() {
            for target in &self.config.search_targets {
                query = query.with_filter(Filter::new(target.clone(), input_text, FilterOp::Contain));
            }
        }
        if let Some(only) = &self.config.only {
            query = query.with_only(only.clone());
        }
        query
            .with_page(PageRange {
                start: page_start,
                limit: page_limit,
            })
            .into_params()
    }

    /// One page of entries matching `input_text`
    ///
    /// # Errors
    /// The fetcher's error, unchanged
    pub async fn handle(
        &self,
        input_text: &str,
        page_start: u64,
        page_limit: u64,
    ) -> Result<MenuResponse<Value>, QueryError> {
        let params = self.params(input_text, page_start, page_limit);
        let response = fetch_page(&self.cache, &self.base_key, &self.config.fetcher, params).await?;
        let id_key = self.config.id_key.as_str();

        let results = response
            .results
            .iter()
            .map(|item| MenuItem {
                name: text_field(item, id_key),
                label: text_field(item, "name"),
                data: item.clone(),
            })
            .collect();
        Ok(MenuResponse {
            results,
            more: has_more(page_start, page_limit, response.total_count),
        })
    }
}

fn text_field(item: &Value, field: &str) -> String {
    match item.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Configuration of a stat (distinct values) menu
#[derive(Clone)]
pub struct StatMenuConfig {
    /// Transport for the stat verb
    pub fetcher: Arc<dyn ListFetcher<Value>>,
    /// Field whose distinct values are listed
    pub distinct: String,
    /// Equality filters always applied
    pub fixed_filters: IndexMap<String, Value>,
}

impl StatMenuConfig {
    /// Config listing distinct values of `distinct`
    #[must_use]
    pub fn new(fetcher: Arc<dyn ListFetcher<Value>>, distinct: impl Into<String>) -> Self {
        Self {
            fetcher,
            distinct: distinct.into(),
            fixed_filters: IndexMap::new(),
        }
    }

    /// With an equality filter
    #[must_use]
    pub fn with_fixed_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fixed_filters.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for StatMenuConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatMenuConfig")
            .field("distinct", &self.distinct)
            .field("fixed_filters", &self.fixed_filters)
            .finish_non_exhaustive()
    }
}

/// Menu over the distinct values of a field
#[derive(Debug, Clone)]
pub struct StatMenuHandler {
    cache: QueryCache,
    base_key: QueryKey,
    default_filters: Vec<Filter>,
    config: StatMenuConfig,
}

impl StatMenuHandler {
    /// Request parameters for one call
    #[must_use]
    pub fn params(
        &self,
        input_text: &str,
        page_start: u64,
        page_limit: u64,
        selected: Option<&[String]>,
    ) -> Value {
        let distinct = self.config.distinct.as_str();
        let mut query = ApiQuery::new();
        query.filters.clone_from(&self.default_filters);
        if !input_text.is_empty() {
            query = query.with_filter(Filter::new(distinct, input_text, FilterOp::Contain));
        }
        if let Some(values) = selected {
            query = query.with_filter(Filter::new(distinct, values.to_vec(), FilterOp::Eq));
        }
        query
            .with_distinct(distinct)
            .with_page(PageRange {
                start: page_start,
                limit: page_limit,
            })
            .into_params()
    }

    /// One page of distinct values matching `input_text`
    ///
    /// `selected` restricts the values to a known set.
    ///
    /// # Errors
    /// The fetcher's error, unchanged
    pub async fn handle(
        &self,
        input_text: &str,
        page_start: u64,
        page_limit: u64,
        selected: Option<&[String]>,
    ) -> Result<MenuResponse<String>, QueryError> {
        let params = self.params(input_text, page_start, page_limit, selected);
        let response = fetch_page(&self.cache, &self.base_key, &self.config.fetcher, params).await?;

        let results = response
            .results
            .iter()
            .map(|value| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                MenuItem {
                    name: text.clone(),
                    label: text.clone(),
                    data: text,
                }
            })
            .collect();
        Ok(MenuResponse {
            results,
            more: has_more(page_start, page_limit, response.total_count),
        })
    }
}
