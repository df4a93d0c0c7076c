//! Page arithmetic and page placement by verb
//!
//! Pages are 1-based and `start` is the 1-based index of the first item.
//! `list`, `analyze`, `stat` and `get-data` carry the page under
//! `params.query.page`; `load` and `find` carry it at `params.page`.

use scopecache_key::{PagePlacement, Verb};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{start, limit}` page object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    /// 1-based index of the first item
    pub start: u64,
    /// Items per page
    pub limit: u64,
}

impl PageRange {
    /// Range covering page `page` of size `page_size`
    #[inline]
    #[must_use]
    pub fn for_page(page: u64, page_size: u64) -> Self {
        Self {
            start: page_start(page, page_size),
            limit: page_size,
        }
    }

    /// Page number this range starts
    #[inline]
    #[must_use]
    pub fn page(&self) -> u64 {
        this_page(self.start, self.limit)
    }

    fn to_value(self) -> Value {
        let mut page = Map::new();
        page.insert("start".to_string(), Value::from(self.start));
        page.insert("limit".to_string(), Value::from(self.limit));
        Value::Object(page)
    }
}

/// First item index of `page`
#[inline]
#[must_use]
pub fn page_start(page: u64, page_size: u64) -> u64 {
    page.max(1)
        .saturating_sub(1)
        .saturating_mul(page_size)
        .saturating_add(1)
}

/// Page number containing item `start`
#[inline]
#[must_use]
pub fn this_page(start: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 1;
    }
    start.max(1).saturating_sub(1) / limit + 1
}

/// Copy of `params` with `page` placed where `verb` expects it
///
/// Verbs that do not paginate get `params` back unchanged. Non-object
/// params are replaced by an object.
#[must_use]
pub fn add_page_to_params(verb: &Verb, params: &Value, page: PageRange) -> Value {
    let placement = verb.page_placement();
    if placement == PagePlacement::None {
        return params.clone();
    }

    let mut root = match params {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    match placement {
        PagePlacement::Query => {
            let query = root
                .entry("query")
                .or_insert_with(|| Value::Object(Map::new()));
            if !query.is_object() {
                *query = Value::Object(Map::new());
            }
            if let Value::Object(query) = query {
                query.insert("page".to_string(), page.to_value());
            }
        }
        PagePlacement::TopLevel => {
            root.insert("page".to_string(), page.to_value());
        }
        PagePlacement::None => {}
    }
    Value::Object(root)
}

/// Copy of `params` without the page object for `verb`
#[must_use]
pub fn omit_page_from_params(verb: &Verb, params: &Value) -> Value {
    let mut params = params.clone();
    match verb.page_placement() {
        PagePlacement::Query => {
            if let Some(Value::Object(query)) = params.get_mut("query") {
                query.remove("page");
            }
        }
        PagePlacement::TopLevel => {
            if let Value::Object(root) = &mut params {
                root.remove("page");
            }
        }
        PagePlacement::None => {}
    }
    params
}
