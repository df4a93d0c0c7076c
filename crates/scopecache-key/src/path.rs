//! Resource addressing: service, resource and verb

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// API verb of a resource call
///
/// The verb decides where pagination parameters live (see
/// [`Verb::page_placement`]). Verbs outside the known set are carried
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Verb {
    /// `list`
    List,
    /// `get`
    Get,
    /// `analyze`
    Analyze,
    /// `stat`
    Stat,
    /// `get-data`
    GetData,
    /// `load`
    Load,
    /// `find`
    Find,
    /// Any other verb name
    Other(String),
}

/// Where a verb expects its page object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePlacement {
    /// `params.query.page`
    Query,
    /// `params.page`
    TopLevel,
    /// Verb does not paginate
    None,
}

impl Verb {
    /// Wire name of the verb
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Analyze => "analyze",
            Self::Stat => "stat",
            Self::GetData => "get-data",
            Self::Load => "load",
            Self::Find => "find",
            Self::Other(name) => name,
        }
    }

    /// Page object location for this verb
    #[must_use]
    pub fn page_placement(&self) -> PagePlacement {
        match self {
            Self::List | Self::Analyze | Self::Stat | Self::GetData => PagePlacement::Query,
            Self::Load | Self::Find => PagePlacement::TopLevel,
            Self::Get | Self::Other(_) => PagePlacement::None,
        }
    }
}

impl From<&str> for Verb {
    fn from(value: &str) -> Self {
        match value {
            "list" => Self::List,
            "get" => Self::Get,
            "analyze" => Self::Analyze,
            "stat" => Self::Stat,
            "get-data" | "get_data" => Self::GetData,
            "load" => Self::Load,
            "find" => Self::Find,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Verb {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Verb> for String {
    fn from(value: Verb) -> Self {
        value.as_str().to_string()
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `service / resource / verb` triple identifying an API call
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourcePath {
    /// Service name, e.g. `identity`
    pub service: String,
    /// Resource name, e.g. `user`
    pub resource: String,
    /// Verb, e.g. `list`
    pub verb: Verb,
}

impl ResourcePath {
    /// Create a resource path
    #[must_use]
    pub fn new(service: impl Into<String>, resource: impl Into<String>, verb: impl Into<Verb>) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
            verb: verb.into(),
        }
    }

    /// Same service and resource with another verb
    #[must_use]
    pub fn with_verb(&self, verb: impl Into<Verb>) -> Self {
        Self {
            service: self.service.clone(),
            resource: self.resource.clone(),
            verb: verb.into(),
        }
    }

    /// First empty segment name, if any
    pub(crate) fn empty_segment(&self) -> Option<&'static str> {
        if self.service.trim().is_empty() {
            Some("service")
        } else if self.resource.trim().is_empty() {
            Some("resource")
        } else if self.verb.as_str().trim().is_empty() {
            Some("verb")
        } else {
            None
        }
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.resource, self.verb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_roundtrips_known_names() {
        for name in ["list", "get", "analyze", "stat", "get-data", "load", "find"] {
            assert_eq!(Verb::from(name).as_str(), name);
        }
        assert_eq!(Verb::from("sync"), Verb::Other("sync".to_string()));
    }

    #[test]
    fn verb_page_placement() {
        assert_eq!(Verb::List.page_placement(), PagePlacement::Query);
        assert_eq!(Verb::GetData.page_placement(), PagePlacement::Query);
        assert_eq!(Verb::Load.page_placement(), PagePlacement::TopLevel);
        assert_eq!(Verb::Find.page_placement(), PagePlacement::TopLevel);
        assert_eq!(Verb::Get.page_placement(), PagePlacement::None);
    }

    #[test]
    fn resource_path_display() {
        let path = ResourcePath::new("identity", "user", "list");
        assert_eq!(path.to_string(), "identity/user/list");
        assert_eq!(path.with_verb("get").to_string(), "identity/user/get");
    }

    #[test]
    fn resource_path_detects_empty_segments() {
        assert_eq!(ResourcePath::new("", "user", "list").empty_segment(), Some("service"));
        assert_eq!(ResourcePath::new("identity", " ", "list").empty_segment(), Some("resource"));
        assert_eq!(ResourcePath::new("identity", "user", "list").empty_segment(), None);
    }
}
