//! Scope-aware key construction
//!
//! [`ScopeKeyBuilder`] turns a [`KeySpec`] plus a list of required scope
//! tokens into a [`QueryKey`]. Scope values come first, in declared order,
//! so switching workspace or domain always lands in a different cache slot.

use crate::error::KeyError;
use crate::fingerprint::Fingerprint;
use crate::key::{KeySegment, QueryKey};
use crate::path::ResourcePath;
use crate::scope::{ResolvedScope, ScopeResolver, ScopeToken};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Unresolved description of a query key
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    /// Service / resource / verb
    pub path: ResourcePath,
    /// Request parameters
    pub params: Value,
    /// Optional entity id
    pub entity: Option<String>,
    /// Optional extra dependencies that should partition the cache
    pub deps: Option<Value>,
}

impl KeySpec {
    /// Spec with empty parameters
    #[must_use]
    pub fn new(path: ResourcePath) -> Self {
        Self {
            path,
            params: Value::Object(serde_json::Map::new()),
            entity: None,
            deps: None,
        }
    }

    /// With parameters
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// With parameters from any serializable value
    ///
    /// # Errors
    /// Returns [`KeyError::Serialization`] if `params` is not representable as JSON
    pub fn try_with_params<T: Serialize + ?Sized>(self, params: &T) -> Result<Self, KeyError> {
        Ok(self.with_params(serde_json::to_value(params)?))
    }

    /// With entity id
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// With dependency values
    #[must_use]
    pub fn with_deps(mut self, deps: Value) -> Self {
        self.deps = Some(deps);
        self
    }
}

/// Builds [`QueryKey`]s from the current scope context
#[derive(Clone)]
pub struct ScopeKeyBuilder {
    resolver: Arc<dyn ScopeResolver>,
}

impl fmt::Debug for ScopeKeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeKeyBuilder").finish_non_exhaustive()
    }
}

impl ScopeKeyBuilder {
    /// Create a builder over `resolver`
    #[inline]
    #[must_use]
    pub fn new(resolver: Arc<dyn ScopeResolver>) -> Self {
        Self { resolver }
    }

    /// The underlying resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn ScopeResolver> {
        &self.resolver
    }

    /// Resolve every token in declared order
    ///
    /// # Errors
    /// [`KeyError::ScopeUnresolved`] for the first token without a value.
    /// Empty strings count as unresolved.
    pub fn resolve_scopes(&self, tokens: &[ScopeToken]) -> Result<Vec<ResolvedScope>, KeyError> {
        tokens
            .iter()
            .map(|&token| match self.resolver.resolve(token) {
                Some(value) if !value.is_empty() => Ok(ResolvedScope { token, value }),
                _ => Err(KeyError::ScopeUnresolved { token }),
            })
            .collect()
    }

    /// Check that a query requiring `tokens` may run right now
    ///
    /// Fails when the context is loading, when the grant scope is unknown and
    /// the resolver requires one, when the grant scope is known and
    /// not in `tokens`, or when any token is unresolved.
    ///
    /// # Errors
    /// See [`KeyError::is_not_ready`] for the recoverable cases.
    pub fn check_ready(&self, tokens: &[ScopeToken]) -> Result<Vec<ResolvedScope>, KeyError> {
        if tokens.is_empty() {
            return Err(KeyError::NoScopes);
        }
        if !self.resolver.is_ready() {
            return Err(KeyError::NotReady);
        }
        match self.resolver.grant_scope() {
            Some(grant) if !tokens.contains(&grant) => {
                return Err(KeyError::ScopeNotGranted {
                    grant,
                    required: tokens.to_vec(),
                });
            }
            None if self.resolver.requires_grant() => return Err(KeyError::GrantUnknown),
            _ => {}
        }
        self.resolve_scopes(tokens)
    }

    /// Build a key from its parts
    ///
    /// # Errors
    /// - [`KeyError::ScopeUnresolved`] if a token has no value
    /// - [`KeyError::EmptyPathSegment`] if the path is incomplete
    pub fn build_key(
        &self,
        tokens: &[ScopeToken],
        path: &ResourcePath,
        params: &Value,
        entity: Option<&str>,
        deps: Option<&Value>,
    ) -> Result<QueryKey, KeyError> {
        let scopes = self.resolve_scopes(tokens)?;
        assemble(scopes, path, params, entity, deps)
    }

    /// Build a key from a [`KeySpec`]
    ///
    /// # Errors
    /// Same as [`build_key`](Self::build_key)
    pub fn build(&self, tokens: &[ScopeToken], spec: &KeySpec) -> Result<QueryKey, KeyError> {
        self.build_key(
            tokens,
            &spec.path,
            &spec.params,
            spec.entity.as_deref(),
            spec.deps.as_ref(),
        )
    }

    /// Build a key after the full readiness check of [`check_ready`](Self::check_ready)
    ///
    /// # Errors
    /// Same as [`check_ready`](Self::check_ready) and [`build_key`](Self::build_key)
    pub fn build_checked(&self, tokens: &[ScopeToken], spec: &KeySpec) -> Result<QueryKey, KeyError> {
        let scopes = self.check_ready(tokens)?;
        assemble(
            scopes,
            &spec.path,
            &spec.params,
            spec.entity.as_deref(),
            spec.deps.as_ref(),
        )
    }

    /// Prefix covering every verb and parameter set of one resource
    ///
    /// # Errors
    /// [`KeyError::ScopeUnresolved`] if a token has no value
    pub fn resource_prefix(
        &self,
        tokens: &[ScopeToken],
        service: &str,
        resource: &str,
    ) -> Result<QueryKey, KeyError> {
        let mut segments: Vec<KeySegment> = self
            .resolve_scopes(tokens)?
            .into_iter()
            .map(KeySegment::Scope)
            .collect();
        segments.push(KeySegment::Service(service.to_string()));
        segments.push(KeySegment::Resource(resource.to_string()));
        Ok(QueryKey::from_segments(segments))
    }
}

fn assemble(
    scopes: Vec<ResolvedScope>,
    path: &ResourcePath,
    params: &Value,
    entity: Option<&str>,
    deps: Option<&Value>,
) -> Result<QueryKey, KeyError> {
    if let Some(segment) = path.empty_segment() {
        return Err(KeyError::EmptyPathSegment(segment));
    }

    let mut segments: Vec<KeySegment> = Vec::with_capacity(scopes.len() + 6);
    segments.extend(scopes.into_iter().map(KeySegment::Scope));
    segments.push(KeySegment::Service(path.service.clone()));
    segments.push(KeySegment::Resource(path.resource.clone()));
    segments.push(KeySegment::Verb(path.verb.clone()));
    if let Some(id) = entity {
        segments.push(KeySegment::Entity(id.to_string()));
    }
    segments.push(KeySegment::Params(Fingerprint::of_value(params)));
    if let Some(deps) = deps {
        segments.push(KeySegment::Deps(Fingerprint::of_value(deps)));
    }

    let key = QueryKey::from_segments(segments);
    tracing::trace!(%key, "built query key");
    Ok(key)
}
