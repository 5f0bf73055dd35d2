//! Deferred attribute values
//!
//! Some attributes (a load balancer's DNS name, the public URL of an API) only
//! exist once the provisioning backend has materialized the resource. A
//! [`LateBound`] is a shared placeholder for such a value: clones observe the
//! same slot, the backend resolves it exactly once, and readers get a
//! [`ReferenceError::Unresolved`] until then.

use crate::error::{ReferenceError, Result, TopologyError};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Clone)]
pub struct LateBound<T> {
    attribute: Arc<str>,
    slot: Arc<OnceLock<T>>,
}

impl<T> LateBound<T> {
    /// Create an unresolved placeholder named after the attribute it stands for
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: Arc::from(attribute.into()),
            slot: Arc::new(OnceLock::new()),
        }
    }

    /// Attribute name, e.g. `MyNLB.DnsName`
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Supply the concrete value. Fails if a value was already supplied.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.slot.set(value).map_err(|_| TopologyError::ImmutableState {
            entity: self.attribute.to_string(),
        })?;
        tracing::debug!("Resolved {}", self.attribute);
        Ok(())
    }

    /// Read the resolved value
    pub fn get(&self) -> Result<&T> {
        self.slot.get().ok_or_else(|| {
            ReferenceError::Unresolved {
                attribute: self.attribute.to_string(),
            }
            .into()
        })
    }

    /// True if both placeholders share the same slot
    pub fn same_slot(&self, other: &LateBound<T>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: fmt::Debug> fmt::Debug for LateBound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.get() {
            Some(value) => write!(f, "LateBound({} = {:?})", self.attribute, value),
            None => write!(f, "LateBound({} = <unresolved>)", self.attribute),
        }
    }
}
