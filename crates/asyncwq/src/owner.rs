//! Owner handle threaded through workqueues for attribution
//!
//! An `Owner` names the instance a workqueue serves (a mounted
//! filesystem, a device, a test harness). The engine only uses it for
//! thread names and log lines; it never looks inside the context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque, cheaply cloneable owner identity
#[derive(Clone)]
pub struct Owner {
    label: Arc<str>,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl Owner {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            context: None,
        }
    }

    /// Owner carrying a typed context the producer can recover later
    pub fn with_context<T: Any + Send + Sync>(label: impl Into<Arc<str>>, context: Arc<T>) -> Self {
        Self {
            label: label.into(),
            context: Some(context),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Downcast the attached context
    pub fn context<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.as_deref()?.downcast_ref::<T>()
    }

    /// Identity comparison: same label and same context allocation
    pub fn same_as(&self, other: &Owner) -> bool {
        self.label == other.label
            && match (&self.context, &other.context) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("label", &self.label)
            .field("context", &self.context.is_some())
            .finish()
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FsInfo {
        generation: u64,
    }

    #[test]
    fn test_context_roundtrip() {
        let fs = Arc::new(FsInfo { generation: 7 });
        let owner = Owner::with_context("fs0", Arc::clone(&fs));
        assert_eq!(owner.label(), "fs0");
        assert_eq!(owner.context::<FsInfo>().map(|f| f.generation), Some(7));
        assert!(owner.context::<String>().is_none());
        assert_eq!(format!("{}", owner), "fs0");
    }

    #[test]
    fn test_identity() {
        let fs = Arc::new(FsInfo { generation: 1 });
        let a = Owner::with_context("fs0", Arc::clone(&fs));
        let b = a.clone();
        let c = Owner::with_context("fs0", Arc::new(FsInfo { generation: 1 }));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(Owner::new("x").same_as(&Owner::new("x")));
        assert!(!Owner::new("x").same_as(&Owner::new("y")));
    }
}
