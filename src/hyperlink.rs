use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// An OSC 8 hyperlink. Shared by every cell in its span via `Arc`; the cell
/// references are the only strong ones, so a link dies with its last cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    pub id: Option<String>,
    pub uri: String,
}

/// Hover/activation state, driven by the host pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HyperlinkState {
    #[default]
    Inactive,
    Hover,
    Active,
}

/// Registry for id-carrying hyperlinks so that separate OSC 8 spans with the
/// same id share one object. Holds weak references only; cells own the links.
#[derive(Debug, Default)]
pub struct HyperlinkRegistry {
    by_id: HashMap<String, Weak<Hyperlink>>,
    next_anonymous: u64,
}

impl HyperlinkRegistry {
    /// Resolve an OSC 8 open into a link handle, reusing a live link when the
    /// application supplied a matching id and uri.
    pub fn resolve(&mut self, id: Option<&str>, uri: &str) -> Arc<Hyperlink> {
        if let Some(id) = id {
            if let Some(existing) = self.by_id.get(id).and_then(Weak::upgrade) {
                if existing.uri == uri {
                    return existing;
                }
            }
            let link = Arc::new(Hyperlink {
                id: Some(id.to_string()),
                uri: uri.to_string(),
            });
            self.by_id.insert(id.to_string(), Arc::downgrade(&link));
            link
        } else {
            self.next_anonymous += 1;
            Arc::new(Hyperlink {
                id: None,
                uri: uri.to_string(),
            })
        }
    }

    /// Drop registry entries whose links have no cells left.
    pub fn prune(&mut self) {
        self.by_id.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn live_count(&self) -> usize {
        self.by_id
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_id_and_uri_share_one_link() {
        let mut registry = HyperlinkRegistry::default();
        let a = registry.resolve(Some("foo"), "https://e");
        let b = registry.resolve(Some("foo"), "https://e");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn same_id_different_uri_is_a_new_link() {
        let mut registry = HyperlinkRegistry::default();
        let a = registry.resolve(Some("foo"), "https://e");
        let b = registry.resolve(Some("foo"), "https://other");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn registry_does_not_keep_links_alive() {
        let mut registry = HyperlinkRegistry::default();
        let link = registry.resolve(Some("foo"), "https://e");
        drop(link);
        registry.prune();
        assert_eq!(registry.live_count(), 0);
    }
}
