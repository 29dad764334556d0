use std::any::{Any, TypeId};

/// A single typed payload attached to a [`ParsingContext`] by an extractor,
/// keyed by `TypeId` rather than a stringly type tag. `on_remove` runs when
/// the entry is dropped by [`ParsingContext::restore`], not by ordinary
/// `Drop` — extractors that hold external resources (e.g. a checked-out
/// pool entry) register one to release it on scope unwind.
struct ObjectEntry {
    type_id: TypeId,
    value: Box<dyn Any + Send>,
    on_remove: Option<Box<dyn FnOnce() + Send>>,
}

/// A scoped snapshot of a [`ParsingContext`], taken before testing a route
/// and restored if that route (or its subtree) turns out not to match, so
/// sibling routes see the context unmodified.
pub struct Snapshot {
    remaining: String,
    resources_len: usize,
    objects_len: usize,
}

/// State threaded through router dispatch: the unmatched suffix of the
/// request path, the ordered list of matched path segments, and a typed
/// object stack extractors can push onto.
pub struct ParsingContext {
    pub remaining: String,
    pub resources: Vec<String>,
    objects: Vec<ObjectEntry>,
}

impl ParsingContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self { remaining: path.into(), resources: Vec::new(), objects: Vec::new() }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            remaining: self.remaining.clone(),
            resources_len: self.resources.len(),
            objects_len: self.objects.len(),
        }
    }

    /// Restore a previously taken snapshot, undoing whatever a non-matching
    /// route (or its subtree) did to the context.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.remaining = snapshot.remaining;
        self.resources.truncate(snapshot.resources_len);
        while self.objects.len() > snapshot.objects_len {
            if let Some(entry) = self.objects.pop() {
                if let Some(hook) = entry.on_remove {
                    hook();
                }
            }
        }
    }

    pub fn push_resource(&mut self, segment: impl Into<String>) {
        self.resources.push(segment.into());
    }

    pub fn strip_matched(&mut self, matched_len: usize) {
        self.remaining = self.remaining[matched_len..].to_string();
    }

    pub fn attach<T: Any + Send>(&mut self, value: T) {
        self.attach_with_hook(value, None);
    }

    pub fn attach_with_hook<T: Any + Send>(&mut self, value: T, on_remove: Option<Box<dyn FnOnce() + Send>>) {
        self.objects.push(ObjectEntry { type_id: TypeId::of::<T>(), value: Box::new(value), on_remove });
    }

    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.objects
            .iter()
            .rev()
            .find(|entry| entry.type_id == TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn restore_truncates_resources_and_runs_hooks() {
        let mut ctx = ParsingContext::new("/a/b");
        let before = ctx.remaining.clone();
        let snap = ctx.snapshot();
        ctx.push_resource("a");
        ctx.strip_matched(2);

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        ctx.attach_with_hook(42i32, Some(Box::new(move || released_clone.store(true, Ordering::SeqCst))));
        assert_eq!(ctx.get::<i32>(), Some(&42));

        ctx.restore(snap);
        assert_eq!(ctx.remaining, before);
        assert!(ctx.resources.is_empty());
        assert_eq!(ctx.get::<i32>(), None);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn typed_lookup_ignores_other_types() {
        let mut ctx = ParsingContext::new("/x");
        ctx.attach(7u32);
        ctx.attach("hello".to_string());
        assert_eq!(ctx.get::<u32>(), Some(&7));
        assert_eq!(ctx.get::<String>().map(String::as_str), Some("hello"));
        assert_eq!(ctx.get::<i64>(), None);
    }
}
