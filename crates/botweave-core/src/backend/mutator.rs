//! Reply mutator chain: ordered rewriting of outgoing replies.

use std::sync::{Arc, Mutex};

/// What a mutator knows about the send it is rewriting.
#[derive(Debug, Clone, Copy)]
pub struct MutateContext<'a> {
    /// Identifier of the backend performing the send.
    pub backend_id: &'a str,
    /// The target of the outgoing reply.
    pub target: &'a str,
}

/// Rewrites an outgoing reply before it is sent.
///
/// Mutators are applied in registration order; each receives the previous
/// mutator's output.
pub trait ReplyMutator: Send + Sync {
    fn mutate(&self, cx: &MutateContext<'_>, reply: String) -> String;
}

/// Ordered, idempotent collection of reply mutators.
pub struct MutatorChain {
    mutators: Mutex<Vec<Arc<dyn ReplyMutator>>>,
}

impl MutatorChain {
    pub fn new() -> Self {
        Self {
            mutators: Mutex::new(Vec::new()),
        }
    }

    /// Append a mutator. Registering the same mutator twice is a no-op.
    pub fn register(&self, mutator: Arc<dyn ReplyMutator>) {
        let mut mutators = self.mutators.lock().expect("mutator lock poisoned");
        if !mutators.iter().any(|m| Arc::ptr_eq(m, &mutator)) {
            mutators.push(mutator);
        }
    }

    /// Fold the chain left-to-right over `reply`.
    pub fn apply(&self, cx: &MutateContext<'_>, reply: String) -> String {
        let snapshot: Vec<_> = self
            .mutators
            .lock()
            .expect("mutator lock poisoned")
            .clone();
        snapshot
            .iter()
            .fold(reply, |acc, mutator| mutator.mutate(cx, acc))
    }

    /// Number of registered mutators.
    pub fn len(&self) -> usize {
        self.mutators.lock().expect("mutator lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MutatorChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Suffix(&'static str);

    impl ReplyMutator for Suffix {
        fn mutate(&self, _cx: &MutateContext<'_>, reply: String) -> String {
            format!("{reply}{}", self.0)
        }
    }

    fn cx<'a>() -> MutateContext<'a> {
        MutateContext {
            backend_id: "test",
            target: "#chan",
        }
    }

    #[test]
    fn applies_in_registration_order() {
        let chain = MutatorChain::new();
        chain.register(Arc::new(Suffix("-a")));
        chain.register(Arc::new(Suffix("-b")));

        assert_eq!(chain.apply(&cx(), "hi".to_string()), "hi-a-b");
    }

    #[test]
    fn duplicate_registration_is_idempotent() {
        let chain = MutatorChain::new();
        let mutator: Arc<dyn ReplyMutator> = Arc::new(Suffix("!"));
        chain.register(Arc::clone(&mutator));
        chain.register(mutator);

        assert_eq!(chain.len(), 1);
        assert_eq!(chain.apply(&cx(), "hi".to_string()), "hi!");
    }

    #[test]
    fn empty_chain_returns_reply_unchanged() {
        let chain = MutatorChain::new();
        assert_eq!(chain.apply(&cx(), "hi".to_string()), "hi");
    }
}
