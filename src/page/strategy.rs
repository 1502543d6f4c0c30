// Ordered strategy chains for DOM lookups.
//
// Detection and container resolution both try a fixed list of strategies,
// most specific first; the first one that produces a node wins. Keeping
// the list explicit (name + function) replaces the historical pile of
// near-duplicate lookup helpers with one place to read the precedence.

use ego_tree::NodeId;
use tracing::trace;

use super::Page;

/// One lookup attempt: given the page and a starting node, maybe
/// produce a result node.
pub type ResolveFn = fn(&Page, NodeId) -> Option<NodeId>;

pub struct Strategy {
    pub name: &'static str,
    pub resolve: ResolveFn,
}

/// Which strategy matched, and what it found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub strategy: &'static str,
    pub node: NodeId,
}

/// Run the chain in order; first hit wins.
pub fn resolve_first(chain: &[Strategy], page: &Page, start: NodeId) -> Option<Resolution> {
    for strategy in chain {
        if let Some(node) = (strategy.resolve)(page, start) {
            trace!(strategy = strategy.name, "strategy matched");
            return Some(Resolution {
                strategy: strategy.name,
                node,
            });
        }
    }
    None
}
