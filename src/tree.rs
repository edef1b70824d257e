//! Self-compacting radix trie over tokenized URLs.
//!
//! Grounded on `urltheory/preftree.py`'s `PrefTree`/`RevPrefTree`: a node
//! stores `(url_count, success_count)` aggregated over everything inserted
//! at or below it, no two sibling edges share a nonempty common prefix
//! (shared prefixes are factored into an intermediate split node), and a
//! subtree can be collapsed into a single wildcard leaf once its smoothed
//! success rate is confident enough that the detail underneath stops being
//! informative. Counts are floating point, not integer, because a caller
//! may warm the tree from pre-aggregated fractional observations (e.g. a
//! dataset record carrying a soft probability rather than a hard 0/1).

use crate::error::{CoreError, CoreResult};
use crate::smoothing::{confidence, SmoothingConfig};
use crate::token::{Token, TokenSequence};
use serde::{Deserialize, Serialize};

/// Which prune gate a filter uses to decide a subtree no longer needs its
/// detail kept. The confidence gate is the default; the frequentist gate
/// is kept for filters migrated from the older policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PruneRule {
    Confidence {
        threshold: f64,
        smoothing: SmoothingConfig,
    },
    Frequentist {
        min_urls: f64,
        min_children: usize,
        min_rate: f64,
    },
}

impl PruneRule {
    /// Pruning with a non-positive confidence threshold is a hard error;
    /// the frequentist gate has no single "threshold" field to validate.
    fn check_valid(&self) -> CoreResult<()> {
        if let PruneRule::Confidence { threshold, .. } = self {
            if *threshold <= 0.0 {
                return Err(CoreError::usage("prune threshold must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub edge: TokenSequence,
    pub url_count: f64,
    pub success_count: f64,
    pub is_wildcard: bool,
    pub children: Vec<Node>,
}

impl Node {
    fn leaf(edge: TokenSequence, url_count: f64, success_count: f64) -> Self {
        Node {
            edge,
            url_count,
            success_count,
            is_wildcard: false,
            children: Vec::new(),
        }
    }

    fn root() -> Self {
        Node {
            edge: TokenSequence::default(),
            url_count: 0.0,
            success_count: 0.0,
            is_wildcard: false,
            children: Vec::new(),
        }
    }

    fn insert_here(&mut self, remaining: &[Token], url_count: f64, success_count: f64) {
        self.url_count += url_count;
        self.success_count += success_count;
        if self.is_wildcard || remaining.is_empty() {
            return;
        }

        let first = &remaining[0];
        if let Some(idx) = self
            .children
            .iter()
            .position(|c| c.edge.as_slice().first() == Some(first))
        {
            let cpl = self.children[idx].edge.common_prefix_len(remaining);
            if cpl == self.children[idx].edge.len() {
                self.children[idx].insert_here(&remaining[cpl..], url_count, success_count);
            } else {
                self.split_child(idx, cpl, remaining, url_count, success_count);
            }
        } else {
            self.children.push(Node::leaf(
                TokenSequence::new(remaining.to_vec()),
                url_count,
                success_count,
            ));
        }
    }

    /// Factors out the shared `cpl`-length prefix of `children[idx]`'s edge
    /// and `remaining` into a new intermediate node.
    fn split_child(&mut self, idx: usize, cpl: usize, remaining: &[Token], url_count: f64, success_count: f64) {
        let mut old_child = self.children.remove(idx);
        let shared: Vec<Token> = old_child.edge.as_slice()[..cpl].to_vec();
        old_child.edge = TokenSequence::new(old_child.edge.as_slice()[cpl..].to_vec());

        let mut split = Node {
            edge: TokenSequence::new(shared),
            url_count: old_child.url_count + url_count,
            success_count: old_child.success_count + success_count,
            is_wildcard: false,
            children: vec![old_child],
        };

        if cpl < remaining.len() {
            split.children.push(Node::leaf(
                TokenSequence::new(remaining[cpl..].to_vec()),
                url_count,
                success_count,
            ));
        }

        self.children.push(split);
    }

    fn match_here(&self, remaining: &[Token]) -> (f64, f64) {
        if self.is_wildcard || remaining.is_empty() {
            return (self.url_count, self.success_count);
        }
        let first = &remaining[0];
        match self
            .children
            .iter()
            .find(|c| c.edge.as_slice().first() == Some(first))
        {
            None => (0.0, 0.0),
            Some(child) => {
                let cpl = child.edge.common_prefix_len(remaining);
                if cpl == remaining.len() {
                    (child.url_count, child.success_count)
                } else if cpl == child.edge.len() {
                    child.match_here(&remaining[cpl..])
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }

    fn gate_passes(&self, rule: &PruneRule, depth: usize) -> bool {
        match rule {
            PruneRule::Confidence { threshold, smoothing } => {
                let p = smoothing.evaluate(self.url_count, self.success_count, depth);
                confidence(p) >= *threshold
            }
            PruneRule::Frequentist {
                min_urls,
                min_children,
                min_rate,
            } => {
                if self.url_count < *min_urls || self.children.len() < *min_children {
                    return false;
                }
                let rate = self.success_count / self.url_count.max(1.0);
                rate >= *min_rate || (1.0 - rate) >= *min_rate
            }
        }
    }

    fn prune_here(&mut self, rule: &PruneRule, recursive: bool, depth: usize) {
        if self.is_wildcard {
            return;
        }
        if recursive {
            for child in &mut self.children {
                child.prune_here(rule, recursive, depth + 1);
            }
        }
        if self.gate_passes(rule, depth) {
            self.children.clear();
            self.is_wildcard = true;
        }
    }

    /// Collects every leaf/wildcard endpoint as `(full_tokens, url_count,
    /// success_count)`, used for regex synthesis and reverse-pruning.
    fn collect_urls(&self, prefix: &mut Vec<Token>, out: &mut Vec<(TokenSequence, f64, f64)>) {
        prefix.extend(self.edge.as_slice().iter().cloned());
        if self.is_wildcard || self.children.is_empty() {
            out.push((TokenSequence::new(prefix.clone()), self.url_count, self.success_count));
        } else {
            for child in &self.children {
                child.collect_urls(prefix, out);
            }
        }
        prefix.truncate(prefix.len() - self.edge.len());
    }

    fn check_sanity_here(&self) -> CoreResult<()> {
        if self.url_count < 0.0 || self.success_count < 0.0 {
            return Err(CoreError::structural("node holds a negative count"));
        }
        if self.success_count > self.url_count {
            return Err(CoreError::structural(
                "success_count exceeds url_count",
            ));
        }
        if self.is_wildcard && !self.children.is_empty() {
            return Err(CoreError::structural("wildcard node retains children"));
        }
        let children_total: f64 = self.children.iter().map(|c| c.url_count).sum();
        if children_total > self.url_count {
            return Err(CoreError::structural(
                "children url_count exceeds parent url_count",
            ));
        }
        for i in 0..self.children.len() {
            for j in (i + 1)..self.children.len() {
                let a = self.children[i].edge.as_slice().first();
                let b = self.children[j].edge.as_slice().first();
                if a.is_some() && a == b {
                    return Err(CoreError::structural(
                        "sibling edges share a common first token",
                    ));
                }
            }
            self.children[i].check_sanity_here()?;
        }
        Ok(())
    }

    fn regex_fragment(&self) -> String {
        let mut out = String::new();
        for token in self.edge.as_slice() {
            match token {
                Token::DigitRun => out.push_str(r"\d+"),
                Token::Literal(s) => out.push_str(&regex::escape(s)),
            }
        }
        if self.is_wildcard {
            let majority_success = self.success_count * 2.0 >= self.url_count;
            if majority_success {
                out.push_str(".*");
            }
            return out;
        }
        if self.children.is_empty() {
            return out;
        }
        let branches: Vec<String> = self.children.iter().map(Node::regex_fragment).collect();
        if branches.len() == 1 {
            out.push_str(&branches[0]);
        } else {
            out.push('(');
            out.push_str(&branches.join("|"));
            out.push(')');
        }
        out
    }
}

/// A prefix tree over tokenized URLs for one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefTree {
    root: Node,
    /// Set once a reverse-prune pass swaps this tree's structure for one
    /// keyed on reversed token sequences; `insert`/`match_sequence` then
    /// transparently reverse their input.
    reversed: bool,
}

impl Default for PrefTree {
    fn default() -> Self {
        PrefTree {
            root: Node::root(),
            reversed: false,
        }
    }
}

impl PrefTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Inserts `url_count` observations of which `success_count` succeeded
    /// along `tokens`. Negative counts, `success_count > url_count`, and an
    /// empty token sequence are all hard errors — the tree never silently
    /// drops or rewrites bad data.
    pub fn insert(&mut self, tokens: &TokenSequence, url_count: f64, success_count: f64) -> CoreResult<()> {
        if url_count < 0.0 || success_count < 0.0 {
            return Err(CoreError::usage("counts must be non-negative"));
        }
        if success_count > url_count {
            return Err(CoreError::usage("success_count exceeds url_count"));
        }
        if tokens.is_empty() {
            return Err(CoreError::usage("cannot insert an empty token sequence"));
        }
        let tokens = if self.reversed {
            tokens.reversed()
        } else {
            tokens.clone()
        };
        self.root.insert_here(tokens.as_slice(), url_count, success_count);
        Ok(())
    }

    /// Returns `(url_count, success_count)` for the longest recorded prefix
    /// of `tokens`: full counts at a wildcard, residual counts at an exact
    /// internal match, `(0, 0)` when the path diverges from anything seen.
    pub fn match_sequence(&self, tokens: &TokenSequence) -> (f64, f64) {
        let tokens = if self.reversed {
            tokens.reversed()
        } else {
            tokens.clone()
        };
        self.root.match_here(tokens.as_slice())
    }

    pub fn prune(&mut self, rule: &PruneRule, recursive: bool) -> CoreResult<()> {
        rule.check_valid()?;
        self.root.prune_here(rule, recursive, 0);
        Ok(())
    }

    pub fn urls(&self) -> Vec<(TokenSequence, f64, f64)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.root.collect_urls(&mut prefix, &mut out);
        out
    }

    pub fn check_sanity(&self) -> CoreResult<()> {
        if self.root.success_count > self.root.url_count {
            return Err(CoreError::structural("root success_count exceeds url_count"));
        }
        self.root.check_sanity_here()
    }

    pub fn generate_regex(&self) -> String {
        let branches: Vec<String> = self
            .root
            .children
            .iter()
            .map(Node::regex_fragment)
            .collect();
        if branches.is_empty() {
            return String::new();
        }
        if branches.len() == 1 {
            format!("^{}$", branches[0])
        } else {
            format!("^({})$", branches.join("|"))
        }
    }

    /// Rebuilds a tree over reversed token sequences (harvested from this
    /// tree's current leaves) and prunes it with the same rule. If the
    /// reversed tree collapses more mass into wildcards than pruning this
    /// tree in place would, swaps this tree's structure for the reversed
    /// one — this is how suffix patterns like "ends in .pdf" get detected.
    pub fn reverse_prune(&mut self, rule: &PruneRule) -> CoreResult<bool> {
        let mut forward = self.clone();
        forward.prune(rule, true)?;

        let mut reversed = PrefTree {
            root: Node::root(),
            reversed: true,
        };
        for (tokens, url_count, success_count) in self.urls() {
            let key = tokens.reversed();
            if key.is_empty() {
                continue;
            }
            reversed.insert(&key, url_count, success_count)?;
        }
        reversed.prune(rule, true)?;

        let swapped = wildcard_mass(&reversed.root) > wildcard_mass(&forward.root);
        *self = if swapped { reversed } else { forward };
        Ok(swapped)
    }
}

fn wildcard_mass(node: &Node) -> f64 {
    if node.is_wildcard {
        node.url_count
    } else {
        node.children.iter().map(wildcard_mass).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn confidence_rule(threshold: f64) -> PruneRule {
        PruneRule::Confidence {
            threshold,
            smoothing: SmoothingConfig::default(),
        }
    }

    #[test]
    fn insert_and_match_exact() {
        let mut tree = PrefTree::new();
        let tokens = tokenize("http://arxiv.org/pdf/1234.5678");
        tree.insert(&tokens, 1.0, 1.0).unwrap();
        assert_eq!(tree.match_sequence(&tokens), (1.0, 1.0));
    }

    #[test]
    fn unseen_path_is_dead_end() {
        let mut tree = PrefTree::new();
        tree.insert(&tokenize("http://arxiv.org/abs/1234"), 1.0, 1.0)
            .unwrap();
        let unseen = tokenize("http://arxiv.org/pdf/2340.0124");
        assert_eq!(tree.match_sequence(&unseen), (0.0, 0.0));
    }

    #[test]
    fn empty_insert_is_rejected() {
        let mut tree = PrefTree::new();
        assert!(tree.insert(&TokenSequence::default(), 1.0, 1.0).is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut tree = PrefTree::new();
        assert!(tree
            .insert(&tokenize("http://example.com/a"), -1.0, 0.0)
            .is_err());
    }

    #[test]
    fn success_exceeding_url_count_is_rejected() {
        let mut tree = PrefTree::new();
        assert!(tree
            .insert(&tokenize("http://example.com/a"), 1.0, 2.0)
            .is_err());
    }

    #[test]
    fn non_positive_prune_threshold_is_rejected() {
        let mut tree = PrefTree::new();
        tree.insert(&tokenize("http://example.com/a"), 1.0, 1.0).unwrap();
        assert!(tree.prune(&confidence_rule(0.0), true).is_err());
        assert!(tree.prune(&confidence_rule(-0.1), true).is_err());
    }

    #[test]
    fn siblings_never_share_a_common_prefix() {
        let mut tree = PrefTree::new();
        for url in [
            "http://arxiv.org/pdf/1111.1111",
            "http://arxiv.org/pdf/2222.2222",
            "http://arxiv.org/abs/3333.3333",
        ] {
            tree.insert(&tokenize(url), 1.0, 1.0).unwrap();
        }
        tree.check_sanity().unwrap();
    }

    #[test]
    fn confident_subtree_collapses_to_wildcard() {
        let mut tree = PrefTree::new();
        for i in 0..50 {
            let url = format!("http://arxiv.org/pdf/{i}/v1");
            tree.insert(&tokenize(&url), 1.0, 1.0).unwrap();
        }
        tree.prune(&confidence_rule(0.5), true).unwrap();
        tree.check_sanity().unwrap();
        // an unseen, longer continuation under the collapsed prefix still matches
        let (url_count, success_count) =
            tree.match_sequence(&tokenize("http://arxiv.org/pdf/9999/v2/extra"));
        assert_eq!(url_count, 50.0);
        assert_eq!(success_count, 50.0);
    }

    #[test]
    fn reverse_prune_detects_suffix_pattern() {
        // Every host is distinct, so forward pruning can never pool enough
        // evidence at any single node to become confident; only grouping
        // by the shared ".pdf"/".html" suffix (via reversal) does.
        let mut tree = PrefTree::new();
        for i in 0..30 {
            let pdf = format!("http://researchgate{i}.example/a/b/download.pdf");
            let html = format!("http://wiley{i}.example/a/b/page.html");
            tree.insert(&tokenize(&pdf), 1.0, 1.0).unwrap();
            tree.insert(&tokenize(&html), 1.0, 0.0).unwrap();
        }
        let swapped = tree.reverse_prune(&confidence_rule(0.3)).unwrap();
        tree.check_sanity().unwrap();
        assert!(swapped, "reverse pass should find the suffix pattern");
        assert!(tree.is_reversed());
    }

    #[test]
    fn regex_synthesis_is_anchored() {
        let mut tree = PrefTree::new();
        for i in 0..10 {
            let url = format!("http://arxiv.org/pdf/{i}");
            tree.insert(&tokenize(&url), 1.0, 1.0).unwrap();
        }
        tree.prune(&confidence_rule(0.3), true).unwrap();
        let re = tree.generate_regex();
        assert!(re.starts_with('^'));
        assert!(re.ends_with('$'));
    }
}
