//! Bottom-up chart over the instruction grammar.
//!
//! The chart seeds one leaf node per (token, class) pair, then applies the
//! rule set to saturation: every way of covering a token range with a rule
//! becomes a node, and structurally identical derivations are folded so the
//! forest holds one node per distinct meaning of a span. Roots are the
//! utterance nodes covering the whole input; zero roots means no reading,
//! two or more are ranked by score for the disambiguator.
//!
//! Work is bounded by a rule-application budget. Exceeding it abandons the
//! parse and marks the forest exhausted rather than letting a pathological
//! input spin.

use std::cmp::Ordering;

use crate::config::CompilerConfig;

use super::grammar::{classify, Cat, NodeSem, Rule, RuleCtx, Sym, RULES};
use super::token::{Span, Token};

// ============================================================================
// Nodes
// ============================================================================

/// One chart entry: a category over a token range with its meaning.
#[derive(Debug, Clone)]
pub struct ChartNode {
    pub cat: Cat,
    /// Token range covered, `start..end`.
    pub start: usize,
    pub end: usize,
    /// Character span in the original utterance.
    pub span: Span,
    /// Name of the rule that built this node ("lexical" for leaves).
    pub rule: &'static str,
    /// Rule priority plus the priorities of all children.
    pub priority: f32,
    pub sem: NodeSem,
    /// Indices of child nodes within the forest.
    pub children: Vec<usize>,
    /// Token index for leaf nodes.
    pub tok: Option<usize>,
}

// ============================================================================
// Forest
// ============================================================================

/// All derivations of one utterance.
#[derive(Debug)]
pub struct ParseForest {
    pub nodes: Vec<ChartNode>,
    /// Utterance nodes covering every token.
    pub roots: Vec<usize>,
    /// Rule application steps consumed.
    pub applications: usize,
    /// True when the application budget ran out before saturation.
    pub exhausted: bool,
    token_count: usize,
    starts: Vec<Vec<usize>>,
    budget: usize,
}

impl ParseForest {
    fn new(token_count: usize, budget: usize) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            applications: 0,
            exhausted: false,
            token_count,
            starts: vec![Vec::new(); token_count + 1],
            budget,
        }
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Root nodes ordered best-first: by score, then by insertion order so
    /// equal-scored readings keep the rule table's ordering.
    pub fn ranked_roots(&self) -> Vec<&ChartNode> {
        let mut roots: Vec<(usize, &ChartNode)> = self
            .roots
            .iter()
            .map(|&i| (i, &self.nodes[i]))
            .collect();
        roots.sort_by(|a, b| {
            b.1.priority
                .partial_cmp(&a.1.priority)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        roots.into_iter().map(|(_, node)| node).collect()
    }

    fn push_leaf(&mut self, index: usize, token: &Token, cat: Cat) {
        let idx = self.nodes.len();
        self.nodes.push(ChartNode {
            cat,
            start: index,
            end: index + 1,
            span: token.span,
            rule: "lexical",
            priority: 0.0,
            sem: NodeSem::Token,
            children: Vec::new(),
            tok: Some(index),
        });
        self.starts[index].push(idx);
    }

    fn equivalent_exists(&self, cat: Cat, start: usize, end: usize, sem: &NodeSem) -> bool {
        self.starts[start].iter().any(|&i| {
            let node = &self.nodes[i];
            node.cat == cat && node.end == end && &node.sem == sem
        })
    }

    fn complete(
        &mut self,
        rule: &Rule,
        chosen: &[usize],
        ctx: &RuleCtx<'_>,
        changed: &mut bool,
    ) {
        let Some(&first) = chosen.first() else { return };
        let Some(&last) = chosen.last() else { return };
        let start = self.nodes[first].start;
        let end = self.nodes[last].end;
        let mut span = self.nodes[first].span;
        let mut priority = rule.priority;
        for &idx in chosen {
            span = span.merge(self.nodes[idx].span);
            priority += self.nodes[idx].priority;
        }
        let sem = {
            let children: Vec<&ChartNode> = chosen.iter().map(|&i| &self.nodes[i]).collect();
            match (rule.build)(ctx, &children, span) {
                Some(sem) => sem,
                None => return,
            }
        };
        if self.equivalent_exists(rule.lhs, start, end, &sem) {
            return;
        }
        let idx = self.nodes.len();
        self.nodes.push(ChartNode {
            cat: rule.lhs,
            start,
            end,
            span,
            rule: rule.name,
            priority,
            sem,
            children: chosen.to_vec(),
            tok: None,
        });
        self.starts[start].push(idx);
        *changed = true;
    }

    fn extend_match(
        &mut self,
        rule: &Rule,
        pos: usize,
        sym_index: usize,
        chosen: &mut Vec<usize>,
        ctx: &RuleCtx<'_>,
        changed: &mut bool,
    ) {
        if self.exhausted {
            return;
        }
        if sym_index == rule.rhs.len() {
            self.complete(rule, chosen, ctx, changed);
            return;
        }
        if pos > self.token_count {
            return;
        }
        let sym = rule.rhs[sym_index];
        let candidates = self.starts[pos].clone();
        for idx in candidates {
            let matches = match sym {
                Sym::T(class) => self.nodes[idx].cat == Cat::Leaf(class),
                Sym::N(cat) => self.nodes[idx].cat == cat,
            };
            if !matches {
                continue;
            }
            self.applications += 1;
            if self.applications > self.budget {
                self.exhausted = true;
                return;
            }
            let next = self.nodes[idx].end;
            chosen.push(idx);
            self.extend_match(rule, next, sym_index + 1, chosen, ctx, changed);
            chosen.pop();
            if self.exhausted {
                return;
            }
        }
    }

    fn collect_roots(&mut self) {
        self.roots = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                node.cat == Cat::Utt && node.start == 0 && node.end == self.token_count
            })
            .map(|(i, _)| i)
            .collect();
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Parse a token stream into a forest of readings.
pub fn parse(tokens: &[Token], config: &CompilerConfig) -> ParseForest {
    let mut forest = ParseForest::new(tokens.len(), config.max_rule_applications);
    if tokens.is_empty() {
        return forest;
    }
    for (index, token) in tokens.iter().enumerate() {
        for class in classify(token) {
            forest.push_leaf(index, token, Cat::Leaf(class));
        }
    }
    let ctx = RuleCtx { tokens };
    let mut changed = true;
    while changed && !forest.exhausted {
        changed = false;
        for rule in RULES {
            for start in 0..forest.token_count {
                let mut chosen = Vec::with_capacity(rule.rhs.len());
                forest.extend_match(rule, start, 0, &mut chosen, &ctx, &mut changed);
                if forest.exhausted {
                    break;
                }
            }
            if forest.exhausted {
                break;
            }
        }
    }
    if !forest.exhausted {
        forest.collect_roots();
    }
    forest
}

// ============================================================================
// Tests
// ============================================================================
