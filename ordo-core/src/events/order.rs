// ABOUTME: Load-order computation for the listeners of a single event
// ABOUTME: Three passes (after, before, rest) with recursive insertion and cycle detection

use crate::error::EventError;
use std::collections::HashMap;

/// The ordering-relevant view of one group's handler for an event
#[derive(Debug, Clone, Copy)]
pub struct OrderNode<'a> {
    pub group: &'a str,
    /// Groups that must already have run
    pub before: &'a [String],
    /// Groups that must run after this one
    pub after: &'a [String],
}

impl OrderNode<'_> {
    fn pass(&self) -> u8 {
        if !self.after.is_empty() {
            0
        } else if !self.before.is_empty() {
            1
        } else {
            2
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Reaching a node that is still being placed is a cycle.
    Strict,
    /// Reaching a node that is still being placed defers the current one.
    Eager,
}

struct Resolver<'a> {
    nodes: &'a [OrderNode<'a>],
    preds: Vec<Vec<usize>>,
    afters: Vec<Vec<usize>>,
    placed: Vec<bool>,
    visiting: Vec<bool>,
    stack: Vec<usize>,
    order: Vec<usize>,
}

impl<'a> Resolver<'a> {
    fn new(nodes: &'a [OrderNode<'a>]) -> Self {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.group, i))
            .collect();
        let lookup = |names: &[String], own: usize| -> Vec<usize> {
            names
                .iter()
                .filter_map(|name| index.get(name.as_str()).copied())
                .filter(|&i| i != own)
                .collect()
        };

        let afters: Vec<Vec<usize>> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| lookup(node.after, i))
            .collect();

        // before-list first, then every group that declared us in its after-list
        let mut preds: Vec<Vec<usize>> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| lookup(node.before, i))
            .collect();
        for (declarer, targets) in afters.iter().enumerate() {
            for &target in targets {
                if !preds[target].contains(&declarer) {
                    preds[target].push(declarer);
                }
            }
        }

        Self {
            nodes,
            preds,
            afters,
            placed: vec![false; nodes.len()],
            visiting: vec![false; nodes.len()],
            stack: Vec::new(),
            order: Vec::with_capacity(nodes.len()),
        }
    }

    fn visit(&mut self, idx: usize, mode: Mode) -> Result<bool, Vec<usize>> {
        if self.placed[idx] {
            return Ok(true);
        }
        if self.visiting[idx] {
            return match mode {
                Mode::Eager => Ok(false),
                Mode::Strict => {
                    let start = self.stack.iter().position(|&i| i == idx).unwrap_or(0);
                    let mut cycle = self.stack[start..].to_vec();
                    cycle.push(idx);
                    Err(cycle)
                }
            };
        }

        self.visiting[idx] = true;
        self.stack.push(idx);
        for n in 0..self.preds[idx].len() {
            let pred = self.preds[idx][n];
            let ready = match self.visit(pred, mode) {
                Ok(ready) => ready,
                Err(cycle) => {
                    self.leave(idx);
                    return Err(cycle);
                }
            };
            if !ready {
                self.leave(idx);
                return Ok(false);
            }
        }
        self.leave(idx);

        self.placed[idx] = true;
        self.order.push(idx);

        for n in 0..self.afters[idx].len() {
            let target = self.afters[idx][n];
            // a deferred target gets placed by its own pass
            self.visit(target, Mode::Eager)?;
        }
        Ok(true)
    }

    fn leave(&mut self, idx: usize) {
        self.visiting[idx] = false;
        self.stack.pop();
    }

    fn run(mut self, event: &str) -> Result<Vec<String>, EventError> {
        let nodes = self.nodes;
        for pass in 0..3 {
            for (idx, node) in nodes.iter().enumerate() {
                if node.pass() != pass {
                    continue;
                }
                if let Err(cycle) = self.visit(idx, Mode::Strict) {
                    return Err(EventError::OrderingCycle {
                        event: event.to_string(),
                        groups: cycle
                            .into_iter()
                            .map(|i| nodes[i].group.to_string())
                            .collect(),
                    });
                }
            }
        }

        Ok(self
            .order
            .into_iter()
            .map(|i| nodes[i].group.to_string())
            .collect())
    }
}

/// Compute the order in which the groups in `nodes` run for `event`.
///
/// `nodes` must be in group registration order, which breaks ties. Entries
/// with an `after` list are inserted first, then entries with a `before`
/// list, then the rest. Inserting an entry first inserts everything that
/// must precede it, then the entry, then eagerly the entries it names in
/// `after`. References to groups not present in `nodes` are ignored.
pub fn resolve_load_order(event: &str, nodes: &[OrderNode<'_>]) -> Result<Vec<String>, EventError> {
    Resolver::new(nodes).run(event)
}
