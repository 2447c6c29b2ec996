//! Posts kept in descending `Order` as a doubly-linked chain.
//!
//! Nodes live in an arena keyed by post id; `prev`/`next` are keys into that
//! arena, so unlinking a node can never leave a dangling reference behind.
//! Walking `next` from the head always yields non-increasing orders.

use std::collections::HashMap;

use crate::post::PostId;

/// Where a node landed, relative to a neighbor that is already rendered.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub enum Placement {
    /// The list was empty.
    First,
    Before(PostId),
    After(PostId),
}

#[derive(Clone, Debug)]
struct Node {
    order: f64,
    prev: Option<PostId>,
    next: Option<PostId>,
}

#[derive(Clone, Debug, Default)]
pub struct OrderedPostList {
    nodes: HashMap<PostId, Node>,
    head: Option<PostId>,
}

impl OrderedPostList {
    pub fn new() -> Self {
        OrderedPostList::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn head(&self) -> Option<&PostId> {
        self.head.as_ref()
    }

    pub fn order_of(&self, id: &PostId) -> Option<f64> {
        self.nodes.get(id).map(|node| node.order)
    }

    pub fn next_of(&self, id: &PostId) -> Option<&PostId> {
        self.nodes.get(id).and_then(|node| node.next.as_ref())
    }

    pub fn prev_of(&self, id: &PostId) -> Option<&PostId> {
        self.nodes.get(id).and_then(|node| node.prev.as_ref())
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head.as_ref(),
        }
    }

    /// Links a new node. Returns `None` when the id is already linked; use
    /// [`OrderedPostList::reposition`] for those.
    pub fn insert(&mut self, id: PostId, order: f64) -> Option<Placement> {
        if self.nodes.contains_key(&id) {
            return None;
        }

        // fresh posts are usually the newest, so the head is the closest
        // known neighbor
        let mut prev: Option<PostId> = None;
        let mut cursor = self.head.clone();
        while let Some(current) = cursor {
            let node = &self.nodes[&current];
            if node.order < order {
                cursor = Some(current);
                break;
            }
            cursor = node.next.clone();
            prev = Some(current);
        }

        self.nodes.insert(
            id.clone(),
            Node {
                order,
                prev: None,
                next: None,
            },
        );
        self.link_between(&id, prev.clone(), cursor.clone());

        Some(match (cursor, prev) {
            (Some(next), _) => Placement::Before(next),
            (None, Some(prev)) => Placement::After(prev),
            (None, None) => Placement::First,
        })
    }

    /// Detaches a node and reconnects its former neighbors.
    pub fn remove(&mut self, id: &PostId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.unlink(id);
        self.nodes.remove(id);
        true
    }

    /// Moves a node after its order changed, walking only as far as it
    /// moved. Returns the new placement, or `None` if it stays in its slot.
    pub fn reposition(&mut self, id: &PostId, order: f64) -> Option<Placement> {
        let node = self.nodes.get_mut(id)?;
        let old = node.order;
        node.order = order;

        if order < old {
            // sinking: pass every following node that still outranks us
            let mut passed = None;
            let mut cursor = self.nodes[id].next.clone();
            while let Some(current) = cursor {
                let neighbor = &self.nodes[&current];
                if neighbor.order > order {
                    cursor = neighbor.next.clone();
                    passed = Some(current);
                } else {
                    cursor = Some(current);
                    break;
                }
            }

            let passed = passed?;
            self.unlink(id);
            self.link_between(id, Some(passed.clone()), cursor.clone());
            Some(match cursor {
                Some(stop) => Placement::Before(stop),
                None => Placement::After(passed),
            })
        } else if order > old {
            // rising: pass every preceding node we now outrank
            let mut passed = None;
            let mut cursor = self.nodes[id].prev.clone();
            while let Some(current) = cursor {
                let neighbor = &self.nodes[&current];
                if neighbor.order < order {
                    cursor = neighbor.prev.clone();
                    passed = Some(current);
                } else {
                    cursor = Some(current);
                    break;
                }
            }

            let passed = passed?;
            self.unlink(id);
            self.link_between(id, cursor.clone(), Some(passed.clone()));
            Some(match cursor {
                Some(stop) => Placement::After(stop),
                None => Placement::Before(passed),
            })
        } else {
            None
        }
    }

    fn unlink(&mut self, id: &PostId) {
        let (prev, next) = match self.nodes.get_mut(id) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match &prev {
            Some(prev_id) => {
                if let Some(prev_node) = self.nodes.get_mut(prev_id) {
                    prev_node.next = next.clone();
                }
            }
            None => self.head = next.clone(),
        }
        if let Some(next_id) = &next {
            if let Some(next_node) = self.nodes.get_mut(next_id) {
                next_node.prev = prev;
            }
        }
    }

    fn link_between(&mut self, id: &PostId, prev: Option<PostId>, next: Option<PostId>) {
        match &prev {
            Some(prev_id) => {
                if let Some(prev_node) = self.nodes.get_mut(prev_id) {
                    prev_node.next = Some(id.clone());
                }
            }
            None => self.head = Some(id.clone()),
        }
        if let Some(next_id) = &next {
            if let Some(next_node) = self.nodes.get_mut(next_id) {
                next_node.prev = Some(id.clone());
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = prev;
            node.next = next;
        }
    }
}

pub struct Iter<'a> {
    list: &'a OrderedPostList,
    cursor: Option<&'a PostId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a PostId, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.list.nodes.get(id)?;
        self.cursor = node.next.as_ref();
        Some((id, node.order))
    }
}
