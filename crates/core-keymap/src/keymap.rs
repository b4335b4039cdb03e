//! Keymap arena (§4.F, §9): named rule sets with single inheritance, stored
//! in a flat `Vec` and addressed by index to cut cyclic parent/child
//! ownership.

use crate::rules::RuleLookupTable;
use regex::Regex;

/// Index into a `KeymapArena`. Stable for the lifetime of one configuration generation; a
/// configuration reload replaces the whole arena rather than mutating ids in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeymapId(pub u32);

/// A keymap's focus predicate: both patterns must match the focus snapshot for the keymap to be
/// a candidate (§4.F). `None` means "matches any" for that field.
#[derive(Debug)]
pub struct FocusPredicate {
    pub class_re: Option<Regex>,
    pub title_re: Option<Regex>,
}

impl FocusPredicate {
    pub fn any() -> Self {
        Self {
            class_re: None,
            title_re: None,
        }
    }

    pub fn matches(&self, class: &str, title: &str) -> bool {
        self.class_re.as_ref().is_none_or(|re| re.is_match(class))
            && self.title_re.as_ref().is_none_or(|re| re.is_match(title))
    }
}

/// A named rule set with an optional parent, loaded as a unit at configuration swap and
/// immutable until the next swap (§3 lifecycle).
pub struct Keymap {
    pub name: String,
    pub parent: Option<KeymapId>,
    pub focus: FocusPredicate,
    pub rules: RuleLookupTable,
}

impl Keymap {
    pub fn new(name: impl Into<String>, focus: FocusPredicate, rules: RuleLookupTable) -> Self {
        Self {
            name: name.into(),
            parent: None,
            focus,
            rules,
        }
    }

    pub fn with_parent(mut self, parent: KeymapId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Flat storage for every keymap compiled from one configuration. Parent links are resolved by
/// index at lookup time rather than through owning references, so the arena can be dropped and
/// replaced as a single unit on reload without fighting the borrow checker over cycles.
#[derive(Default)]
pub struct KeymapArena {
    keymaps: Vec<Keymap>,
}

impl KeymapArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keymap: Keymap) -> KeymapId {
        let id = KeymapId(self.keymaps.len() as u32);
        self.keymaps.push(keymap);
        id
    }

    pub fn get(&self, id: KeymapId) -> Option<&Keymap> {
        self.keymaps.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.keymaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keymaps.is_empty()
    }

    /// Walk `id`'s parent chain (inclusive), used by the resolver to build an effective rule
    /// search order for a keymap and its ancestors.
    pub fn ancestry(&self, id: KeymapId) -> Vec<KeymapId> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(cur_id) = cur {
            chain.push(cur_id);
            cur = self.keymaps.get(cur_id.0 as usize).and_then(|k| k.parent);
        }
        chain
    }

    /// Candidate keymaps, in configuration order, whose focus predicate matches `(class, title)`
    /// (§4.F: "first match wins, ties broken by configuration order").
    pub fn candidates_for_focus<'a>(
        &'a self,
        class: &'a str,
        title: &'a str,
    ) -> impl Iterator<Item = KeymapId> + 'a {
        self.keymaps.iter().enumerate().filter_map(move |(i, k)| {
            k.focus.matches(class, title).then_some(KeymapId(i as u32))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleLookupTableBuilder;

    fn empty_rules() -> RuleLookupTable {
        RuleLookupTableBuilder::new().build()
    }

    #[test]
    fn first_matching_candidate_wins_by_configuration_order() {
        let mut arena = KeymapArena::new();
        arena.insert(Keymap::new(
            "terminal",
            FocusPredicate {
                class_re: Some(Regex::new("^xterm$").unwrap()),
                title_re: None,
            },
            empty_rules(),
        ));
        arena.insert(Keymap::new("global", FocusPredicate::any(), empty_rules()));

        let candidates: Vec<_> = arena.candidates_for_focus("xterm", "bash").collect();
        assert_eq!(candidates, vec![KeymapId(0), KeymapId(1)]);
    }

    #[test]
    fn ancestry_walks_parent_chain_without_cycles() {
        let mut arena = KeymapArena::new();
        let base = arena.insert(Keymap::new("base", FocusPredicate::any(), empty_rules()));
        let mid = arena.insert(Keymap::new("mid", FocusPredicate::any(), empty_rules()).with_parent(base));
        let leaf = arena.insert(Keymap::new("leaf", FocusPredicate::any(), empty_rules()).with_parent(mid));

        assert_eq!(arena.ancestry(leaf), vec![leaf, mid, base]);
    }
}
