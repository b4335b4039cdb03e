//! Rule lookup table (§4.C): bucketed `input_code -> ordered rules` match
//! engine. Built once per configuration load, then frozen and shared
//! read-only across threads via `Arc`.

use core_keycode::InternalCode;
use core_modifier::ModifierBitset;
use std::collections::HashMap;

/// Opaque reference to an action owned by the action executor crate. Kept as a plain index here
/// so `core-keymap` never depends on `core-actions`; the executor resolves the handle at queue
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle(pub u32);

/// A single compiled rule (§3): matches a key event when every bit in `required_on` is set in
/// the current modifier state and every bit in `required_off` is clear.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub required_on: ModifierBitset,
    pub required_off: ModifierBitset,
    pub output_code: u16,
    pub action: Option<ActionHandle>,
}

impl CompiledRule {
    pub fn new(required_on: ModifierBitset, required_off: ModifierBitset, output_code: u16) -> Self {
        Self {
            required_on,
            required_off,
            output_code,
            action: None,
        }
    }

    pub fn with_action(mut self, action: ActionHandle) -> Self {
        self.action = Some(action);
        self
    }

    pub fn matches(&self, state: &ModifierBitset) -> bool {
        state.satisfies(&self.required_on, &self.required_off)
    }

    /// Specificity used by the loader to order a bucket: the cardinality of
    /// `required_on ∪ required_off`. A strict superset is strictly more specific.
    pub fn specificity(&self) -> usize {
        self.required_on.union(&self.required_off).popcount()
    }
}

/// Immutable, `Send + Sync` rule table (§4.C). Bucket order is the authoritative priority order
/// established by the configuration loader at build time; it is preserved verbatim here.
#[derive(Debug, Default)]
pub struct RuleLookupTable {
    buckets: HashMap<InternalCode, Vec<CompiledRule>>,
}

impl RuleLookupTable {
    /// Locate the bucket for `input_code` and return the first rule whose `(required_on,
    /// required_off)` is satisfied by `state`, in bucket priority order.
    pub fn find_match(&self, input_code: InternalCode, state: &ModifierBitset) -> Option<&CompiledRule> {
        let bucket = self.buckets.get(&input_code)?;
        bucket.iter().find(|rule| rule.matches(state))
    }

    pub fn bucket_len(&self, input_code: InternalCode) -> usize {
        self.buckets.get(&input_code).map_or(0, Vec::len)
    }

    pub fn rule_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Consumed by `.build()` to produce an immutable `RuleLookupTable`. `add_rule` is the only
/// mutation path and is used only during construction, matching the build-once-then-freeze
/// lifecycle of a configuration load.
#[derive(Debug, Default)]
pub struct RuleLookupTableBuilder {
    buckets: HashMap<InternalCode, Vec<CompiledRule>>,
}

impl RuleLookupTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule` into `input_code`'s bucket, preserving caller-supplied order. Callers
    /// (the configuration loader) are expected to have already sorted rules most-specific-first
    /// before calling this; the builder does not re-sort.
    pub fn add_rule(&mut self, input_code: InternalCode, rule: CompiledRule) -> &mut Self {
        self.buckets.entry(input_code).or_default().push(rule);
        self
    }

    pub fn build(self) -> RuleLookupTable {
        RuleLookupTable {
            buckets: self.buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_modifier::StdModifier;

    fn bitset_with_std(flag: StdModifier) -> ModifierBitset {
        let mut b = ModifierBitset::new();
        b.set_std(flag, true);
        b
    }

    #[test]
    fn find_match_returns_first_satisfying_rule_in_bucket_order() {
        let mut builder = RuleLookupTableBuilder::new();
        let shift_on = bitset_with_std(StdModifier::LShift);
        let none = ModifierBitset::new();
        builder.add_rule(30, CompiledRule::new(shift_on.clone(), none.clone(), 999));
        builder.add_rule(30, CompiledRule::new(none.clone(), none.clone(), 30));
        let table = builder.build();

        let mut state = ModifierBitset::new();
        state.set_std(StdModifier::LShift, true);
        assert_eq!(table.find_match(30, &state).unwrap().output_code, 999);

        let no_shift = ModifierBitset::new();
        assert_eq!(table.find_match(30, &no_shift).unwrap().output_code, 30);
    }

    #[test]
    fn absent_bucket_returns_none() {
        let table = RuleLookupTableBuilder::new().build();
        assert!(table.find_match(30, &ModifierBitset::new()).is_none());
    }

    #[test]
    fn specificity_ranks_by_union_popcount() {
        let mut on = ModifierBitset::new();
        on.set_std(StdModifier::LShift, true);
        let mut off = ModifierBitset::new();
        off.set_std(StdModifier::LCtrl, true);
        let rule = CompiledRule::new(on, off, 1);
        assert_eq!(rule.specificity(), 2);
    }
}
