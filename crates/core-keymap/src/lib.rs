//! Rule lookup table (§4.C) and keymap/focus resolver (§4.F).

pub mod keymap;
pub mod resolver;
pub mod rules;

pub use keymap::{FocusPredicate, Keymap, KeymapArena, KeymapId};
pub use resolver::{FocusResolver, PrefixStack, PREFIX_STACK_CAPACITY};
pub use rules::{ActionHandle, CompiledRule, RuleLookupTable, RuleLookupTableBuilder};
