//! Hot-path latency benchmark (§4.H, §8 "Latency"). Reports P50/P95/P99 for
//! `EventProcessor::process` the way the teacher's own `search_bench`/`wrap_bench` report their
//! numbers: exercised on every run, never asserted as a hard CI gate, since benchmark hardware
//! varies.

use std::sync::Arc;

use core_engine::EventProcessor;
use core_events::EventType;
use core_keymap::{
    CompiledRule, FocusPredicate, FocusResolver, Keymap, KeymapArena, RuleLookupTableBuilder,
};
use core_modifier::ModifierBitset;
use core_modifier::ModifierKeyHandler;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn build_processor() -> EventProcessor {
    let mut rules = RuleLookupTableBuilder::new();
    let none = ModifierBitset::new();
    rules.add_rule(30, CompiledRule::new(none.clone(), none, 31)); // KEY_A -> KEY_S, unconditional
    let keymap = Keymap::new("global", FocusPredicate::any(), rules.build());
    let mut arena = KeymapArena::new();
    let default_keymap = arena.insert(keymap);
    let resolver = Arc::new(FocusResolver::new(arena, default_keymap));
    EventProcessor::new(resolver, ModifierKeyHandler::new())
}

fn passthrough_benchmark(c: &mut Criterion) {
    let processor = build_processor();
    let mut now_ns = 0u64;
    c.bench_function("process_remapped_key_press", |b| {
        b.iter(|| {
            now_ns += 1;
            black_box(processor.process(0, black_box(30), EventType::Press, now_ns))
        })
    });
}

criterion_group!(benches, passthrough_benchmark);
criterion_main!(benches);
