//! Resolves the raw TOML schema (§`schema`) into the compiled types the engine actually runs
//! against: a `core_keymap::KeymapArena`, `core_modifier::TriggerRegistration`s, and an
//! `ActionKind` table addressed by `core_keymap::ActionHandle`.

use std::collections::HashMap;

use core_actions::{ActionKind, ExternalOp, VariableOp};
use core_keymap::{ActionHandle, CompiledRule, FocusPredicate, Keymap, KeymapArena, KeymapId, RuleLookupTableBuilder};
use core_modifier::{ModifierBitset, StdModifier, TriggerRegistration};
use core_events::EventType;
use regex::Regex;

use crate::error::LoadError;
use crate::schema::{RawActionKind, RawConfig, RawEventType, RawKeymap, RawRule, RawSeqStep, RawVariableOp};

pub(crate) struct BuiltConfig {
    pub arena: KeymapArena,
    pub default_keymap: KeymapId,
    pub triggers: Vec<TriggerRegistration>,
    pub initial_locks: Vec<u8>,
    pub actions: Vec<ActionKind>,
}

pub(crate) fn build(raw: RawConfig) -> Result<BuiltConfig, LoadError> {
    let mut name_to_id = HashMap::with_capacity(raw.keymap.len());
    for (i, km) in raw.keymap.iter().enumerate() {
        if name_to_id.insert(km.name.clone(), KeymapId(i as u32)).is_some() {
            return Err(LoadError::DuplicateKeymap(km.name.clone()));
        }
    }

    let actions = build_actions(&raw.action, &name_to_id)?;

    let mut arena = KeymapArena::new();
    for km in &raw.keymap {
        arena.insert(build_keymap(km, &name_to_id, actions.len())?);
    }

    let default_keymap = *name_to_id
        .get(&raw.default_keymap)
        .ok_or_else(|| LoadError::UnknownDefaultKeymap(raw.default_keymap.clone()))?;

    let triggers = raw
        .trigger
        .iter()
        .map(|t| {
            if t.threshold_ms == 0 {
                return Err(LoadError::ZeroThreshold(t.trigger_code));
            }
            let mut reg = TriggerRegistration::new(t.trigger_code, t.mod_num).with_threshold_ms(t.threshold_ms);
            if let Some(tap) = t.tap_output {
                reg = reg.with_tap_output(tap);
            }
            Ok(reg)
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(BuiltConfig {
        arena,
        default_keymap,
        triggers,
        initial_locks: raw.locks.initial,
        actions,
    })
}

fn build_keymap(km: &RawKeymap, name_to_id: &HashMap<String, KeymapId>, action_count: usize) -> Result<Keymap, LoadError> {
    let focus = FocusPredicate {
        class_re: km
            .class_regex
            .as_deref()
            .map(|p| Regex::new(p).map_err(|source| LoadError::InvalidRegex { keymap: km.name.clone(), source }))
            .transpose()?,
        title_re: km
            .title_regex
            .as_deref()
            .map(|p| Regex::new(p).map_err(|source| LoadError::InvalidRegex { keymap: km.name.clone(), source }))
            .transpose()?,
    };

    let mut rules: Vec<(u16, CompiledRule)> = km
        .rule
        .iter()
        .map(|r| build_rule(r, &km.name, action_count))
        .collect::<Result<_, LoadError>>()?;
    // Most-specific-first within a bucket; `sort_by` is stable so equal-specificity rules keep
    // their source order (§4.C tie-break).
    rules.sort_by(|(_, a), (_, b)| b.specificity().cmp(&a.specificity()));

    let mut builder = RuleLookupTableBuilder::new();
    for (input, rule) in rules {
        builder.add_rule(input, rule);
    }

    let mut keymap = Keymap::new(km.name.clone(), focus, builder.build());
    if let Some(parent_name) = &km.parent {
        let parent_id = name_to_id
            .get(parent_name)
            .copied()
            .ok_or_else(|| LoadError::UnknownParent(km.name.clone(), parent_name.clone()))?;
        keymap = keymap.with_parent(parent_id);
    }
    Ok(keymap)
}

fn build_rule(r: &RawRule, keymap_name: &str, action_count: usize) -> Result<(u16, CompiledRule), LoadError> {
    let required_on = parse_mod_bits(&r.required_on)?;
    let required_off = parse_mod_bits(&r.required_off)?;
    let mut rule = CompiledRule::new(required_on, required_off, r.output);
    if let Some(idx) = r.action {
        if idx as usize >= action_count {
            return Err(LoadError::UnknownAction(keymap_name.to_string(), idx, action_count));
        }
        rule = rule.with_action(ActionHandle(idx));
    }
    Ok((r.input, rule))
}

/// Parse `"std:lctrl"` / `"mod:3"` / `"lock:7"` style specs into a `ModifierBitset` with the
/// named bits set. Unrecognized specs are a loader error, not a silent no-op (§7: a malformed
/// config must never install with a partially-wrong rule).
pub(crate) fn parse_mod_bits(specs: &[String]) -> Result<ModifierBitset, LoadError> {
    let mut bits = ModifierBitset::new();
    for spec in specs {
        let (kind, value) = spec.split_once(':').ok_or_else(|| LoadError::InvalidModBit {
            spec: spec.clone(),
            reason: "expected '<kind>:<value>' (kind is std, mod, or lock)".to_string(),
        })?;
        match kind {
            "std" => bits.set_std(parse_std_modifier(value, spec)?, true),
            "mod" => bits.set_virtual(parse_u8(value, spec)?, true),
            "lock" => bits.set_lock(parse_u8(value, spec)?, true),
            other => {
                return Err(LoadError::InvalidModBit {
                    spec: spec.clone(),
                    reason: format!("unknown kind '{other}'"),
                });
            }
        }
    }
    Ok(bits)
}

fn parse_u8(value: &str, spec: &str) -> Result<u8, LoadError> {
    value.parse::<u8>().map_err(|e| LoadError::InvalidModBit {
        spec: spec.to_string(),
        reason: e.to_string(),
    })
}

fn parse_std_modifier(value: &str, spec: &str) -> Result<StdModifier, LoadError> {
    Ok(match value {
        "lshift" => StdModifier::LShift,
        "rshift" => StdModifier::RShift,
        "lctrl" => StdModifier::LCtrl,
        "rctrl" => StdModifier::RCtrl,
        "lalt" => StdModifier::LAlt,
        "ralt" => StdModifier::RAlt,
        "lwin" => StdModifier::LWin,
        "rwin" => StdModifier::RWin,
        "capslock" => StdModifier::CapsLock,
        "numlock" => StdModifier::NumLock,
        "scrolllock" => StdModifier::ScrollLock,
        "up" => StdModifier::Up,
        "down" => StdModifier::Down,
        "repeat" => StdModifier::Repeat,
        "imelock" => StdModifier::IMELock,
        "imecomp" => StdModifier::IMEComp,
        other => {
            return Err(LoadError::InvalidModBit {
                spec: spec.to_string(),
                reason: format!("unknown standard modifier '{other}'"),
            });
        }
    })
}

fn build_actions(raw: &[crate::schema::RawAction], name_to_id: &HashMap<String, KeymapId>) -> Result<Vec<ActionKind>, LoadError> {
    raw.iter().map(|a| build_action_kind(&a.kind, name_to_id)).collect()
}

fn build_action_kind(raw: &RawActionKind, name_to_id: &HashMap<String, KeymapId>) -> Result<ActionKind, LoadError> {
    Ok(match raw {
        RawActionKind::KeySequence { sequence } => ActionKind::KeySequence(build_sequence(sequence)),
        RawActionKind::ToggleLock { lock_num } => ActionKind::ToggleLock(*lock_num),
        RawActionKind::PrefixPush { keymap } => {
            let id = name_to_id
                .get(keymap)
                .copied()
                .ok_or_else(|| LoadError::UnknownActionKeymap(keymap.clone()))?;
            ActionKind::PrefixPush(id)
        }
        RawActionKind::PrefixParent => ActionKind::PrefixParent,
        RawActionKind::PrefixPrev => ActionKind::PrefixPrev,
        RawActionKind::PrefixCancel => ActionKind::PrefixCancel,
        RawActionKind::Repeat { sequence, count_var } => ActionKind::Repeat {
            sequence: build_sequence(sequence),
            count_var: count_var.clone(),
        },
        RawActionKind::VariableMutate { name, op } => ActionKind::VariableMutate {
            name: name.clone(),
            op: match op {
                RawVariableOp::Set(v) => VariableOp::Set(*v),
                RawVariableOp::Increment(v) => VariableOp::Increment(*v),
                RawVariableOp::Reset => VariableOp::Reset,
            },
        },
        RawActionKind::Help => ActionKind::Help,
        RawActionKind::Notify { message } => ActionKind::Notify { message: message.clone() },
        RawActionKind::ShellExecute { command, args } => ActionKind::External(ExternalOp::ShellExecute {
            command: command.clone(),
            args: args.clone(),
        }),
        RawActionKind::WindowManagement { op } => ActionKind::External(ExternalOp::WindowManagement { op: op.clone() }),
        RawActionKind::ClipboardWrite { text } => ActionKind::External(ExternalOp::ClipboardWrite { text: text.clone() }),
        RawActionKind::ImeToggle => ActionKind::External(ExternalOp::ImeToggle),
        RawActionKind::PlugIn { name, args } => ActionKind::External(ExternalOp::PlugIn {
            name: name.clone(),
            args: args.clone(),
        }),
    })
}

fn build_sequence(raw: &[RawSeqStep]) -> Vec<(u16, EventType)> {
    raw.iter()
        .map(|step| {
            (
                step.0,
                match step.1 {
                    RawEventType::Press => EventType::Press,
                    RawEventType::Release => EventType::Release,
                },
            )
        })
        .collect()
}
