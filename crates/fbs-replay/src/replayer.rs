//! Table construction replay.
//!
//! A compiled create method is a straight sequence of builder calls:
//!
//! ```text
//! builder.StartTable(3);
//! Item.AddName(builder, name);   // slot 2
//! Item.AddId(builder, id);       // slot 0
//! Item.AddKind(builder, kind);   // slot 1
//! return Item.EndItem(builder);
//! ```
//!
//! Replay walks the call sites once, in order, through three states:
//!
//! - `AwaitingStart`: everything before the object-start call is skipped
//! - `Accumulating(n)`: each call to one of the type's own methods is a field helper; its slot is
//!   resolved and recorded until `n` entries exist
//! - `Terminated`: entered at the first end marker; later calls are ignored
//!
//! Call order is discarded. Helpers are emitted largest-field-first, so only the storage slot gives
//! a stable field order.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use fbs_native::{ArgValue, CallSite, CallTarget};
use fbs_types::{Diagnostic, MethodDef, SkipReason};

use crate::classifier::{CallClass, Classifier};
use crate::slot_resolver::SlotSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    AwaitingStart,
    Accumulating(u32),
    Terminated,
}

/// Slot-indexed record of which helper supplied each field.
#[derive(Debug, Clone, Default)]
pub struct TableTrace<'a> {
    pub slots: BTreeMap<u32, &'a MethodDef>,
    /// Helpers whose slot could not be recovered, in call order.
    pub unresolved: Vec<&'a MethodDef>,
    pub declared_bound: Option<u32>,
    pub terminated: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> TableTrace<'a> {
    /// Entries counted against the declared bound.
    pub fn recorded(&self) -> usize {
        self.slots.len() + self.unresolved.len()
    }

    /// Helpers by ascending slot, then unresolved helpers in call order.
    pub fn ordered(&self) -> Vec<(Option<u32>, &'a MethodDef)> {
        self.slots
            .iter()
            .map(|(&slot, &method)| (Some(slot), method))
            .chain(self.unresolved.iter().map(|&method| (None, method)))
            .collect()
    }
}

pub struct TableReplayer<'c, 'a, R> {
    classifier: &'c Classifier<'a>,
    slots: &'c R,
}

impl<'c, 'a, R: SlotSource> TableReplayer<'c, 'a, R> {
    pub fn new(classifier: &'c Classifier<'a>, slots: &'c R) -> Self {
        Self { classifier, slots }
    }

    /// Replay a create method's call sites into a trace.
    pub fn replay(&self, call_sites: &[CallSite]) -> TableTrace<'a> {
        let mut trace = TableTrace::default();
        let mut state = ReplayState::AwaitingStart;

        for site in call_sites {
            if state == ReplayState::Terminated {
                break;
            }

            let target = match site.target {
                CallTarget::Direct(t) => t,
                CallTarget::Indirect => {
                    skip(&mut trace, site, SkipReason::Indirect);
                    continue;
                }
            };

            match (self.classifier.classify(target), state) {
                (CallClass::StartMarker, ReplayState::AwaitingStart) => {
                    let bound = match site.args.first() {
                        ArgValue::Known(v) => match u32::try_from(v) {
                            Ok(bound) => bound,
                            Err(_) => {
                                warn!(
                                    ordinal = site.ordinal,
                                    value = v,
                                    "object-start field count out of range"
                                );
                                trace.diagnostics.push(Diagnostic::BoundUnresolved);
                                0
                            }
                        },
                        ArgValue::Unresolved => {
                            warn!(ordinal = site.ordinal, "object-start field count unresolved");
                            trace.diagnostics.push(Diagnostic::BoundUnresolved);
                            0
                        }
                    };
                    trace.declared_bound = Some(bound);
                    state = ReplayState::Accumulating(bound);
                }
                (CallClass::StartMarker, _) => skip(&mut trace, site, SkipReason::RepeatedStart),
                (CallClass::EndMarker, ReplayState::Accumulating(_)) => {
                    trace.terminated = true;
                    state = ReplayState::Terminated;
                }
                (CallClass::OwnMethod(method), ReplayState::Accumulating(bound)) => {
                    self.accept(&mut trace, method, target, bound);
                }
                (CallClass::FieldWrite, ReplayState::Accumulating(_)) => {
                    skip(&mut trace, site, SkipReason::InlinedFieldWrite)
                }
                (CallClass::Foreign, ReplayState::Accumulating(_)) => {
                    skip(&mut trace, site, SkipReason::Foreign)
                }
                (_, _) => skip(&mut trace, site, SkipReason::BeforeStart),
            }
        }

        if !trace.terminated {
            debug!(
                calls = call_sites.len(),
                recorded = trace.recorded(),
                "create method ended without an end marker"
            );
            trace.diagnostics.push(Diagnostic::MissingEndMarker);
        }
        trace
    }

    fn accept(&self, trace: &mut TableTrace<'a>, method: &'a MethodDef, entry: u64, bound: u32) {
        if trace.recorded() >= bound as usize {
            warn!(method = %method.name, bound, "helper exceeds declared field count");
            trace.diagnostics.push(Diagnostic::BoundExceeded {
                method: method.name.clone(),
                bound,
            });
            return;
        }

        match self.slots.resolve_slot(method, entry) {
            Ok(slot) if slot >= bound => {
                warn!(method = %method.name, slot, bound, "slot outside declared bound");
                trace.diagnostics.push(Diagnostic::SlotOutOfBound {
                    method: method.name.clone(),
                    slot,
                    bound,
                });
            }
            Ok(slot) => {
                if let Some(first) = trace.slots.get(&slot) {
                    warn!(method = %method.name, slot, kept = %first.name, "duplicate slot");
                    trace.diagnostics.push(Diagnostic::DuplicateSlot {
                        method: method.name.clone(),
                        slot,
                    });
                } else {
                    trace.slots.insert(slot, method);
                }
            }
            Err(err) => {
                warn!(method = %method.name, error = %err, "field slot unresolved");
                trace.diagnostics.push(Diagnostic::SlotUnresolved {
                    method: method.name.clone(),
                    reason: err.to_string(),
                });
                trace.unresolved.push(method);
            }
        }
    }
}

fn skip(trace: &mut TableTrace<'_>, site: &CallSite, reason: SkipReason) {
    debug!(
        ordinal = site.ordinal,
        address = format_args!("{:#x}", site.address),
        %reason,
        "skipped call"
    );
    trace.diagnostics.push(Diagnostic::SkippedCall {
        ordinal: site.ordinal,
        target: site.direct_target(),
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder_api::BuilderApi;
    use crate::slot_resolver::SlotError;
    use fbs_native::{extract_call_sites, Instruction};
    use fbs_types::TypeDef;
    use std::collections::HashMap;

    const START: u64 = 0x10;
    const END: u64 = 0x20;
    const ADD_INT: u64 = 0x30;

    /// Slots keyed by helper entry address; missing entries are unresolved.
    struct FixedSlots(HashMap<u64, u32>);

    impl SlotSource for FixedSlots {
        fn resolve_slot(&self, _helper: &MethodDef, entry: u64) -> Result<u32, SlotError> {
            self.0
                .get(&entry)
                .copied()
                .ok_or(SlotError::UnresolvedArgument)
        }
    }

    fn method(name: &str, rva: u64) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            is_static: true,
            is_public: true,
            params: Vec::new(),
            return_type: None,
            rva: Some(rva),
        }
    }

    fn item() -> TypeDef {
        TypeDef {
            namespace: "FlatData".to_string(),
            name: "Item".to_string(),
            interfaces: Vec::new(),
            methods: vec![
                method("AddId", 0x100),
                method("AddKind", 0x200),
                method("AddName", 0x300),
                method("EndItem", 0x400),
            ],
            enum_info: None,
        }
    }

    fn start(addr: u64, n: i64) -> [Instruction; 2] {
        [Instruction::load_const(addr, 1, n), Instruction::call(addr + 4, START)]
    }

    fn replay<'a>(ty: &'a TypeDef, api: &'a BuilderApi, slots: &FixedSlots, body: &[Instruction]) -> TableTrace<'a> {
        let classifier = Classifier::for_type(api, ty, 0);
        TableReplayer::new(&classifier, slots).replay(&extract_call_sites(body))
    }

    fn names(trace: &TableTrace<'_>) -> Vec<(Option<u32>, String)> {
        trace
            .ordered()
            .into_iter()
            .map(|(slot, m)| (slot, m.name.clone()))
            .collect()
    }

    fn api() -> BuilderApi {
        BuilderApi::new(START, END, [ADD_INT])
    }

    fn all_slots() -> FixedSlots {
        FixedSlots(HashMap::from([(0x100, 0), (0x200, 1), (0x300, 2)]))
    }

    #[test]
    fn test_fields_ordered_by_slot_not_call_order() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 3).to_vec();
        body.extend([
            Instruction::call(0x10, 0x300),
            Instruction::call(0x14, 0x100),
            Instruction::call(0x18, 0x200),
            Instruction::call(0x1c, END),
        ]);
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(
            names(&trace),
            vec![
                (Some(0), "AddId".to_string()),
                (Some(1), "AddKind".to_string()),
                (Some(2), "AddName".to_string()),
            ]
        );
        assert_eq!(trace.declared_bound, Some(3));
        assert!(trace.terminated);
        assert!(trace.diagnostics.is_empty());
    }

    #[test]
    fn test_unresolved_helper_is_placeholder() {
        let ty = item();
        let api = api();
        let slots = FixedSlots(HashMap::new());
        let mut body = start(0x0, 2).to_vec();
        body.extend([Instruction::call(0x10, 0x100), Instruction::call(0x14, END)]);
        let trace = replay(&ty, &api, &slots, &body);

        assert_eq!(names(&trace), vec![(None, "AddId".to_string())]);
        assert!(trace.slots.is_empty());
        assert!(matches!(
            trace.diagnostics.as_slice(),
            [Diagnostic::SlotUnresolved { method, .. }] if method == "AddId"
        ));
    }

    #[test]
    fn test_foreign_call_skipped() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 1).to_vec();
        body.extend([
            Instruction::call(0x10, 0x7777),
            Instruction::call(0x14, 0x100),
            Instruction::call(0x18, END),
        ]);
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(names(&trace), vec![(Some(0), "AddId".to_string())]);
        assert_eq!(
            trace.diagnostics,
            vec![Diagnostic::SkippedCall {
                ordinal: 1,
                target: Some(0x7777),
                reason: SkipReason::Foreign,
            }]
        );
    }

    #[test]
    fn test_calls_before_start_and_after_end_ignored() {
        let ty = item();
        let api = api();
        let mut body = vec![Instruction::call(0x0, 0x100)];
        body.extend(start(0x4, 3));
        body.extend([
            Instruction::call(0x10, 0x200),
            Instruction::call(0x14, 0x400),
            Instruction::call(0x18, 0x300),
        ]);
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(names(&trace), vec![(Some(1), "AddKind".to_string())]);
        assert!(trace.terminated);
        assert!(matches!(
            trace.diagnostics.as_slice(),
            [Diagnostic::SkippedCall {
                reason: SkipReason::BeforeStart,
                ..
            }]
        ));
    }

    #[test]
    fn test_no_end_marker_halts_at_stream_end() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 3).to_vec();
        body.push(Instruction::call(0x10, 0x100));
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert!(!trace.terminated);
        assert_eq!(trace.recorded(), 1);
        assert_eq!(trace.diagnostics, vec![Diagnostic::MissingEndMarker]);
    }

    #[test]
    fn test_duplicate_slot_keeps_first() {
        let ty = item();
        let api = api();
        let slots = FixedSlots(HashMap::from([(0x100, 0), (0x200, 0)]));
        let mut body = start(0x0, 3).to_vec();
        body.extend([
            Instruction::call(0x10, 0x100),
            Instruction::call(0x14, 0x200),
            Instruction::call(0x18, END),
        ]);
        let trace = replay(&ty, &api, &slots, &body);

        assert_eq!(names(&trace), vec![(Some(0), "AddId".to_string())]);
        assert_eq!(
            trace.diagnostics,
            vec![Diagnostic::DuplicateSlot {
                method: "AddKind".to_string(),
                slot: 0
            }]
        );
    }

    #[test]
    fn test_bound_enforced() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 1).to_vec();
        body.extend([
            Instruction::call(0x10, 0x100),
            Instruction::call(0x14, 0x200),
            Instruction::call(0x18, END),
        ]);
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(trace.recorded(), 1);
        assert!(matches!(
            trace.diagnostics.as_slice(),
            [Diagnostic::BoundExceeded { bound: 1, .. }]
        ));
    }

    #[test]
    fn test_slot_out_of_bound_reported() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 2).to_vec();
        body.extend([
            Instruction::call(0x10, 0x300),
            Instruction::call(0x14, 0x100),
            Instruction::call(0x18, END),
        ]);
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(names(&trace), vec![(Some(0), "AddId".to_string())]);
        assert!(trace.slots.keys().all(|&s| s < 2));
        assert_eq!(
            trace.diagnostics,
            vec![Diagnostic::SlotOutOfBound {
                method: "AddName".to_string(),
                slot: 2,
                bound: 2
            }]
        );
    }

    #[test]
    fn test_inlined_field_write_and_indirect_skipped() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 3).to_vec();
        body.extend([
            Instruction::call(0x10, ADD_INT),
            Instruction::indirect_call(0x14),
            Instruction::call(0x18, END),
        ]);
        let trace = replay(&ty, &api, &all_slots(), &body);

        let reasons: Vec<SkipReason> = trace
            .diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SkippedCall { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![SkipReason::InlinedFieldWrite, SkipReason::Indirect]);
        assert_eq!(trace.recorded(), 0);
    }

    #[test]
    fn test_unresolved_bound_is_zero() {
        let ty = item();
        let api = api();
        let body = [
            Instruction::clobber(0x0, 1),
            Instruction::call(0x4, START),
            Instruction::call(0x8, 0x100),
            Instruction::call(0xc, END),
        ];
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(trace.declared_bound, Some(0));
        assert_eq!(trace.recorded(), 0);
        assert!(trace.diagnostics.contains(&Diagnostic::BoundUnresolved));
    }

    #[test]
    fn test_negative_bound_is_unresolved() {
        let ty = item();
        let api = api();
        let body = [
            Instruction::load_const(0x0, 1, -3),
            Instruction::call(0x4, START),
            Instruction::call(0x8, END),
        ];
        let trace = replay(&ty, &api, &all_slots(), &body);

        assert_eq!(trace.declared_bound, Some(0));
        assert_eq!(trace.diagnostics, vec![Diagnostic::BoundUnresolved]);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let ty = item();
        let api = api();
        let mut body = start(0x0, 3).to_vec();
        body.extend([
            Instruction::call(0x10, 0x200),
            Instruction::call(0x14, 0x7777),
            Instruction::call(0x18, 0x100),
            Instruction::call(0x1c, END),
        ]);
        let sites = extract_call_sites(&body);
        let classifier = Classifier::for_type(&api, &ty, 0);
        let slots = all_slots();
        let replayer = TableReplayer::new(&classifier, &slots);

        let first = replayer.replay(&sites);
        let second = replayer.replay(&sites);
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.diagnostics, second.diagnostics);
    }
}
