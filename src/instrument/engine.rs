//! The instrumentation engine.
//!
//! [`Instrumenter::apply`] runs the steps of one [`PatchDescriptor`] against a
//! method body and validates the result. Keys introduced by steps (locals,
//! labels) live in a [`PatchContext`] scoped to that single application.

use std::collections::HashMap;

use crate::{
    assembly::{net_stack_effect, FlowType, Instruction, InstructionBuffer, Label, TypeRef},
    instrument::{
        anchor::AnchorRule,
        descriptor::{EventSite, PatchDescriptor, PatchStep, Placement, ValueOverride},
        fragment::Fragment,
    },
    Error, Result,
};

/// Locals and labels bound by name during one descriptor application.
#[derive(Debug, Clone, Default)]
pub struct PatchContext {
    locals: HashMap<String, u16>,
    labels: HashMap<String, Label>,
}

impl PatchContext {
    /// Binds `key` to local slot `slot`, replacing an earlier binding.
    pub fn bind_local(&mut self, key: impl Into<String>, slot: u16) {
        self.locals.insert(key.into(), slot);
    }

    /// Binds `key` to `label`, replacing an earlier binding.
    pub fn bind_label(&mut self, key: impl Into<String>, label: Label) {
        self.labels.insert(key.into(), label);
    }

    /// Slot bound to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `key` was never declared.
    pub fn local(&self, key: &str) -> Result<u16> {
        self.locals
            .get(key)
            .copied()
            .ok_or_else(|| patch_error!("local '{}' is used before it is declared", key))
    }

    /// Label bound to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `key` was never bound.
    pub fn label(&self, key: &str) -> Result<Label> {
        self.labels
            .get(key)
            .copied()
            .ok_or_else(|| patch_error!("label '{}' does not resolve to an existing exit", key))
    }
}

/// Applies patch descriptors to method bodies.
///
/// # Examples
///
/// ```rust
/// use hostpatch::assembly::{Instruction, InstructionBuffer, MethodRef, Opcode, TypeRef};
/// use hostpatch::instrument::{AnchorRule, Fragment, Instrumenter, PatchDescriptor, Placement};
///
/// let body = InstructionBuffer::from_instructions(vec![
///     Instruction::new(Opcode::Ldarg0),
///     Instruction::new(Opcode::Pop),
///     Instruction::new(Opcode::Ret),
/// ]);
///
/// let descriptor = PatchDescriptor::new(MethodRef::instance(TypeRef::new("", "Host"), "Tick"))
///     .remove(AnchorRule::opcode(Opcode::Ldarg0), 2)
///     .insert(AnchorRule::opcode(Opcode::Ret), Placement::Before, Fragment::new().op(Opcode::Nop));
///
/// let patched = Instrumenter::new().apply(body, &descriptor)?;
/// assert_eq!(patched.len(), 2);
/// assert_eq!(patched.get(0).unwrap().opcode, Opcode::Nop);
/// # Ok::<(), hostpatch::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Instrumenter;

impl Instrumenter {
    /// Creates an instrumenter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Applies every step of `descriptor` to `buffer`, then validates it.
    ///
    /// # Errors
    ///
    /// Fails with the first step error ([`Error::AnchorNotFound`],
    /// [`Error::AnchorAmbiguous`], [`Error::InvalidDescriptor`],
    /// [`Error::StackMismatch`], [`Error::IndexOutOfRange`]) or with the
    /// validation error of the resulting buffer.
    pub fn apply(
        &self,
        mut buffer: InstructionBuffer,
        descriptor: &PatchDescriptor,
    ) -> Result<InstructionBuffer> {
        let mut context = PatchContext::default();

        for step in descriptor.steps() {
            log::debug!("{}: {}", descriptor.target(), step);
            self.apply_step(&mut buffer, &mut context, step)?;
        }

        buffer.validate()?;
        Ok(buffer)
    }

    fn apply_step(
        &self,
        buffer: &mut InstructionBuffer,
        context: &mut PatchContext,
        step: &PatchStep,
    ) -> Result<()> {
        match step {
            PatchStep::DeclareLocal { key, ty } => declare_local(buffer, context, key, ty),
            PatchStep::CaptureLabel { key, anchor } => {
                let index = anchor.resolve(buffer)?;
                let label = buffer
                    .get(index)
                    .and_then(|instruction| instruction.labels.first().copied())
                    .ok_or_else(|| {
                        patch_error!("instruction {} matched by {} carries no label", index, anchor)
                    })?;
                context.bind_label(key.clone(), label);
                Ok(())
            }
            PatchStep::LabelExit { key, anchor } => label_exit(buffer, context, key, anchor),
            PatchStep::RaiseEvent(site) => raise_event(buffer, context, site),
            PatchStep::Insert {
                anchor,
                placement,
                fragment,
            } => insert(buffer, context, anchor, *placement, fragment),
            PatchStep::Remove { anchor, count } => {
                if *count == 0 {
                    return Err(patch_error!("empty removal at {}", anchor));
                }
                let index = anchor.resolve(buffer)?;
                buffer.remove_range(index, *count)?;
                Ok(())
            }
            PatchStep::OverrideValue(value) => override_value(buffer, context, value),
        }
    }
}

fn declare_local(
    buffer: &mut InstructionBuffer,
    context: &mut PatchContext,
    key: &str,
    ty: &TypeRef,
) -> Result<()> {
    if context.local(key).is_ok() {
        return Err(patch_error!("local '{}' is declared twice", key));
    }
    let slot = buffer.declare_local(ty.clone());
    context.bind_local(key, slot);
    Ok(())
}

fn label_exit(
    buffer: &mut InstructionBuffer,
    context: &mut PatchContext,
    key: &str,
    anchor: &AnchorRule,
) -> Result<()> {
    let index = anchor.resolve(buffer)?;
    let is_exit = buffer.get(index).is_some_and(|instruction| {
        instruction.flow_type() == FlowType::Return || !instruction.labels.is_empty()
    });
    if !is_exit {
        return Err(patch_error!(
            "instruction {} matched by {} is neither a return nor a branch target",
            index,
            anchor
        ));
    }

    let label = buffer.label_at(index)?;
    context.bind_label(key, label);
    Ok(())
}

fn insertion_index(buffer: &InstructionBuffer, anchor: &AnchorRule, placement: Placement) -> Result<usize> {
    let index = anchor.resolve(buffer)?;
    Ok(match placement {
        Placement::Before => index,
        Placement::After => index + 1,
    })
}

fn insert(
    buffer: &mut InstructionBuffer,
    context: &PatchContext,
    anchor: &AnchorRule,
    placement: Placement,
    fragment: &Fragment,
) -> Result<()> {
    let code = fragment.resolve(context)?;
    let index = insertion_index(buffer, anchor, placement)?;
    splice(buffer, index, code)
}

/// Inserts `code` at `index` unless one of its branches targets a label that
/// the splice moves onto the inserted code itself.
fn splice(buffer: &mut InstructionBuffer, index: usize, code: Vec<Instruction>) -> Result<()> {
    check_moved_labels(buffer, index..index + 1, &code)?;
    buffer.insert_range(index, code)
}

fn check_moved_labels(
    buffer: &InstructionBuffer,
    displaced: std::ops::Range<usize>,
    code: &[Instruction],
) -> Result<()> {
    let moved: Vec<Label> = displaced
        .clone()
        .filter_map(|index| buffer.get(index))
        .flat_map(|instruction| instruction.labels.iter().copied())
        .collect();
    if moved.is_empty() {
        return Ok(());
    }

    match code
        .iter()
        .flat_map(Instruction::branch_targets)
        .find(|target| moved.contains(target))
    {
        Some(label) => Err(patch_error!(
            "spliced code at {} branches to {}, which moves onto the spliced code",
            displaced.start,
            label
        )),
        None => Ok(()),
    }
}

fn raise_event(buffer: &mut InstructionBuffer, context: &PatchContext, site: &EventSite) -> Result<()> {
    // The exit must already exist in the host body
    context.label(&site.exit)?;

    let code = site.fragment().resolve(context)?;
    let effect = net_stack_effect(&code, buffer.returns_value());
    if effect != 0 {
        return Err(patch_error!(
            "event site for {} leaves {} values on the stack, constructor takes {} arguments",
            site.binding.ctor.declaring_type(),
            effect,
            site.binding.ctor.param_count()
        ));
    }

    let index = insertion_index(buffer, &site.anchor, site.placement)?;
    splice(buffer, index, code)
}

fn override_value(
    buffer: &mut InstructionBuffer,
    context: &PatchContext,
    value: &ValueOverride,
) -> Result<()> {
    if value.count == 0 {
        return Err(patch_error!("empty value override at {}", value.anchor));
    }

    let index = value.anchor.resolve(buffer)?;
    let removed = buffer.stack_effect(index..index + value.count)?;
    let code = value.replacement.resolve(context)?;
    let replacement = net_stack_effect(&code, buffer.returns_value());
    if removed != replacement {
        return Err(Error::StackMismatch {
            removed,
            replacement,
        });
    }

    check_moved_labels(buffer, index..index + value.count, &code)?;
    buffer.replace_range(index, value.count, code)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{ExceptionBlock, Instruction, MethodRef, Opcode, Operand},
        instrument::descriptor::EventBinding,
    };

    fn host() -> TypeRef {
        TypeRef::new("", "Host")
    }

    fn args() -> TypeRef {
        TypeRef::new("Events", "PokeEventArgs")
    }

    fn binding() -> EventBinding {
        EventBinding::new(
            args(),
            2,
            MethodRef::new(TypeRef::new("Handlers", "Host"), "OnPoke").with_params(1),
        )
    }

    /// `try { ldarg.1; pop } finally { endfinally }  ret`
    fn protected_body() -> InstructionBuffer {
        InstructionBuffer::from_instructions(vec![
            Instruction::new(Opcode::Ldarg1).with_block(ExceptionBlock::BeginTry),
            Instruction::new(Opcode::Pop),
            Instruction::with_operand(Opcode::LeaveS, Operand::Label(Label::new(0))),
            Instruction::new(Opcode::Endfinally).with_block(ExceptionBlock::BeginFinally),
            Instruction::new(Opcode::Ret)
                .with_label(Label::new(0))
                .with_block(ExceptionBlock::EndBlock),
        ])
        .with_locals([host()])
    }

    fn poke_descriptor() -> PatchDescriptor {
        PatchDescriptor::new(MethodRef::instance(host(), "Poke").with_params(1))
            .declare_local("ev", args())
            .label_exit("exit", AnchorRule::opcode(Opcode::Ret))
            .raise_event(
                EventSite::new(AnchorRule::opcode(Opcode::Ldarg1), binding(), "ev", "exit")
                    .with_arguments(Fragment::new().ldarg(1)),
            )
    }

    #[test]
    fn test_event_inside_try_keeps_region() {
        let patched = Instrumenter::new()
            .apply(protected_body(), &poke_descriptor())
            .unwrap();

        // begin-try moved onto the first inserted instruction
        assert_eq!(patched.get(0).unwrap().blocks, vec![ExceptionBlock::BeginTry]);
        assert!(patched.get(9).unwrap().blocks.is_empty());

        let regions = patched.exception_regions().unwrap();
        assert_eq!(regions[0].try_range, 0..12);
        assert_eq!(patched.locals()[1].ty, args());

        let brfalse = patched.get(8).unwrap();
        assert_eq!(brfalse.opcode, Opcode::BrfalseS);
        assert_eq!(brfalse.branch_targets(), vec![Label::new(0)]);
    }

    #[test]
    fn test_unknown_exit_is_invalid() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .declare_local("ev", args())
            .raise_event(EventSite::new(
                AnchorRule::opcode(Opcode::Ldarg1),
                binding(),
                "ev",
                "exit",
            ));
        let result = Instrumenter::new().apply(protected_body(), &descriptor);
        assert!(matches!(result, Err(Error::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .declare_local("ev", args())
            .label_exit("exit", AnchorRule::opcode(Opcode::Ret))
            .raise_event(EventSite::new(
                AnchorRule::opcode(Opcode::Ldarg1),
                binding(),
                "ev",
                "exit",
            ));
        assert!(Instrumenter::new().apply(protected_body(), &descriptor).is_err());
    }

    #[test]
    fn test_label_exit_rejects_plain_instruction() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .label_exit("exit", AnchorRule::opcode(Opcode::Pop));
        assert!(matches!(
            Instrumenter::new().apply(protected_body(), &descriptor),
            Err(Error::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_capture_label_requires_label() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .capture_label("exit", AnchorRule::opcode(Opcode::Pop));
        assert!(Instrumenter::new().apply(protected_body(), &descriptor).is_err());

        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .capture_label("exit", AnchorRule::opcode(Opcode::Ret));
        assert!(Instrumenter::new().apply(protected_body(), &descriptor).is_ok());
    }

    #[test]
    fn test_override_stack_mismatch() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .declare_local("ev", args())
            .override_value(ValueOverride::new(
                AnchorRule::opcode(Opcode::Ldarg1),
                1,
                Fragment::new().load_local("ev").op(Opcode::Pop),
            ));
        assert!(matches!(
            Instrumenter::new().apply(protected_body(), &descriptor),
            Err(Error::StackMismatch {
                removed: 1,
                replacement: 0
            })
        ));
    }

    #[test]
    fn test_override_moves_run_markers() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .declare_local("ev", args())
            .override_value(ValueOverride::read_back(
                AnchorRule::opcode(Opcode::Ldarg1),
                1,
                "ev",
                MethodRef::getter(args(), "Value"),
            ));
        let patched = Instrumenter::new().apply(protected_body(), &descriptor).unwrap();
        let first = patched.get(0).unwrap();
        assert_eq!(first.opcode, Opcode::Ldloc1);
        assert_eq!(first.blocks, vec![ExceptionBlock::BeginTry]);
        assert_eq!(patched.len(), 6);
    }

    #[test]
    fn test_remove_of_labelled_tail_fails() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .remove(AnchorRule::opcode(Opcode::Ret), 1);
        assert!(matches!(
            Instrumenter::new().apply(protected_body(), &descriptor),
            Err(Error::UnresolvedLabel(_))
        ));
    }

    fn exit_site(placement: Placement) -> PatchDescriptor {
        let site = match placement {
            Placement::Before => EventSite::new(AnchorRule::opcode(Opcode::Ret).last(), binding(), "ev", "exit"),
            Placement::After => {
                EventSite::new(AnchorRule::opcode(Opcode::Nop), binding(), "ev", "exit").after()
            }
        };
        PatchDescriptor::new(MethodRef::instance(host(), "Poke").with_params(1))
            .declare_local("ev", args())
            .label_exit("exit", AnchorRule::opcode(Opcode::Ret).last())
            .raise_event(site.with_arguments(Fragment::new().ldarg(1)))
    }

    #[test]
    fn test_event_site_on_its_own_exit_is_rejected() {
        let body = || {
            InstructionBuffer::from_instructions(vec![
                Instruction::new(Opcode::Nop),
                Instruction::new(Opcode::Ret),
            ])
        };

        for placement in [Placement::Before, Placement::After] {
            let result = Instrumenter::new().apply(body(), &exit_site(placement));
            assert!(
                matches!(result, Err(Error::InvalidDescriptor { .. })),
                "{placement:?} splice looping onto itself was accepted"
            );
        }
    }

    #[test]
    fn test_insert_branching_to_displaced_label_is_rejected() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .capture_label("exit", AnchorRule::opcode(Opcode::Ret))
            .insert(
                AnchorRule::opcode(Opcode::Ret),
                Placement::Before,
                Fragment::new().branch(Opcode::LeaveS, "exit"),
            );
        assert!(matches!(
            Instrumenter::new().apply(protected_body(), &descriptor),
            Err(Error::InvalidDescriptor { .. })
        ));

        // The same branch inserted ahead of another instruction is fine
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .capture_label("exit", AnchorRule::opcode(Opcode::Ret))
            .insert(
                AnchorRule::opcode(Opcode::Pop),
                Placement::After,
                Fragment::new().branch(Opcode::LeaveS, "exit"),
            );
        assert!(Instrumenter::new().apply(protected_body(), &descriptor).is_ok());
    }

    #[test]
    fn test_duplicate_local() {
        let descriptor = PatchDescriptor::new(MethodRef::instance(host(), "Poke"))
            .declare_local("ev", args())
            .declare_local("ev", args());
        assert!(Instrumenter::new().apply(protected_body(), &descriptor).is_err());
    }
}
