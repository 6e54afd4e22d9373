//! Descriptors for host methods the framework instruments.
//!
//! Each constructor returns the complete, ordered recipe for one host method.
//! Step order matters and is noted per method: several steps re-use an anchor
//! rule that addresses a different instruction once an earlier step ran.
//!
//! The host member references used by the recipes are exposed as well, so
//! callers can build or inspect host bodies against the same identities.

use crate::{
    assembly::{FieldRef, MethodRef, Opcode, TypeRef},
    instrument::{
        anchor::AnchorRule,
        descriptor::{EventBinding, EventSite, PatchDescriptor, ValueOverride},
        fragment::Fragment,
        pass::PatchSet,
    },
};

const EVENT_ARGS_NAMESPACE: &str = "Exiled.Events.EventArgs";
const HANDLERS_NAMESPACE: &str = "Exiled.Events.Handlers";

/// `Exiled.API.Features.Player`
#[must_use]
pub fn player() -> TypeRef {
    TypeRef::new("Exiled.API.Features", "Player")
}

/// `Player.Get(x)`, the facade lookup used to wrap host objects.
#[must_use]
pub fn player_get() -> MethodRef {
    MethodRef::new(player(), "Get").with_params(1).returning()
}

/// `ReferenceHub`
#[must_use]
pub fn reference_hub() -> TypeRef {
    TypeRef::new("", "ReferenceHub")
}

/// `FlashlightNetworkHandler`
#[must_use]
pub fn flashlight_handler() -> TypeRef {
    TypeRef::new("InventorySystem.Items.Flashlight", "FlashlightNetworkHandler")
}

/// `FlashlightNetworkHandler.FlashlightMessage`
#[must_use]
pub fn flashlight_message() -> TypeRef {
    TypeRef::new("InventorySystem.Items.Flashlight", "FlashlightMessage")
}

/// `FlashlightMessage.NewState`
#[must_use]
pub fn flashlight_new_state() -> FieldRef {
    FieldRef::new(flashlight_message(), "NewState")
}

/// `FlashlightNetworkHandler.ServerProcessMessage(conn, msg)`
#[must_use]
pub fn flashlight_process_message() -> MethodRef {
    MethodRef::new(flashlight_handler(), "ServerProcessMessage").with_params(2)
}

/// `TogglingFlashlightEventArgs`
#[must_use]
pub fn toggling_flashlight_args() -> TypeRef {
    TypeRef::new(EVENT_ARGS_NAMESPACE, "TogglingFlashlightEventArgs")
}

/// `PlayableScps.Scp096`
#[must_use]
pub fn scp096() -> TypeRef {
    TypeRef::new("PlayableScps", "Scp096")
}

/// `Scp096.AddTarget(target)`
#[must_use]
pub fn scp096_add_target() -> MethodRef {
    MethodRef::instance(scp096(), "AddTarget").with_params(1)
}

/// `Scp096.AddReset()`
#[must_use]
pub fn scp096_add_reset() -> MethodRef {
    MethodRef::instance(scp096(), "AddReset")
}

/// `Scp096.Hub`
#[must_use]
pub fn scp096_hub() -> FieldRef {
    FieldRef::new(scp096(), "Hub")
}

/// `AddingTargetEventArgs`
#[must_use]
pub fn adding_target_args() -> TypeRef {
    TypeRef::new(EVENT_ARGS_NAMESPACE, "AddingTargetEventArgs")
}

/// Instruments `FlashlightNetworkHandler.ServerProcessMessage`.
///
/// Raises `TogglingFlashlight` before the first `ldloc.1` (the resolved
/// flashlight item) and returns early when it is denied. Both reads of the
/// message's `NewState` are then replaced by the event's `NewState`. The two
/// overrides share one rule: the first addresses the read feeding the
/// broadcast message, the second (after that one is gone) the read feeding
/// the item itself.
#[must_use]
pub fn toggling_flashlight() -> PatchDescriptor {
    let args = toggling_flashlight_args();
    let binding = EventBinding::new(
        args.clone(),
        4,
        MethodRef::new(TypeRef::new(HANDLERS_NAMESPACE, "Player"), "OnTogglingFlashlight")
            .with_params(1),
    );
    let new_state = MethodRef::getter(args.clone(), "NewState");
    let message_read = AnchorRule::loads_field(flashlight_new_state()).last().offset(-1);

    PatchDescriptor::new(flashlight_process_message())
        .declare_local("ev", args)
        .label_exit("ret", AnchorRule::opcode(Opcode::Ret).last())
        .raise_event(
            EventSite::new(AnchorRule::opcode(Opcode::Ldloc1), binding, "ev", "ret")
                .with_arguments(
                    Fragment::new()
                        .ldloc(0)
                        .call(player_get())
                        .ldloc(1)
                        .ldarg(1)
                        .ldfld(flashlight_new_state()),
                ),
        )
        .override_value(ValueOverride::read_back(
            message_read.clone(),
            2,
            "ev",
            new_state.clone(),
        ))
        .override_value(ValueOverride::read_back(message_read, 2, "ev", new_state))
}

/// Instruments `Scp096.AddTarget`.
///
/// Raises `AddingTarget` right after the early-out `ret`, returning through
/// that same `ret` when denied. The trailing `this.AddReset()` is replaced by
/// adding the event's `EnrageTimeToAdd` to the rage, skipping to the
/// instruction after the call once `max_added_enrage_time` would be exceeded.
/// The exit label is captured before the override runs, since the override
/// removes the anchor it is found from.
#[must_use]
pub fn adding_target(max_added_enrage_time: f32) -> PatchDescriptor {
    let args = adding_target_args();
    let binding = EventBinding::new(
        args.clone(),
        4,
        MethodRef::new(TypeRef::new(HANDLERS_NAMESPACE, "Scp096"), "OnAddingTarget")
            .with_params(1),
    );
    let time_to_add = MethodRef::getter(args.clone(), "EnrageTimeToAdd");
    let add_reset = AnchorRule::calls(scp096_add_reset()).last();

    let accumulate = |property: &str| {
        Fragment::new()
            .ldarg(0)
            .dup()
            .call(MethodRef::getter(scp096(), property))
            .load_local("ev")
            .callvirt(time_to_add.clone())
            .op(Opcode::Add)
            .call(MethodRef::setter(scp096(), property))
    };

    let capped = Fragment::new()
        .ldarg(0)
        .call(MethodRef::getter(scp096(), "AddedTimeThisRage"))
        .load_local("ev")
        .callvirt(time_to_add.clone())
        .op(Opcode::Add)
        .dup()
        .store_local("time_to_add")
        .ldc_r4(max_added_enrage_time)
        .branch(Opcode::BgtUnS, "exit")
        .append(accumulate("EnrageTimeLeft"))
        .append(accumulate("AddedTimeThisRage"));

    PatchDescriptor::new(scp096_add_target())
        .declare_local("ev", args)
        .capture_label("return", AnchorRule::opcode(Opcode::Ret))
        .raise_event(
            EventSite::new(AnchorRule::opcode(Opcode::Ret), binding, "ev", "return")
                .after()
                .with_arguments(
                    Fragment::new()
                        .ldarg(0)
                        .ldfld(scp096_hub())
                        .call(player_get())
                        .ldarg(1)
                        .call(player_get())
                        .ldarg(0)
                        .call(MethodRef::getter(scp096(), "EnrageTimePerReset")),
                ),
        )
        .declare_local("time_to_add", TypeRef::new("System", "Single"))
        .capture_label("exit", add_reset.clone().offset(1))
        .override_value(ValueOverride::new(add_reset.offset(-1), 2, capped))
}

/// Every descriptor shipped with the framework.
#[must_use]
pub fn builtin(max_added_enrage_time: f32) -> PatchSet {
    PatchSet::new()
        .with(toggling_flashlight())
        .with(adding_target(max_added_enrage_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::descriptor::PatchStep;

    #[test]
    fn test_flashlight_recipe_order() {
        let descriptor = toggling_flashlight();
        let kinds: Vec<&str> = descriptor.steps().iter().map(PatchStep::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "declare-local",
                "label-exit",
                "raise-event",
                "override-value",
                "override-value"
            ]
        );
        assert_eq!(descriptor.target(), &flashlight_process_message());
    }

    #[test]
    fn test_add_target_override_is_stack_neutral() {
        let descriptor = adding_target(15.0);
        let Some(PatchStep::OverrideValue(value)) = descriptor.steps().last() else {
            panic!("last step must be the enrage override");
        };

        let mut context = crate::instrument::engine::PatchContext::default();
        context.bind_local("ev", 1);
        context.bind_local("time_to_add", 2);
        context.bind_label("exit", crate::assembly::Label::new(0));
        let code = value.replacement.resolve(&context).unwrap();
        assert_eq!(crate::assembly::net_stack_effect(&code, false), 0);
    }

    #[test]
    fn test_builtin_set() {
        assert_eq!(builtin(15.0).len(), 2);
    }
}
