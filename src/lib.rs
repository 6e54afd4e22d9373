// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # hostpatch
//!
//! Extends a closed game-server host with a plugin event model, without
//! access to its source. `hostpatch` rewrites selected host method bodies at
//! the instruction level so they raise typed, cancellable events, dispatches
//! those events through a fault-isolating bus, and drives the end-of-round
//! lifecycle on a cooperative tick scheduler.
//!
//! ## Features
//!
//! - **Instruction-level patching** - Anchor rules, symbolic fragments and
//!   splices that keep branch labels and exception regions intact
//! - **Typed event bus** - Ordered per-type subscribers, cancellation flags
//!   and handler fault isolation
//! - **Round lifecycle** - Snapshotting, end detection, veto-able ending and
//!   a clamped restart countdown
//!
//! ## Quick Start
//!
//! ```rust
//! use hostpatch::prelude::*;
//!
//! let bus = EventBus::new();
//! bus.subscribe_named("no-flashlights", |ev: &mut TogglingFlashlight| {
//!     if ev.new_state() {
//!         ev.deny();
//!     }
//! });
//!
//! let mut ev = TogglingFlashlight::new(PlayerId(3), ItemSerial(17), true);
//! assert!(!bus.publish(&mut ev));
//! ```
//!
//! Patching a host method body:
//!
//! ```rust
//! use hostpatch::prelude::*;
//!
//! let ret = Label::new(0);
//! let body = InstructionBuffer::from_instructions(vec![
//!     Instruction::new(Opcode::Ldarg1),
//!     Instruction::with_operand(Opcode::Brfalse, Operand::Label(ret)),
//!     Instruction::new(Opcode::Nop),
//!     Instruction::new(Opcode::Ret).with_label(ret),
//! ]);
//!
//! let target = MethodRef::instance(TypeRef::new("Game", "Door"), "Open");
//! let descriptor = PatchDescriptor::new(target)
//!     .insert(
//!         AnchorRule::opcode(Opcode::Nop),
//!         Placement::Before,
//!         Fragment::new().ldarg(0).instruction(Instruction::new(Opcode::Pop)),
//!     );
//!
//! let patched = Instrumenter::new().apply(body, &descriptor)?;
//! assert_eq!(patched.len(), 6);
//! assert_eq!(patched.get(2).map(|i| i.opcode), Some(Opcode::Ldarg0));
//! # Ok::<(), hostpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Instructions, member references and the editable buffer
//! - [`instrument`] - Anchors, fragments, descriptors and the patch engine
//! - [`events`] - Event traits, payloads and the [`events::EventBus`]
//! - [`round`] - Round snapshot, lifecycle state machine and scheduler
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade. Instrumentation steps and
//! state transitions are logged at `debug`, round results and pass summaries
//! at `info`, skipped restarts at `warn`, failed methods and faulting
//! handlers at `error`. Install any logger, e.g. `env_logger`, to see them.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use hostpatch::prelude::*;
///
/// let rule = AnchorRule::opcode(Opcode::Ret).last();
/// assert_eq!(rule.direction(), Direction::Last);
/// ```
pub mod prelude;

pub mod assembly;
pub mod events;
pub mod instrument;
pub mod round;

/// `hostpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `hostpatch` Error type
///
/// Every fallible operation in this crate returns it. Instrumentation errors
/// are reported when the host loads; handler errors never leave the bus.
pub use error::Error;
