//! The load-time instrumentation pass.
//!
//! A [`PatchSet`] collects every [`PatchDescriptor`] the framework ships and
//! applies them once, at startup, to the bodies served by a [`MethodSource`].
//! A failing descriptor leaves its method untouched and never stops the pass:
//! the failure is logged with the method identity and returned in the
//! [`PatchReport`], so a host version mismatch shows up as a startup
//! diagnostic naming exactly the methods that no longer match.

use std::collections::HashMap;

use crate::{
    assembly::{InstructionBuffer, MethodRef},
    instrument::{descriptor::PatchDescriptor, engine::Instrumenter},
    Error,
};

/// Access to the host's decoded method bodies.
pub trait MethodSource {
    /// Returns a copy of the current body of `method`, or `None` if the host
    /// does not define it.
    fn method_body(&self, method: &MethodRef) -> Option<InstructionBuffer>;

    /// Replaces the body of `method`.
    fn store_method_body(&mut self, method: &MethodRef, body: InstructionBuffer);
}

impl MethodSource for HashMap<MethodRef, InstructionBuffer> {
    fn method_body(&self, method: &MethodRef) -> Option<InstructionBuffer> {
        self.get(method).cloned()
    }

    fn store_method_body(&mut self, method: &MethodRef, body: InstructionBuffer) {
        self.insert(method.clone(), body);
    }
}

/// A descriptor that could not be applied.
#[derive(Debug)]
pub struct PatchFailure {
    /// The method left un-instrumented
    pub method: MethodRef,
    /// Why
    pub error: Error,
}

/// Outcome of [`PatchSet::apply_all`].
#[derive(Debug, Default)]
pub struct PatchReport {
    /// Methods whose descriptor applied, in application order
    pub patched: Vec<MethodRef>,
    /// Descriptors that failed
    pub failed: Vec<PatchFailure>,
}

impl PatchReport {
    /// Returns `true` if every descriptor applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered collection of descriptors applied in one pass.
#[derive(Debug, Default)]
pub struct PatchSet {
    descriptors: Vec<PatchDescriptor>,
    instrumenter: Instrumenter,
}

impl PatchSet {
    /// Creates an empty patch set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor. Descriptors for the same method apply in
    /// registration order, each against the result of the previous one.
    pub fn register(&mut self, descriptor: PatchDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Builder form of [`PatchSet::register`].
    #[must_use]
    pub fn with(mut self, descriptor: PatchDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Applies every descriptor to the bodies in `source`.
    ///
    /// Each descriptor works on a copy of the body; the copy is stored back
    /// only if the whole descriptor applied and validated.
    pub fn apply_all(&self, source: &mut impl MethodSource) -> PatchReport {
        let mut report = PatchReport::default();

        for descriptor in &self.descriptors {
            let method = descriptor.target();
            let result = source
                .method_body(method)
                .ok_or_else(|| Error::MethodNotFound(method.clone()))
                .and_then(|body| self.instrumenter.apply(body, descriptor));

            match result {
                Ok(body) => {
                    log::debug!("patched {method}");
                    source.store_method_body(method, body);
                    report.patched.push(method.clone());
                }
                Err(error) => {
                    log::error!("failed to patch {method}: {error}");
                    report.failed.push(PatchFailure {
                        method: method.clone(),
                        error,
                    });
                }
            }
        }

        log::info!(
            "instrumentation pass finished: {} patched, {} failed",
            report.patched.len(),
            report.failed.len()
        );
        report
    }
}
