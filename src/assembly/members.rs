//! Symbolic references to host types, methods and fields.
//!
//! Operands refer to host members by structural identity rather than by
//! metadata token, so anchor rules written against one build of the host keep
//! matching as long as the member itself still exists. Two references are the
//! same member exactly when all their fields compare equal.

use std::{fmt, sync::Arc};

/// Reference to a host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    namespace: Arc<str>,
    name: Arc<str>,
}

impl TypeRef {
    /// Creates a type reference from its namespace and name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hostpatch::assembly::TypeRef;
    ///
    /// let ty = TypeRef::new("PlayableScps", "Scp096");
    /// assert_eq!(ty.to_string(), "PlayableScps.Scp096");
    /// ```
    #[must_use]
    pub fn new(namespace: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace of the type, empty for the global namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Simple name of the type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Reference to a host method, carrying the signature shape needed to
/// compute the stack effect of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    declaring_type: TypeRef,
    name: Arc<str>,
    param_count: u8,
    has_this: bool,
    returns_value: bool,
}

impl MethodRef {
    /// Creates a reference to a static method returning `void`.
    #[must_use]
    pub fn new(declaring_type: TypeRef, name: impl Into<Arc<str>>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            param_count: 0,
            has_this: false,
            returns_value: false,
        }
    }

    /// Creates a reference to an instance method returning `void`.
    #[must_use]
    pub fn instance(declaring_type: TypeRef, name: impl Into<Arc<str>>) -> Self {
        Self::new(declaring_type, name).with_this(true)
    }

    /// Creates a reference to a constructor (`.ctor`) taking `params` arguments.
    #[must_use]
    pub fn constructor(declaring_type: TypeRef, params: u8) -> Self {
        Self::instance(declaring_type, ".ctor").with_params(params)
    }

    /// Creates a reference to an instance property getter `get_{property}`.
    #[must_use]
    pub fn getter(declaring_type: TypeRef, property: &str) -> Self {
        Self::instance(declaring_type, format!("get_{property}")).returning()
    }

    /// Creates a reference to an instance property setter `set_{property}`.
    #[must_use]
    pub fn setter(declaring_type: TypeRef, property: &str) -> Self {
        Self::instance(declaring_type, format!("set_{property}")).with_params(1)
    }

    /// Sets the number of declared parameters, excluding `this`.
    #[must_use]
    pub fn with_params(mut self, count: u8) -> Self {
        self.param_count = count;
        self
    }

    /// Sets whether the method takes an implicit `this`.
    #[must_use]
    pub fn with_this(mut self, has_this: bool) -> Self {
        self.has_this = has_this;
        self
    }

    /// Marks the method as returning a value.
    #[must_use]
    pub fn returning(mut self) -> Self {
        self.returns_value = true;
        self
    }

    /// Type declaring the method.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared parameters, excluding `this`.
    #[must_use]
    pub fn param_count(&self) -> u8 {
        self.param_count
    }

    /// Whether the method takes an implicit `this`.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.has_this
    }

    /// Whether the method pushes a return value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    /// Returns `true` if this reference names a constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        &*self.name == ".ctor"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}({})", self.declaring_type, self.name, self.param_count)
    }
}

/// Reference to a host field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    declaring_type: TypeRef,
    name: Arc<str>,
    is_static: bool,
}

impl FieldRef {
    /// Creates a reference to an instance field.
    #[must_use]
    pub fn new(declaring_type: TypeRef, name: impl Into<Arc<str>>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            is_static: false,
        }
    }

    /// Creates a reference to a static field.
    #[must_use]
    pub fn new_static(declaring_type: TypeRef, name: impl Into<Arc<str>>) -> Self {
        Self {
            is_static: true,
            ..Self::new(declaring_type, name)
        }
    }

    /// Type declaring the field.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_shapes() {
        let ty = TypeRef::new("Exiled.Events", "AddingTargetEventArgs");

        let ctor = MethodRef::constructor(ty.clone(), 4);
        assert!(ctor.is_constructor());
        assert!(ctor.has_this());
        assert_eq!(ctor.param_count(), 4);
        assert!(!ctor.returns_value());

        let getter = MethodRef::getter(ty.clone(), "IsAllowed");
        assert_eq!(getter.name(), "get_IsAllowed");
        assert!(getter.returns_value());
        assert_eq!(getter.param_count(), 0);

        let setter = MethodRef::setter(ty, "IsAllowed");
        assert_eq!(setter.param_count(), 1);
        assert!(!setter.returns_value());
    }

    #[test]
    fn test_structural_identity() {
        let a = MethodRef::instance(TypeRef::new("", "Scp096"), "AddReset");
        let b = MethodRef::instance(TypeRef::new("", "Scp096"), "AddReset");
        let c = MethodRef::new(TypeRef::new("", "Scp096"), "AddReset");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let ty = TypeRef::new("", "RoundSummary");
        assert_eq!(ty.to_string(), "RoundSummary");
        let field = FieldRef::new_static(ty.clone(), "RoundLock");
        assert_eq!(field.to_string(), "RoundSummary::RoundLock");
        assert!(field.is_static());
        let method = MethodRef::new(ty, "Start");
        assert_eq!(method.to_string(), "RoundSummary::Start(0)");
    }
}
