use std::sync::Arc;

use log::trace;

use crate::{
    resolution::{
        Catalog, Definition, MemberDefinition, MemberKind, ReferenceDescriptor, ReferenceResolver,
        TypeDefinition, CORE_LIBRARY,
    },
    Error, Result,
};

/// Core library types known without loading anything, as `(namespace, name)`
const CORE_TYPES: &[(&str, &str)] = &[
    ("System", "Object"),
    ("System", "ValueType"),
    ("System", "Enum"),
    ("System", "Void"),
    ("System", "Boolean"),
    ("System", "Char"),
    ("System", "SByte"),
    ("System", "Byte"),
    ("System", "Int16"),
    ("System", "UInt16"),
    ("System", "Int32"),
    ("System", "UInt32"),
    ("System", "Int64"),
    ("System", "UInt64"),
    ("System", "Single"),
    ("System", "Double"),
    ("System", "IntPtr"),
    ("System", "UIntPtr"),
    ("System", "String"),
    ("System", "Array"),
    ("System", "Type"),
    ("System", "TypedReference"),
    ("System", "RuntimeTypeHandle"),
    ("System", "RuntimeMethodHandle"),
    ("System", "RuntimeFieldHandle"),
    ("System", "Delegate"),
    ("System", "MulticastDelegate"),
    ("System", "Exception"),
    ("System", "InvalidOperationException"),
    ("System", "ArgumentException"),
    ("System", "ArgumentNullException"),
    ("System", "NotSupportedException"),
    ("System", "NotImplementedException"),
    ("System", "Attribute"),
    ("System", "Console"),
    ("System", "Math"),
    ("System", "DateTime"),
    ("System", "TimeSpan"),
    ("System", "Environment"),
    ("System", "IDisposable"),
    ("System", "Nullable`1"),
    ("System.Collections", "IEnumerable"),
    ("System.Collections", "IEnumerator"),
    ("System.Collections.Generic", "List`1"),
    ("System.Collections.Generic", "IEnumerable`1"),
    ("System.Collections.Generic", "IEnumerator`1"),
    ("System.Collections.Generic", "Dictionary`2"),
    ("System.Diagnostics", "DebuggableAttribute"),
    ("System.Diagnostics", "DebuggableAttribute/DebuggingModes"),
    ("System.Diagnostics", "Debugger"),
    ("System.Reflection", "AssemblyTitleAttribute"),
    ("System.Reflection", "AssemblyVersionAttribute"),
    ("System.Reflection", "AssemblyCompanyAttribute"),
    ("System.Reflection", "AssemblyConfigurationAttribute"),
    ("System.Reflection", "AssemblyFileVersionAttribute"),
    ("System.Reflection", "AssemblyInformationalVersionAttribute"),
    ("System.Reflection", "AssemblyProductAttribute"),
    ("System.Runtime.CompilerServices", "CompilationRelaxationsAttribute"),
    ("System.Runtime.CompilerServices", "RuntimeCompatibilityAttribute"),
    ("System.Runtime.CompilerServices", "CompilerGeneratedAttribute"),
    ("System.Runtime.CompilerServices", "NullableAttribute"),
    ("System.Runtime.CompilerServices", "NullableContextAttribute"),
    ("System.Runtime.CompilerServices", "RuntimeHelpers"),
    ("System.Runtime.Versioning", "TargetFrameworkAttribute"),
    ("System.Text", "StringBuilder"),
];

/// Core library members, as `(type full name, member name, kind, normalized signature)`
const CORE_MEMBERS: &[(&str, &str, MemberKind, &str)] = &[
    ("System.Object", ".ctor", MemberKind::Method, "instance void()"),
    ("System.Object", "ToString", MemberKind::Method, "instance string()"),
    ("System.Object", "Equals", MemberKind::Method, "instance bool(object)"),
    ("System.Object", "GetHashCode", MemberKind::Method, "instance int32()"),
    ("System.Object", "GetType", MemberKind::Method, "instance System.Type()"),
    ("System.Attribute", ".ctor", MemberKind::Method, "instance void()"),
    ("System.Exception", ".ctor", MemberKind::Method, "instance void()"),
    ("System.Exception", ".ctor", MemberKind::Method, "instance void(string)"),
    ("System.Exception", "get_Message", MemberKind::Method, "instance string()"),
    ("System.InvalidOperationException", ".ctor", MemberKind::Method, "instance void(string)"),
    ("System.ArgumentException", ".ctor", MemberKind::Method, "instance void(string)"),
    ("System.ArgumentNullException", ".ctor", MemberKind::Method, "instance void(string)"),
    ("System.NotSupportedException", ".ctor", MemberKind::Method, "instance void()"),
    ("System.NotImplementedException", ".ctor", MemberKind::Method, "instance void()"),
    ("System.Console", "WriteLine", MemberKind::Method, "void()"),
    ("System.Console", "WriteLine", MemberKind::Method, "void(string)"),
    ("System.Console", "WriteLine", MemberKind::Method, "void(object)"),
    ("System.Console", "WriteLine", MemberKind::Method, "void(int32)"),
    ("System.Console", "WriteLine", MemberKind::Method, "void(bool)"),
    ("System.Console", "WriteLine", MemberKind::Method, "void(string,object)"),
    ("System.Console", "WriteLine", MemberKind::Method, "void(string,object,object)"),
    ("System.Console", "Write", MemberKind::Method, "void(string)"),
    ("System.Console", "Write", MemberKind::Method, "void(object)"),
    ("System.Console", "ReadLine", MemberKind::Method, "string()"),
    ("System.String", "Concat", MemberKind::Method, "string(string,string)"),
    ("System.String", "Concat", MemberKind::Method, "string(string,string,string)"),
    ("System.String", "Concat", MemberKind::Method, "string(object,object)"),
    ("System.String", "Format", MemberKind::Method, "string(string,object)"),
    ("System.String", "Format", MemberKind::Method, "string(string,object,object)"),
    ("System.String", "get_Length", MemberKind::Method, "instance int32()"),
    ("System.String", "op_Equality", MemberKind::Method, "bool(string,string)"),
    ("System.String", "IsNullOrEmpty", MemberKind::Method, "bool(string)"),
    ("System.String", "Empty", MemberKind::Field, "string"),
    ("System.Int32", "ToString", MemberKind::Method, "instance string()"),
    ("System.Int32", "Parse", MemberKind::Method, "int32(string)"),
    ("System.Int32", "MaxValue", MemberKind::Field, "int32"),
    ("System.Int32", "MinValue", MemberKind::Field, "int32"),
    ("System.Math", "Max", MemberKind::Method, "int32(int32,int32)"),
    ("System.Math", "Min", MemberKind::Method, "int32(int32,int32)"),
    ("System.Math", "Abs", MemberKind::Method, "int32(int32)"),
    ("System.DateTime", "get_Now", MemberKind::Method, "System.DateTime()"),
    ("System.DateTime", "get_TimeOfDay", MemberKind::Method, "instance System.TimeSpan()"),
    ("System.TimeSpan", "get_TotalSeconds", MemberKind::Method, "instance float64()"),
    ("System.Environment", "get_TickCount", MemberKind::Method, "int32()"),
    ("System.Environment", "get_NewLine", MemberKind::Method, "string()"),
    ("System.Diagnostics.Debugger", "Break", MemberKind::Method, "void()"),
    ("System.Diagnostics.Debugger", "get_IsAttached", MemberKind::Method, "bool()"),
    (
        "System.Diagnostics.DebuggableAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void(System.Diagnostics.DebuggableAttribute/DebuggingModes)",
    ),
    (
        "System.Runtime.CompilerServices.CompilationRelaxationsAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void(int32)",
    ),
    (
        "System.Runtime.CompilerServices.RuntimeCompatibilityAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void()",
    ),
    (
        "System.Runtime.CompilerServices.RuntimeCompatibilityAttribute",
        "set_WrapNonExceptionThrows",
        MemberKind::Method,
        "instance void(bool)",
    ),
    (
        "System.Runtime.CompilerServices.CompilerGeneratedAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void()",
    ),
    (
        "System.Runtime.CompilerServices.NullableAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void(uint8)",
    ),
    (
        "System.Runtime.CompilerServices.NullableContextAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void(uint8)",
    ),
    (
        "System.Runtime.Versioning.TargetFrameworkAttribute",
        ".ctor",
        MemberKind::Method,
        "instance void(string)",
    ),
    (
        "System.Runtime.Versioning.TargetFrameworkAttribute",
        "set_FrameworkDisplayName",
        MemberKind::Method,
        "instance void(string)",
    ),
    ("System.Text.StringBuilder", ".ctor", MemberKind::Method, "instance void()"),
    (
        "System.Text.StringBuilder",
        "Append",
        MemberKind::Method,
        "instance System.Text.StringBuilder(string)",
    ),
    ("System.Text.StringBuilder", "ToString", MemberKind::Method, "instance string()"),
];

fn split_full_name(full_name: &str) -> (&str, &str) {
    // The namespace ends at the last dot before any nesting separator
    let outer = full_name.split('/').next().unwrap_or(full_name);
    match outer.rfind('.') {
        Some(dot) => (&full_name[..dot], &full_name[dot + 1..]),
        None => ("", full_name),
    }
}

/// Resolves against the definitions available to the running toolchain itself.
///
/// A fresh resolver knows a subset of the core library: the primitive types, the common
/// base classes, exceptions and attributes emitted by compilers, and the members programs
/// call on them most. Every core library alias (`mscorlib`, `System.Runtime`,
/// `netstandard`, `System.Private.CoreLib`) resolves against the same definitions.
///
/// Hosts extend the resolver with [`RuntimeResolver::register_type`] and
/// [`RuntimeResolver::register_member`]; registrations are visible to later resolutions,
/// including those running concurrently.
pub struct RuntimeResolver {
    catalog: Catalog,
}

impl Default for RuntimeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeResolver {
    /// A resolver preloaded with the built-in core library definitions
    #[must_use]
    pub fn new() -> Self {
        let resolver = RuntimeResolver::empty();
        for (namespace, name) in CORE_TYPES {
            resolver.register_type(CORE_LIBRARY, namespace, name);
        }
        for (type_name, member, kind, signature) in CORE_MEMBERS {
            let (namespace, name) = split_full_name(type_name);
            resolver.register_member(CORE_LIBRARY, namespace, name, member, *kind, signature);
        }

        trace!(
            "runtime resolver knows {} type(s) and {} member(s)",
            resolver.catalog.type_count(),
            resolver.catalog.member_count()
        );
        resolver
    }

    /// A resolver without any definitions
    #[must_use]
    pub fn empty() -> Self {
        RuntimeResolver {
            catalog: Catalog::new(),
        }
    }

    /// Make the type `namespace.name` of `assembly` resolvable
    pub fn register_type(&self, assembly: &str, namespace: &str, name: &str) {
        self.catalog.insert_type(TypeDefinition {
            assembly: assembly.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    /// Make a member of `namespace.name` in `assembly` resolvable.
    ///
    /// `signature` uses the normalized form of
    /// [`crate::metadata::signatures::render_method`], e.g. `instance void(string)`.
    pub fn register_member(
        &self,
        assembly: &str,
        namespace: &str,
        name: &str,
        member: &str,
        kind: MemberKind,
        signature: &str,
    ) {
        self.catalog.insert_member(MemberDefinition {
            declaring: TypeDefinition {
                assembly: assembly.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            name: member.to_string(),
            kind,
            signature: signature.to_string(),
        });
    }

    /// The definitions known to this resolver
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl ReferenceResolver for RuntimeResolver {
    fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>> {
        self.catalog
            .lookup(reference)
            .ok_or_else(|| Error::ReferenceNotFound(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{MemberReference, TypeReference};

    fn write_line(assembly: &str, signature: &str) -> ReferenceDescriptor {
        ReferenceDescriptor::Member(MemberReference {
            declaring: TypeReference::new(assembly, "System", "Console"),
            name: "WriteLine".to_string(),
            kind: MemberKind::Method,
            signature: signature.to_string(),
        })
    }

    #[test]
    fn builtins() {
        let resolver = RuntimeResolver::new();
        for assembly in ["mscorlib", "System.Runtime", "netstandard", "System.Console"] {
            let result = resolver.resolve(&write_line(assembly, "void(string)"));
            // System.Console is its own assembly and not a core alias
            assert_eq!(result.is_ok(), assembly != "System.Console", "{assembly}");
        }

        let definition = resolver
            .resolve(&write_line("System.Runtime", "void(int32)"))
            .unwrap();
        let member = definition.as_member().unwrap();
        assert_eq!(member.declaring.assembly, CORE_LIBRARY);

        assert!(matches!(
            resolver.resolve(&write_line("System.Runtime", "void(float64,float64)")),
            Err(Error::ReferenceNotFound(name)) if name == "[System.Runtime]System.Console::WriteLine"
        ));

        let nested = ReferenceDescriptor::Type(TypeReference::new(
            "mscorlib",
            "System.Diagnostics",
            "DebuggableAttribute/DebuggingModes",
        ));
        assert!(resolver.resolve(&nested).is_ok());
    }

    #[test]
    fn registration() {
        let resolver = RuntimeResolver::empty();
        let widget = ReferenceDescriptor::Type(TypeReference::new("Game.Core", "Game", "Widget"));
        assert!(resolver.resolve(&widget).is_err());

        resolver.register_type("Game.Core", "Game", "Widget");
        assert!(resolver.resolve(&widget).is_ok());
    }

    #[test]
    fn split() {
        assert_eq!(split_full_name("System.Object"), ("System", "Object"));
        assert_eq!(
            split_full_name("System.Diagnostics.DebuggableAttribute/DebuggingModes"),
            ("System.Diagnostics", "DebuggableAttribute/DebuggingModes")
        );
        assert_eq!(split_full_name("Global"), ("", "Global"));
    }
}
