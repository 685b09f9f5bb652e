//! Normalized text form of signatures.
//!
//! Reference resolution compares members by name and signature across modules, where the
//! same type is addressed by different tokens. Rendering replaces every token by the full
//! name of the type it denotes, producing strings such as `instance void(int32,string&)`.

use crate::{
    metadata::{
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
    },
    Result,
};

/// Render a type, asking `names` for the full name behind each token.
///
/// # Errors
/// Propagates the errors of `names`.
pub fn render_type(
    signature: &TypeSignature,
    names: &dyn Fn(Token) -> Result<String>,
) -> Result<String> {
    let rendered = match signature {
        TypeSignature::Void => "void".to_string(),
        TypeSignature::Boolean => "bool".to_string(),
        TypeSignature::Char => "char".to_string(),
        TypeSignature::I1 => "int8".to_string(),
        TypeSignature::U1 => "uint8".to_string(),
        TypeSignature::I2 => "int16".to_string(),
        TypeSignature::U2 => "uint16".to_string(),
        TypeSignature::I4 => "int32".to_string(),
        TypeSignature::U4 => "uint32".to_string(),
        TypeSignature::I8 => "int64".to_string(),
        TypeSignature::U8 => "uint64".to_string(),
        TypeSignature::R4 => "float32".to_string(),
        TypeSignature::R8 => "float64".to_string(),
        TypeSignature::String => "string".to_string(),
        TypeSignature::Object => "object".to_string(),
        TypeSignature::TypedByRef => "typedref".to_string(),
        TypeSignature::I => "native int".to_string(),
        TypeSignature::U => "native uint".to_string(),
        TypeSignature::Ptr(base) => format!("{}*", render_type(base, names)?),
        TypeSignature::ByRef(base) => format!("{}&", render_type(base, names)?),
        TypeSignature::Pinned(base) => format!("{} pinned", render_type(base, names)?),
        TypeSignature::SzArray(base) => format!("{}[]", render_type(base, names)?),
        TypeSignature::Array(base, shape) => {
            let commas = ",".repeat(shape.rank.saturating_sub(1) as usize);
            format!("{}[{}]", render_type(base, names)?, commas)
        }
        TypeSignature::Class(token) | TypeSignature::ValueType(token) => names(*token)?,
        TypeSignature::GenericInst(base, args) => {
            let args = args
                .iter()
                .map(|arg| render_type(arg, names))
                .collect::<Result<Vec<_>>>()?;
            format!("{}<{}>", render_type(base, names)?, args.join(","))
        }
        TypeSignature::GenericParamType(number) => format!("!{number}"),
        TypeSignature::GenericParamMethod(number) => format!("!!{number}"),
        TypeSignature::FnPtr(method) => format!("method {}", render_method(method, names)?),
        TypeSignature::Modified(modifier, base) => format!(
            "{} {}({})",
            render_type(base, names)?,
            if modifier.is_required {
                "modreq"
            } else {
                "modopt"
            },
            names(modifier.modifier_type)?
        ),
    };

    Ok(rendered)
}

/// Render a method signature as `[instance ][explicit ][vararg ]ret[<n>](p1,p2)`.
///
/// Arguments after the sentinel of a vararg call site are not part of the member's identity
/// and are left out.
///
/// # Errors
/// Propagates the errors of `names`.
pub fn render_method(
    signature: &SignatureMethod,
    names: &dyn Fn(Token) -> Result<String>,
) -> Result<String> {
    let mut rendered = String::new();
    if signature.has_this {
        rendered.push_str("instance ");
    }
    if signature.explicit_this {
        rendered.push_str("explicit ");
    }
    if signature.is_vararg() {
        rendered.push_str("vararg ");
    }

    rendered.push_str(&render_type(&signature.return_type, names)?);
    if signature.generic_param_count > 0 {
        rendered.push_str(&format!("<{}>", signature.generic_param_count));
    }

    let params = signature
        .params
        .iter()
        .map(|param| render_type(param, names))
        .collect::<Result<Vec<_>>>()?;
    rendered.push('(');
    rendered.push_str(&params.join(","));
    rendered.push(')');

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{signatures::ArrayShape, tables::TableId};

    fn names(token: Token) -> Result<String> {
        match token.row() {
            1 => Ok("System.Collections.Generic.List`1".to_string()),
            2 => Ok("System.Runtime.CompilerServices.IsVolatile".to_string()),
            _ => Err(malformed_error!("unknown token {}", token)),
        }
    }

    #[test]
    fn types() {
        let list = TypeSignature::Class(Token::from_parts(TableId::TypeRef, 1));
        let cases = [
            (TypeSignature::I, "native int"),
            (
                TypeSignature::GenericInst(Box::new(list.clone()), vec![TypeSignature::I4]),
                "System.Collections.Generic.List`1<int32>",
            ),
            (
                TypeSignature::SzArray(Box::new(TypeSignature::Ptr(Box::new(TypeSignature::U1)))),
                "uint8*[]",
            ),
            (
                TypeSignature::Array(
                    Box::new(TypeSignature::R8),
                    ArrayShape {
                        rank: 2,
                        sizes: vec![],
                        lower_bounds: vec![],
                    },
                ),
                "float64[,]",
            ),
            (TypeSignature::GenericParamMethod(1), "!!1"),
        ];

        for (signature, expected) in cases {
            assert_eq!(render_type(&signature, &names).unwrap(), expected);
        }
    }

    #[test]
    fn methods() {
        let mut method = SignatureMethod::new_instance(
            TypeSignature::Void,
            vec![
                TypeSignature::String,
                TypeSignature::ByRef(Box::new(TypeSignature::Object)),
            ],
        );
        assert_eq!(
            render_method(&method, &names).unwrap(),
            "instance void(string,object&)"
        );

        method.has_this = false;
        method.generic_param_count = 2;
        method.varargs.push(TypeSignature::I4);
        assert_eq!(render_method(&method, &names).unwrap(), "void<2>(string,object&)");
    }

    #[test]
    fn unknown_token() {
        let signature = TypeSignature::ValueType(Token::from_parts(TableId::TypeRef, 9));
        assert!(render_type(&signature, &names).is_err());
    }
}
