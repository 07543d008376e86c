//! C#-like rendering of signatures.
//!
//! The `Display` implementations print class references as tokens; [`render_type`] and
//! [`render_method`] look their names up through a [`TypeResolver`].

use std::fmt::{self, Write};

use crate::{
    metadata::signatures::{
        ElementType, GenericOrigin, MethodSig, MethodSignature, Param, TypeResolver, TypeSig,
    },
    Result,
};

fn keyword(kind: ElementType) -> &'static str {
    match kind {
        ElementType::End => "<end>",
        ElementType::Void => "void",
        ElementType::Boolean => "bool",
        ElementType::Char => "char",
        ElementType::I1 => "sbyte",
        ElementType::U1 => "byte",
        ElementType::I2 => "short",
        ElementType::U2 => "ushort",
        ElementType::I4 => "int",
        ElementType::U4 => "uint",
        ElementType::I8 => "long",
        ElementType::U8 => "ulong",
        ElementType::R4 => "float",
        ElementType::R8 => "double",
        ElementType::String => "string",
        ElementType::TypedByRef => "TypedReference",
        ElementType::I => "IntPtr",
        ElementType::U => "UIntPtr",
        ElementType::Object => "object",
        ElementType::RefGenericParam => "<ref>",
        ElementType::UninstantiatedGenericParam => "<uninstantiated>",
        ElementType::VirtFtnPtr => "<vftnptr>",
    }
}

struct Renderer<'r> {
    resolver: Option<&'r dyn TypeResolver>,
}

impl Renderer<'_> {
    fn ty(&self, out: &mut String, ty: &TypeSig) -> Result<()> {
        match ty {
            TypeSig::Primitive(kind) => out.push_str(keyword(*kind)),
            TypeSig::Class(class) => match self.resolver {
                Some(resolver) => {
                    let name = resolver.type_name(*class)?;
                    if !name.namespace.is_empty() {
                        out.push_str(&name.namespace);
                        out.push('.');
                    }
                    out.push_str(&name.name);
                }
                None => {
                    let _ = write!(out, "{}", class.token);
                }
            },
            TypeSig::Boxed(inner) => {
                out.push_str("boxed ");
                self.ty(out, inner)?;
            }
            TypeSig::GenericInst { base, args } => {
                self.ty(out, base)?;
                out.push('<');
                self.list(out, args)?;
                out.push('>');
            }
            TypeSig::SzArray(elem) => {
                self.ty(out, elem)?;
                out.push_str("[]");
            }
            TypeSig::Array(shape) => {
                self.ty(out, &shape.elem)?;
                out.push('[');
                for dim in 0..shape.rank as usize {
                    if dim > 0 {
                        out.push(',');
                    }
                    let lower = shape.lo_bounds.get(dim).copied();
                    let size = shape.sizes.get(dim).copied();
                    match (lower, size) {
                        (Some(lower), Some(size)) => {
                            let _ = write!(out, "{lower}...{}", i64::from(lower) + i64::from(size) - 1);
                        }
                        (Some(lower), None) if lower != 0 => {
                            let _ = write!(out, "{lower}...");
                        }
                        (None, Some(size)) => {
                            let _ = write!(out, "{size}");
                        }
                        _ => {}
                    }
                }
                out.push(']');
            }
            TypeSig::ByRef(inner) => {
                out.push_str("ref ");
                self.ty(out, inner)?;
            }
            TypeSig::Ptr(inner) => {
                self.ty(out, inner)?;
                out.push('*');
            }
            TypeSig::Var(index) => {
                let _ = write!(out, "!{index}");
            }
            TypeSig::MVar(index) => {
                let _ = write!(out, "!!{index}");
            }
            TypeSig::Uninstantiated {
                index,
                name,
                origin,
            } => match name {
                Some(name) => out.push_str(name),
                None => {
                    let marker = match origin {
                        GenericOrigin::Type => "!",
                        GenericOrigin::Method => "!!",
                    };
                    let _ = write!(out, "{marker}{index}?");
                }
            },
        }

        Ok(())
    }

    fn list(&self, out: &mut String, items: &[TypeSig]) -> Result<()> {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            self.ty(out, item)?;
        }
        Ok(())
    }

    fn param(&self, out: &mut String, param: &Param) -> Result<()> {
        self.ty(out, &param.ty)?;
        if let Some(name) = &param.name {
            out.push(' ');
            out.push_str(name);
        }
        Ok(())
    }

    fn method(&self, out: &mut String, name: &str, sig: &MethodSig, args: Option<&[TypeSig]>) -> Result<()> {
        if !sig.has_this {
            out.push_str("static ");
        }
        self.ty(out, &sig.ret.ty)?;
        out.push(' ');
        out.push_str(name);

        if let Some(args) = args {
            out.push('<');
            self.list(out, args)?;
            out.push('>');
        } else if sig.gen_param_count > 0 {
            out.push('<');
            for index in 0..sig.gen_param_count {
                if index > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "!!{index}");
            }
            out.push('>');
        }

        out.push('(');
        for (index, param) in sig.params.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            if sig.sentinel == Some(index) {
                out.push_str("..., ");
            }
            self.param(out, param)?;
        }
        if sig.sentinel == Some(sig.params.len()) {
            out.push_str(if sig.params.is_empty() { "..." } else { ", ..." });
        }
        out.push(')');

        Ok(())
    }
}

/// Render a type with class names looked up through `resolver`.
///
/// # Errors
/// Propagates lookup failures of [`TypeResolver::type_name`].
pub fn render_type(ty: &TypeSig, resolver: &dyn TypeResolver) -> Result<String> {
    let mut out = String::new();
    Renderer {
        resolver: Some(resolver),
    }
    .ty(&mut out, ty)?;
    Ok(out)
}

/// Render a method declaration such as `static int Max<!!0>(int a, int b)`.
///
/// # Errors
/// Propagates lookup failures of [`TypeResolver::type_name`].
pub fn render_method(name: &str, sig: &MethodSignature, resolver: &dyn TypeResolver) -> Result<String> {
    let mut out = String::new();
    Renderer {
        resolver: Some(resolver),
    }
    .method(&mut out, name, sig.method(), sig.generic_args())?;
    Ok(out)
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        Renderer { resolver: None }
            .ty(&mut out, self)
            .map_err(|_| fmt::Error)?;
        f.write_str(&out)
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        Renderer { resolver: None }
            .method(&mut out, "method", self, None)
            .map_err(|_| fmt::Error)?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{ArrayShape, TestResolver};

    #[test]
    fn plain_rendering() {
        let ty = TypeSig::SzArray(Box::new(TypeSig::Ptr(Box::new(TypeSig::Primitive(
            ElementType::I4,
        )))));
        assert_eq!(ty.to_string(), "int*[]");

        let array = TypeSig::Array(Box::new(ArrayShape {
            elem: TypeSig::Primitive(ElementType::R8),
            rank: 2,
            sizes: vec![3],
            lo_bounds: vec![1],
        }));
        assert_eq!(array.to_string(), "double[1...3,]");
    }

    #[test]
    fn named_rendering() {
        let mut resolver = TestResolver::default();
        let list = resolver.define("mscorlib", "System.Collections.Generic", "List`1");
        let ty = TypeSig::GenericInst {
            base: Box::new(TypeSig::Class(list)),
            args: vec![TypeSig::Primitive(ElementType::String)],
        };
        assert_eq!(
            render_type(&ty, &resolver).unwrap(),
            "System.Collections.Generic.List`1<string>"
        );

        let mut sig = MethodSig::new(
            TypeSig::Primitive(ElementType::Void),
            vec![TypeSig::Primitive(ElementType::I4), ty],
        );
        sig.params[0].name = Some("count".to_string());
        assert_eq!(
            render_method("Fill", &sig.into(), &resolver).unwrap(),
            "static void Fill(int count, System.Collections.Generic.List`1<string>)"
        );
    }
}
