//! Human-readable type printing.

use std::fmt;

use crate::{FunctionExt, FunctionType, GenericSignature, Requirement, Type, TypeKind};

/// Displays a type; created by [`Type::display`].
pub struct TypeDisplay<'db> {
    db: &'db dyn salsa::Database,
    ty: Type<'db>,
}

impl<'db> Type<'db> {
    pub fn display(self, db: &'db dyn salsa::Database) -> TypeDisplay<'db> {
        TypeDisplay { db, ty: self }
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_type(self.db, self.ty, f)
    }
}

impl fmt::Debug for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_type(self.db, self.ty, f)
    }
}

fn print_type<'db>(
    db: &'db dyn salsa::Database,
    ty: Type<'db>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match ty.kind(db) {
        TypeKind::Builtin(kind) => write!(f, "Builtin.{}", kind.name()),
        TypeKind::Module(module) => write!(f, "module<{}>", module),
        TypeKind::Error => write!(f, "<<error type>>"),
        TypeKind::Tuple(elts) => {
            write!(f, "(")?;
            for (i, elt) in elts.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                if let Some(name) = elt.name {
                    write!(f, "{}: ", name)?;
                }
                print_type(db, elt.ty, f)?;
                if elt.vararg {
                    write!(f, "...")?;
                }
                if elt.has_default {
                    write!(f, " = default")?;
                }
            }
            write!(f, ")")
        }
        TypeKind::Function(func) => print_function(db, func, f),
        TypeKind::GenericFunction {
            signature,
            function,
        } => {
            print_signature(db, signature, f)?;
            write!(f, " ")?;
            print_function(db, function, f)
        }
        TypeKind::Metatype(instance) => {
            print_postfix_operand(db, *instance, f)?;
            write!(f, ".metatype")
        }
        TypeKind::LValue { object, quals } => {
            write!(f, "@lvalue")?;
            match (quals.implicit, quals.non_settable) {
                (false, false) => {}
                (true, false) => write!(f, "(implicit)")?,
                (false, true) => write!(f, "(nonsettable)")?,
                (true, true) => write!(f, "(implicit, nonsettable)")?,
            }
            write!(f, " ")?;
            print_type(db, *object, f)
        }
        TypeKind::Optional(object) => {
            print_postfix_operand(db, *object, f)?;
            write!(f, "?")
        }
        TypeKind::Array(element) => {
            print_postfix_operand(db, *element, f)?;
            write!(f, "[]")
        }
        TypeKind::Nominal { decl, parent } | TypeKind::UnboundGeneric { decl, parent } => {
            if let Some(parent) = parent {
                print_type(db, *parent, f)?;
                write!(f, ".")?;
            }
            write!(f, "{}", decl)
        }
        TypeKind::BoundGeneric { decl, parent, args } => {
            if let Some(parent) = parent {
                print_type(db, *parent, f)?;
                write!(f, ".")?;
            }
            write!(f, "{}<", decl)?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                print_type(db, *arg, f)?;
            }
            write!(f, ">")
        }
        TypeKind::Protocol(proto) => write!(f, "{}", proto),
        TypeKind::Composition(members) => {
            write!(f, "protocol<")?;
            for (i, member) in members.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                print_type(db, *member, f)?;
            }
            write!(f, ">")
        }
        TypeKind::Archetype(archetype) => write!(f, "{}", archetype),
        TypeKind::GenericParam(param) => write!(f, "{}", param.name),
        TypeKind::DependentMember { base, assoc } => {
            print_type(db, *base, f)?;
            write!(f, ".{}", assoc)
        }
        TypeKind::TypeVar(id) => write!(f, "{}", id),
        TypeKind::Paren(inner) => {
            write!(f, "(")?;
            print_type(db, *inner, f)?;
            write!(f, ")")
        }
        TypeKind::NameAlias { name, .. } => write!(f, "{}", name),
    }
}

fn print_function<'db>(
    db: &'db dyn salsa::Database,
    func: &FunctionType<'db>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let FunctionExt {
        auto_closure,
        no_return,
    } = func.ext;
    if auto_closure {
        write!(f, "@auto_closure ")?;
    }
    if no_return {
        write!(f, "@noreturn ")?;
    }
    if func.input.as_function(db).is_some() {
        write!(f, "(")?;
        print_type(db, func.input, f)?;
        write!(f, ")")?;
    } else {
        print_type(db, func.input, f)?;
    }
    write!(f, " -> ")?;
    print_type(db, func.result, f)
}

fn print_signature<'db>(
    db: &'db dyn salsa::Database,
    signature: &GenericSignature<'db>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write!(f, "<")?;
    for (i, gp) in signature.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", gp.param.name)?;
    }
    for (i, req) in signature.requirements.iter().enumerate() {
        write!(f, "{}", if i == 0 { " where " } else { ", " })?;
        match req {
            Requirement::Conformance { subject, protocol } => {
                print_type(db, *subject, f)?;
                write!(f, ": {}", protocol)?;
            }
            Requirement::Superclass {
                subject,
                superclass,
            } => {
                print_type(db, *subject, f)?;
                write!(f, ": ")?;
                print_type(db, *superclass, f)?;
            }
            Requirement::SameType { first, second } => {
                print_type(db, *first, f)?;
                write!(f, " == ")?;
                print_type(db, *second, f)?;
            }
        }
    }
    write!(f, ">")
}

/// Postfix operators bind tighter than `->`.
fn print_postfix_operand<'db>(
    db: &'db dyn salsa::Database,
    ty: Type<'db>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let needs_parens = matches!(
        ty.kind(db),
        TypeKind::Function(_) | TypeKind::GenericFunction { .. } | TypeKind::LValue { .. }
    );
    if needs_parens {
        write!(f, "(")?;
        print_type(db, ty, f)?;
        write!(f, ")")
    } else {
        print_type(db, ty, f)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::{
        ArchetypeId, BuiltinKind, GenericParamDecl, GenericParamTy, LValueQuals, NominalId,
        ProtocolId, Symbol, TupleElt, TypeVarId,
    };

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn prints_structural_types() {
        let db = test_db();
        let int = Type::nominal(&db, NominalId::new(0, Symbol::new("Int")));
        let string = Type::nominal(&db, NominalId::new(1, Symbol::new("String")));
        let args = Type::tuple(
            &db,
            vec![
                TupleElt::named(Symbol::new("x"), int),
                TupleElt::new(string).variadic(),
            ],
        );
        let func = Type::function(&db, args, Type::optional(&db, int));
        assert_snapshot!(func.display(&db), @"(x: Int, String...) -> Int?");

        let curried = Type::function(&db, func, Type::metatype(&db, int));
        assert_snapshot!(curried.display(&db), @"((x: Int, String...) -> Int?) -> Int.metatype");

        let lvalue = Type::lvalue(&db, int, LValueQuals::IMPLICIT.non_settable());
        assert_snapshot!(lvalue.display(&db), @"@lvalue(implicit, nonsettable) Int");

        let tv = Type::type_var(&db, TypeVarId(3));
        let array = Type::bound_generic(&db, NominalId::new(2, Symbol::new("Array")), None, vec![tv]);
        assert_snapshot!(array.display(&db), @"Array<$T3>");
    }

    #[test]
    fn prints_existentials_and_generics() {
        let db = test_db();
        let p = Type::protocol(&db, ProtocolId::new(0, Symbol::new("P")));
        let q = Type::protocol(&db, ProtocolId::new(1, Symbol::new("Q")));
        assert_snapshot!(Type::composition(&db, vec![p, q]).display(&db), @"protocol<P, Q>");

        let t = GenericParamTy::new(0, 0, Symbol::new("T"));
        let sig = GenericSignature::new(
            vec![GenericParamDecl {
                param: t,
                archetype: ArchetypeId::new(0, Symbol::new("T")),
            }],
            vec![Requirement::Conformance {
                subject: Type::generic_param(&db, t),
                protocol: ProtocolId::new(0, Symbol::new("P")),
            }],
        );
        let generic = Type::generic_function(
            &db,
            sig,
            Type::generic_param(&db, t),
            Type::builtin(&db, BuiltinKind::Int1),
        );
        assert_snapshot!(generic.display(&db), @"<T where T: P> T -> Builtin.Int1");
    }
}
