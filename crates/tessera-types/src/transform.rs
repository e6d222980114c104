//! Structural traversal of types.

use std::collections::HashMap;

use crate::{FunctionType, GenericSignature, Requirement, TupleElt, Type, TypeKind};

impl<'db> Type<'db> {
    /// Rebuild the type bottom-up.
    ///
    /// `f` sees every node before its children; returning `Some` replaces the
    /// node without descending into it.
    pub fn transform(
        self,
        db: &'db dyn salsa::Database,
        f: &mut dyn FnMut(Type<'db>) -> Option<Type<'db>>,
    ) -> Type<'db> {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        let kind = match self.kind(db) {
            TypeKind::Builtin(_)
            | TypeKind::Module(_)
            | TypeKind::Error
            | TypeKind::Protocol(_)
            | TypeKind::Archetype(_)
            | TypeKind::GenericParam(_)
            | TypeKind::TypeVar(_) => return self,
            TypeKind::Tuple(elts) => TypeKind::Tuple(
                elts.iter()
                    .map(|elt| elt.with_type(elt.ty.transform(db, f)))
                    .collect::<Vec<TupleElt<'db>>>(),
            ),
            TypeKind::Function(func) => TypeKind::Function(func.transform(db, f)),
            TypeKind::Metatype(inner) => TypeKind::Metatype(inner.transform(db, f)),
            TypeKind::LValue { object, quals } => TypeKind::LValue {
                object: object.transform(db, f),
                quals: *quals,
            },
            TypeKind::Optional(inner) => TypeKind::Optional(inner.transform(db, f)),
            TypeKind::Array(inner) => TypeKind::Array(inner.transform(db, f)),
            TypeKind::Nominal { decl, parent } => TypeKind::Nominal {
                decl: *decl,
                parent: parent.map(|p| p.transform(db, f)),
            },
            TypeKind::BoundGeneric { decl, parent, args } => TypeKind::BoundGeneric {
                decl: *decl,
                parent: parent.map(|p| p.transform(db, f)),
                args: args.iter().map(|a| a.transform(db, f)).collect(),
            },
            TypeKind::UnboundGeneric { decl, parent } => TypeKind::UnboundGeneric {
                decl: *decl,
                parent: parent.map(|p| p.transform(db, f)),
            },
            TypeKind::Composition(members) => {
                TypeKind::Composition(members.iter().map(|m| m.transform(db, f)).collect())
            }
            TypeKind::DependentMember { base, assoc } => TypeKind::DependentMember {
                base: base.transform(db, f),
                assoc: *assoc,
            },
            TypeKind::GenericFunction {
                signature,
                function,
            } => TypeKind::GenericFunction {
                signature: signature.transform(db, f),
                function: function.transform(db, f),
            },
            TypeKind::Paren(inner) => TypeKind::Paren(inner.transform(db, f)),
            TypeKind::NameAlias { name, underlying } => TypeKind::NameAlias {
                name: *name,
                underlying: underlying.transform(db, f),
            },
        };
        if &kind == self.kind(db) {
            self
        } else {
            Type::new(db, kind)
        }
    }

    /// Whether any node of the type satisfies `pred`.
    pub fn any(
        self,
        db: &'db dyn salsa::Database,
        pred: &mut dyn FnMut(Type<'db>) -> bool,
    ) -> bool {
        if pred(self) {
            return true;
        }
        match self.kind(db) {
            TypeKind::Builtin(_)
            | TypeKind::Module(_)
            | TypeKind::Error
            | TypeKind::Protocol(_)
            | TypeKind::Archetype(_)
            | TypeKind::GenericParam(_)
            | TypeKind::TypeVar(_) => false,
            TypeKind::Tuple(elts) => elts.iter().any(|elt| elt.ty.any(db, pred)),
            TypeKind::Function(func) => func.input.any(db, pred) || func.result.any(db, pred),
            TypeKind::Metatype(inner)
            | TypeKind::Optional(inner)
            | TypeKind::Array(inner)
            | TypeKind::Paren(inner)
            | TypeKind::LValue { object: inner, .. }
            | TypeKind::NameAlias {
                underlying: inner, ..
            }
            | TypeKind::DependentMember { base: inner, .. } => inner.any(db, pred),
            TypeKind::Nominal { parent, .. } | TypeKind::UnboundGeneric { parent, .. } => {
                parent.is_some_and(|p| p.any(db, pred))
            }
            TypeKind::BoundGeneric { parent, args, .. } => {
                parent.is_some_and(|p| p.any(db, pred)) || args.iter().any(|a| a.any(db, pred))
            }
            TypeKind::Composition(members) => members.iter().any(|m| m.any(db, pred)),
            TypeKind::GenericFunction { function, .. } => {
                function.input.any(db, pred) || function.result.any(db, pred)
            }
        }
    }

    /// Replace interface generic parameters by `(depth, index)`.
    pub fn subst_generic_params(
        self,
        db: &'db dyn salsa::Database,
        map: &HashMap<(u32, u32), Type<'db>>,
    ) -> Type<'db> {
        self.transform(db, &mut |ty| match ty.kind(db) {
            TypeKind::GenericParam(gp) => map.get(&gp.key()).copied(),
            _ => None,
        })
    }
}

impl<'db> FunctionType<'db> {
    fn transform(
        &self,
        db: &'db dyn salsa::Database,
        f: &mut dyn FnMut(Type<'db>) -> Option<Type<'db>>,
    ) -> FunctionType<'db> {
        FunctionType {
            input: self.input.transform(db, f),
            result: self.result.transform(db, f),
            ext: self.ext,
        }
    }
}

impl<'db> GenericSignature<'db> {
    fn transform(
        &self,
        db: &'db dyn salsa::Database,
        f: &mut dyn FnMut(Type<'db>) -> Option<Type<'db>>,
    ) -> GenericSignature<'db> {
        GenericSignature {
            params: self.params.clone(),
            requirements: self
                .requirements
                .iter()
                .map(|req| req.transform(db, f))
                .collect(),
        }
    }
}

impl<'db> Requirement<'db> {
    pub fn transform(
        &self,
        db: &'db dyn salsa::Database,
        f: &mut dyn FnMut(Type<'db>) -> Option<Type<'db>>,
    ) -> Requirement<'db> {
        match self {
            Requirement::Conformance { subject, protocol } => Requirement::Conformance {
                subject: subject.transform(db, f),
                protocol: *protocol,
            },
            Requirement::Superclass {
                subject,
                superclass,
            } => Requirement::Superclass {
                subject: subject.transform(db, f),
                superclass: superclass.transform(db, f),
            },
            Requirement::SameType { first, second } => Requirement::SameType {
                first: first.transform(db, f),
                second: second.transform(db, f),
            },
        }
    }
}
