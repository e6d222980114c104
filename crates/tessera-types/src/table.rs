//! An in-memory declaration table.
//!
//! `DeclTable` is the declaration world used by tests and by the scenario
//! driver. It implements every collaborator trait the solver consumes.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::{
    ArchetypeDecl, ArchetypeId, AssocTypeDecl, AssocTypeId, Conformance, ConformanceAnswer,
    ConformanceOracle, DeclAttrs, DeclContext, DeclIntrospection, GenericParamDecl,
    GenericParamTy, GenericSignature, MemberLookup, ModuleId, NominalDecl, NominalId, NominalKind,
    ProtocolDecl, ProtocolId, Requirement, Symbol, Type, TypeKind, ValueDecl, ValueDeclId,
    ValueDeclKind,
};

pub struct DeclTable<'db> {
    db: &'db dyn salsa::Database,
    main_module: ModuleId,
    nominals: Vec<NominalDecl<'db>>,
    protocols: Vec<ProtocolDecl<'db>>,
    assoc_types: Vec<AssocTypeDecl<'db>>,
    archetypes: Vec<ArchetypeDecl<'db>>,
    values: Vec<ValueDecl<'db>>,
    type_decls: HashMap<NominalId, ValueDeclId>,
    assoc_type_decls: HashMap<AssocTypeId, ValueDeclId>,
    dynamic_lookup: Option<ProtocolId>,
}

impl<'db> DeclTable<'db> {
    pub fn new(db: &'db dyn salsa::Database) -> Self {
        Self {
            db,
            main_module: ModuleId::new(0, Symbol::new("main")),
            nominals: Vec::new(),
            protocols: Vec::new(),
            assoc_types: Vec::new(),
            archetypes: Vec::new(),
            values: Vec::new(),
            type_decls: HashMap::new(),
            assoc_type_decls: HashMap::new(),
            dynamic_lookup: None,
        }
    }

    pub fn db(&self) -> &'db dyn salsa::Database {
        self.db
    }

    pub fn main_module(&self) -> ModuleId {
        self.main_module
    }

    pub fn top_level(&self) -> DeclContext {
        DeclContext::Module(self.main_module)
    }

    // ===== Building =====

    /// Declare a struct, class, or enum and its type declaration.
    pub fn add_nominal(&mut self, name: &str, kind: NominalKind) -> NominalId {
        let id = NominalId::new(self.nominals.len() as u32, Symbol::from_dynamic(name));
        self.nominals.push(NominalDecl {
            id,
            kind,
            generics: None,
            superclass: None,
            conformances: Vec::new(),
        });
        let declared = Type::nominal(self.db, id);
        let decl = self.add_value(
            name,
            ValueDeclKind::Nominal(id),
            self.top_level(),
            declared,
        );
        self.type_decls.insert(id, decl);
        id
    }

    /// Make a nominal generic over fresh parameters at depth 0.
    pub fn set_generic_params(
        &mut self,
        nominal: NominalId,
        params: &[(&str, Vec<ProtocolId>)],
    ) -> Vec<GenericParamDecl> {
        let params: Vec<_> = params
            .iter()
            .enumerate()
            .map(|(index, (name, conforms))| {
                self.add_generic_param(0, index as u32, name, conforms.clone())
            })
            .collect();
        let requirements = self.conformance_requirements(&params);
        self.nominals[nominal.index() as usize].generics =
            Some(GenericSignature::new(params.clone(), requirements));
        let decl = self.type_decls[&nominal];
        self.values[decl.index() as usize].interface_type = Type::unbound_generic(self.db, nominal);
        params
    }

    pub fn set_superclass(&mut self, class: NominalId, superclass: Type<'db>) {
        self.nominals[class.index() as usize].superclass = Some(superclass);
    }

    pub fn add_conformance(&mut self, nominal: NominalId, conformance: Conformance<'db>) {
        self.nominals[nominal.index() as usize]
            .conformances
            .push(conformance);
    }

    pub fn add_protocol(&mut self, name: &str) -> ProtocolId {
        let id = ProtocolId::new(self.protocols.len() as u32, Symbol::from_dynamic(name));
        let self_archetype = self.new_archetype(
            Symbol::from_dynamic(&format!("{name}.Self")),
            vec![id],
            None,
            Some(id),
        );
        self.protocols.push(ProtocolDecl {
            id,
            inherited: Vec::new(),
            class_bound: false,
            dynamic_lookup: false,
            self_param: GenericParamDecl {
                param: GenericParamTy::new(0, 0, crate::SELF()),
                archetype: self_archetype,
            },
            assoc_types: Vec::new(),
            literal_default: None,
        });
        id
    }

    pub fn protocol_mut(&mut self, id: ProtocolId) -> &mut ProtocolDecl<'db> {
        &mut self.protocols[id.index() as usize]
    }

    /// Mark `proto` as the protocol whose existential answers dynamic lookups.
    pub fn set_dynamic_lookup(&mut self, proto: ProtocolId) {
        self.protocol_mut(proto).dynamic_lookup = true;
        self.dynamic_lookup = Some(proto);
    }

    /// Declare an associated type. Declare them before generic parameters
    /// conforming to the protocol so those get nested archetypes.
    pub fn add_assoc_type(
        &mut self,
        proto: ProtocolId,
        name: &str,
        conforms_to: Vec<ProtocolId>,
    ) -> AssocTypeId {
        let id = AssocTypeId::new(self.assoc_types.len() as u32, Symbol::from_dynamic(name));
        self.assoc_types.push(AssocTypeDecl {
            id,
            protocol: proto,
            conforms_to: conforms_to.clone(),
            superclass: None,
        });
        self.protocol_mut(proto).assoc_types.push(id);

        let self_param = self.protocols[proto.index() as usize].self_param;
        let interface = Type::dependent_member(
            self.db,
            Type::generic_param(self.db, self_param.param),
            id,
        );
        let decl = self.add_value(
            name,
            ValueDeclKind::AssociatedType(id),
            DeclContext::Protocol(proto),
            interface,
        );
        self.assoc_type_decls.insert(id, decl);

        let parent = self_param.archetype;
        let nested_name = Symbol::from_dynamic(&format!("{}.{}", parent.name(), name));
        let nested = self.new_archetype(nested_name, conforms_to, None, None);
        self.archetypes[parent.index() as usize]
            .nested
            .push((id, nested));
        id
    }

    /// Declare a generic parameter and its archetype.
    pub fn add_generic_param(
        &mut self,
        depth: u32,
        index: u32,
        name: &str,
        conforms_to: Vec<ProtocolId>,
    ) -> GenericParamDecl {
        let param = GenericParamTy::new(depth, index, Symbol::from_dynamic(name));
        let archetype = self.new_archetype(param.name, conforms_to, None, None);
        GenericParamDecl { param, archetype }
    }

    /// Conformance requirements mirroring each parameter's archetype.
    pub fn conformance_requirements(&self, params: &[GenericParamDecl]) -> Vec<Requirement<'db>> {
        params
            .iter()
            .flat_map(|gp| {
                let subject = Type::generic_param(self.db, gp.param);
                self.archetypes[gp.archetype.index() as usize]
                    .conforms_to
                    .iter()
                    .map(move |protocol| Requirement::Conformance {
                        subject,
                        protocol: *protocol,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn archetype_mut(&mut self, id: ArchetypeId) -> &mut ArchetypeDecl<'db> {
        &mut self.archetypes[id.index() as usize]
    }

    fn new_archetype(
        &mut self,
        name: Symbol,
        conforms_to: Vec<ProtocolId>,
        superclass: Option<Type<'db>>,
        self_of: Option<ProtocolId>,
    ) -> ArchetypeId {
        self.new_archetype_at(name, conforms_to, superclass, self_of, 0)
    }

    /// Nested archetypes stop at a fixed depth so that recursive associated
    /// types (`SubSequence: Sequence`) stay finite.
    fn new_archetype_at(
        &mut self,
        name: Symbol,
        conforms_to: Vec<ProtocolId>,
        superclass: Option<Type<'db>>,
        self_of: Option<ProtocolId>,
        depth: u32,
    ) -> ArchetypeId {
        const MAX_NESTING: u32 = 2;
        let id = ArchetypeId::new(self.archetypes.len() as u32, name);
        let requires_class = superclass.is_some()
            || conforms_to
                .iter()
                .any(|p| self.protocols.get(p.index() as usize).is_some_and(|p| p.class_bound));
        let mut nested = Vec::new();
        let assoc_types: Vec<AssocTypeId> = conforms_to
            .iter()
            .filter(|p| Some(**p) != self_of && depth < MAX_NESTING)
            .filter_map(|p| self.protocols.get(p.index() as usize))
            .flat_map(|p| p.assoc_types.clone())
            .collect();
        // Reserve the slot first; nested archetypes take the following ids.
        self.archetypes.push(ArchetypeDecl {
            id,
            conforms_to,
            superclass,
            requires_class,
            nested: Vec::new(),
            self_of,
        });
        for assoc in assoc_types {
            let decl = self.assoc_types[assoc.index() as usize].clone();
            let nested_name = Symbol::from_dynamic(&format!("{}.{}", name, assoc.name()));
            let arch = self.new_archetype_at(
                nested_name,
                decl.conforms_to,
                decl.superclass,
                None,
                depth + 1,
            );
            nested.push((assoc, arch));
        }
        self.archetypes[id.index() as usize].nested = nested;
        id
    }

    pub fn add_value(
        &mut self,
        name: &str,
        kind: ValueDeclKind,
        context: DeclContext,
        interface_type: Type<'db>,
    ) -> ValueDeclId {
        let id = ValueDeclId::new(self.values.len() as u32, Symbol::from_dynamic(name));
        self.values.push(ValueDecl {
            id,
            kind,
            context,
            interface_type,
            is_static: false,
            settable: matches!(kind, ValueDeclKind::Var),
            attrs: DeclAttrs::default(),
        });
        id
    }

    pub fn add_func(&mut self, name: &str, context: DeclContext, ty: Type<'db>) -> ValueDeclId {
        self.add_value(name, ValueDeclKind::Func, context, ty)
    }

    pub fn add_var(&mut self, name: &str, context: DeclContext, ty: Type<'db>) -> ValueDeclId {
        self.add_value(name, ValueDeclKind::Var, context, ty)
    }

    pub fn value_mut(&mut self, id: ValueDeclId) -> &mut ValueDecl<'db> {
        &mut self.values[id.index() as usize]
    }

    /// The type declaration introduced by a nominal.
    pub fn type_decl(&self, nominal: NominalId) -> ValueDeclId {
        self.type_decls[&nominal]
    }

    // ===== Queries =====

    pub fn nominals(&self) -> impl Iterator<Item = &NominalDecl<'db>> {
        self.nominals.iter()
    }

    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolDecl<'db>> {
        self.protocols.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &ValueDecl<'db>> {
        self.values.iter()
    }

    /// Values declared at top level under `name`.
    pub fn lookup_unqualified(&self, name: Symbol) -> Vec<ValueDeclId> {
        self.values
            .iter()
            .filter(|v| v.name() == name && !v.context.is_type_context())
            .map(|v| v.id)
            .collect()
    }

    fn superclass_decl(&self, nominal: NominalId) -> Option<NominalId> {
        self.nominals[nominal.index() as usize]
            .superclass
            .and_then(|sup| sup.nominal_decl(self.db))
    }

    fn collect_in_context(&self, context: DeclContext, name: Symbol, out: &mut Vec<ValueDeclId>) {
        for value in &self.values {
            if value.context == context && value.name() == name && !out.contains(&value.id) {
                out.push(value.id);
            }
        }
    }

    fn collect_nominal_members(&self, nominal: NominalId, name: Symbol, out: &mut Vec<ValueDeclId>) {
        let mut current = Some(nominal);
        while let Some(decl) = current {
            self.collect_in_context(DeclContext::Nominal(decl), name, out);
            current = self.superclass_decl(decl);
        }
    }

    fn collect_protocol_members(
        &self,
        protocols: &[ProtocolId],
        name: Symbol,
        out: &mut Vec<ValueDeclId>,
    ) {
        for proto in protocols {
            self.collect_in_context(DeclContext::Protocol(*proto), name, out);
            let inherited = self.protocols[proto.index() as usize].inherited.clone();
            self.collect_protocol_members(&inherited, name, out);
        }
    }

    fn lookup_base(&self, base: Type<'db>) -> Type<'db> {
        let db = self.db;
        let base = base.rvalue(db).desugar(db);
        base.metatype_instance(db)
            .map(|instance| instance.desugar(db))
            .unwrap_or(base)
    }

    fn collect_archetype_members(
        &self,
        archetype: ArchetypeId,
        name: Symbol,
        out: &mut Vec<ValueDeclId>,
    ) {
        let decl = &self.archetypes[archetype.index() as usize];
        self.collect_protocol_members(&decl.conforms_to, name, out);
        if let Some(superclass) = decl.superclass.and_then(|s| s.nominal_decl(self.db)) {
            self.collect_nominal_members(superclass, name, out);
        }
    }

    fn specialize_conformance(
        &self,
        conformance: &Conformance<'db>,
        ty: Type<'db>,
    ) -> Conformance<'db> {
        let TypeKind::BoundGeneric { args, .. } = ty.kind(self.db) else {
            return conformance.clone();
        };
        let map: HashMap<(u32, u32), Type<'db>> = args
            .iter()
            .enumerate()
            .map(|(i, arg)| ((0, i as u32), *arg))
            .collect();
        Conformance {
            protocol: conformance.protocol,
            type_witnesses: conformance
                .type_witnesses
                .iter()
                .map(|(assoc, witness)| (*assoc, witness.subst_generic_params(self.db, &map)))
                .collect(),
            value_witnesses: conformance.value_witnesses.clone(),
        }
    }
}

impl<'db> DeclIntrospection<'db> for DeclTable<'db> {
    fn value_decl(&self, id: ValueDeclId) -> &ValueDecl<'db> {
        &self.values[id.index() as usize]
    }

    fn nominal_decl(&self, id: NominalId) -> &NominalDecl<'db> {
        &self.nominals[id.index() as usize]
    }

    fn protocol_decl(&self, id: ProtocolId) -> &ProtocolDecl<'db> {
        &self.protocols[id.index() as usize]
    }

    fn assoc_type_decl(&self, id: AssocTypeId) -> &AssocTypeDecl<'db> {
        &self.assoc_types[id.index() as usize]
    }

    fn archetype_decl(&self, id: ArchetypeId) -> &ArchetypeDecl<'db> {
        &self.archetypes[id.index() as usize]
    }

    fn dynamic_lookup_protocol(&self) -> Option<ProtocolId> {
        self.dynamic_lookup
    }
}

impl<'db> MemberLookup<'db> for DeclTable<'db> {
    fn lookup_member(
        &self,
        db: &'db dyn salsa::Database,
        base: Type<'db>,
        name: Symbol,
    ) -> Vec<ValueDeclId> {
        let base = self.lookup_base(base);
        let mut out = Vec::new();
        match base.kind(db) {
            TypeKind::Nominal { decl, .. }
            | TypeKind::BoundGeneric { decl, .. }
            | TypeKind::UnboundGeneric { decl, .. } => {
                self.collect_nominal_members(*decl, name, &mut out)
            }
            TypeKind::Archetype(archetype) => {
                self.collect_archetype_members(*archetype, name, &mut out)
            }
            TypeKind::Protocol(_) | TypeKind::Composition(_) => {
                let protocols = base.existential_protocols(db).unwrap_or_default();
                if protocols
                    .iter()
                    .any(|p| self.protocols[p.index() as usize].dynamic_lookup)
                {
                    for value in &self.values {
                        if value.attrs.objc
                            && value.name() == name
                            && matches!(value.context, DeclContext::Nominal(_))
                        {
                            out.push(value.id);
                        }
                    }
                }
                self.collect_protocol_members(&protocols, name, &mut out);
            }
            TypeKind::Module(module) => {
                self.collect_in_context(DeclContext::Module(*module), name, &mut out)
            }
            _ => {}
        }
        out
    }

    fn lookup_member_type(
        &self,
        db: &'db dyn salsa::Database,
        base: Type<'db>,
        name: Symbol,
    ) -> Vec<ValueDeclId> {
        let mut out: Vec<_> = self
            .lookup_member(db, base, name)
            .into_iter()
            .filter(|id| self.value_decl(*id).kind.is_type_decl())
            .collect();
        if out.is_empty()
            && let Some(nominal) = self.lookup_base(base).nominal_decl(db)
        {
            let mut current = Some(nominal);
            while let Some(decl) = current {
                for conformance in &self.nominals[decl.index() as usize].conformances {
                    for assoc in &self.protocols[conformance.protocol.index() as usize].assoc_types
                    {
                        if assoc.name() == name
                            && let Some(decl) = self.assoc_type_decls.get(assoc)
                            && !out.contains(decl)
                        {
                            out.push(*decl);
                        }
                    }
                }
                current = self.superclass_decl(decl);
            }
        }
        out
    }

    fn lookup_constructors(
        &self,
        db: &'db dyn salsa::Database,
        base: Type<'db>,
    ) -> Vec<ValueDeclId> {
        let base = self.lookup_base(base);
        let contexts: SmallVec<[DeclContext; 4]> = match base.kind(db) {
            TypeKind::Nominal { decl, .. }
            | TypeKind::BoundGeneric { decl, .. }
            | TypeKind::UnboundGeneric { decl, .. } => {
                SmallVec::from_elem(DeclContext::Nominal(*decl), 1)
            }
            TypeKind::Archetype(archetype) => self.archetypes[archetype.index() as usize]
                .conforms_to
                .iter()
                .map(|p| DeclContext::Protocol(*p))
                .collect(),
            TypeKind::Protocol(_) | TypeKind::Composition(_) => base
                .existential_protocols(db)
                .unwrap_or_default()
                .iter()
                .map(|p| DeclContext::Protocol(*p))
                .collect(),
            _ => SmallVec::new(),
        };
        self.values
            .iter()
            .filter(|v| v.kind == ValueDeclKind::Constructor && contexts.contains(&v.context))
            .map(|v| v.id)
            .collect()
    }
}

impl<'db> ConformanceOracle<'db> for DeclTable<'db> {
    fn conforms_to(
        &self,
        db: &'db dyn salsa::Database,
        ty: Type<'db>,
        protocol: ProtocolId,
    ) -> ConformanceAnswer<'db> {
        let ty = ty.rvalue(db).desugar(db);
        match ty.kind(db) {
            TypeKind::Error => ConformanceAnswer::Abstract,
            TypeKind::Nominal { .. } | TypeKind::BoundGeneric { .. } => {
                let mut current = Some(ty);
                while let Some(class_ty) = current {
                    let Some(decl) = class_ty.nominal_decl(db) else {
                        break;
                    };
                    let conformances = &self.nominals[decl.index() as usize].conformances;
                    let found = conformances
                        .iter()
                        .find(|c| c.protocol == protocol)
                        .or_else(|| {
                            conformances
                                .iter()
                                .find(|c| self.protocol_inherits(c.protocol, protocol))
                        });
                    if let Some(conformance) = found {
                        let mut specialized = self.specialize_conformance(conformance, class_ty);
                        specialized.protocol = protocol;
                        return ConformanceAnswer::Concrete(specialized);
                    }
                    current = self.superclass_of(db, class_ty);
                }
                ConformanceAnswer::DoesNotConform
            }
            TypeKind::Archetype(archetype) => {
                let decl = &self.archetypes[archetype.index() as usize];
                let direct = decl
                    .conforms_to
                    .iter()
                    .any(|p| self.protocol_inherits(*p, protocol));
                let via_superclass = decl
                    .superclass
                    .is_some_and(|sup| self.conforms_to(db, sup, protocol).conforms());
                if direct || via_superclass {
                    ConformanceAnswer::Abstract
                } else {
                    ConformanceAnswer::DoesNotConform
                }
            }
            TypeKind::Protocol(_) | TypeKind::Composition(_) => {
                let protocols = ty.existential_protocols(db).unwrap_or_default();
                if protocols.iter().any(|p| self.protocol_inherits(*p, protocol)) {
                    ConformanceAnswer::Abstract
                } else {
                    ConformanceAnswer::DoesNotConform
                }
            }
            _ => ConformanceAnswer::DoesNotConform,
        }
    }

    fn superclass_of(&self, db: &'db dyn salsa::Database, ty: Type<'db>) -> Option<Type<'db>> {
        let ty = ty.desugar(db);
        match ty.kind(db) {
            TypeKind::Nominal { decl, .. } => self.nominals[decl.index() as usize].superclass,
            TypeKind::BoundGeneric { decl, args, .. } => {
                let superclass = self.nominals[decl.index() as usize].superclass?;
                let map: HashMap<(u32, u32), Type<'db>> = args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| ((0, i as u32), *arg))
                    .collect();
                Some(superclass.subst_generic_params(db, &map))
            }
            TypeKind::Archetype(archetype) => self.archetypes[archetype.index() as usize].superclass,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn members_are_inherited_from_superclasses() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let base = decls.add_nominal("Base", NominalKind::Class);
        let derived = decls.add_nominal("Derived", NominalKind::Class);
        decls.set_superclass(derived, Type::nominal(&db, base));
        let int = decls.add_nominal("Int", NominalKind::Struct);
        let count = decls.add_var("count", DeclContext::Nominal(base), Type::nominal(&db, int));

        let found = decls.lookup_member(&db, Type::nominal(&db, derived), Symbol::new("count"));
        assert_eq!(found, vec![count]);
        let through_meta = decls.lookup_member(
            &db,
            Type::metatype(&db, Type::nominal(&db, derived)),
            Symbol::new("count"),
        );
        assert_eq!(through_meta, vec![count]);
    }

    #[test]
    fn conformance_follows_inheritance() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let equatable = decls.add_protocol("Equatable");
        let comparable = decls.add_protocol("Comparable");
        decls.protocol_mut(comparable).inherited.push(equatable);
        let int = decls.add_nominal("Int", NominalKind::Struct);
        decls.add_conformance(int, Conformance::new(comparable));

        let int_ty = Type::nominal(&db, int);
        assert!(decls.conforms_to(&db, int_ty, equatable).conforms());
        let existential = Type::protocol(&db, comparable);
        assert_eq!(
            decls.conforms_to(&db, existential, equatable),
            ConformanceAnswer::Abstract
        );
        assert!(
            !decls
                .conforms_to(&db, Type::protocol(&db, equatable), comparable)
                .conforms()
        );
    }

    #[test]
    fn bound_generic_witnesses_are_specialized() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let sequence = decls.add_protocol("Sequence");
        let element = decls.add_assoc_type(sequence, "Element", vec![]);
        let array = decls.add_nominal("Array", NominalKind::Struct);
        let params = decls.set_generic_params(array, &[("T", vec![])]);
        let mut conformance = Conformance::new(sequence);
        conformance
            .type_witnesses
            .push((element, Type::generic_param(&db, params[0].param)));
        decls.add_conformance(array, conformance);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));

        let ty = Type::bound_generic(&db, array, None, vec![int]);
        let ConformanceAnswer::Concrete(found) = decls.conforms_to(&db, ty, sequence) else {
            panic!("expected a concrete conformance");
        };
        assert_eq!(found.type_witness(element), Some(int));

        let member_types = decls.lookup_member_type(&db, ty, Symbol::new("Element"));
        assert_eq!(member_types.len(), 1);
    }

    #[test]
    fn archetypes_get_nested_associated_types() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let sequence = decls.add_protocol("Sequence");
        let element = decls.add_assoc_type(sequence, "Element", vec![]);
        let param = decls.add_generic_param(0, 0, "S", vec![sequence]);
        let arch = decls.archetype_decl(param.archetype);
        assert!(arch.nested_archetype(element).is_some());
        let self_arch = decls.protocol_decl(sequence).self_param.archetype;
        assert!(decls.archetype_decl(self_arch).nested_archetype(element).is_some());
    }
}
